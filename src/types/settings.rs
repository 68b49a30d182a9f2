//! System setting rows
//!
//! Settings are stored as raw strings; typed parsing lives in the policy
//! provider so every consumer sees the same validated values.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::student::AdminId;

/// One stored key/value setting with its audit fields
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SettingEntry {
    pub key: String,
    pub value: String,
    pub updated_by: AdminId,
    pub updated_at: DateTime<Utc>,
}
