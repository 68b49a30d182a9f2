//! Policy provider
//!
//! System settings are stored as raw strings so admins can edit them freely.
//! This module is the only place that parses them: every consumer reads a
//! typed [`Policy`] whose fields already fell back to the documented defaults
//! when a key is missing, unparsable or out of range. A fallback is logged,
//! never returned as an error.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use tracing::warn;

use super::traits::{LedgerTx, StoreResult};
use crate::types::{AdminId, CirculationError, SettingEntry};

/// Well-known setting keys
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SettingKey {
    MaxBooksPerBorrowing,
    BorrowingPeriodDays,
    FinePerDay,
    BooksRequiredPerSemester,
    SemesterDurationMonths,
}

impl SettingKey {
    pub const ALL: [SettingKey; 5] = [
        SettingKey::MaxBooksPerBorrowing,
        SettingKey::BorrowingPeriodDays,
        SettingKey::FinePerDay,
        SettingKey::BooksRequiredPerSemester,
        SettingKey::SemesterDurationMonths,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            SettingKey::MaxBooksPerBorrowing => "max_books_per_borrowing",
            SettingKey::BorrowingPeriodDays => "borrowing_period_days",
            SettingKey::FinePerDay => "fine_per_day",
            SettingKey::BooksRequiredPerSemester => "books_required_per_semester",
            SettingKey::SemesterDurationMonths => "semester_duration_months",
        }
    }
}

impl fmt::Display for SettingKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// Upper bounds on admin-editable values; larger values fall back to the default
const MAX_BOOKS_PER_BORROWING: u32 = 100;
const MAX_BORROWING_PERIOD_DAYS: u32 = 3_650;
const MAX_FINE_PER_DAY: Decimal = Decimal::from_parts(1_000_000, 0, 0, false, 0);
const MAX_BOOKS_REQUIRED_PER_SEMESTER: u32 = 10_000;
const MAX_SEMESTER_DURATION_MONTHS: u32 = 120;

/// Typed view of the system settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Policy {
    /// Cap on books per request and on concurrently held books
    pub max_books_per_borrowing: u32,
    pub borrowing_period_days: u32,
    pub fine_per_day: Decimal,
    pub books_required_per_semester: u32,
    pub semester_duration_months: u32,
}

impl Default for Policy {
    fn default() -> Self {
        Self {
            max_books_per_borrowing: 3,
            borrowing_period_days: 7,
            fine_per_day: Decimal::new(5, 0),
            books_required_per_semester: 20,
            semester_duration_months: 6,
        }
    }
}

impl Policy {
    /// Build a policy from stored entries, falling back per key to the defaults
    pub fn from_entries<'a>(entries: impl IntoIterator<Item = &'a SettingEntry>) -> Self {
        let raw: BTreeMap<&str, &str> = entries
            .into_iter()
            .map(|e| (e.key.as_str(), e.value.as_str()))
            .collect();
        let default = Self::default();

        Self {
            max_books_per_borrowing: bounded_or_default(
                &raw,
                SettingKey::MaxBooksPerBorrowing,
                default.max_books_per_borrowing,
                MAX_BOOKS_PER_BORROWING,
            ),
            borrowing_period_days: bounded_or_default(
                &raw,
                SettingKey::BorrowingPeriodDays,
                default.borrowing_period_days,
                MAX_BORROWING_PERIOD_DAYS,
            ),
            fine_per_day: parsed_or_default(
                &raw,
                SettingKey::FinePerDay,
                default.fine_per_day,
                |v: &Decimal| !v.is_sign_negative() && *v <= MAX_FINE_PER_DAY,
            ),
            books_required_per_semester: bounded_or_default(
                &raw,
                SettingKey::BooksRequiredPerSemester,
                default.books_required_per_semester,
                MAX_BOOKS_REQUIRED_PER_SEMESTER,
            ),
            semester_duration_months: bounded_or_default(
                &raw,
                SettingKey::SemesterDurationMonths,
                default.semester_duration_months,
                MAX_SEMESTER_DURATION_MONTHS,
            ),
        }
    }
}

/// Counts outside `1..=max` fall back to the default
fn bounded_or_default(
    raw: &BTreeMap<&str, &str>,
    key: SettingKey,
    default: u32,
    max: u32,
) -> u32 {
    parsed_or_default(raw, key, default, |v: &u32| (1..=max).contains(v))
}

fn parsed_or_default<T>(
    raw: &BTreeMap<&str, &str>,
    key: SettingKey,
    default: T,
    accept: impl Fn(&T) -> bool,
) -> T
where
    T: FromStr + fmt::Display,
{
    let Some(value) = raw.get(key.as_str()) else {
        return default;
    };
    match value.trim().parse::<T>() {
        Ok(parsed) if accept(&parsed) => parsed,
        _ => {
            warn!(
                setting = %key,
                value = %value,
                fallback = %default,
                "Invalid setting value, using default"
            );
            default
        }
    }
}

/// Load the current policy inside a store transaction
pub fn load_policy(tx: &dyn LedgerTx) -> StoreResult<Policy> {
    let entries = tx.settings()?;
    Ok(Policy::from_entries(&entries))
}

/// All stored settings as raw key/value pairs
pub fn get_settings(tx: &dyn LedgerTx) -> StoreResult<BTreeMap<String, String>> {
    Ok(tx
        .settings()?
        .into_iter()
        .map(|e| (e.key, e.value))
        .collect())
}

/// Upsert one setting, recording who changed it and when
///
/// Only presence is validated; numeric interpretation happens in
/// [`Policy::from_entries`].
pub fn set_setting(
    tx: &mut dyn LedgerTx,
    key: &str,
    value: &str,
    admin: &AdminId,
    now: DateTime<Utc>,
) -> StoreResult<SettingEntry> {
    let key = key.trim();
    if key.is_empty() {
        return Err(CirculationError::validation("Setting key is required"));
    }
    if value.trim().is_empty() {
        return Err(CirculationError::validation(format!(
            "Setting '{}' requires a value",
            key
        )));
    }
    let entry = SettingEntry {
        key: key.to_string(),
        value: value.trim().to_string(),
        updated_by: admin.clone(),
        updated_at: now,
    };
    tx.put_setting(entry.clone())?;
    Ok(entry)
}
