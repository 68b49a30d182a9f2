//! Book copy types
//!
//! A book copy is one independently borrowable unit of a title, identified by
//! a human-readable code such as `BK-0001`.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::error::CirculationError;

/// Book copy identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BookId(pub u32);

impl fmt::Display for BookId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Availability of a book copy
///
/// Only the transactor moves copies between `Available` and `Borrowed`.
/// `Lost` and `Maintenance` are set by inventory management and make a copy
/// unborrowable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BookStatus {
    Available,
    Borrowed,
    Lost,
    Maintenance,
}

impl fmt::Display for BookStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            BookStatus::Available => "available",
            BookStatus::Borrowed => "borrowed",
            BookStatus::Lost => "lost",
            BookStatus::Maintenance => "maintenance",
        };
        f.write_str(name)
    }
}

impl FromStr for BookStatus {
    type Err = CirculationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "available" => Ok(BookStatus::Available),
            "borrowed" => Ok(BookStatus::Borrowed),
            "lost" => Ok(BookStatus::Lost),
            "maintenance" => Ok(BookStatus::Maintenance),
            other => Err(CirculationError::validation(format!(
                "Invalid book status '{}'",
                other
            ))),
        }
    }
}

/// A single copy in the inventory
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookCopy {
    pub id: BookId,
    /// Unique human-readable code
    pub code: String,
    pub title: String,
    pub status: BookStatus,
}
