//! Student-related types
//!
//! Students themselves are owned by the profile layer; the engine only reads
//! them. The borrowing-status and semester rows are owned by the engine.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::error::CirculationError;

/// Institution-issued student identifier, e.g. `C22-0044`
///
/// Format: one ASCII uppercase letter, two digits, a dash, four digits.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StudentId(String);

impl StudentId {
    /// Parse a raw identifier, rejecting anything outside the institution pattern
    pub fn parse(raw: &str) -> Result<Self, CirculationError> {
        let trimmed = raw.trim();
        if Self::matches_pattern(trimmed) {
            Ok(StudentId(trimmed.to_string()))
        } else {
            Err(CirculationError::validation(format!(
                "Invalid student ID format: '{}' (expected e.g. C22-0044)",
                raw
            )))
        }
    }

    fn matches_pattern(candidate: &str) -> bool {
        let bytes = candidate.as_bytes();
        bytes.len() == 8
            && bytes[0].is_ascii_uppercase()
            && bytes[1..3].iter().all(u8::is_ascii_digit)
            && bytes[3] == b'-'
            && bytes[4..].iter().all(u8::is_ascii_digit)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl FromStr for StudentId {
    type Err = CirculationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        StudentId::parse(s)
    }
}

impl fmt::Display for StudentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Identifier of the already-authenticated admin performing an operation
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AdminId(pub String);

impl AdminId {
    pub fn new(id: impl Into<String>) -> Self {
        AdminId(id.into())
    }
}

impl fmt::Display for AdminId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A registered student
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Student {
    pub id: StudentId,
    pub name: String,
}

/// Cached answer to "may this student borrow right now?"
///
/// Derived from Fine and BorrowTransaction state; recomputed and upserted by
/// the borrowing-status reconciler, never edited directly.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StudentBorrowingStatus {
    pub student_id: StudentId,
    pub can_borrow: bool,
    pub reason_blocked: Option<String>,
    pub blocked_until: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

/// Semester tracking row identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SemesterId(pub u64);

impl fmt::Display for SemesterId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SemesterStatus {
    Active,
    Completed,
}

/// Per-student semester quota window
///
/// At most one row per student is `Active`. `books_borrowed_count` is
/// cumulative: it grows on every committed borrow and is never decremented by
/// returns.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SemesterTracking {
    pub id: SemesterId,
    pub student_id: StudentId,
    pub semester_start: DateTime<Utc>,
    pub semester_end: DateTime<Utc>,
    pub books_borrowed_count: u32,
    pub books_required: u32,
    pub status: SemesterStatus,
}

/// Values for a semester row about to be inserted; the store assigns the id
#[derive(Debug, Clone)]
pub struct NewSemesterTracking {
    pub student_id: StudentId,
    pub semester_start: DateTime<Utc>,
    pub semester_end: DateTime<Utc>,
    pub books_required: u32,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case::canonical("C22-0044")]
    #[case::other_letter("A01-9999")]
    #[case::surrounding_whitespace("  C22-0044 ")]
    fn test_student_id_accepts_institution_pattern(#[case] raw: &str) {
        let id = StudentId::parse(raw).unwrap();
        assert_eq!(id.as_str(), raw.trim());
    }

    #[rstest]
    #[case::empty("")]
    #[case::lowercase_letter("c22-0044")]
    #[case::missing_dash("C220044")]
    #[case::short_serial("C22-044")]
    #[case::long_serial("C22-00440")]
    #[case::letter_in_year("C2X-0044")]
    #[case::non_ascii("Ç22-0044")]
    fn test_student_id_rejects_malformed(#[case] raw: &str) {
        let err = StudentId::parse(raw).unwrap_err();
        assert!(matches!(err, CirculationError::Validation { .. }));
    }

    #[test]
    fn test_student_id_from_str() {
        let id: StudentId = "C22-0044".parse().unwrap();
        assert_eq!(id.to_string(), "C22-0044");
    }
}
