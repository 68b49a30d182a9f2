//! Eligibility checker
//!
//! Answers "may this student borrow these books right now?" without
//! committing anything to the circulation tables. Structural failures (bad
//! id, unknown student, blocked student) stop the check immediately; cap
//! violations and per-book problems are accumulated so the caller can show
//! every reason at once.
//!
//! The blocked check recomputes the student's fines and borrowing status
//! first, so a stale cached status never lets a borrow through.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashSet;

use super::borrowing_status;
use super::fine_calculator::refresh_student_fines;
use super::policy::{load_policy, Policy};
use super::traits::{LedgerTx, StoreResult};
use crate::types::{BookCopy, BookStatus, CirculationError, EntityKind, Student, StudentId};

/// Availability verdict for one requested code
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BookEligibility {
    pub code: String,
    pub book: Option<BookCopy>,
    pub valid: bool,
    pub reason: Option<String>,
}

/// Result of [`validate_borrow`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EligibilityResult {
    /// True only when `errors` is empty and every book is valid
    pub ok: bool,
    pub student: Option<Student>,
    pub books: Vec<BookEligibility>,
    pub errors: Vec<CirculationError>,
}

impl EligibilityResult {
    fn rejected(student: Option<Student>, error: CirculationError) -> Self {
        Self {
            ok: false,
            student,
            books: Vec::new(),
            errors: vec![error],
        }
    }
}

/// Check a borrow request
///
/// # Arguments
///
/// * `tx` - Unit of work; fine and status refreshes are written through it
/// * `raw_student_id` - Student identifier as typed by the admin
/// * `codes` - Requested book codes
/// * `now` - Instant used for the fine refresh
///
/// # Returns
///
/// An [`EligibilityResult`]; `Err` only for store failures
pub fn validate_borrow(
    tx: &mut dyn LedgerTx,
    raw_student_id: &str,
    codes: &[String],
    now: DateTime<Utc>,
) -> StoreResult<EligibilityResult> {
    let student_id = match StudentId::parse(raw_student_id) {
        Ok(id) => id,
        Err(e) => return Ok(EligibilityResult::rejected(None, e)),
    };
    if codes.is_empty() {
        return Ok(EligibilityResult::rejected(
            None,
            CirculationError::validation("At least one book code is required"),
        ));
    }

    let Some(student) = tx.get_student(&student_id)? else {
        return Ok(EligibilityResult::rejected(
            None,
            CirculationError::not_found(EntityKind::Student, &student_id),
        ));
    };

    refresh_student_fines(tx, &student_id, now)?;
    let status = borrowing_status::recompute(tx, &student_id, now)?;
    if !status.can_borrow {
        let reason = status
            .reason_blocked
            .unwrap_or_else(|| "Student is blocked from borrowing".to_string());
        return Ok(EligibilityResult::rejected(
            Some(student),
            CirculationError::policy_violation(reason),
        ));
    }

    let policy = load_policy(tx)?;
    let active = active_borrow_count(tx, &student_id)?;
    let mut errors = cap_violations(active, codes.len(), &policy);

    let mut books = Vec::with_capacity(codes.len());
    for code in codes {
        let code = code.trim();
        let record = match tx.get_book_by_code(code)? {
            None => BookEligibility {
                code: code.to_string(),
                book: None,
                valid: false,
                reason: Some(format!("Book {} not found", code)),
            },
            Some(book) if book.status != BookStatus::Available => BookEligibility {
                code: code.to_string(),
                reason: Some(format!("Book {} is {}", code, book.status)),
                book: Some(book),
                valid: false,
            },
            Some(book) => BookEligibility {
                code: code.to_string(),
                book: Some(book),
                valid: true,
                reason: None,
            },
        };
        books.push(record);
    }

    let duplicates = duplicate_codes(codes);
    if !duplicates.is_empty() {
        errors.push(CirculationError::conflict(format!(
            "Duplicate book code(s) in request: {}",
            duplicates.join(", ")
        )));
    }

    let ok = errors.is_empty() && books.iter().all(|b| b.valid);
    Ok(EligibilityResult {
        ok,
        student: Some(student),
        books,
        errors,
    })
}

/// Number of the student's transactions that still hold a book
pub(crate) fn active_borrow_count(tx: &dyn LedgerTx, student: &StudentId) -> StoreResult<usize> {
    Ok(tx
        .transactions_for_student(student)?
        .iter()
        .filter(|t| t.status.is_open())
        .count())
}

/// Cap checks for a request of `requested` books by a student holding `active`
pub(crate) fn cap_violations(
    active: usize,
    requested: usize,
    policy: &Policy,
) -> Vec<CirculationError> {
    let cap = policy.max_books_per_borrowing as usize;
    let mut errors = Vec::new();
    if requested > cap {
        errors.push(CirculationError::policy_violation(format!(
            "Cannot borrow {} books at once (maximum {})",
            requested, cap
        )));
    }
    if active + requested > cap {
        errors.push(CirculationError::policy_violation(format!(
            "Student already has {} active borrow(s); {} more would exceed the limit of {}",
            active, requested, cap
        )));
    }
    errors
}

/// Codes that appear more than once, in first-repeat order
pub(crate) fn duplicate_codes(codes: &[String]) -> Vec<&str> {
    let mut seen = HashSet::new();
    let mut repeated = Vec::new();
    for code in codes.iter().map(|c| c.trim()) {
        if !seen.insert(code) && !repeated.contains(&code) {
            repeated.push(code);
        }
    }
    repeated
}
