//! Borrowing-status reconciler
//!
//! Derives whether a student may borrow from the fines and transactions
//! currently in the ledger, and persists the answer. The persisted row is a
//! cache: this function is the source of truth and runs after every return,
//! payment and waiver, and on every status read.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use tracing::debug;

use super::traits::{LedgerTx, StoreResult};
use crate::types::{FineStatus, StudentBorrowingStatus, StudentId, TransactionStatus};

/// Recompute and upsert the borrowing status of `student`
///
/// Blocked when the student has any unpaid fine or any overdue transaction.
/// When both hold, the unpaid fines are the reported reason.
pub fn recompute(
    tx: &mut dyn LedgerTx,
    student: &StudentId,
    now: DateTime<Utc>,
) -> StoreResult<StudentBorrowingStatus> {
    let unpaid: Vec<_> = tx
        .fines_for_student(student)?
        .into_iter()
        .filter(|f| f.status == FineStatus::Unpaid)
        .collect();
    let overdue_count = tx
        .transactions_for_student(student)?
        .iter()
        .filter(|t| t.status == TransactionStatus::Overdue)
        .count();

    let reason_blocked = if !unpaid.is_empty() {
        let total: Decimal = unpaid.iter().map(|f| f.outstanding()).sum();
        Some(format!(
            "Student has {} unpaid fine(s) totalling {}",
            unpaid.len(),
            total
        ))
    } else if overdue_count > 0 {
        Some(format!("Student has {} overdue book(s)", overdue_count))
    } else {
        None
    };

    let status = StudentBorrowingStatus {
        student_id: student.clone(),
        can_borrow: reason_blocked.is_none(),
        reason_blocked,
        blocked_until: None,
        updated_at: now,
    };
    tx.upsert_borrowing_status(status.clone())?;

    debug!(
        student = %student,
        can_borrow = status.can_borrow,
        "Borrowing status recomputed"
    );
    Ok(status)
}
