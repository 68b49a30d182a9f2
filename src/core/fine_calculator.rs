//! Fine calculator
//!
//! Overdue fines are accrued by a single upsert, [`upsert_fine`], shared by
//! every path that needs a fresh figure: the background reconciliation pass,
//! `get_fines(recalculate = true)`, eligibility checks and `pay_all_unpaid`.
//!
//! # Accrual Rules
//!
//! - A transaction that is returned, or not yet past its due date, accrues
//!   nothing and is left alone.
//! - Days overdue are the elapsed time since the due date rounded **up** to
//!   whole days, so one minute late is one day late.
//! - An existing unpaid fine only ever grows. A paid or waived fine is final.
//! - At a fixed `now` the upsert is idempotent.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use tracing::{debug, warn};

use super::borrowing_status;
use super::policy::load_policy;
use super::traits::{LedgerStore, LedgerTx, StoreResult};
use crate::types::{
    BorrowTransaction, CirculationError, EntityKind, FineId, FineStatus, NewFine, StudentId,
    TransactionId, TransactionStatus,
};

const MS_PER_DAY: i64 = 86_400_000;

/// Fine figures for one transaction at one instant
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct FineComputation {
    pub fine_amount: Decimal,
    pub days_overdue: u32,
}

impl FineComputation {
    pub const NONE: FineComputation = FineComputation {
        fine_amount: Decimal::ZERO,
        days_overdue: 0,
    };
}

/// What [`upsert_fine`] did to the fine row
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum FineOutcome {
    /// Nothing owed; no row was written
    NotOverdue,
    Created {
        fine_id: FineId,
        fine_amount: Decimal,
        days_overdue: u32,
    },
    Updated {
        fine_id: FineId,
        previous_amount: Decimal,
        fine_amount: Decimal,
        days_overdue: u32,
    },
    /// Row exists and is already current, paid or waived
    Unchanged { fine_id: FineId },
}

/// Outcome of reconciling one overdue transaction
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReconcileResult {
    pub transaction_id: TransactionId,
    pub student_id: StudentId,
    pub outcome: Result<FineOutcome, CirculationError>,
}

/// Compute the fine owed on `transaction` at `now`
///
/// # Arguments
///
/// * `transaction` - The borrow transaction to price
/// * `fine_per_day` - Policy rate applied per started day
/// * `now` - Instant to evaluate at
///
/// # Returns
///
/// [`FineComputation::NONE`] when the transaction is returned or not past due
///
/// # Errors
///
/// Returns a PolicyViolation error if the amount does not fit a `Decimal`.
pub fn compute(
    transaction: &BorrowTransaction,
    fine_per_day: Decimal,
    now: DateTime<Utc>,
) -> StoreResult<FineComputation> {
    if !transaction.status.is_open()
        || transaction.returned_at.is_some()
        || transaction.due_date >= now
    {
        return Ok(FineComputation::NONE);
    }

    let overdue_ms = (now - transaction.due_date).num_milliseconds();
    let days = (overdue_ms + MS_PER_DAY - 1) / MS_PER_DAY;
    let days_overdue = u32::try_from(days).unwrap_or(u32::MAX);

    let fine_amount = fine_per_day
        .checked_mul(Decimal::from(days_overdue))
        .ok_or_else(|| {
            CirculationError::policy_violation(format!(
                "Fine for transaction {} overflows ({} days at {} per day)",
                transaction.id, days_overdue, fine_per_day
            ))
        })?;

    Ok(FineComputation {
        fine_amount,
        days_overdue,
    })
}

/// Create or grow the fine for one transaction inside the caller's unit
///
/// Also flips a `borrowed` transaction to `overdue` the first time a
/// nonzero fine is detected.
pub fn upsert_fine(
    tx: &mut dyn LedgerTx,
    transaction_id: TransactionId,
    now: DateTime<Utc>,
) -> StoreResult<FineOutcome> {
    let mut transaction = tx
        .get_transaction(transaction_id)?
        .ok_or_else(|| CirculationError::not_found(EntityKind::Transaction, transaction_id))?;
    let policy = load_policy(tx)?;

    let computed = compute(&transaction, policy.fine_per_day, now)?;
    if computed.fine_amount.is_zero() {
        return Ok(FineOutcome::NotOverdue);
    }

    if transaction.status == TransactionStatus::Borrowed {
        transaction.status = TransactionStatus::Overdue;
        tx.update_transaction(&transaction)?;
    }

    let outcome = match tx.fine_for_transaction(transaction_id)? {
        None => {
            let fine = tx.insert_fine(NewFine {
                student_id: transaction.student_id.clone(),
                transaction_id,
                fine_amount: computed.fine_amount,
                days_overdue: computed.days_overdue,
                fine_date: now.date_naive(),
            })?;
            FineOutcome::Created {
                fine_id: fine.id,
                fine_amount: fine.fine_amount,
                days_overdue: fine.days_overdue,
            }
        }
        Some(mut fine) if fine.status == FineStatus::Unpaid => {
            let grew = computed.fine_amount > fine.fine_amount
                || computed.days_overdue > fine.days_overdue;
            if grew {
                let previous_amount = fine.fine_amount;
                fine.fine_amount = fine.fine_amount.max(computed.fine_amount);
                fine.days_overdue = fine.days_overdue.max(computed.days_overdue);
                tx.update_fine(&fine)?;
                FineOutcome::Updated {
                    fine_id: fine.id,
                    previous_amount,
                    fine_amount: fine.fine_amount,
                    days_overdue: fine.days_overdue,
                }
            } else {
                FineOutcome::Unchanged { fine_id: fine.id }
            }
        }
        Some(fine) => FineOutcome::Unchanged { fine_id: fine.id },
    };

    debug!(
        transaction = %transaction_id,
        student = %transaction.student_id,
        ?outcome,
        "Fine reconciled"
    );
    Ok(outcome)
}

/// Upsert fines for every open, past-due transaction of one student
///
/// Runs inside the caller's unit, so a failure rolls back the caller too.
pub fn refresh_student_fines(
    tx: &mut dyn LedgerTx,
    student: &StudentId,
    now: DateTime<Utc>,
) -> StoreResult<Vec<FineOutcome>> {
    let due: Vec<TransactionId> = tx
        .transactions_for_student(student)?
        .into_iter()
        .filter(|t| t.status.is_open() && t.due_date < now)
        .map(|t| t.id)
        .collect();

    due.into_iter()
        .map(|id| upsert_fine(tx, id, now))
        .collect()
}

/// Reconcile every open, past-due transaction in the ledger
///
/// Each transaction is reconciled in its own store unit together with its
/// student's borrowing status, so one failing row is rolled back alone and
/// reported in its [`ReconcileResult`] while the rest commit. Only a failure
/// to list the candidates fails the whole call.
pub fn process_all_overdue<S: LedgerStore>(
    store: &S,
    now: DateTime<Utc>,
) -> StoreResult<Vec<ReconcileResult>> {
    let candidates = store.transaction(|tx| tx.open_transactions_due_before(now))?;

    let results = candidates
        .into_iter()
        .map(|candidate| {
            let outcome = store.transaction(|tx| {
                let outcome = upsert_fine(tx, candidate.id, now)?;
                borrowing_status::recompute(tx, &candidate.student_id, now)?;
                Ok(outcome)
            });
            if let Err(e) = &outcome {
                warn!(
                    transaction = %candidate.id,
                    student = %candidate.student_id,
                    error = %e,
                    "Failed to reconcile overdue transaction"
                );
            }
            ReconcileResult {
                transaction_id: candidate.id,
                student_id: candidate.student_id,
                outcome,
            }
        })
        .collect();

    Ok(results)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{set_setting, MemoryLedger};
    use crate::types::{AdminId, BookId, NewBorrowTransaction};
    use chrono::{Duration, TimeZone};
    use rstest::rstest;
    use rust_decimal_macros::dec;

    fn due() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 8, 8, 0, 0).unwrap()
    }

    fn transaction(status: TransactionStatus) -> BorrowTransaction {
        BorrowTransaction {
            id: TransactionId(1),
            student_id: StudentId::parse("C22-0044").unwrap(),
            book_id: BookId(1),
            borrowed_at: due() - Duration::days(7),
            due_date: due(),
            returned_at: None,
            status,
            borrowed_by: AdminId::new("admin-1"),
            returned_by: None,
        }
    }

    #[rstest]
    #[case::before_due(-Duration::hours(1), 0)]
    #[case::exactly_due(Duration::zero(), 0)]
    #[case::one_minute_late(Duration::minutes(1), 1)]
    #[case::exactly_one_day(Duration::days(1), 1)]
    #[case::one_day_and_a_second(Duration::days(1) + Duration::seconds(1), 2)]
    #[case::two_days(Duration::days(2), 2)]
    fn test_days_round_up(#[case] elapsed: Duration, #[case] expected_days: u32) {
        let computed =
            compute(&transaction(TransactionStatus::Borrowed), dec!(5), due() + elapsed).unwrap();
        assert_eq!(computed.days_overdue, expected_days);
        assert_eq!(computed.fine_amount, dec!(5) * Decimal::from(expected_days));
    }

    #[test]
    fn test_returned_transaction_accrues_nothing() {
        let mut returned = transaction(TransactionStatus::Borrowed);
        returned.mark_returned(due() + Duration::days(1), &AdminId::new("admin-1"));
        let computed = compute(&returned, dec!(5), due() + Duration::days(10)).unwrap();
        assert_eq!(computed, FineComputation::NONE);
    }

    #[test]
    fn test_overflowing_amount_is_an_error() {
        let late = due() + Duration::days(9);
        let err = compute(&transaction(TransactionStatus::Borrowed), Decimal::MAX, late)
            .unwrap_err();
        assert_eq!(err.kind(), crate::types::ErrorKind::PolicyViolation);
    }

    fn seed_overdue(ledger: &MemoryLedger) -> TransactionId {
        ledger
            .transaction(|tx| {
                tx.insert_transaction(NewBorrowTransaction {
                    student_id: StudentId::parse("C22-0044")?,
                    book_id: BookId(1),
                    borrowed_at: due() - Duration::days(7),
                    due_date: due(),
                    borrowed_by: AdminId::new("admin-1"),
                })
            })
            .unwrap()
            .id
    }

    #[test]
    fn test_upsert_creates_then_grows_then_is_idempotent() {
        let ledger = MemoryLedger::new();
        let id = seed_overdue(&ledger);
        let day2 = due() + Duration::days(2);

        let created = ledger.transaction(|tx| upsert_fine(tx, id, day2)).unwrap();
        assert!(matches!(
            created,
            FineOutcome::Created { fine_amount, days_overdue: 2, .. } if fine_amount == dec!(10)
        ));

        let again = ledger.transaction(|tx| upsert_fine(tx, id, day2)).unwrap();
        assert!(matches!(again, FineOutcome::Unchanged { .. }));

        let day3 = due() + Duration::days(3);
        let grown = ledger.transaction(|tx| upsert_fine(tx, id, day3)).unwrap();
        assert!(matches!(
            grown,
            FineOutcome::Updated { previous_amount, fine_amount, days_overdue: 3, .. }
                if previous_amount == dec!(10) && fine_amount == dec!(15)
        ));

        let (transaction, fine) = ledger
            .transaction(|tx| Ok((tx.get_transaction(id)?, tx.fine_for_transaction(id)?)))
            .unwrap();
        assert_eq!(transaction.unwrap().status, TransactionStatus::Overdue);
        let fine = fine.unwrap();
        assert_eq!(fine.fine_amount, dec!(15));
        assert_eq!(fine.fine_date, day2.date_naive());
    }

    #[test]
    fn test_lower_rate_never_shrinks_existing_fine() {
        let ledger = MemoryLedger::new();
        let id = seed_overdue(&ledger);
        let day4 = due() + Duration::days(4);
        ledger.transaction(|tx| upsert_fine(tx, id, day4)).unwrap();

        ledger
            .transaction(|tx| set_setting(tx, "fine_per_day", "1", &AdminId::new("a"), day4))
            .unwrap();
        let outcome = ledger.transaction(|tx| upsert_fine(tx, id, day4)).unwrap();
        assert!(matches!(outcome, FineOutcome::Unchanged { .. }));

        let fine = ledger
            .transaction(|tx| tx.fine_for_transaction(id))
            .unwrap()
            .unwrap();
        assert_eq!(fine.fine_amount, dec!(20));
    }

    #[test]
    fn test_waived_fine_is_left_alone() {
        let ledger = MemoryLedger::new();
        let id = seed_overdue(&ledger);
        ledger
            .transaction(|tx| upsert_fine(tx, id, due() + Duration::days(1)))
            .unwrap();
        ledger
            .transaction(|tx| {
                let mut fine = tx
                    .fine_for_transaction(id)?
                    .ok_or_else(|| CirculationError::store("missing"))?;
                fine.status = FineStatus::Waived;
                tx.update_fine(&fine)
            })
            .unwrap();

        let outcome = ledger
            .transaction(|tx| upsert_fine(tx, id, due() + Duration::days(6)))
            .unwrap();
        assert!(matches!(outcome, FineOutcome::Unchanged { .. }));
    }

    #[test]
    fn test_zero_rate_writes_nothing() {
        let ledger = MemoryLedger::new();
        let id = seed_overdue(&ledger);
        let later = due() + Duration::days(3);
        ledger
            .transaction(|tx| set_setting(tx, "fine_per_day", "0", &AdminId::new("a"), later))
            .unwrap();

        let outcome = ledger.transaction(|tx| upsert_fine(tx, id, later)).unwrap();
        assert_eq!(outcome, FineOutcome::NotOverdue);
        let (transaction, fine) = ledger
            .transaction(|tx| Ok((tx.get_transaction(id)?, tx.fine_for_transaction(id)?)))
            .unwrap();
        assert_eq!(transaction.unwrap().status, TransactionStatus::Borrowed);
        assert!(fine.is_none());
    }

    #[test]
    fn test_process_all_overdue_isolates_failures() {
        let ledger = MemoryLedger::new();
        let first = seed_overdue(&ledger);
        let second = seed_overdue(&ledger);
        ledger.fail_fine_writes_for(first);

        let results = process_all_overdue(&ledger, due() + Duration::days(2)).unwrap();
        assert_eq!(results.len(), 2);
        assert!(matches!(results[0].outcome, Err(CirculationError::Store { .. })));
        assert!(matches!(results[1].outcome, Ok(FineOutcome::Created { .. })));

        // The failed row rolled back entirely, including the status flip
        let (failed, succeeded) = ledger
            .transaction(|tx| Ok((tx.get_transaction(first)?, tx.get_transaction(second)?)))
            .unwrap();
        assert_eq!(failed.unwrap().status, TransactionStatus::Borrowed);
        assert_eq!(succeeded.unwrap().status, TransactionStatus::Overdue);
    }

    #[test]
    fn test_out_of_range_rate_does_not_abort_the_batch() {
        let ledger = MemoryLedger::new();
        seed_overdue(&ledger);
        seed_overdue(&ledger);
        let day2 = due() + Duration::days(2);
        ledger
            .transaction(|tx| {
                let max = Decimal::MAX.to_string();
                set_setting(tx, "fine_per_day", &max, &AdminId::new("a"), day2)
            })
            .unwrap();

        let results = process_all_overdue(&ledger, day2).unwrap();
        assert_eq!(results.len(), 2);
        for result in &results {
            assert!(matches!(
                result.outcome,
                Ok(FineOutcome::Created { fine_amount, .. }) if fine_amount == dec!(10)
            ));
        }
    }

    #[test]
    fn test_process_all_overdue_with_nothing_due_is_a_no_op() {
        let ledger = MemoryLedger::new();
        seed_overdue(&ledger);
        let results = process_all_overdue(&ledger, due() - Duration::hours(1)).unwrap();
        assert!(results.is_empty());
    }
}
