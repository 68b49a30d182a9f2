//! Property-based tests for fine accrual, payments and the borrow cap.
//!
//! These tests verify invariants that should hold for any sequence of
//! clock movements, payments and borrow requests.

use chrono::{DateTime, Duration, TimeZone, Utc};
use library_circulation::core::{compute, FineOutcome, ManualClock, MemoryLedger};
use library_circulation::types::{
    AdminId, BookId, BookStatus, BorrowTransaction, FineStatus, PaymentMethod, StudentId,
    TransactionId, TransactionStatus,
};
use library_circulation::{CirculationEngine, LedgerStore};
use proptest::prelude::*;
use rust_decimal::Decimal;
use std::sync::Arc;

// =============================================================================
// Fixtures
// =============================================================================

fn start() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 1, 8, 0, 0).unwrap()
}

fn admin() -> AdminId {
    AdminId::new("admin-1")
}

fn transaction(due_in_minutes: i64) -> BorrowTransaction {
    BorrowTransaction {
        id: TransactionId(1),
        student_id: StudentId::parse("C22-0044").unwrap(),
        book_id: BookId(1),
        borrowed_at: start(),
        due_date: start() + Duration::minutes(due_in_minutes),
        returned_at: None,
        status: TransactionStatus::Borrowed,
        borrowed_by: admin(),
        returned_by: None,
    }
}

/// One student holding one book due seven days after `start()`
fn single_loan() -> (CirculationEngine<MemoryLedger>, Arc<ManualClock>, TransactionId) {
    let clock = Arc::new(ManualClock::new(start()));
    let engine = CirculationEngine::new(Arc::new(MemoryLedger::new()), clock.clone());
    engine.add_student("C22-0044", "Ana Cruz").unwrap();
    engine
        .add_book("BK-0001", "Title", BookStatus::Available)
        .unwrap();
    let borrowed = engine
        .commit_borrow("C22-0044", &["BK-0001".to_string()], &admin(), None)
        .unwrap();
    (engine, clock, borrowed.transaction_ids[0])
}

// =============================================================================
// Arbitrary Strategies
// =============================================================================

/// Clock step between 1 minute and 3 days
fn arb_step() -> impl Strategy<Value = i64> {
    1i64..=3 * 24 * 60
}

/// Payment amount between 0.01 and 20.00
fn arb_payment() -> impl Strategy<Value = Decimal> {
    (1i64..=2_000i64).prop_map(|cents| Decimal::new(cents, 2))
}

#[derive(Debug, Clone)]
enum Op {
    Borrow(Vec<usize>),
    Return(usize),
}

fn arb_op() -> impl Strategy<Value = Op> {
    prop_oneof![
        prop::collection::vec(0usize..8, 1..=4).prop_map(Op::Borrow),
        (0usize..8).prop_map(Op::Return),
    ]
}

// =============================================================================
// Fine Accrual
// =============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(500))]

    /// The computed fine never shrinks as time moves forward.
    #[test]
    fn computed_fine_is_monotonic_in_time(
        due_in in 0i64..20_000,
        first in 0i64..40_000,
        later in 0i64..40_000,
    ) {
        let transaction = transaction(due_in);
        let rate = Decimal::new(5, 0);
        let earlier_at = start() + Duration::minutes(first);
        let later_at = earlier_at + Duration::minutes(later);

        let earlier = compute(&transaction, rate, earlier_at).unwrap();
        let after = compute(&transaction, rate, later_at).unwrap();
        prop_assert!(after.fine_amount >= earlier.fine_amount);
        prop_assert!(after.days_overdue >= earlier.days_overdue);
        prop_assert_eq!(after.fine_amount, rate * Decimal::from(after.days_overdue));
    }

    /// Any time past the due date is at least one full day late.
    #[test]
    fn late_by_any_amount_is_at_least_one_day(late_by in 1i64..(10 * 24 * 60 * 60)) {
        let transaction = transaction(0);
        let computed = compute(
            &transaction,
            Decimal::new(5, 0),
            transaction.due_date + Duration::seconds(late_by),
        )
        .unwrap();
        let whole_days = u32::try_from((late_by + 86_399) / 86_400).unwrap();
        prop_assert_eq!(computed.days_overdue, whole_days);
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    /// Repeated upserts along a moving clock keep a single, growing fine,
    /// and a second upsert at the same instant is always a no-op.
    #[test]
    fn stored_fine_only_grows_and_upsert_is_idempotent(
        steps in prop::collection::vec(arb_step(), 1..12),
    ) {
        let (engine, clock, id) = single_loan();
        clock.advance(Duration::days(7));
        let mut last = Decimal::ZERO;

        for step in steps {
            clock.advance(Duration::minutes(step));
            engine.upsert_fine(id).unwrap();
            let repeat = engine.upsert_fine(id).unwrap();
            let unchanged = matches!(repeat, FineOutcome::Unchanged { .. });
            prop_assert!(unchanged);

            let fines = engine.get_fines("C22-0044", None, false).unwrap();
            prop_assert_eq!(fines.len(), 1);
            prop_assert!(fines[0].fine_amount >= last);
            last = fines[0].fine_amount;
        }
    }

    /// Paid amount never exceeds the fine, and the fine is paid exactly when
    /// the two are equal.
    #[test]
    fn payments_never_exceed_the_fine(
        payments in prop::collection::vec(arb_payment(), 1..8),
    ) {
        let (engine, clock, id) = single_loan();
        clock.advance(Duration::days(10));
        engine.upsert_fine(id).unwrap();
        let fine_id = engine.get_fines("C22-0044", None, false).unwrap()[0].id;

        for amount in payments {
            let _ = engine.pay_fine(fine_id, amount, PaymentMethod::Cash, &admin(), None);

            let fines = engine.get_fines("C22-0044", None, false).unwrap();
            let fine = &fines[0];
            prop_assert!(fine.paid_amount <= fine.fine_amount);
            prop_assert_eq!(
                fine.status == FineStatus::Paid,
                fine.paid_amount == fine.fine_amount
            );
            let history: Decimal = engine
                .payment_history(fine_id)
                .unwrap()
                .iter()
                .map(|p| p.amount)
                .sum();
            prop_assert_eq!(history, fine.paid_amount);
        }
    }

    /// No sequence of borrows and returns leaves a student above the cap.
    #[test]
    fn open_loans_never_exceed_the_cap(ops in prop::collection::vec(arb_op(), 1..20)) {
        let clock = Arc::new(ManualClock::new(start()));
        let engine = CirculationEngine::new(Arc::new(MemoryLedger::new()), clock);
        engine.add_student("C22-0044", "Ana Cruz").unwrap();
        let codes: Vec<String> = (0..8).map(|n| format!("BK-{:04}", n)).collect();
        for code in &codes {
            engine.add_book(code, "Title", BookStatus::Available).unwrap();
        }
        let cap = engine.policy().unwrap().max_books_per_borrowing as usize;
        let student = StudentId::parse("C22-0044").unwrap();

        for op in ops {
            let open: Vec<BorrowTransaction> = engine
                .store()
                .transaction(|tx| tx.transactions_for_student(&student))
                .unwrap()
                .into_iter()
                .filter(|t| t.status.is_open())
                .collect();

            match op {
                Op::Borrow(picks) => {
                    let requested: Vec<String> =
                        picks.iter().map(|&n| codes[n].clone()).collect();
                    let _ = engine.commit_borrow("C22-0044", &requested, &admin(), None);
                }
                Op::Return(n) => {
                    if let Some(t) = open.get(n % open.len().max(1)) {
                        engine.commit_return(&[t.id], &admin()).unwrap();
                    }
                }
            }

            let open_after = engine
                .store()
                .transaction(|tx| tx.transactions_for_student(&student))
                .unwrap()
                .into_iter()
                .filter(|t| t.status.is_open())
                .count();
            prop_assert!(open_after <= cap);

            let borrowed_books = codes
                .iter()
                .filter(|c| engine.get_book(c).unwrap().status == BookStatus::Borrowed)
                .count();
            prop_assert_eq!(borrowed_books, open_after);
        }
    }
}
