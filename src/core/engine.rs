//! Circulation engine
//!
//! This module provides the `CirculationEngine` that the HTTP layer and the
//! reconciliation loop talk to. It owns nothing but handles: every operation
//! opens one unit of work on the [`LedgerStore`], reads the time once from the
//! injected [`Clock`], and delegates to the component functions.
//!
//! The engine enforces:
//! - Student identifiers are validated before any store access
//! - Every mutation is all-or-nothing within its unit
//! - Borrowing status is recomputed whenever a return, payment or waiver
//!   could change it
//!
//! # Architecture
//!
//! ```text
//! CirculationEngine
//!     ├── Arc<S: LedgerStore>   (transactional ledger)
//!     └── Arc<dyn Clock>        (time source)
//! ```
//!
//! # Thread Safety
//!
//! The engine is cheap to clone and can be shared across threads and async
//! tasks. Consistency between concurrent requests comes from the store's
//! units of work, not from the engine.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use std::collections::BTreeMap;
use std::sync::Arc;

use super::borrowing_status;
use super::eligibility::{self, EligibilityResult};
use super::fine_calculator::{self, FineComputation, FineOutcome, ReconcileResult};
use super::payments::{self, PayAllResult, PaymentResult};
use super::policy::{self, Policy};
use super::semester;
use super::traits::{Clock, LedgerStore, StoreResult};
use super::transactor::{self, BorrowResult, ReturnResult};
use crate::types::{
    AdminId, BookCopy, BookStatus, CirculationError, EntityKind, Fine, FineId, FinePayment,
    FineStatus, PaymentMethod, SemesterTracking, SettingEntry, Student, StudentBorrowingStatus,
    StudentId, TransactionId,
};

/// Facade over the circulation components
pub struct CirculationEngine<S> {
    store: Arc<S>,
    clock: Arc<dyn Clock>,
}

impl<S> Clone for CirculationEngine<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            clock: Arc::clone(&self.clock),
        }
    }
}

impl<S: LedgerStore> CirculationEngine<S> {
    /// Create a new CirculationEngine
    ///
    /// # Arguments
    ///
    /// * `store` - Transactional ledger shared with every other handle
    /// * `clock` - Time source used for due dates and fine accrual
    pub fn new(store: Arc<S>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    // ---- catalogue ----

    /// Register a student
    pub fn add_student(&self, id: &str, name: &str) -> StoreResult<Student> {
        let student = Student {
            id: StudentId::parse(id)?,
            name: name.trim().to_string(),
        };
        self.store.transaction(|tx| {
            tx.insert_student(student.clone())?;
            Ok(student)
        })
    }

    /// Register a book copy
    pub fn add_book(&self, code: &str, title: &str, status: BookStatus) -> StoreResult<BookCopy> {
        let code = code.trim();
        if code.is_empty() {
            return Err(CirculationError::validation("Book code is required"));
        }
        self.store
            .transaction(|tx| tx.insert_book(code, title.trim(), status))
    }

    pub fn get_book(&self, code: &str) -> StoreResult<BookCopy> {
        self.store.transaction(|tx| {
            tx.get_book_by_code(code.trim())?
                .ok_or_else(|| CirculationError::not_found(EntityKind::Book, code))
        })
    }

    // ---- borrowing ----

    /// Check whether `student_id` may borrow `codes` right now
    ///
    /// Never fails for business reasons: those are reported in the result.
    /// Refreshed fines and borrowing status are persisted.
    pub fn validate_borrow(
        &self,
        student_id: &str,
        codes: &[String],
    ) -> StoreResult<EligibilityResult> {
        let now = self.clock.now();
        self.store
            .transaction(|tx| eligibility::validate_borrow(tx, student_id, codes, now))
    }

    /// Borrow every book in `codes` or none of them
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The student id is malformed or unknown
    /// - A code is unknown, duplicated, or no longer available
    /// - The request would take the student over the borrow cap
    pub fn commit_borrow(
        &self,
        student_id: &str,
        codes: &[String],
        admin: &AdminId,
        due_date: Option<DateTime<Utc>>,
    ) -> StoreResult<BorrowResult> {
        let student = StudentId::parse(student_id)?;
        let now = self.clock.now();
        self.store.transaction(|tx| {
            transactor::commit_borrow(tx, &student, codes, admin, due_date, now)
        })
    }

    /// Return every listed transaction or none of them
    pub fn commit_return(
        &self,
        transaction_ids: &[TransactionId],
        admin: &AdminId,
    ) -> StoreResult<ReturnResult> {
        let now = self.clock.now();
        self.store
            .transaction(|tx| transactor::commit_return(tx, transaction_ids, admin, now))
    }

    // ---- fines ----

    /// Fine owed on a transaction at the current time, without persisting it
    pub fn compute_fine(&self, transaction_id: TransactionId) -> StoreResult<FineComputation> {
        let now = self.clock.now();
        self.store.transaction(|tx| {
            let transaction = tx.get_transaction(transaction_id)?.ok_or_else(|| {
                CirculationError::not_found(EntityKind::Transaction, transaction_id)
            })?;
            let policy = policy::load_policy(tx)?;
            fine_calculator::compute(&transaction, policy.fine_per_day, now)
        })
    }

    /// Create or grow the fine for one transaction and refresh its student
    pub fn upsert_fine(&self, transaction_id: TransactionId) -> StoreResult<FineOutcome> {
        let now = self.clock.now();
        self.store.transaction(|tx| {
            let outcome = fine_calculator::upsert_fine(tx, transaction_id, now)?;
            if let Some(transaction) = tx.get_transaction(transaction_id)? {
                borrowing_status::recompute(tx, &transaction.student_id, now)?;
            }
            Ok(outcome)
        })
    }

    /// One reconciliation pass over every open, past-due transaction
    ///
    /// Each transaction is reconciled in its own unit; failures are reported
    /// per row and never abort the pass.
    pub fn process_all_overdue(&self) -> StoreResult<Vec<ReconcileResult>> {
        fine_calculator::process_all_overdue(self.store.as_ref(), self.clock.now())
    }

    /// Fines of a student, newest first
    ///
    /// # Arguments
    ///
    /// * `student_id` - Student whose fines are listed
    /// * `status` - Only return fines in this status
    /// * `recalculate` - Refresh the student's fines before reading them
    pub fn get_fines(
        &self,
        student_id: &str,
        status: Option<FineStatus>,
        recalculate: bool,
    ) -> StoreResult<Vec<Fine>> {
        let student = StudentId::parse(student_id)?;
        let now = self.clock.now();
        self.store.transaction(|tx| {
            if tx.get_student(&student)?.is_none() {
                return Err(CirculationError::not_found(EntityKind::Student, &student));
            }
            if recalculate {
                fine_calculator::refresh_student_fines(tx, &student, now)?;
                borrowing_status::recompute(tx, &student, now)?;
            }
            let mut fines: Vec<Fine> = tx
                .fines_for_student(&student)?
                .into_iter()
                .filter(|f| status.map_or(true, |s| f.status == s))
                .collect();
            fines.sort_by(|a, b| b.fine_date.cmp(&a.fine_date).then_with(|| b.id.cmp(&a.id)));
            Ok(fines)
        })
    }

    pub fn pay_fine(
        &self,
        fine_id: FineId,
        amount: Decimal,
        method: PaymentMethod,
        admin: &AdminId,
        notes: Option<String>,
    ) -> StoreResult<PaymentResult> {
        let now = self.clock.now();
        self.store.transaction(|tx| {
            payments::pay_fine(tx, fine_id, amount, method, admin, notes, now)
        })
    }

    pub fn pay_all_unpaid(&self, student_id: &str, admin: &AdminId) -> StoreResult<PayAllResult> {
        let student = StudentId::parse(student_id)?;
        let now = self.clock.now();
        self.store
            .transaction(|tx| payments::pay_all_unpaid(tx, &student, admin, now))
    }

    pub fn waive_fine(&self, fine_id: FineId, admin: &AdminId, reason: &str) -> StoreResult<Fine> {
        let now = self.clock.now();
        self.store
            .transaction(|tx| payments::waive_fine(tx, fine_id, admin, reason, now))
    }

    pub fn payment_history(&self, fine_id: FineId) -> StoreResult<Vec<FinePayment>> {
        self.store
            .transaction(|tx| payments::payment_history(tx, fine_id))
    }

    // ---- student status ----

    /// Freshly recomputed borrowing status
    pub fn get_borrowing_status(&self, student_id: &str) -> StoreResult<StudentBorrowingStatus> {
        let student = StudentId::parse(student_id)?;
        let now = self.clock.now();
        self.store.transaction(|tx| {
            if tx.get_student(&student)?.is_none() {
                return Err(CirculationError::not_found(EntityKind::Student, &student));
            }
            borrowing_status::recompute(tx, &student, now)
        })
    }

    pub fn get_semester_tracking(&self, student_id: &str) -> StoreResult<Vec<SemesterTracking>> {
        let student = StudentId::parse(student_id)?;
        self.store
            .transaction(|tx| semester::get_semester_tracking(tx, &student))
    }

    /// Rebuild every active semester's count from transaction history
    pub fn recalculate_semester_counts(&self) -> StoreResult<usize> {
        self.store
            .transaction(|tx| semester::recalculate_semester_counts(tx))
    }

    // ---- settings ----

    pub fn update_setting(
        &self,
        key: &str,
        value: &str,
        admin: &AdminId,
    ) -> StoreResult<SettingEntry> {
        let now = self.clock.now();
        self.store
            .transaction(|tx| policy::set_setting(tx, key, value, admin, now))
    }

    pub fn get_settings(&self) -> StoreResult<BTreeMap<String, String>> {
        self.store.transaction(|tx| policy::get_settings(tx))
    }

    /// Typed policy with defaults applied
    pub fn policy(&self) -> StoreResult<Policy> {
        self.store.transaction(|tx| policy::load_policy(tx))
    }
}
