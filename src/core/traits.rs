//! Core traits for the ledger store and the time source
//!
//! The engine never talks to a concrete database. Every unit of work is a
//! closure handed to [`LedgerStore::transaction`], which receives a
//! [`LedgerTx`] exposing row-level reads and writes. Whatever the closure
//! writes becomes visible only if it returns `Ok`; an `Err` rolls the whole
//! unit back. Relational adapters map this onto `BEGIN`/`COMMIT`/`ROLLBACK`
//! with `SELECT ... FOR UPDATE` on the rows they re-read; the in-memory
//! [`MemoryLedger`](crate::core::MemoryLedger) serializes units instead.

use chrono::{DateTime, Utc};

use crate::types::{
    BookCopy, BookId, BookStatus, BorrowTransaction, CirculationError, Fine, FineId, FinePayment,
    NewBorrowTransaction, NewFine, NewFinePayment, NewSemesterTracking, SemesterTracking,
    SettingEntry, Student, StudentBorrowingStatus, StudentId, TransactionId,
};

/// Result alias used by every store operation
pub type StoreResult<T> = Result<T, CirculationError>;

/// Row-level operations available inside one store transaction
///
/// Reads observe the transaction's own uncommitted writes.
pub trait LedgerTx {
    // ---- students ----

    fn get_student(&self, id: &StudentId) -> StoreResult<Option<Student>>;

    fn insert_student(&mut self, student: Student) -> StoreResult<()>;

    // ---- books ----

    fn get_book(&self, id: BookId) -> StoreResult<Option<BookCopy>>;

    fn get_book_by_code(&self, code: &str) -> StoreResult<Option<BookCopy>>;

    /// Insert a copy; codes are unique
    fn insert_book(&mut self, code: &str, title: &str, status: BookStatus)
        -> StoreResult<BookCopy>;

    fn set_book_status(&mut self, id: BookId, status: BookStatus) -> StoreResult<()>;

    // ---- borrow transactions ----

    fn insert_transaction(&mut self, new: NewBorrowTransaction) -> StoreResult<BorrowTransaction>;

    fn get_transaction(&self, id: TransactionId) -> StoreResult<Option<BorrowTransaction>>;

    fn update_transaction(&mut self, transaction: &BorrowTransaction) -> StoreResult<()>;

    fn transactions_for_student(&self, student: &StudentId) -> StoreResult<Vec<BorrowTransaction>>;

    /// Every transaction that is not returned and whose due date is before `now`
    fn open_transactions_due_before(&self, now: DateTime<Utc>)
        -> StoreResult<Vec<BorrowTransaction>>;

    // ---- fines ----

    fn get_fine(&self, id: FineId) -> StoreResult<Option<Fine>>;

    fn fine_for_transaction(&self, transaction: TransactionId) -> StoreResult<Option<Fine>>;

    /// Insert a fine; at most one fine may exist per transaction
    fn insert_fine(&mut self, new: NewFine) -> StoreResult<Fine>;

    fn update_fine(&mut self, fine: &Fine) -> StoreResult<()>;

    fn fines_for_student(&self, student: &StudentId) -> StoreResult<Vec<Fine>>;

    // ---- fine payments (append-only) ----

    fn insert_payment(&mut self, new: NewFinePayment) -> StoreResult<FinePayment>;

    fn payments_for_fine(&self, fine: FineId) -> StoreResult<Vec<FinePayment>>;

    // ---- borrowing status cache ----

    fn get_borrowing_status(&self, student: &StudentId)
        -> StoreResult<Option<StudentBorrowingStatus>>;

    fn upsert_borrowing_status(&mut self, status: StudentBorrowingStatus) -> StoreResult<()>;

    // ---- semester tracking ----

    fn active_semester(&self, student: &StudentId) -> StoreResult<Option<SemesterTracking>>;

    fn active_semesters(&self) -> StoreResult<Vec<SemesterTracking>>;

    fn semesters_for_student(&self, student: &StudentId) -> StoreResult<Vec<SemesterTracking>>;

    fn insert_semester(&mut self, new: NewSemesterTracking) -> StoreResult<SemesterTracking>;

    fn update_semester(&mut self, semester: &SemesterTracking) -> StoreResult<()>;

    // ---- settings ----

    fn settings(&self) -> StoreResult<Vec<SettingEntry>>;

    fn put_setting(&mut self, entry: SettingEntry) -> StoreResult<()>;
}

/// Handle to the transactional ledger
///
/// Passed explicitly to the engine so tests can substitute their own store.
pub trait LedgerStore: Send + Sync {
    /// Run `f` as one atomic unit of work
    ///
    /// All writes made through the provided [`LedgerTx`] are applied together
    /// when `f` returns `Ok`, and discarded when it returns `Err` or panics.
    fn transaction<T, F>(&self, f: F) -> StoreResult<T>
    where
        F: FnOnce(&mut dyn LedgerTx) -> StoreResult<T>;
}

/// Source of the current time
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}
