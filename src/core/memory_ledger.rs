//! In-memory ledger store
//!
//! This module provides `MemoryLedger`, a [`LedgerStore`] that keeps every
//! table in process memory. It backs the test suite, the benches and the CLI.
//!
//! # Transactions
//!
//! A unit of work locks the committed tables, stages its writes on a private
//! copy, and swaps the copy in only when the closure returns `Ok`. Units are
//! therefore fully serialized: a second borrow of the same copy always sees
//! the first one's committed `borrowed` status when it re-reads the row.
//!
//! # Fault Injection
//!
//! [`MemoryLedger::fail_fine_writes_for`] makes fine writes for a given
//! transaction fail with a store error, so callers can exercise rollback and
//! per-row isolation.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rust_decimal::Decimal;
use std::collections::{BTreeMap, HashMap, HashSet};

use super::traits::{LedgerStore, LedgerTx, StoreResult};
use crate::types::{
    BookCopy, BookId, BookStatus, BorrowTransaction, CirculationError, EntityKind, Fine, FineId,
    FinePayment, FineStatus, NewBorrowTransaction, NewFine, NewFinePayment, NewSemesterTracking,
    PaymentId, SemesterId, SemesterStatus, SemesterTracking, SettingEntry, Student,
    StudentBorrowingStatus, StudentId, TransactionId, TransactionStatus,
};

/// Every table plus the id sequences
#[derive(Debug, Clone, Default)]
struct Tables {
    students: BTreeMap<StudentId, Student>,
    books: BTreeMap<BookId, BookCopy>,
    book_codes: HashMap<String, BookId>,
    transactions: BTreeMap<TransactionId, BorrowTransaction>,
    fines: BTreeMap<FineId, Fine>,
    fine_by_transaction: HashMap<TransactionId, FineId>,
    payments: BTreeMap<PaymentId, FinePayment>,
    borrowing_status: HashMap<StudentId, StudentBorrowingStatus>,
    semesters: BTreeMap<SemesterId, SemesterTracking>,
    settings: BTreeMap<String, SettingEntry>,
    next_book_id: u32,
    next_transaction_id: u64,
    next_fine_id: u64,
    next_payment_id: u64,
    next_semester_id: u64,
}

/// In-memory transactional ledger
#[derive(Debug, Default)]
pub struct MemoryLedger {
    tables: Mutex<Tables>,
    failing_fine_writes: Mutex<HashSet<TransactionId>>,
}

impl MemoryLedger {
    /// Create an empty ledger
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every fine insert/update for `transaction` fail with a store error
    pub fn fail_fine_writes_for(&self, transaction: TransactionId) {
        self.failing_fine_writes.lock().insert(transaction);
    }

    /// Undo [`fail_fine_writes_for`](Self::fail_fine_writes_for)
    pub fn clear_fault(&self, transaction: TransactionId) {
        self.failing_fine_writes.lock().remove(&transaction);
    }
}

impl LedgerStore for MemoryLedger {
    fn transaction<T, F>(&self, f: F) -> StoreResult<T>
    where
        F: FnOnce(&mut dyn LedgerTx) -> StoreResult<T>,
    {
        let failing = self.failing_fine_writes.lock().clone();
        let mut committed = self.tables.lock();
        let mut staged = committed.clone();

        let result = {
            let mut tx = MemoryTx {
                tables: &mut staged,
                failing_fine_writes: &failing,
            };
            f(&mut tx)
        };

        // Only a successful unit replaces the committed tables
        if result.is_ok() {
            *committed = staged;
        }
        result
    }
}

/// Staged view handed to a unit of work
struct MemoryTx<'a> {
    tables: &'a mut Tables,
    failing_fine_writes: &'a HashSet<TransactionId>,
}

impl MemoryTx<'_> {
    fn check_fine_fault(&self, transaction: TransactionId) -> StoreResult<()> {
        if self.failing_fine_writes.contains(&transaction) {
            return Err(CirculationError::store(format!(
                "injected failure writing fine for transaction {}",
                transaction
            )));
        }
        Ok(())
    }
}

impl LedgerTx for MemoryTx<'_> {
    fn get_student(&self, id: &StudentId) -> StoreResult<Option<Student>> {
        Ok(self.tables.students.get(id).cloned())
    }

    fn insert_student(&mut self, student: Student) -> StoreResult<()> {
        if self.tables.students.contains_key(&student.id) {
            return Err(CirculationError::conflict(format!(
                "Student {} already exists",
                student.id
            )));
        }
        self.tables.students.insert(student.id.clone(), student);
        Ok(())
    }

    fn get_book(&self, id: BookId) -> StoreResult<Option<BookCopy>> {
        Ok(self.tables.books.get(&id).cloned())
    }

    fn get_book_by_code(&self, code: &str) -> StoreResult<Option<BookCopy>> {
        Ok(self
            .tables
            .book_codes
            .get(code)
            .and_then(|id| self.tables.books.get(id))
            .cloned())
    }

    fn insert_book(
        &mut self,
        code: &str,
        title: &str,
        status: BookStatus,
    ) -> StoreResult<BookCopy> {
        if self.tables.book_codes.contains_key(code) {
            return Err(CirculationError::conflict(format!(
                "Book code {} already exists",
                code
            )));
        }
        self.tables.next_book_id += 1;
        let book = BookCopy {
            id: BookId(self.tables.next_book_id),
            code: code.to_string(),
            title: title.to_string(),
            status,
        };
        self.tables.book_codes.insert(book.code.clone(), book.id);
        self.tables.books.insert(book.id, book.clone());
        Ok(book)
    }

    fn set_book_status(&mut self, id: BookId, status: BookStatus) -> StoreResult<()> {
        let book = self
            .tables
            .books
            .get_mut(&id)
            .ok_or_else(|| CirculationError::not_found(EntityKind::Book, id))?;
        book.status = status;
        Ok(())
    }

    fn insert_transaction(&mut self, new: NewBorrowTransaction) -> StoreResult<BorrowTransaction> {
        self.tables.next_transaction_id += 1;
        let transaction = BorrowTransaction {
            id: TransactionId(self.tables.next_transaction_id),
            student_id: new.student_id,
            book_id: new.book_id,
            borrowed_at: new.borrowed_at,
            due_date: new.due_date,
            returned_at: None,
            status: TransactionStatus::Borrowed,
            borrowed_by: new.borrowed_by,
            returned_by: None,
        };
        self.tables
            .transactions
            .insert(transaction.id, transaction.clone());
        Ok(transaction)
    }

    fn get_transaction(&self, id: TransactionId) -> StoreResult<Option<BorrowTransaction>> {
        Ok(self.tables.transactions.get(&id).cloned())
    }

    fn update_transaction(&mut self, transaction: &BorrowTransaction) -> StoreResult<()> {
        let row = self
            .tables
            .transactions
            .get_mut(&transaction.id)
            .ok_or_else(|| CirculationError::not_found(EntityKind::Transaction, transaction.id))?;
        *row = transaction.clone();
        Ok(())
    }

    fn transactions_for_student(&self, student: &StudentId) -> StoreResult<Vec<BorrowTransaction>> {
        Ok(self
            .tables
            .transactions
            .values()
            .filter(|t| &t.student_id == student)
            .cloned()
            .collect())
    }

    fn open_transactions_due_before(
        &self,
        now: DateTime<Utc>,
    ) -> StoreResult<Vec<BorrowTransaction>> {
        Ok(self
            .tables
            .transactions
            .values()
            .filter(|t| t.status.is_open() && t.due_date < now)
            .cloned()
            .collect())
    }

    fn get_fine(&self, id: FineId) -> StoreResult<Option<Fine>> {
        Ok(self.tables.fines.get(&id).cloned())
    }

    fn fine_for_transaction(&self, transaction: TransactionId) -> StoreResult<Option<Fine>> {
        Ok(self
            .tables
            .fine_by_transaction
            .get(&transaction)
            .and_then(|id| self.tables.fines.get(id))
            .cloned())
    }

    fn insert_fine(&mut self, new: NewFine) -> StoreResult<Fine> {
        self.check_fine_fault(new.transaction_id)?;
        // One fine per transaction, like a unique index on fines.transaction_id
        if self
            .tables
            .fine_by_transaction
            .contains_key(&new.transaction_id)
        {
            return Err(CirculationError::conflict(format!(
                "Transaction {} already has a fine",
                new.transaction_id
            )));
        }
        self.tables.next_fine_id += 1;
        let fine = Fine {
            id: FineId(self.tables.next_fine_id),
            student_id: new.student_id,
            transaction_id: new.transaction_id,
            fine_amount: new.fine_amount,
            paid_amount: Decimal::ZERO,
            days_overdue: new.days_overdue,
            fine_date: new.fine_date,
            paid_date: None,
            status: FineStatus::Unpaid,
        };
        self.tables
            .fine_by_transaction
            .insert(fine.transaction_id, fine.id);
        self.tables.fines.insert(fine.id, fine.clone());
        Ok(fine)
    }

    fn update_fine(&mut self, fine: &Fine) -> StoreResult<()> {
        self.check_fine_fault(fine.transaction_id)?;
        let row = self
            .tables
            .fines
            .get_mut(&fine.id)
            .ok_or_else(|| CirculationError::not_found(EntityKind::Fine, fine.id))?;
        *row = fine.clone();
        Ok(())
    }

    fn fines_for_student(&self, student: &StudentId) -> StoreResult<Vec<Fine>> {
        Ok(self
            .tables
            .fines
            .values()
            .filter(|f| &f.student_id == student)
            .cloned()
            .collect())
    }

    fn insert_payment(&mut self, new: NewFinePayment) -> StoreResult<FinePayment> {
        self.tables.next_payment_id += 1;
        let payment = FinePayment {
            id: PaymentId(self.tables.next_payment_id),
            fine_id: new.fine_id,
            amount: new.amount,
            method: new.method,
            received_by: new.received_by,
            paid_at: new.paid_at,
            notes: new.notes,
        };
        self.tables.payments.insert(payment.id, payment.clone());
        Ok(payment)
    }

    fn payments_for_fine(&self, fine: FineId) -> StoreResult<Vec<FinePayment>> {
        Ok(self
            .tables
            .payments
            .values()
            .filter(|p| p.fine_id == fine)
            .cloned()
            .collect())
    }

    fn get_borrowing_status(
        &self,
        student: &StudentId,
    ) -> StoreResult<Option<StudentBorrowingStatus>> {
        Ok(self.tables.borrowing_status.get(student).cloned())
    }

    fn upsert_borrowing_status(&mut self, status: StudentBorrowingStatus) -> StoreResult<()> {
        self.tables
            .borrowing_status
            .insert(status.student_id.clone(), status);
        Ok(())
    }

    fn active_semester(&self, student: &StudentId) -> StoreResult<Option<SemesterTracking>> {
        Ok(self
            .tables
            .semesters
            .values()
            .find(|s| &s.student_id == student && s.status == SemesterStatus::Active)
            .cloned())
    }

    fn active_semesters(&self) -> StoreResult<Vec<SemesterTracking>> {
        Ok(self
            .tables
            .semesters
            .values()
            .filter(|s| s.status == SemesterStatus::Active)
            .cloned()
            .collect())
    }

    fn semesters_for_student(&self, student: &StudentId) -> StoreResult<Vec<SemesterTracking>> {
        Ok(self
            .tables
            .semesters
            .values()
            .filter(|s| &s.student_id == student)
            .cloned()
            .collect())
    }

    fn insert_semester(&mut self, new: NewSemesterTracking) -> StoreResult<SemesterTracking> {
        if self.active_semester(&new.student_id)?.is_some() {
            return Err(CirculationError::conflict(format!(
                "Student {} already has an active semester",
                new.student_id
            )));
        }
        self.tables.next_semester_id += 1;
        let semester = SemesterTracking {
            id: SemesterId(self.tables.next_semester_id),
            student_id: new.student_id,
            semester_start: new.semester_start,
            semester_end: new.semester_end,
            books_borrowed_count: 0,
            books_required: new.books_required,
            status: SemesterStatus::Active,
        };
        self.tables.semesters.insert(semester.id, semester.clone());
        Ok(semester)
    }

    fn update_semester(&mut self, semester: &SemesterTracking) -> StoreResult<()> {
        let row = self.tables.semesters.get_mut(&semester.id).ok_or_else(|| {
            CirculationError::store(format!("Semester {} does not exist", semester.id))
        })?;
        *row = semester.clone();
        Ok(())
    }

    fn settings(&self) -> StoreResult<Vec<SettingEntry>> {
        Ok(self.tables.settings.values().cloned().collect())
    }

    fn put_setting(&mut self, entry: SettingEntry) -> StoreResult<()> {
        self.tables.settings.insert(entry.key.clone(), entry);
        Ok(())
    }
}
