//! Borrow/return transactor
//!
//! The only writer of book availability. Each call runs inside one store
//! unit supplied by the caller, and any error aborts the whole request: a
//! multi-book borrow either commits every book or none.
//!
//! # Concurrency
//!
//! Validation happens in an earlier unit, so the transactor re-reads every
//! row it depends on instead of trusting the caller's snapshot. That covers
//! the book status (lost races become a `Conflict`), the student's active
//! borrow count (the cap holds under simultaneous requests) and the student
//! row itself.

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use std::collections::BTreeSet;
use tracing::info;

use super::borrowing_status;
use super::eligibility::{active_borrow_count, cap_violations, duplicate_codes};
use super::policy::load_policy;
use super::semester::{ensure_active_semester, record_borrowed};
use super::traits::{LedgerTx, StoreResult};
use crate::types::{
    AdminId, BookCopy, BookStatus, CirculationError, EntityKind, NewBorrowTransaction, StudentId,
    TransactionId,
};

/// Result of a committed borrow
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BorrowResult {
    pub transaction_ids: Vec<TransactionId>,
    pub borrowed_books: Vec<BookCopy>,
    pub due_date: DateTime<Utc>,
}

/// Result of a committed return
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReturnResult {
    pub returned_books: Vec<BookCopy>,
}

/// Borrow `codes` for `student` as one all-or-nothing unit
///
/// # Arguments
///
/// * `tx` - Unit of work; every write is discarded if this returns `Err`
/// * `student` - Borrowing student
/// * `codes` - Book codes, all of which must currently be available
/// * `admin` - Admin recording the borrow
/// * `due_override` - Explicit due date; defaults to now plus the borrowing period
/// * `now` - Borrow instant
pub fn commit_borrow(
    tx: &mut dyn LedgerTx,
    student: &StudentId,
    codes: &[String],
    admin: &AdminId,
    due_override: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
) -> StoreResult<BorrowResult> {
    if codes.is_empty() {
        return Err(CirculationError::validation(
            "At least one book code is required",
        ));
    }
    if tx.get_student(student)?.is_none() {
        return Err(CirculationError::not_found(EntityKind::Student, student));
    }
    let duplicates = duplicate_codes(codes);
    if !duplicates.is_empty() {
        return Err(CirculationError::conflict(format!(
            "Duplicate book code(s) in request: {}",
            duplicates.join(", ")
        )));
    }

    let policy = load_policy(tx)?;
    let active = active_borrow_count(tx, student)?;
    if let Some(violation) = cap_violations(active, codes.len(), &policy).into_iter().next() {
        return Err(violation);
    }

    let due_date = match due_override {
        Some(due) if due <= now => {
            return Err(CirculationError::validation(format!(
                "Due date {} must be after the borrow time {}",
                due, now
            )))
        }
        Some(due) => due,
        None => now
            .checked_add_signed(Duration::days(i64::from(policy.borrowing_period_days)))
            .ok_or_else(|| {
                CirculationError::store(format!(
                    "Due date out of range ({} days after {})",
                    policy.borrowing_period_days, now
                ))
            })?,
    };

    let semester = ensure_active_semester(tx, student, &policy, now)?;

    let mut books = Vec::with_capacity(codes.len());
    for code in codes {
        let code = code.trim();
        let book = tx
            .get_book_by_code(code)?
            .ok_or_else(|| CirculationError::not_found(EntityKind::Book, code))?;
        if book.status != BookStatus::Available {
            return Err(CirculationError::book_unavailable(code, book.status));
        }
        books.push(book);
    }

    let mut transaction_ids = Vec::with_capacity(books.len());
    for book in &mut books {
        let transaction = tx.insert_transaction(NewBorrowTransaction {
            student_id: student.clone(),
            book_id: book.id,
            borrowed_at: now,
            due_date,
            borrowed_by: admin.clone(),
        })?;
        tx.set_book_status(book.id, BookStatus::Borrowed)?;
        book.status = BookStatus::Borrowed;
        transaction_ids.push(transaction.id);
    }

    let count = u32::try_from(books.len()).unwrap_or(u32::MAX);
    record_borrowed(tx, semester, count)?;

    info!(
        student = %student,
        admin = %admin,
        books = books.len(),
        due = %due_date,
        "Borrow committed"
    );
    Ok(BorrowResult {
        transaction_ids,
        borrowed_books: books,
        due_date,
    })
}

/// Return the books held by `transaction_ids` as one all-or-nothing unit
///
/// Accepts transactions that are `borrowed` or `overdue`. Fines are left as
/// they are; the borrowing status of every affected student is recomputed.
pub fn commit_return(
    tx: &mut dyn LedgerTx,
    transaction_ids: &[TransactionId],
    admin: &AdminId,
    now: DateTime<Utc>,
) -> StoreResult<ReturnResult> {
    if transaction_ids.is_empty() {
        return Err(CirculationError::validation(
            "At least one transaction id is required",
        ));
    }

    let mut returned_books = Vec::with_capacity(transaction_ids.len());
    let mut students = BTreeSet::new();
    for &id in transaction_ids {
        let mut transaction = tx
            .get_transaction(id)?
            .ok_or_else(|| CirculationError::not_found(EntityKind::Transaction, id))?;
        if !transaction.status.is_open() {
            return Err(CirculationError::already_returned(id));
        }

        transaction.mark_returned(now, admin);
        tx.update_transaction(&transaction)?;

        let mut book = tx
            .get_book(transaction.book_id)?
            .ok_or_else(|| CirculationError::not_found(EntityKind::Book, transaction.book_id))?;
        tx.set_book_status(book.id, BookStatus::Available)?;
        book.status = BookStatus::Available;

        returned_books.push(book);
        students.insert(transaction.student_id);
    }

    for student in &students {
        borrowing_status::recompute(tx, student, now)?;
    }

    info!(
        admin = %admin,
        books = returned_books.len(),
        "Return committed"
    );
    Ok(ReturnResult { returned_books })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{set_setting, LedgerStore, MemoryLedger};
    use crate::types::{ErrorKind, Student, TransactionStatus};
    use chrono::TimeZone;
    use rstest::rstest;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 8, 0, 0).unwrap()
    }

    fn sid() -> StudentId {
        StudentId::parse("C22-0044").unwrap()
    }

    fn admin() -> AdminId {
        AdminId::new("admin-1")
    }

    fn codes(raw: &[&str]) -> Vec<String> {
        raw.iter().map(|c| c.to_string()).collect()
    }

    fn seeded() -> MemoryLedger {
        let ledger = MemoryLedger::new();
        ledger
            .transaction(|tx| {
                tx.insert_student(Student {
                    id: sid(),
                    name: "Ana Cruz".to_string(),
                })?;
                for n in 1..=4 {
                    tx.insert_book(&format!("BK-000{}", n), "Title", BookStatus::Available)?;
                }
                tx.insert_book("BK-FIX", "Title", BookStatus::Maintenance)?;
                Ok(())
            })
            .unwrap();
        ledger
    }

    fn borrow(ledger: &MemoryLedger, requested: &[&str]) -> StoreResult<BorrowResult> {
        ledger.transaction(|tx| commit_borrow(tx, &sid(), &codes(requested), &admin(), None, now()))
    }

    #[test]
    fn test_borrow_commits_every_row() {
        let ledger = seeded();
        let result = borrow(&ledger, &["BK-0001", "BK-0002"]).unwrap();

        assert_eq!(result.transaction_ids.len(), 2);
        assert_eq!(result.due_date, now() + Duration::days(7));
        assert!(result
            .borrowed_books
            .iter()
            .all(|b| b.status == BookStatus::Borrowed));

        let (book, semester) = ledger
            .transaction(|tx| Ok((tx.get_book_by_code("BK-0002")?, tx.active_semester(&sid())?)))
            .unwrap();
        assert_eq!(book.unwrap().status, BookStatus::Borrowed);
        assert_eq!(semester.unwrap().books_borrowed_count, 2);
    }

    #[test]
    fn test_due_date_override() {
        let ledger = seeded();
        let due = now() + Duration::days(3);
        let result = ledger
            .transaction(|tx| {
                commit_borrow(tx, &sid(), &codes(&["BK-0001"]), &admin(), Some(due), now())
            })
            .unwrap();
        assert_eq!(result.due_date, due);
    }

    #[rstest]
    #[case::unavailable_book(&["BK-0001", "BK-FIX"], ErrorKind::Conflict)]
    #[case::unknown_book(&["BK-0001", "BK-9999"], ErrorKind::NotFound)]
    #[case::duplicate(&["BK-0001", "BK-0001"], ErrorKind::Conflict)]
    #[case::over_cap(&["BK-0001", "BK-0002", "BK-0003", "BK-0004"], ErrorKind::PolicyViolation)]
    #[case::empty(&[], ErrorKind::Validation)]
    fn test_failed_borrow_leaves_no_trace(#[case] requested: &[&str], #[case] expected: ErrorKind) {
        let ledger = seeded();
        let err = borrow(&ledger, requested).unwrap_err();
        assert_eq!(err.kind(), expected);

        let (book, transactions, semester) = ledger
            .transaction(|tx| {
                Ok((
                    tx.get_book_by_code("BK-0001")?,
                    tx.transactions_for_student(&sid())?,
                    tx.active_semester(&sid())?,
                ))
            })
            .unwrap();
        assert_eq!(book.unwrap().status, BookStatus::Available);
        assert!(transactions.is_empty());
        assert!(semester.is_none());
    }

    #[test]
    fn test_second_borrow_of_same_book_conflicts() {
        let ledger = seeded();
        borrow(&ledger, &["BK-0001"]).unwrap();
        let err = borrow(&ledger, &["BK-0001"]).unwrap_err();
        assert_eq!(
            err,
            CirculationError::book_unavailable("BK-0001", BookStatus::Borrowed)
        );
    }

    #[test]
    fn test_out_of_range_period_setting_uses_default_due_date() {
        let ledger = seeded();
        ledger
            .transaction(|tx| {
                set_setting(tx, "borrowing_period_days", "1000000000", &admin(), now())
            })
            .unwrap();
        let result = borrow(&ledger, &["BK-0001"]).unwrap();
        assert_eq!(result.due_date, now() + Duration::days(7));
    }

    #[test]
    fn test_due_date_past_calendar_end_is_an_error() {
        let ledger = seeded();
        let end_of_time = DateTime::<Utc>::MAX_UTC - Duration::days(1);
        let err = ledger
            .transaction(|tx| {
                commit_borrow(tx, &sid(), &codes(&["BK-0001"]), &admin(), None, end_of_time)
            })
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Store);

        let book = ledger
            .transaction(|tx| tx.get_book_by_code("BK-0001"))
            .unwrap();
        assert_eq!(book.unwrap().status, BookStatus::Available);
    }

    #[test]
    fn test_cap_is_rechecked_at_commit() {
        let ledger = seeded();
        borrow(&ledger, &["BK-0001", "BK-0002"]).unwrap();
        let err = borrow(&ledger, &["BK-0003", "BK-0004"]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::PolicyViolation);
    }

    #[test]
    fn test_return_restores_book_and_rejects_repeat() {
        let ledger = seeded();
        let borrowed = borrow(&ledger, &["BK-0001"]).unwrap();
        let later = now() + Duration::days(2);

        let returned = ledger
            .transaction(|tx| commit_return(tx, &borrowed.transaction_ids, &admin(), later))
            .unwrap();
        assert_eq!(returned.returned_books[0].status, BookStatus::Available);

        let transaction = ledger
            .transaction(|tx| tx.get_transaction(borrowed.transaction_ids[0]))
            .unwrap()
            .unwrap();
        assert_eq!(transaction.status, TransactionStatus::Returned);
        assert_eq!(transaction.returned_at, Some(later));
        assert_eq!(transaction.returned_by, Some(admin()));

        let err = ledger
            .transaction(|tx| commit_return(tx, &borrowed.transaction_ids, &admin(), later))
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Conflict);
    }

    #[test]
    fn test_return_is_all_or_nothing() {
        let ledger = seeded();
        let borrowed = borrow(&ledger, &["BK-0001"]).unwrap();
        let ids = [borrowed.transaction_ids[0], TransactionId(404)];

        let err = ledger
            .transaction(|tx| commit_return(tx, &ids, &admin(), now()))
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);

        let book = ledger
            .transaction(|tx| tx.get_book_by_code("BK-0001"))
            .unwrap()
            .unwrap();
        assert_eq!(book.status, BookStatus::Borrowed);
    }
}
