//! Borrow transaction types
//!
//! One borrow transaction records one student holding one book copy.
//!
//! ```text
//! Borrowed ──due date passes──► Overdue
//!    │                             │
//!    └──────────return─────────────┴──► Returned
//! ```
//!
//! Transactions are never deleted.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use super::book::BookId;
use super::student::{AdminId, StudentId};

/// Borrow transaction identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TransactionId(pub u64);

impl fmt::Display for TransactionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionStatus {
    /// Book is out and not yet past its due date (as far as the engine has observed)
    Borrowed,
    /// Book is out and a nonzero fine has been detected
    Overdue,
    /// Book is back on the shelf
    Returned,
}

impl TransactionStatus {
    /// Whether the book is still out (borrowed or overdue)
    pub fn is_open(self) -> bool {
        !matches!(self, TransactionStatus::Returned)
    }
}

impl fmt::Display for TransactionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TransactionStatus::Borrowed => "borrowed",
            TransactionStatus::Overdue => "overdue",
            TransactionStatus::Returned => "returned",
        };
        f.write_str(name)
    }
}

/// Stored borrow transaction
///
/// `returned_at` is `Some` exactly when `status` is `Returned`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BorrowTransaction {
    pub id: TransactionId,
    pub student_id: StudentId,
    pub book_id: BookId,
    pub borrowed_at: DateTime<Utc>,
    pub due_date: DateTime<Utc>,
    pub returned_at: Option<DateTime<Utc>>,
    pub status: TransactionStatus,
    pub borrowed_by: AdminId,
    pub returned_by: Option<AdminId>,
}

impl BorrowTransaction {
    /// Close the transaction, keeping the returned-at/status invariant
    pub fn mark_returned(&mut self, at: DateTime<Utc>, admin: &AdminId) {
        self.status = TransactionStatus::Returned;
        self.returned_at = Some(at);
        self.returned_by = Some(admin.clone());
    }
}

/// Values for a transaction about to be inserted; the store assigns the id
#[derive(Debug, Clone)]
pub struct NewBorrowTransaction {
    pub student_id: StudentId,
    pub book_id: BookId,
    pub borrowed_at: DateTime<Utc>,
    pub due_date: DateTime<Utc>,
    pub borrowed_by: AdminId,
}
