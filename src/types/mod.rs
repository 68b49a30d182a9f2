//! Types module
//!
//! Contains the ledger's row types and the engine's error type.
//! This module organizes types into logical submodules:
//! - `book`: Book copies and their availability
//! - `transaction`: Borrow transactions and identifiers
//! - `fine`: Fines, payments and payment methods
//! - `student`: Students, borrowing status and semester tracking
//! - `settings`: Raw system setting rows
//! - `error`: Error types for the circulation engine

pub mod book;
pub mod error;
pub mod fine;
pub mod settings;
pub mod student;
pub mod transaction;

pub use book::{BookCopy, BookId, BookStatus};
pub use error::{CirculationError, EntityKind, ErrorKind};
pub use fine::{
    Fine, FineId, FinePayment, FineStatus, NewFine, NewFinePayment, PaymentId, PaymentMethod,
};
pub use settings::SettingEntry;
pub use student::{
    AdminId, NewSemesterTracking, SemesterId, SemesterStatus, SemesterTracking, Student,
    StudentBorrowingStatus, StudentId,
};
pub use transaction::{BorrowTransaction, NewBorrowTransaction, TransactionId, TransactionStatus};
