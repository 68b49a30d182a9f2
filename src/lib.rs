//! Library Circulation Engine
//! # Overview
//!
//! This library provides the borrowing and penalty engine of a library
//! circulation system: validating and committing borrows and returns against
//! shared inventory and per-student limits, accruing overdue fines as time
//! passes, and reconciling fines and borrowing status in the background.
//!
//! # Architecture
//!
//! The system is organized into several key components:
//!
//! - [`types`] - Domain data types (students, books, transactions, fines) and errors
//! - [`cli`] - CLI arguments parsing
//! - [`core`] - Business logic components:
//!   - [`core::engine`] - Facade exposing every circulation operation
//!   - [`core::eligibility`] - Borrow request checks
//!   - [`core::transactor`] - All-or-nothing borrow and return commits
//!   - [`core::fine_calculator`] - Fine computation and idempotent upsert
//!   - [`core::borrowing_status`] - Derived can-borrow status
//!   - [`core::payments`] - Fine payments and waivers
//!   - [`core::semester`] - Semester quota tracking
//!   - [`core::policy`] - Typed policy over stored settings
//!   - [`core::memory_ledger`] - In-memory transactional ledger store
//! - [`io`] - CSV seed files and the fine report
//!
//! # Invariants
//!
//! - A book copy is held by at most one open transaction
//! - A student never holds more open transactions than the borrow cap
//! - Each transaction has at most one fine, and an unpaid fine only grows
//! - A fine's paid amount never exceeds its amount
//! - Every multi-row mutation applies completely or not at all

// Module declarations
pub mod cli;
pub mod core;
pub mod io;
pub mod types;

pub use core::{
    CirculationEngine, Clock, LedgerStore, LedgerTx, LoopConfig, ManualClock, MemoryLedger,
    Policy, ReconciliationLoop, SystemClock,
};
pub use types::{
    AdminId, BookCopy, BookId, BookStatus, BorrowTransaction, CirculationError, ErrorKind, Fine,
    FineId, FineStatus, PaymentMethod, Student, StudentId, TransactionId, TransactionStatus,
};
