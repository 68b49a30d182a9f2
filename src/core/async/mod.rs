//! Asynchronous components
//!
//! The circulation operations themselves are synchronous units of work on
//! the ledger store. This module holds what needs a tokio runtime:
//!
//! - **ReconciliationLoop**: periodic fine and borrowing-status
//!   reconciliation, with start/stop/status control and manual passes
//!
//! # Thread Safety
//!
//! Passes run on tokio's blocking pool and are never allowed to overlap.

pub mod reconciliation_loop;

pub use reconciliation_loop::{LoopConfig, LoopState, LoopStatus, PassSummary, ReconciliationLoop};
