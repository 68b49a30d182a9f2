//! Core business logic module
//!
//! This module contains the circulation components:
//! - `traits` - Ledger store, unit-of-work and clock abstractions
//! - `memory_ledger` - In-memory transactional ledger store
//! - `clock` - System and manual time sources
//! - `policy` - Typed policy over the raw settings table
//! - `eligibility` - Borrow request checks
//! - `transactor` - All-or-nothing borrow and return commits
//! - `fine_calculator` - Fine computation, upsert and the reconciliation pass
//! - `borrowing_status` - Derived can-borrow status
//! - `payments` - Fine payments and waivers
//! - `semester` - Per-student semester quota tracking
//! - `engine` - Facade tying the components to a store and a clock
//! - `async` - Background reconciliation loop

pub mod r#async;
pub mod borrowing_status;
pub mod clock;
pub mod eligibility;
pub mod engine;
pub mod fine_calculator;
pub mod memory_ledger;
pub mod payments;
pub mod policy;
pub mod semester;
pub mod traits;
pub mod transactor;

pub use clock::{ManualClock, SystemClock};
pub use eligibility::{validate_borrow, BookEligibility, EligibilityResult};
pub use engine::CirculationEngine;
pub use fine_calculator::{
    compute, process_all_overdue, refresh_student_fines, upsert_fine, FineComputation,
    FineOutcome, ReconcileResult,
};
pub use memory_ledger::MemoryLedger;
pub use payments::{
    pay_all_unpaid, pay_fine, payment_history, waive_fine, PayAllResult, PaymentResult,
};
pub use policy::{get_settings, load_policy, set_setting, Policy, SettingKey};
pub use r#async::{LoopConfig, LoopState, LoopStatus, PassSummary, ReconciliationLoop};
pub use semester::{ensure_active_semester, get_semester_tracking, recalculate_semester_counts};
pub use traits::{Clock, LedgerStore, LedgerTx, StoreResult};
pub use transactor::{commit_borrow, commit_return, BorrowResult, ReturnResult};
