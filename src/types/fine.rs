//! Fine and payment types
//!
//! Each overdue transaction owns at most one fine. Payments are append-only
//! records against a fine and are never edited.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::error::CirculationError;
use super::student::{AdminId, StudentId};
use super::transaction::TransactionId;

/// Fine identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FineId(pub u64);

impl fmt::Display for FineId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Fine payment identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PaymentId(pub u64);

impl fmt::Display for PaymentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FineStatus {
    Unpaid,
    Paid,
    Waived,
}

impl fmt::Display for FineStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FineStatus::Unpaid => "unpaid",
            FineStatus::Paid => "paid",
            FineStatus::Waived => "waived",
        };
        f.write_str(name)
    }
}

impl FromStr for FineStatus {
    type Err = CirculationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "unpaid" => Ok(FineStatus::Unpaid),
            "paid" => Ok(FineStatus::Paid),
            "waived" => Ok(FineStatus::Waived),
            other => Err(CirculationError::validation(format!(
                "Invalid fine status filter '{}'",
                other
            ))),
        }
    }
}

/// Stored overdue fine
///
/// Invariants: `paid_amount <= fine_amount`, and `status == Paid` exactly
/// when `paid_amount >= fine_amount`. While unpaid, `fine_amount` and
/// `days_overdue` never decrease.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Fine {
    pub id: FineId,
    pub student_id: StudentId,
    pub transaction_id: TransactionId,
    pub fine_amount: Decimal,
    pub paid_amount: Decimal,
    pub days_overdue: u32,
    pub fine_date: NaiveDate,
    pub paid_date: Option<DateTime<Utc>>,
    pub status: FineStatus,
}

impl Fine {
    /// Amount still owed
    pub fn outstanding(&self) -> Decimal {
        (self.fine_amount - self.paid_amount).max(Decimal::ZERO)
    }
}

/// Values for a fine about to be inserted; the store assigns the id
#[derive(Debug, Clone)]
pub struct NewFine {
    pub student_id: StudentId,
    pub transaction_id: TransactionId,
    pub fine_amount: Decimal,
    pub days_overdue: u32,
    pub fine_date: NaiveDate,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentMethod {
    Cash,
    Gcash,
    Card,
    Other,
}

impl fmt::Display for PaymentMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PaymentMethod::Cash => "cash",
            PaymentMethod::Gcash => "gcash",
            PaymentMethod::Card => "card",
            PaymentMethod::Other => "other",
        };
        f.write_str(name)
    }
}

/// Append-only record of money received against a fine
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FinePayment {
    pub id: PaymentId,
    pub fine_id: FineId,
    pub amount: Decimal,
    pub method: PaymentMethod,
    pub received_by: AdminId,
    pub paid_at: DateTime<Utc>,
    pub notes: Option<String>,
}

/// Values for a payment about to be appended; the store assigns the id
#[derive(Debug, Clone)]
pub struct NewFinePayment {
    pub fine_id: FineId,
    pub amount: Decimal,
    pub method: PaymentMethod,
    pub received_by: AdminId,
    pub paid_at: DateTime<Utc>,
    pub notes: Option<String>,
}
