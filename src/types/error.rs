//! Error types for the circulation engine
//!
//! Every failure the engine can report falls into one of five classes. The
//! classes are what callers branch on (the HTTP layer maps them to status
//! codes), so each gets its own variant with a human-readable reason.
//!
//! # Error Categories
//!
//! - **Validation**: malformed input; fixed by the caller, never retried
//! - **NotFound**: unknown student, book, transaction or fine
//! - **Conflict**: lost a race or repeated an operation (book no longer
//!   available, transaction already returned, duplicate codes)
//! - **PolicyViolation**: the request is well formed but policy forbids it
//!   (borrow cap exceeded, student blocked)
//! - **Store**: the ledger store failed; the enclosing unit was rolled back

use serde::Serialize;
use std::fmt;
use thiserror::Error;

/// Kind of entity referenced by a [`CirculationError::NotFound`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Student,
    Book,
    Transaction,
    Fine,
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            EntityKind::Student => "Student",
            EntityKind::Book => "Book",
            EntityKind::Transaction => "Transaction",
            EntityKind::Fine => "Fine",
        };
        f.write_str(name)
    }
}

/// Error class, used by callers that only need to branch on the category
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Validation,
    NotFound,
    Conflict,
    PolicyViolation,
    Store,
}

/// Main error type for the circulation engine
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CirculationError {
    /// Input is malformed (bad student id, missing field, non-positive amount)
    #[error("Validation failed: {message}")]
    Validation {
        /// What was wrong with the input
        message: String,
    },

    /// Referenced entity does not exist
    #[error("{entity} {id} not found")]
    NotFound {
        /// Kind of entity that was looked up
        entity: EntityKind,
        /// Identifier as supplied by the caller
        id: String,
    },

    /// State changed underneath the request, or the request repeats itself
    ///
    /// Distinct from `NotFound` so callers can tell "never existed" from
    /// "raced and lost".
    #[error("Conflict: {reason}")]
    Conflict {
        /// Description of the conflicting state
        reason: String,
    },

    /// Library policy forbids the request
    #[error("Policy violation: {reason}")]
    PolicyViolation {
        /// Reason suitable for display to the student
        reason: String,
    },

    /// Underlying store failure; the enclosing unit of work was rolled back
    #[error("Store error: {message}")]
    Store {
        /// Description of the store failure
        message: String,
    },
}

impl CirculationError {
    /// Error class of this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            CirculationError::Validation { .. } => ErrorKind::Validation,
            CirculationError::NotFound { .. } => ErrorKind::NotFound,
            CirculationError::Conflict { .. } => ErrorKind::Conflict,
            CirculationError::PolicyViolation { .. } => ErrorKind::PolicyViolation,
            CirculationError::Store { .. } => ErrorKind::Store,
        }
    }

    /// Create a Validation error
    pub fn validation(message: impl Into<String>) -> Self {
        CirculationError::Validation {
            message: message.into(),
        }
    }

    /// Create a NotFound error
    pub fn not_found(entity: EntityKind, id: impl fmt::Display) -> Self {
        CirculationError::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    /// Create a Conflict error
    pub fn conflict(reason: impl Into<String>) -> Self {
        CirculationError::Conflict {
            reason: reason.into(),
        }
    }

    /// Create a PolicyViolation error
    pub fn policy_violation(reason: impl Into<String>) -> Self {
        CirculationError::PolicyViolation {
            reason: reason.into(),
        }
    }

    /// Create a Store error
    pub fn store(message: impl Into<String>) -> Self {
        CirculationError::Store {
            message: message.into(),
        }
    }

    /// Create the Conflict error for a book that lost a borrow race
    pub fn book_unavailable(code: &str, status: impl fmt::Display) -> Self {
        Self::conflict(format!(
            "Book {} is no longer available (status: {})",
            code, status
        ))
    }

    /// Create the Conflict error for returning a closed transaction
    pub fn already_returned(transaction: impl fmt::Display) -> Self {
        Self::conflict(format!("Transaction {} is already returned", transaction))
    }
}
