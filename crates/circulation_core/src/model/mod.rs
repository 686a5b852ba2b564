//! Circulation domain model.
//!
//! # Responsibility
//! - Define the records persisted under the shared-store keys.
//! - Keep record-level invariants next to the records themselves.
//!
//! # Invariants
//! - Every record is identified by a random 128-bit id that is never reused.
//! - Loans are retained as history; they are never deleted.
//! - `Loan::returned` mirrors `LoanStatus::Returned` at every observation.

use std::error::Error;
use std::fmt::{Display, Formatter};

pub mod book;
pub mod loan;
pub mod notification;
pub mod user;

/// Field-level validation failure for records entering the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// A required text field is empty after trimming.
    MissingField(&'static str),
    /// Password shorter than the configured minimum.
    PasswordTooShort { min: usize, actual: usize },
    /// Persisted loan whose `returned` flag disagrees with its status.
    ReturnedFlagMismatch { returned: bool },
}

impl Display for ValidationError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MissingField(field) => write!(f, "{field} is required"),
            Self::PasswordTooShort { min, .. } => {
                write!(f, "password must have at least {min} characters")
            }
            Self::ReturnedFlagMismatch { returned } => write!(
                f,
                "loan returned flag ({returned}) disagrees with its status"
            ),
        }
    }
}

impl Error for ValidationError {}

pub(crate) fn require_text(value: &str, field: &'static str) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        return Err(ValidationError::MissingField(field));
    }
    Ok(())
}
