//! Error taxonomy surfaced at the circulation call boundary.
//!
//! Every variant renders a user-facing message through `Display` and none is
//! fatal to the process. Inventory drift (clamped decrements, unbounded
//! increments, last-writer-wins races) is deliberately absent here: it is
//! logged, never raised.

use crate::model::book::BookId;
use crate::model::loan::{LoanId, LoanStatus, TransitionError};
use crate::model::user::UserId;
use crate::model::ValidationError;
use crate::repo::circulation_repo::RepoError;
use std::error::Error;
use std::fmt::{Display, Formatter};

pub type CirculationResult<T> = Result<T, CirculationError>;

/// Record referenced by a failed lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityRef {
    Book(BookId),
    Loan(LoanId),
    User(UserId),
}

impl Display for EntityRef {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Book(id) => write!(f, "book {id}"),
            Self::Loan(id) => write!(f, "loan {id}"),
            Self::User(id) => write!(f, "user {id}"),
        }
    }
}

#[derive(Debug)]
pub enum CirculationError {
    NotFound(EntityRef),
    InvalidTransition {
        loan_id: LoanId,
        from: LoanStatus,
        to: LoanStatus,
    },
    /// Mutation attempted on a returned loan.
    Locked(LoanId),
    /// Loan requested while the book has no copy on the shelf.
    Unavailable(BookId),
    Validation(ValidationError),
    Repo(RepoError),
}

impl CirculationError {
    pub(crate) fn from_transition(loan_id: LoanId, err: TransitionError) -> Self {
        match err {
            TransitionError::Illegal { from, to } => Self::InvalidTransition { loan_id, from, to },
            TransitionError::Locked => Self::Locked(loan_id),
        }
    }

    /// Short machine-friendly code used in log lines.
    pub fn code(&self) -> &'static str {
        match self {
            Self::NotFound(_) => "not_found",
            Self::InvalidTransition { .. } => "invalid_transition",
            Self::Locked(_) => "locked",
            Self::Unavailable(_) => "unavailable",
            Self::Validation(_) => "validation",
            Self::Repo(_) => "repo",
        }
    }
}

impl Display for CirculationError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NotFound(entity) => write!(f, "{entity} was not found"),
            Self::InvalidTransition { from, to, .. } => {
                write!(f, "loan is {from}; it cannot become {to}")
            }
            Self::Locked(_) => write!(f, "this loan was already returned and can no longer change"),
            Self::Unavailable(_) => write!(f, "this book is not available at the moment"),
            Self::Validation(err) => write!(f, "{err}"),
            Self::Repo(err) => write!(f, "storage failure: {err}"),
        }
    }
}

impl Error for CirculationError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Validation(err) => Some(err),
            Self::Repo(err) => Some(err),
            _ => None,
        }
    }
}

impl From<RepoError> for CirculationError {
    fn from(value: RepoError) -> Self {
        Self::Repo(value)
    }
}

impl From<ValidationError> for CirculationError {
    fn from(value: ValidationError) -> Self {
        Self::Validation(value)
    }
}
