//! Loan record and its status lifecycle.
//!
//! # Invariants
//! - Status only moves `Pending -> Active -> Returned`; no reverse step and
//!   no skipping.
//! - `returned == true` iff `status == Returned`. Deserialization rejects
//!   records that break this instead of masking them.
//! - Approval never overwrites a due date that was already set.

use super::book::{Book, BookId};
use super::user::{User, UserId, UserRole};
use super::ValidationError;
use chrono::{Days, NaiveDate};
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{Display, Formatter};
use uuid::Uuid;

pub type LoanId = Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoanStatus {
    /// Requested by a patron, waiting for a librarian.
    Pending,
    /// Approved; the copy is out.
    Active,
    /// Terminal.
    Returned,
}

impl LoanStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Active => "active",
            Self::Returned => "returned",
        }
    }

    /// The single status reachable from `self`, if any.
    pub fn next(self) -> Option<LoanStatus> {
        match self {
            Self::Pending => Some(Self::Active),
            Self::Active => Some(Self::Returned),
            Self::Returned => None,
        }
    }

    pub fn can_transition_to(self, target: LoanStatus) -> bool {
        self.next() == Some(target)
    }
}

impl Display for LoanStatus {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Rejected status change on a single loan.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransitionError {
    Illegal { from: LoanStatus, to: LoanStatus },
    /// The loan is terminal and can no longer be edited.
    Locked,
}

impl Display for TransitionError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Illegal { from, to } => write!(f, "cannot move loan from {from} to {to}"),
            Self::Locked => write!(f, "loan is already returned"),
        }
    }
}

impl Error for TransitionError {}

/// Borrower identity captured when the loan was requested.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BorrowerSnapshot {
    pub user_id: UserId,
    pub name: String,
    pub role: UserRole,
}

impl From<&User> for BorrowerSnapshot {
    fn from(user: &User) -> Self {
        Self {
            user_id: user.id,
            name: user.name.clone(),
            role: user.role,
        }
    }
}

/// Book identity captured when the loan was requested.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookSnapshot {
    pub book_id: BookId,
    pub title: String,
}

impl From<&Book> for BookSnapshot {
    fn from(book: &Book) -> Self {
        Self {
            book_id: book.id,
            title: book.title.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "LoanRecord")]
pub struct Loan {
    pub id: LoanId,
    pub borrower: BorrowerSnapshot,
    pub book: BookSnapshot,
    pub created_on: Option<NaiveDate>,
    pub due_date: Option<NaiveDate>,
    pub status: LoanStatus,
    pub returned: bool,
}

impl Loan {
    /// Creates a pending loan request stamped with `today`.
    pub fn request(borrower: &User, book: &Book, today: NaiveDate) -> Self {
        Self {
            id: Uuid::new_v4(),
            borrower: BorrowerSnapshot::from(borrower),
            book: BookSnapshot::from(book),
            created_on: Some(today),
            due_date: None,
            status: LoanStatus::Pending,
            returned: false,
        }
    }

    /// `Pending -> Active`. Stamps the creation date when absent and sets
    /// the due date to `today + loan_period_days` unless one was pre-set.
    pub fn approve(&mut self, today: NaiveDate, loan_period_days: u32) -> Result<(), TransitionError> {
        self.advance_to(LoanStatus::Active)?;
        self.created_on.get_or_insert(today);
        if self.due_date.is_none() {
            let due = today
                .checked_add_days(Days::new(u64::from(loan_period_days)))
                .unwrap_or(NaiveDate::MAX);
            self.due_date = Some(due);
        }
        Ok(())
    }

    /// `Active -> Returned`.
    pub fn mark_returned(&mut self) -> Result<(), TransitionError> {
        self.advance_to(LoanStatus::Returned)?;
        self.returned = true;
        Ok(())
    }

    /// Overrides the due date. Past dates are accepted; returned loans are
    /// locked.
    pub fn set_due_date(&mut self, due_date: NaiveDate) -> Result<(), TransitionError> {
        if self.status == LoanStatus::Returned {
            return Err(TransitionError::Locked);
        }
        self.due_date = Some(due_date);
        Ok(())
    }

    pub fn is_active(&self) -> bool {
        self.status == LoanStatus::Active
    }

    fn advance_to(&mut self, target: LoanStatus) -> Result<(), TransitionError> {
        if !self.status.can_transition_to(target) {
            return Err(TransitionError::Illegal {
                from: self.status,
                to: target,
            });
        }
        self.status = target;
        Ok(())
    }
}

/// Wire shape used to validate loans read back from the store.
#[derive(Deserialize)]
struct LoanRecord {
    id: LoanId,
    borrower: BorrowerSnapshot,
    book: BookSnapshot,
    #[serde(default)]
    created_on: Option<NaiveDate>,
    #[serde(default)]
    due_date: Option<NaiveDate>,
    status: LoanStatus,
    #[serde(default)]
    returned: bool,
}

impl TryFrom<LoanRecord> for Loan {
    type Error = ValidationError;

    fn try_from(value: LoanRecord) -> Result<Self, Self::Error> {
        if value.returned != (value.status == LoanStatus::Returned) {
            return Err(ValidationError::ReturnedFlagMismatch {
                returned: value.returned,
            });
        }
        Ok(Self {
            id: value.id,
            borrower: value.borrower,
            book: value.book,
            created_on: value.created_on,
            due_date: value.due_date,
            status: value.status,
            returned: value.returned,
        })
    }
}
