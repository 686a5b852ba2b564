//! Loan lifecycle service.
//!
//! # Responsibility
//! - Create loan requests and drive `Pending -> Active -> Returned`.
//! - Trigger exactly one inventory effect per successful transition.
//!
//! # Invariants
//! - A rejected transition writes nothing and is reported to the caller.
//! - The loan write and the stock write are two independent store writes.
//!   A crash or a concurrent writer between them leaves them inconsistent;
//!   nothing here repairs that.
//! - Stock is checked at request time only. Approval never re-checks it.

use crate::clock::Clock;
use crate::model::book::BookId;
use crate::model::loan::{Loan, LoanId, TransitionError};
use crate::model::user::{User, UserId};
use crate::repo::circulation_repo::CirculationRepository;
use crate::service::error::{CirculationError, CirculationResult, EntityRef};
use crate::service::inventory::InventoryLedger;
use chrono::NaiveDate;
use log::{info, warn};

/// Default loan period applied when a loan is approved without a due date.
pub const DEFAULT_LOAN_PERIOD_DAYS: u32 = 7;

/// Loan transitions plus the stock effect each one implies.
pub struct CirculationService<R: CirculationRepository, C: Clock> {
    repo: R,
    ledger: InventoryLedger<R>,
    clock: C,
    loan_period_days: u32,
}

impl<R: CirculationRepository + Clone, C: Clock> CirculationService<R, C> {
    /// Service over `repo`, sharing it with its own [`InventoryLedger`].
    pub fn new(repo: R, clock: C) -> Self {
        Self {
            ledger: InventoryLedger::new(repo.clone()),
            repo,
            clock,
            loan_period_days: DEFAULT_LOAN_PERIOD_DAYS,
        }
    }
}

impl<R: CirculationRepository, C: Clock> CirculationService<R, C> {
    /// Days between approval and the default due date.
    pub fn with_loan_period(mut self, days: u32) -> Self {
        self.loan_period_days = days;
        self
    }

    /// Catalog ledger backed by the same repository.
    pub fn ledger(&self) -> &InventoryLedger<R> {
        &self.ledger
    }

    /// Creates a pending loan when the book has a copy on the shelf.
    ///
    /// The shelf count is not touched until approval.
    pub fn request_loan(&self, borrower: &User, book_id: BookId) -> CirculationResult<Loan> {
        let book = self.ledger.get_book(book_id)?;
        if !book.is_available() {
            info!(
                "event=loan_request module=circulation status=rejected book_id={book_id} error_code=unavailable"
            );
            return Err(CirculationError::Unavailable(book_id));
        }

        let loan = Loan::request(borrower, &book, self.clock.today());
        let mut loans = self.repo.load_loans()?;
        loans.push(loan.clone());
        self.repo.save_loans(&loans)?;

        info!(
            "event=loan_request module=circulation status=ok loan_id={} book_id={book_id} user_id={}",
            loan.id, borrower.id
        );
        Ok(loan)
    }

    /// `Pending -> Active`, then takes one copy off the shelf.
    ///
    /// # Errors
    /// - `NotFound` for an unknown loan, `InvalidTransition` unless pending.
    /// - The stock write is not part of the result. Once the loan is saved,
    ///   a missing book is logged as `event=book_missing` and any other
    ///   stock failure as `event=inventory_adjust`; the call still returns
    ///   the active loan.
    pub fn approve(&self, loan_id: LoanId) -> CirculationResult<Loan> {
        let today = self.clock.today();
        let period = self.loan_period_days;
        let loan = self.transition(loan_id, "approve", |loan| loan.approve(today, period))?;
        self.apply_stock_effect(&loan, |ledger, book_id| ledger.decrement(book_id));
        Ok(loan)
    }

    /// `Active -> Returned`, then puts one copy back.
    ///
    /// # Errors
    /// Same contract as [`Self::approve`]: only the loan write can fail the
    /// call, a failed stock write is logged and swallowed.
    pub fn mark_returned(&self, loan_id: LoanId) -> CirculationResult<Loan> {
        let loan = self.transition(loan_id, "return", Loan::mark_returned)?;
        self.apply_stock_effect(&loan, |ledger, book_id| ledger.increment(book_id));
        Ok(loan)
    }

    /// Overrides the due date of a loan that is not yet returned.
    pub fn set_due_date(&self, loan_id: LoanId, due_date: NaiveDate) -> CirculationResult<Loan> {
        self.transition(loan_id, "set_due_date", |loan| loan.set_due_date(due_date))
    }

    /// # Contract
    /// - Reads the store on every call; no caching.
    /// - Unknown ids map to `NotFound(EntityRef::Loan)`.
    pub fn get_loan(&self, loan_id: LoanId) -> CirculationResult<Loan> {
        self.repo
            .load_loans()?
            .into_iter()
            .find(|loan| loan.id == loan_id)
            .ok_or(CirculationError::NotFound(EntityRef::Loan(loan_id)))
    }

    /// All loans in stored order.
    pub fn list_loans(&self) -> CirculationResult<Vec<Loan>> {
        Ok(self.repo.load_loans()?)
    }

    /// Loans requested by one borrower, any status.
    pub fn loans_for(&self, user_id: UserId) -> CirculationResult<Vec<Loan>> {
        Ok(self
            .repo
            .load_loans()?
            .into_iter()
            .filter(|loan| loan.borrower.user_id == user_id)
            .collect())
    }

    fn transition(
        &self,
        loan_id: LoanId,
        action: &'static str,
        apply: impl FnOnce(&mut Loan) -> Result<(), TransitionError>,
    ) -> CirculationResult<Loan> {
        let mut loans = self.repo.load_loans()?;
        let loan = loans
            .iter_mut()
            .find(|loan| loan.id == loan_id)
            .ok_or(CirculationError::NotFound(EntityRef::Loan(loan_id)))?;

        if let Err(err) = apply(loan) {
            let err = CirculationError::from_transition(loan_id, err);
            info!(
                "event=loan_{action} module=circulation status=rejected loan_id={loan_id} error_code={}",
                err.code()
            );
            return Err(err);
        }
        let updated = loan.clone();

        self.repo.save_loans(&loans)?;
        info!(
            "event=loan_{action} module=circulation status=ok loan_id={loan_id} loan_status={}",
            updated.status
        );
        Ok(updated)
    }

    /// A missing catalog entry does not undo the transition already written.
    fn apply_stock_effect(
        &self,
        loan: &Loan,
        effect: impl FnOnce(&InventoryLedger<R>, BookId) -> CirculationResult<u32>,
    ) {
        let book_id = loan.book.book_id;
        match effect(&self.ledger, book_id) {
            Ok(_) => {}
            Err(CirculationError::NotFound(_)) => warn!(
                "event=book_missing module=circulation status=skip loan_id={} book_id={book_id}",
                loan.id
            ),
            Err(err) => warn!(
                "event=inventory_adjust module=circulation status=error loan_id={} book_id={book_id} error={err}",
                loan.id
            ),
        }
    }
}
