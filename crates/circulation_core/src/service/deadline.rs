//! Deadline classification for active loans.
//!
//! Pure: no clock, no store. Callers pass `today` and the near-deadline
//! window of the viewer role asking.

use crate::model::loan::Loan;
use chrono::NaiveDate;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeadlineStatus {
    /// Whole days until the due date; negative once it has passed.
    pub days_remaining: i64,
    pub is_overdue: bool,
    /// `0 <= days_remaining <= window`. The due date itself is near, not overdue.
    pub is_near: bool,
}

/// Classifies `due_date` relative to `today` with an inclusive
/// `near_window_days`.
pub fn classify(due_date: NaiveDate, today: NaiveDate, near_window_days: i64) -> DeadlineStatus {
    let days_remaining = due_date.signed_duration_since(today).num_days();
    DeadlineStatus {
        days_remaining,
        is_overdue: days_remaining < 0,
        is_near: (0..=near_window_days).contains(&days_remaining),
    }
}

/// `None` when the loan has no due date yet.
pub fn classify_loan(loan: &Loan, today: NaiveDate, near_window_days: i64) -> Option<DeadlineStatus> {
    loan.due_date
        .map(|due_date| classify(due_date, today, near_window_days))
}
