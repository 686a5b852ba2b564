//! One librarian or patron viewer process.
//!
//! # Responsibility
//! - Bundle the circulation service with the notification engine of one
//!   viewer role.
//! - Announce desk actions synchronously and drive reconciliation passes
//!   from the polling scheduler.
//!
//! # Invariants
//! - A failing pass is logged and the session keeps running.
//! - Each process owns its seen-key set; two viewers on the same store may
//!   both announce the same event.

use crate::clock::Clock;
use crate::config::{CirculationConfig, ViewerPolicy, ViewerRole};
use crate::model::book::BookId;
use crate::model::loan::{Loan, LoanId};
use crate::model::notification::Notification;
use crate::model::user::User;
use crate::model::ValidationError;
use crate::repo::circulation_repo::CirculationRepository;
use crate::scheduler::{watch_external_changes, PollingScheduler, SchedulerStats, Trigger};
use crate::service::circulation::CirculationService;
use crate::service::error::CirculationResult;
use crate::service::notifications::{
    AlertSink, LocalAction, NotificationEngine, ReconcileOutcome, ViewerScope,
};
use chrono::NaiveDate;
use log::{info, warn};
use std::time::Duration;

/// One viewer's view of the shared store: its loans, its notification log
/// and the polling cadence its role asks for.
pub struct ViewerSession<R, C>
where
    R: CirculationRepository + Clone,
    C: Clock + Clone,
{
    viewer: Option<User>,
    repo: R,
    circulation: CirculationService<R, C>,
    engine: NotificationEngine<R, C>,
    policy: ViewerPolicy,
    check_interval: Duration,
}

impl<R, C> ViewerSession<R, C>
where
    R: CirculationRepository + Clone,
    C: Clock + Clone,
{
    /// Desk session: sees every loan and the staff notification log.
    pub fn librarian(repo: R, clock: C, config: &CirculationConfig) -> Self {
        Self::build(repo, clock, config, ViewerScope::librarian(), None)
    }

    /// Patron session: sees only `user`'s loans and notifications.
    pub fn patron(repo: R, clock: C, config: &CirculationConfig, user: User) -> Self {
        let scope = ViewerScope::patron(user.id);
        Self::build(repo, clock, config, scope, Some(user))
    }

    /// Session matching `user`'s role: librarians get the desk, staff and
    /// patrons get a patron session scoped to themselves.
    pub fn for_user(repo: R, clock: C, config: &CirculationConfig, user: User) -> Self {
        match ViewerRole::for_user_role(user.role) {
            ViewerRole::Librarian => Self::librarian(repo, clock, config),
            ViewerRole::Patron => Self::patron(repo, clock, config, user),
        }
    }

    fn build(
        repo: R,
        clock: C,
        config: &CirculationConfig,
        scope: ViewerScope,
        viewer: Option<User>,
    ) -> Self {
        let policy = config.policy(scope.role);
        Self {
            viewer,
            circulation: CirculationService::new(repo.clone(), clock.clone())
                .with_loan_period(config.loan_period_days),
            engine: NotificationEngine::new(repo.clone(), clock, scope, policy),
            repo,
            policy,
            check_interval: config.change_check_interval(),
        }
    }

    /// Replaces the default log-only alert sink.
    pub fn with_alert_sink(mut self, alerts: Box<dyn AlertSink>) -> Self {
        self.engine = self.engine.with_alert_sink(alerts);
        self
    }

    /// Librarian for the desk, patron otherwise.
    pub fn role(&self) -> ViewerRole {
        self.engine.scope().role
    }

    /// Signed-in patron; `None` at the desk.
    pub fn viewer(&self) -> Option<&User> {
        self.viewer.as_ref()
    }

    /// Polling cadence and deadline window for this role.
    pub fn policy(&self) -> ViewerPolicy {
        self.policy
    }

    /// Underlying loan service. Transitions made through it are not announced.
    pub fn circulation(&self) -> &CirculationService<R, C> {
        &self.circulation
    }

    /// Notification engine scoped to this viewer.
    pub fn engine(&self) -> &NotificationEngine<R, C> {
        &self.engine
    }

    /// Scheduler configured with this viewer's polling cadence.
    pub fn scheduler(&self) -> PollingScheduler {
        PollingScheduler::new(self.policy.poll_interval())
    }

    /// Requests `book_id` on behalf of the signed-in patron.
    pub fn request_loan(&self, book_id: BookId) -> CirculationResult<Loan> {
        let borrower = self
            .viewer
            .as_ref()
            .ok_or(ValidationError::MissingField("borrower"))?;
        self.circulation.request_loan(borrower, book_id)
    }

    /// Approves and announces the approval in this viewer's log.
    ///
    /// # Contract
    /// - Announces only after the loan write succeeded.
    /// - A failed stock write does not fail the call; see
    ///   [`CirculationService::approve`].
    pub fn approve(&mut self, loan_id: LoanId) -> CirculationResult<Loan> {
        let loan = self.circulation.approve(loan_id)?;
        self.announce(LocalAction::Approved, &loan);
        Ok(loan)
    }

    /// Records a return and announces it in this viewer's log.
    ///
    /// Stock failures are logged, not returned, as in
    /// [`CirculationService::mark_returned`].
    pub fn mark_returned(&mut self, loan_id: LoanId) -> CirculationResult<Loan> {
        let loan = self.circulation.mark_returned(loan_id)?;
        self.announce(LocalAction::Returned, &loan);
        Ok(loan)
    }

    /// Not announced; the next pass picks up any deadline it creates.
    pub fn set_due_date(&self, loan_id: LoanId, due_date: NaiveDate) -> CirculationResult<Loan> {
        self.circulation.set_due_date(loan_id, due_date)
    }

    /// Loans this viewer observes: all of them at the desk, own ones otherwise.
    pub fn loans(&self) -> CirculationResult<Vec<Loan>> {
        match &self.viewer {
            Some(user) => self.circulation.loans_for(user.id),
            None => self.circulation.list_loans(),
        }
    }

    /// One reconciliation pass.
    pub fn reconcile(&mut self, trigger: Trigger) -> CirculationResult<ReconcileOutcome> {
        let outcome = self.engine.reconcile()?;
        if !outcome.emitted.is_empty() {
            info!(
                "event=reconcile_pass module=session status=ok role={} trigger={} emitted={}",
                self.role().as_str(),
                trigger.as_str(),
                outcome.emitted.len()
            );
        }
        Ok(outcome)
    }

    /// This viewer's log, newest first.
    pub fn notifications(&self) -> CirculationResult<Vec<Notification>> {
        self.engine.notifications()
    }

    /// Unread entries in this viewer's log.
    pub fn unread_count(&self) -> CirculationResult<usize> {
        self.engine.unread_count()
    }

    /// Returns how many entries changed; zero on a repeat call.
    pub fn mark_all_read(&self) -> CirculationResult<usize> {
        self.engine.mark_all_read()
    }

    /// Returns how many entries were removed.
    pub fn clear_all(&self) -> CirculationResult<usize> {
        self.engine.clear_all()
    }

    /// Runs passes until `scheduler` is cancelled, checking the store for
    /// writes from other processes alongside.
    pub async fn run(&mut self, scheduler: &PollingScheduler) -> SchedulerStats {
        let check_repo = self.repo.clone();
        let check_interval = self.check_interval;
        let role = self.role();
        info!(
            "event=session_run module=session status=start role={}",
            role.as_str()
        );

        let watcher = watch_external_changes(
            || check_repo.external_version(),
            scheduler.change_signal(),
            check_interval,
            scheduler.cancel_handle(),
        );
        let passes = scheduler.run(|trigger| {
            if let Err(err) = self.reconcile(trigger) {
                warn!(
                    "event=reconcile_pass module=session status=error role={} trigger={} error_code={} error={err}",
                    role.as_str(),
                    trigger.as_str(),
                    err.code()
                );
            }
        });
        let (signals, stats) = tokio::join!(watcher, passes);

        info!(
            "event=session_run module=session status=stopped role={} timer_passes={} change_passes={} signals={signals}",
            role.as_str(),
            stats.timer_passes,
            stats.change_passes
        );
        stats
    }

    fn announce(&mut self, action: LocalAction, loan: &Loan) {
        if let Err(err) = self.engine.record_local_action(action, loan) {
            warn!(
                "event=local_action module=session status=error loan_id={} error_code={} error={err}",
                loan.id,
                err.code()
            );
        }
    }
}
