//! Notification dedup engine.
//!
//! # Responsibility
//! - Turn observed loan state into notifications, at most once per event
//!   identity for the life of this process.
//! - Own the viewer's slice of the persisted notification log (read flags,
//!   bulk clear).
//!
//! # Invariants
//! - Planning is pure: snapshot + seen keys + policy + today in, drafts and
//!   new keys out. It does not depend on what triggered the pass.
//! - The seen-key set lives in memory only. Clearing the persisted log does
//!   not re-arm events already seen by this process; a fresh process starts
//!   with an empty set.
//! - Deadline warnings are keyed by due date, so moving the due date
//!   re-arms the warning.
//! - New notifications are prepended (newest first) and start unread.

use crate::clock::Clock;
use crate::config::{ViewerPolicy, ViewerRole};
use crate::model::loan::{Loan, LoanId, LoanStatus};
use crate::model::notification::{Notification, NotificationKind};
use crate::model::user::UserId;
use crate::repo::circulation_repo::{CirculationRepository, StoreSnapshot};
use crate::service::deadline::classify_loan;
use crate::service::error::CirculationResult;
use chrono::NaiveDate;
use log::{debug, info};
use std::collections::HashSet;

/// Identity of an event that may produce one notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DedupKey {
    pub kind: NotificationKind,
    pub loan_id: LoanId,
    /// Only set for deadline warnings.
    pub due_date: Option<NaiveDate>,
}

impl DedupKey {
    /// Key for an event that happens at most once per loan.
    pub fn new(kind: NotificationKind, loan_id: LoanId) -> Self {
        Self {
            kind,
            loan_id,
            due_date: None,
        }
    }

    /// Deadline warnings are keyed by due date too, so moving the due date
    /// allows a fresh warning.
    pub fn deadline(loan_id: LoanId, due_date: NaiveDate) -> Self {
        Self {
            kind: NotificationKind::DeadlineWarning,
            loan_id,
            due_date: Some(due_date),
        }
    }
}

/// Event identities already turned into notifications by this process.
#[derive(Debug, Clone, Default)]
pub struct DedupKeySet {
    keys: HashSet<DedupKey>,
}

impl DedupKeySet {
    pub fn contains(&self, key: &DedupKey) -> bool {
        self.keys.contains(key)
    }

    /// Returns `false` when the key was already present.
    pub fn insert(&mut self, key: DedupKey) -> bool {
        self.keys.insert(key)
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

/// Whose notifications a viewer reads and writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ViewerScope {
    pub role: ViewerRole,
    /// Set for patron viewers; librarians read the staff log.
    pub user_id: Option<UserId>,
}

impl ViewerScope {
    pub fn librarian() -> Self {
        Self {
            role: ViewerRole::Librarian,
            user_id: None,
        }
    }

    pub fn patron(user_id: UserId) -> Self {
        Self {
            role: ViewerRole::Patron,
            user_id: Some(user_id),
        }
    }

    /// Recipient stamped on notifications this viewer emits.
    pub fn recipient(&self) -> Option<UserId> {
        match self.role {
            ViewerRole::Librarian => None,
            ViewerRole::Patron => self.user_id,
        }
    }

    /// Whether `notification` belongs in this viewer's log.
    pub fn owns(&self, notification: &Notification) -> bool {
        notification.recipient == self.recipient()
    }

    fn observes(&self, loan: &Loan) -> bool {
        match self.role {
            ViewerRole::Librarian => true,
            ViewerRole::Patron => Some(loan.borrower.user_id) == self.user_id,
        }
    }
}

/// Notification decided on but not yet persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotificationDraft {
    pub key: DedupKey,
    pub text: String,
}

/// Output of one planning step.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcilePlan {
    /// In loan order.
    pub drafts: Vec<NotificationDraft>,
}

impl ReconcilePlan {
    pub fn new_keys(&self) -> impl Iterator<Item = DedupKey> + '_ {
        self.drafts.iter().map(|draft| draft.key)
    }

    pub fn is_empty(&self) -> bool {
        self.drafts.is_empty()
    }
}

/// Decides which notifications one reconciliation pass should emit.
pub fn plan_reconciliation(
    snapshot: &StoreSnapshot,
    seen: &DedupKeySet,
    scope: &ViewerScope,
    policy: &ViewerPolicy,
    today: NaiveDate,
) -> ReconcilePlan {
    let mut planned = HashSet::new();
    let mut drafts = Vec::new();
    let mut propose = |key: DedupKey, text: String| {
        if !seen.contains(&key) && planned.insert(key) {
            drafts.push(NotificationDraft { key, text });
        }
    };

    for loan in snapshot.loans.iter().filter(|loan| scope.observes(loan)) {
        if scope.role == ViewerRole::Librarian && loan.status == LoanStatus::Pending {
            propose(
                DedupKey::new(NotificationKind::NewLoanRequest, loan.id),
                format!(
                    "New loan request: {} by {}",
                    book_title(loan),
                    borrower_name(loan)
                ),
            );
        }

        if !loan.is_active() {
            continue;
        }
        let (Some(due_date), Some(deadline)) = (
            loan.due_date,
            classify_loan(loan, today, policy.near_deadline_days),
        ) else {
            continue;
        };
        if deadline.is_near && !deadline.is_overdue {
            propose(
                DedupKey::deadline(loan.id, due_date),
                deadline_text(scope.role, loan, deadline.days_remaining),
            );
        }
    }

    ReconcilePlan { drafts }
}

fn book_title(loan: &Loan) -> &str {
    non_blank(&loan.book.title).unwrap_or("Book")
}

fn borrower_name(loan: &Loan) -> &str {
    non_blank(&loan.borrower.name).unwrap_or("User")
}

fn non_blank(value: &str) -> Option<&str> {
    Some(value.trim()).filter(|value| !value.is_empty())
}

fn deadline_text(role: ViewerRole, loan: &Loan, days: i64) -> String {
    let unit = if days == 1 { "day" } else { "days" };
    match role {
        ViewerRole::Librarian => format!(
            "Due soon ({days} {unit}): {} for {}",
            book_title(loan),
            borrower_name(loan)
        ),
        ViewerRole::Patron => format!("Due soon ({days} {unit}): {}", book_title(loan)),
    }
}

/// Desk action announced synchronously by the viewer that performed it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LocalAction {
    Approved,
    Returned,
}

impl LocalAction {
    pub fn kind(self) -> NotificationKind {
        match self {
            Self::Approved => NotificationKind::InfoApproved,
            Self::Returned => NotificationKind::InfoReturned,
        }
    }

    fn text(self, loan: &Loan) -> String {
        match self {
            Self::Approved => format!("Loan approved: {}", book_title(loan)),
            Self::Returned => format!("Return recorded: {}", book_title(loan)),
        }
    }
}

/// Audible/visual alert raised once per newly emitted notification.
pub trait AlertSink {
    fn alert(&self, notification: &Notification);
}

/// Default sink: records the alert in the log.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogAlertSink;

impl AlertSink for LogAlertSink {
    fn alert(&self, notification: &Notification) {
        info!(
            "event=notification_alert module=notifications status=ok kind={} notification_id={}",
            notification.kind.as_str(),
            notification.id
        );
    }
}

/// Result of one reconciliation pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcileOutcome {
    pub loans_observed: usize,
    /// Newest first, as prepended to the log.
    pub emitted: Vec<Notification>,
}

/// Per-viewer notification log writer with in-process deduplication.
pub struct NotificationEngine<R: CirculationRepository, C: Clock> {
    repo: R,
    clock: C,
    scope: ViewerScope,
    policy: ViewerPolicy,
    seen: DedupKeySet,
    alerts: Box<dyn AlertSink>,
}

impl<R: CirculationRepository, C: Clock> NotificationEngine<R, C> {
    /// Starts with an empty seen-key set.
    pub fn new(repo: R, clock: C, scope: ViewerScope, policy: ViewerPolicy) -> Self {
        Self {
            repo,
            clock,
            scope,
            policy,
            seen: DedupKeySet::default(),
            alerts: Box::new(LogAlertSink),
        }
    }

    pub fn with_alert_sink(mut self, alerts: Box<dyn AlertSink>) -> Self {
        self.alerts = alerts;
        self
    }

    pub fn scope(&self) -> &ViewerScope {
        &self.scope
    }

    /// Keys announced so far by this engine; never shrinks.
    pub fn seen_keys(&self) -> &DedupKeySet {
        &self.seen
    }

    /// Re-reads the store, plans, and emits whatever is new.
    pub fn reconcile(&mut self) -> CirculationResult<ReconcileOutcome> {
        let snapshot = self.repo.snapshot()?;
        let plan = plan_reconciliation(
            &snapshot,
            &self.seen,
            &self.scope,
            &self.policy,
            self.clock.today(),
        );
        let emitted = self.emit(plan)?;
        debug!(
            "event=reconcile module=notifications status=ok loans={} emitted={}",
            snapshot.loans.len(),
            emitted.len()
        );
        Ok(ReconcileOutcome {
            loans_observed: snapshot.loans.len(),
            emitted,
        })
    }

    /// Emits the notification for an action this process just performed.
    ///
    /// Returns `None` when the same action on the same loan was already
    /// announced.
    pub fn record_local_action(
        &mut self,
        action: LocalAction,
        loan: &Loan,
    ) -> CirculationResult<Option<Notification>> {
        let key = DedupKey::new(action.kind(), loan.id);
        if self.seen.contains(&key) {
            return Ok(None);
        }
        let plan = ReconcilePlan {
            drafts: vec![NotificationDraft {
                key,
                text: action.text(loan),
            }],
        };
        Ok(self.emit(plan)?.into_iter().next())
    }

    /// Notifications addressed to this viewer, newest first.
    pub fn notifications(&self) -> CirculationResult<Vec<Notification>> {
        Ok(self
            .repo
            .load_notifications()?
            .into_iter()
            .filter(|notification| self.scope.owns(notification))
            .collect())
    }

    pub fn unread_count(&self) -> CirculationResult<usize> {
        Ok(self
            .notifications()?
            .iter()
            .filter(|notification| !notification.read)
            .count())
    }

    /// Flags every notification of this viewer as read.
    ///
    /// Writes only when something changed, so repeating it is a no-op.
    pub fn mark_all_read(&self) -> CirculationResult<usize> {
        let mut log = self.repo.load_notifications()?;
        let mut flipped = 0;
        for notification in log
            .iter_mut()
            .filter(|notification| self.scope.owns(notification) && !notification.read)
        {
            notification.read = true;
            flipped += 1;
        }
        if flipped > 0 {
            self.repo.save_notifications(&log)?;
        }
        info!("event=notifications_read module=notifications status=ok flipped={flipped}");
        Ok(flipped)
    }

    /// Empties this viewer's part of the persisted log.
    ///
    /// The seen-key set is left untouched: events already announced stay
    /// silent for the rest of this process.
    pub fn clear_all(&self) -> CirculationResult<usize> {
        let mut log = self.repo.load_notifications()?;
        let before = log.len();
        log.retain(|notification| !self.scope.owns(notification));
        let removed = before - log.len();
        self.repo.save_notifications(&log)?;
        info!("event=notifications_clear module=notifications status=ok removed={removed}");
        Ok(removed)
    }

    fn emit(&mut self, plan: ReconcilePlan) -> CirculationResult<Vec<Notification>> {
        if plan.is_empty() {
            return Ok(Vec::new());
        }

        let keys: Vec<DedupKey> = plan.new_keys().collect();
        let now = self.clock.now();
        let recipient = self.scope.recipient();
        // Each draft is prepended in turn, so the last one planned ends up first.
        let fresh: Vec<Notification> = plan
            .drafts
            .into_iter()
            .rev()
            .map(|draft| {
                Notification::new(draft.key.kind, draft.text, now)
                    .for_loan(draft.key.loan_id)
                    .addressed_to(recipient)
            })
            .collect();

        // Re-read right before writing to narrow the lost-update window.
        let mut log = fresh.clone();
        log.extend(self.repo.load_notifications()?);
        self.repo.save_notifications(&log)?;

        for key in keys {
            self.seen.insert(key);
        }
        for notification in &fresh {
            info!(
                "event=notification_emit module=notifications status=ok kind={} loan_id={} notification_id={}",
                notification.kind.as_str(),
                notification.loan_id.map(|id| id.to_string()).unwrap_or_default(),
                notification.id
            );
            self.alerts.alert(notification);
        }
        Ok(fresh)
    }
}
