//! Notification record.
//!
//! Notifications are only ever mutated to flip `read`, and only removed by
//! an explicit bulk clear of the viewer's own audience.

use super::loan::LoanId;
use super::user::UserId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub type NotificationId = Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    NewLoanRequest,
    DeadlineWarning,
    InfoApproved,
    InfoReturned,
}

impl NotificationKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::NewLoanRequest => "new_loan_request",
            Self::DeadlineWarning => "deadline_warning",
            Self::InfoApproved => "info_approved",
            Self::InfoReturned => "info_returned",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    pub id: NotificationId,
    pub timestamp: DateTime<Utc>,
    /// Serialized as `type` to match the stored log shape.
    #[serde(rename = "type")]
    pub kind: NotificationKind,
    pub text: String,
    pub read: bool,
    #[serde(default)]
    pub loan_id: Option<LoanId>,
    /// `None` addresses the staff log; `Some` addresses one patron.
    #[serde(default)]
    pub recipient: Option<UserId>,
}

impl Notification {
    /// Creates an unread notification with a generated id.
    pub fn new(
        kind: NotificationKind,
        text: impl Into<String>,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp,
            kind,
            text: text.into(),
            read: false,
            loan_id: None,
            recipient: None,
        }
    }

    pub fn for_loan(mut self, loan_id: LoanId) -> Self {
        self.loan_id = Some(loan_id);
        self
    }

    /// `None` addresses the staff log.
    pub fn addressed_to(mut self, recipient: Option<UserId>) -> Self {
        self.recipient = recipient;
        self
    }
}
