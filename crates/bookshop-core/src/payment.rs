//! Payment Records
//!
//! One record per purchase attempt. The record id is handed to the payment
//! provider as the correlation token and echoed back in the webhook.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::{ItemId, PaymentId, UserId};

/// Settlement state of a purchase attempt
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SettlementState {
    #[default]
    Pending,
    Completed,
}

impl SettlementState {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Completed => "completed",
        }
    }
}

/// A purchase attempt
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentRecord {
    pub id: PaymentId,

    pub user_id: UserId,

    pub item_id: ItemId,

    pub state: SettlementState,

    /// Hosted checkout session id, once the provider created one
    #[serde(default)]
    pub provider_session_id: Option<String>,

    pub created_at: DateTime<Utc>,

    pub updated_at: DateTime<Utc>,

    #[serde(default)]
    pub completed_at: Option<DateTime<Utc>>,
}

impl PaymentRecord {
    pub(crate) fn pending(id: PaymentId, user_id: UserId, item_id: ItemId) -> Self {
        let now = Utc::now();
        Self {
            id,
            user_id,
            item_id,
            state: SettlementState::Pending,
            provider_session_id: None,
            created_at: now,
            updated_at: now,
            completed_at: None,
        }
    }

    pub fn is_completed(&self) -> bool {
        self.state == SettlementState::Completed
    }

    /// The token passed to the payment provider
    pub fn correlation_token(&self) -> String {
        self.id.to_string()
    }

    pub(crate) fn mark_completed(&mut self) {
        let now = Utc::now();
        self.state = SettlementState::Completed;
        self.updated_at = now;
        self.completed_at = Some(now);
    }
}

/// Result of a conditional `pending -> completed` update
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Completion {
    /// This call performed the transition
    Applied(PaymentRecord),

    /// The record was already completed; nothing changed
    AlreadyCompleted(PaymentRecord),
}

impl Completion {
    pub const fn record(&self) -> &PaymentRecord {
        match self {
            Self::Applied(record) | Self::AlreadyCompleted(record) => record,
        }
    }

    pub const fn was_applied(&self) -> bool {
        matches!(self, Self::Applied(_))
    }
}
