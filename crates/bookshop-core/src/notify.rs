//! Notifications
//!
//! Slow, non-critical side effects (customer emails and the like). The
//! dispatcher runs every delivery on its own task and only logs failures, so
//! a broken mail relay can never fail the request that triggered it.

use async_trait::async_trait;
use serde::Serialize;
use std::sync::Arc;

use crate::error::Result;
use crate::ids::{MessageId, PaymentId, SubscriberId};

/// Something worth telling a user about
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Notification {
    /// A purchase settled and the item was granted
    PurchaseCompleted {
        payment_id: PaymentId,
        email: String,
        item_name: String,
    },

    /// Thank-you for a contact form message
    ContactReceived {
        message_id: MessageId,
        email: String,
        name: String,
    },

    /// Welcome mail for a new newsletter subscriber
    Subscribed {
        subscriber_id: SubscriberId,
        email: String,
        first_name: String,
    },

    /// Heads-up for the site admin
    AdminAlert { email: String, subject: String },
}

impl Notification {
    pub fn recipient(&self) -> &str {
        match self {
            Self::PurchaseCompleted { email, .. }
            | Self::ContactReceived { email, .. }
            | Self::Subscribed { email, .. }
            | Self::AdminAlert { email, .. } => email,
        }
    }
}

/// Delivery channel (email provider, queue, ...)
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, notification: &Notification) -> Result<()>;

    /// Channel name for logs
    fn name(&self) -> &str;
}

/// Notifier that only writes a structured log line
#[derive(Debug, Default)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn send(&self, notification: &Notification) -> Result<()> {
        tracing::info!(
            recipient = %notification.recipient(),
            notification = ?notification,
            "Notification delivered"
        );
        Ok(())
    }

    fn name(&self) -> &str {
        "log"
    }
}

/// Fire-and-forget delivery on a background task
#[derive(Clone)]
pub struct NotificationDispatcher {
    notifier: Arc<dyn Notifier>,
}

impl NotificationDispatcher {
    pub fn new(notifier: Arc<dyn Notifier>) -> Self {
        Self { notifier }
    }

    /// Queue a notification; returns immediately.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn dispatch(&self, notification: Notification) -> tokio::task::JoinHandle<()> {
        let notifier = Arc::clone(&self.notifier);
        tokio::spawn(async move {
            if let Err(e) = notifier.send(&notification).await {
                tracing::error!(
                    channel = notifier.name(),
                    recipient = %notification.recipient(),
                    error = %e,
                    "Notification failed"
                );
            }
        })
    }
}

impl Default for NotificationDispatcher {
    fn default() -> Self {
        Self::new(Arc::new(LogNotifier))
    }
}
