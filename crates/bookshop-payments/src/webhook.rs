//! Stripe Webhook Handling
//!
//! Verifies and reconciles settlement notifications. Delivery is
//! at-least-once and unordered, so every step here is idempotent: a record
//! that is already `completed` is a no-op, the grant is a set union, and only
//! the caller that wins the conditional `pending -> completed` update sends
//! the purchase notification.

use serde::Deserialize;

use bookshop_core::{
    Completion, CoreError, Notification, NotificationDispatcher, PaymentId, PaymentRecord,
    Repositories,
};

use crate::error::{PaymentError, Result};
use crate::signature::WebhookVerifier;

const CHECKOUT_COMPLETED: &str = "checkout.session.completed";
const ASYNC_PAYMENT_SUCCEEDED: &str = "checkout.session.async_payment_succeeded";

/// Parsed webhook event
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum WebhookEvent {
    /// Money has been captured for a checkout session
    PaymentCompleted {
        event_id: String,
        session_id: String,
        correlation_token: Option<String>,
    },

    /// Checkout finished but a delayed payment method has not settled yet
    PaymentPending { event_id: String, session_id: String },

    /// Unhandled event type
    Other { event_type: String },
}

#[derive(Deserialize)]
struct RawEvent {
    #[serde(default)]
    id: String,
    #[serde(rename = "type")]
    event_type: String,
    #[serde(default)]
    data: Option<RawEventData>,
}

#[derive(Deserialize)]
struct RawEventData {
    object: serde_json::Value,
}

#[derive(Deserialize)]
struct RawCheckoutSession {
    #[serde(default)]
    id: String,
    #[serde(default)]
    client_reference_id: Option<String>,
    #[serde(default)]
    payment_status: Option<String>,
}

impl WebhookEvent {
    /// Parse an (already verified) event payload
    pub fn parse(payload: &[u8]) -> Result<Self> {
        let raw: RawEvent = serde_json::from_slice(payload)
            .map_err(|e| PaymentError::WebhookParse(e.to_string()))?;

        match raw.event_type.as_str() {
            CHECKOUT_COMPLETED | ASYNC_PAYMENT_SUCCEEDED => {
                let object = raw
                    .data
                    .ok_or_else(|| PaymentError::WebhookParse("Missing event data".into()))?
                    .object;
                let session: RawCheckoutSession = serde_json::from_value(object)
                    .map_err(|_| PaymentError::WebhookParse("Invalid checkout session data".into()))?;

                if raw.event_type == CHECKOUT_COMPLETED
                    && session.payment_status.as_deref() == Some("unpaid")
                {
                    return Ok(Self::PaymentPending {
                        event_id: raw.id,
                        session_id: session.id,
                    });
                }

                Ok(Self::PaymentCompleted {
                    event_id: raw.id,
                    session_id: session.id,
                    correlation_token: session.client_reference_id,
                })
            }
            _ => Ok(Self::Other {
                event_type: raw.event_type,
            }),
        }
    }
}

/// What reconciling an event did
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ReconcileOutcome {
    /// This delivery settled the payment and granted the item
    Granted {
        payment: PaymentRecord,
        /// False if the user already owned the item through another purchase
        newly_owned: bool,
    },

    /// The payment was settled by an earlier delivery
    AlreadySettled { payment: PaymentRecord },

    /// Acknowledged without side effects
    Ignored { event_type: String },
}

impl ReconcileOutcome {
    /// Short acknowledgement for the HTTP response
    pub const fn detail(&self) -> &'static str {
        match self {
            Self::Granted { .. } | Self::AlreadySettled { .. } => "OK",
            Self::Ignored { .. } => "Event ignored",
        }
    }
}

/// Webhook reconciler
pub struct WebhookReconciler {
    repos: Repositories,
    verifier: WebhookVerifier,
    notifications: NotificationDispatcher,
}

impl WebhookReconciler {
    pub fn new(
        repos: Repositories,
        verifier: WebhookVerifier,
        notifications: NotificationDispatcher,
    ) -> Self {
        Self {
            repos,
            verifier,
            notifications,
        }
    }

    /// Verify, parse and apply a delivery received now
    pub async fn handle(&self, payload: &[u8], signature: &str) -> Result<ReconcileOutcome> {
        self.handle_at(payload, signature, chrono::Utc::now().timestamp())
            .await
    }

    /// Verify, parse and apply a delivery as of `now` (unix seconds).
    ///
    /// Nothing is read or written before the signature checks out.
    pub async fn handle_at(
        &self,
        payload: &[u8],
        signature: &str,
        now: i64,
    ) -> Result<ReconcileOutcome> {
        self.verifier.verify(payload, signature, now)?;
        let event = WebhookEvent::parse(payload)?;
        self.apply(event).await
    }

    /// Apply a verified event
    pub async fn apply(&self, event: WebhookEvent) -> Result<ReconcileOutcome> {
        match event {
            WebhookEvent::PaymentCompleted {
                event_id,
                session_id,
                correlation_token,
            } => {
                tracing::info!(
                    event_id = %event_id,
                    session_id = %session_id,
                    correlation_token = ?correlation_token,
                    "Processing completed payment"
                );
                self.settle(correlation_token.as_deref()).await
            }

            WebhookEvent::PaymentPending {
                event_id,
                session_id,
            } => {
                tracing::info!(
                    event_id = %event_id,
                    session_id = %session_id,
                    "Checkout completed, payment still processing"
                );
                Ok(ReconcileOutcome::Ignored {
                    event_type: CHECKOUT_COMPLETED.into(),
                })
            }

            WebhookEvent::Other { event_type } => {
                tracing::debug!(event_type = %event_type, "Unhandled webhook event");
                Ok(ReconcileOutcome::Ignored { event_type })
            }
        }
    }

    async fn settle(&self, correlation_token: Option<&str>) -> Result<ReconcileOutcome> {
        let token = correlation_token.unwrap_or_default();
        let id: PaymentId = token
            .parse()
            .map_err(|_| CoreError::not_found("Payment", token))?;

        let record = self
            .repos
            .payments
            .get(id)
            .await?
            .ok_or_else(|| CoreError::not_found("Payment", id))?;

        if record.is_completed() {
            tracing::info!(payment_id = %id, "Payment already settled, skipping grant");
            return Ok(ReconcileOutcome::AlreadySettled { payment: record });
        }

        // Grant before completing: if we fail in between, the record stays
        // pending and the provider's redelivery finishes the job.
        let newly_owned = self
            .repos
            .users
            .grant_item(record.user_id, record.item_id)
            .await?;

        match self.repos.payments.complete_if_pending(id).await? {
            Completion::Applied(payment) => {
                tracing::info!(
                    payment_id = %payment.id,
                    user_id = %payment.user_id,
                    item_id = %payment.item_id,
                    newly_owned,
                    "Payment completed, item granted"
                );
                self.notify_purchase(&payment).await;
                Ok(ReconcileOutcome::Granted {
                    payment,
                    newly_owned,
                })
            }
            Completion::AlreadyCompleted(payment) => {
                tracing::info!(payment_id = %payment.id, "Concurrent delivery settled payment first");
                Ok(ReconcileOutcome::AlreadySettled { payment })
            }
        }
    }

    async fn notify_purchase(&self, payment: &PaymentRecord) {
        let user = self.repos.users.get(payment.user_id).await;
        let item = self.repos.items.get(payment.item_id).await;

        match (user, item) {
            (Ok(Some(user)), Ok(Some(item))) => {
                self.notifications.dispatch(Notification::PurchaseCompleted {
                    payment_id: payment.id,
                    email: user.email,
                    item_name: item.name,
                });
            }
            _ => {
                tracing::warn!(payment_id = %payment.id, "Skipping purchase notification, user or item unavailable");
            }
        }
    }
}
