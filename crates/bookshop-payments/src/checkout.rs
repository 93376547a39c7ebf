//! Checkout Initiation
//!
//! Records the purchase attempt first, then asks the provider for a hosted
//! session. A provider failure leaves the record `pending`; nothing cleans
//! those up, the customer simply retries.

use serde::{Deserialize, Serialize};
use std::sync::Arc;

use bookshop_core::{CoreError, ItemId, PaymentId, Repositories, UserId};

use crate::error::{PaymentError, Result};
use crate::provider::{PaymentProvider, SessionRequest};

/// Where the hosted page sends the customer afterwards
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckoutUrls {
    pub success_url: String,
    pub cancel_url: String,
}

impl CheckoutUrls {
    /// The frontend's profile page, flagged with the outcome
    pub fn for_frontend(frontend_url: &str) -> Self {
        let base = frontend_url.trim_end_matches('/');
        Self {
            success_url: format!("{base}/user-profile?result=success"),
            cancel_url: format!("{base}/user-profile?result=fail"),
        }
    }
}

/// Result of a successful checkout initiation
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CheckoutRedirect {
    /// The pending payment record (also the correlation token)
    pub payment_id: PaymentId,

    /// Provider session ID
    pub session_id: String,

    /// URL to redirect the customer to
    pub redirect_url: String,
}

/// Creates payment records and hosted checkout sessions
pub struct CheckoutInitiator {
    repos: Repositories,
    provider: Arc<dyn PaymentProvider>,
    urls: CheckoutUrls,
    image_url: Option<String>,
}

impl CheckoutInitiator {
    pub fn new(repos: Repositories, provider: Arc<dyn PaymentProvider>, urls: CheckoutUrls) -> Self {
        Self {
            repos,
            provider,
            urls,
            image_url: None,
        }
    }

    /// Product image shown on the hosted page
    #[must_use]
    pub fn with_product_image(mut self, image_url: Option<String>) -> Self {
        self.image_url = image_url;
        self
    }

    /// Start a purchase of `item_id` for `user_id`.
    ///
    /// Exactly one `pending` record is written before the provider is
    /// called, whatever happens afterwards.
    pub async fn start(&self, user_id: UserId, item_id: ItemId) -> Result<CheckoutRedirect> {
        let item = self
            .repos
            .items
            .get(item_id)
            .await?
            .ok_or_else(|| CoreError::not_found("Item", item_id))?;

        let user = self
            .repos
            .users
            .get(user_id)
            .await?
            .ok_or_else(|| CoreError::Auth(format!("unknown user {user_id}")))?;

        let record = self.repos.payments.insert_pending(user.id, item.id).await?;

        tracing::info!(
            payment_id = %record.id,
            user_id = %user.id,
            item_id = %item.id,
            price = item.price,
            locale = %item.locale,
            "Created pending payment"
        );

        let request = SessionRequest {
            correlation_token: record.correlation_token(),
            item_name: item.name.clone(),
            unit_amount: item.price,
            customer_email: Some(user.email.clone()),
            image_url: self.image_url.clone(),
            success_url: self.urls.success_url.clone(),
            cancel_url: self.urls.cancel_url.clone(),
        };

        let session = self.provider.create_session(request).await.map_err(|e| {
            tracing::error!(
                payment_id = %record.id,
                provider = self.provider.name(),
                error = %e,
                "Checkout session creation failed, payment left pending"
            );
            match e {
                PaymentError::Provider(_) => e,
                other => PaymentError::Provider(other.to_string()),
            }
        })?;

        if let Err(e) = self.repos.payments.attach_session(record.id, &session.id).await {
            tracing::warn!(payment_id = %record.id, error = %e, "Could not store checkout session id");
        }

        Ok(CheckoutRedirect {
            payment_id: record.id,
            session_id: session.id,
            redirect_url: session.url,
        })
    }
}
