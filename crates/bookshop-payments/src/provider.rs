//! Payment Provider Port
//!
//! The hosted-checkout provider behind a trait, so checkout logic can run
//! against Stripe in production and a mock in tests.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Request for a hosted checkout session
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionRequest {
    /// Opaque token echoed back in the completion webhook
    pub correlation_token: String,

    /// Product name shown on the hosted page
    pub item_name: String,

    /// Amount in minor currency units
    pub unit_amount: i64,

    /// Prefills the email field on the hosted page
    #[serde(default)]
    pub customer_email: Option<String>,

    /// Optional product image URL
    #[serde(default)]
    pub image_url: Option<String>,

    /// URL to redirect after successful payment
    pub success_url: String,

    /// URL to redirect if checkout is cancelled
    pub cancel_url: String,
}

/// A created hosted checkout session
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostedSession {
    /// Provider session ID
    pub id: String,

    /// URL to redirect the customer to
    pub url: String,
}

/// Hosted checkout provider (Strategy pattern)
#[async_trait]
pub trait PaymentProvider: Send + Sync {
    /// Create a hosted checkout session
    async fn create_session(&self, request: SessionRequest) -> Result<HostedSession>;

    /// Provider name
    fn name(&self) -> &str;
}
