//! Payment Error Types

use bookshop_core::CoreError;
use thiserror::Error;

/// Result type alias
pub type Result<T> = std::result::Result<T, PaymentError>;

/// Payment-related errors
#[derive(Error, Debug)]
pub enum PaymentError {
    /// Hosted checkout session could not be created
    #[error("Payment provider error: {0}")]
    Provider(String),

    /// Webhook signature verification failed
    #[error("Webhook signature invalid: {0}")]
    Signature(String),

    /// Webhook payload parsing failed
    #[error("Webhook parse error: {0}")]
    WebhookParse(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Domain or storage error
    #[error(transparent)]
    Core(#[from] CoreError),
}

impl PaymentError {
    /// Get user-friendly message
    pub fn user_message(&self) -> String {
        match self {
            Self::Provider(_) => "Payment processing failed. Please try again.".into(),
            Self::Signature(_) => "Invalid signature.".into(),
            Self::WebhookParse(_) => "Invalid payload.".into(),
            Self::Config(_) => "Service configuration error.".into(),
            Self::Core(inner) => inner.user_message(),
        }
    }
}
