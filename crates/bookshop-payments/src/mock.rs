//! Mock Payment Provider
//!
//! For testing and local development. Returns predictable session URLs and
//! remembers every request it saw.

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::error::{PaymentError, Result};
use crate::provider::{HostedSession, PaymentProvider, SessionRequest};

/// Mock provider with optional forced failure
pub struct MockPaymentProvider {
    failure: Option<String>,
    requests: Mutex<Vec<SessionRequest>>,
}

impl Default for MockPaymentProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl MockPaymentProvider {
    pub fn new() -> Self {
        Self {
            failure: None,
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Provider whose every session creation fails with `message`
    pub fn failing(message: impl Into<String>) -> Self {
        Self {
            failure: Some(message.into()),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Requests received so far
    pub async fn requests(&self) -> Vec<SessionRequest> {
        self.requests.lock().await.clone()
    }
}

#[async_trait]
impl PaymentProvider for MockPaymentProvider {
    async fn create_session(&self, request: SessionRequest) -> Result<HostedSession> {
        let token = request.correlation_token.clone();
        self.requests.lock().await.push(request);

        if let Some(message) = &self.failure {
            return Err(PaymentError::Provider(message.clone()));
        }

        Ok(HostedSession {
            id: format!("cs_mock_{token}"),
            url: format!("https://checkout.mock.test/pay/cs_mock_{token}"),
        })
    }

    fn name(&self) -> &str {
        "mock"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request() -> SessionRequest {
        SessionRequest {
            correlation_token: "99".into(),
            item_name: "Map Your Freedom".into(),
            unit_amount: 500,
            customer_email: None,
            image_url: None,
            success_url: "https://shop.test/ok".into(),
            cancel_url: "https://shop.test/cancel".into(),
        }
    }

    #[tokio::test]
    async fn test_mock_session() {
        let provider = MockPaymentProvider::new();
        let session = provider.create_session(request()).await.unwrap();
        assert_eq!(session.id, "cs_mock_99");
        assert!(session.url.ends_with("cs_mock_99"));
        assert_eq!(provider.requests().await.len(), 1);
    }

    #[tokio::test]
    async fn test_failing_mock_still_records() {
        let provider = MockPaymentProvider::failing("card network down");
        let err = provider.create_session(request()).await.unwrap_err();
        assert!(matches!(err, PaymentError::Provider(_)));
        assert_eq!(provider.requests().await.len(), 1);
    }
}
