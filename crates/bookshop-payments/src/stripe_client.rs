//! Stripe Checkout Integration
//!
//! Implements the "Stripe Checkout (Hosted)" approach: one-time payment
//! sessions whose `client_reference_id` carries the payment record id.

use async_trait::async_trait;
use stripe::{
    CheckoutSession as StripeCheckoutSession, CheckoutSessionMode, Client,
    CreateCheckoutSession, CreateCheckoutSessionLineItems,
    CreateCheckoutSessionLineItemsPriceData,
    CreateCheckoutSessionLineItemsPriceDataProductData,
    CreateCheckoutSessionPaymentMethodTypes, Currency,
};

use crate::error::{PaymentError, Result};
use crate::provider::{HostedSession, PaymentProvider, SessionRequest};

/// Stripe client wrapper
pub struct StripeClient {
    client: Client,
}

impl StripeClient {
    /// Create a new Stripe client
    pub fn new(secret_key: &str) -> Self {
        Self {
            client: Client::new(secret_key),
        }
    }
}

#[async_trait]
impl PaymentProvider for StripeClient {
    async fn create_session(&self, request: SessionRequest) -> Result<HostedSession> {
        let mut params = CreateCheckoutSession::new();
        params.mode = Some(CheckoutSessionMode::Payment);
        params.payment_method_types = Some(vec![CreateCheckoutSessionPaymentMethodTypes::Card]);
        params.client_reference_id = Some(&request.correlation_token);
        params.customer_email = request.customer_email.as_deref();
        params.success_url = Some(&request.success_url);
        params.cancel_url = Some(&request.cancel_url);

        let mut metadata = std::collections::HashMap::new();
        metadata.insert("payment_id".to_string(), request.correlation_token.clone());
        params.metadata = Some(metadata);

        params.line_items = Some(vec![CreateCheckoutSessionLineItems {
            quantity: Some(1),
            price_data: Some(CreateCheckoutSessionLineItemsPriceData {
                currency: Currency::USD,
                unit_amount: Some(request.unit_amount),
                product_data: Some(CreateCheckoutSessionLineItemsPriceDataProductData {
                    name: request.item_name.clone(),
                    images: request.image_url.clone().map(|url| vec![url]),
                    ..Default::default()
                }),
                ..Default::default()
            }),
            ..Default::default()
        }]);

        let session = StripeCheckoutSession::create(&self.client, params)
            .await
            .map_err(|e| PaymentError::Provider(e.to_string()))?;

        let url = session
            .url
            .ok_or_else(|| PaymentError::Provider("No checkout URL returned".into()))?;

        Ok(HostedSession {
            id: session.id.to_string(),
            url,
        })
    }

    fn name(&self) -> &str {
        "stripe"
    }
}
