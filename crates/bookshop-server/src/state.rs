//! Application State

use std::sync::Arc;

use bookshop_core::{NotificationDispatcher, Repositories};
use bookshop_payments::{
    CheckoutInitiator, CheckoutUrls, PaymentProvider, WebhookReconciler, WebhookVerifier,
};

use crate::auth::TokenIssuer;
use crate::config::AppConfig;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,

    /// Catalog, users and payment records
    pub repos: Repositories,

    pub tokens: Arc<TokenIssuer>,

    /// Checkout initiator (optional - None if payments are not configured)
    pub checkout: Option<Arc<CheckoutInitiator>>,

    /// Webhook reconciler (optional - None if payments are not configured)
    pub reconciler: Option<Arc<WebhookReconciler>>,

    /// Background email delivery
    pub notifications: NotificationDispatcher,
}

impl AppState {
    /// State with payments disabled
    pub fn new(config: AppConfig, repos: Repositories) -> Self {
        let tokens = TokenIssuer::new(&config.jwt_secret, config.jwt_ttl_secs);
        Self {
            config: Arc::new(config),
            repos,
            tokens: Arc::new(tokens),
            checkout: None,
            reconciler: None,
            notifications: NotificationDispatcher::default(),
        }
    }

    /// Replace the default log-only notifier; call before `with_payments`
    #[must_use]
    pub fn with_notifications(mut self, notifications: NotificationDispatcher) -> Self {
        self.notifications = notifications;
        self
    }

    /// Enable checkout and webhooks against `provider`
    #[must_use]
    pub fn with_payments(mut self, provider: Arc<dyn PaymentProvider>, webhook_secret: &str) -> Self {
        let checkout = CheckoutInitiator::new(
            self.repos.clone(),
            provider,
            CheckoutUrls::for_frontend(&self.config.frontend_url),
        )
        .with_product_image(self.config.product_image.clone());

        let verifier =
            WebhookVerifier::new(webhook_secret).with_tolerance(self.config.webhook_tolerance_secs);

        self.checkout = Some(Arc::new(checkout));
        self.reconciler = Some(Arc::new(WebhookReconciler::new(
            self.repos.clone(),
            verifier,
            self.notifications.clone(),
        )));
        self
    }

    pub const fn payments_enabled(&self) -> bool {
        self.checkout.is_some() && self.reconciler.is_some()
    }
}
