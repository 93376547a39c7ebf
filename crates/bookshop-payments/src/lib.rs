//! # bookshop-payments
//!
//! Purchase flow for the bookshop: hosted checkout on the way out, signed
//! webhook reconciliation on the way back.
//!
//! ## Flow
//!
//! ```text
//! ┌─────────────┐  start()   ┌─────────────────┐  redirect  ┌──────────────┐
//! │  Customer   │───────────▶│ CheckoutInitiator│──────────▶│ Stripe Hosted│
//! │ (logged in) │            │  pending record  │           │ Checkout Page│
//! └─────────────┘            └─────────────────┘            └──────┬───────┘
//!                                                                   │ webhook
//!                                                                   ▼
//!                            ┌─────────────────┐  verify   ┌──────────────┐
//!                            │ owned_items += 1 │◀─────────│  Webhook     │
//!                            │ record completed │  + CAS   │  Reconciler  │
//!                            └─────────────────┘           └──────────────┘
//! ```
//!
//! The payment record ID is the correlation token: it travels to the
//! provider as `client_reference_id` and comes back in the completion
//! event. Only a verified event can mark a record `completed`.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use bookshop_payments::{CheckoutInitiator, CheckoutUrls, StripeClient};
//!
//! let checkout = CheckoutInitiator::new(
//!     repos.clone(),
//!     Arc::new(StripeClient::new("sk_test_xxx")),
//!     CheckoutUrls::for_frontend("https://shop.example.com"),
//! );
//!
//! let redirect = checkout.start(user_id, item_id).await?;
//! // Redirect the customer to: redirect.redirect_url
//! ```

mod checkout;
mod error;
mod mock;
mod provider;
mod signature;
mod stripe_client;
mod webhook;

pub use checkout::{CheckoutInitiator, CheckoutRedirect, CheckoutUrls};
pub use error::{PaymentError, Result};
pub use mock::MockPaymentProvider;
pub use provider::{HostedSession, PaymentProvider, SessionRequest};
pub use signature::{SignatureHeader, WebhookVerifier, DEFAULT_TOLERANCE_SECS};
pub use stripe_client::StripeClient;
pub use webhook::{ReconcileOutcome, WebhookEvent, WebhookReconciler};
