//! bookshop HTTP Server
//!
//! Axum-based server for the storefront: catalog, accounts, Stripe
//! checkout and webhooks, and delivery of purchased content.

mod app;
mod auth;
mod bootstrap;
mod config;
mod content;
mod error;
mod handlers;
mod state;

use std::sync::Arc;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use bookshop_core::{sqlite, Repositories};
use bookshop_payments::StripeClient;

use crate::config::AppConfig;
use crate::state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info,tower_http=debug".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load environment
    dotenvy::dotenv().ok();
    let config = AppConfig::from_env()?;

    // Storage and seed data
    let pool = sqlite::connect(&config.database_url).await?;
    let repos = Repositories::sqlite(pool);
    bootstrap::seed_catalog(&repos, &config).await?;
    bootstrap::seed_admin(&repos, &config).await?;

    // Initialize payments
    let stripe = config.stripe.clone();
    let bind_addr = config.bind_addr.clone();
    let mut state = AppState::new(config, repos);

    if let Some(stripe) = stripe {
        tracing::info!("✓ Stripe configured");
        state = state.with_payments(
            Arc::new(StripeClient::new(&stripe.secret_key)),
            &stripe.webhook_secret,
        );
    } else {
        tracing::warn!("⚠ Stripe not configured - payments disabled");
        tracing::warn!("  Set STRIPE_SECRET_KEY and STRIPE_WEBHOOK_SECRET in .env");
    }

    let app = app::router(state);

    // Start server
    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;

    tracing::info!("══════════════════════════════════════════════════");
    tracing::info!("bookshop server running on http://{}", bind_addr);
    tracing::info!("══════════════════════════════════════════════════");
    tracing::info!("Endpoints:");
    tracing::info!("  GET  /health              - Health check");
    tracing::info!("  GET  /items               - Catalog");
    tracing::info!("  GET  /items/{{id}}/content  - Purchased content");
    tracing::info!("  POST /auth/register       - Create account");
    tracing::info!("  POST /auth/login          - Get access token");
    tracing::info!("  GET  /auth/me             - Profile");
    tracing::info!("  GET  /payments            - Purchase history");
    tracing::info!("  POST /checkout            - Create Stripe checkout");
    tracing::info!("  POST /webhook             - Stripe webhook");
    tracing::info!("  POST /contact             - Contact form");
    tracing::info!("  POST /subscribe           - Newsletter signup");

    axum::serve(listener, app).await?;

    Ok(())
}
