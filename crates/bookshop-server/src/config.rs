//! Server Configuration
//!
//! Built once at startup from environment variables (after `dotenvy` has
//! loaded `.env`). Reading goes through a lookup function so tests can
//! supply a plain map instead of touching the process environment.

use std::path::PathBuf;
use std::str::FromStr;

use bookshop_payments::DEFAULT_TOLERANCE_SECS;
use thiserror::Error;

const DEFAULT_BIND_ADDR: &str = "0.0.0.0:3000";
const DEFAULT_FRONTEND_URL: &str = "http://localhost:5173";
const DEFAULT_CONTENT_ROOT: &str = "media";
const DEFAULT_DATABASE_URL: &str = "sqlite://bookshop.db";
const DEFAULT_JWT_TTL_SECS: i64 = 24 * 60 * 60;
const MIN_JWT_SECRET_LEN: usize = 32;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{0} is required")]
    Missing(&'static str),

    #[error("{var} is invalid: {reason}")]
    Invalid { var: &'static str, reason: String },
}

/// Stripe credentials; both are needed for payments to be enabled
#[derive(Clone)]
pub struct StripeConfig {
    pub secret_key: String,
    pub webhook_secret: String,
}

impl std::fmt::Debug for StripeConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StripeConfig").finish_non_exhaustive()
    }
}

/// Admin account created at startup if missing
#[derive(Clone)]
pub struct AdminSeed {
    pub email: String,
    pub password: String,
}

impl std::fmt::Debug for AdminSeed {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AdminSeed")
            .field("email", &self.email)
            .finish_non_exhaustive()
    }
}

#[derive(Clone)]
pub struct AppConfig {
    pub bind_addr: String,

    /// SQLite connection URL; the file is created on first start
    pub database_url: String,

    /// Base URL of the storefront; checkout redirects land here
    pub frontend_url: String,

    pub jwt_secret: String,
    pub jwt_ttl_secs: i64,

    /// `None` disables checkout and webhooks (503)
    pub stripe: Option<StripeConfig>,
    pub webhook_tolerance_secs: i64,

    /// Directory that item content references resolve against
    pub content_root: PathBuf,

    pub catalog_path: Option<PathBuf>,
    pub product_image: Option<String>,
    pub admin: Option<AdminSeed>,
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("bind_addr", &self.bind_addr)
            .field("database_url", &self.database_url)
            .field("frontend_url", &self.frontend_url)
            .field("jwt_ttl_secs", &self.jwt_ttl_secs)
            .field("stripe", &self.stripe)
            .field("webhook_tolerance_secs", &self.webhook_tolerance_secs)
            .field("content_root", &self.content_root)
            .field("catalog_path", &self.catalog_path)
            .field("admin", &self.admin)
            .finish_non_exhaustive()
    }
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary key lookup. Blank values count as unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let var = |key: &str| {
            lookup(key)
                .map(|value| value.trim().to_owned())
                .filter(|value| !value.is_empty())
        };

        let jwt_secret = var("JWT_SECRET").ok_or(ConfigError::Missing("JWT_SECRET"))?;
        if jwt_secret.len() < MIN_JWT_SECRET_LEN {
            return Err(ConfigError::Invalid {
                var: "JWT_SECRET",
                reason: format!("must be at least {MIN_JWT_SECRET_LEN} characters"),
            });
        }

        let stripe = match (var("STRIPE_SECRET_KEY"), var("STRIPE_WEBHOOK_SECRET")) {
            (Some(secret_key), Some(webhook_secret)) => Some(StripeConfig {
                secret_key,
                webhook_secret,
            }),
            (None, None) => None,
            (Some(_), None) => return Err(ConfigError::Missing("STRIPE_WEBHOOK_SECRET")),
            (None, Some(_)) => return Err(ConfigError::Missing("STRIPE_SECRET_KEY")),
        };

        let admin = match (var("ADMIN_EMAIL"), var("ADMIN_PASSWORD")) {
            (Some(email), Some(password)) => Some(AdminSeed { email, password }),
            (None, None) => None,
            (Some(_), None) => return Err(ConfigError::Missing("ADMIN_PASSWORD")),
            (None, Some(_)) => return Err(ConfigError::Missing("ADMIN_EMAIL")),
        };

        let jwt_ttl_secs = parse_or("JWT_TTL_SECS", var("JWT_TTL_SECS"), DEFAULT_JWT_TTL_SECS)?;
        if jwt_ttl_secs <= 0 {
            return Err(ConfigError::Invalid {
                var: "JWT_TTL_SECS",
                reason: "must be positive".into(),
            });
        }

        Ok(Self {
            bind_addr: var("BIND_ADDR").unwrap_or_else(|| DEFAULT_BIND_ADDR.into()),
            database_url: var("DATABASE_URL").unwrap_or_else(|| DEFAULT_DATABASE_URL.into()),
            frontend_url: var("FRONTEND_URL").unwrap_or_else(|| DEFAULT_FRONTEND_URL.into()),
            jwt_secret,
            jwt_ttl_secs,
            stripe,
            webhook_tolerance_secs: parse_or(
                "WEBHOOK_TOLERANCE_SECS",
                var("WEBHOOK_TOLERANCE_SECS"),
                DEFAULT_TOLERANCE_SECS,
            )?,
            content_root: var("CONTENT_ROOT")
                .unwrap_or_else(|| DEFAULT_CONTENT_ROOT.into())
                .into(),
            catalog_path: var("CATALOG_PATH").map(PathBuf::from),
            product_image: var("CHECKOUT_PRODUCT_IMAGE"),
            admin,
        })
    }

    pub const fn payments_enabled(&self) -> bool {
        self.stripe.is_some()
    }
}

fn parse_or<T>(var: &'static str, value: Option<String>, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    value.map_or(Ok(default), |raw| {
        raw.parse().map_err(|e: T::Err| ConfigError::Invalid {
            var,
            reason: e.to_string(),
        })
    })
}
