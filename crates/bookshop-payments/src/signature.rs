//! Webhook Signature Verification
//!
//! Stripe-compatible scheme. The `Stripe-Signature` header looks like
//!
//! ```text
//! t=1704067200,v1=5257a869e7ecebeda32affa62cdca3fa51cad7e77a0e56ff536d0ce8e108d8bd
//! ```
//!
//! and each `v1` value is `hex(HMAC-SHA256(secret, "<t>.<raw body>"))`.
//! Several `v1` entries may appear while a secret is being rolled.

use hmac::{Hmac, Mac};
use sha2::Sha256;

use crate::error::{PaymentError, Result};

type HmacSha256 = Hmac<Sha256>;

/// Default replay window, in seconds
pub const DEFAULT_TOLERANCE_SECS: i64 = 300;

/// Parsed signature header
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SignatureHeader {
    /// Unix timestamp when the provider signed the payload
    pub timestamp: i64,

    /// Decoded `v1` signatures
    pub signatures: Vec<Vec<u8>>,
}

impl SignatureHeader {
    /// Parse `t=<timestamp>,v1=<hex>[,v1=<hex>...]`. Unknown keys are ignored.
    pub fn parse(header: &str) -> Result<Self> {
        let mut timestamp = None;
        let mut signatures = Vec::new();

        for part in header.split(',') {
            let Some((key, value)) = part.split_once('=') else {
                continue;
            };
            match key.trim() {
                "t" => {
                    timestamp = Some(value.trim().parse::<i64>().map_err(|_| {
                        PaymentError::Signature("Invalid timestamp".into())
                    })?);
                }
                "v1" => {
                    // Undecodable entries can never match; skip them.
                    if let Ok(bytes) = hex::decode(value.trim()) {
                        signatures.push(bytes);
                    }
                }
                _ => {}
            }
        }

        let timestamp =
            timestamp.ok_or_else(|| PaymentError::Signature("Missing timestamp".into()))?;
        if signatures.is_empty() {
            return Err(PaymentError::Signature("Missing v1 signature".into()));
        }

        Ok(Self {
            timestamp,
            signatures,
        })
    }
}

/// Verifies webhook payloads against the shared signing secret
#[derive(Clone)]
pub struct WebhookVerifier {
    secret: String,
    tolerance_secs: i64,
}

impl std::fmt::Debug for WebhookVerifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WebhookVerifier")
            .field("tolerance_secs", &self.tolerance_secs)
            .finish_non_exhaustive()
    }
}

impl WebhookVerifier {
    pub fn new(secret: impl Into<String>) -> Self {
        Self {
            secret: secret.into(),
            tolerance_secs: DEFAULT_TOLERANCE_SECS,
        }
    }

    #[must_use]
    pub const fn with_tolerance(mut self, tolerance_secs: i64) -> Self {
        self.tolerance_secs = tolerance_secs;
        self
    }

    /// Verify `payload` against the header value at time `now` (unix seconds)
    pub fn verify(&self, payload: &[u8], header: &str, now: i64) -> Result<()> {
        let header = SignatureHeader::parse(header)?;

        let Some(age) = now.checked_sub(header.timestamp) else {
            tracing::warn!(event_timestamp = header.timestamp, now, "Webhook timestamp out of range");
            return Err(PaymentError::Signature("Timestamp out of range".into()));
        };
        if age > self.tolerance_secs {
            tracing::warn!(event_timestamp = header.timestamp, age_secs = age, "Webhook signature too old");
            return Err(PaymentError::Signature(format!("Timestamp too old ({age} seconds)")));
        }
        if age < self.tolerance_secs.saturating_neg() {
            tracing::warn!(event_timestamp = header.timestamp, now, "Webhook signature from the future");
            return Err(PaymentError::Signature("Timestamp in the future".into()));
        }

        let matched = header
            .signatures
            .iter()
            .any(|candidate| self.mac(header.timestamp, payload).verify_slice(candidate).is_ok());

        if matched {
            Ok(())
        } else {
            Err(PaymentError::Signature("No matching signature".into()))
        }
    }

    /// Produce a header value for `payload` (used by tests and local tooling)
    pub fn sign(&self, payload: &[u8], timestamp: i64) -> String {
        let signature = hex::encode(self.mac(timestamp, payload).finalize().into_bytes());
        format!("t={timestamp},v1={signature}")
    }

    fn mac(&self, timestamp: i64, payload: &[u8]) -> HmacSha256 {
        let mut mac = <HmacSha256 as Mac>::new_from_slice(self.secret.as_bytes())
            .unwrap_or_else(|_| unreachable!("HMAC accepts keys of any length"));
        mac.update(timestamp.to_string().as_bytes());
        mac.update(b".");
        mac.update(payload);
        mac
    }
}
