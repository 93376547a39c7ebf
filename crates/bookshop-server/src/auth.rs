//! Bearer Token Authentication
//!
//! HS256 JWTs carrying the user ID as `sub`. Handlers take [`AuthUser`] when
//! a caller must be logged in and [`MaybeUser`] when the response merely
//! changes with the caller.
//!
//! ```text
//! Authorization: Bearer <token>
//! ```

use axum::{
    extract::FromRequestParts,
    http::{header, request::Parts},
};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

use bookshop_core::{User, UserId};

use crate::error::ApiError;
use crate::state::AppState;

/// Payload stored in the token
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    /// User ID
    pub sub: String,
    pub email: String,
    /// Issued at (Unix timestamp)
    pub iat: i64,
    /// Expiration time (Unix timestamp)
    pub exp: i64,
}

/// Response body for a successful login
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    pub token_type: String,
    pub expires_in: i64,
}

/// Issues and validates access tokens
#[derive(Clone)]
pub struct TokenIssuer {
    encoding: EncodingKey,
    decoding: DecodingKey,
    validation: Validation,
    ttl_secs: i64,
}

impl std::fmt::Debug for TokenIssuer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenIssuer")
            .field("ttl_secs", &self.ttl_secs)
            .finish_non_exhaustive()
    }
}

impl TokenIssuer {
    pub fn new(secret: &str, ttl_secs: i64) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            validation: Validation::new(Algorithm::HS256),
            ttl_secs,
        }
    }

    pub fn issue(&self, user: &User) -> Result<TokenResponse, ApiError> {
        self.issue_at(user, chrono::Utc::now().timestamp())
    }

    fn issue_at(&self, user: &User, now: i64) -> Result<TokenResponse, ApiError> {
        let claims = Claims {
            sub: user.id.to_string(),
            email: user.email.clone(),
            iat: now,
            exp: now + self.ttl_secs,
        };

        let access_token = encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)
            .map_err(|e| ApiError::Internal(format!("Failed to sign token: {e}")))?;

        Ok(TokenResponse {
            access_token,
            token_type: "Bearer".into(),
            expires_in: self.ttl_secs,
        })
    }

    /// Decode a token and return the user ID it was issued for
    pub fn verify(&self, token: &str) -> Result<UserId, ApiError> {
        let data = decode::<Claims>(token, &self.decoding, &self.validation).map_err(|e| {
            tracing::debug!(error = %e, "Rejected access token");
            ApiError::Unauthorized
        })?;

        data.claims.sub.parse().map_err(|_| ApiError::Unauthorized)
    }
}

fn bearer_token(parts: &Parts) -> Option<&str> {
    parts
        .headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|token| !token.is_empty())
}

async fn resolve_user(parts: &Parts, state: &AppState) -> Result<User, ApiError> {
    let token = bearer_token(parts).ok_or(ApiError::Unauthorized)?;
    let user_id = state.tokens.verify(token)?;

    // A token for a deleted account no longer authenticates.
    state
        .repos
        .users
        .get(user_id)
        .await?
        .ok_or(ApiError::Unauthorized)
}

/// Extractor that requires a valid token for an existing user
#[derive(Debug, Clone)]
pub struct AuthUser(pub User);

impl FromRequestParts<AppState> for AuthUser {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        resolve_user(parts, state).await.map(Self)
    }
}

/// Extractor for optional authentication; bad or missing tokens yield `None`
#[derive(Debug, Clone)]
pub struct MaybeUser(pub Option<User>);

impl FromRequestParts<AppState> for MaybeUser {
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        Ok(Self(resolve_user(parts, state).await.ok()))
    }
}
