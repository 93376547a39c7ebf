//! HTTP Error Mapping
//!
//! Every failure leaves the server as `{"error": "<message>", "code": "<CODE>"}`
//! with the matching status. Server-side failures are logged here so
//! handlers can simply use `?`.

use axum::{
    extract::rejection::{JsonRejection, PathRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

use bookshop_core::CoreError;
use bookshop_payments::PaymentError;

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: &'static str,
}

#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    Core(#[from] CoreError),

    #[error(transparent)]
    Payment(#[from] PaymentError),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Authentication required")]
    Unauthorized,

    #[error("Payments not configured")]
    PaymentsDisabled,

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self::BadRequest(rejection.body_text())
    }
}

impl From<PathRejection> for ApiError {
    fn from(rejection: PathRejection) -> Self {
        Self::BadRequest(rejection.body_text())
    }
}

impl From<tokio::task::JoinError> for ApiError {
    fn from(err: tokio::task::JoinError) -> Self {
        Self::Internal(err.to_string())
    }
}

const fn core_status(err: &CoreError) -> (StatusCode, &'static str) {
    match err {
        CoreError::Validation(_) => (StatusCode::BAD_REQUEST, "VALIDATION_ERROR"),
        CoreError::NotFound { .. } => (StatusCode::NOT_FOUND, "NOT_FOUND"),
        CoreError::Forbidden(_) => (StatusCode::FORBIDDEN, "FORBIDDEN"),
        CoreError::Conflict(_) => (StatusCode::CONFLICT, "CONFLICT"),
        CoreError::Auth(_) => (StatusCode::UNAUTHORIZED, "UNAUTHORIZED"),
        CoreError::Config(_) => (StatusCode::INTERNAL_SERVER_ERROR, "CONFIG_ERROR"),
        CoreError::Storage(_)
        | CoreError::Io(_)
        | CoreError::Json(_)
        | CoreError::Other(_) => (StatusCode::INTERNAL_SERVER_ERROR, "STORAGE_ERROR"),
    }
}

impl ApiError {
    pub const fn status_and_code(&self) -> (StatusCode, &'static str) {
        match self {
            Self::Core(err) => core_status(err),
            Self::Payment(err) => match err {
                PaymentError::Provider(_) => {
                    (StatusCode::INTERNAL_SERVER_ERROR, "PAYMENT_PROVIDER_ERROR")
                }
                PaymentError::Signature(_) => (StatusCode::BAD_REQUEST, "INVALID_SIGNATURE"),
                PaymentError::WebhookParse(_) => (StatusCode::BAD_REQUEST, "INVALID_PAYLOAD"),
                PaymentError::Config(_) => (StatusCode::SERVICE_UNAVAILABLE, "PAYMENTS_DISABLED"),
                PaymentError::Core(inner) => core_status(inner),
            },
            Self::BadRequest(_) => (StatusCode::BAD_REQUEST, "BAD_REQUEST"),
            Self::Unauthorized => (StatusCode::UNAUTHORIZED, "UNAUTHORIZED"),
            Self::PaymentsDisabled => (StatusCode::SERVICE_UNAVAILABLE, "PAYMENTS_DISABLED"),
            Self::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR"),
        }
    }

    fn user_message(&self) -> String {
        match self {
            Self::Core(err) => err.user_message(),
            Self::Payment(err) => err.user_message(),
            Self::BadRequest(msg) => msg.clone(),
            Self::Unauthorized | Self::PaymentsDisabled => self.to_string(),
            Self::Internal(_) => "Internal server error.".into(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code) = self.status_and_code();

        if status.is_server_error() {
            tracing::error!(code, error = %self, "Request failed");
        } else {
            tracing::debug!(code, error = %self, "Request rejected");
        }

        (
            status,
            Json(ErrorResponse {
                error: self.user_message(),
                code,
            }),
        )
            .into_response()
    }
}

pub type ApiResult<T> = std::result::Result<T, ApiError>;
