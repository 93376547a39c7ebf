//! Error Types

use thiserror::Error;

/// Result type alias for domain operations
pub type Result<T> = std::result::Result<T, CoreError>;

/// Domain error types
#[derive(Error, Debug)]
pub enum CoreError {
    /// Malformed or incomplete input
    #[error("Validation error: {0}")]
    Validation(String),

    /// Referenced entity does not exist
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    /// Caller is known but not entitled
    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// Uniqueness constraint violated
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Credentials rejected
    #[error("Authentication failed: {0}")]
    Auth(String),

    /// Backing store failure
    #[error("Storage error: {0}")]
    Storage(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Generic IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Other/unknown error
    #[error("{0}")]
    Other(String),
}

impl CoreError {
    pub fn not_found(entity: &'static str, id: impl ToString) -> Self {
        Self::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    /// Convert to a user-friendly message
    pub fn user_message(&self) -> String {
        match self {
            Self::Validation(msg) => msg.clone(),
            Self::NotFound { entity, .. } => format!("{entity} not found."),
            Self::Forbidden(_) => "You do not have access to this content.".into(),
            Self::Conflict(msg) => msg.clone(),
            Self::Auth(_) => "Authentication failed. Please check your credentials.".into(),
            _ => "An unexpected error occurred.".into(),
        }
    }
}

impl From<sqlx::Error> for CoreError {
    fn from(err: sqlx::Error) -> Self {
        Self::Storage(err.to_string())
    }
}

impl From<anyhow::Error> for CoreError {
    fn from(err: anyhow::Error) -> Self {
        Self::Other(err.to_string())
    }
}
