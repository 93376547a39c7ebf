//! Contact Form Messages

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{CoreError, Result};
use crate::ids::MessageId;
use crate::user::validate_email;

pub const MAX_NAME_LEN: usize = 100;
pub const MAX_MESSAGE_LEN: usize = 5000;

/// A message left through the contact form
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContactMessage {
    pub id: MessageId,
    pub name: String,
    pub email: String,
    pub message: String,

    /// Set once an admin answered
    pub replied: bool,

    pub created_at: DateTime<Utc>,
}

/// A validated contact form submission
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NewContactMessage {
    pub name: String,
    pub email: String,
    pub message: String,
}

impl NewContactMessage {
    /// Trim and validate the three form fields
    pub fn new(name: &str, email: &str, message: &str) -> Result<Self> {
        let name = name.trim();
        if name.is_empty() || name.chars().count() > MAX_NAME_LEN {
            return Err(CoreError::Validation(format!(
                "Name must be between 1 and {MAX_NAME_LEN} characters"
            )));
        }

        let message = message.trim();
        if message.is_empty() || message.chars().count() > MAX_MESSAGE_LEN {
            return Err(CoreError::Validation(format!(
                "Message must be between 1 and {MAX_MESSAGE_LEN} characters"
            )));
        }

        Ok(Self {
            name: name.to_owned(),
            email: validate_email(email)?,
            message: message.to_owned(),
        })
    }

    pub(crate) fn into_message(self, id: MessageId) -> ContactMessage {
        ContactMessage {
            id,
            name: self.name,
            email: self.email,
            message: self.message,
            replied: false,
            created_at: Utc::now(),
        }
    }
}
