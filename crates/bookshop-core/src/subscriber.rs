//! Newsletter Subscribers
//!
//! One row per email address. Signing up again with a known address is a
//! conflict rather than a second row.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::ids::SubscriberId;
use crate::user::validate_email;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subscriber {
    pub id: SubscriberId,
    pub first_name: String,
    pub last_name: String,

    /// Normalized email, unique across subscribers
    pub email: String,

    pub subscribed_at: DateTime<Utc>,
}

impl Subscriber {
    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
            .trim()
            .to_string()
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NewSubscriber {
    pub first_name: String,
    pub last_name: String,
    pub email: String,
}

impl NewSubscriber {
    /// Normalize and validate the email; names are trimmed and may be blank
    pub fn new(email: &str, first_name: &str, last_name: &str) -> Result<Self> {
        Ok(Self {
            first_name: first_name.trim().to_owned(),
            last_name: last_name.trim().to_owned(),
            email: validate_email(email)?,
        })
    }

    pub(crate) fn into_subscriber(self, id: SubscriberId) -> Subscriber {
        Subscriber {
            id,
            first_name: self.first_name,
            last_name: self.last_name,
            email: self.email,
            subscribed_at: Utc::now(),
        }
    }
}
