//! Users and Entitlements
//!
//! A user owns a set of items. Entitlement edges are only ever added.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use crate::error::{CoreError, Result};
use crate::ids::{ItemId, UserId};

/// Minimum accepted password length
pub const MIN_PASSWORD_LEN: usize = 8;

/// Account role
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    #[default]
    Customer,
    /// Privileged role with access to every item
    Admin,
}

impl Role {
    pub const fn is_privileged(self) -> bool {
        matches!(self, Self::Admin)
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Customer => "customer",
            Self::Admin => "admin",
        }
    }
}

/// A registered user
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,

    /// Normalized email, unique across users
    pub email: String,

    pub first_name: String,

    pub last_name: String,

    /// Argon2 PHC string
    #[serde(skip_serializing)]
    pub password_hash: String,

    pub role: Role,

    /// Items this user is entitled to
    pub owned_items: BTreeSet<ItemId>,

    pub created_at: DateTime<Utc>,
}

impl User {
    pub fn owns(&self, item: ItemId) -> bool {
        self.owned_items.contains(&item)
    }

    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
            .trim()
            .to_string()
    }
}

/// Fields for inserting a new user
#[derive(Clone, Debug)]
pub struct NewUser {
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub password_hash: String,
    pub role: Role,
}

impl NewUser {
    /// Build a customer account; the email is normalized and validated.
    pub fn customer(email: &str, password_hash: impl Into<String>) -> Result<Self> {
        Ok(Self {
            email: validate_email(email)?,
            first_name: String::new(),
            last_name: String::new(),
            password_hash: password_hash.into(),
            role: Role::Customer,
        })
    }

    #[must_use]
    pub fn with_name(mut self, first: impl Into<String>, last: impl Into<String>) -> Self {
        self.first_name = first.into();
        self.last_name = last.into();
        self
    }

    #[must_use]
    pub const fn with_role(mut self, role: Role) -> Self {
        self.role = role;
        self
    }

    pub(crate) fn into_user(self, id: UserId) -> User {
        User {
            id,
            email: self.email,
            first_name: self.first_name,
            last_name: self.last_name,
            password_hash: self.password_hash,
            role: self.role,
            owned_items: BTreeSet::new(),
            created_at: Utc::now(),
        }
    }
}

/// Trim and lowercase an email address
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// Normalize and check the basic `local@domain` shape
pub fn validate_email(email: &str) -> Result<String> {
    let email = normalize_email(email);
    match email.split_once('@') {
        Some((local, domain))
            if !local.is_empty() && !domain.is_empty() && !domain.contains('@') =>
        {
            Ok(email)
        }
        _ => Err(CoreError::Validation("A valid email address is required".into())),
    }
}

pub fn validate_password(password: &str) -> Result<()> {
    if password.chars().count() < MIN_PASSWORD_LEN {
        return Err(CoreError::Validation(format!(
            "Password must be at least {MIN_PASSWORD_LEN} characters"
        )));
    }
    Ok(())
}
