//! Repository Ports
//!
//! One data-access trait per entity. Implementations must make
//! [`UserRepository::grant_item`] and [`PaymentRepository::complete_if_pending`]
//! individually atomic; the webhook reconciler relies on both.

use async_trait::async_trait;
use std::sync::Arc;

use crate::contact::{ContactMessage, NewContactMessage};
use crate::error::Result;
use crate::ids::{ItemId, PaymentId, UserId};
use crate::item::{Item, NewItem};
use crate::memory::{
    MemoryContactRepository, MemoryItemRepository, MemoryPaymentRepository,
    MemorySubscriberRepository, MemoryUserRepository,
};
use crate::payment::{Completion, PaymentRecord};
use crate::sqlite::{
    SqliteContactRepository, SqliteItemRepository, SqlitePaymentRepository,
    SqliteSubscriberRepository, SqliteUserRepository,
};
use crate::subscriber::{NewSubscriber, Subscriber};
use crate::user::{NewUser, User};

/// Catalog storage
#[async_trait]
pub trait ItemRepository: Send + Sync {
    async fn get(&self, id: ItemId) -> Result<Option<Item>>;

    /// All items, ordered by id
    async fn list(&self) -> Result<Vec<Item>>;

    async fn insert(&self, item: NewItem) -> Result<Item>;
}

/// User and entitlement storage
#[async_trait]
pub trait UserRepository: Send + Sync {
    async fn get(&self, id: UserId) -> Result<Option<User>>;

    /// Lookup by already-normalized email
    async fn find_by_email(&self, email: &str) -> Result<Option<User>>;

    /// Insert a user; fails with `Conflict` if the email is taken
    async fn insert(&self, user: NewUser) -> Result<User>;

    /// Add an item to the user's owned set.
    ///
    /// Returns `true` if the edge was new. Fails with `NotFound` for an
    /// unknown user.
    async fn grant_item(&self, user: UserId, item: ItemId) -> Result<bool>;
}

/// Purchase attempt storage
#[async_trait]
pub trait PaymentRepository: Send + Sync {
    async fn get(&self, id: PaymentId) -> Result<Option<PaymentRecord>>;

    /// Create a `pending` record for the pair
    async fn insert_pending(&self, user: UserId, item: ItemId) -> Result<PaymentRecord>;

    /// Remember the provider's session id on a record
    async fn attach_session(&self, id: PaymentId, session_id: &str) -> Result<()>;

    /// Conditionally move a record from `pending` to `completed`.
    ///
    /// Fails with `NotFound` for an unknown id.
    async fn complete_if_pending(&self, id: PaymentId) -> Result<Completion>;

    /// A user's purchase attempts, oldest first
    async fn list_for_user(&self, user: UserId) -> Result<Vec<PaymentRecord>>;
}

/// Contact form inbox
#[async_trait]
pub trait ContactRepository: Send + Sync {
    async fn insert(&self, message: NewContactMessage) -> Result<ContactMessage>;

    /// Newest first
    async fn list(&self) -> Result<Vec<ContactMessage>>;
}

/// Newsletter list
#[async_trait]
pub trait SubscriberRepository: Send + Sync {
    /// Add a subscriber; fails with `Conflict` if the email is already listed
    async fn insert(&self, subscriber: NewSubscriber) -> Result<Subscriber>;

    /// Newest first
    async fn list(&self) -> Result<Vec<Subscriber>>;
}

/// The set of repositories shared by the services
#[derive(Clone)]
pub struct Repositories {
    pub items: Arc<dyn ItemRepository>,
    pub users: Arc<dyn UserRepository>,
    pub payments: Arc<dyn PaymentRepository>,
    pub contacts: Arc<dyn ContactRepository>,
    pub subscribers: Arc<dyn SubscriberRepository>,
}

impl Repositories {
    /// In-memory repositories (tests)
    pub fn in_memory() -> Self {
        Self {
            items: Arc::new(MemoryItemRepository::new()),
            users: Arc::new(MemoryUserRepository::new()),
            payments: Arc::new(MemoryPaymentRepository::new()),
            contacts: Arc::new(MemoryContactRepository::new()),
            subscribers: Arc::new(MemorySubscriberRepository::new()),
        }
    }

    /// Repositories sharing one SQLite pool
    pub fn sqlite(pool: sqlx::SqlitePool) -> Self {
        Self {
            items: Arc::new(SqliteItemRepository::new(pool.clone())),
            users: Arc::new(SqliteUserRepository::new(pool.clone())),
            payments: Arc::new(SqlitePaymentRepository::new(pool.clone())),
            contacts: Arc::new(SqliteContactRepository::new(pool.clone())),
            subscribers: Arc::new(SqliteSubscriberRepository::new(pool)),
        }
    }
}
