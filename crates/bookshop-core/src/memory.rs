//! In-memory repositories (for development and tests)
//!
//! Each repository keeps its rows behind a single `RwLock`, so every trait
//! method is atomic with respect to the others.

use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use tokio::sync::RwLock;

use crate::contact::{ContactMessage, NewContactMessage};
use crate::error::{CoreError, Result};
use crate::ids::{ItemId, MessageId, PaymentId, SubscriberId, UserId};
use crate::item::{Item, NewItem};
use crate::payment::{Completion, PaymentRecord};
use crate::repository::{
    ContactRepository, ItemRepository, PaymentRepository, SubscriberRepository, UserRepository,
};
use crate::subscriber::{NewSubscriber, Subscriber};
use crate::user::{NewUser, User};

/// Rows keyed by id plus the next id to hand out
struct Table<T> {
    rows: BTreeMap<u64, T>,
    next_id: u64,
}

impl<T> Table<T> {
    const fn new() -> Self {
        Self {
            rows: BTreeMap::new(),
            next_id: 1,
        }
    }

    fn allocate(&mut self) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }
}

/// In-memory catalog
pub struct MemoryItemRepository {
    table: RwLock<Table<Item>>,
}

impl Default for MemoryItemRepository {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryItemRepository {
    pub fn new() -> Self {
        Self {
            table: RwLock::new(Table::new()),
        }
    }
}

#[async_trait]
impl ItemRepository for MemoryItemRepository {
    async fn get(&self, id: ItemId) -> Result<Option<Item>> {
        Ok(self.table.read().await.rows.get(&id.get()).cloned())
    }

    async fn list(&self) -> Result<Vec<Item>> {
        Ok(self.table.read().await.rows.values().cloned().collect())
    }

    async fn insert(&self, item: NewItem) -> Result<Item> {
        let mut table = self.table.write().await;
        let id = table.allocate();
        let item = item.into_item(ItemId::new(id));
        table.rows.insert(id, item.clone());
        Ok(item)
    }
}

struct UserTable {
    users: Table<User>,
    by_email: HashMap<String, UserId>,
}

/// In-memory users and entitlements
pub struct MemoryUserRepository {
    table: RwLock<UserTable>,
}

impl Default for MemoryUserRepository {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryUserRepository {
    pub fn new() -> Self {
        Self {
            table: RwLock::new(UserTable {
                users: Table::new(),
                by_email: HashMap::new(),
            }),
        }
    }
}

#[async_trait]
impl UserRepository for MemoryUserRepository {
    async fn get(&self, id: UserId) -> Result<Option<User>> {
        Ok(self.table.read().await.users.rows.get(&id.get()).cloned())
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<User>> {
        let table = self.table.read().await;
        Ok(table
            .by_email
            .get(email)
            .and_then(|id| table.users.rows.get(&id.get()))
            .cloned())
    }

    async fn insert(&self, user: NewUser) -> Result<User> {
        let mut table = self.table.write().await;
        if table.by_email.contains_key(&user.email) {
            return Err(CoreError::Conflict(
                "An account with this email already exists".into(),
            ));
        }

        let id = UserId::new(table.users.allocate());
        let user = user.into_user(id);
        table.by_email.insert(user.email.clone(), id);
        table.users.rows.insert(id.get(), user.clone());
        Ok(user)
    }

    async fn grant_item(&self, user: UserId, item: ItemId) -> Result<bool> {
        let mut table = self.table.write().await;
        let row = table
            .users
            .rows
            .get_mut(&user.get())
            .ok_or_else(|| CoreError::not_found("User", user))?;
        Ok(row.owned_items.insert(item))
    }
}

/// In-memory payment records
pub struct MemoryPaymentRepository {
    table: RwLock<Table<PaymentRecord>>,
}

impl Default for MemoryPaymentRepository {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryPaymentRepository {
    pub fn new() -> Self {
        Self {
            table: RwLock::new(Table::new()),
        }
    }

    /// Start id allocation at `next_id` (lets fixtures reproduce known ids)
    pub fn starting_at(next_id: u64) -> Self {
        let mut table = Table::new();
        table.next_id = next_id;
        Self {
            table: RwLock::new(table),
        }
    }
}

#[async_trait]
impl PaymentRepository for MemoryPaymentRepository {
    async fn get(&self, id: PaymentId) -> Result<Option<PaymentRecord>> {
        Ok(self.table.read().await.rows.get(&id.get()).cloned())
    }

    async fn insert_pending(&self, user: UserId, item: ItemId) -> Result<PaymentRecord> {
        let mut table = self.table.write().await;
        let id = table.allocate();
        let record = PaymentRecord::pending(PaymentId::new(id), user, item);
        table.rows.insert(id, record.clone());
        Ok(record)
    }

    async fn attach_session(&self, id: PaymentId, session_id: &str) -> Result<()> {
        let mut table = self.table.write().await;
        let record = table
            .rows
            .get_mut(&id.get())
            .ok_or_else(|| CoreError::not_found("Payment", id))?;
        record.provider_session_id = Some(session_id.to_string());
        record.updated_at = chrono::Utc::now();
        Ok(())
    }

    async fn complete_if_pending(&self, id: PaymentId) -> Result<Completion> {
        let mut table = self.table.write().await;
        let record = table
            .rows
            .get_mut(&id.get())
            .ok_or_else(|| CoreError::not_found("Payment", id))?;

        if record.is_completed() {
            return Ok(Completion::AlreadyCompleted(record.clone()));
        }

        record.mark_completed();
        Ok(Completion::Applied(record.clone()))
    }

    async fn list_for_user(&self, user: UserId) -> Result<Vec<PaymentRecord>> {
        Ok(self
            .table
            .read()
            .await
            .rows
            .values()
            .filter(|record| record.user_id == user)
            .cloned()
            .collect())
    }
}

/// In-memory contact inbox
#[derive(Default)]
pub struct MemoryContactRepository {
    table: RwLock<Vec<ContactMessage>>,
}

impl MemoryContactRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ContactRepository for MemoryContactRepository {
    async fn insert(&self, message: NewContactMessage) -> Result<ContactMessage> {
        let mut table = self.table.write().await;
        let message = message.into_message(MessageId::new(table.len() as u64 + 1));
        table.push(message.clone());
        Ok(message)
    }

    async fn list(&self) -> Result<Vec<ContactMessage>> {
        Ok(self.table.read().await.iter().rev().cloned().collect())
    }
}

/// In-memory newsletter list
#[derive(Default)]
pub struct MemorySubscriberRepository {
    table: RwLock<Vec<Subscriber>>,
}

impl MemorySubscriberRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SubscriberRepository for MemorySubscriberRepository {
    async fn insert(&self, subscriber: NewSubscriber) -> Result<Subscriber> {
        let mut table = self.table.write().await;
        if table.iter().any(|row| row.email == subscriber.email) {
            return Err(CoreError::Conflict("This email is already subscribed".into()));
        }

        let subscriber = subscriber.into_subscriber(SubscriberId::new(table.len() as u64 + 1));
        table.push(subscriber.clone());
        Ok(subscriber)
    }

    async fn list(&self) -> Result<Vec<Subscriber>> {
        Ok(self.table.read().await.iter().rev().cloned().collect())
    }
}
