//! SQLite repositories
//!
//! Runtime-checked queries against the schema in `migrations/`. Entitlement
//! edges live in `user_items` under a composite primary key, so a grant is an
//! `INSERT ... ON CONFLICT DO NOTHING`. Settlement is a conditional `UPDATE`
//! guarded on `state = 'pending'`; the affected row count says who won.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;
use std::collections::BTreeSet;
use std::str::FromStr;

use crate::contact::{ContactMessage, NewContactMessage};
use crate::error::{CoreError, Result};
use crate::ids::{ItemId, MessageId, PaymentId, SubscriberId, UserId};
use crate::item::{Item, NewItem};
use crate::payment::{Completion, PaymentRecord, SettlementState};
use crate::repository::{
    ContactRepository, ItemRepository, PaymentRepository, SubscriberRepository, UserRepository,
};
use crate::subscriber::{NewSubscriber, Subscriber};
use crate::user::{NewUser, Role, User};

const MAX_CONNECTIONS: u32 = 5;

static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!("./migrations");

/// Open the database at `url`, creating the file if needed, and migrate it
pub async fn connect(url: &str) -> Result<SqlitePool> {
    let options = SqliteConnectOptions::from_str(url)
        .map_err(|e| CoreError::Config(format!("Invalid DATABASE_URL: {e}")))?
        .create_if_missing(true)
        .foreign_keys(true);

    let pool = SqlitePoolOptions::new()
        .max_connections(MAX_CONNECTIONS)
        .connect_with(options)
        .await?;

    MIGRATOR
        .run(&pool)
        .await
        .map_err(|e| CoreError::Storage(format!("Migration failed: {e}")))?;

    tracing::info!(url, "Database ready");
    Ok(pool)
}

// ════════════════════════════════════════════════════════════════════════════
// Row mapping
// ════════════════════════════════════════════════════════════════════════════

/// Ids above `i64::MAX` cannot exist in SQLite
fn key(raw: u64) -> Option<i64> {
    i64::try_from(raw).ok()
}

fn row_id(raw: i64) -> Result<u64> {
    u64::try_from(raw).map_err(|_| CoreError::Storage(format!("Invalid row id: {raw}")))
}

fn parse_role(s: &str) -> Result<Role> {
    match s {
        "customer" => Ok(Role::Customer),
        "admin" => Ok(Role::Admin),
        other => Err(CoreError::Storage(format!("Invalid role: {other}"))),
    }
}

fn parse_state(s: &str) -> Result<SettlementState> {
    match s {
        "pending" => Ok(SettlementState::Pending),
        "completed" => Ok(SettlementState::Completed),
        other => Err(CoreError::Storage(format!("Invalid settlement state: {other}"))),
    }
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Database(db) if db.is_unique_violation())
}

#[derive(Debug, sqlx::FromRow)]
struct ItemRow {
    id: i64,
    name: String,
    price: i64,
    content_ref: String,
    locale: String,
}

impl TryFrom<ItemRow> for Item {
    type Error = CoreError;

    fn try_from(row: ItemRow) -> Result<Self> {
        Ok(Self {
            id: ItemId::new(row_id(row.id)?),
            name: row.name,
            price: row.price,
            content_ref: row.content_ref,
            locale: row.locale,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
struct UserRow {
    id: i64,
    email: String,
    first_name: String,
    last_name: String,
    password_hash: String,
    role: String,
    created_at: DateTime<Utc>,
}

impl UserRow {
    fn into_user(self, owned_items: BTreeSet<ItemId>) -> Result<User> {
        Ok(User {
            id: UserId::new(row_id(self.id)?),
            email: self.email,
            first_name: self.first_name,
            last_name: self.last_name,
            password_hash: self.password_hash,
            role: parse_role(&self.role)?,
            owned_items,
            created_at: self.created_at,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
struct PaymentRow {
    id: i64,
    user_id: i64,
    item_id: i64,
    state: String,
    provider_session_id: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    completed_at: Option<DateTime<Utc>>,
}

impl TryFrom<PaymentRow> for PaymentRecord {
    type Error = CoreError;

    fn try_from(row: PaymentRow) -> Result<Self> {
        Ok(Self {
            id: PaymentId::new(row_id(row.id)?),
            user_id: UserId::new(row_id(row.user_id)?),
            item_id: ItemId::new(row_id(row.item_id)?),
            state: parse_state(&row.state)?,
            provider_session_id: row.provider_session_id,
            created_at: row.created_at,
            updated_at: row.updated_at,
            completed_at: row.completed_at,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
struct ContactRow {
    id: i64,
    name: String,
    email: String,
    message: String,
    replied: bool,
    created_at: DateTime<Utc>,
}

impl TryFrom<ContactRow> for ContactMessage {
    type Error = CoreError;

    fn try_from(row: ContactRow) -> Result<Self> {
        Ok(Self {
            id: MessageId::new(row_id(row.id)?),
            name: row.name,
            email: row.email,
            message: row.message,
            replied: row.replied,
            created_at: row.created_at,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
struct SubscriberRow {
    id: i64,
    first_name: String,
    last_name: String,
    email: String,
    subscribed_at: DateTime<Utc>,
}

impl TryFrom<SubscriberRow> for Subscriber {
    type Error = CoreError;

    fn try_from(row: SubscriberRow) -> Result<Self> {
        Ok(Self {
            id: SubscriberId::new(row_id(row.id)?),
            first_name: row.first_name,
            last_name: row.last_name,
            email: row.email,
            subscribed_at: row.subscribed_at,
        })
    }
}

// ════════════════════════════════════════════════════════════════════════════
// Items
// ════════════════════════════════════════════════════════════════════════════

pub struct SqliteItemRepository {
    pool: SqlitePool,
}

impl SqliteItemRepository {
    pub const fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ItemRepository for SqliteItemRepository {
    async fn get(&self, id: ItemId) -> Result<Option<Item>> {
        let Some(id) = key(id.get()) else {
            return Ok(None);
        };

        sqlx::query_as::<_, ItemRow>(
            "SELECT id, name, price, content_ref, locale FROM items WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?
        .map(Item::try_from)
        .transpose()
    }

    async fn list(&self) -> Result<Vec<Item>> {
        sqlx::query_as::<_, ItemRow>(
            "SELECT id, name, price, content_ref, locale FROM items ORDER BY id",
        )
        .fetch_all(&self.pool)
        .await?
        .into_iter()
        .map(Item::try_from)
        .collect()
    }

    async fn insert(&self, item: NewItem) -> Result<Item> {
        let row = sqlx::query_as::<_, ItemRow>(
            r#"
            INSERT INTO items (name, price, content_ref, locale)
            VALUES (?, ?, ?, ?)
            RETURNING id, name, price, content_ref, locale
            "#,
        )
        .bind(&item.name)
        .bind(item.price)
        .bind(&item.content_ref)
        .bind(&item.locale)
        .fetch_one(&self.pool)
        .await?;

        row.try_into()
    }
}

// ════════════════════════════════════════════════════════════════════════════
// Users and entitlements
// ════════════════════════════════════════════════════════════════════════════

pub struct SqliteUserRepository {
    pool: SqlitePool,
}

impl SqliteUserRepository {
    pub const fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    async fn owned_items(&self, user_id: i64) -> Result<BTreeSet<ItemId>> {
        let rows: Vec<i64> =
            sqlx::query_scalar("SELECT item_id FROM user_items WHERE user_id = ? ORDER BY item_id")
                .bind(user_id)
                .fetch_all(&self.pool)
                .await?;

        rows.into_iter()
            .map(|raw| row_id(raw).map(ItemId::new))
            .collect()
    }

    async fn hydrate(&self, row: Option<UserRow>) -> Result<Option<User>> {
        match row {
            Some(row) => {
                let owned = self.owned_items(row.id).await?;
                row.into_user(owned).map(Some)
            }
            None => Ok(None),
        }
    }
}

#[async_trait]
impl UserRepository for SqliteUserRepository {
    async fn get(&self, id: UserId) -> Result<Option<User>> {
        let Some(id) = key(id.get()) else {
            return Ok(None);
        };

        let row = sqlx::query_as::<_, UserRow>(
            r#"
            SELECT id, email, first_name, last_name, password_hash, role, created_at
            FROM users WHERE id = ?
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        self.hydrate(row).await
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<User>> {
        let row = sqlx::query_as::<_, UserRow>(
            r#"
            SELECT id, email, first_name, last_name, password_hash, role, created_at
            FROM users WHERE email = ?
            "#,
        )
        .bind(email)
        .fetch_optional(&self.pool)
        .await?;

        self.hydrate(row).await
    }

    async fn insert(&self, user: NewUser) -> Result<User> {
        let result = sqlx::query_as::<_, UserRow>(
            r#"
            INSERT INTO users (email, first_name, last_name, password_hash, role, created_at)
            VALUES (?, ?, ?, ?, ?, ?)
            RETURNING id, email, first_name, last_name, password_hash, role, created_at
            "#,
        )
        .bind(&user.email)
        .bind(&user.first_name)
        .bind(&user.last_name)
        .bind(&user.password_hash)
        .bind(user.role.as_str())
        .bind(Utc::now())
        .fetch_one(&self.pool)
        .await;

        match result {
            Ok(row) => row.into_user(BTreeSet::new()),
            Err(e) if is_unique_violation(&e) => Err(CoreError::Conflict(
                "An account with this email already exists".into(),
            )),
            Err(e) => Err(e.into()),
        }
    }

    async fn grant_item(&self, user: UserId, item: ItemId) -> Result<bool> {
        let not_found = || CoreError::not_found("User", user);
        let user_key = key(user.get()).ok_or_else(not_found)?;
        let item_key = key(item.get()).ok_or_else(|| CoreError::not_found("Item", item))?;

        let exists: Option<i64> = sqlx::query_scalar("SELECT id FROM users WHERE id = ?")
            .bind(user_key)
            .fetch_optional(&self.pool)
            .await?;
        if exists.is_none() {
            return Err(not_found());
        }

        let result = sqlx::query(
            "INSERT INTO user_items (user_id, item_id) VALUES (?, ?) ON CONFLICT DO NOTHING",
        )
        .bind(user_key)
        .bind(item_key)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }
}

// ════════════════════════════════════════════════════════════════════════════
// Payments
// ════════════════════════════════════════════════════════════════════════════

pub struct SqlitePaymentRepository {
    pool: SqlitePool,
}

impl SqlitePaymentRepository {
    pub const fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl PaymentRepository for SqlitePaymentRepository {
    async fn get(&self, id: PaymentId) -> Result<Option<PaymentRecord>> {
        let Some(id) = key(id.get()) else {
            return Ok(None);
        };

        sqlx::query_as::<_, PaymentRow>(
            r#"
            SELECT id, user_id, item_id, state, provider_session_id,
                   created_at, updated_at, completed_at
            FROM payments WHERE id = ?
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?
        .map(PaymentRecord::try_from)
        .transpose()
    }

    async fn insert_pending(&self, user: UserId, item: ItemId) -> Result<PaymentRecord> {
        let user_key = key(user.get()).ok_or_else(|| CoreError::not_found("User", user))?;
        let item_key = key(item.get()).ok_or_else(|| CoreError::not_found("Item", item))?;
        let now = Utc::now();

        let row = sqlx::query_as::<_, PaymentRow>(
            r#"
            INSERT INTO payments (user_id, item_id, state, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?)
            RETURNING id, user_id, item_id, state, provider_session_id,
                      created_at, updated_at, completed_at
            "#,
        )
        .bind(user_key)
        .bind(item_key)
        .bind(SettlementState::Pending.as_str())
        .bind(now)
        .bind(now)
        .fetch_one(&self.pool)
        .await?;

        row.try_into()
    }

    async fn attach_session(&self, id: PaymentId, session_id: &str) -> Result<()> {
        let not_found = || CoreError::not_found("Payment", id);
        let payment_key = key(id.get()).ok_or_else(not_found)?;

        let result = sqlx::query(
            "UPDATE payments SET provider_session_id = ?, updated_at = ? WHERE id = ?",
        )
        .bind(session_id)
        .bind(Utc::now())
        .bind(payment_key)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(not_found());
        }
        Ok(())
    }

    async fn complete_if_pending(&self, id: PaymentId) -> Result<Completion> {
        let not_found = || CoreError::not_found("Payment", id);
        let payment_key = key(id.get()).ok_or_else(not_found)?;
        let now = Utc::now();

        let result = sqlx::query(
            r#"
            UPDATE payments
            SET state = ?, updated_at = ?, completed_at = ?
            WHERE id = ? AND state = ?
            "#,
        )
        .bind(SettlementState::Completed.as_str())
        .bind(now)
        .bind(now)
        .bind(payment_key)
        .bind(SettlementState::Pending.as_str())
        .execute(&self.pool)
        .await?;

        // `completed` is terminal, so the row read back is stable
        let record = self.get(id).await?.ok_or_else(not_found)?;
        if result.rows_affected() == 1 {
            Ok(Completion::Applied(record))
        } else {
            Ok(Completion::AlreadyCompleted(record))
        }
    }

    async fn list_for_user(&self, user: UserId) -> Result<Vec<PaymentRecord>> {
        let Some(user_key) = key(user.get()) else {
            return Ok(Vec::new());
        };

        sqlx::query_as::<_, PaymentRow>(
            r#"
            SELECT id, user_id, item_id, state, provider_session_id,
                   created_at, updated_at, completed_at
            FROM payments WHERE user_id = ? ORDER BY id
            "#,
        )
        .bind(user_key)
        .fetch_all(&self.pool)
        .await?
        .into_iter()
        .map(PaymentRecord::try_from)
        .collect()
    }
}

// ════════════════════════════════════════════════════════════════════════════
// Contact form and newsletter
// ════════════════════════════════════════════════════════════════════════════

pub struct SqliteContactRepository {
    pool: SqlitePool,
}

impl SqliteContactRepository {
    pub const fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ContactRepository for SqliteContactRepository {
    async fn insert(&self, message: NewContactMessage) -> Result<ContactMessage> {
        let row = sqlx::query_as::<_, ContactRow>(
            r#"
            INSERT INTO contact_messages (name, email, message, created_at)
            VALUES (?, ?, ?, ?)
            RETURNING id, name, email, message, replied, created_at
            "#,
        )
        .bind(&message.name)
        .bind(&message.email)
        .bind(&message.message)
        .bind(Utc::now())
        .fetch_one(&self.pool)
        .await?;

        row.try_into()
    }

    async fn list(&self) -> Result<Vec<ContactMessage>> {
        sqlx::query_as::<_, ContactRow>(
            "SELECT id, name, email, message, replied, created_at FROM contact_messages ORDER BY id DESC",
        )
        .fetch_all(&self.pool)
        .await?
        .into_iter()
        .map(ContactMessage::try_from)
        .collect()
    }
}

pub struct SqliteSubscriberRepository {
    pool: SqlitePool,
}

impl SqliteSubscriberRepository {
    pub const fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SubscriberRepository for SqliteSubscriberRepository {
    async fn insert(&self, subscriber: NewSubscriber) -> Result<Subscriber> {
        let result = sqlx::query_as::<_, SubscriberRow>(
            r#"
            INSERT INTO subscribers (first_name, last_name, email, subscribed_at)
            VALUES (?, ?, ?, ?)
            RETURNING id, first_name, last_name, email, subscribed_at
            "#,
        )
        .bind(&subscriber.first_name)
        .bind(&subscriber.last_name)
        .bind(&subscriber.email)
        .bind(Utc::now())
        .fetch_one(&self.pool)
        .await;

        match result {
            Ok(row) => row.try_into(),
            Err(e) if is_unique_violation(&e) => {
                Err(CoreError::Conflict("This email is already subscribed".into()))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn list(&self) -> Result<Vec<Subscriber>> {
        sqlx::query_as::<_, SubscriberRow>(
            "SELECT id, first_name, last_name, email, subscribed_at FROM subscribers ORDER BY id DESC",
        )
        .fetch_all(&self.pool)
        .await?
        .into_iter()
        .map(Subscriber::try_from)
        .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::Repositories;
    use std::sync::Arc;

    struct TestDb {
        repos: Repositories,
        pool: SqlitePool,
        _dir: tempfile::TempDir,
    }

    async fn test_db() -> TestDb {
        let dir = tempfile::tempdir().unwrap();
        let url = format!("sqlite://{}", dir.path().join("bookshop.db").display());
        let pool = connect(&url).await.unwrap();
        TestDb {
            repos: Repositories::sqlite(pool.clone()),
            pool,
            _dir: dir,
        }
    }

    async fn customer(repos: &Repositories, email: &str) -> User {
        repos
            .users
            .insert(NewUser::customer(email, "hash").unwrap())
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_items_round_trip_in_id_order() {
        let db = test_db().await;
        let first = db
            .repos
            .items
            .insert(NewItem::new("Map Your Freedom", 500, "books/en.pdf"))
            .await
            .unwrap();
        db.repos
            .items
            .insert(NewItem::new("Map Your Freedom", 500, "books/es.pdf").with_locale("es"))
            .await
            .unwrap();

        assert_eq!(first.id, ItemId::new(1));
        let items = db.repos.items.list().await.unwrap();
        assert_eq!(items.len(), 2);
        assert_eq!(items[1].locale, "es");
        assert_eq!(db.repos.items.get(first.id).await.unwrap(), Some(first));
        assert!(db.repos.items.get(ItemId::new(u64::MAX)).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_users_and_entitlements() {
        let db = test_db().await;
        let item = db.repos.items.insert(NewItem::new("Book", 500, "b.pdf")).await.unwrap();
        let user = customer(&db.repos, "reader@example.com").await;
        assert_eq!(user.role, Role::Customer);

        let err = db
            .repos
            .users
            .insert(NewUser::customer("Reader@Example.com", "hash").unwrap())
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::Conflict(_)));

        assert!(db.repos.users.grant_item(user.id, item.id).await.unwrap());
        assert!(!db.repos.users.grant_item(user.id, item.id).await.unwrap());

        let stored = db.repos.users.find_by_email("reader@example.com").await.unwrap().unwrap();
        assert!(stored.owns(item.id));
        assert_eq!(stored.owned_items.len(), 1);
        assert_eq!(stored.password_hash, "hash");

        let err = db.repos.users.grant_item(UserId::new(42), item.id).await.unwrap_err();
        assert!(matches!(err, CoreError::NotFound { entity: "User", .. }));
    }

    #[tokio::test]
    async fn test_payment_settles_once() {
        let db = test_db().await;
        let item = db.repos.items.insert(NewItem::new("Book", 500, "b.pdf")).await.unwrap();
        let user = customer(&db.repos, "reader@example.com").await;

        let record = db.repos.payments.insert_pending(user.id, item.id).await.unwrap();
        assert_eq!(record.state, SettlementState::Pending);
        db.repos.payments.attach_session(record.id, "cs_test_1").await.unwrap();

        let first = db.repos.payments.complete_if_pending(record.id).await.unwrap();
        assert!(first.was_applied());
        assert_eq!(first.record().provider_session_id.as_deref(), Some("cs_test_1"));

        let second = db.repos.payments.complete_if_pending(record.id).await.unwrap();
        assert!(!second.was_applied());
        assert_eq!(second.record().completed_at, first.record().completed_at);

        let err = db.repos.payments.complete_if_pending(PaymentId::new(77)).await.unwrap_err();
        assert!(matches!(err, CoreError::NotFound { entity: "Payment", .. }));
        assert!(db.repos.payments.attach_session(PaymentId::new(77), "cs").await.is_err());

        assert_eq!(db.repos.payments.list_for_user(user.id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_concurrent_completion_has_single_winner() {
        let db = test_db().await;
        let item = db.repos.items.insert(NewItem::new("Book", 500, "b.pdf")).await.unwrap();
        let user = customer(&db.repos, "reader@example.com").await;
        let id = db.repos.payments.insert_pending(user.id, item.id).await.unwrap().id;

        let payments = Arc::clone(&db.repos.payments);
        let mut handles = Vec::new();
        for _ in 0..8 {
            let payments = Arc::clone(&payments);
            handles.push(tokio::spawn(async move {
                payments.complete_if_pending(id).await.unwrap().was_applied()
            }));
        }

        let mut applied = 0;
        for handle in handles {
            if handle.await.unwrap() {
                applied += 1;
            }
        }
        assert_eq!(applied, 1);
    }

    #[tokio::test]
    async fn test_reopening_keeps_data() {
        let dir = tempfile::tempdir().unwrap();
        let url = format!("sqlite://{}", dir.path().join("bookshop.db").display());

        let repos = Repositories::sqlite(connect(&url).await.unwrap());
        customer(&repos, "reader@example.com").await;

        let reopened = Repositories::sqlite(connect(&url).await.unwrap());
        assert!(reopened.users.find_by_email("reader@example.com").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_contact_and_subscribers() {
        let db = test_db().await;
        for text in ["first", "second"] {
            db.repos
                .contacts
                .insert(NewContactMessage::new("Ada", "ada@example.com", text).unwrap())
                .await
                .unwrap();
        }
        let inbox = db.repos.contacts.list().await.unwrap();
        assert_eq!(inbox[0].message, "second");
        assert!(!inbox[0].replied);

        let sub = NewSubscriber::new("reader@example.com", "Ada", "L").unwrap();
        db.repos.subscribers.insert(sub.clone()).await.unwrap();
        let err = db.repos.subscribers.insert(sub).await.unwrap_err();
        assert!(matches!(err, CoreError::Conflict(_)));
        assert_eq!(db.repos.subscribers.list().await.unwrap().len(), 1);

        let raw: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM subscribers")
            .fetch_one(&db.pool)
            .await
            .unwrap();
        assert_eq!(raw, 1);
    }
}
