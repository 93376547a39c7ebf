//! # bookshop-core
//!
//! Domain model for a small digital bookshop: catalog items, users with
//! their owned-item sets, and payment records tying a purchase attempt to
//! its settlement state.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                          Repositories                           │
//! │  ┌────────────────┐  ┌─────────────────┐  ┌───────────────────┐ │
//! │  │ ItemRepository │  │ UserRepository  │  │ PaymentRepository │ │
//! │  │   (catalog)    │  │ (entitlements)  │  │   (audit trail)   │ │
//! │  └────────────────┘  └─────────────────┘  └───────────────────┘ │
//! └─────────────────────────────────────────────────────────────────┘
//!           ▲                     ▲                      ▲
//!        catalog                access           (payments crate)
//! ```
//!
//! Storage is reached only through the repository traits. [`sqlite`] is the
//! persistent backend; the in-memory implementations in [`memory`] back
//! tests. The same traits also hold the contact inbox and the newsletter
//! list.

pub mod access;
pub mod catalog;
pub mod contact;
pub mod error;
pub mod ids;
pub mod item;
pub mod memory;
pub mod notify;
pub mod password;
pub mod payment;
pub mod repository;
pub mod sqlite;
pub mod subscriber;
pub mod user;

pub use access::{authorize_content, can_access};
pub use catalog::CatalogEntry;
pub use contact::{ContactMessage, NewContactMessage};
pub use error::{CoreError, Result};
pub use ids::{ItemId, MessageId, PaymentId, SubscriberId, UserId};
pub use item::{Item, NewItem};
pub use notify::{LogNotifier, Notification, NotificationDispatcher, Notifier};
pub use payment::{Completion, PaymentRecord, SettlementState};
pub use repository::{
    ContactRepository, ItemRepository, PaymentRepository, Repositories, SubscriberRepository,
    UserRepository,
};
pub use subscriber::{NewSubscriber, Subscriber};
pub use user::{NewUser, Role, User};
