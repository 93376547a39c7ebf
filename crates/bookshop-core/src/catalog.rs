//! Catalog
//!
//! Read-only listing of purchasable items, annotated with the caller's
//! access, plus startup seeding from a JSON file.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;

use crate::access::can_access;
use crate::error::Result;
use crate::item::{Item, NewItem};
use crate::repository::ItemRepository;
use crate::user::User;

/// A catalog item as shown to a particular caller
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CatalogEntry {
    #[serde(flatten)]
    pub item: Item,

    pub has_access: bool,
}

/// List every item; `has_access` is false for anonymous callers
pub async fn list_for(items: &dyn ItemRepository, viewer: Option<&User>) -> Result<Vec<CatalogEntry>> {
    Ok(items
        .list()
        .await?
        .into_iter()
        .map(|item| CatalogEntry {
            has_access: viewer.is_some_and(|user| can_access(user, item.id)),
            item,
        })
        .collect())
}

/// Read a JSON array of items from disk
pub async fn load_seed(path: impl AsRef<Path>) -> Result<Vec<NewItem>> {
    let raw = tokio::fs::read(path.as_ref()).await?;
    Ok(serde_json::from_slice(&raw)?)
}

/// Insert seed entries whose (name, locale) is not yet in the catalog.
///
/// Returns the number of inserted items.
pub async fn seed(items: &dyn ItemRepository, entries: Vec<NewItem>) -> Result<usize> {
    let mut known: HashSet<(String, String)> = items
        .list()
        .await?
        .into_iter()
        .map(|item| (item.name, item.locale))
        .collect();

    let mut inserted = 0;
    for entry in entries {
        if !known.insert((entry.name.clone(), entry.locale.clone())) {
            tracing::debug!(name = %entry.name, locale = %entry.locale, "Catalog entry already present");
            continue;
        }
        let item = items.insert(entry).await?;
        tracing::info!(item_id = %item.id, name = %item.name, price = item.price, "Seeded catalog item");
        inserted += 1;
    }

    Ok(inserted)
}
