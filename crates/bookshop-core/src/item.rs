//! Catalog Items
//!
//! A purchasable book: price in minor currency units plus a reference to
//! the stored content file.

use serde::{Deserialize, Serialize};

use crate::ids::ItemId;

/// A catalog entry
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Item {
    pub id: ItemId,

    /// Display name shown on the checkout page
    pub name: String,

    /// Price in minor currency units (cents)
    pub price: i64,

    /// Path of the content file, relative to the content root
    pub content_ref: String,

    /// Language tag of the edition, e.g. "en"
    pub locale: String,
}

/// Fields for inserting a new item
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewItem {
    pub name: String,
    pub price: i64,
    #[serde(default)]
    pub content_ref: String,
    #[serde(default = "default_locale")]
    pub locale: String,
}

fn default_locale() -> String {
    "en".into()
}

impl NewItem {
    pub fn new(name: impl Into<String>, price: i64, content_ref: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            price,
            content_ref: content_ref.into(),
            locale: default_locale(),
        }
    }

    #[must_use]
    pub fn with_locale(mut self, locale: impl Into<String>) -> Self {
        self.locale = locale.into();
        self
    }

    pub(crate) fn into_item(self, id: ItemId) -> Item {
        Item {
            id,
            name: self.name,
            price: self.price,
            content_ref: self.content_ref,
            locale: self.locale,
        }
    }
}

impl Item {
    /// Whether the item points at any stored content
    pub fn has_content(&self) -> bool {
        !self.content_ref.trim().is_empty()
    }
}
