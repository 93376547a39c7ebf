//! Content Access Policy
//!
//! Admins read everything; everyone else needs the item in their owned set.

use crate::error::{CoreError, Result};
use crate::ids::{ItemId, UserId};
use crate::item::Item;
use crate::repository::Repositories;
use crate::user::User;

/// Whether `user` may read the content of `item`
pub fn can_access(user: &User, item: ItemId) -> bool {
    user.role.is_privileged() || user.owns(item)
}

/// Resolve an item whose content `user_id` is allowed to read.
///
/// Missing item → `NotFound`, denied → `Forbidden`, item without a content
/// reference → `NotFound`.
pub async fn authorize_content(
    repos: &Repositories,
    user_id: UserId,
    item_id: ItemId,
) -> Result<Item> {
    let item = repos
        .items
        .get(item_id)
        .await?
        .ok_or_else(|| CoreError::not_found("Item", item_id))?;

    let user = repos
        .users
        .get(user_id)
        .await?
        .ok_or_else(|| CoreError::Auth(format!("unknown user {user_id}")))?;

    if !can_access(&user, item.id) {
        tracing::info!(user_id = %user.id, item_id = %item.id, "Content access denied");
        return Err(CoreError::Forbidden(format!(
            "user {} does not own item {}",
            user.id, item.id
        )));
    }

    if !item.has_content() {
        tracing::warn!(item_id = %item.id, "Item has no content reference");
        return Err(CoreError::not_found("Content", item.id));
    }

    Ok(item)
}
