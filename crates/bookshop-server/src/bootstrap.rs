//! Startup seeding: catalog entries and the admin account.

use bookshop_core::{catalog, password, NewUser, Repositories, Role};

use crate::config::AppConfig;

/// Load `CATALOG_PATH` into the item repository, skipping known entries
pub async fn seed_catalog(repos: &Repositories, config: &AppConfig) -> anyhow::Result<usize> {
    let Some(path) = &config.catalog_path else {
        tracing::info!("No CATALOG_PATH set, catalog starts empty");
        return Ok(0);
    };

    let entries = catalog::load_seed(path).await?;
    let inserted = catalog::seed(repos.items.as_ref(), entries).await?;
    tracing::info!(path = %path.display(), inserted, "Catalog seeded");
    Ok(inserted)
}

/// Create the configured admin account unless it already exists.
///
/// Returns whether an account was created.
pub async fn seed_admin(repos: &Repositories, config: &AppConfig) -> anyhow::Result<bool> {
    let Some(admin) = &config.admin else {
        return Ok(false);
    };

    let seed = NewUser::customer(&admin.email, String::new())?.with_role(Role::Admin);
    if repos.users.find_by_email(&seed.email).await?.is_some() {
        tracing::debug!(email = %seed.email, "Admin account already present");
        return Ok(false);
    }

    let secret = admin.password.clone();
    let hash = tokio::task::spawn_blocking(move || password::hash_password(&secret)).await??;

    let created = repos
        .users
        .insert(NewUser {
            password_hash: hash,
            ..seed
        })
        .await?;
    tracing::info!(user_id = %created.id, email = %created.email, "Admin account created");
    Ok(true)
}
