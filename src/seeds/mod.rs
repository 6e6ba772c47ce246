//! Database seeding functionality
//!
//! Bootstraps the first SUPER_ADMIN account from configuration so a fresh
//! deployment can log in and create tenants.

use anyhow::{Context, Result};
use sea_orm::DatabaseConnection;

use crate::config::AppConfig;
use crate::models::user;
use crate::repositories::UserRepository;

/// Ensures the configured SUPER_ADMIN account exists.
///
/// Returns `Ok(None)` when `CMS_ADMIN_EMAIL`/`CMS_ADMIN_PASSWORD` are unset.
/// Running it again resets the password and reactivates the account.
pub async fn seed_super_admin(
    db: &DatabaseConnection,
    config: &AppConfig,
) -> Result<Option<user::Model>> {
    let (Some(email), Some(password)) = (&config.admin_email, &config.admin_password) else {
        log::info!("No admin credentials configured, skipping super admin seed");
        return Ok(None);
    };

    let admin = UserRepository::new(db)
        .upsert_super_admin(email, password)
        .await
        .with_context(|| format!("failed to seed super admin '{email}'"))?;
    log::info!("Super admin '{}' is ready", admin.email);
    Ok(Some(admin))
}
