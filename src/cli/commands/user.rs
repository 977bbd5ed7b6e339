//! Account management commands.

use std::sync::Arc;

use console::style;

use crate::config::Settings;
use crate::services::Services;
use crate::storage::{LocalStorage, Storage};

/// Create an account, bypassing public registration.
pub async fn cmd_user_create(
    settings: &Settings,
    email: &str,
    password: &str,
    name: Option<&str>,
    admin: bool,
) -> anyhow::Result<()> {
    let ctx = settings.create_db_context();
    ctx.init_schema().await?;
    let storage: Arc<dyn Storage> = Arc::new(LocalStorage::new(
        settings.storage_dir.clone(),
        &settings.secret_key,
    ));
    let services = Services::new(ctx, storage, settings);

    let name = name
        .map(str::to_string)
        .unwrap_or_else(|| email.split('@').next().unwrap_or(email).to_string());
    let user = services
        .auth
        .create_user(email, &name, password, admin)
        .await?;

    println!(
        "{} Created {} {} ({})",
        style("✓").green(),
        if user.is_admin { "admin" } else { "user" },
        user.email,
        user.id
    );
    Ok(())
}
