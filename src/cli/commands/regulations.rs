//! Regulation catalog commands.

use std::path::Path;
use std::sync::Arc;

use console::style;

use crate::config::Settings;
use crate::services::Services;
use crate::storage::{LocalStorage, Storage};

/// Load regulations from a JSON array; existing codes are skipped.
pub async fn cmd_regulations_import(settings: &Settings, file: &Path) -> anyhow::Result<()> {
    let json = tokio::fs::read_to_string(file)
        .await
        .map_err(|e| anyhow::anyhow!("Failed to read {}: {}", file.display(), e))?;

    let ctx = settings.create_db_context();
    ctx.init_schema().await?;
    let storage: Arc<dyn Storage> = Arc::new(LocalStorage::new(
        settings.storage_dir.clone(),
        &settings.secret_key,
    ));
    let services = Services::new(ctx, storage, settings);

    let summary = services
        .regulations
        .import_json(&json)
        .await?;

    println!(
        "{} Imported {} regulations ({} already present)",
        style("✓").green(),
        summary.imported,
        summary.skipped
    );
    Ok(())
}
