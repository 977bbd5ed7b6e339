//! Background worker command.

use std::sync::Arc;

use console::style;
use tokio::sync::watch;

use super::spawn_shutdown_signal;
use crate::config::Settings;
use crate::storage::{LocalStorage, Storage};
use crate::work_queue::build_worker;

/// Drain the job queue until Ctrl+C.
pub async fn cmd_worker(settings: &Settings) -> anyhow::Result<()> {
    settings.ensure_directories()?;
    let ctx = settings.create_db_context();
    ctx.init_schema().await?;

    let storage: Arc<dyn Storage> = Arc::new(LocalStorage::new(
        settings.storage_dir.clone(),
        &settings.secret_key,
    ));
    let worker = build_worker(&ctx, storage, settings)?;

    let (tx, rx) = watch::channel(false);
    spawn_shutdown_signal(tx);

    println!("{} Worker running. Press Ctrl+C to stop", style("→").cyan());
    worker.run(rx).await;
    Ok(())
}
