//! Job queue maintenance.

use chrono::Utc;
use console::style;

use crate::config::Settings;
use crate::work_queue::WorkerConfig;

/// Requeue running jobs whose lock has gone stale.
pub async fn cmd_requeue_stale(settings: &Settings) -> anyhow::Result<()> {
    let ctx = settings.create_db_context();
    ctx.init_schema().await?;

    let stale_after = chrono::Duration::from_std(WorkerConfig::default().stale_after)?;
    let requeued = ctx.jobs().requeue_stale(Utc::now() - stale_after).await?;

    println!("{} Requeued {} stale jobs", style("✓").green(), requeued);
    Ok(())
}
