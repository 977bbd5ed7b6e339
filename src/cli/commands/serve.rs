//! Web server command.

use console::style;
use tokio::sync::watch;

use super::spawn_shutdown_signal;
use crate::config::Settings;
use crate::server::{self, AppState};
use crate::work_queue::build_worker;

/// Start the web server, optionally with an in-process worker.
pub async fn cmd_serve(
    mut settings: Settings,
    bind: Option<&str>,
    with_worker: bool,
) -> anyhow::Result<()> {
    if let Some(bind) = bind {
        settings.bind = bind.to_string();
    }
    let addr = parse_bind_address(&settings.bind)?;

    settings.ensure_directories()?;
    println!("{} Running database migrations...", style("→").cyan());
    let ctx = settings.create_db_context();
    if let Err(e) = ctx.init_schema().await {
        eprintln!("  {} Migration failed: {}", style("✗").red(), e);
        return Err(anyhow::anyhow!("Database migration failed: {}", e));
    }
    println!("  {} Database ready", style("✓").green());

    let (tx, rx) = watch::channel(false);
    spawn_shutdown_signal(tx);

    let state = AppState::new(ctx.clone(), settings.clone());

    let worker_handle = if with_worker {
        let worker = build_worker(&ctx, state.storage.clone(), &settings)?;
        let rx = rx.clone();
        Some(tokio::spawn(async move { worker.run(rx).await }))
    } else {
        None
    };

    println!(
        "{} Starting siteinspect at http://{}",
        style("→").cyan(),
        addr
    );
    println!("  Press Ctrl+C to stop");

    let mut server_rx = rx;
    server::serve(state, &addr, async move {
        let _ = server_rx.wait_for(|stop| *stop).await;
    })
    .await?;

    if let Some(handle) = worker_handle {
        handle.await?;
    }
    Ok(())
}

/// Parse a bind address that can be:
/// - Just a port: "3030" -> 127.0.0.1:3030
/// - Just a host: "0.0.0.0" -> 0.0.0.0:3030
/// - Host and port: "0.0.0.0:3030" -> 0.0.0.0:3030
fn parse_bind_address(bind: &str) -> anyhow::Result<String> {
    if let Ok(port) = bind.parse::<u16>() {
        return Ok(format!("127.0.0.1:{}", port));
    }

    if let Some((host, port_str)) = bind.rsplit_once(':') {
        if port_str.parse::<u16>().is_ok() {
            return Ok(format!("{}:{}", host, port_str));
        }
        anyhow::bail!("Invalid port in bind address: {}", bind);
    }

    Ok(format!("{}:3030", bind))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_bind_address() {
        assert_eq!(parse_bind_address("8080").unwrap(), "127.0.0.1:8080");
        assert_eq!(parse_bind_address("0.0.0.0").unwrap(), "0.0.0.0:3030");
        assert_eq!(parse_bind_address("0.0.0.0:9000").unwrap(), "0.0.0.0:9000");
        assert!(parse_bind_address("localhost:http").is_err());
    }
}
