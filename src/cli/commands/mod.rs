//! CLI commands implementation.
//!
//! This module contains the CLI parser and dispatches to command-specific modules.

mod init;
mod jobs;
mod regulations;
mod serve;
mod user;
mod worker;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::config::{load_settings, LoadOptions};

#[derive(Parser)]
#[command(name = "siteinspect")]
#[command(about = "Construction-site safety inspection server")]
#[command(version)]
pub struct Cli {
    /// Config file path (overrides auto-discovery)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Data directory (overrides config file)
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Check if verbose mode is enabled (for early logging setup).
pub fn is_verbose() -> bool {
    std::env::args().any(|arg| arg == "-v" || arg == "--verbose")
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the data directory and database
    Init,

    /// Start the web server
    Serve {
        /// Address to bind to: PORT, HOST, or HOST:PORT (default from config)
        #[arg(long)]
        bind: Option<String>,
        /// Also run the background job worker in this process
        #[arg(long)]
        with_worker: bool,
    },

    /// Run the background job worker
    Worker,

    /// Manage user accounts
    User {
        #[command(subcommand)]
        command: UserCommands,
    },

    /// Manage the regulation catalog
    Regulations {
        #[command(subcommand)]
        command: RegulationCommands,
    },

    /// Inspect and repair the job queue
    Jobs {
        #[command(subcommand)]
        command: JobCommands,
    },
}

#[derive(Subcommand)]
enum UserCommands {
    /// Create an account
    Create {
        #[arg(long)]
        email: String,
        #[arg(long, env = "SITEINSPECT_PASSWORD")]
        password: String,
        /// Display name (defaults to the email's local part)
        #[arg(long)]
        name: Option<String>,
        /// Grant access to the admin pages
        #[arg(long)]
        admin: bool,
    },
}

#[derive(Subcommand)]
enum RegulationCommands {
    /// Import regulations from a JSON array file
    Import {
        /// Path to the JSON file
        file: PathBuf,
    },
}

#[derive(Subcommand)]
enum JobCommands {
    /// Return abandoned running jobs to the queue
    RequeueStale,
}

/// Run the CLI.
pub async fn run() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let options = LoadOptions {
        config_path: cli.config,
        data_dir: cli.data_dir,
    };
    let (settings, _config) = load_settings(options).await;

    match cli.command {
        Commands::Init => init::cmd_init(&settings).await,
        Commands::Serve { bind, with_worker } => {
            serve::cmd_serve(settings, bind.as_deref(), with_worker).await
        }
        Commands::Worker => worker::cmd_worker(&settings).await,
        Commands::User { command } => match command {
            UserCommands::Create {
                email,
                password,
                name,
                admin,
            } => user::cmd_user_create(&settings, &email, &password, name.as_deref(), admin).await,
        },
        Commands::Regulations { command } => match command {
            RegulationCommands::Import { file } => {
                regulations::cmd_regulations_import(&settings, &file).await
            }
        },
        Commands::Jobs { command } => match command {
            JobCommands::RequeueStale => jobs::cmd_requeue_stale(&settings).await,
        },
    }
}

/// Wait for Ctrl+C and flip `tx` so every long-running task stops.
pub(crate) fn spawn_shutdown_signal(tx: tokio::sync::watch::Sender<bool>) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("shutdown requested");
        }
        let _ = tx.send(true);
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_serve_with_worker() {
        let cli = Cli::try_parse_from([
            "siteinspect",
            "serve",
            "--bind",
            "0.0.0.0:8080",
            "--with-worker",
        ])
        .unwrap();
        match cli.command {
            Commands::Serve { bind, with_worker } => {
                assert_eq!(bind.as_deref(), Some("0.0.0.0:8080"));
                assert!(with_worker);
            }
            _ => panic!("expected serve"),
        }
    }

    #[test]
    fn test_parse_user_create() {
        let cli = Cli::try_parse_from([
            "siteinspect",
            "user",
            "create",
            "--email",
            "admin@example.com",
            "--password",
            "hunter22hunter",
            "--admin",
        ])
        .unwrap();
        assert!(matches!(
            cli.command,
            Commands::User {
                command: UserCommands::Create { admin: true, .. }
            }
        ));
    }
}
