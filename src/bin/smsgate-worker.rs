//! # SMS Gate Worker
//!
//! Runs the delivery consumers until Ctrl-C, or republishes stale outbox rows
//! once and exits.

use anyhow::Context;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::time::Duration;
use tokio::signal;
use tracing::info;

use smsgate_core::bootstrap::DeliveryBootstrap;
use smsgate_core::config::ConfigManager;
use smsgate_core::logging::init_structured_logging;

#[derive(Parser)]
#[command(name = "smsgate-worker")]
#[command(about = "SMS delivery worker")]
#[command(version = env!("CARGO_PKG_VERSION"))]
struct Cli {
    /// Configuration directory (default: $SMSGATE_CONFIG_DIR or ./config)
    #[arg(short, long, env = "SMSGATE_CONFIG_DIR")]
    config_dir: Option<PathBuf>,

    /// Environment override (default: $SMSGATE_ENV, $APP_ENV, then development)
    #[arg(short, long)]
    environment: Option<String>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Consume all configured topics until interrupted
    Run,

    /// Republish outbox rows that are still pending
    Replay {
        /// Only rows older than this many seconds
        #[arg(long, default_value_t = 60)]
        older_than_secs: u64,

        /// Maximum number of rows per run
        #[arg(long, default_value_t = 500)]
        limit: i64,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config_manager = match &cli.environment {
        Some(env) => ConfigManager::load_from_directory_with_env(cli.config_dir.clone(), env),
        None => ConfigManager::load_from_directory(cli.config_dir.clone()),
    }
    .context("failed to load configuration")?;
    init_structured_logging(&config_manager.config().logging);

    match cli.command.unwrap_or(Commands::Run) {
        Commands::Run => run(&config_manager).await,
        Commands::Replay {
            older_than_secs,
            limit,
        } => replay(&config_manager, Duration::from_secs(older_than_secs), limit).await,
    }
}

async fn run(config_manager: &ConfigManager) -> anyhow::Result<()> {
    let mut system = DeliveryBootstrap::bootstrap_with_config(config_manager, true)
        .await
        .context("failed to start the delivery system")?;
    info!(status = ?system.status(), "Worker running, press Ctrl-C to stop");

    signal::ctrl_c().await?;
    info!("Shutdown signal received");

    system.stop().await?;
    Ok(())
}

async fn replay(
    config_manager: &ConfigManager,
    older_than: Duration,
    limit: i64,
) -> anyhow::Result<()> {
    let mut system = DeliveryBootstrap::bootstrap_with_config(config_manager, false)
        .await
        .context("failed to connect the delivery system")?;

    let report = system.replayer().replay_pending(older_than, limit).await?;
    info!(
        scanned = report.scanned,
        replayed = report.replayed,
        failed = report.failed,
        "Replay complete"
    );

    system.stop().await?;
    Ok(())
}
