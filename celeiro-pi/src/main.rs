//! celeiro-pi - Package Intake service
//!
//! Watches the configured inbound directories for article submission
//! packages, checks them in and validates them against the editorial
//! system's records.

use anyhow::Result;
use celeiro_pi::config::{Cli, IntakeConfig};
use celeiro_pi::monitor::Monitor;
use celeiro_pi::AppContext;
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    info!("Starting celeiro-pi (Package Intake)");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));

    let cli = Cli::parse();
    let config = IntakeConfig::resolve(&cli)?;
    config.ensure_directories()?;
    info!("Root folder: {}", config.root.display());
    info!("Database: {}", config.db_path.display());

    let db = celeiro_common::db::init_database(&config.db_path).await?;
    info!("Database connection established");

    let ctx = AppContext::new(db, config)?;
    let monitor = Monitor::start(&ctx)?;

    tokio::signal::ctrl_c().await?;
    info!("Shutdown signal received; draining workers");
    monitor.shutdown().await;
    info!("celeiro-pi stopped");

    Ok(())
}
