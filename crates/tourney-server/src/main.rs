//! # Tourney Server
//!
//! Holds the tournament snapshot and pushes every change to connected clients.
//!
//! ## Usage
//!
//! ```bash
//! # Run with default settings
//! tourney-server
//!
//! # Run with custom config
//! tourney-server --config /path/to/tourney.toml
//!
//! # Run with environment variables
//! TOURNEY_PORT=8080 TOURNEY_HOST=0.0.0.0 tourney-server
//! ```

mod config;
mod handlers;
mod metrics;

use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Tournament snapshot server.
#[derive(Debug, Parser)]
#[command(name = "tourney-server", version, about)]
struct Args {
    /// Path to a TOML config file.
    #[arg(short, long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "tourney_server=debug,tourney_core=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();
    let config = config::Config::load(args.config.as_deref())?;

    tracing::info!(
        admins = config.admins.len(),
        "Starting Tourney server on {}:{}",
        config.host,
        config.port
    );

    metrics::init_metrics();

    handlers::run_server(config).await?;

    Ok(())
}
