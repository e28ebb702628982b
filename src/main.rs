mod command;
mod config;
mod cursor;
mod forwarder;
mod pipeline;
mod platform;

use std::path::PathBuf;

use anyhow::{Context, Result};
use tokio::sync::mpsc;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::Config;
use crate::cursor::CursorStore;
use crate::forwarder::Forwarder;
use crate::pipeline::Pipeline;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,topicrelay=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let config_path = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("config.toml"));

    info!("Loading configuration from: {}", config_path.display());
    let config = Config::load(&config_path)
        .with_context(|| format!("Failed to load config from {}", config_path.display()))?;

    info!("Configuration loaded successfully");
    info!("  API: {}", config.api.url);
    info!("  Environment: {}", config.api.environment);
    info!("  Cursor: {}", config.cursor.path.display());
    info!("  History limit: {}", config.feed.history_limit);

    let forwarder = Forwarder::new(config.api.clone())?;
    let pipeline = Pipeline::new(CursorStore::new(config.cursor.path.clone()), forwarder);

    // Feed -> bounded queue -> single consumer. The reader thread is never
    // joined: a blocked stdin read must not hold up shutdown.
    let (tx, rx) = mpsc::channel(config.feed.channel_capacity);
    let stdin = std::io::BufReader::new(std::io::stdin());
    platform::jsonl::spawn(stdin, config.feed.history_limit, tx)?;

    let shutdown = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    info!("Relay is starting...");
    pipeline.run(rx, shutdown).await;

    Ok(())
}
