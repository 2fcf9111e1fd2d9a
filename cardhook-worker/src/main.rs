//! Cardhook Worker - applies card actions against the board API.
//!
//! This worker consumes jobs from the card_actions queue. For each action it
//! posts the commit comment on the card once, then moves the card to the
//! requested list when one is named.

use std::sync::Arc;

use anyhow::{Context, Result};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use cardhook::board::TrelloClient;
use cardhook::queue::run_consumer;
use cardhook::digest::{capture_channel, LogWriter};
use cardhook::store::SqliteStore;
use cardhook::{ActionExecutor, Config, ACTION_QUEUE};

#[tokio::main]
async fn main() -> Result<()> {
    let (log_capture, log_rx) = capture_channel();

    // Initialize structured JSON logging
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().json().flatten_event(true))
        .with(log_capture)
        .init();

    tracing::info!("worker_starting");

    // Load configuration from environment
    let config = Arc::new(Config::from_env());
    tracing::info!(
        cloudamqp_url_set = !config.cloudamqp_url.is_empty(),
        board_api_url = %config.board_api_url,
        board_api_key_set = !config.board_api_key.is_empty(),
        request_timeout_ms = config.request_timeout_ms,
        concurrency = config.worker_concurrency,
        max_attempts = config.job_max_attempts,
        "config_loaded"
    );

    let store = SqliteStore::open(&config.database_path)
        .with_context(|| format!("Failed to open database {}", config.database_path))?;

    // Persist captured warnings and errors for the digest
    tokio::spawn(LogWriter::new(log_rx, Arc::new(store.clone())).run());

    let board = TrelloClient::from_config(&config).context("Failed to create board API client")?;

    let executor = ActionExecutor::new(Arc::new(store), Arc::new(board));

    // Start the consumer
    run_consumer(config, ACTION_QUEUE, "cardhook-worker", Arc::new(executor)).await?;

    tracing::info!("worker_shutdown_complete");

    Ok(())
}
