//! Cardhook Processor - push batch processor.
//!
//! This binary:
//! 1. Consumes payload handles from the push_batches queue
//! 2. Loads, validates and interprets the stored push
//! 3. Publishes one job per card action to the card_actions queue
//!
//! Keeping this out of the web server lets intake answer immediately.

use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::info;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use cardhook::message::BracketParser;
use cardhook::queue::run_consumer;
use cardhook::digest::{capture_channel, LogWriter};
use cardhook::store::SqliteStore;
use cardhook::{BatchProcessor, Config, Publisher, BATCH_QUEUE};

#[tokio::main]
async fn main() -> Result<()> {
    let (log_capture, log_rx) = capture_channel();

    // Initialize structured JSON logging
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().json().flatten_event(true))
        .with(log_capture)
        .init();

    info!("processor_starting");

    // Load configuration
    let config = Arc::new(Config::from_env());
    info!(
        concurrency = config.worker_concurrency,
        database_path = %config.database_path,
        max_comment_size = config.max_comment_size,
        max_attempts = config.job_max_attempts,
        "config_loaded"
    );

    let store = SqliteStore::open(&config.database_path)
        .with_context(|| format!("Failed to open database {}", config.database_path))?;

    // Persist captured warnings and errors for the digest
    tokio::spawn(LogWriter::new(log_rx, Arc::new(store.clone())).run());

    let publisher = Publisher::new(config.cloudamqp_url.clone());

    let processor = BatchProcessor::new(
        Arc::new(store),
        Arc::new(BracketParser),
        Arc::new(publisher.clone()),
        config.max_comment_size,
    );

    let result = run_consumer(config, BATCH_QUEUE, "cardhook-processor", Arc::new(processor)).await;

    publisher.close().await;

    info!("processor_shutdown_complete");

    result
}
