//! Cardhook Web Server - push webhook receiver.
//!
//! This binary provides a thin web server that:
//! - Verifies the webhook signature
//! - Stores the raw push payload in SQLite
//! - Enqueues its handle on the push_batches queue
//! - Serves the administrative log digest
//!
//! All parsing and board updates happen in the processor and the worker.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::net::TcpListener;
use tracing::{info, warn};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use cardhook::digest::{capture_channel, LogNotifier, LogWriter};
use cardhook::store::SqliteStore;
use cardhook::util::shutdown_signal;
use cardhook::web::router;
use cardhook::{AppState, Config, Publisher};

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

    info!("web_server_starting");

    // Load configuration
    let config = Config::from_env();
    info!(
        port = config.port,
        database_path = %config.database_path,
        webhook_secret_configured = !config.webhook_secret.is_empty(),
        admin_recipients = config.admin_recipients.len(),
        "config_loaded"
    );

    if config.signature_bypass_insecure {
        warn!("signature_bypass_enabled_do_not_use_in_production");
    }

    let store = SqliteStore::open(&config.database_path)
        .with_context(|| format!("Failed to open database {}", config.database_path))?;
    info!("payload_store_opened");

    // Persist captured warnings and errors for the digest
    tokio::spawn(LogWriter::new(log_rx, Arc::new(store.clone())).run());

    // Create RabbitMQ publisher
    let publisher = Publisher::new(config.cloudamqp_url.clone());
    info!("rabbitmq_publisher_created");

    let port = config.port;
    let state = AppState::new(
        config,
        Arc::new(store.clone()),
        Arc::new(publisher.clone()),
        Arc::new(store),
        Arc::new(LogNotifier),
    );

    let app = router(state);

    // Bind to address
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = TcpListener::bind(addr)
        .await
        .context("Failed to bind to address")?;

    info!(address = %addr, "web_server_listening");

    // Run server with graceful shutdown
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    // Close publisher connection
    publisher.close().await;

    info!("web_server_shutdown_complete");

    Ok(())
}
