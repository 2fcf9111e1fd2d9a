//! Web server module for receiving push webhooks.
//!
//! This module provides a thin web server that:
//! - Verifies the webhook signature
//! - Stores the raw body and enqueues its handle
//! - Answers with a fixed page as soon as the job is accepted
//!
//! Parsing and card updates happen in the background processes.

pub mod handlers;
pub mod signature;

use axum::{
    extract::DefaultBodyLimit,
    routing::{any, get},
    Router,
};
use tower_http::trace::TraceLayer;

pub use handlers::{health, log_view, push_webhook, AppState, HealthResponse, MAX_BODY_BYTES, OK_BODY};
pub use signature::{sign, verify_signature, SignatureAlgorithm, SignatureError};

/// Build the application router.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", any(push_webhook))
        .route("/health", get(health))
        .route("/logview/", get(log_view))
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
