//! Webhook endpoint handlers.
//!
//! The push handler only does what has to happen before the sender gets its
//! answer:
//! 1. Verify the signature
//! 2. Store the raw body durably
//! 3. Enqueue a batch job with the payload handle
//!
//! Everything else happens in the processor and the worker.

use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::{rejection::BytesRejection, State},
    http::{HeaderMap, Method, StatusCode},
    response::{Html, IntoResponse, Response},
    Json,
};
use chrono::{Duration, Utc};
use serde::Serialize;
use tracing::{error, info, warn};

use crate::digest::{build_digest, digest_page, AdminNotifier, DIGEST_SUBJECT};
use crate::queue::{Dispatcher, Job};
use crate::store::{LogStore, PayloadStore};
use crate::web::signature::{
    verify_signature, SignatureAlgorithm, SignatureError, SIGNATURE_256_HEADER, SIGNATURE_HEADER,
};
use crate::Config;

/// Fixed body of every successful answer on `/`.
pub const OK_BODY: &str = "<html><body>OK</body></html>";

/// Largest accepted webhook body.
pub const MAX_BODY_BYTES: usize = 5 * 1024 * 1024;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub payloads: Arc<dyn PayloadStore>,
    pub dispatcher: Arc<dyn Dispatcher>,
    pub logs: Arc<dyn LogStore>,
    pub notifier: Arc<dyn AdminNotifier>,
}

impl AppState {
    pub fn new(
        config: Config,
        payloads: Arc<dyn PayloadStore>,
        dispatcher: Arc<dyn Dispatcher>,
        logs: Arc<dyn LogStore>,
        notifier: Arc<dyn AdminNotifier>,
    ) -> Self {
        Self {
            config: Arc::new(config),
            payloads,
            dispatcher,
            logs,
            notifier,
        }
    }
}

// =============================================================================
// Health Check
// =============================================================================

/// Health check response.
#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
}

/// Health check endpoint.
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse { status: "ok" })
}

// =============================================================================
// Push Webhook
// =============================================================================

/// Push webhook endpoint.
///
/// `GET`, `HEAD` and `OPTIONS` answer the fixed OK page so the sender can
/// check the URL. `POST` carries a push event.
pub async fn push_webhook(
    State(state): State<AppState>,
    method: Method,
    headers: HeaderMap,
    body: Result<Bytes, BytesRejection>,
) -> Response {
    match method {
        Method::GET | Method::HEAD | Method::OPTIONS => Html(OK_BODY).into_response(),
        Method::POST => receive_push(&state, &headers, body).await,
        other => {
            warn!(method = %other, "webhook_method_not_allowed");
            StatusCode::METHOD_NOT_ALLOWED.into_response()
        }
    }
}

async fn receive_push(
    state: &AppState,
    headers: &HeaderMap,
    body: Result<Bytes, BytesRejection>,
) -> Response {
    let body = match body {
        Ok(bytes) => bytes,
        Err(e) if e.status() == StatusCode::PAYLOAD_TOO_LARGE => {
            warn!(limit = MAX_BODY_BYTES, "webhook_body_too_large");
            return StatusCode::PAYLOAD_TOO_LARGE.into_response();
        }
        Err(e) => {
            error!(error = %e, "webhook_body_read_failed");
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    };

    info!(
        body_length = body.len(),
        has_signature = headers.contains_key(SIGNATURE_HEADER),
        has_signature_256 = headers.contains_key(SIGNATURE_256_HEADER),
        "webhook_received"
    );

    if let Err(e) = check_signature(&state.config, headers, &body) {
        let status = match e {
            SignatureError::Missing(_) => StatusCode::BAD_REQUEST,
            SignatureError::Mismatch => StatusCode::UNAUTHORIZED,
        };
        warn!(status = status.as_u16(), error = %e, "webhook_rejected");
        return status.into_response();
    }

    let payload_id = match state.payloads.put_payload(body.to_vec()).await {
        Ok(id) => id,
        Err(e) => {
            error!(error = %e, "payload_store_failed");
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    };

    info!(payload_id = %payload_id, "payload_stored");

    if let Err(e) = state
        .dispatcher
        .dispatch(&Job::ProcessBatch { payload_id })
        .await
    {
        error!(payload_id = %payload_id, error = %e, "batch_dispatch_failed");
        return StatusCode::INTERNAL_SERVER_ERROR.into_response();
    }

    info!(payload_id = %payload_id, "batch_enqueued");

    Html(OK_BODY).into_response()
}

/// Verify whichever signature header the request carries, preferring SHA-256.
///
/// A mismatch is tolerated when the insecure bypass is configured; a missing
/// or malformed header never is.
fn check_signature(config: &Config, headers: &HeaderMap, body: &[u8]) -> Result<(), SignatureError> {
    let (header, algorithm) = match (
        headers.get(SIGNATURE_256_HEADER),
        headers.get(SIGNATURE_HEADER),
    ) {
        (Some(value), _) => (value, SignatureAlgorithm::Sha256),
        (None, Some(value)) => (value, SignatureAlgorithm::Sha1),
        (None, None) => {
            return Err(SignatureError::Missing(format!(
                "no {SIGNATURE_HEADER} header"
            )))
        }
    };

    let header = header
        .to_str()
        .map_err(|_| SignatureError::Missing("signature header is not ASCII".to_string()))?;

    match verify_signature(body, header, config.webhook_secret.as_bytes(), algorithm) {
        Err(SignatureError::Mismatch) if config.signature_bypass_insecure => {
            warn!("webhook_signature_bypassed");
            Ok(())
        }
        result => result,
    }
}

// =============================================================================
// Log Digest
// =============================================================================

/// Administrative log digest.
///
/// Sends recent errors from every process to the administrators when there
/// are any, and renders them either way. Records older than the window are
/// pruned afterwards.
pub async fn log_view(State(state): State<AppState>) -> Response {
    let now = Utc::now();
    let since = now - Duration::minutes(state.config.digest_window_minutes);

    let records = match state.logs.logs_since(since).await {
        Ok(records) => records,
        Err(e) => {
            // Info level keeps store trouble out of the log table it concerns.
            info!(error = %e, "log_records_read_failed");
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    };
    let lines = build_digest(&records, now, state.config.digest_window_minutes);

    if !lines.is_empty() {
        let body = lines.join("\n");
        if let Err(e) = state
            .notifier
            .notify(&state.config.admin_recipients, DIGEST_SUBJECT, &body)
            .await
        {
            // Info level keeps this out of the next digest.
            info!(error = %e, "admin_digest_failed");
        }
    }

    match state.logs.prune_logs(since).await {
        Ok(pruned) => info!(lines = lines.len(), pruned, "log_view_rendered"),
        Err(e) => info!(error = %e, "log_records_prune_failed"),
    }

    Html(digest_page(&lines)).into_response()
}
