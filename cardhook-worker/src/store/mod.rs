//! Durable storage for raw push payloads and applied-action records.
//!
//! Payloads are written once by the web server and read by the processor;
//! they are never updated or deleted so a failed batch can be replayed by id.
//! Action records mark an action as applied; their absence means "not yet".
//! Log records are the warnings and errors every process captures for the
//! administrative digest.

pub mod memory;
pub mod sqlite;

use std::fmt;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::digest::LogRecord;

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

/// Handle of a stored payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PayloadId(pub i64);

impl fmt::Display for PayloadId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "push_payloads/{}", self.0)
    }
}

/// Raw webhook body as received.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawPayload {
    pub id: PayloadId,
    pub bytes: Vec<u8>,
    pub created_at: DateTime<Utc>,
}

/// Terminal status of an applied action. `Ok` is the only one there is: a
/// failed action leaves no record behind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordStatus {
    Ok,
}

impl RecordStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            RecordStatus::Ok => "OK",
        }
    }

    pub fn parse(raw: &str) -> Result<Self, StoreError> {
        match raw {
            "OK" => Ok(RecordStatus::Ok),
            other => Err(StoreError::UnknownStatus(other.to_string())),
        }
    }
}

/// Marker proving the action with `key` has been applied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionRecord {
    pub key: String,
    pub status: RecordStatus,
}

impl ActionRecord {
    pub fn ok(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            status: RecordStatus::Ok,
        }
    }
}

/// Storage failure.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("payload {0} not found")]
    PayloadNotFound(PayloadId),

    #[error("unknown action record status '{0}'")]
    UnknownStatus(String),

    #[error("failed to {operation}: {message}")]
    Storage {
        operation: &'static str,
        message: String,
    },
}

impl StoreError {
    pub fn storage(operation: &'static str, message: impl Into<String>) -> Self {
        StoreError::Storage {
            operation,
            message: message.into(),
        }
    }

    /// Whether trying again later can succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, StoreError::Storage { .. })
    }
}

/// Write-once store of raw webhook bodies.
#[async_trait]
pub trait PayloadStore: Send + Sync {
    /// Persist `bytes` stamped with the current time and return its handle.
    async fn put_payload(&self, bytes: Vec<u8>) -> Result<PayloadId, StoreError>;

    async fn get_payload(&self, id: PayloadId) -> Result<RawPayload, StoreError>;
}

/// Dedup records keyed by [`crate::Action::idempotence_key`].
#[async_trait]
pub trait ActionRecordStore: Send + Sync {
    /// Look up a record. `Ok(None)` means the action has not been applied.
    async fn find_record(&self, key: &str) -> Result<Option<ActionRecord>, StoreError>;

    async fn put_record(&self, record: &ActionRecord) -> Result<(), StoreError>;
}

/// Captured warnings and errors shared by all processes.
#[async_trait]
pub trait LogStore: Send + Sync {
    async fn put_log(&self, record: &LogRecord) -> Result<(), StoreError>;

    /// Records captured at or after `since`, oldest first.
    async fn logs_since(&self, since: DateTime<Utc>) -> Result<Vec<LogRecord>, StoreError>;

    /// Delete records captured before `before` and return how many went.
    async fn prune_logs(&self, before: DateTime<Utc>) -> Result<usize, StoreError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_payload_id_display_names_table() {
        assert_eq!(PayloadId(42).to_string(), "push_payloads/42");
    }

    #[test]
    fn test_record_status_parse() {
        assert_eq!(RecordStatus::parse("OK").unwrap(), RecordStatus::Ok);
        assert!(matches!(
            RecordStatus::parse("FAILED"),
            Err(StoreError::UnknownStatus(s)) if s == "FAILED"
        ));
    }

    #[test]
    fn test_only_storage_errors_are_retryable() {
        assert!(StoreError::storage("read", "disk I/O error").is_retryable());
        assert!(!StoreError::PayloadNotFound(PayloadId(1)).is_retryable());
        assert!(!StoreError::UnknownStatus("X".into()).is_retryable());
    }
}
