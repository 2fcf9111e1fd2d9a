//! In-memory store for tests.

use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use super::{
    ActionRecord, ActionRecordStore, LogStore, PayloadId, PayloadStore, RawPayload, StoreError,
};
use crate::digest::LogRecord;

/// Process-local implementation of the store traits.
#[derive(Default)]
pub struct MemoryStore {
    payloads: RwLock<BTreeMap<PayloadId, RawPayload>>,
    records: RwLock<HashMap<String, ActionRecord>>,
    logs: RwLock<Vec<LogRecord>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored payloads.
    pub async fn payload_count(&self) -> usize {
        self.payloads.read().await.len()
    }

    /// Number of action records.
    pub async fn record_count(&self) -> usize {
        self.records.read().await.len()
    }

    /// Number of captured log records.
    pub async fn log_count(&self) -> usize {
        self.logs.read().await.len()
    }
}

#[async_trait]
impl PayloadStore for MemoryStore {
    async fn put_payload(&self, bytes: Vec<u8>) -> Result<PayloadId, StoreError> {
        let mut payloads = self.payloads.write().await;
        let next = payloads.keys().next_back().map_or(1, |id| id.0 + 1);
        let id = PayloadId(next);
        payloads.insert(
            id,
            RawPayload {
                id,
                bytes,
                created_at: Utc::now(),
            },
        );
        Ok(id)
    }

    async fn get_payload(&self, id: PayloadId) -> Result<RawPayload, StoreError> {
        self.payloads
            .read()
            .await
            .get(&id)
            .cloned()
            .ok_or(StoreError::PayloadNotFound(id))
    }
}

#[async_trait]
impl ActionRecordStore for MemoryStore {
    async fn find_record(&self, key: &str) -> Result<Option<ActionRecord>, StoreError> {
        Ok(self.records.read().await.get(key).cloned())
    }

    async fn put_record(&self, record: &ActionRecord) -> Result<(), StoreError> {
        self.records
            .write()
            .await
            .insert(record.key.clone(), record.clone());
        Ok(())
    }
}

#[async_trait]
impl LogStore for MemoryStore {
    async fn put_log(&self, record: &LogRecord) -> Result<(), StoreError> {
        self.logs.write().await.push(record.clone());
        Ok(())
    }

    async fn logs_since(&self, since: DateTime<Utc>) -> Result<Vec<LogRecord>, StoreError> {
        let mut records: Vec<LogRecord> = self
            .logs
            .read()
            .await
            .iter()
            .filter(|record| record.at >= since)
            .cloned()
            .collect();
        records.sort_by_key(|record| record.at);
        Ok(records)
    }

    async fn prune_logs(&self, before: DateTime<Utc>) -> Result<usize, StoreError> {
        let mut logs = self.logs.write().await;
        let count = logs.len();
        logs.retain(|record| record.at >= before);
        Ok(count - logs.len())
    }
}
