//! SQLite implementation of the payload, action-record and log stores.
//!
//! One database file is shared by the web server (payload writes) and the
//! workers (payload reads, record reads and writes). All three write their
//! captured warnings and errors to it for the digest. WAL journaling plus a busy
//! timeout lets those processes use it concurrently. rusqlite is synchronous,
//! so every call runs on `tokio::task::spawn_blocking`.

use std::path::Path;
use std::str::FromStr;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use tracing::{info, Level};

use super::{
    ActionRecord, ActionRecordStore, LogStore, PayloadId, PayloadStore, RawPayload, RecordStatus,
    StoreError,
};
use crate::digest::LogRecord;

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS push_payloads (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    payload BLOB NOT NULL,
    created_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS action_records (
    idempotence_key TEXT PRIMARY KEY,
    result TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS log_records (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    at TEXT NOT NULL,
    level TEXT NOT NULL,
    target TEXT NOT NULL,
    message TEXT NOT NULL,
    fields TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS log_records_at ON log_records (at);
"#;

/// Fixed-width UTC timestamps, so text order is time order.
fn log_timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// SQLite-backed store.
#[derive(Clone)]
pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteStore {
    /// Open (or create) the database at `path` and apply the schema.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, StoreError> {
        let path = path.as_ref();
        let conn = Connection::open(path)
            .map_err(|e| StoreError::storage("open database", e.to_string()))?;

        // In-memory databases answer "memory" here, which is fine.
        let journal_mode: String = conn
            .query_row("PRAGMA journal_mode = WAL", [], |row| row.get(0))
            .map_err(|e| StoreError::storage("set journal_mode", e.to_string()))?;

        conn.execute_batch(
            r#"
            PRAGMA synchronous = FULL;
            PRAGMA busy_timeout = 5000;
            "#,
        )
        .map_err(|e| StoreError::storage("configure pragmas", e.to_string()))?;

        conn.execute_batch(SCHEMA)
            .map_err(|e| StoreError::storage("create schema", e.to_string()))?;

        info!(
            path = %path.display(),
            journal_mode = %journal_mode,
            "sqlite_store_opened"
        );

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Open a private in-memory database.
    pub fn in_memory() -> Result<Self, StoreError> {
        Self::open(":memory:")
    }

    async fn with_conn<T, F>(&self, operation: &'static str, f: F) -> Result<T, StoreError>
    where
        T: Send + 'static,
        F: FnOnce(&Connection) -> Result<T, StoreError> + Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let guard = conn
                .lock()
                .map_err(|_| StoreError::storage(operation, "connection mutex poisoned"))?;
            f(&guard)
        })
        .await
        .map_err(|e| StoreError::storage(operation, e.to_string()))?
    }
}

#[async_trait]
impl PayloadStore for SqliteStore {
    async fn put_payload(&self, bytes: Vec<u8>) -> Result<PayloadId, StoreError> {
        let created_at = Utc::now().to_rfc3339();
        self.with_conn("insert payload", move |conn| {
            conn.execute(
                "INSERT INTO push_payloads (payload, created_at) VALUES (?1, ?2)",
                params![bytes, created_at],
            )
            .map_err(|e| StoreError::storage("insert payload", e.to_string()))?;
            Ok(PayloadId(conn.last_insert_rowid()))
        })
        .await
    }

    async fn get_payload(&self, id: PayloadId) -> Result<RawPayload, StoreError> {
        let row = self
            .with_conn("read payload", move |conn| {
                conn.query_row(
                    "SELECT payload, created_at FROM push_payloads WHERE id = ?1",
                    params![id.0],
                    |row| Ok((row.get::<_, Vec<u8>>(0)?, row.get::<_, String>(1)?)),
                )
                .optional()
                .map_err(|e| StoreError::storage("read payload", e.to_string()))
            })
            .await?;

        let (bytes, created_at) = row.ok_or(StoreError::PayloadNotFound(id))?;
        let created_at = DateTime::parse_from_rfc3339(&created_at)
            .map_err(|e| StoreError::storage("parse payload timestamp", e.to_string()))?
            .with_timezone(&Utc);

        Ok(RawPayload {
            id,
            bytes,
            created_at,
        })
    }
}

#[async_trait]
impl ActionRecordStore for SqliteStore {
    async fn find_record(&self, key: &str) -> Result<Option<ActionRecord>, StoreError> {
        let lookup = key.to_string();
        let result = self
            .with_conn("read action record", move |conn| {
                conn.query_row(
                    "SELECT result FROM action_records WHERE idempotence_key = ?1",
                    params![lookup],
                    |row| row.get::<_, String>(0),
                )
                .optional()
                .map_err(|e| StoreError::storage("read action record", e.to_string()))
            })
            .await?;

        match result {
            Some(raw) => Ok(Some(ActionRecord {
                key: key.to_string(),
                status: RecordStatus::parse(&raw)?,
            })),
            None => Ok(None),
        }
    }

    async fn put_record(&self, record: &ActionRecord) -> Result<(), StoreError> {
        let key = record.key.clone();
        let status = record.status.as_str();
        self.with_conn("write action record", move |conn| {
            conn.execute(
                "INSERT OR REPLACE INTO action_records (idempotence_key, result) VALUES (?1, ?2)",
                params![key, status],
            )
            .map_err(|e| StoreError::storage("write action record", e.to_string()))?;
            Ok(())
        })
        .await
    }
}

#[async_trait]
impl LogStore for SqliteStore {
    async fn put_log(&self, record: &LogRecord) -> Result<(), StoreError> {
        let at = log_timestamp(record.at);
        let level = record.level.to_string();
        let target = record.target.clone();
        let message = record.message.clone();
        let fields = serde_json::to_string(&record.fields)
            .map_err(|e| StoreError::storage("encode log fields", e.to_string()))?;

        self.with_conn("write log record", move |conn| {
            conn.execute(
                "INSERT INTO log_records (at, level, target, message, fields) VALUES (?1, ?2, ?3, ?4, ?5)",
                params![at, level, target, message, fields],
            )
            .map_err(|e| StoreError::storage("write log record", e.to_string()))?;
            Ok(())
        })
        .await
    }

    async fn logs_since(&self, since: DateTime<Utc>) -> Result<Vec<LogRecord>, StoreError> {
        let since = log_timestamp(since);
        let rows = self
            .with_conn("read log records", move |conn| {
                let mut stmt = conn
                    .prepare(
                        "SELECT at, level, target, message, fields FROM log_records \
                         WHERE at >= ?1 ORDER BY at, id",
                    )
                    .map_err(|e| StoreError::storage("read log records", e.to_string()))?;
                let rows = stmt
                    .query_map(params![since], |row| {
                        Ok((
                            row.get::<_, String>(0)?,
                            row.get::<_, String>(1)?,
                            row.get::<_, String>(2)?,
                            row.get::<_, String>(3)?,
                            row.get::<_, String>(4)?,
                        ))
                    })
                    .and_then(|rows| rows.collect::<Result<Vec<_>, _>>())
                    .map_err(|e| StoreError::storage("read log records", e.to_string()))?;
                Ok(rows)
            })
            .await?;

        rows.into_iter()
            .map(|(at, level, target, message, fields)| {
                Ok(LogRecord {
                    at: DateTime::parse_from_rfc3339(&at)
                        .map_err(|e| StoreError::storage("parse log timestamp", e.to_string()))?
                        .with_timezone(&Utc),
                    level: Level::from_str(&level)
                        .map_err(|e| StoreError::storage("parse log level", e.to_string()))?,
                    target,
                    message,
                    fields: serde_json::from_str(&fields)
                        .map_err(|e| StoreError::storage("decode log fields", e.to_string()))?,
                })
            })
            .collect()
    }

    async fn prune_logs(&self, before: DateTime<Utc>) -> Result<usize, StoreError> {
        let before = log_timestamp(before);
        self.with_conn("prune log records", move |conn| {
            conn.execute("DELETE FROM log_records WHERE at < ?1", params![before])
                .map_err(|e| StoreError::storage("prune log records", e.to_string()))
        })
        .await
    }
}
