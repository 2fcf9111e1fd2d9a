//! Capture of warnings and errors into the shared log store.
//!
//! Every binary installs a [`LogCaptureLayer`]. The layer hands WARN and ERROR
//! events to a channel, and a [`LogWriter`] task persists them, so the digest
//! served by the web process sees errors raised in the processor and the
//! worker too.

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tracing::field::{Field, Visit};
use tracing::{info, Event, Level, Subscriber};
use tracing_subscriber::layer::{Context, Layer};

use crate::store::LogStore;

/// One captured log event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogRecord {
    pub at: DateTime<Utc>,
    pub level: Level,
    pub target: String,
    pub message: String,
    pub fields: Vec<(String, String)>,
}

impl LogRecord {
    /// Single-line rendering used by the digest.
    pub fn line(&self) -> String {
        let mut line = format!(
            "{} {} {} {}",
            self.at.to_rfc3339(),
            self.level,
            self.target,
            self.message
        );
        for (name, value) in &self.fields {
            line.push_str(&format!(" {name}={value}"));
        }
        line
    }
}

/// Create a capture layer and the receiving end its records arrive on.
pub fn capture_channel() -> (LogCaptureLayer, UnboundedReceiver<LogRecord>) {
    let (tx, rx) = mpsc::unbounded_channel();
    (LogCaptureLayer { tx }, rx)
}

/// `tracing-subscriber` layer forwarding WARN and ERROR events.
pub struct LogCaptureLayer {
    tx: UnboundedSender<LogRecord>,
}

impl<S: Subscriber> Layer<S> for LogCaptureLayer {
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let metadata = event.metadata();
        if *metadata.level() > Level::WARN {
            return;
        }

        let mut visitor = FieldCollector::default();
        event.record(&mut visitor);

        // The writer is gone only while the process shuts down.
        let _ = self.tx.send(LogRecord {
            at: Utc::now(),
            level: *metadata.level(),
            target: metadata.target().to_string(),
            message: visitor.message,
            fields: visitor.fields,
        });
    }
}

/// Persists captured records into a [`LogStore`].
pub struct LogWriter {
    rx: UnboundedReceiver<LogRecord>,
    store: Arc<dyn LogStore>,
}

impl LogWriter {
    pub fn new(rx: UnboundedReceiver<LogRecord>, store: Arc<dyn LogStore>) -> Self {
        Self { rx, store }
    }

    /// Persist records until every capture layer has been dropped.
    pub async fn run(mut self) {
        while let Some(record) = self.rx.recv().await {
            self.write(&record).await;
        }
    }

    /// Persist the records queued so far and return how many there were.
    pub async fn flush(&mut self) -> usize {
        let mut written = 0;
        while let Ok(record) = self.rx.try_recv() {
            self.write(&record).await;
            written += 1;
        }
        written
    }

    async fn write(&self, record: &LogRecord) {
        if let Err(e) = self.store.put_log(record).await {
            // Info level is not captured, so this cannot feed back into the writer.
            info!(error = %e, message = %record.message, "log_record_write_failed");
        }
    }
}

#[derive(Default)]
struct FieldCollector {
    message: String,
    fields: Vec<(String, String)>,
}

impl Visit for FieldCollector {
    fn record_str(&mut self, field: &Field, value: &str) {
        if field.name() == "message" {
            self.message = value.to_string();
        } else {
            self.fields.push((field.name().to_string(), value.to_string()));
        }
    }

    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        if field.name() == "message" {
            self.message = format!("{value:?}");
        } else {
            self.fields.push((field.name().to_string(), format!("{value:?}")));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use tracing_subscriber::layer::SubscriberExt;

    #[tokio::test]
    async fn test_layer_keeps_warnings_and_errors_only() {
        let (layer, rx) = capture_channel();
        let store = Arc::new(MemoryStore::new());
        let mut writer = LogWriter::new(rx, store.clone());

        let subscriber = tracing_subscriber::registry().with(layer);
        tracing::subscriber::with_default(subscriber, || {
            tracing::info!(card_id = "CARD-1", "card_moved");
            tracing::warn!(card_id = "CARD-1", attempt = 2, "card_move_failed");
            tracing::error!(error = "boom", "action_failed");
            tracing::debug!("noise");
        });

        assert_eq!(writer.flush().await, 2);

        let records = store.logs_since(Utc::now() - chrono::Duration::minutes(1)).await.unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].level, Level::WARN);
        assert_eq!(records[0].message, "card_move_failed");
        assert_eq!(
            records[0].fields,
            vec![
                ("card_id".to_string(), "CARD-1".to_string()),
                ("attempt".to_string(), "2".to_string()),
            ]
        );
        assert_eq!(records[1].level, Level::ERROR);
        assert!(records[1]
            .line()
            .ends_with("ERROR cardhook::digest::capture::tests action_failed error=boom"));
    }

    #[tokio::test]
    async fn test_run_stops_when_layer_is_dropped() {
        let (layer, rx) = capture_channel();
        let store = Arc::new(MemoryStore::new());
        let writer = tokio::spawn(LogWriter::new(rx, store.clone()).run());

        let subscriber = tracing_subscriber::registry().with(layer);
        tracing::subscriber::with_default(subscriber, || {
            tracing::error!("job_dead_lettered");
        });

        writer.await.unwrap();
        assert_eq!(store.log_count().await, 1);
    }
}
