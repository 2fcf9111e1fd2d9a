//! Administrative log digest.
//!
//! Every process captures its warnings and errors into the shared
//! [`LogStore`](crate::store::LogStore). Recent errors are read back from it
//! and, when there are any, sent to the administrators. The same lines are
//! rendered as a plain HTML page for inspection.

pub mod capture;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use tracing::{info, Level};

pub use capture::{capture_channel, LogCaptureLayer, LogRecord, LogWriter};

/// Subject of digest notifications.
pub const DIGEST_SUBJECT: &str = "System Notification";

/// Sends administrative notifications.
#[async_trait]
pub trait AdminNotifier: Send + Sync {
    async fn notify(&self, recipients: &[String], subject: &str, body: &str) -> anyhow::Result<()>;
}

/// Notifier that writes the digest to the structured log.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

#[async_trait]
impl AdminNotifier for LogNotifier {
    async fn notify(&self, recipients: &[String], subject: &str, body: &str) -> anyhow::Result<()> {
        info!(
            recipients = %recipients.join(","),
            subject = %subject,
            body_length = body.len(),
            body = %body,
            "admin_digest_sent"
        );
        Ok(())
    }
}

/// ERROR lines recorded within the last `window_minutes` before `now`.
pub fn build_digest(records: &[LogRecord], now: DateTime<Utc>, window_minutes: i64) -> Vec<String> {
    let since = now - Duration::minutes(window_minutes);
    records
        .iter()
        .filter(|record| record.level == Level::ERROR && record.at >= since)
        .map(LogRecord::line)
        .collect()
}

/// Render digest lines as an HTML page.
pub fn digest_page(lines: &[String]) -> String {
    let mut page = String::from("<html><body><pre>");
    for line in lines {
        page.push_str(&escape_html(line));
        page.push('\n');
    }
    page.push_str("</pre></body></html>");
    page
}

fn escape_html(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            _ => escaped.push(c),
        }
    }
    escaped
}
