//! Async RabbitMQ publisher for enqueueing jobs.
//!
//! This module provides a connection-managed publisher that can be shared
//! across multiple async tasks. Publisher confirms are enabled, so a publish
//! only succeeds once the broker has taken responsibility for the message.

use std::sync::Arc;

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use lapin::{
    options::{BasicPublishOptions, ConfirmSelectOptions, QueueDeclareOptions},
    publisher_confirm::Confirmation,
    types::FieldTable,
    BasicProperties, Channel, Connection, ConnectionProperties,
};
use tokio::sync::RwLock;
use tracing::{info, warn};

use super::types::{Job, JobEnvelope, ACTION_QUEUE, BATCH_QUEUE};
use super::Dispatcher;

/// Async RabbitMQ publisher with connection management.
///
/// The publisher maintains a persistent connection and channel to RabbitMQ,
/// automatically reconnecting on failure.
#[derive(Clone)]
pub struct Publisher {
    inner: Arc<PublisherInner>,
}

struct PublisherInner {
    url: String,
    connection: RwLock<Option<Connection>>,
    channel: RwLock<Option<Channel>>,
}

/// Declare both durable queues on `channel` (idempotent operation).
pub async fn declare_queues(channel: &Channel) -> Result<()> {
    for queue in [BATCH_QUEUE, ACTION_QUEUE] {
        channel
            .queue_declare(
                queue,
                QueueDeclareOptions {
                    durable: true,
                    ..Default::default()
                },
                FieldTable::default(),
            )
            .await
            .with_context(|| format!("Failed to declare queue {queue}"))?;
    }

    info!(
        batch_queue = BATCH_QUEUE,
        action_queue = ACTION_QUEUE,
        "rabbitmq_queues_declared"
    );
    Ok(())
}

impl Publisher {
    /// Create a new publisher with the given RabbitMQ URL.
    pub fn new(url: String) -> Self {
        Self {
            inner: Arc::new(PublisherInner {
                url,
                connection: RwLock::new(None),
                channel: RwLock::new(None),
            }),
        }
    }

    /// Ensure we have a valid connection and channel.
    async fn ensure_connected(&self) -> Result<Channel> {
        {
            let channel = self.inner.channel.read().await;
            if let Some(ch) = channel.as_ref() {
                if ch.status().connected() {
                    return Ok(ch.clone());
                }
            }
        }

        let mut connection = self.inner.connection.write().await;
        let mut channel = self.inner.channel.write().await;

        // Double-check after acquiring write lock
        if let Some(ch) = channel.as_ref() {
            if ch.status().connected() {
                return Ok(ch.clone());
            }
        }

        info!("rabbitmq_publisher_connecting");

        let conn = Connection::connect(&self.inner.url, ConnectionProperties::default())
            .await
            .context("Failed to connect to RabbitMQ")?;

        info!("rabbitmq_publisher_connected");

        let ch = conn
            .create_channel()
            .await
            .context("Failed to create channel")?;

        ch.confirm_select(ConfirmSelectOptions::default())
            .await
            .context("Failed to enable publisher confirms")?;

        declare_queues(&ch).await?;

        *connection = Some(conn);
        *channel = Some(ch.clone());

        Ok(ch)
    }

    /// Publish an envelope to the queue its job is routed to.
    pub async fn publish(&self, envelope: &JobEnvelope) -> Result<()> {
        let channel = self.ensure_connected().await?;

        let body = serde_json::to_vec(envelope).context("Failed to serialize job")?;
        let queue = envelope.job.queue();
        let message_id = envelope.job.message_id();

        let confirmation = channel
            .basic_publish(
                "",
                queue,
                BasicPublishOptions::default(),
                &body,
                BasicProperties::default()
                    .with_delivery_mode(2) // Persistent
                    .with_content_type("application/json".into())
                    .with_message_id(message_id.clone().into()),
            )
            .await
            .with_context(|| format!("Failed to publish to {queue}"))?
            .await
            .context("Failed to confirm publish")?;

        if let Confirmation::Nack(_) = confirmation {
            bail!("Broker rejected message {message_id} for {queue}");
        }

        info!(
            queue = queue,
            message_id = %message_id,
            attempt = envelope.attempt,
            body_length = body.len(),
            "rabbitmq_job_published"
        );

        Ok(())
    }

    /// Close the connection gracefully.
    pub async fn close(&self) {
        let mut connection = self.inner.connection.write().await;
        let mut channel = self.inner.channel.write().await;

        if let Some(ch) = channel.take() {
            if let Err(e) = ch.close(200, "Normal shutdown").await {
                warn!(error = %e, "rabbitmq_channel_close_error");
            }
        }

        if let Some(conn) = connection.take() {
            if let Err(e) = conn.close(200, "Normal shutdown").await {
                warn!(error = %e, "rabbitmq_connection_close_error");
            }
        }

        info!("rabbitmq_publisher_closed");
    }
}

#[async_trait]
impl Dispatcher for Publisher {
    async fn dispatch(&self, job: &Job) -> Result<()> {
        self.publish(&JobEnvelope::new(job.clone())).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_publisher_creation() {
        let publisher = Publisher::new("amqp://localhost:5672".to_string());
        let clone = publisher.clone();
        assert_eq!(Arc::strong_count(&clone.inner), 2);
    }
}
