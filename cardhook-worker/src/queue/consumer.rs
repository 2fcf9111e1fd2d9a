//! RabbitMQ consumer loop shared by the processor and the worker.
//!
//! Each delivery is handled on its own task. Outcomes map onto the broker:
//!
//! | Handler result | Action |
//! |---|---|
//! | `Ok` | ack |
//! | retryable error, attempts left | wait, re-publish with `attempt + 1`, ack |
//! | retryable error, attempts exhausted | reject without requeue (dead letter) |
//! | permanent error or undecodable body | reject without requeue |
//!
//! Rejected jobs are logged with their message id; stored payload handles
//! make them replayable by hand.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use futures::StreamExt;
use lapin::{
    options::{BasicAckOptions, BasicConsumeOptions, BasicNackOptions, BasicQosOptions},
    types::FieldTable,
    Channel, Connection, ConnectionProperties,
};
use tracing::{error, info, warn};

use super::publisher::declare_queues;
use super::{JobEnvelope, JobError, JobHandler, Publisher};
use crate::util::{retry_delay, shutdown_signal};
use crate::Config;

/// What to do with a delivery once its handler returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    Ack,
    Retry { delay: Duration },
    DeadLetter,
    Reject,
}

/// Apply the retry policy to a handler result.
pub fn decide(
    result: &Result<(), JobError>,
    attempt: u32,
    max_attempts: u32,
    retry_delay_ms: (u64, u64),
) -> Disposition {
    match result {
        Ok(()) => Disposition::Ack,
        Err(e) if e.retryable && attempt < max_attempts => Disposition::Retry {
            delay: retry_delay(attempt, retry_delay_ms),
        },
        Err(e) if e.retryable => Disposition::DeadLetter,
        Err(_) => Disposition::Reject,
    }
}

/// Consume `queue` until shutdown, passing every job to `handler`.
///
/// This function:
/// 1. Connects to RabbitMQ using the configured URL
/// 2. Sets QoS prefetch to the configured concurrency
/// 3. Declares both queues (idempotent operation)
/// 4. Spawns a task per delivery and settles it according to [`decide`]
/// 5. Handles graceful shutdown on SIGINT/SIGTERM
pub async fn run_consumer(
    config: Arc<Config>,
    queue: &'static str,
    consumer_tag: &str,
    handler: Arc<dyn JobHandler>,
) -> Result<()> {
    info!(url_length = config.cloudamqp_url.len(), "rabbitmq_connecting");

    let conn = Connection::connect(&config.cloudamqp_url, ConnectionProperties::default())
        .await
        .context("Failed to connect to RabbitMQ")?;

    info!("rabbitmq_connected");

    let channel = conn
        .create_channel()
        .await
        .context("Failed to create channel")?;

    let prefetch_count = u16::try_from(config.worker_concurrency).unwrap_or(u16::MAX);
    channel
        .basic_qos(prefetch_count, BasicQosOptions::default())
        .await
        .context("Failed to set QoS")?;

    info!(prefetch_count = prefetch_count, "rabbitmq_qos_set");

    declare_queues(&channel).await?;

    // Retries are re-published to the queue they came from.
    let publisher = Publisher::new(config.cloudamqp_url.clone());

    let mut consumer = channel
        .basic_consume(
            queue,
            consumer_tag,
            BasicConsumeOptions::default(),
            FieldTable::default(),
        )
        .await
        .context("Failed to start consumer")?;

    info!(queue = queue, consumer_tag = consumer_tag, "rabbitmq_consumer_started");

    let channel = Arc::new(channel);

    let shutdown = shutdown_signal();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            _ = &mut shutdown => {
                info!(queue = queue, "consumer_stopping");
                break;
            }
            delivery = consumer.next() => {
                match delivery {
                    Some(Ok(delivery)) => {
                        let delivery_tag = delivery.delivery_tag;

                        let config = Arc::clone(&config);
                        let channel = Arc::clone(&channel);
                        let handler = Arc::clone(&handler);
                        let publisher = publisher.clone();

                        tokio::spawn(async move {
                            let envelope: JobEnvelope = match serde_json::from_slice(&delivery.data) {
                                Ok(envelope) => envelope,
                                Err(e) => {
                                    let preview = String::from_utf8_lossy(
                                        &delivery.data[..delivery.data.len().min(500)],
                                    );
                                    error!(
                                        queue = queue,
                                        error = %e,
                                        body_preview = %preview,
                                        "job_parse_failed"
                                    );
                                    nack(&channel, delivery_tag, false).await;
                                    return;
                                }
                            };

                            settle(&config, &channel, &publisher, handler.as_ref(), envelope, delivery_tag)
                                .await;
                        });
                    }
                    Some(Err(e)) => {
                        error!(error = %e, "rabbitmq_delivery_error");
                    }
                    None => {
                        warn!(queue = queue, "rabbitmq_consumer_closed");
                        break;
                    }
                }
            }
        }
    }

    publisher.close().await;

    info!(queue = queue, "consumer_shutdown_complete");
    Ok(())
}

async fn settle(
    config: &Config,
    channel: &Channel,
    publisher: &Publisher,
    handler: &dyn JobHandler,
    envelope: JobEnvelope,
    delivery_tag: u64,
) {
    let message_id = envelope.job.message_id();
    info!(
        message_id = %message_id,
        attempt = envelope.attempt,
        "job_received"
    );

    let result = handler.handle(envelope.job.clone()).await;

    match decide(&result, envelope.attempt, config.job_max_attempts, config.retry_delay_ms) {
        Disposition::Ack => {
            ack(channel, delivery_tag).await;
            info!(message_id = %message_id, attempt = envelope.attempt, "job_completed");
        }
        Disposition::Retry { delay } => {
            warn!(
                message_id = %message_id,
                attempt = envelope.attempt,
                max_attempts = config.job_max_attempts,
                delay_ms = delay.as_millis() as u64,
                error = %error_text(&result),
                "job_retry_scheduled"
            );
            tokio::time::sleep(delay).await;

            match publisher.publish(&envelope.next_attempt()).await {
                Ok(()) => ack(channel, delivery_tag).await,
                Err(e) => {
                    error!(message_id = %message_id, error = %e, "job_retry_publish_failed");
                    nack(channel, delivery_tag, true).await;
                }
            }
        }
        Disposition::DeadLetter => {
            error!(
                message_id = %message_id,
                attempts = envelope.attempt,
                replay_handle = %envelope.job.replay_handle(),
                error = %error_text(&result),
                "job_dead_lettered"
            );
            nack(channel, delivery_tag, false).await;
        }
        Disposition::Reject => {
            error!(
                message_id = %message_id,
                attempt = envelope.attempt,
                replay_handle = %envelope.job.replay_handle(),
                error = %error_text(&result),
                "job_rejected"
            );
            nack(channel, delivery_tag, false).await;
        }
    }
}

fn error_text(result: &Result<(), JobError>) -> String {
    result.as_ref().err().map(ToString::to_string).unwrap_or_default()
}

async fn ack(channel: &Channel, delivery_tag: u64) {
    if let Err(e) = channel
        .basic_ack(delivery_tag, BasicAckOptions::default())
        .await
    {
        error!(delivery_tag = delivery_tag, error = %e, "rabbitmq_ack_failed");
    }
}

async fn nack(channel: &Channel, delivery_tag: u64, requeue: bool) {
    if let Err(e) = channel
        .basic_nack(
            delivery_tag,
            BasicNackOptions {
                requeue,
                ..Default::default()
            },
        )
        .await
    {
        error!(delivery_tag = delivery_tag, error = %e, "rabbitmq_nack_failed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DELAYS: (u64, u64) = (1000, 60000);

    #[test]
    fn test_success_is_acked() {
        assert_eq!(decide(&Ok(()), 1, 5, DELAYS), Disposition::Ack);
        assert_eq!(decide(&Ok(()), 5, 5, DELAYS), Disposition::Ack);
    }

    #[test]
    fn test_transient_failure_is_retried_with_backoff() {
        let result = Err(JobError::transient("board API returned 503"));
        match decide(&result, 2, 5, DELAYS) {
            Disposition::Retry { delay } => {
                assert!(delay <= Duration::from_millis(2000));
                assert!(delay >= Duration::from_millis(1600));
            }
            other => panic!("expected retry, got {other:?}"),
        }
    }

    #[test]
    fn test_transient_failure_dead_letters_after_last_attempt() {
        let result = Err(JobError::transient("timeout"));
        assert_eq!(decide(&result, 5, 5, DELAYS), Disposition::DeadLetter);
        assert_eq!(decide(&result, 9, 5, DELAYS), Disposition::DeadLetter);
    }

    #[test]
    fn test_permanent_failure_is_never_retried() {
        let result = Err(JobError::permanent("commit 2 is missing its author name"));
        assert_eq!(decide(&result, 1, 5, DELAYS), Disposition::Reject);
    }

    #[test]
    fn test_single_attempt_budget() {
        let result = Err(JobError::transient("timeout"));
        assert_eq!(decide(&result, 1, 1, DELAYS), Disposition::DeadLetter);
    }
}
