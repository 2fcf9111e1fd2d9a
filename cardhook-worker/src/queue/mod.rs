//! Queue module for RabbitMQ operations.
//!
//! This module provides:
//! - Job types for the two-queue architecture
//! - The [`Dispatcher`] seam and its RabbitMQ and in-memory implementations
//! - The consumer loop driving a [`JobHandler`], with bounded retries
//!
//! ## Architecture
//!
//! ```text
//! Web Server → push_batches queue → Processor → card_actions queue → Worker
//! ```
//!
//! Delivery is at-least-once: every handler must tolerate seeing the same job
//! more than once.

pub mod consumer;
pub mod memory;
pub mod publisher;
pub mod types;

use std::fmt;

use async_trait::async_trait;
use thiserror::Error;

pub use consumer::{decide, run_consumer, Disposition};
pub use memory::MemoryDispatcher;
pub use publisher::Publisher;
pub use types::{Job, JobEnvelope, ACTION_QUEUE, BATCH_QUEUE};

/// Hands jobs to the asynchronous runtime.
#[async_trait]
pub trait Dispatcher: Send + Sync {
    /// Enqueue `job` for a first attempt. Returns once the job is accepted.
    async fn dispatch(&self, job: &Job) -> anyhow::Result<()>;
}

/// Failure of a job handler, classified for the retry policy.
#[derive(Debug, Error)]
#[error("{message}")]
pub struct JobError {
    /// Whether running the job again later can succeed
    pub retryable: bool,
    pub message: String,
}

impl JobError {
    pub fn transient(error: impl fmt::Display) -> Self {
        Self {
            retryable: true,
            message: error.to_string(),
        }
    }

    pub fn permanent(error: impl fmt::Display) -> Self {
        Self {
            retryable: false,
            message: error.to_string(),
        }
    }
}

/// Executes jobs taken off a queue.
#[async_trait]
pub trait JobHandler: Send + Sync {
    async fn handle(&self, job: Job) -> Result<(), JobError>;
}
