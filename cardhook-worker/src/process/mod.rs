//! Push batch processing.
//!
//! This module turns a stored push payload into card actions on the
//! `card_actions` queue.
//!
//! ## Processing Flow
//!
//! ```text
//! PayloadId → load → decode → validate every commit → interpret each commit → dispatch actions
//! ```
//!
//! Validation is all-or-nothing: one commit without a url, author name or
//! message rejects the whole batch before any action exists. Interpretation
//! stops at the first failing commit; actions of earlier commits are already
//! dispatched and stay valid, and the batch is replayed by hand from its
//! payload handle.

pub mod interpreter;
pub mod push;

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;
use tracing::{error, info};

use crate::message::{MessageParser, ParseError};
use crate::queue::{Dispatcher, Job, JobError, JobHandler};
use crate::store::{PayloadId, PayloadStore, StoreError};

pub use interpreter::{build_comment, interpret_commit};
pub use push::{Commit, Person, PushPayload};

/// Batch processing failure.
#[derive(Debug, Error)]
pub enum ProcessError {
    #[error("failed to load payload {payload_id}: {source}")]
    PayloadLoad {
        payload_id: PayloadId,
        source: StoreError,
    },

    #[error("payload {payload_id} is not a valid push batch: {source}")]
    BatchMalformed {
        payload_id: PayloadId,
        source: serde_json::Error,
    },

    #[error("payload {payload_id}: commit #{index} ({commit_id}) is missing {missing:?}")]
    CommitFieldsMissing {
        payload_id: PayloadId,
        index: usize,
        commit_id: String,
        missing: Vec<&'static str>,
    },

    #[error("payload {payload_id}: commit {commit_id} has malformed markup: {source}")]
    Interpret {
        payload_id: PayloadId,
        commit_id: String,
        source: ParseError,
    },

    #[error("payload {payload_id}: failed to dispatch action for commit {commit_id}: {source}")]
    Dispatch {
        payload_id: PayloadId,
        commit_id: String,
        source: anyhow::Error,
    },
}

impl ProcessError {
    /// Whether running the batch again later can succeed.
    ///
    /// Re-running after a partial dispatch is safe: actions that were already
    /// applied are skipped by the executor.
    pub fn is_retryable(&self) -> bool {
        match self {
            ProcessError::PayloadLoad { source, .. } => source.is_retryable(),
            ProcessError::Dispatch { .. } => true,
            ProcessError::BatchMalformed { .. }
            | ProcessError::CommitFieldsMissing { .. }
            | ProcessError::Interpret { .. } => false,
        }
    }
}

/// Outcome of a processed batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchReport {
    pub commits: usize,
    pub actions_dispatched: usize,
}

/// Validates and interprets stored push payloads.
pub struct BatchProcessor {
    payloads: Arc<dyn PayloadStore>,
    parser: Arc<dyn MessageParser>,
    dispatcher: Arc<dyn Dispatcher>,
    max_comment_size: usize,
}

impl BatchProcessor {
    pub fn new(
        payloads: Arc<dyn PayloadStore>,
        parser: Arc<dyn MessageParser>,
        dispatcher: Arc<dyn Dispatcher>,
        max_comment_size: usize,
    ) -> Self {
        Self {
            payloads,
            parser,
            dispatcher,
            max_comment_size,
        }
    }

    /// Process the payload stored under `payload_id`.
    pub async fn process(&self, payload_id: PayloadId) -> Result<BatchReport, ProcessError> {
        let raw = self
            .payloads
            .get_payload(payload_id)
            .await
            .map_err(|source| ProcessError::PayloadLoad { payload_id, source })?;

        info!(
            payload_id = %payload_id,
            body_length = raw.bytes.len(),
            created_at = %raw.created_at,
            "batch_process_start"
        );

        let payload: PushPayload = serde_json::from_slice(&raw.bytes)
            .map_err(|source| ProcessError::BatchMalformed { payload_id, source })?;

        validate_commits(payload_id, &payload.commits)?;

        let mut actions_dispatched = 0;
        for commit in &payload.commits {
            let actions = interpret_commit(self.parser.as_ref(), commit, self.max_comment_size)
                .map_err(|source| ProcessError::Interpret {
                    payload_id,
                    commit_id: commit.id.clone(),
                    source,
                })?;

            for action in actions {
                let job = Job::ApplyAction(action);
                self.dispatcher
                    .dispatch(&job)
                    .await
                    .map_err(|source| ProcessError::Dispatch {
                        payload_id,
                        commit_id: commit.id.clone(),
                        source,
                    })?;
                actions_dispatched += 1;
            }

            info!(
                payload_id = %payload_id,
                commit_id = %commit.id,
                "commit_interpreted"
            );
        }

        let report = BatchReport {
            commits: payload.commits.len(),
            actions_dispatched,
        };

        info!(
            payload_id = %payload_id,
            git_ref = %payload.git_ref,
            commits = report.commits,
            actions_dispatched = report.actions_dispatched,
            "batch_process_complete"
        );

        Ok(report)
    }
}

/// Reject the batch if any commit lacks a url, author name or message.
fn validate_commits(payload_id: PayloadId, commits: &[Commit]) -> Result<(), ProcessError> {
    for (index, commit) in commits.iter().enumerate() {
        let missing = commit.missing_fields();
        if !missing.is_empty() {
            return Err(ProcessError::CommitFieldsMissing {
                payload_id,
                index,
                commit_id: commit.id.clone(),
                missing,
            });
        }
    }
    Ok(())
}

#[async_trait]
impl JobHandler for BatchProcessor {
    async fn handle(&self, job: Job) -> Result<(), JobError> {
        let payload_id = match job {
            Job::ProcessBatch { payload_id } => payload_id,
            other => {
                return Err(JobError::permanent(format!(
                    "batch processor cannot handle {}",
                    other.message_id()
                )))
            }
        };

        match self.process(payload_id).await {
            Ok(_) => Ok(()),
            Err(e) => {
                error!(
                    payload_id = %payload_id,
                    retryable = e.is_retryable(),
                    error = %e,
                    "batch_process_failed"
                );
                if e.is_retryable() {
                    Err(JobError::transient(e))
                } else {
                    Err(JobError::permanent(e))
                }
            }
        }
    }
}
