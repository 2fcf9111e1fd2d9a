//! Queue message types for the two-queue architecture.
//!
//! This module defines the message formats for:
//! - `push_batches` queue: handles of stored push payloads from the web server
//! - `card_actions` queue: single card actions derived by the processor

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::action::Action;
use crate::store::PayloadId;

/// Queue name for stored push payloads awaiting processing.
pub const BATCH_QUEUE: &str = "push_batches";

/// Queue name for card actions awaiting execution.
pub const ACTION_QUEUE: &str = "card_actions";

/// A unit of deferred work.
///
/// Jobs only hold plain values so they can be persisted by the broker and
/// redelivered to any process.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Job {
    /// Decode, validate and interpret a stored push payload
    ProcessBatch { payload_id: PayloadId },
    /// Apply one action to the board
    ApplyAction(Action),
}

impl Job {
    /// Queue the job is routed to.
    pub fn queue(&self) -> &'static str {
        match self {
            Job::ProcessBatch { .. } => BATCH_QUEUE,
            Job::ApplyAction(_) => ACTION_QUEUE,
        }
    }

    /// Identifier used as the broker message id and in logs.
    ///
    /// AMQP caps message ids at 255 bytes, so action ids carry the SHA-256 of
    /// the idempotence key rather than the key itself.
    pub fn message_id(&self) -> String {
        match self {
            Job::ProcessBatch { payload_id } => format!("batch-{}", payload_id.0),
            Job::ApplyAction(action) => format!(
                "action-{}",
                hex::encode(Sha256::digest(action.idempotence_key().as_bytes()))
            ),
        }
    }

    /// What an operator needs to replay the job by hand.
    pub fn replay_handle(&self) -> String {
        match self {
            Job::ProcessBatch { payload_id } => payload_id.to_string(),
            Job::ApplyAction(action) => action.idempotence_key(),
        }
    }
}

/// Transport wrapper carrying the delivery attempt number.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobEnvelope {
    pub job: Job,
    /// Attempt number (1-indexed)
    #[serde(default = "first_attempt")]
    pub attempt: u32,
    pub enqueued_at: DateTime<Utc>,
}

fn first_attempt() -> u32 {
    1
}

impl JobEnvelope {
    pub fn new(job: Job) -> Self {
        Self {
            job,
            attempt: 1,
            enqueued_at: Utc::now(),
        }
    }

    /// The same job, scheduled as the next attempt.
    pub fn next_attempt(&self) -> Self {
        Self {
            job: self.job.clone(),
            attempt: self.attempt + 1,
            enqueued_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn action() -> Action {
        Action {
            target_ref: "CARD-1".to_string(),
            comment_body: "Ann\nFixed it \nhttp://x/1".to_string(),
            source_url: "http://x/1".to_string(),
            move_to_name: Some("Done".to_string()),
        }
    }

    #[test]
    fn test_batch_job_wire_format() {
        let job = Job::ProcessBatch {
            payload_id: PayloadId(7),
        };
        let json = serde_json::to_value(&job).unwrap();
        assert_eq!(json, serde_json::json!({"kind": "process_batch", "payload_id": 7}));
        assert_eq!(job.queue(), BATCH_QUEUE);
        assert_eq!(job.message_id(), "batch-7");
        assert_eq!(job.replay_handle(), "push_payloads/7");
    }

    #[test]
    fn test_action_job_wire_format() {
        let job = Job::ApplyAction(action());
        let json = serde_json::to_value(&job).unwrap();
        assert_eq!(json["kind"], "apply_action");
        assert_eq!(json["target_ref"], "CARD-1");
        assert_eq!(json["move_to_name"], "Done");
        assert_eq!(job.queue(), ACTION_QUEUE);

        let parsed: Job = serde_json::from_value(json).unwrap();
        assert_eq!(parsed, job);
    }

    #[test]
    fn test_action_message_id_is_bounded_and_stable() {
        let mut long = action();
        long.target_ref = format!("https://trello.com/c/abc123/{}", "very-long-card-slug-".repeat(20));
        long.source_url = format!("https://example.com/org/repo/commit/{}", "f".repeat(200));
        assert!(long.idempotence_key().len() > 255);

        let id = Job::ApplyAction(long.clone()).message_id();
        assert_eq!(id.len(), "action-".len() + 64);
        assert!(id.starts_with("action-"));
        assert_eq!(id, Job::ApplyAction(long.clone()).message_id());

        let mut other = long;
        other.source_url.push('0');
        assert_ne!(id, Job::ApplyAction(other).message_id());
    }

    #[test]
    fn test_envelope_without_attempt_defaults_to_first() {
        let json = r#"{
            "job": {"kind": "process_batch", "payload_id": 3},
            "enqueued_at": "2024-01-01T00:00:00Z"
        }"#;
        let envelope: JobEnvelope = serde_json::from_str(json).unwrap();
        assert_eq!(envelope.attempt, 1);
        assert_eq!(envelope.next_attempt().attempt, 2);
        assert_eq!(envelope.next_attempt().job, envelope.job);
    }

    #[test]
    fn test_unknown_kind_is_rejected() {
        let json = r#"{"kind": "delete_everything"}"#;
        assert!(serde_json::from_str::<Job>(json).is_err());
    }
}
