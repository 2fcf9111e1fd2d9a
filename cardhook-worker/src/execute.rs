//! Action execution against the board API.
//!
//! ## Flow
//!
//! ```text
//! Action → find record → (none) → post comment → write record → relocate (best effort)
//!                      → (OK)   → skip
//! ```
//!
//! The record is only written after the comment succeeded, so a failed post
//! leaves nothing behind and the next delivery tries again. If the record
//! write itself fails the comment stays posted; a later redelivery of the same
//! action can then post it a second time. Relocation failures never fail the
//! action.

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;
use tracing::{error, info, warn};

use crate::action::Action;
use crate::board::{BoardApi, BoardError};
use crate::queue::{Job, JobError, JobHandler};
use crate::store::{ActionRecord, ActionRecordStore, StoreError};

/// Failure of the primary effect of an action.
#[derive(Debug, Error)]
pub enum ExecuteError {
    #[error("failed to look up action record {key}: {source}")]
    RecordLookup { key: String, source: StoreError },

    #[error("failed to post comment on {target_ref}: {source}")]
    CommentPostFailed {
        target_ref: String,
        source: BoardError,
    },
}

impl ExecuteError {
    /// Both failures leave no record behind, so the action can run again.
    pub fn is_retryable(&self) -> bool {
        match self {
            ExecuteError::RecordLookup { source, .. } => source.is_retryable(),
            ExecuteError::CommentPostFailed { .. } => true,
        }
    }
}

/// What happened to an action that did not fail.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Execution {
    /// A record already existed; nothing was called.
    AlreadyApplied,
    /// The comment was posted.
    Applied { relocation: Relocation },
}

/// Result of the best-effort move that follows a comment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Relocation {
    NotRequested,
    Moved { list_id: String },
    NoMatchingList,
    Failed(String),
}

/// Applies actions exactly once per idempotence key.
pub struct ActionExecutor {
    records: Arc<dyn ActionRecordStore>,
    board: Arc<dyn BoardApi>,
}

impl ActionExecutor {
    pub fn new(records: Arc<dyn ActionRecordStore>, board: Arc<dyn BoardApi>) -> Self {
        Self { records, board }
    }

    pub async fn execute(&self, action: &Action) -> Result<Execution, ExecuteError> {
        let key = action.idempotence_key();

        let existing = self
            .records
            .find_record(&key)
            .await
            .map_err(|source| ExecuteError::RecordLookup {
                key: key.clone(),
                source,
            })?;

        if existing.is_some() {
            info!(
                idempotence_key = %key,
                target_ref = %action.target_ref,
                "action_already_applied"
            );
            return Ok(Execution::AlreadyApplied);
        }

        let card_id = action.card_id();

        self.board
            .comment_post(card_id, &action.comment_body)
            .await
            .map_err(|source| ExecuteError::CommentPostFailed {
                target_ref: action.target_ref.clone(),
                source,
            })?;

        info!(
            target_ref = %action.target_ref,
            card_id = %card_id,
            source_url = %action.source_url,
            comment_length = action.comment_body.len(),
            "card_comment_posted"
        );

        if let Err(e) = self.records.put_record(&ActionRecord::ok(key.as_str())).await {
            error!(
                idempotence_key = %key,
                error = %e,
                "action_record_write_failed"
            );
        }

        let relocation = match action.move_to_name.as_deref() {
            None => Relocation::NotRequested,
            Some(list_name) => self.relocate(card_id, list_name).await,
        };

        Ok(Execution::Applied { relocation })
    }

    /// Move the card to the list named `list_name`. Never fails the action.
    async fn relocate(&self, card_id: &str, list_name: &str) -> Relocation {
        match self.find_list(card_id, list_name).await {
            Ok(None) => {
                warn!(
                    card_id = %card_id,
                    list_name = %list_name,
                    "card_move_list_not_found"
                );
                Relocation::NoMatchingList
            }
            Ok(Some(list_id)) => match self.board.card_move(card_id, &list_id).await {
                Ok(()) => {
                    info!(
                        card_id = %card_id,
                        list_id = %list_id,
                        list_name = %list_name,
                        "card_moved"
                    );
                    Relocation::Moved { list_id }
                }
                Err(e) => {
                    warn!(card_id = %card_id, list_id = %list_id, error = %e, "card_move_failed");
                    Relocation::Failed(e.to_string())
                }
            },
            Err(e) => {
                warn!(card_id = %card_id, list_name = %list_name, error = %e, "card_move_failed");
                Relocation::Failed(e.to_string())
            }
        }
    }

    /// Id of the list on the card's board whose name equals `list_name`.
    async fn find_list(&self, card_id: &str, list_name: &str) -> Result<Option<String>, BoardError> {
        let card = self.board.card_get(card_id).await?;
        let board = self.board.board_get(&card.id_board).await?;
        let lists = self.board.board_lists_get(&board.id).await?;

        Ok(lists
            .into_iter()
            .find(|list| list.name == list_name)
            .map(|list| list.id))
    }
}

#[async_trait]
impl JobHandler for ActionExecutor {
    async fn handle(&self, job: Job) -> Result<(), JobError> {
        let action = match job {
            Job::ApplyAction(action) => action,
            other => {
                return Err(JobError::permanent(format!(
                    "action executor cannot handle {}",
                    other.message_id()
                )))
            }
        };

        match self.execute(&action).await {
            Ok(_) => Ok(()),
            Err(e) => {
                error!(
                    idempotence_key = %action.idempotence_key(),
                    retryable = e.is_retryable(),
                    error = %e,
                    "action_failed"
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
