//! Card actions derived from commits.

use serde::{Deserialize, Serialize};

/// One card update requested by a commit: post `comment_body` on the card and,
/// when `move_to_name` is set, move the card to the list of that name.
///
/// Actions are plain values so they can travel through the job queue and be
/// redelivered any number of times.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Action {
    /// Card reference exactly as written in the commit message
    pub target_ref: String,
    /// Comment text, commit URL included
    pub comment_body: String,
    /// URL of the commit that requested the action
    pub source_url: String,
    /// Name of the list to move the card to
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub move_to_name: Option<String>,
}

impl Action {
    /// Key guarding the action against being applied twice.
    pub fn idempotence_key(&self) -> String {
        format!("{}{}", self.target_ref, self.source_url)
    }

    /// Card id to send to the board API.
    ///
    /// Card URLs such as `https://trello.com/c/abc123` resolve to their last
    /// path segment; bare references are used as they are.
    pub fn card_id(&self) -> &str {
        let trimmed = self.target_ref.trim_end_matches('/');
        match trimmed.rsplit_once('/') {
            Some((_, id)) if !id.is_empty() => id,
            _ => trimmed,
        }
    }
}
