//! Commit message node tree.
//!
//! A commit message is parsed into a flat sequence of [`MessageNode`]s.
//! Text nodes carry prose; link nodes name a card and may carry children,
//! the first of which names the list the card should be moved to.
//!
//! ```text
//! "Fixed it [CARD-1](Done)"
//!   → [Text("Fixed it "), Link { value: "CARD-1", children: [Text("Done")] }]
//! ```

pub mod markup;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use markup::BracketParser;

/// A node of a parsed commit message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MessageNode {
    /// Plain text
    Text { value: String },
    /// Card reference with optional children (first child = target list)
    Link {
        value: String,
        #[serde(default)]
        children: Vec<MessageNode>,
    },
}

impl MessageNode {
    pub fn text(value: impl Into<String>) -> Self {
        MessageNode::Text { value: value.into() }
    }

    pub fn link(value: impl Into<String>, children: Vec<MessageNode>) -> Self {
        MessageNode::Link {
            value: value.into(),
            children,
        }
    }

    /// The node's own value, regardless of its kind.
    pub fn value(&self) -> &str {
        match self {
            MessageNode::Text { value } | MessageNode::Link { value, .. } => value,
        }
    }
}

/// Markup error reported by a [`MessageParser`].
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{reason} at byte {offset}")]
pub struct ParseError {
    pub offset: usize,
    pub reason: String,
}

impl ParseError {
    pub fn new(offset: usize, reason: impl Into<String>) -> Self {
        Self {
            offset,
            reason: reason.into(),
        }
    }
}

/// Turns raw commit message text into a node sequence.
///
/// Implementations must be pure: the same input always yields the same nodes,
/// which is what makes re-processing a stored payload reproduce the same actions.
pub trait MessageParser: Send + Sync {
    fn parse(&self, message: &str) -> Result<Vec<MessageNode>, ParseError>;
}
