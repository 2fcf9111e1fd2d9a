//! Collaboration board API.
//!
//! The executor only needs five calls: post a comment, read a card, read its
//! board, list the board's lists, and move a card to a list.

pub mod memory;
pub mod trello;

use async_trait::async_trait;
use serde::Deserialize;
use thiserror::Error;

pub use memory::MemoryBoard;
pub use trello::TrelloClient;

/// A card as returned by the board API.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Card {
    pub id: String,
    #[serde(rename = "idBoard")]
    pub id_board: String,
    #[serde(rename = "idList", default)]
    pub id_list: String,
    #[serde(default)]
    pub name: String,
}

/// A board as returned by the board API.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Board {
    pub id: String,
    #[serde(default)]
    pub name: String,
}

/// A list (column) on a board.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct BoardList {
    pub id: String,
    pub name: String,
}

/// Board API failure. Timeouts surface as [`BoardError::Http`].
#[derive(Debug, Error)]
pub enum BoardError {
    #[error("board API request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("board API returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("invalid board API URL: {0}")]
    Url(#[from] url::ParseError),

    #[error("{0} not found")]
    NotFound(String),

    #[error("board API unavailable: {0}")]
    Unavailable(String),
}

#[async_trait]
pub trait BoardApi: Send + Sync {
    async fn comment_post(&self, card_id: &str, text: &str) -> Result<(), BoardError>;

    async fn card_get(&self, card_id: &str) -> Result<Card, BoardError>;

    async fn board_get(&self, board_id: &str) -> Result<Board, BoardError>;

    async fn board_lists_get(&self, board_id: &str) -> Result<Vec<BoardList>, BoardError>;

    async fn card_move(&self, card_id: &str, list_id: &str) -> Result<(), BoardError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_card_deserialization_ignores_extra_fields() {
        let json = r#"{
            "id": "5f1",
            "idBoard": "b1",
            "idList": "l1",
            "name": "Fix login",
            "closed": false,
            "labels": []
        }"#;

        let card: Card = serde_json::from_str(json).unwrap();
        assert_eq!(card.id, "5f1");
        assert_eq!(card.id_board, "b1");
        assert_eq!(card.id_list, "l1");
    }

    #[test]
    fn test_lists_deserialization() {
        let json = r#"[{"id":"l1","name":"To Do","pos":1},{"id":"l2","name":"Done","pos":2}]"#;
        let lists: Vec<BoardList> = serde_json::from_str(json).unwrap();
        assert_eq!(lists.len(), 2);
        assert_eq!(lists[1].name, "Done");
    }
}
