//! In-memory board for tests.

use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use tokio::sync::Mutex;

use super::{Board, BoardApi, BoardError, BoardList, Card};

/// Fake board that records comments and moves.
///
/// Any operation can be made to fail by name (`"comment_post"`, `"card_get"`,
/// `"board_get"`, `"board_lists_get"`, `"card_move"`).
#[derive(Default)]
pub struct MemoryBoard {
    state: Mutex<BoardState>,
}

#[derive(Default)]
struct BoardState {
    cards: HashMap<String, Card>,
    boards: HashMap<String, Board>,
    lists: HashMap<String, Vec<BoardList>>,
    comments: Vec<(String, String)>,
    moves: Vec<(String, String)>,
    failing: HashSet<&'static str>,
    calls: HashMap<&'static str, usize>,
}

impl BoardState {
    fn enter(&mut self, operation: &'static str) -> Result<(), BoardError> {
        *self.calls.entry(operation).or_default() += 1;
        if self.failing.contains(operation) {
            return Err(BoardError::Unavailable(format!("{operation} failure injected")));
        }
        Ok(())
    }
}

impl MemoryBoard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a board with `(list_id, list_name)` lists.
    pub async fn add_board(&self, board_id: &str, lists: &[(&str, &str)]) {
        let mut state = self.state.lock().await;
        state.boards.insert(
            board_id.to_string(),
            Board {
                id: board_id.to_string(),
                name: format!("board {board_id}"),
            },
        );
        state.lists.insert(
            board_id.to_string(),
            lists
                .iter()
                .map(|(id, name)| BoardList {
                    id: id.to_string(),
                    name: name.to_string(),
                })
                .collect(),
        );
    }

    pub async fn add_card(&self, card_id: &str, board_id: &str, list_id: &str) {
        self.state.lock().await.cards.insert(
            card_id.to_string(),
            Card {
                id: card_id.to_string(),
                id_board: board_id.to_string(),
                id_list: list_id.to_string(),
                name: format!("card {card_id}"),
            },
        );
    }

    pub async fn fail(&self, operation: &'static str) {
        self.state.lock().await.failing.insert(operation);
    }

    pub async fn recover(&self, operation: &'static str) {
        self.state.lock().await.failing.remove(operation);
    }

    /// Posted `(card_id, text)` pairs, oldest first.
    pub async fn comments(&self) -> Vec<(String, String)> {
        self.state.lock().await.comments.clone()
    }

    /// Performed `(card_id, list_id)` moves, oldest first.
    pub async fn moves(&self) -> Vec<(String, String)> {
        self.state.lock().await.moves.clone()
    }

    /// Number of times `operation` was called, failed calls included.
    pub async fn calls(&self, operation: &str) -> usize {
        self.state.lock().await.calls.get(operation).copied().unwrap_or(0)
    }

    pub async fn card(&self, card_id: &str) -> Option<Card> {
        self.state.lock().await.cards.get(card_id).cloned()
    }
}

#[async_trait]
impl BoardApi for MemoryBoard {
    async fn comment_post(&self, card_id: &str, text: &str) -> Result<(), BoardError> {
        let mut state = self.state.lock().await;
        state.enter("comment_post")?;
        state.comments.push((card_id.to_string(), text.to_string()));
        Ok(())
    }

    async fn card_get(&self, card_id: &str) -> Result<Card, BoardError> {
        let mut state = self.state.lock().await;
        state.enter("card_get")?;
        state
            .cards
            .get(card_id)
            .cloned()
            .ok_or_else(|| BoardError::NotFound(format!("card {card_id}")))
    }

    async fn board_get(&self, board_id: &str) -> Result<Board, BoardError> {
        let mut state = self.state.lock().await;
        state.enter("board_get")?;
        state
            .boards
            .get(board_id)
            .cloned()
            .ok_or_else(|| BoardError::NotFound(format!("board {board_id}")))
    }

    async fn board_lists_get(&self, board_id: &str) -> Result<Vec<BoardList>, BoardError> {
        let mut state = self.state.lock().await;
        state.enter("board_lists_get")?;
        state
            .lists
            .get(board_id)
            .cloned()
            .ok_or_else(|| BoardError::NotFound(format!("board {board_id}")))
    }

    async fn card_move(&self, card_id: &str, list_id: &str) -> Result<(), BoardError> {
        let mut state = self.state.lock().await;
        state.enter("card_move")?;
        let card = state
            .cards
            .get_mut(card_id)
            .ok_or_else(|| BoardError::NotFound(format!("card {card_id}")))?;
        card.id_list = list_id.to_string();
        state.moves.push((card_id.to_string(), list_id.to_string()));
        Ok(())
    }
}
