//! Cardhook - push webhook to collaboration board bridge.
//!
//! Commit messages that reference cards (`[CARD-1](Done)`) become comments on
//! those cards, and optionally move them to another list.
//!
//! This library provides shared modules for the three Cardhook binaries:
//! - `cardhook-web`: Thin web server receiving push webhooks
//! - `cardhook-processor`: Validates stored pushes and derives card actions
//! - `cardhook-worker`: Applies card actions against the board API
//!
//! ## Architecture
//!
//! ```text
//! Webhook → Web Server → push_batches → Processor → card_actions → Worker → Board API
//!               ↓                           ↑                         ↕
//!          push_payloads ───────────────────┘                  action_records
//! ```

pub mod action;
pub mod board;
pub mod config;
pub mod digest;
pub mod execute;
pub mod message;
pub mod process;
pub mod queue;
pub mod store;
pub mod util;
pub mod web;

// Re-export commonly used types
pub use action::Action;
pub use config::Config;
pub use execute::{ActionExecutor, ExecuteError, Execution, Relocation};
pub use process::{BatchProcessor, BatchReport, ProcessError};
pub use queue::{Dispatcher, Job, JobEnvelope, Publisher, ACTION_QUEUE, BATCH_QUEUE};
pub use web::AppState;
