//! Mentor Storage crate - SQLite persistence for history and local state.
//!
//! Provides a WAL-mode SQLite database with migrations, the history
//! repository (one record per user and session) and a small key/value
//! store for drafts and the current-session slot.

pub mod db;
pub mod history;
pub mod local_state;
pub mod migrations;

pub use db::Database;
pub use history::HistoryRepository;
pub use local_state::LocalStateRepository;
