//! Conversation pipeline for the study mentor.
//!
//! Routes each exchange to the right backend call, streams free-text
//! replies into the turn list, parses them, and persists sessions.

pub mod backend;
pub mod draft;
pub mod error;
pub mod history;
pub mod intent;
pub mod orchestrator;
pub mod parser;
pub mod session;
pub mod stream;
pub mod title;
pub mod types;
pub mod undo;
pub mod voice;

pub use backend::{HttpBackend, MentorBackend, TextStream};
pub use draft::{DraftBackend, DraftStore, MemoryDrafts};
pub use error::ChatError;
pub use history::{DeleteSummary, HistoryAdapter, HistoryStore, StaticUser, UserProvider};
pub use intent::{classify, Intent};
pub use orchestrator::{ConversationEngine, EngineDeps, STARTER_PROMPTS};
pub use parser::{ParsedReply, ResponseParser};
pub use session::{MemorySessionSlot, SessionIdentity, SessionSlot};
pub use types::{DispatchOutcome, DispatchState, IgnoreReason, Routing};
pub use undo::ResetUndo;
pub use voice::{VoiceDecision, VoiceHandler};
