//! Wire requests and dispatcher state.

use serde::{Deserialize, Serialize};

use mentor_core::types::{ExplainMode, Language, Mode, Role, Turn};

// =============================================================================
// Wire requests
// =============================================================================

/// Role and content of one turn, as sent to the backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WireTurn {
    pub role: Role,
    pub content: String,
}

impl From<&Turn> for WireTurn {
    fn from(turn: &Turn) -> Self {
        Self {
            role: turn.role,
            content: turn.content.clone(),
        }
    }
}

pub fn wire_turns(turns: &[Turn]) -> Vec<WireTurn> {
    turns.iter().map(WireTurn::from).collect()
}

/// Streaming free-form chat.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatRequest {
    #[serde(rename = "messages")]
    pub turns: Vec<WireTurn>,
    pub language: Language,
    #[serde(
        rename = "firstName",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub personalization_name: Option<String>,
}

/// Timed concept explainer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConceptRequest {
    pub topic: String,
    pub language: Language,
    #[serde(
        rename = "firstName",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub personalization_name: Option<String>,
    #[serde(rename = "mode")]
    pub sub_mode: ExplainMode,
}

/// Full visible history plus language. Used by weakness analysis and deep dive.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TranscriptRequest {
    #[serde(rename = "messages")]
    pub turns: Vec<WireTurn>,
    pub language: Language,
}

impl TranscriptRequest {
    pub fn new(turns: &[Turn], language: Language) -> Self {
        Self {
            turns: wire_turns(turns),
            language,
        }
    }
}

// =============================================================================
// Dispatcher state
// =============================================================================

/// Where the dispatcher is in an exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DispatchState {
    #[default]
    Idle,
    /// One backend call is outstanding.
    AwaitingResponse { mode: Mode },
    /// Normal-mode reply streaming into the turn at `index`.
    Streaming { index: usize },
}

impl DispatchState {
    pub fn is_busy(&self) -> bool {
        !matches!(self, DispatchState::Idle)
    }

    /// Check whether a transition from this state to `next` is valid.
    pub fn can_transition_to(&self, next: &DispatchState) -> bool {
        matches!(
            (self, next),
            (DispatchState::Idle, DispatchState::AwaitingResponse { .. })
                | (
                    DispatchState::AwaitingResponse { mode: Mode::Normal },
                    DispatchState::Streaming { .. }
                )
                | (DispatchState::AwaitingResponse { .. }, DispatchState::Idle)
                | (DispatchState::Streaming { .. }, DispatchState::Idle)
        )
    }
}

/// Sticky routing for plain sends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Routing {
    #[default]
    Standard,
    /// Every send goes through the deep-dive call until a new or reset session.
    DeepDive,
}

/// Why a dispatcher entry point did nothing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IgnoreReason {
    Busy,
    EmptyInput,
    NoHistory,
}

/// Result of one dispatcher entry point.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// The backend answered and the result turn was appended.
    Completed,
    /// A guidance turn was appended without calling the backend.
    Prompted,
    /// The call failed and an apology turn was appended.
    Failed { message: String },
    /// The conversation was cleared while the call was in flight; the
    /// result was dropped.
    Discarded,
    Ignored(IgnoreReason),
}

/// Input and turns captured right before a reset.
#[derive(Debug, Clone, PartialEq)]
pub struct ResetSnapshot {
    pub input: String,
    pub turns: Vec<Turn>,
}
