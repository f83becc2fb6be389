//! Conversation engine: the mode dispatcher for one conversation surface.
//!
//! Owns the input buffer, the turn list and the session identity, routes
//! each exchange to the right backend call, and persists the result.
//! At most one backend call is outstanding at a time.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use serde_json::json;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use mentor_core::config::MentorConfig;
use mentor_core::types::{
    ExplainMode, Language, Mode, SessionId, StructuredPayload, Turn,
};

use crate::backend::MentorBackend;
use crate::draft::{DraftBackend, DraftStore};
use crate::error::ChatError;
use crate::history::{HistoryAdapter, HistoryStore, UserProvider};
use crate::parser::ResponseParser;
use crate::session::{SessionIdentity, SessionSlot};
use crate::stream::{self, StreamOutcome};
use crate::title;
use crate::types::{
    wire_turns, ChatRequest, ConceptRequest, DispatchOutcome, DispatchState, IgnoreReason,
    ResetSnapshot, Routing, TranscriptRequest,
};
use crate::undo::ResetUndo;
use crate::voice::VoiceHandler;

/// Prompts offered on an empty conversation.
pub const STARTER_PROMPTS: [&str; 4] = [
    "Explain photosynthesis simply",
    "Help me prepare for my math exam",
    "What career options after 12th?",
    "How to manage exam stress?",
];

/// Guidance shown when the concept explainer has no topic.
pub const TOPIC_PROMPT: &str =
    "Please type a topic or question first, then click \"Explain in 2 Minutes\"";

fn apology(message: &str) -> String {
    format!("Sorry, I encountered an error: {}. Please try again.", message)
}

/// Collaborators the engine is wired to.
pub struct EngineDeps {
    pub backend: Arc<dyn MentorBackend>,
    pub history: Arc<dyn HistoryStore>,
    pub users: Arc<dyn UserProvider>,
    pub session_slot: Arc<dyn SessionSlot>,
    pub drafts: Arc<dyn DraftBackend>,
}

struct SurfaceState {
    input: String,
    turns: Vec<Turn>,
    dispatch: DispatchState,
    routing: Routing,
    language: Language,
    explain_mode: ExplainMode,
    identity: SessionIdentity,
    /// Bumped whenever the conversation is replaced. Results of calls
    /// started under an older epoch are dropped.
    epoch: u64,
}

impl SurfaceState {
    fn transition(&mut self, next: DispatchState) {
        if !self.dispatch.can_transition_to(&next) {
            warn!(from = ?self.dispatch, to = ?next, "Unexpected dispatch transition");
        }
        self.dispatch = next;
    }
}

/// Returns the dispatcher to idle however the exchange ends.
struct DispatchGuard<'a> {
    engine: &'a ConversationEngine,
}

impl Drop for DispatchGuard<'_> {
    fn drop(&mut self) {
        self.engine.lock().transition(DispatchState::Idle);
    }
}

/// The conversation pipeline for one surface.
pub struct ConversationEngine {
    backend: Arc<dyn MentorBackend>,
    history: HistoryAdapter,
    drafts: DraftStore,
    undo: ResetUndo<ResetSnapshot>,
    voice: VoiceHandler,
    parser: ResponseParser,
    max_input_chars: usize,
    title_max_chars: usize,
    state: Mutex<SurfaceState>,
    turns_tx: watch::Sender<Vec<Turn>>,
}

impl ConversationEngine {
    pub fn new(config: &MentorConfig, deps: EngineDeps) -> Self {
        let (turns_tx, _) = watch::channel(Vec::new());
        Self {
            backend: deps.backend,
            history: HistoryAdapter::new(deps.history, deps.users, config.chat.module),
            drafts: DraftStore::from_config(deps.drafts, &config.draft),
            undo: ResetUndo::new(Duration::from_millis(config.undo.window_ms)),
            voice: VoiceHandler::from_config(&config.voice),
            parser: ResponseParser::new(),
            max_input_chars: config.chat.max_input_chars,
            title_max_chars: config.chat.title_max_chars,
            state: Mutex::new(SurfaceState {
                input: String::new(),
                turns: Vec::new(),
                dispatch: DispatchState::Idle,
                routing: Routing::Standard,
                language: config.chat.default_language,
                explain_mode: config.chat.explain_mode,
                identity: SessionIdentity::new(deps.session_slot),
                epoch: 0,
            }),
            turns_tx,
        }
    }

    fn lock(&self) -> MutexGuard<'_, SurfaceState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn publish(&self, s: &SurfaceState) {
        self.turns_tx.send_replace(s.turns.clone());
    }

    // =========================================================================
    // Surface lifecycle
    // =========================================================================

    /// Seed the session id, resume its stored turns and restore the draft.
    pub fn mount(&self) -> SessionId {
        let mut guard = self.lock();
        let s = &mut *guard;
        let id = s.identity.get_or_create();

        if s.turns.is_empty() {
            if let Some(turns) = self.history.load(&id) {
                info!(session_id = %id, turns = turns.len(), "Resumed stored turns");
                s.turns = turns;
            }
        }
        if s.input.is_empty() {
            if let Some(draft) = self.drafts.restore() {
                debug!("Draft restored");
                s.input = draft;
            }
        }

        self.publish(s);
        id
    }

    /// Replace the input buffer and schedule a draft save.
    pub fn set_input(&self, text: impl Into<String>) {
        let text = text.into();
        self.drafts.write(&text);
        self.lock().input = text;
    }

    /// Put starter prompt `index` in the input buffer.
    pub fn use_starter(&self, index: usize) -> bool {
        match STARTER_PROMPTS.get(index) {
            Some(prompt) => {
                self.set_input(*prompt);
                true
            }
            None => false,
        }
    }

    /// Start a new conversation. The current turns are dropped.
    pub fn new_chat(&self) -> SessionId {
        let mut guard = self.lock();
        let id = self.start_fresh(&mut guard);
        info!(session_id = %id, "New chat");
        id
    }

    /// Clear the conversation, keeping a snapshot that `undo` can restore
    /// within the undo window.
    pub fn reset(&self) -> SessionId {
        let mut guard = self.lock();
        self.undo.arm(ResetSnapshot {
            input: guard.input.clone(),
            turns: guard.turns.clone(),
        });
        let id = self.start_fresh(&mut guard);
        info!(session_id = %id, "Chat reset");
        id
    }

    fn start_fresh(&self, s: &mut SurfaceState) -> SessionId {
        s.turns.clear();
        s.input.clear();
        self.drafts.clear();
        s.identity.clear();
        s.routing = Routing::Standard;
        s.epoch += 1;
        let id = s.identity.get_or_create();
        self.publish(s);
        id
    }

    /// Restore the pre-reset input and turns. Returns false when the undo
    /// window is closed.
    pub fn undo(&self) -> bool {
        let Some(snapshot) = self.undo.undo() else {
            return false;
        };
        let mut guard = self.lock();
        let s = &mut *guard;
        s.input = snapshot.input;
        s.turns = snapshot.turns;
        s.epoch += 1;
        self.drafts.write(&s.input);
        self.publish(s);
        true
    }

    pub fn dismiss_undo(&self) -> bool {
        self.undo.dismiss()
    }

    pub fn undo_pending(&self) -> bool {
        self.undo.is_pending()
    }

    /// Switch to a stored session and load its turns.
    pub fn open_session(&self, id: SessionId) -> Result<usize, ChatError> {
        let mut guard = self.lock();
        let s = &mut *guard;
        if s.dispatch.is_busy() {
            return Err(ChatError::Busy);
        }
        let turns = self
            .history
            .load(&id)
            .ok_or_else(|| ChatError::InvalidInput(format!("no saved session {}", id)))?;

        s.identity.adopt(id);
        s.turns = turns;
        s.input.clear();
        s.routing = Routing::Standard;
        s.epoch += 1;
        self.publish(s);
        Ok(s.turns.len())
    }

    // =========================================================================
    // Dispatch
    // =========================================================================

    /// Send the input buffer, or `override_input` (a quick reply) when given.
    ///
    /// Routes through deep dive while that toggle is on, else streams a
    /// normal reply. A send while a call is outstanding is ignored.
    pub async fn send(&self, override_input: Option<&str>) -> DispatchOutcome {
        let (epoch, mode, turns, text, language) = {
            let mut guard = self.lock();
            let s = &mut *guard;
            let text = override_input.map_or_else(|| s.input.clone(), str::to_string);
            if text.trim().is_empty() {
                return DispatchOutcome::Ignored(IgnoreReason::EmptyInput);
            }
            if s.dispatch.is_busy() {
                debug!("Send ignored; a request is in flight");
                return DispatchOutcome::Ignored(IgnoreReason::Busy);
            }
            if text.chars().count() > self.max_input_chars {
                s.turns.push(Turn::assistant(format!(
                    "Your message is too long. Please keep it under {} characters.",
                    self.max_input_chars
                )));
                self.publish(s);
                return DispatchOutcome::Prompted;
            }

            let mode = match s.routing {
                Routing::DeepDive => Mode::DeepDive,
                Routing::Standard => Mode::Normal,
            };
            s.turns.push(Turn::user(text.clone()));
            s.input.clear();
            s.transition(DispatchState::AwaitingResponse { mode });
            self.publish(s);
            (s.epoch, mode, s.turns.clone(), text, s.language)
        };

        let _guard = DispatchGuard { engine: self };
        info!(mode = %mode, turns = turns.len(), "Dispatch started");

        let outcome = match mode {
            Mode::DeepDive => self.run_deep_dive(epoch, turns, language).await,
            _ => self.run_normal(epoch, turns, &text, language).await,
        };
        if outcome == DispatchOutcome::Completed {
            self.drafts.clear();
        }

        info!(mode = %mode, outcome = ?outcome, "Dispatch finished");
        outcome
    }

    /// Timed concept explainer on the typed topic, or on the latest user
    /// turn when nothing is typed.
    pub async fn explain_concept(&self) -> DispatchOutcome {
        let (epoch, topic, explicit, language, sub_mode) = {
            let mut guard = self.lock();
            let s = &mut *guard;
            if s.dispatch.is_busy() {
                return DispatchOutcome::Ignored(IgnoreReason::Busy);
            }

            let typed = s.input.trim().to_string();
            let explicit = !typed.is_empty();
            let topic = if explicit {
                Some(typed)
            } else {
                s.turns
                    .iter()
                    .rev()
                    .find(|t| t.is_user())
                    .map(|t| t.content.clone())
            };
            let Some(topic) = topic else {
                s.turns.push(Turn::assistant(TOPIC_PROMPT));
                self.publish(s);
                return DispatchOutcome::Prompted;
            };

            // Only typed input becomes a user turn; a topic taken from
            // history is not repeated.
            if explicit {
                s.turns.push(Turn::user(s.input.clone()));
                s.input.clear();
            }
            s.transition(DispatchState::AwaitingResponse { mode: Mode::Concept });
            self.publish(s);
            (s.epoch, topic, explicit, s.language, s.explain_mode)
        };

        let _guard = DispatchGuard { engine: self };
        info!(mode = %Mode::Concept, sub_mode = %sub_mode, "Dispatch started");

        let request = ConceptRequest {
            topic: topic.clone(),
            language,
            personalization_name: self.personalization_name(),
            sub_mode,
        };
        let outcome = match self.backend.explain_concept(request).await {
            Ok(mut card) => {
                card.topic = Some(topic.clone());
                match self.append_result(epoch, Turn::structured(StructuredPayload::Concept(card))) {
                    Some(count) => {
                        let title = title::should_title(count).then(|| title::concept_title(&topic));
                        self.persist(
                            epoch,
                            title.as_deref(),
                            json!({ "mode": Mode::Concept, "topic": topic }),
                        );
                        if explicit {
                            self.drafts.clear();
                        }
                        DispatchOutcome::Completed
                    }
                    None => DispatchOutcome::Discarded,
                }
            }
            Err(e) => self.fail(epoch, e),
        };

        info!(mode = %Mode::Concept, outcome = ?outcome, "Dispatch finished");
        outcome
    }

    /// Weakness analysis over the visible history. Never sets a title.
    pub async fn analyze_weakness(&self) -> DispatchOutcome {
        let (epoch, turns, language) = {
            let mut guard = self.lock();
            let s = &mut *guard;
            if s.dispatch.is_busy() {
                return DispatchOutcome::Ignored(IgnoreReason::Busy);
            }
            if s.turns.is_empty() {
                return DispatchOutcome::Ignored(IgnoreReason::NoHistory);
            }
            s.transition(DispatchState::AwaitingResponse {
                mode: Mode::Weakness,
            });
            (s.epoch, s.turns.clone(), s.language)
        };

        let _guard = DispatchGuard { engine: self };
        info!(mode = %Mode::Weakness, turns = turns.len(), "Dispatch started");

        let request = TranscriptRequest::new(&turns, language);
        let outcome = match self.backend.analyze_weakness(request).await {
            Ok(report) => {
                match self.append_result(epoch, Turn::structured(StructuredPayload::Weakness(report))) {
                    Some(_) => {
                        self.persist(epoch, None, json!({ "mode": Mode::Weakness }));
                        DispatchOutcome::Completed
                    }
                    None => DispatchOutcome::Discarded,
                }
            }
            Err(e) => self.fail(epoch, e),
        };

        info!(mode = %Mode::Weakness, outcome = ?outcome, "Dispatch finished");
        outcome
    }

    /// Turn on deep-dive routing and run a deep dive over the history.
    ///
    /// Routing stays on until a new chat or reset.
    pub async fn enter_deep_dive(&self) -> DispatchOutcome {
        let (epoch, turns, language) = {
            let mut guard = self.lock();
            let s = &mut *guard;
            if s.dispatch.is_busy() {
                return DispatchOutcome::Ignored(IgnoreReason::Busy);
            }
            if s.turns.is_empty() {
                return DispatchOutcome::Ignored(IgnoreReason::NoHistory);
            }
            s.routing = Routing::DeepDive;
            s.transition(DispatchState::AwaitingResponse {
                mode: Mode::DeepDive,
            });
            (s.epoch, s.turns.clone(), s.language)
        };

        let _guard = DispatchGuard { engine: self };
        info!(mode = %Mode::DeepDive, turns = turns.len(), "Deep-dive routing on");

        let outcome = self.run_deep_dive(epoch, turns, language).await;
        info!(mode = %Mode::DeepDive, outcome = ?outcome, "Dispatch finished");
        outcome
    }

    /// Put a voice transcript in the input buffer and, for greetings and
    /// commands, send it after the configured delay.
    ///
    /// Returns the send outcome, or `None` when nothing was sent.
    pub async fn handle_voice_transcript(&self, transcript: &str) -> Option<DispatchOutcome> {
        let decision = self.voice.handle(transcript)?;
        self.set_input(decision.text.clone());
        let delay = decision.auto_send_after?;

        debug!(intent = ?decision.intent, delay_ms = delay.as_millis() as u64, "Voice auto-send");
        tokio::time::sleep(delay).await;
        Some(self.send(None).await)
    }

    // =========================================================================
    // Mode runners
    // =========================================================================

    async fn run_normal(
        &self,
        epoch: u64,
        turns: Vec<Turn>,
        user_text: &str,
        language: Language,
    ) -> DispatchOutcome {
        let request = ChatRequest {
            turns: wire_turns(&turns),
            language,
            personalization_name: self.personalization_name(),
        };
        let text_stream = match self.backend.stream_chat(request).await {
            Ok(text_stream) => text_stream,
            Err(e) => return self.fail(epoch, e),
        };

        let index = {
            let mut guard = self.lock();
            let s = &mut *guard;
            if s.epoch != epoch {
                return DispatchOutcome::Discarded;
            }
            s.turns.push(Turn::assistant(""));
            let index = s.turns.len() - 1;
            s.transition(DispatchState::Streaming { index });
            self.publish(s);
            index
        };

        let outcome = stream::reconcile(text_stream, index, |i, text| {
            self.replace_content(epoch, i, text)
        })
        .await;

        match outcome {
            StreamOutcome::Finished(text) => {
                self.finish_normal(epoch, index, &text, user_text, language)
                    .await
            }
            StreamOutcome::Interrupted { error, .. } => self.fail(epoch, error),
        }
    }

    /// Parse the finished reply and swap it in for the streaming turn.
    async fn finish_normal(
        &self,
        epoch: u64,
        index: usize,
        text: &str,
        user_text: &str,
        language: Language,
    ) -> DispatchOutcome {
        let (content, reply) = self.parser.parse(text).into_parts();

        let turn_count = {
            let mut guard = self.lock();
            let s = &mut *guard;
            if s.epoch != epoch {
                return DispatchOutcome::Discarded;
            }
            let Some(streaming) = s.turns.get(index) else {
                return DispatchOutcome::Discarded;
            };
            let finalized = Turn {
                role: streaming.role,
                content,
                created_at: streaming.created_at,
                structured: (!reply.is_empty()).then_some(StructuredPayload::Plain(reply)),
            };
            s.turns[index] = finalized;
            self.publish(s);
            s.turns.len()
        };

        let title = if title::should_title(turn_count) {
            Some(title::generate_title(self.backend.as_ref(), user_text, self.title_max_chars).await)
        } else {
            None
        };
        self.persist(
            epoch,
            title.as_deref(),
            json!({ "mode": Mode::Normal, "language": language }),
        );
        DispatchOutcome::Completed
    }

    /// Deep dive over `turns`. The title uses the count before the result
    /// is appended.
    async fn run_deep_dive(
        &self,
        epoch: u64,
        turns: Vec<Turn>,
        language: Language,
    ) -> DispatchOutcome {
        let request = TranscriptRequest::new(&turns, language);
        let deep_dive = match self.backend.deep_dive(request).await {
            Ok(deep_dive) => deep_dive,
            Err(e) => return self.fail(epoch, e),
        };

        let title = title::should_title(turns.len()).then(|| title::deep_dive_title(&deep_dive.overview));
        if self
            .append_result(epoch, Turn::structured(StructuredPayload::DeepDive(deep_dive)))
            .is_none()
        {
            return DispatchOutcome::Discarded;
        }
        self.persist(
            epoch,
            title.as_deref(),
            json!({ "mode": Mode::DeepDive, "language": language }),
        );
        DispatchOutcome::Completed
    }

    // =========================================================================
    // Helpers
    // =========================================================================

    /// Replace the streaming turn with a copy carrying `text`.
    fn replace_content(&self, epoch: u64, index: usize, text: &str) {
        let mut guard = self.lock();
        let s = &mut *guard;
        if s.epoch != epoch {
            return;
        }
        if let Some(current) = s.turns.get(index) {
            let updated = Turn {
                content: text.to_string(),
                ..current.clone()
            };
            s.turns[index] = updated;
            self.publish(s);
        }
    }

    /// Append a result turn. Returns the new turn count, or `None` when the
    /// conversation changed since the call started.
    fn append_result(&self, epoch: u64, turn: Turn) -> Option<usize> {
        let mut guard = self.lock();
        let s = &mut *guard;
        if s.epoch != epoch {
            debug!("Result dropped; conversation was replaced");
            return None;
        }
        s.turns.push(turn);
        self.publish(s);
        Some(s.turns.len())
    }

    /// Convert a failed call into an apology turn.
    fn fail(&self, epoch: u64, error: ChatError) -> DispatchOutcome {
        warn!(error = %error, "Dispatch failed");
        let message = error.user_message();
        let mut guard = self.lock();
        let s = &mut *guard;
        if s.epoch != epoch {
            return DispatchOutcome::Discarded;
        }
        s.turns.push(Turn::assistant(apology(&message)));
        self.publish(s);
        DispatchOutcome::Failed { message }
    }

    /// Save the current turn list under the current session id.
    fn persist(&self, epoch: u64, title: Option<&str>, metadata: serde_json::Value) {
        let (session_id, turns) = {
            let mut guard = self.lock();
            let s = &mut *guard;
            if s.epoch != epoch {
                return;
            }
            (s.identity.get_or_create(), s.turns.clone())
        };
        self.history.save(&session_id, &turns, title, metadata);
    }

    fn personalization_name(&self) -> Option<String> {
        self.history.current_user().and_then(|user| user.first_name())
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    pub fn turns(&self) -> Vec<Turn> {
        self.lock().turns.clone()
    }

    /// Watch the turn list. A new value is published on every change,
    /// including each streamed chunk.
    pub fn subscribe(&self) -> watch::Receiver<Vec<Turn>> {
        self.turns_tx.subscribe()
    }

    pub fn input(&self) -> String {
        self.lock().input.clone()
    }

    pub fn state(&self) -> DispatchState {
        self.lock().dispatch
    }

    pub fn is_deep_dive(&self) -> bool {
        self.lock().routing == Routing::DeepDive
    }

    pub fn session_id(&self) -> Option<SessionId> {
        self.lock().identity.current().cloned()
    }

    pub fn language(&self) -> Language {
        self.lock().language
    }

    pub fn set_language(&self, language: Language) {
        info!(language = %language, "Language selected");
        self.lock().language = language;
    }

    pub fn explain_mode(&self) -> ExplainMode {
        self.lock().explain_mode
    }

    pub fn set_explain_mode(&self, mode: ExplainMode) {
        self.lock().explain_mode = mode;
    }

    /// Suggested actions of the latest assistant turn.
    pub fn suggested_actions(&self) -> Vec<String> {
        self.lock()
            .turns
            .iter()
            .rev()
            .find(|t| !t.is_user())
            .and_then(|t| match &t.structured {
                Some(StructuredPayload::Plain(reply)) => reply.suggested_actions.clone(),
                _ => None,
            })
            .unwrap_or_default()
    }

    pub fn history(&self) -> &HistoryAdapter {
        &self.history
    }
}

impl std::fmt::Debug for ConversationEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConversationEngine")
            .field("module", &self.history.module())
            .field("draft_key", &self.drafts.key())
            .finish()
    }
}
