use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::MentorError;

// =============================================================================
// Enums
// =============================================================================

/// Author of a conversation turn.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::User => write!(f, "user"),
            Role::Assistant => write!(f, "assistant"),
        }
    }
}

/// Which structured renderer applies to a turn.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TurnKind {
    #[default]
    #[serde(rename = "normal")]
    Plain,
    #[serde(rename = "concept")]
    Concept,
    #[serde(rename = "weakness")]
    Weakness,
    #[serde(rename = "deep-dive")]
    DeepDive,
}

/// Confidence label attached to a reply.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Confidence {
    High,
    Medium,
    Low,
}

impl Confidence {
    /// Parse a confidence keyword, ignoring case and surrounding whitespace.
    pub fn from_keyword(word: &str) -> Option<Self> {
        match word.trim().to_lowercase().as_str() {
            "high" => Some(Confidence::High),
            "medium" | "med" | "moderate" => Some(Confidence::Medium),
            "low" => Some(Confidence::Low),
            _ => None,
        }
    }

    /// Map the badge symbols used by the mentor prompt to a level.
    pub fn from_symbol(symbol: &str) -> Option<Self> {
        match symbol.trim().trim_end_matches('\u{fe0f}') {
            "\u{2705}" | "\u{1f7e2}" => Some(Confidence::High),
            "\u{26a0}" | "\u{1f7e1}" => Some(Confidence::Medium),
            "\u{2757}" | "\u{1f534}" => Some(Confidence::Low),
            _ => None,
        }
    }
}

impl fmt::Display for Confidence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Confidence::High => write!(f, "high"),
            Confidence::Medium => write!(f, "medium"),
            Confidence::Low => write!(f, "low"),
        }
    }
}

/// Reply language selected by the user.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize)]
pub enum Language {
    #[default]
    English,
    Hinglish,
    Gujarati,
}

impl Language {
    pub const ALL: [Language; 3] = [Language::English, Language::Hinglish, Language::Gujarati];

    pub fn as_str(&self) -> &'static str {
        match self {
            Language::English => "English",
            Language::Hinglish => "Hinglish",
            Language::Gujarati => "Gujarati",
        }
    }

    /// Lenient parse used for wire and config values: unknown names map to Hinglish.
    pub fn parse_lenient(value: &str) -> Self {
        value.parse().unwrap_or(Language::Hinglish)
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for Language {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        Ok(Language::parse_lenient(&raw))
    }
}

impl FromStr for Language {
    type Err = MentorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "english" | "en" => Ok(Language::English),
            "hinglish" | "hi" => Ok(Language::Hinglish),
            "gujarati" | "gu" => Ok(Language::Gujarati),
            _ => Err(MentorError::InvalidValue {
                field: "language".into(),
                value: s.to_string(),
            }),
        }
    }
}

/// Sub-mode of the timed concept explainer.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExplainMode {
    /// Core idea, one example, one takeaway.
    #[default]
    Core,
    /// Exam strategist: expected questions and traps.
    Exam,
    /// Casual explanation like a senior friend.
    Friend,
    /// Why an answer is wrong.
    Wrong,
}

impl ExplainMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExplainMode::Core => "core",
            ExplainMode::Exam => "exam",
            ExplainMode::Friend => "friend",
            ExplainMode::Wrong => "wrong",
        }
    }
}

impl fmt::Display for ExplainMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ExplainMode {
    type Err = MentorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "core" => Ok(ExplainMode::Core),
            "exam" => Ok(ExplainMode::Exam),
            "friend" => Ok(ExplainMode::Friend),
            "wrong" => Ok(ExplainMode::Wrong),
            _ => Err(MentorError::InvalidValue {
                field: "explain mode".into(),
                value: s.to_string(),
            }),
        }
    }
}

/// Interaction mode used for a single exchange.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Mode {
    #[serde(rename = "normal")]
    Normal,
    #[serde(rename = "2min-concept")]
    Concept,
    #[serde(rename = "weakness")]
    Weakness,
    #[serde(rename = "deep-dive")]
    DeepDive,
}

impl Mode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Mode::Normal => "normal",
            Mode::Concept => "2min-concept",
            Mode::Weakness => "weakness",
            Mode::DeepDive => "deep-dive",
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// History module a record belongs to.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModuleType {
    #[default]
    Chat,
    Notes,
    Career,
    ExamPlanner,
    Confusion,
}

impl ModuleType {
    pub const ALL: [ModuleType; 5] = [
        ModuleType::Chat,
        ModuleType::Notes,
        ModuleType::Career,
        ModuleType::ExamPlanner,
        ModuleType::Confusion,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ModuleType::Chat => "chat",
            ModuleType::Notes => "notes",
            ModuleType::Career => "career",
            ModuleType::ExamPlanner => "exam_planner",
            ModuleType::Confusion => "confusion",
        }
    }
}

impl fmt::Display for ModuleType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ModuleType {
    type Err = MentorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ModuleType::ALL
            .into_iter()
            .find(|m| m.as_str() == s.trim().to_lowercase())
            .ok_or_else(|| MentorError::InvalidValue {
                field: "module".into(),
                value: s.to_string(),
            })
    }
}

// =============================================================================
// Structured payloads
// =============================================================================

/// Fields extracted from a finished free-text reply.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlainReply {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<Confidence>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub follow_up: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub suggested_actions: Option<Vec<String>>,
}

impl PlainReply {
    pub fn is_empty(&self) -> bool {
        self.confidence.is_none() && self.follow_up.is_none() && self.suggested_actions.is_none()
    }
}

/// Result of the timed concept explainer.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConceptCard {
    pub concept: String,
    pub example: String,
    pub takeaway: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub topic: Option<String>,
}

/// Result of the weakness analysis.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WeaknessReport {
    pub weak_areas: Vec<String>,
    pub why_weak: String,
    pub next_actions: Vec<String>,
    pub confidence: Confidence,
}

/// Result of the structured deep-dive.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeepDive {
    pub overview: String,
    pub why_it_matters: String,
    pub step_by_step: Vec<String>,
    pub example: String,
    pub common_mistakes: Vec<String>,
    pub memory_trick: String,
    pub takeaway: String,
}

/// Mode-specific payload attached to a finalized assistant turn.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum StructuredPayload {
    #[serde(rename = "normal")]
    Plain(PlainReply),
    #[serde(rename = "concept")]
    Concept(ConceptCard),
    #[serde(rename = "weakness")]
    Weakness(WeaknessReport),
    #[serde(rename = "deep-dive")]
    DeepDive(DeepDive),
}

impl StructuredPayload {
    pub fn kind(&self) -> TurnKind {
        match self {
            StructuredPayload::Plain(_) => TurnKind::Plain,
            StructuredPayload::Concept(_) => TurnKind::Concept,
            StructuredPayload::Weakness(_) => TurnKind::Weakness,
            StructuredPayload::DeepDive(_) => TurnKind::DeepDive,
        }
    }
}

// =============================================================================
// Turn / Session
// =============================================================================

/// One message in a conversation.
///
/// The kind is derived from the structured payload, so a payload can never
/// disagree with the renderer tag.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Turn {
    pub role: Role,
    pub content: String,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub structured: Option<StructuredPayload>,
}

impl Turn {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
            created_at: Utc::now(),
            structured: None,
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
            created_at: Utc::now(),
            structured: None,
        }
    }

    /// An assistant turn carrying a mode-specific payload and no free text.
    pub fn structured(payload: StructuredPayload) -> Self {
        Self {
            role: Role::Assistant,
            content: String::new(),
            created_at: Utc::now(),
            structured: Some(payload),
        }
    }

    pub fn kind(&self) -> TurnKind {
        self.structured
            .as_ref()
            .map(StructuredPayload::kind)
            .unwrap_or_default()
    }

    pub fn is_user(&self) -> bool {
        self.role == Role::User
    }
}

/// Opaque identifier of one continuous conversation thread.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(pub String);

impl SessionId {
    /// Mint a fresh identifier.
    pub fn generate() -> Self {
        Self(format!(
            "session_{}_{}",
            Utc::now().timestamp_millis(),
            Uuid::new_v4().simple()
        ))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for SessionId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// One continuous conversation thread.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub id: SessionId,
    pub turns: Vec<Turn>,
    pub title: Option<String>,
    pub mode: Option<Mode>,
}

/// Body persisted for a session: the full turn list, by value.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct SessionContent {
    pub messages: Vec<Turn>,
}

// =============================================================================
// Records
// =============================================================================

/// Milliseconds since the Unix epoch.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Timestamp(pub i64);

impl Timestamp {
    pub fn now() -> Self {
        Self(Utc::now().timestamp_millis())
    }

    pub fn from_datetime(dt: DateTime<Utc>) -> Self {
        Self(dt.timestamp_millis())
    }

    pub fn to_datetime(&self) -> DateTime<Utc> {
        DateTime::from_timestamp_millis(self.0).unwrap_or_default()
    }
}

/// A persisted session as stored by the history repository.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct HistoryRecord {
    pub id: Uuid,
    pub user_id: String,
    pub session_id: SessionId,
    pub module: ModuleType,
    pub title: Option<String>,
    pub content: SessionContent,
    pub metadata: Option<serde_json::Value>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

/// The signed-in user, as reported by the identity collaborator.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CurrentUser {
    pub id: String,
    pub display_name: Option<String>,
}

impl CurrentUser {
    /// First word of the display name, used to personalize replies.
    pub fn first_name(&self) -> Option<String> {
        self.display_name
            .as_deref()
            .and_then(|name| name.split_whitespace().next())
            .map(str::to_string)
    }
}

/// The unsent input buffer as last committed.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Draft {
    pub key: String,
    pub value: String,
    pub saved_at: Timestamp,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_turn_kind_follows_payload() {
        let turn = Turn::structured(StructuredPayload::Concept(ConceptCard {
            concept: "c".into(),
            example: "e".into(),
            takeaway: "t".into(),
            topic: None,
        }));
        assert_eq!(turn.kind(), TurnKind::Concept);
        assert_eq!(turn.role, Role::Assistant);
        assert_eq!(Turn::user("hi").kind(), TurnKind::Plain);
    }

    #[test]
    fn test_turn_serializes_camel_case() {
        let turn = Turn::assistant("hello");
        let json = serde_json::to_value(&turn).unwrap();
        assert_eq!(json["role"], "assistant");
        assert!(json.get("createdAt").is_some());
        assert!(json.get("structured").is_none());
    }

    #[test]
    fn test_structured_payload_tagging() {
        let payload = StructuredPayload::Weakness(WeaknessReport {
            weak_areas: vec!["fractions".into()],
            why_weak: "rushed".into(),
            next_actions: vec!["practice".into()],
            confidence: Confidence::Medium,
        });
        let json = serde_json::to_value(&payload).unwrap();
        assert_eq!(json["type"], "weakness");
        assert_eq!(json["data"]["weakAreas"][0], "fractions");
        assert_eq!(json["data"]["confidence"], "medium");
    }

    #[test]
    fn test_deep_dive_wire_names() {
        let json = r#"{
            "overview": "o", "whyItMatters": "w", "stepByStep": ["a"],
            "example": "e", "commonMistakes": [], "memoryTrick": "m", "takeaway": "t"
        }"#;
        let dd: DeepDive = serde_json::from_str(json).unwrap();
        assert_eq!(dd.why_it_matters, "w");
        assert_eq!(dd.step_by_step, vec!["a".to_string()]);
    }

    #[test]
    fn test_language_parse() {
        assert_eq!("english".parse::<Language>().unwrap(), Language::English);
        assert_eq!(" Gujarati ".parse::<Language>().unwrap(), Language::Gujarati);
        assert!("french".parse::<Language>().is_err());
        assert_eq!(Language::parse_lenient("french"), Language::Hinglish);
        assert_eq!(Language::Hinglish.to_string(), "Hinglish");
    }

    #[test]
    fn test_language_deserialize_is_lenient() {
        let lang: Language = serde_json::from_str("\"gujarati\"").unwrap();
        assert_eq!(lang, Language::Gujarati);
        let lang: Language = serde_json::from_str("\"Klingon\"").unwrap();
        assert_eq!(lang, Language::Hinglish);
        assert_eq!(serde_json::to_value(Language::English).unwrap(), "English");
    }

    #[test]
    fn test_explain_mode_parse() {
        assert_eq!("FRIEND".parse::<ExplainMode>().unwrap(), ExplainMode::Friend);
        assert!("lecture".parse::<ExplainMode>().is_err());
        assert_eq!(ExplainMode::default(), ExplainMode::Core);
    }

    #[test]
    fn test_module_type_round_trip_names() {
        for module in ModuleType::ALL {
            assert_eq!(module.as_str().parse::<ModuleType>().unwrap(), module);
        }
        assert!("quiz".parse::<ModuleType>().is_err());
    }

    #[test]
    fn test_mode_metadata_names() {
        assert_eq!(Mode::Concept.as_str(), "2min-concept");
        assert_eq!(serde_json::to_value(Mode::DeepDive).unwrap(), "deep-dive");
    }

    #[test]
    fn test_confidence_keywords_and_symbols() {
        assert_eq!(Confidence::from_keyword("HIGH"), Some(Confidence::High));
        assert_eq!(Confidence::from_keyword("moderate"), Some(Confidence::Medium));
        assert_eq!(Confidence::from_keyword("unsure"), None);
        assert_eq!(Confidence::from_symbol("\u{2705}"), Some(Confidence::High));
        assert_eq!(Confidence::from_symbol("\u{26a0}\u{fe0f}"), Some(Confidence::Medium));
        assert_eq!(Confidence::from_symbol("\u{2757}"), Some(Confidence::Low));
    }

    #[test]
    fn test_session_id_generate_unique() {
        let a = SessionId::generate();
        let b = SessionId::generate();
        assert_ne!(a, b);
        assert!(a.as_str().starts_with("session_"));
    }

    #[test]
    fn test_current_user_first_name() {
        let user = CurrentUser {
            id: "u1".into(),
            display_name: Some("Asha  Patel".into()),
        };
        assert_eq!(user.first_name().as_deref(), Some("Asha"));
        let anon = CurrentUser {
            id: "u2".into(),
            display_name: None,
        };
        assert!(anon.first_name().is_none());
    }

    #[test]
    fn test_timestamp_round_trip() {
        let ts = Timestamp(1_700_000_000_123);
        assert_eq!(Timestamp::from_datetime(ts.to_datetime()), ts);
    }

    #[test]
    fn test_plain_reply_is_empty() {
        assert!(PlainReply::default().is_empty());
        let reply = PlainReply {
            confidence: Some(Confidence::Low),
            ..PlainReply::default()
        };
        assert!(!reply.is_empty());
    }
}
