use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::{MentorError, Result};
use crate::types::{CurrentUser, ExplainMode, Language, ModuleType};

/// Top-level configuration for the mentor client.
///
/// Loaded from `~/.mentor/config.toml` by default. Each section corresponds
/// to one collaborator or component of the conversation pipeline.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MentorConfig {
    #[serde(default)]
    pub general: GeneralConfig,
    #[serde(default)]
    pub backend: BackendConfig,
    #[serde(default)]
    pub chat: ChatConfig,
    #[serde(default)]
    pub draft: DraftConfig,
    #[serde(default)]
    pub undo: UndoConfig,
    #[serde(default)]
    pub voice: VoiceConfig,
    #[serde(default)]
    pub user: UserConfig,
}

impl MentorConfig {
    /// Load configuration from a TOML file.
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: MentorConfig = toml::from_str(&content)?;
        info!("Configuration loaded from {}", path.display());
        Ok(config)
    }

    /// Load configuration from a TOML file, falling back to defaults if the
    /// file does not exist or cannot be parsed.
    pub fn load_or_default(path: &Path) -> Self {
        match Self::load(path) {
            Ok(config) => config,
            Err(e) => {
                warn!(
                    "Failed to load config from {}: {}. Using defaults.",
                    path.display(),
                    e
                );
                Self::default()
            }
        }
    }

    /// Save the current configuration to a TOML file.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content =
            toml::to_string_pretty(self).map_err(|e| MentorError::Config(e.to_string()))?;
        std::fs::write(path, content)?;
        info!("Configuration saved to {}", path.display());
        Ok(())
    }
}

/// General application settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Data directory for the SQLite history and local state.
    pub data_dir: String,
    /// Log level: trace, debug, info, warn, error.
    pub log_level: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            data_dir: "~/.mentor/data".to_string(),
            log_level: "info".to_string(),
        }
    }
}

/// Text-generation backend endpoints.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BackendConfig {
    /// Base URL, e.g. `http://localhost:3000`.
    pub base_url: String,
    pub chat_path: String,
    pub concept_path: String,
    pub weakness_path: String,
    pub deep_dive_path: String,
    /// Per-request timeout in seconds. Applies to connect and single-shot calls.
    pub timeout_secs: u64,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:3000".to_string(),
            chat_path: "/api/chat".to_string(),
            concept_path: "/api/chat/2min-concept".to_string(),
            weakness_path: "/api/chat/weakness".to_string(),
            deep_dive_path: "/api/chat/deep-dive".to_string(),
            timeout_secs: 60,
        }
    }
}

/// Conversation surface settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChatConfig {
    /// Language selected when a surface mounts.
    pub default_language: Language,
    /// Explain sub-mode used by the concept explainer.
    pub explain_mode: ExplainMode,
    /// History module the surface saves under.
    pub module: ModuleType,
    /// Maximum accepted input length in characters.
    pub max_input_chars: usize,
    /// Maximum length of a truncated session title.
    pub title_max_chars: usize,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            default_language: Language::English,
            explain_mode: ExplainMode::Core,
            module: ModuleType::Chat,
            max_input_chars: 4000,
            title_max_chars: 50,
        }
    }
}

/// Draft autosave settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DraftConfig {
    /// Local-state key the draft is stored under.
    pub key: String,
    /// Quiet period before a draft is committed.
    pub debounce_ms: u64,
}

impl Default for DraftConfig {
    fn default() -> Self {
        Self {
            key: "chat-input-draft".to_string(),
            debounce_ms: 2500,
        }
    }
}

/// Reset/undo settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct UndoConfig {
    /// How long a reset can be undone.
    pub window_ms: u64,
}

impl Default for UndoConfig {
    fn default() -> Self {
        Self { window_ms: 10_000 }
    }
}

/// Voice transcript handling.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VoiceConfig {
    /// Delay before an auto-submitted transcript is sent.
    pub auto_send_delay_ms: u64,
}

impl Default for VoiceConfig {
    fn default() -> Self {
        Self {
            auto_send_delay_ms: 500,
        }
    }
}

/// The locally signed-in user. An empty id means anonymous.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct UserConfig {
    pub id: String,
    pub display_name: Option<String>,
}

impl UserConfig {
    pub fn current_user(&self) -> Option<CurrentUser> {
        if self.id.trim().is_empty() {
            return None;
        }
        Some(CurrentUser {
            id: self.id.clone(),
            display_name: self.display_name.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = MentorConfig::default();
        assert_eq!(config.draft.debounce_ms, 2500);
        assert_eq!(config.undo.window_ms, 10_000);
        assert_eq!(config.voice.auto_send_delay_ms, 500);
        assert_eq!(config.chat.default_language, Language::English);
        assert_eq!(config.chat.module, ModuleType::Chat);
        assert_eq!(config.backend.chat_path, "/api/chat");
        assert!(config.user.current_user().is_none());
    }

    #[test]
    fn test_partial_toml_fills_defaults() {
        let toml_str = r#"
            [chat]
            default_language = "Gujarati"

            [user]
            id = "student-1"
            display_name = "Riya Shah"
        "#;
        let config: MentorConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.chat.default_language, Language::Gujarati);
        assert_eq!(config.chat.max_input_chars, 4000);
        assert_eq!(config.draft.key, "chat-input-draft");
        let user = config.user.current_user().unwrap();
        assert_eq!(user.id, "student-1");
        assert_eq!(user.first_name().as_deref(), Some("Riya"));
    }

    #[test]
    fn test_save_and_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        let mut config = MentorConfig::default();
        config.backend.base_url = "http://mentor.test".to_string();
        config.undo.window_ms = 5_000;
        config.save(&path).unwrap();

        let loaded = MentorConfig::load(&path).unwrap();
        assert_eq!(loaded.backend.base_url, "http://mentor.test");
        assert_eq!(loaded.undo.window_ms, 5_000);
    }

    #[test]
    fn test_unknown_language_keeps_other_sections() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            r#"
            [backend]
            base_url = "http://mentor.example"

            [chat]
            default_language = "french"

            [user]
            id = "student-7"
        "#,
        )
        .unwrap();

        let config = MentorConfig::load_or_default(&path);
        assert_eq!(config.backend.base_url, "http://mentor.example");
        assert_eq!(config.chat.default_language, Language::Hinglish);
        assert_eq!(config.user.current_user().unwrap().id, "student-7");
    }

    #[test]
    fn test_lowercase_language_accepted() {
        let chat: ChatConfig = toml::from_str("default_language = \"english\"").unwrap();
        assert_eq!(chat.default_language, Language::English);
    }

    #[test]
    fn test_load_missing_file_errors() {
        let dir = tempfile::tempdir().unwrap();
        assert!(MentorConfig::load(&dir.path().join("absent.toml")).is_err());
    }

    #[test]
    fn test_load_or_default_on_garbage() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "this is [not toml").unwrap();
        let config = MentorConfig::load_or_default(&path);
        assert_eq!(config.draft.debounce_ms, 2500);
    }

    #[test]
    fn test_blank_user_id_is_anonymous() {
        let user = UserConfig {
            id: "   ".into(),
            display_name: Some("Ghost".into()),
        };
        assert!(user.current_user().is_none());
    }
}
