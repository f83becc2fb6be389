//! Voice transcript handling.
//!
//! Capture and speech recognition happen in the front end; this module only
//! decides what to do with a finished transcript.

use std::time::Duration;

use mentor_core::config::VoiceConfig;

use crate::intent::{classify, Intent};

/// What to do with one transcript.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VoiceDecision {
    /// Text to place in the input buffer.
    pub text: String,
    pub intent: Intent,
    /// Send automatically after this delay.
    pub auto_send_after: Option<Duration>,
}

#[derive(Debug, Clone)]
pub struct VoiceHandler {
    auto_send_delay: Duration,
}

impl VoiceHandler {
    pub fn new(auto_send_delay: Duration) -> Self {
        Self { auto_send_delay }
    }

    pub fn from_config(config: &VoiceConfig) -> Self {
        Self::new(Duration::from_millis(config.auto_send_delay_ms))
    }

    /// `None` for a blank transcript.
    pub fn handle(&self, transcript: &str) -> Option<VoiceDecision> {
        let text = transcript.trim();
        if text.is_empty() {
            return None;
        }
        let intent = classify(text);
        Some(VoiceDecision {
            text: text.to_string(),
            intent,
            auto_send_after: intent.auto_sends().then_some(self.auto_send_delay),
        })
    }
}

impl Default for VoiceHandler {
    fn default() -> Self {
        Self::from_config(&VoiceConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blank_transcript_ignored() {
        assert!(VoiceHandler::default().handle("   ").is_none());
    }

    #[test]
    fn test_greeting_auto_sends_after_delay() {
        let decision = VoiceHandler::default().handle(" hello ").unwrap();
        assert_eq!(decision.text, "hello");
        assert_eq!(decision.intent, Intent::Greeting);
        assert_eq!(decision.auto_send_after, Some(Duration::from_millis(500)));
    }

    #[test]
    fn test_study_waits_for_user() {
        let decision = VoiceHandler::new(Duration::from_millis(100))
            .handle("what is the unit of force")
            .unwrap();
        assert_eq!(decision.intent, Intent::Study);
        assert!(decision.auto_send_after.is_none());
    }

    #[test]
    fn test_stress_does_not_auto_send() {
        let decision = VoiceHandler::default()
            .handle("mujhe tension ho rahi hai")
            .unwrap();
        assert_eq!(decision.intent, Intent::Stress);
        assert!(decision.auto_send_after.is_none());
    }
}
