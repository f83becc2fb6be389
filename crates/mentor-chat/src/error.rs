//! Error types for the conversation pipeline.

use mentor_core::error::MentorError;

/// Errors from the conversation engine and its collaborators.
#[derive(Debug, thiserror::Error)]
pub enum ChatError {
    /// The backend reported a failure; the message is its `error` field.
    #[error("{0}")]
    Backend(String),
    #[error("request failed: {0}")]
    Transport(String),
    #[error("malformed response: {0}")]
    MalformedPayload(String),
    #[error("stream interrupted: {0}")]
    StreamInterrupted(String),
    #[error("storage error: {0}")]
    Storage(String),
    #[error("a request is already in progress")]
    Busy,
    #[error("invalid input: {0}")]
    InvalidInput(String),
}

impl ChatError {
    /// Text shown to the user inside an apology turn.
    ///
    /// Backend-reported messages are passed through untouched.
    pub fn user_message(&self) -> String {
        match self {
            ChatError::Backend(msg) => msg.clone(),
            other => other.to_string(),
        }
    }
}

impl From<MentorError> for ChatError {
    fn from(err: MentorError) -> Self {
        ChatError::Storage(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chat_error_display() {
        let err = ChatError::Backend("rate limited".to_string());
        assert_eq!(err.to_string(), "rate limited");

        let err = ChatError::Transport("connection refused".to_string());
        assert_eq!(err.to_string(), "request failed: connection refused");

        let err = ChatError::MalformedPayload("missing field `overview`".to_string());
        assert_eq!(
            err.to_string(),
            "malformed response: missing field `overview`"
        );

        let err = ChatError::StreamInterrupted("reset by peer".to_string());
        assert_eq!(err.to_string(), "stream interrupted: reset by peer");

        assert_eq!(
            ChatError::Busy.to_string(),
            "a request is already in progress"
        );
    }

    #[test]
    fn test_user_message_passes_backend_text_through() {
        let err = ChatError::Backend("Topic is required".to_string());
        assert_eq!(err.user_message(), "Topic is required");

        let err = ChatError::Transport("timed out".to_string());
        assert_eq!(err.user_message(), "request failed: timed out");
    }

    #[test]
    fn test_chat_error_from_mentor_error() {
        let chat_err: ChatError = MentorError::Storage("disk full".to_string()).into();
        assert!(matches!(chat_err, ChatError::Storage(_)));
        assert!(chat_err.to_string().contains("disk full"));
    }
}
