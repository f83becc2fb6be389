use thiserror::Error;

/// Top-level error type for the mentor client.
///
/// Subsystem crates define their own error types and implement
/// `From<MentorError>` so that the `?` operator works across crate boundaries.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum MentorError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Record not found: {0}")]
    NotFound(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Invalid value for {field}: {value}")]
    InvalidValue { field: String, value: String },
}

impl From<toml::de::Error> for MentorError {
    fn from(err: toml::de::Error) -> Self {
        MentorError::Config(err.to_string())
    }
}

impl From<toml::ser::Error> for MentorError {
    fn from(err: toml::ser::Error) -> Self {
        MentorError::Config(err.to_string())
    }
}

impl From<serde_json::Error> for MentorError {
    fn from(err: serde_json::Error) -> Self {
        MentorError::Serialization(err.to_string())
    }
}

/// A specialized `Result` type for mentor operations.
pub type Result<T> = std::result::Result<T, MentorError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = MentorError::Config("missing field".to_string());
        assert_eq!(err.to_string(), "Configuration error: missing field");
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: MentorError = io_err.into();
        assert!(matches!(err, MentorError::Io(_)));
        assert!(err.to_string().contains("file not found"));
    }

    #[test]
    fn test_json_error_conversion() {
        let json_err = serde_json::from_str::<serde_json::Value>("{not json").unwrap_err();
        let err: MentorError = json_err.into();
        assert!(matches!(err, MentorError::Serialization(_)));
    }

    #[test]
    fn test_toml_error_conversion() {
        let toml_err = toml::from_str::<toml::Value>("= broken").unwrap_err();
        let err: MentorError = toml_err.into();
        assert!(matches!(err, MentorError::Config(_)));
    }

    #[test]
    fn test_invalid_value_display() {
        let err = MentorError::InvalidValue {
            field: "language".into(),
            value: "Klingon".into(),
        };
        assert_eq!(err.to_string(), "Invalid value for language: Klingon");
    }

    #[test]
    fn test_not_found_display() {
        let err = MentorError::NotFound("session abc".into());
        assert_eq!(err.to_string(), "Record not found: session abc");
    }
}
