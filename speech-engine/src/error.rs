use thiserror::Error;

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Voice '{voice}' is not available for language '{language}'")]
    UnsupportedVoice { voice: String, language: String },

    #[error("Unsupported language code: {0}")]
    UnsupportedLanguage(String),

    #[error("Engine not available: {0}")]
    Unavailable(String),

    #[error("Request error{}: {message}", status_code.map(|c| format!(" (HTTP {})", c)).unwrap_or_default())]
    Request {
        message: String,
        status_code: Option<u16>,
    },

    #[error("Synthesis failed: {0}")]
    Synthesis(String),

    #[error("Engine returned unusable audio: {0}")]
    InvalidAudio(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("TOML serialization error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),
}

impl EngineError {
    /// The engine cannot serve the requested voice or language at all.
    pub fn is_unsupported(&self) -> bool {
        matches!(
            self,
            Self::UnsupportedVoice { .. } | Self::UnsupportedLanguage(_)
        )
    }

    /// Whether repeating the same request may succeed.
    ///
    /// Client-side HTTP errors, bad voices and configuration problems fail the
    /// same way every time.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Request { status_code, .. } => match status_code {
                Some(code) => *code == 408 || *code == 429 || *code >= 500,
                None => true,
            },
            Self::Synthesis(_) | Self::InvalidAudio(_) | Self::Io(_) => true,
            Self::UnsupportedVoice { .. }
            | Self::UnsupportedLanguage(_)
            | Self::Unavailable(_)
            | Self::Config(_)
            | Self::TomlParse(_)
            | Self::TomlSerialize(_) => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, EngineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_error_display() {
        let err = EngineError::Request {
            message: "busy".to_string(),
            status_code: Some(503),
        };
        assert_eq!(err.to_string(), "Request error (HTTP 503): busy");

        let err = EngineError::Request {
            message: "connection refused".to_string(),
            status_code: None,
        };
        assert_eq!(err.to_string(), "Request error: connection refused");
    }

    #[test]
    fn test_retryable_classification() {
        let overloaded = EngineError::Request {
            message: String::new(),
            status_code: Some(503),
        };
        let bad_request = EngineError::Request {
            message: String::new(),
            status_code: Some(400),
        };
        assert!(overloaded.is_retryable());
        assert!(!bad_request.is_retryable());
        assert!(EngineError::Synthesis("oom".into()).is_retryable());
        assert!(!EngineError::UnsupportedLanguage("x".into()).is_retryable());
        assert!(EngineError::UnsupportedLanguage("x".into()).is_unsupported());
        assert!(!EngineError::Synthesis("oom".into()).is_unsupported());
        assert!(
            !EngineError::UnsupportedVoice {
                voice: "bf_emma".into(),
                language: "a".into()
            }
            .is_retryable()
        );
    }
}
