//! Error types for the voice assistant

use std::fmt;

use thiserror::Error;

/// Result type alias for voice assistant operations
pub type Result<T> = std::result::Result<T, Error>;

/// Remote service a request was sent to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Service {
    /// Whisper speech-to-text
    Transcription,
    /// Azure OpenAI chat completion
    Chat,
    /// Speech synthesis (Azure Speech or Azure OpenAI TTS)
    Synthesis,
}

impl fmt::Display for Service {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Transcription => "transcription",
            Self::Chat => "chat",
            Self::Synthesis => "synthesis",
        })
    }
}

/// Errors that can occur in the voice assistant
#[derive(Debug, Error)]
pub enum Error {
    /// Required environment variable is absent or empty
    #[error("missing required environment variable {0}")]
    MissingVar(&'static str),

    /// Variable is present but unusable
    #[error("invalid value for {key}: {reason}")]
    InvalidVar {
        /// Variable or config key
        key: &'static str,
        /// What is wrong with it
        reason: String,
    },

    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// Audio device error (capture or playback)
    #[error("audio error: {0}")]
    Audio(String),

    /// Speech-to-text error
    #[error("STT error: {0}")]
    Stt(String),

    /// Chat completion error
    #[error("chat error: {0}")]
    Chat(String),

    /// Malformed chat prompt list
    #[error("invalid prompt: {0}")]
    Prompt(String),

    /// Text-to-speech error
    #[error("TTS error: {0}")]
    Tts(String),

    /// Remote service rejected the credentials
    #[error("{service} authentication failed ({status}): {message}")]
    Unauthorized {
        /// Service that rejected the request
        service: Service,
        /// HTTP status code
        status: u16,
        /// Message reported by the service
        message: String,
    },

    /// Remote service is throttling
    #[error("{service} rate limited (retry after {retry_after:?}s): {message}")]
    RateLimited {
        /// Service that throttled the request
        service: Service,
        /// Seconds from the `Retry-After` header, if any
        retry_after: Option<u64>,
        /// Message reported by the service
        message: String,
    },

    /// Any other non-success response
    #[error("{service} API error {status}: {message}")]
    Api {
        /// Service that failed
        service: Service,
        /// HTTP status code
        status: u16,
        /// Message reported by the service
        message: String,
    },

    /// Request to a remote service got no usable response (DNS, connect, timeout, body)
    #[error("{service} request failed: {source}")]
    Network {
        /// Service the request was sent to
        service: Service,
        /// Underlying transport error
        #[source]
        source: reqwest::Error,
    },

    /// IO error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// HTTP client setup error
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// TOML parsing error
    #[error("toml error: {0}")]
    Toml(#[from] toml::de::Error),

    /// WAV encoding or decoding error
    #[error("wav error: {0}")]
    Wav(#[from] hound::Error),
}

impl Error {
    /// Whether this error comes from the configuration layer
    #[must_use]
    pub const fn is_config(&self) -> bool {
        matches!(
            self,
            Self::MissingVar(_) | Self::InvalidVar { .. } | Self::Config(_) | Self::Toml(_)
        )
    }

    /// Remote service involved in this error, if any
    #[must_use]
    pub const fn service(&self) -> Option<Service> {
        match self {
            Self::Unauthorized { service, .. }
            | Self::RateLimited { service, .. }
            | Self::Api { service, .. }
            | Self::Network { service, .. } => Some(*service),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_var_names_the_variable() {
        let err = Error::MissingVar("AZURE_SPEECH_KEY");
        assert_eq!(
            err.to_string(),
            "missing required environment variable AZURE_SPEECH_KEY"
        );
        assert!(err.is_config());
    }

    #[test]
    fn test_remote_errors_carry_service() {
        let err = Error::RateLimited {
            service: Service::Chat,
            retry_after: Some(3),
            message: "slow down".to_string(),
        };
        assert_eq!(err.service(), Some(Service::Chat));
        assert!(!err.is_config());
        assert!(err.to_string().starts_with("chat rate limited"));

        assert_eq!(Error::Audio("gone".to_string()).service(), None);
    }
}
