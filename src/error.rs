//! Error types for voxloop

use thiserror::Error;

/// Result type alias for voxloop operations
pub type Result<T> = std::result::Result<T, Error>;

/// Boxed error raised by a function handler
pub type HandlerError = Box<dyn std::error::Error + Send + Sync>;

/// Errors that can occur in a voice session or its collaborators
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// Role string is not one of system, user, assistant, function
    #[error("invalid role: {0}")]
    InvalidRole(String),

    /// A function with this name is already registered
    #[error("duplicate function name: {0}")]
    DuplicateName(String),

    /// No function registered under this name
    #[error("unknown function: {0}")]
    UnknownFunction(String),

    /// Arguments did not match the function's parameter schema
    #[error("invalid arguments for {name}: {reason}")]
    InvalidArguments {
        /// Function name
        name: String,
        /// What failed validation
        reason: String,
    },

    /// Function handler raised an error
    #[error("function {name} failed: {source}")]
    HandlerExecution {
        /// Function name
        name: String,
        /// Original handler error
        #[source]
        source: HandlerError,
    },

    /// Speech-to-text error
    #[error("transcription error: {0}")]
    Transcription(String),

    /// Language model error
    #[error("model error: {0}")]
    Model(String),

    /// Text-to-speech error
    #[error("synthesis error: {0}")]
    Synthesis(String),

    /// Collaborator call exceeded its stage timeout
    #[error("{stage} timed out after {millis}ms")]
    Timeout {
        /// Pipeline stage that timed out
        stage: &'static str,
        /// Configured limit
        millis: u64,
    },

    /// Function-call chain exceeded the configured depth
    #[error("function call chain exceeded depth {0}")]
    ChainDepthExceeded(usize),

    /// Room/transport error
    #[error("room error: {0}")]
    Room(String),

    /// Session already closed
    #[error("session closed")]
    SessionClosed,

    /// Audio error
    #[error("audio error: {0}")]
    Audio(String),

    /// IO error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// HTTP error
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// TOML parsing error
    #[error("toml error: {0}")]
    Toml(#[from] toml::de::Error),
}

/// Broad error classes used by the session's recovery policy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Transient failure of STT, LLM or TTS
    Collaborator,
    /// Programmer error: bad role, duplicate name, bad arguments
    Configuration,
    /// Conversation protocol broken but recoverable with a fallback
    ProtocolViolation,
    /// Transport, IO and everything else
    Internal,
}

impl Error {
    /// Classify this error
    #[must_use]
    pub const fn category(&self) -> ErrorCategory {
        match self {
            Self::Transcription(_)
            | Self::Model(_)
            | Self::Synthesis(_)
            | Self::Timeout { .. }
            | Self::HandlerExecution { .. } => ErrorCategory::Collaborator,
            Self::Config(_)
            | Self::InvalidRole(_)
            | Self::DuplicateName(_)
            | Self::UnknownFunction(_)
            | Self::InvalidArguments { .. } => ErrorCategory::Configuration,
            Self::ChainDepthExceeded(_) => ErrorCategory::ProtocolViolation,
            Self::Room(_)
            | Self::SessionClosed
            | Self::Audio(_)
            | Self::Io(_)
            | Self::Http(_)
            | Self::Serialization(_)
            | Self::Toml(_) => ErrorCategory::Internal,
        }
    }

    /// Whether the session may continue after this error
    #[must_use]
    pub const fn is_recoverable(&self) -> bool {
        !matches!(self.category(), ErrorCategory::Internal)
    }
}
