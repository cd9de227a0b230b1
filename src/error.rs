//! Error types for the parley turn-taking pipeline.
//!
//! Each variant maps to a stable code via [`SpeechError::code()`]; the codes
//! travel on runtime error events so host UIs can branch without parsing text.

/// Stable error codes for programmatic error handling.
pub mod error_codes {
    /// Invalid or missing configuration.
    pub const CONFIG_INVALID: &str = "CONFIG_INVALID";

    /// Microphone permission was denied.
    pub const PERMISSION_DENIED: &str = "PERMISSION_DENIED";

    /// Voice activity detector failed.
    pub const VAD_FAILED: &str = "VAD_FAILED";

    /// Speech recognizer failed or produced no result.
    pub const STT_FAILED: &str = "STT_FAILED";

    /// Reply service request or stream failed.
    pub const UPSTREAM_FAILED: &str = "UPSTREAM_FAILED";

    /// Speech synthesis request failed.
    pub const TTS_FAILED: &str = "TTS_FAILED";

    /// Audio decoding or playback failed.
    pub const PLAYBACK_FAILED: &str = "PLAYBACK_FAILED";

    /// Internal coordination failure.
    pub const PIPELINE_ERROR: &str = "PIPELINE_ERROR";

    /// Local I/O failure.
    pub const IO_ERROR: &str = "IO_ERROR";

    /// A channel closed unexpectedly.
    pub const CHANNEL_CLOSED: &str = "CHANNEL_CLOSED";
}

/// Top-level error type for the voice turn-taking system.
#[derive(Debug, thiserror::Error)]
pub enum SpeechError {
    /// Configuration error.
    #[error("config error: {0}")]
    Config(String),

    /// Microphone access was refused by the user or platform.
    #[error("permission denied: {0}")]
    Permission(String),

    /// Voice activity detection error.
    #[error("VAD error: {0}")]
    Vad(String),

    /// Speech-to-text recognition error.
    #[error("STT error: {0}")]
    Stt(String),

    /// Reply service transport or status error.
    #[error("upstream error: {0}")]
    Upstream(String),

    /// Text-to-speech synthesis error.
    #[error("TTS error: {0}")]
    Tts(String),

    /// Audio decode or output device error.
    #[error("audio error: {0}")]
    Audio(String),

    /// Pipeline coordination error.
    #[error("pipeline error: {0}")]
    Pipeline(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Channel send/receive error.
    #[error("channel error: {0}")]
    Channel(String),
}

impl SpeechError {
    /// Returns the stable error code for this error.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Config(_) => error_codes::CONFIG_INVALID,
            Self::Permission(_) => error_codes::PERMISSION_DENIED,
            Self::Vad(_) => error_codes::VAD_FAILED,
            Self::Stt(_) => error_codes::STT_FAILED,
            Self::Upstream(_) => error_codes::UPSTREAM_FAILED,
            Self::Tts(_) => error_codes::TTS_FAILED,
            Self::Audio(_) => error_codes::PLAYBACK_FAILED,
            Self::Pipeline(_) => error_codes::PIPELINE_ERROR,
            Self::Io(_) => error_codes::IO_ERROR,
            Self::Channel(_) => error_codes::CHANNEL_CLOSED,
        }
    }

    /// Whether this failure ends the session rather than the current turn.
    pub fn is_session_fatal(&self) -> bool {
        matches!(self, Self::Permission(_))
    }
}

/// Convenience result type.
pub type Result<T> = std::result::Result<T, SpeechError>;
