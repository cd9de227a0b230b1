//! Runtime events emitted by the turn controller for UI and observability.
//!
//! These double as the transcript surface: user turns, assistant deltas and
//! sentences, and inline error annotations all arrive here.

use crate::pipeline::messages::ConversationState;

/// Events that describe what the pipeline is doing "right now".
#[derive(Debug, Clone, PartialEq)]
pub enum RuntimeEvent {
    /// The conversation state changed.
    StateChanged {
        from: ConversationState,
        to: ConversationState,
    },
    /// User transcription produced by the recognizer.
    UserTranscript { text: String, is_final: bool },
    /// A text delta extracted from the reply stream.
    AssistantDelta { text: String },
    /// A complete sentence queued for speech.
    AssistantSentence { text: String },
    /// The reply stream ended and the remaining text was flushed.
    AssistantComplete,
    /// Audio for a sentence started sounding.
    PlaybackStarted { text: String },
    /// Audio for a sentence finished sounding.
    PlaybackFinished { text: String },
    /// The user barged in or stopped; pending speech was dropped.
    Interrupted { dropped: usize },
    /// Whether the voice activity detector is armed.
    MicStatus { active: bool },
    /// Listening runs without a voice activity detector.
    DegradedMode { mode: String },
    /// A failure surfaced as an inline transcript annotation.
    Error { code: String, message: String },
}

impl RuntimeEvent {
    /// Build an error annotation from a [`SpeechError`](crate::error::SpeechError).
    #[must_use]
    pub fn from_error(err: &crate::error::SpeechError) -> Self {
        Self::Error {
            code: err.code().to_owned(),
            message: err.to_string(),
        }
    }
}
