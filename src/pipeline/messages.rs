//! Message types passed into the turn controller.

use serde::{Deserialize, Serialize};

/// Conversation state owned by the turn controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ConversationState {
    /// Waiting for the user to speak.
    #[default]
    Idle,
    /// A recognition session is capturing the user's turn.
    Listening,
    /// The reply request is in flight.
    Thinking,
    /// Reply audio is queued, synthesizing or sounding.
    Speaking,
}

impl ConversationState {
    /// Wire name of the state.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Listening => "listening",
            Self::Thinking => "thinking",
            Self::Speaking => "speaking",
        }
    }
}

impl std::fmt::Display for ConversationState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A transcription result from the speech recognizer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transcription {
    /// The transcribed text.
    pub text: String,
    /// Whether this is a final transcription (vs interim).
    pub is_final: bool,
}

/// Events delivered to the turn controller's event loop.
///
/// Speech-activity and recognizer events come from black-box engines;
/// `Start` and `Stop` come from the user (talk button or host command).
#[derive(Debug, Clone, PartialEq)]
pub enum ControlEvent {
    /// Begin a conversation session: arm the voice activity detector.
    Start,
    /// End the session: pause detection, interrupt and go idle.
    Stop,
    /// The voice activity detector heard speech begin.
    SpeechStart,
    /// The voice activity detector heard speech end.
    SpeechEnd,
    /// The recognizer produced a hypothesis.
    Transcription(Transcription),
    /// The recognizer failed.
    RecognitionFailed {
        /// Engine-provided reason.
        message: String,
    },
    /// The recognizer session ended without a final result.
    RecognitionEnded,
    /// The voice activity detector failed after being armed.
    VadFailed {
        /// The failure was a microphone permission refusal.
        permission: bool,
        /// Engine-provided reason.
        message: String,
    },
}
