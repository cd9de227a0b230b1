//! Speech recognition collaborator.
//!
//! Like voice activity detection, recognition is a black box. Results come
//! back as [`ControlEvent::Transcription`](crate::pipeline::messages::ControlEvent::Transcription);
//! failures as `RecognitionFailed` or `RecognitionEnded`.

use crate::error::Result;

/// Starts and stops an external speech recognizer session.
pub trait Recognizer: Send + Sync {
    /// Begin a recognition session for one user turn.
    ///
    /// # Errors
    ///
    /// Returns [`SpeechError::Stt`](crate::error::SpeechError::Stt) if the
    /// session could not be started.
    fn start(&self) -> Result<()>;

    /// Ask the recognizer to finalize the current session.
    ///
    /// # Errors
    ///
    /// Returns [`SpeechError::Stt`](crate::error::SpeechError::Stt) if the
    /// request could not be delivered.
    fn stop(&self) -> Result<()>;
}
