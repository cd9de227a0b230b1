//! Voice activity detection collaborator.
//!
//! The detector itself is a black box (a browser VAD, a native engine, a
//! host app). The turn controller only arms and disarms it; detections come
//! back as [`ControlEvent::SpeechStart`](crate::pipeline::messages::ControlEvent::SpeechStart)
//! and [`ControlEvent::SpeechEnd`](crate::pipeline::messages::ControlEvent::SpeechEnd).

use crate::error::Result;

/// Arms and disarms an external voice activity detector.
pub trait VoiceActivity: Send + Sync {
    /// Start (or resume) listening for speech.
    ///
    /// # Errors
    ///
    /// Returns [`SpeechError::Permission`](crate::error::SpeechError::Permission)
    /// when the microphone is refused, or
    /// [`SpeechError::Vad`](crate::error::SpeechError::Vad) for any other
    /// failure to arm.
    fn resume(&self) -> Result<()>;

    /// Stop listening for speech.
    ///
    /// # Errors
    ///
    /// Returns [`SpeechError::Vad`](crate::error::SpeechError::Vad) if the
    /// detector could not be paused.
    fn pause(&self) -> Result<()>;
}
