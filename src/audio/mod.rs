//! Audio decoding and interruptible playback.

pub mod decode;
pub mod player;
pub mod playback;

pub use playback::{AudioOutput, PlaybackHandle, PlaybackKind, PlaybackOutcome, PlaybackSource, SpeakerOutput};
