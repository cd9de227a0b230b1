//! Parley: an interruptible voice turn-taking orchestrator.
//!
//! The crate coordinates a spoken conversation with a remote reply service:
//! Microphone → VAD → STT → reply stream → sentence queue → TTS → Speaker
//!
//! # Architecture
//!
//! A single event loop, the [`TurnController`], owns the conversation state
//! and reacts to four sources:
//! - **Control events**: talk button, voice activity and recognizer results
//! - **Reply request**: the pending `POST` to the reply service
//! - **Reply stream**: server-sent text deltas, cut into sentences
//! - **Playback queue**: synthesis and playback of one sentence at a time
//!
//! Speech detection and recognition engines are black boxes behind the
//! [`vad::VoiceActivity`] and [`stt::Recognizer`] traits. The `parley-host`
//! binary drives them over a JSON stdin/stdout contract.

pub mod audio;
pub mod config;
pub mod error;
pub mod host;
pub mod pipeline;
pub mod reply;
pub mod runtime;
pub mod stt;
pub mod tts;
pub mod vad;

#[doc(hidden)]
pub mod test_utils;

pub use config::SpeechConfig;
pub use error::{Result, SpeechError};
pub use pipeline::coordinator::{Collaborators, ControlHandle, TurnController};
pub use pipeline::messages::{ControlEvent, ConversationState};
pub use runtime::RuntimeEvent;
