//! Voice activity and recognition engines that live in the host app.
//!
//! Arming or disarming one of them is an event envelope sent to the host;
//! the host reports detections back as `vad.*` / `stt.*` commands.

use crate::config::RecognizerConfig;
use crate::error::{Result, SpeechError};
use crate::host::contract::{EventEnvelope, host_requests};
use crate::stt::Recognizer;
use crate::vad::VoiceActivity;
use tokio::sync::broadcast;

fn request(
    events: &broadcast::Sender<EventEnvelope>,
    name: &str,
    payload: serde_json::Value,
) -> std::result::Result<(), String> {
    events
        .send(EventEnvelope::fresh(name, payload))
        .map(|_| ())
        .map_err(|_| format!("no host connected to receive {name}"))
}

/// Host-side voice activity detector.
pub struct HostVoiceActivity {
    events: broadcast::Sender<EventEnvelope>,
}

impl HostVoiceActivity {
    pub fn new(events: broadcast::Sender<EventEnvelope>) -> Self {
        Self { events }
    }
}

impl VoiceActivity for HostVoiceActivity {
    fn resume(&self) -> Result<()> {
        request(&self.events, host_requests::VAD_RESUME, serde_json::json!({})).map_err(SpeechError::Vad)
    }

    fn pause(&self) -> Result<()> {
        request(&self.events, host_requests::VAD_PAUSE, serde_json::json!({})).map_err(SpeechError::Vad)
    }
}

/// Host-side speech recognizer.
pub struct HostRecognizer {
    events: broadcast::Sender<EventEnvelope>,
    config: RecognizerConfig,
}

impl HostRecognizer {
    pub fn new(events: broadcast::Sender<EventEnvelope>, config: RecognizerConfig) -> Self {
        Self { events, config }
    }
}

impl Recognizer for HostRecognizer {
    fn start(&self) -> Result<()> {
        request(
            &self.events,
            host_requests::STT_START,
            serde_json::json!({
                "language": self.config.language,
                "interim_results": self.config.interim_results,
            }),
        )
        .map_err(SpeechError::Stt)
    }

    fn stop(&self) -> Result<()> {
        request(&self.events, host_requests::STT_STOP, serde_json::json!({})).map_err(SpeechError::Stt)
    }
}
