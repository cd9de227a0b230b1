//! Routes host commands into the turn controller and renders runtime events
//! as host event envelopes.

use crate::error::{Result, SpeechError};
use crate::host::contract::{CommandEnvelope, CommandName, CONTRACT_VERSION, EventEnvelope, ResponseEnvelope};
use crate::pipeline::coordinator::ControlHandle;
use crate::pipeline::messages::{ControlEvent, Transcription};
use crate::runtime::RuntimeEvent;
use tokio::sync::broadcast;

/// Dispatches [`CommandEnvelope`]s against a running controller.
pub struct HostCommandHandler {
    control: ControlHandle,
}

impl HostCommandHandler {
    pub fn new(control: ControlHandle) -> Self {
        Self { control }
    }

    /// Route a command and always produce a response.
    pub async fn respond(&self, envelope: &CommandEnvelope) -> ResponseEnvelope {
        match self.route(envelope).await {
            Ok(response) => response,
            Err(e) => {
                tracing::warn!(
                    error = %e,
                    command = envelope.command.as_str(),
                    request_id = %envelope.request_id,
                    "host command rejected"
                );
                ResponseEnvelope::error(envelope.request_id.clone(), e.to_string())
            }
        }
    }

    /// Route a command envelope to the controller.
    pub async fn route(&self, envelope: &CommandEnvelope) -> Result<ResponseEnvelope> {
        envelope.validate().map_err(|e| {
            SpeechError::Pipeline(format!("invalid host command envelope {}: {}", envelope.request_id, e))
        })?;

        match envelope.command {
            CommandName::HostPing => Ok(ResponseEnvelope::ok(
                envelope.request_id.clone(),
                serde_json::json!({"pong": true}),
            )),
            CommandName::HostVersion => Ok(ResponseEnvelope::ok(
                envelope.request_id.clone(),
                serde_json::json!({
                    "contract_version": CONTRACT_VERSION,
                    "version": env!("CARGO_PKG_VERSION"),
                }),
            )),
            CommandName::RuntimeStatus => Ok(ResponseEnvelope::ok(
                envelope.request_id.clone(),
                serde_json::json!({"state": self.control.state().as_str()}),
            )),
            CommandName::RuntimeStop => {
                self.control.send(ControlEvent::Stop).await?;
                Ok(ResponseEnvelope::ok(
                    envelope.request_id.clone(),
                    serde_json::json!({"stopping": true}),
                ))
            }
            _ => {
                let event = control_event(envelope)?;
                self.control.send(event).await?;
                Ok(ResponseEnvelope::ok(
                    envelope.request_id.clone(),
                    serde_json::json!({"accepted": true}),
                ))
            }
        }
    }
}

/// Translate a session/engine command into a controller event.
///
/// # Errors
///
/// Returns [`SpeechError::Pipeline`] for commands that carry no control
/// event or whose payload is malformed.
pub fn control_event(envelope: &CommandEnvelope) -> Result<ControlEvent> {
    let payload = &envelope.payload;
    match envelope.command {
        CommandName::SessionStart => Ok(ControlEvent::Start),
        CommandName::SessionStop => Ok(ControlEvent::Stop),
        CommandName::VadSpeechStart => Ok(ControlEvent::SpeechStart),
        CommandName::VadSpeechEnd => Ok(ControlEvent::SpeechEnd),
        CommandName::VadError => {
            let permission = payload
                .get("permission")
                .and_then(serde_json::Value::as_bool)
                .unwrap_or(false);
            Ok(ControlEvent::VadFailed {
                permission,
                message: parse_message(payload, "voice activity detector failed"),
            })
        }
        CommandName::SttResult => parse_transcription(payload).map(ControlEvent::Transcription),
        CommandName::SttError => Ok(ControlEvent::RecognitionFailed {
            message: parse_message(payload, "speech recognition failed"),
        }),
        CommandName::SttEnd => Ok(ControlEvent::RecognitionEnded),
        other => Err(SpeechError::Pipeline(format!(
            "{} does not map to a control event",
            other.as_str()
        ))),
    }
}

fn parse_transcription(payload: &serde_json::Value) -> Result<Transcription> {
    let Some(text) = payload.get("text").and_then(serde_json::Value::as_str) else {
        return Err(SpeechError::Pipeline("stt.result requires payload.text".to_owned()));
    };
    let is_final = payload
        .get("is_final")
        .and_then(serde_json::Value::as_bool)
        .unwrap_or(true);
    Ok(Transcription {
        text: text.to_owned(),
        is_final,
    })
}

fn parse_message(payload: &serde_json::Value, fallback: &str) -> String {
    payload
        .get("message")
        .and_then(serde_json::Value::as_str)
        .map(str::trim)
        .filter(|m| !m.is_empty())
        .unwrap_or(fallback)
        .to_owned()
}

/// Render a runtime event as `(event name, payload)`.
pub fn map_runtime_event(event: &RuntimeEvent) -> (&'static str, serde_json::Value) {
    match event {
        RuntimeEvent::StateChanged { from, to } => (
            "runtime.state",
            serde_json::json!({"from": from.as_str(), "to": to.as_str()}),
        ),
        RuntimeEvent::UserTranscript { text, is_final } => (
            "transcript.user",
            serde_json::json!({"text": text, "is_final": is_final}),
        ),
        RuntimeEvent::AssistantDelta { text } => ("transcript.assistant_delta", serde_json::json!({"text": text})),
        RuntimeEvent::AssistantSentence { text } => {
            ("transcript.assistant_sentence", serde_json::json!({"text": text}))
        }
        RuntimeEvent::AssistantComplete => ("transcript.assistant_complete", serde_json::json!({})),
        RuntimeEvent::PlaybackStarted { text } => ("playback.started", serde_json::json!({"text": text})),
        RuntimeEvent::PlaybackFinished { text } => ("playback.finished", serde_json::json!({"text": text})),
        RuntimeEvent::Interrupted { dropped } => ("runtime.interrupted", serde_json::json!({"dropped": dropped})),
        RuntimeEvent::MicStatus { active } => ("runtime.mic_status", serde_json::json!({"active": active})),
        RuntimeEvent::DegradedMode { mode } => ("runtime.degraded_mode", serde_json::json!({"mode": mode})),
        RuntimeEvent::Error { code, message } => (
            "runtime.error",
            serde_json::json!({"code": code, "message": message}),
        ),
    }
}

/// Forward runtime events to the host event channel until either side closes.
pub async fn forward_runtime_events(
    mut runtime_rx: broadcast::Receiver<RuntimeEvent>,
    event_tx: broadcast::Sender<EventEnvelope>,
) {
    loop {
        match runtime_rx.recv().await {
            Ok(event) => {
                let (name, payload) = map_runtime_event(&event);
                if event_tx.send(EventEnvelope::fresh(name, payload)).is_err() {
                    tracing::info!("host event channel closed; stopping runtime forwarder");
                    break;
                }
            }
            Err(broadcast::error::RecvError::Lagged(n)) => {
                tracing::warn!(lagged = n, "runtime forwarder lagged; some events were dropped");
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}
