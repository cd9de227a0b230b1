//! Versioned host command/event envelopes for the JSON bridge.
//!
//! Commands flow host -> parley (session control plus the black-box voice
//! activity and recognizer results). Events flow parley -> host (runtime
//! events plus requests to arm/disarm the host's detector and recognizer).

use serde::{Deserialize, Serialize};

/// Version of the parley host contract, carried as `v` in every envelope.
pub const CONTRACT_VERSION: u32 = 1;

/// Command set accepted from the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CommandName {
    #[serde(rename = "host.ping")]
    HostPing,
    #[serde(rename = "host.version")]
    HostVersion,
    #[serde(rename = "session.start")]
    SessionStart,
    #[serde(rename = "session.stop")]
    SessionStop,
    #[serde(rename = "vad.speech_start")]
    VadSpeechStart,
    #[serde(rename = "vad.speech_end")]
    VadSpeechEnd,
    #[serde(rename = "vad.error")]
    VadError,
    #[serde(rename = "stt.result")]
    SttResult,
    #[serde(rename = "stt.error")]
    SttError,
    #[serde(rename = "stt.end")]
    SttEnd,
    #[serde(rename = "runtime.status")]
    RuntimeStatus,
    #[serde(rename = "runtime.stop")]
    RuntimeStop,
}

impl CommandName {
    /// Render command name to wire format.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::HostPing => "host.ping",
            Self::HostVersion => "host.version",
            Self::SessionStart => "session.start",
            Self::SessionStop => "session.stop",
            Self::VadSpeechStart => "vad.speech_start",
            Self::VadSpeechEnd => "vad.speech_end",
            Self::VadError => "vad.error",
            Self::SttResult => "stt.result",
            Self::SttError => "stt.error",
            Self::SttEnd => "stt.end",
            Self::RuntimeStatus => "runtime.status",
            Self::RuntimeStop => "runtime.stop",
        }
    }

    /// Parse a command name from wire format.
    #[must_use]
    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "host.ping" => Some(Self::HostPing),
            "host.version" => Some(Self::HostVersion),
            "session.start" => Some(Self::SessionStart),
            "session.stop" => Some(Self::SessionStop),
            "vad.speech_start" => Some(Self::VadSpeechStart),
            "vad.speech_end" => Some(Self::VadSpeechEnd),
            "vad.error" => Some(Self::VadError),
            "stt.result" => Some(Self::SttResult),
            "stt.error" => Some(Self::SttError),
            "stt.end" => Some(Self::SttEnd),
            "runtime.status" => Some(Self::RuntimeStatus),
            "runtime.stop" => Some(Self::RuntimeStop),
            _ => None,
        }
    }
}

/// Event names parley emits to ask the host to drive its engines.
pub mod host_requests {
    /// Arm the host's voice activity detector.
    pub const VAD_RESUME: &str = "vad.resume";
    /// Disarm the host's voice activity detector.
    pub const VAD_PAUSE: &str = "vad.pause";
    /// Begin a recognition session.
    pub const STT_START: &str = "stt.start";
    /// Finalize the current recognition session.
    pub const STT_STOP: &str = "stt.stop";
}

/// Reply to one host command, matched by `request_id`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponseEnvelope {
    pub v: u32,
    pub request_id: String,
    pub ok: bool,
    pub payload: serde_json::Value,
    pub error: Option<String>,
}

impl ResponseEnvelope {
    /// Build a successful response envelope.
    #[must_use]
    pub fn ok(request_id: impl Into<String>, payload: serde_json::Value) -> Self {
        Self {
            v: CONTRACT_VERSION,
            request_id: request_id.into(),
            ok: true,
            payload,
            error: None,
        }
    }

    /// Build an error response envelope.
    #[must_use]
    pub fn error(request_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            v: CONTRACT_VERSION,
            request_id: request_id.into(),
            ok: false,
            payload: serde_json::Value::Null,
            error: Some(message.into()),
        }
    }
}

/// Command sent by the host.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandEnvelope {
    pub v: u32,
    pub request_id: String,
    pub command: CommandName,
    #[serde(default)]
    pub payload: serde_json::Value,
}

impl CommandEnvelope {
    /// Build a command stamped with [`CONTRACT_VERSION`].
    #[must_use]
    pub fn new(request_id: impl Into<String>, command: CommandName, payload: serde_json::Value) -> Self {
        Self {
            v: CONTRACT_VERSION,
            request_id: request_id.into(),
            command,
            payload,
        }
    }

    /// Check the contract version and the request id.
    pub fn validate(&self) -> Result<(), ContractError> {
        if self.v != CONTRACT_VERSION {
            return Err(ContractError::new(
                ContractErrorKind::UnsupportedVersion,
                format!("unsupported contract version {}; expected {}", self.v, CONTRACT_VERSION),
            ));
        }
        if self.request_id.trim().is_empty() {
            return Err(ContractError::new(
                ContractErrorKind::InvalidEnvelope,
                "request_id cannot be empty".to_owned(),
            ));
        }
        Ok(())
    }
}

/// Unsolicited event for the host: runtime events and engine requests.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventEnvelope {
    pub v: u32,
    pub event_id: String,
    pub event: String,
    pub payload: serde_json::Value,
}

impl EventEnvelope {
    /// Build an event stamped with [`CONTRACT_VERSION`].
    #[must_use]
    pub fn new(event_id: impl Into<String>, event: impl Into<String>, payload: serde_json::Value) -> Self {
        Self {
            v: CONTRACT_VERSION,
            event_id: event_id.into(),
            event: event.into(),
            payload,
        }
    }

    /// Build an envelope with a fresh random id.
    #[must_use]
    pub fn fresh(event: impl Into<String>, payload: serde_json::Value) -> Self {
        Self::new(uuid::Uuid::new_v4().to_string(), event, payload)
    }
}

/// Contract validation error categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContractErrorKind {
    UnsupportedVersion,
    InvalidEnvelope,
    InvalidPayload,
}

/// Contract validation error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContractError {
    pub kind: ContractErrorKind,
    pub message: String,
}

impl ContractError {
    #[must_use]
    pub fn new(kind: ContractErrorKind, message: String) -> Self {
        Self { kind, message }
    }
}

impl std::fmt::Display for ContractError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}: {}", self.kind, self.message)
    }
}

impl std::error::Error for ContractError {}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

    use super::*;

    const ALL: [CommandName; 12] = [
        CommandName::HostPing,
        CommandName::HostVersion,
        CommandName::SessionStart,
        CommandName::SessionStop,
        CommandName::VadSpeechStart,
        CommandName::VadSpeechEnd,
        CommandName::VadError,
        CommandName::SttResult,
        CommandName::SttError,
        CommandName::SttEnd,
        CommandName::RuntimeStatus,
        CommandName::RuntimeStop,
    ];

    #[test]
    fn wire_names_agree_with_serde() {
        for name in ALL {
            let json = serde_json::to_value(name).unwrap();
            assert_eq!(json, serde_json::Value::String(name.as_str().to_owned()));
            assert_eq!(CommandName::parse(name.as_str()), Some(name));
        }
        assert_eq!(CommandName::parse("scheduler.list"), None);
    }

    #[test]
    fn payload_defaults_to_null() {
        let env: CommandEnvelope =
            serde_json::from_str(r#"{"v":1,"request_id":"r1","command":"vad.speech_start"}"#).unwrap();
        assert_eq!(env.command, CommandName::VadSpeechStart);
        assert!(env.payload.is_null());
        assert!(env.validate().is_ok());
    }

    #[test]
    fn rejects_wrong_version_and_blank_id() {
        let mut env = CommandEnvelope::new("r1", CommandName::HostPing, serde_json::json!({}));
        env.v = 2;
        assert_eq!(env.validate().unwrap_err().kind, ContractErrorKind::UnsupportedVersion);

        let env = CommandEnvelope::new("  ", CommandName::HostPing, serde_json::json!({}));
        assert_eq!(env.validate().unwrap_err().kind, ContractErrorKind::InvalidEnvelope);
    }

    #[test]
    fn fresh_events_get_distinct_ids() {
        let a = EventEnvelope::fresh(host_requests::VAD_RESUME, serde_json::json!({}));
        let b = EventEnvelope::fresh(host_requests::VAD_RESUME, serde_json::json!({}));
        assert_ne!(a.event_id, b.event_id);
        assert_eq!(a.v, CONTRACT_VERSION);
    }
}
