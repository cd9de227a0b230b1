//! Speech synthesis collaborator.
//!
//! Synthesis is a remote call: one sanitized sentence in, one encoded audio
//! payload out. Decoding and playback happen in [`crate::audio`].

pub mod sanitize;

use crate::config::SynthesisConfig;
use crate::error::{Result, SpeechError};
use crate::reply::{content_type, extract_error_message};
use async_trait::async_trait;
use bytes::Bytes;
use serde::Serialize;
use std::time::Duration;

pub use sanitize::sanitize_for_speech;

/// Encoded audio returned by the synthesis service.
#[derive(Debug, Clone, PartialEq)]
pub struct SynthesizedAudio {
    /// Encoded audio (mp3, wav, ...).
    pub bytes: Bytes,
    /// MIME type reported by the service, e.g. `audio/mpeg`.
    pub content_type: String,
}

impl SynthesizedAudio {
    /// File extension hint derived from the MIME type.
    #[must_use]
    pub fn extension_hint(&self) -> Option<&'static str> {
        let subtype = self.content_type.split(';').next()?.trim().strip_prefix("audio/")?;
        match subtype {
            "mpeg" | "mp3" => Some("mp3"),
            "wav" | "wave" | "x-wav" => Some("wav"),
            "mp4" | "aac" | "x-m4a" => Some("m4a"),
            "ogg" | "opus" => Some("ogg"),
            _ => None,
        }
    }
}

/// Turns one sentence into encoded audio.
#[async_trait]
pub trait Synthesizer: Send + Sync {
    /// Synthesize `text`, optionally in `voice`.
    ///
    /// # Errors
    ///
    /// Returns [`SpeechError::Tts`] on network failure, a non-success status,
    /// or a success response that is not audio.
    async fn synthesize(&self, text: &str, voice: Option<&str>) -> Result<SynthesizedAudio>;
}

/// JSON body sent to the synthesis service.
#[derive(Debug, Clone, Serialize)]
pub struct SynthesisRequest<'a> {
    pub text: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub voice: Option<&'a str>,
}

/// [`Synthesizer`] backed by an HTTP endpoint.
pub struct HttpSynthesizer {
    client: reqwest::Client,
    config: SynthesisConfig,
}

impl HttpSynthesizer {
    /// Create a synthesizer for the configured endpoint.
    pub fn new(config: SynthesisConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            config,
        }
    }

    /// Create a synthesizer sharing an existing client.
    pub fn with_client(client: reqwest::Client, config: SynthesisConfig) -> Self {
        Self { client, config }
    }

    /// Voice configured for this endpoint, if any.
    pub fn default_voice(&self) -> Option<&str> {
        self.config.voice.as_deref()
    }
}

#[async_trait]
impl Synthesizer for HttpSynthesizer {
    async fn synthesize(&self, text: &str, voice: Option<&str>) -> Result<SynthesizedAudio> {
        let body = SynthesisRequest {
            text,
            voice: voice.or(self.config.voice.as_deref()),
        };

        let response = self
            .client
            .post(&self.config.url)
            .timeout(Duration::from_secs(self.config.timeout_secs))
            .json(&body)
            .send()
            .await
            .map_err(|e| SpeechError::Tts(format!("synthesis request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body_text = response.text().await.unwrap_or_default();
            return Err(SpeechError::Tts(format!(
                "synthesis service returned {status}: {}",
                extract_error_message(&body_text)
            )));
        }

        let content_type = content_type(response.headers());
        if !content_type.starts_with("audio/") {
            let body_text = response.text().await.unwrap_or_default();
            return Err(SpeechError::Tts(format!(
                "synthesis service answered {status} with non-audio content ({}): {}",
                if content_type.is_empty() { "no content type" } else { content_type.as_str() },
                extract_error_message(&body_text)
            )));
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| SpeechError::Tts(format!("synthesis body read failed: {e}")))?;
        if bytes.is_empty() {
            return Err(SpeechError::Tts("synthesis service returned empty audio".to_owned()));
        }

        tracing::debug!(bytes = bytes.len(), content_type = %content_type, "synthesized sentence");
        Ok(SynthesizedAudio { bytes, content_type })
    }
}
