//! Reply-generation collaborator: request a streamed reply for a user turn.

pub mod consumer;
pub mod sse;

use crate::config::ReplyConfig;
use crate::error::{Result, SpeechError};
use async_trait::async_trait;
use consumer::ByteStream;
use futures_util::StreamExt;
use serde::Serialize;
use std::time::Duration;

/// Content type a successful reply must carry.
pub const EVENT_STREAM_CONTENT_TYPE: &str = "text/event-stream";

/// Opens a streamed reply for a finalized user transcription.
#[async_trait]
pub trait ReplySource: Send + Sync {
    /// Send `query` and return the accepted response body.
    ///
    /// # Errors
    ///
    /// Returns [`SpeechError::Upstream`] on network failure, a non-success
    /// status, a non event-stream content type, or an absent body.
    async fn open(&self, query: &str) -> Result<ByteStream>;
}

/// JSON body sent to the reply service.
#[derive(Debug, Clone, Serialize)]
pub struct ReplyRequest<'a> {
    pub query: &'a str,
    pub inputs: &'a serde_json::Map<String, serde_json::Value>,
    pub user: &'a str,
}

/// [`ReplySource`] backed by an HTTP endpoint.
pub struct HttpReplySource {
    client: reqwest::Client,
    config: ReplyConfig,
}

impl HttpReplySource {
    /// Create a source for the configured endpoint.
    pub fn new(config: ReplyConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            config,
        }
    }

    /// Create a source sharing an existing client.
    pub fn with_client(client: reqwest::Client, config: ReplyConfig) -> Self {
        Self { client, config }
    }
}

#[async_trait]
impl ReplySource for HttpReplySource {
    async fn open(&self, query: &str) -> Result<ByteStream> {
        let body = ReplyRequest {
            query,
            inputs: &self.config.inputs,
            user: &self.config.user,
        };

        let send = self.client.post(&self.config.url).json(&body).send();
        let timeout = Duration::from_secs(self.config.connect_timeout_secs);
        let response = tokio::time::timeout(timeout, send)
            .await
            .map_err(|_| {
                SpeechError::Upstream(format!(
                    "reply service did not answer within {}s",
                    timeout.as_secs()
                ))
            })?
            .map_err(|e| SpeechError::Upstream(format!("reply request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body_text = response.text().await.unwrap_or_default();
            return Err(SpeechError::Upstream(format!(
                "reply service returned {status}: {}",
                extract_error_message(&body_text)
            )));
        }

        let content_type = content_type(response.headers());
        if !content_type.contains(EVENT_STREAM_CONTENT_TYPE) {
            let body_text = response.text().await.unwrap_or_default();
            return Err(SpeechError::Upstream(format!(
                "reply service answered with {} instead of an event stream: {}",
                if content_type.is_empty() { "no content type" } else { content_type.as_str() },
                extract_error_message(&body_text)
            )));
        }

        if response.content_length() == Some(0) {
            return Err(SpeechError::Upstream("reply stream has no body".to_owned()));
        }

        tracing::debug!(url = %self.config.url, "reply stream accepted");
        let bytes = response
            .bytes_stream()
            .map(|chunk| chunk.map_err(|e| SpeechError::Upstream(format!("reply stream read failed: {e}"))));
        Ok(Box::pin(bytes))
    }
}

/// Lower-cased `Content-Type` header, or empty when missing.
pub(crate) fn content_type(headers: &reqwest::header::HeaderMap) -> String {
    headers
        .get(reqwest::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_ascii_lowercase()
}

/// Pull a human-readable message out of an error body.
///
/// Checks `error` (string or `{ message }`) and `detail`, then falls back
/// to the raw text.
pub(crate) fn extract_error_message(body: &str) -> String {
    let parsed = serde_json::from_str::<serde_json::Value>(body).ok();
    let structured = parsed.as_ref().and_then(|v| {
        let error = v.get("error");
        error
            .and_then(serde_json::Value::as_str)
            .or_else(|| error.and_then(|e| e.get("message")).and_then(serde_json::Value::as_str))
            .or_else(|| v.get("detail").and_then(serde_json::Value::as_str))
            .map(str::to_owned)
    });
    match structured {
        Some(message) => message,
        None if body.trim().is_empty() => "<empty body>".to_owned(),
        None => body.trim().to_owned(),
    }
}
