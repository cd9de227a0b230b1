//! Turn a reply byte stream into text deltas and speakable sentences.
//!
//! [`consume`] is the lazy half: bytes in, deltas out, one frame at a time.
//! [`StreamConsumer`] is the accumulating half: it owns the text buffer that
//! carries partial sentences between deltas.

use crate::error::Result;
use crate::pipeline::segmenter::segment;
use crate::reply::sse::FrameParser;
use bytes::Bytes;
use futures_util::{Stream, StreamExt};
use std::collections::VecDeque;
use std::pin::Pin;

/// Raw reply body as delivered by the transport.
pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Bytes>> + Send>>;

/// Text deltas extracted from the reply, in arrival order.
///
/// Finite and not restartable. A read failure is yielded once as `Err`,
/// after which the stream ends.
pub type DeltaStream = Pin<Box<dyn Stream<Item = Result<String>> + Send>>;

/// Sentinel payload marking the end of a reply.
pub const DONE_SENTINEL: &str = "[DONE]";

/// A frame payload after the structured decode attempt.
#[derive(Debug, Clone, PartialEq)]
pub enum FramePayload {
    /// The explicit end-of-reply marker.
    Done,
    /// Payload decoded as JSON.
    Structured(serde_json::Value),
    /// Payload that is not JSON, passed through as text.
    Raw(String),
}

/// Decode one trimmed payload, falling back to raw text.
#[must_use]
pub fn decode_payload(payload: &str) -> FramePayload {
    if payload == DONE_SENTINEL {
        return FramePayload::Done;
    }
    match serde_json::from_str::<serde_json::Value>(payload) {
        Ok(value) => FramePayload::Structured(value),
        Err(_) => FramePayload::Raw(payload.to_owned()),
    }
}

/// Probe the known delta locations: `answer`, `data.answer`, then `text`.
///
/// The first string found wins. Anything else yields an empty delta.
#[must_use]
pub fn extract_delta(value: &serde_json::Value) -> String {
    let probes = [
        value.get("answer"),
        value.get("data").and_then(|d| d.get("answer")),
        value.get("text"),
    ];
    probes
        .into_iter()
        .flatten()
        .find_map(serde_json::Value::as_str)
        .unwrap_or_default()
        .to_owned()
}

/// Lazily decode `bytes` into non-empty text deltas.
///
/// Stops at the `[DONE]` marker or when the body closes, whichever is first.
pub fn consume(bytes: ByteStream) -> DeltaStream {
    let stream = futures_util::stream::unfold(
        ConsumeState {
            bytes,
            parser: FrameParser::new(),
            pending: VecDeque::new(),
            finished: false,
        },
        |mut state| async move {
            loop {
                if let Some(delta) = state.pending.pop_front() {
                    return Some((Ok(delta), state));
                }
                if state.finished {
                    return None;
                }

                match state.bytes.next().await {
                    Some(Ok(chunk)) => {
                        let payloads = state.parser.push(&chunk);
                        state.absorb(payloads);
                    }
                    Some(Err(e)) => {
                        state.finished = true;
                        state.pending.clear();
                        return Some((Err(e), state));
                    }
                    None => {
                        let tail = state.parser.flush();
                        state.absorb(tail);
                        state.finished = true;
                    }
                }
            }
        },
    );
    Box::pin(stream)
}

struct ConsumeState {
    bytes: ByteStream,
    parser: FrameParser,
    pending: VecDeque<String>,
    finished: bool,
}

impl ConsumeState {
    fn absorb(&mut self, payloads: impl IntoIterator<Item = String>) {
        for payload in payloads {
            if self.finished {
                return;
            }
            match decode_payload(&payload) {
                FramePayload::Done => {
                    tracing::debug!("reply stream sent end marker");
                    self.finished = true;
                }
                FramePayload::Structured(value) => {
                    let delta = extract_delta(&value);
                    if !delta.is_empty() {
                        self.pending.push_back(delta);
                    }
                }
                FramePayload::Raw(text) => {
                    tracing::debug!(payload = %text, "non-JSON frame; using raw text");
                    self.pending.push_back(text);
                }
            }
        }
    }
}

/// Accumulates deltas and releases complete sentences.
#[derive(Debug, Default)]
pub struct StreamConsumer {
    buffer: String,
    sentences_emitted: usize,
}

impl StreamConsumer {
    /// Create an empty consumer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a delta and return every sentence it completes, in order.
    pub fn push_delta(&mut self, delta: &str) -> Vec<String> {
        if delta.is_empty() {
            return Vec::new();
        }
        self.buffer.push_str(delta);
        let segmented = segment(&self.buffer);
        self.buffer = segmented.remainder;
        self.sentences_emitted += segmented.sentences.len();
        segmented.sentences
    }

    /// Flush the unterminated tail once the stream has ended.
    pub fn finish(&mut self) -> Option<String> {
        let tail = std::mem::take(&mut self.buffer);
        let tail = tail.trim();
        if tail.is_empty() {
            return None;
        }
        self.sentences_emitted += 1;
        Some(tail.to_owned())
    }

    /// Drop buffered text at the start of a turn or on interruption.
    pub fn reset(&mut self) {
        self.buffer.clear();
        self.sentences_emitted = 0;
    }

    /// Text received but not yet released as a sentence.
    pub fn pending_text(&self) -> &str {
        &self.buffer
    }

    /// Sentences released since the last reset.
    pub fn sentences_emitted(&self) -> usize {
        self.sentences_emitted
    }
}

/// Wrap a fixed list of chunks as a [`ByteStream`].
pub fn byte_stream_from_chunks<I>(chunks: I) -> ByteStream
where
    I: IntoIterator<Item = Result<Bytes>>,
    I::IntoIter: Send + 'static,
{
    Box::pin(futures_util::stream::iter(chunks))
}
