//! Line-oriented `data:` frame parser for streamed replies.
//!
//! The reply service sends newline-delimited frames:
//!
//! ```text
//! data: {"answer": "Hel"}
//! data: {"answer": "lo."}
//! : keep-alive
//! data: [DONE]
//! ```
//!
//! Every line is its own frame; there is no blank-line event grouping. Only
//! lines carrying the `data:` marker produce a payload. Bytes are buffered
//! until a full line arrives, so multi-byte characters split across network
//! reads decode intact.
//!
//! # Examples
//!
//! ```
//! use parley::reply::sse::FrameParser;
//!
//! let mut parser = FrameParser::new();
//! assert!(parser.push(b"data: {\"answer\":").is_empty());
//! let frames = parser.push(b" \"hi\"}\n");
//! assert_eq!(frames, vec![r#"{"answer": "hi"}"#.to_owned()]);
//! ```

/// Prefix that marks a line as carrying a payload.
pub const DATA_MARKER: &str = "data:";

/// Incrementally split bytes into trimmed `data:` payloads.
#[derive(Debug, Default)]
pub struct FrameParser {
    line_buffer: Vec<u8>,
}

impl FrameParser {
    /// Create a new incremental frame parser.
    pub fn new() -> Self {
        Self::default()
    }

    /// Push a chunk of bytes into the parser.
    ///
    /// Returns the payloads of every complete `data:` line in this chunk.
    /// A trailing partial line is carried to the next call.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        let mut payloads = Vec::new();
        for &byte in chunk {
            if byte == b'\n' {
                let line = std::mem::take(&mut self.line_buffer);
                if let Some(payload) = parse_line(&line) {
                    payloads.push(payload);
                }
            } else {
                self.line_buffer.push(byte);
            }
        }
        payloads
    }

    /// Parse whatever is left once the stream closes.
    pub fn flush(&mut self) -> Option<String> {
        if self.line_buffer.is_empty() {
            return None;
        }
        let line = std::mem::take(&mut self.line_buffer);
        parse_line(&line)
    }

    /// Whether a partial line is buffered.
    pub fn has_pending(&self) -> bool {
        !self.line_buffer.is_empty()
    }
}

/// Extract the trimmed payload from a single line, if it is a `data:` frame.
fn parse_line(raw: &[u8]) -> Option<String> {
    let line = String::from_utf8_lossy(raw);
    let line = line.strip_suffix('\r').unwrap_or(&line);
    let payload = line.strip_prefix(DATA_MARKER)?.trim();
    if payload.is_empty() {
        return None;
    }
    Some(payload.to_owned())
}
