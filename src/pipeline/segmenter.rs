//! Sentence segmentation for streamed reply text.
//!
//! [`segment`] is pure: it never holds state between calls. The caller keeps
//! the returned remainder and prepends it to the next chunk.

/// Sentence-terminating punctuation, ASCII and full-width.
pub const TERMINATORS: [char; 6] = ['.', '!', '?', '。', '！', '？'];

/// Whether `c` ends a sentence.
#[must_use]
pub fn is_terminator(c: char) -> bool {
    TERMINATORS.contains(&c)
}

/// Result of splitting a buffer into complete sentences.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Segmented {
    /// Complete, trimmed, speakable sentences in text order.
    pub sentences: Vec<String>,
    /// Trailing fragment with no terminator yet, untrimmed.
    pub remainder: String,
}

/// Split `buffer` after every run of terminal punctuation.
///
/// A run such as `...` or `?!` counts as one boundary, so ellipses stay
/// attached to their sentence. Fragments with no alphanumeric content
/// (stray punctuation, whitespace) are dropped.
#[must_use]
pub fn segment(buffer: &str) -> Segmented {
    let mut sentences = Vec::new();
    let mut start = 0;
    let mut chars = buffer.char_indices().peekable();

    while let Some((i, c)) = chars.next() {
        if !is_terminator(c) {
            continue;
        }
        if let Some(&(_, next)) = chars.peek()
            && is_terminator(next)
        {
            continue;
        }
        let end = i + c.len_utf8();
        let sentence = buffer[start..end].trim();
        if is_speakable(sentence) {
            sentences.push(sentence.to_owned());
        }
        start = end;
    }

    Segmented {
        sentences,
        remainder: buffer[start..].to_owned(),
    }
}

/// Whether a fragment carries anything worth speaking.
#[must_use]
pub fn is_speakable(fragment: &str) -> bool {
    fragment.chars().any(char::is_alphanumeric)
}
