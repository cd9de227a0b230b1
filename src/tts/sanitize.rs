//! Text cleanup before a sentence is sent for synthesis.
//!
//! Emoji and markdown symbols either read out literally or make synthesis
//! engines reject the request, so they are stripped first.

/// Emoji and pictograph ranges removed outright.
const EMOJI_RANGES: &[(char, char)] = &[
    ('\u{1F1E6}', '\u{1F1FF}'), // regional indicators (flags)
    ('\u{1F300}', '\u{1F5FF}'), // symbols and pictographs
    ('\u{1F600}', '\u{1F64F}'), // emoticons
    ('\u{1F680}', '\u{1F6FF}'), // transport and map
    ('\u{1F700}', '\u{1F77F}'), // alchemical
    ('\u{1F780}', '\u{1F7FF}'), // geometric shapes extended
    ('\u{1F800}', '\u{1F8FF}'), // supplemental arrows
    ('\u{1F900}', '\u{1F9FF}'), // supplemental symbols and pictographs
    ('\u{1FA70}', '\u{1FAFF}'), // symbols and pictographs extended-A
    ('\u{2600}', '\u{26FF}'),   // miscellaneous symbols
    ('\u{2700}', '\u{27BF}'),   // dingbats
];

/// Standalone joiners and modifiers that only make sense next to emoji.
const EMOJI_MODIFIERS: &[char] = &['\u{FE0E}', '\u{FE0F}', '\u{200D}'];

/// Markup symbols replaced (as a run) by a single space.
const MARKUP_SYMBOLS: &[char] = &['*', '`', '_', '#', '>', '[', ']'];

fn is_emoji(c: char) -> bool {
    // Skin tone modifiers sit inside the pictograph block already.
    EMOJI_RANGES.iter().any(|&(lo, hi)| (lo..=hi).contains(&c)) || EMOJI_MODIFIERS.contains(&c)
}

/// Strip emoji, replace markup runs with a space, collapse whitespace runs, trim.
///
/// Returns an empty string when nothing speakable is left.
#[must_use]
pub fn sanitize_for_speech(text: &str) -> String {
    let mut stripped = String::with_capacity(text.len());
    let mut in_markup = false;
    for c in text.chars() {
        if is_emoji(c) {
            continue;
        }
        if MARKUP_SYMBOLS.contains(&c) {
            if !in_markup {
                stripped.push(' ');
                in_markup = true;
            }
            continue;
        }
        in_markup = false;
        stripped.push(c);
    }

    let mut out = String::with_capacity(stripped.len());
    let mut chars = stripped.chars().peekable();
    while let Some(c) = chars.next() {
        if c.is_whitespace() && chars.peek().is_some_and(|n| n.is_whitespace()) {
            while chars.peek().is_some_and(|n| n.is_whitespace()) {
                chars.next();
            }
            out.push(' ');
        } else {
            out.push(c);
        }
    }
    out.trim().to_owned()
}
