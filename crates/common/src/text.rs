// Character-oriented text helpers for chapter buffers.
//
// Chapters are mostly CJK prose, so all offsets and lengths exposed here are
// in Unicode scalar values, never bytes.

use std::ops::Range;

/// Number of characters in `text`.
pub fn char_count(text: &str) -> usize {
    text.chars().count()
}

/// The last `max_chars` characters of `text`.
pub fn trailing_window(text: &str, max_chars: usize) -> &str {
    if max_chars == 0 {
        return "";
    }
    match text.char_indices().rev().nth(max_chars - 1) {
        Some((start, _)) => &text[start..],
        None => text,
    }
}

/// Replace the first verbatim occurrence of `original` with `replacement`.
///
/// Returns `None` when `original` is empty or does not occur in `text`.
pub fn replace_first(text: &str, original: &str, replacement: &str) -> Option<String> {
    if original.is_empty() {
        return None;
    }
    let start = text.find(original)?;
    let end = start + original.len();
    let mut out = String::with_capacity(text.len() - original.len() + replacement.len());
    out.push_str(&text[..start]);
    out.push_str(replacement);
    out.push_str(&text[end..]);
    Some(out)
}

/// Convert a character range into a byte range of `text`.
///
/// Returns `None` when the range is inverted or extends past the end.
pub fn char_range_to_bytes(text: &str, range: Range<usize>) -> Option<Range<usize>> {
    if range.start > range.end {
        return None;
    }
    let mut start = None;
    let mut end = None;
    for (position, (byte, _)) in text.char_indices().enumerate() {
        if position == range.start {
            start = Some(byte);
        }
        if position == range.end {
            end = Some(byte);
            break;
        }
    }
    let total = char_count(text);
    if range.start == total {
        start = Some(text.len());
    }
    if range.end == total {
        end = Some(text.len());
    }
    Some(start?..end?)
}

/// Characters of `text` within `range`, or `None` if the range is invalid.
pub fn char_slice(text: &str, range: Range<usize>) -> Option<&str> {
    char_range_to_bytes(text, range).map(|bytes| &text[bytes])
}

/// Replace the characters within `range` with `replacement`.
pub fn splice_chars(text: &str, range: Range<usize>, replacement: &str) -> Option<String> {
    let bytes = char_range_to_bytes(text, range)?;
    let mut out = String::with_capacity(text.len() + replacement.len());
    out.push_str(&text[..bytes.start]);
    out.push_str(replacement);
    out.push_str(&text[bytes.end..]);
    Some(out)
}

/// Whether generated text appended to `text` needs a newline separator first.
pub fn needs_line_break(text: &str) -> bool {
    !text.is_empty() && !text.ends_with('\n')
}
