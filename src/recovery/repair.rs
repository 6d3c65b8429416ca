//! Text transformations used by the recovery parser.
//!
//! Every function here is total: it accepts any input and returns a value.
//! Byte offsets are only ever taken at ASCII structural characters, so
//! slicing never lands inside a multi-byte character.

use std::borrow::Cow;
use std::sync::LazyLock;

use regex::Regex;
use serde_json::Value;

/// Maximum number of cut-back rounds when discarding a truncated member.
const MAX_CUT_ROUNDS: usize = 16;

/// A fenced block, terminated or running to the end of the text.
static FENCE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)```[A-Za-z0-9_-]*[ \t]*\n?(.*?)(?:```|$)").unwrap());

/// A comma directly followed by a closer.
static TRAILING_COMMA: LazyLock<Regex> = LazyLock::new(|| Regex::new(r",(\s*[}\]])").unwrap());

/// A flat object with no nested objects.
static FLAT_OBJECT: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\{[^{}]*\}").unwrap());

/// Returns the contents of the first code fence, or the text unchanged.
pub(crate) fn strip_fences(text: &str) -> Cow<'_, str> {
    match FENCE.captures(text).and_then(|c| c.get(1)) {
        Some(inner) => Cow::Borrowed(inner.as_str().trim()),
        None => Cow::Borrowed(text),
    }
}

/// Replaces control and exotic whitespace characters with plain spaces.
///
/// Raw newlines and tabs are invalid inside JSON strings and harmless
/// outside them, so they are flattened as well. Byte-order marks and
/// zero-width characters are removed.
pub(crate) fn normalize(text: &str) -> String {
    text.chars()
        .filter(|c| !matches!(c, '\u{feff}' | '\u{200b}' | '\u{200c}' | '\u{200d}'))
        .map(|c| match c {
            '\u{00a0}' | '\u{2028}' | '\u{2029}' | '\u{202f}' => ' ',
            c if c.is_control() => ' ',
            c => c,
        })
        .collect()
}

/// Returns true if the text opens with a bracket that its last character closes.
pub(crate) fn has_matching_outer_brackets(text: &str) -> bool {
    matches!(
        (text.chars().next(), text.chars().last()),
        (Some('{'), Some('}')) | (Some('['), Some(']'))
    )
}

/// Removes commas that directly precede a closer.
pub(crate) fn strip_trailing_commas(text: &str) -> String {
    TRAILING_COMMA.replace_all(text, "$1").into_owned()
}

/// Structural scan of a JSON-like text.
struct Scan {
    /// Expected closers, innermost last.
    closers: Vec<char>,
    /// The text ends inside a string literal.
    in_string: bool,
    /// The text ends right after a backslash inside a string.
    pending_escape: bool,
    /// Byte offsets of commas outside strings.
    commas: Vec<usize>,
    /// Byte offset just past the closer of the top-level value, if it closed.
    end: Option<usize>,
}

fn scan(text: &str) -> Scan {
    let mut closers = Vec::new();
    let mut in_string = false;
    let mut escape = false;
    let mut commas = Vec::new();

    for (idx, ch) in text.char_indices() {
        if in_string {
            match (escape, ch) {
                (true, _) => escape = false,
                (false, '\\') => escape = true,
                (false, '"') => in_string = false,
                _ => {}
            }
            continue;
        }
        match ch {
            '"' => in_string = true,
            '{' => closers.push('}'),
            '[' => closers.push(']'),
            '}' | ']' => {
                closers.pop();
                if closers.is_empty() {
                    return Scan {
                        closers,
                        in_string,
                        pending_escape: false,
                        commas,
                        end: Some(idx + 1),
                    };
                }
            }
            ',' => commas.push(idx),
            _ => {}
        }
    }

    Scan {
        closers,
        in_string,
        pending_escape: escape,
        commas,
        end: None,
    }
}

/// Closes an open string, then every open container, and tidies commas.
fn close(body: &str) -> String {
    let state = scan(body);
    let mut out = body.to_string();

    if state.in_string {
        if state.pending_escape {
            out.pop();
        }
        out.push('"');
    }

    let trimmed_len = out.trim_end().len();
    out.truncate(trimmed_len);
    if out.ends_with(':') {
        out.push_str("null");
    }
    if out.ends_with(',') {
        out.pop();
    }

    for closer in state.closers.iter().rev() {
        out.push(*closer);
    }
    strip_trailing_commas(&out)
}

/// Produces repair candidates for text that is not a bracketed value.
///
/// The first candidate cuts leading prose and anything after the top-level
/// value, or, when the value never closes, closes it in place. Later
/// candidates step back to successively earlier commas so a truncated last
/// member is discarded.
pub(crate) fn repair_candidates(text: &str) -> Vec<String> {
    let Some(start) = text.find(['{', '[']) else {
        return Vec::new();
    };
    let body = &text[start..];
    let state = scan(body);

    if let Some(end) = state.end {
        return vec![strip_trailing_commas(&body[..end])];
    }

    let mut candidates = vec![close(body)];
    for &comma in state.commas.iter().rev().take(MAX_CUT_ROUNDS) {
        candidates.push(close(&body[..comma]));
    }
    candidates
}

/// Extracts flat objects carrying every key in `keys`.
pub(crate) fn extract_fragments(text: &str, keys: &[&str]) -> Vec<Value> {
    FLAT_OBJECT
        .find_iter(text)
        .filter_map(|m| {
            let candidate = m.as_str();
            serde_json::from_str::<Value>(candidate)
                .or_else(|_| serde_json::from_str::<Value>(&strip_trailing_commas(candidate)))
                .ok()
        })
        .filter(|value| {
            value
                .as_object()
                .is_some_and(|obj| keys.iter().all(|k| obj.contains_key(*k)))
        })
        .collect()
}
