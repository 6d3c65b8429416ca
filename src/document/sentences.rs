//! Sentence boundary detection shared by the segmenter and chunk builder.
//!
//! The rules are deliberately coarse: a sentence ends at `.`, `!`, `?` or `…`
//! followed by whitespace, unless the token before the terminator is a bare
//! clause number such as `3.` or `4.1.`.

/// Characters that may end a sentence.
const TERMINATORS: &[char] = &['.', '!', '?', '…'];

/// Returns the byte offsets at which a new sentence may begin.
///
/// Each offset points just past a terminator and its trailing whitespace is
/// not included. The end of the text is never reported as a boundary.
pub(crate) fn sentence_boundaries(text: &str) -> Vec<usize> {
    let mut boundaries = Vec::new();
    let mut chars = text.char_indices().peekable();

    while let Some((idx, ch)) = chars.next() {
        if !TERMINATORS.contains(&ch) {
            continue;
        }
        let Some(&(_, next)) = chars.peek() else {
            break;
        };
        if !next.is_whitespace() {
            continue;
        }
        if is_clause_number(token_before(text, idx)) {
            continue;
        }
        boundaries.push(idx + ch.len_utf8());
    }

    boundaries
}

/// Splits text into trimmed, non-empty sentences.
pub fn split_sentences(text: &str) -> Vec<&str> {
    let text = text.trim_end();
    let mut sentences = Vec::new();
    let mut start = 0;

    for boundary in sentence_boundaries(text) {
        let sentence = text[start..boundary].trim();
        if !sentence.is_empty() {
            sentences.push(sentence);
        }
        start = boundary;
    }

    let tail = text[start..].trim();
    if !tail.is_empty() {
        sentences.push(tail);
    }

    sentences
}

/// Returns the trailing `count` sentences of `text` as one slice.
///
/// Returns the whole (trimmed) text when it has `count` sentences or fewer,
/// and an empty string when `count` is zero.
pub fn last_sentences(text: &str, count: usize) -> &str {
    if count == 0 {
        return "";
    }
    let text = text.trim_end();
    let boundaries = sentence_boundaries(text);
    if count > boundaries.len() {
        return text.trim_start();
    }
    text[boundaries[boundaries.len() - count]..].trim()
}

/// Returns the sentence boundary closest to `target`, if there is one.
pub(crate) fn nearest_boundary(text: &str, target: usize) -> Option<usize> {
    sentence_boundaries(text)
        .into_iter()
        .filter(|&b| b > 0 && b < text.len())
        .min_by_key(|&b| b.abs_diff(target))
}

/// Returns the whitespace-delimited token that ends at byte `end`.
fn token_before(text: &str, end: usize) -> &str {
    let head = &text[..end];
    let start = head
        .char_indices()
        .rev()
        .find(|(_, c)| c.is_whitespace())
        .map_or(0, |(pos, c)| pos + c.len_utf8());
    &head[start..]
}

fn is_clause_number(token: &str) -> bool {
    !token.is_empty() && token.chars().all(|c| c.is_ascii_digit() || c == '.')
}
