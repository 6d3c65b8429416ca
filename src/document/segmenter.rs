//! Contract text segmentation into content-bearing paragraphs.

use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::sentences;

/// Longest line (in characters) still treated as a heading.
const MAX_HEADING_CHARS: usize = 80;

/// Most words a heading may have; longer caps lines are clauses.
const MAX_HEADING_WORDS: usize = 8;

/// A numbered clause: `1.`, `2.3.`, `5)` or a dotted number such as `4.1.2 `.
static CLAUSE_START: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(?:\d+(?:\.\d+)*[.)]|\d+(?:\.\d+)+\s)").unwrap());

/// An article or section heading in English or Russian.
static SECTION_START: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^(?:article|section|clause|статья|раздел|пункт)\s+\d+").unwrap()
});

/// Leading clause numbering, stripped before heading detection.
static NUMBERING_PREFIX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[\d.)\s]+").unwrap());

/// Lines made of numbering and punctuation only.
static NUMBER_ONLY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[\d\s.,:;)(\-–—№#]*$").unwrap());

/// Segmenter thresholds.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct SegmenterConfig {
    /// Paragraphs with fewer characters are discarded.
    pub min_paragraph_chars: usize,
    /// Paragraphs with more characters are split at a sentence boundary.
    pub max_paragraph_chars: usize,
}

impl Default for SegmenterConfig {
    fn default() -> Self {
        Self {
            min_paragraph_chars: 10,
            max_paragraph_chars: 2_000,
        }
    }
}

/// One content-bearing paragraph of the contract.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Paragraph {
    /// Identifier used in prompts and findings (`p1`, `p2`, ...).
    pub id: String,
    /// Paragraph text with internal line breaks collapsed to spaces.
    pub text: String,
    /// Zero-based position in document order.
    pub ordinal: usize,
}

/// Splits raw contract text into ordered paragraphs.
///
/// A numbered clause, an article heading or a short all-caps heading starts
/// a new paragraph and a blank line ends one. Headings, number-only lines and
/// fragments shorter than [`SegmenterConfig::min_paragraph_chars`] are
/// dropped; overlong paragraphs are split near their middle.
pub fn segment(text: &str, config: &SegmenterConfig) -> Vec<Paragraph> {
    let mut blocks = Vec::new();
    let mut current = String::new();

    for line in text.lines() {
        let line = line.trim();
        if line.is_empty() {
            flush(&mut blocks, &mut current);
            continue;
        }
        if is_caps_heading(line) {
            flush(&mut blocks, &mut current);
            blocks.push(line.to_string());
            continue;
        }
        if CLAUSE_START.is_match(line) || SECTION_START.is_match(line) {
            flush(&mut blocks, &mut current);
        }
        if !current.is_empty() {
            current.push(' ');
        }
        current.push_str(line);
    }
    flush(&mut blocks, &mut current);

    let block_count = blocks.len();
    let max_chars = config.max_paragraph_chars.max(1);
    let mut texts = Vec::new();
    for block in blocks.iter().filter(|b| is_content(b, config)) {
        split_long(block, max_chars, &mut texts);
    }

    debug!(
        blocks = block_count,
        paragraphs = texts.len(),
        "Segmented contract text"
    );

    texts
        .into_iter()
        .enumerate()
        .map(|(ordinal, text)| Paragraph {
            id: format!("p{}", ordinal + 1),
            text,
            ordinal,
        })
        .collect()
}

fn flush(blocks: &mut Vec<String>, current: &mut String) {
    if !current.is_empty() {
        blocks.push(std::mem::take(current));
    }
}

fn is_content(block: &str, config: &SegmenterConfig) -> bool {
    if block.chars().count() < config.min_paragraph_chars {
        return false;
    }
    if NUMBER_ONLY.is_match(block) {
        return false;
    }
    let without_number = NUMBERING_PREFIX.replace(block, "");
    !is_caps_heading(without_number.trim())
}

/// Returns true for a short line whose letters are all upper case.
///
/// A caps line ending in sentence punctuation or longer than
/// [`MAX_HEADING_WORDS`] words is a clause written in capitals.
fn is_caps_heading(line: &str) -> bool {
    if line.chars().count() > MAX_HEADING_CHARS
        || line.ends_with(['.', ';', ':', '!', '?'])
        || line.split_whitespace().count() > MAX_HEADING_WORDS
    {
        return false;
    }
    let mut letters = 0;
    for c in line.chars().filter(|c| c.is_alphabetic()) {
        if c.is_lowercase() {
            return false;
        }
        letters += 1;
    }
    letters >= 2
}

/// Splits `text` until every piece is at most `max_chars` characters.
///
/// Prefers the sentence boundary nearest the middle, then the nearest
/// whitespace, then a plain character boundary.
fn split_long(text: &str, max_chars: usize, out: &mut Vec<String>) {
    if text.chars().count() <= max_chars {
        out.push(text.to_string());
        return;
    }

    let mid = text.len() / 2;
    let split_at = sentences::nearest_boundary(text, mid)
        .or_else(|| nearest_whitespace(text, mid))
        .unwrap_or_else(|| floor_char_boundary(text, mid));

    let (left, right) = text.split_at(split_at);
    let (left, right) = (left.trim(), right.trim());
    if left.is_empty() || right.is_empty() {
        out.push(text.to_string());
        return;
    }

    split_long(left, max_chars, out);
    split_long(right, max_chars, out);
}

fn nearest_whitespace(text: &str, target: usize) -> Option<usize> {
    text.char_indices()
        .filter(|&(pos, c)| pos > 0 && c.is_whitespace())
        .map(|(pos, _)| pos)
        .min_by_key(|pos| pos.abs_diff(target))
}

fn floor_char_boundary(text: &str, target: usize) -> usize {
    (0..=target.min(text.len()))
        .rev()
        .find(|&i| text.is_char_boundary(i))
        .unwrap_or(0)
}
