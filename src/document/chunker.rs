//! Token-bounded grouping of paragraphs into chunks.
//!
//! Paragraphs are accumulated greedily in document order. When the next
//! paragraph would overflow the token ceiling the chunk closes, and the
//! trailing sentences of its last paragraph are echoed at the head of the
//! next chunk as read-only context.

use std::ops::Range;

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::segmenter::Paragraph;
use super::sentences;
use crate::inference::token_budget;

/// Estimated token overhead per paragraph for its `[pN]` label and newline.
const PER_PARAGRAPH_OVERHEAD_TOKENS: usize = 4;

/// Chunk builder limits.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ChunkingConfig {
    /// Estimated primary tokens per chunk.
    pub token_ceiling: usize,
    /// Trailing sentences of a chunk echoed into the next one; 0 disables.
    pub overlap_sentences: usize,
    /// Paragraphs per chunk, bounding the size of each chunk's answer.
    pub max_paragraphs: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            token_ceiling: 4_000,
            overlap_sentences: 2,
            max_paragraphs: 20,
        }
    }
}

/// Trailing context copied from the previous chunk.
///
/// Never classified: it is rendered without a paragraph id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OverlapEcho {
    /// Paragraph the echo was taken from.
    pub source_paragraph_id: String,
    /// Echoed sentences.
    pub text: String,
    /// Estimated tokens of the echo.
    pub estimated_tokens: usize,
}

/// A token-bounded run of paragraphs sent as one inference request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    /// Zero-based chunk position.
    pub index: usize,
    /// Primary members, as a range into the paragraph list.
    pub paragraphs: Range<usize>,
    /// Echo of the previous chunk's tail, if any.
    pub overlap: Option<OverlapEcho>,
    /// Estimated tokens of the primary members.
    pub estimated_tokens: usize,
}

impl Chunk {
    /// Returns the primary member paragraphs.
    pub fn primary<'p>(&self, paragraphs: &'p [Paragraph]) -> &'p [Paragraph] {
        &paragraphs[self.paragraphs.clone()]
    }

    /// Returns true if `ordinal` is a primary member of this chunk.
    pub fn owns(&self, ordinal: usize) -> bool {
        self.paragraphs.contains(&ordinal)
    }

    /// Returns primary plus echo tokens.
    pub fn total_tokens(&self) -> usize {
        self.estimated_tokens + self.overlap.as_ref().map_or(0, |o| o.estimated_tokens)
    }
}

fn paragraph_tokens(paragraph: &Paragraph) -> usize {
    token_budget::estimate_tokens(&paragraph.text) + PER_PARAGRAPH_OVERHEAD_TOKENS
}

fn overlap_echo(paragraph: &Paragraph, sentence_count: usize) -> Option<OverlapEcho> {
    if sentence_count == 0 {
        return None;
    }
    let text = sentences::last_sentences(&paragraph.text, sentence_count).trim();
    if text.is_empty() {
        return None;
    }
    Some(OverlapEcho {
        source_paragraph_id: paragraph.id.clone(),
        text: text.to_string(),
        estimated_tokens: token_budget::estimate_tokens(text),
    })
}

/// Groups paragraphs into chunks.
///
/// Every paragraph is a primary member of exactly one chunk and chunk ranges
/// are contiguous and ascending. A paragraph larger than the ceiling gets a
/// chunk of its own.
#[must_use]
pub fn build_chunks(paragraphs: &[Paragraph], config: &ChunkingConfig) -> Vec<Chunk> {
    let ceiling = config.token_ceiling.max(1);
    let max_paragraphs = config.max_paragraphs.max(1);

    let mut chunks: Vec<Chunk> = Vec::new();
    let mut start = 0;
    let mut tokens = 0;
    let mut echo: Option<OverlapEcho> = None;

    for (i, paragraph) in paragraphs.iter().enumerate() {
        let cost = paragraph_tokens(paragraph);
        let members = i - start;
        if members > 0 && (tokens + cost > ceiling || members >= max_paragraphs) {
            chunks.push(Chunk {
                index: chunks.len(),
                paragraphs: start..i,
                overlap: echo.take(),
                estimated_tokens: tokens,
            });
            echo = overlap_echo(&paragraphs[i - 1], config.overlap_sentences);
            start = i;
            tokens = 0;
        }
        tokens += cost;
    }

    if start < paragraphs.len() {
        chunks.push(Chunk {
            index: chunks.len(),
            paragraphs: start..paragraphs.len(),
            overlap: echo,
            estimated_tokens: tokens,
        });
    }

    debug!(
        paragraphs = paragraphs.len(),
        chunks = chunks.len(),
        token_ceiling = ceiling,
        "Planned chunks"
    );

    chunks
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    fn paragraphs(texts: &[&str]) -> Vec<Paragraph> {
        texts
            .iter()
            .enumerate()
            .map(|(i, t)| Paragraph {
                id: format!("p{}", i + 1),
                text: (*t).to_string(),
                ordinal: i,
            })
            .collect()
    }

    fn uniform(count: usize, chars: usize) -> Vec<Paragraph> {
        let text = format!("{}. Second sentence here.", "a".repeat(chars));
        let texts: Vec<&str> = (0..count).map(|_| text.as_str()).collect();
        paragraphs(&texts)
    }

    #[test]
    fn empty_input_has_no_chunks() {
        assert!(build_chunks(&[], &ChunkingConfig::default()).is_empty());
    }

    #[test]
    fn small_input_is_one_chunk_without_echo() {
        let paras = uniform(3, 50);
        let chunks = build_chunks(&paras, &ChunkingConfig::default());
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].paragraphs, 0..3);
        assert!(chunks[0].overlap.is_none());
    }

    #[test]
    fn paragraph_cap_closes_chunks() {
        let paras = uniform(45, 40);
        let config = ChunkingConfig {
            token_ceiling: 100_000,
            overlap_sentences: 1,
            max_paragraphs: 15,
        };
        let chunks = build_chunks(&paras, &config);
        let ranges: Vec<_> = chunks.iter().map(|c| c.paragraphs.clone()).collect();
        assert_eq!(ranges, vec![0..15, 15..30, 30..45]);
        assert_eq!(chunks[1].overlap.as_ref().unwrap().source_paragraph_id, "p15");
        assert_eq!(
            chunks[1].overlap.as_ref().unwrap().text,
            "Second sentence here."
        );
    }

    #[test]
    fn token_ceiling_closes_chunks() {
        let paras = uniform(10, 300);
        let per = paragraph_tokens(&paras[0]);
        let config = ChunkingConfig {
            token_ceiling: per * 3,
            overlap_sentences: 0,
            max_paragraphs: 100,
        };
        let chunks = build_chunks(&paras, &config);
        assert_eq!(chunks.len(), 4);
        assert!(chunks.iter().all(|c| c.estimated_tokens <= per * 3));
        assert!(chunks.iter().all(|c| c.overlap.is_none()));
    }

    #[test]
    fn oversized_paragraph_is_solo() {
        let big = "word ".repeat(2_000);
        let paras = paragraphs(&["Short clause one.", &big, "Short clause two."]);
        let config = ChunkingConfig {
            token_ceiling: 200,
            overlap_sentences: 0,
            max_paragraphs: 20,
        };
        let chunks = build_chunks(&paras, &config);
        let ranges: Vec<_> = chunks.iter().map(|c| c.paragraphs.clone()).collect();
        assert_eq!(ranges, vec![0..1, 1..2, 2..3]);
        assert!(chunks[1].estimated_tokens > 200);
    }

    #[test]
    fn primary_members_cover_document_in_order() {
        let paras = uniform(37, 120);
        let config = ChunkingConfig {
            token_ceiling: 300,
            overlap_sentences: 2,
            max_paragraphs: 6,
        };
        let chunks = build_chunks(&paras, &config);
        let ids: Vec<&str> = chunks
            .iter()
            .flat_map(|c| c.primary(&paras))
            .map(|p| p.id.as_str())
            .collect();
        let expected: Vec<&str> = paras.iter().map(|p| p.id.as_str()).collect();
        assert_eq!(ids, expected);
        assert!(chunks.iter().enumerate().all(|(i, c)| c.index == i));
        assert!(chunks[1].owns(chunks[1].paragraphs.start));
        assert!(!chunks[1].owns(chunks[0].paragraphs.start));
    }
}
