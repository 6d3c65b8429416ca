//! Property tests for segmentation, chunking and output recovery.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use contract_analyst::data::schema::ChunkResponse;
use contract_analyst::document::{build_chunks, segment, ChunkingConfig, SegmenterConfig};
use contract_analyst::recovery::{recover, Recovery};
use proptest::prelude::*;

fn arb_clause() -> impl Strategy<Value = String> {
    prop_oneof![
        "[A-Za-z ,]{5,80}\\.",
        "[а-яА-Я ,]{5,80}\\.",
        "[0-9]{1,2}\\. [A-Za-z ]{5,60}\\. [A-Za-z ]{5,60}\\.",
        "[A-Z ]{4,30}",
        Just("Статья 5".to_string()),
    ]
}

fn arb_contract() -> impl Strategy<Value = String> {
    prop::collection::vec(
        (arb_clause(), prop_oneof![Just("\n"), Just("\n\n"), Just(" ")]),
        0..40,
    )
    .prop_map(|parts| parts.into_iter().map(|(clause, sep)| clause + sep).collect())
}

fn arb_chunking() -> impl Strategy<Value = ChunkingConfig> {
    (1usize..300, 0usize..3, 1usize..8).prop_map(
        |(token_ceiling, overlap_sentences, max_paragraphs)| ChunkingConfig {
            token_ceiling,
            overlap_sentences,
            max_paragraphs,
        },
    )
}

proptest! {
    #[test]
    fn paragraphs_are_non_empty_and_ordered(text in arb_contract()) {
        let paragraphs = segment(&text, &SegmenterConfig::default());
        for (i, paragraph) in paragraphs.iter().enumerate() {
            prop_assert!(!paragraph.text.trim().is_empty());
            prop_assert_eq!(paragraph.ordinal, i);
            prop_assert_eq!(&paragraph.id, &format!("p{}", i + 1));
        }
    }

    #[test]
    fn arbitrary_text_segments_without_panicking(text in "\\PC{0,600}") {
        let paragraphs = segment(&text, &SegmenterConfig::default());
        prop_assert!(paragraphs.iter().all(|p| !p.text.is_empty()));
    }

    #[test]
    fn chunks_cover_every_paragraph_once(text in arb_contract(), config in arb_chunking()) {
        let paragraphs = segment(&text, &SegmenterConfig::default());
        let chunks = build_chunks(&paragraphs, &config);

        let covered: Vec<&str> = chunks
            .iter()
            .flat_map(|c| c.primary(&paragraphs))
            .map(|p| p.id.as_str())
            .collect();
        let expected: Vec<&str> = paragraphs.iter().map(|p| p.id.as_str()).collect();
        prop_assert_eq!(covered, expected);

        for (i, chunk) in chunks.iter().enumerate() {
            prop_assert_eq!(chunk.index, i);
            prop_assert!(chunk.paragraphs.len() <= config.max_paragraphs);
            prop_assert!(
                chunk.estimated_tokens <= config.token_ceiling || chunk.paragraphs.len() == 1,
                "chunk {} holds {} tokens over a ceiling of {}",
                i,
                chunk.estimated_tokens,
                config.token_ceiling
            );
        }
    }

    #[test]
    fn overlap_echo_comes_from_the_previous_chunk(text in arb_contract(), config in arb_chunking()) {
        let paragraphs = segment(&text, &SegmenterConfig::default());
        let chunks = build_chunks(&paragraphs, &config);

        prop_assert!(chunks.first().map_or(true, |c| c.overlap.is_none()));
        for pair in chunks.windows(2) {
            if let Some(echo) = &pair[1].overlap {
                let source = &paragraphs[pair[0].paragraphs.end - 1];
                prop_assert_eq!(&echo.source_paragraph_id, &source.id);
                prop_assert!(source.text.contains(&echo.text));
            }
        }
    }

    #[test]
    fn recovery_never_panics(raw in "\\PC{0,300}") {
        let _ = recover::<ChunkResponse>(&raw);
    }

    #[test]
    fn truncated_output_recovers_a_prefix(
        count in 1usize..12,
        cut in 0usize..600,
    ) {
        let records: Vec<String> = (1..=count)
            .map(|i| format!(r#"{{"id":"p{i}","category":"risk","comment":"Clause {i} shifts costs"}}"#))
            .collect();
        let full = format!(r#"{{"analysis":[{}]}}"#, records.join(","));
        let truncated: String = full.chars().take(cut).collect();

        match recover::<ChunkResponse>(&truncated) {
            Recovery::Complete { value, .. } | Recovery::Partial { value, .. } => {
                prop_assert!(value.analysis.len() <= count);
                // only the last record may carry a cut-off id
                for (i, finding) in value.analysis.iter().enumerate() {
                    let expected_id = format!("p{}", i + 1);
                    prop_assert!(expected_id.starts_with(&finding.id));
                }
            }
            Recovery::Failed { .. } => {}
        }
    }
}
