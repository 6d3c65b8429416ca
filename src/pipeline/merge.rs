//! Merge of chunk outputs into exactly one finding per paragraph.

use std::collections::HashMap;

use tracing::debug;

use crate::data::{Category, Finding};
use crate::dispatch::ChunkOutput;
use crate::document::{Chunk, Paragraph};

/// Brings a finding in line with the category/commentary rule.
///
/// A `none` finding with commentary becomes `ambiguous`; any other category
/// without commentary gets a generated comment. Afterwards the category is
/// `none` exactly when all four commentary fields are empty.
pub fn normalize_finding(mut finding: Finding) -> Finding {
    for field in [
        &mut finding.comment,
        &mut finding.recommendation,
        &mut finding.improved_clause,
        &mut finding.legal_risk,
    ] {
        let trimmed = field.trim();
        if trimmed.len() != field.len() {
            *field = trimmed.to_string();
        }
    }

    match (finding.category, finding.has_commentary()) {
        (Category::None, true) => finding.category = Category::Ambiguous,
        (Category::None, false) | (_, true) => {}
        (category, false) => finding.comment = generated_comment(category),
    }
    finding
}

fn generated_comment(category: Category) -> String {
    let text = match category {
        Category::Compliant => "Meets a checklist requirement.",
        Category::Partial => "Meets a checklist requirement only in part.",
        Category::Risk => "Contains a listed risk.",
        Category::Ambiguous => "Wording is open to more than one reading.",
        Category::SilenceRisk => "Leaves out a point that needs to be covered.",
        Category::ExternalReference => "Relies on a document or rule outside the contract.",
        Category::None => "",
    };
    text.to_string()
}

/// Builds one finding per paragraph, index-aligned with `paragraphs`.
///
/// A finding is used only if its id names a primary member of the chunk that
/// returned it; the first such finding for a paragraph wins. Paragraphs
/// without a finding default to `none`.
pub fn merge_findings(
    paragraphs: &[Paragraph],
    chunks: &[Chunk],
    outputs: &[ChunkOutput],
) -> Vec<Finding> {
    let positions: HashMap<&str, usize> = paragraphs
        .iter()
        .enumerate()
        .map(|(i, p)| (p.id.as_str(), i))
        .collect();
    let mut slots: Vec<Option<Finding>> = vec![None; paragraphs.len()];
    let mut ignored = 0usize;

    for output in outputs {
        let Some(chunk) = chunks.get(output.chunk_index) else {
            ignored += output.findings.len();
            continue;
        };
        for finding in &output.findings {
            let owned = positions
                .get(finding.paragraph_id.as_str())
                .copied()
                .filter(|position| chunk.owns(*position));
            match owned {
                Some(position) if slots[position].is_none() => {
                    slots[position] = Some(normalize_finding(finding.clone()));
                }
                _ => ignored += 1,
            }
        }
    }

    if ignored > 0 {
        debug!(ignored, "Ignored findings outside their chunk or duplicated");
    }

    paragraphs
        .iter()
        .zip(slots)
        .map(|(paragraph, slot)| slot.unwrap_or_else(|| Finding::none(paragraph.id.clone())))
        .collect()
}
