//! Gap detection: checklist requirements satisfied nowhere in the contract.

use std::collections::HashSet;

use tracing::info;

use super::{prompts, request, StageConfig};
use crate::data::schema::GapResponse;
use crate::data::{Category, Finding, MissingRequirement, Perspective};
use crate::dispatch::Dispatcher;
use crate::document::Paragraph;
use crate::error::StageError;
use crate::progress::Stage;

/// Ids and snippets of paragraphs that fully satisfy the checklist.
///
/// Partial matches are left out: a requirement met only in part is still missing.
pub fn covered_paragraphs(
    paragraphs: &[Paragraph],
    findings: &[Finding],
    snippet_chars: usize,
) -> Vec<(String, String)> {
    paragraphs
        .iter()
        .zip(findings)
        .filter(|(_, f)| f.category == Category::Compliant)
        .map(|(p, _)| (p.id.clone(), prompts::snippet(&p.text, snippet_chars)))
        .collect()
}

/// Asks which checklist requirements are missing.
///
/// Without a checklist there is nothing to compare and no call is made.
pub async fn detect_gaps(
    dispatcher: &Dispatcher,
    checklist: &str,
    paragraphs: &[Paragraph],
    findings: &[Finding],
    perspective: Perspective,
    stages: &StageConfig,
) -> Result<Vec<MissingRequirement>, StageError> {
    if checklist.trim().is_empty() {
        return Ok(Vec::new());
    }

    let covered = covered_paragraphs(paragraphs, findings, stages.gap_snippet_chars);
    let prompt = prompts::gap_prompt(checklist, &covered, perspective);
    let response: GapResponse = request(
        dispatcher,
        Stage::GapDetection,
        Stage::GapDetection.key(),
        &prompts::system_prompt(perspective),
        &prompt,
        stages.stage_output_ceiling,
    )
    .await?;

    let mut seen = HashSet::new();
    let missing: Vec<MissingRequirement> = response
        .missing_requirements
        .into_iter()
        .filter(|r| seen.insert(r.requirement.to_lowercase()))
        .take(stages.max_missing_requirements)
        .enumerate()
        .map(|(i, r)| MissingRequirement {
            id: format!("missing_{}", i + 1),
            requirement_text: r.requirement,
            comment: r.comment,
            recommendation: r.recommendation,
        })
        .collect();

    info!(covered = covered.len(), missing = missing.len(), "Gap detection finished");
    Ok(missing)
}
