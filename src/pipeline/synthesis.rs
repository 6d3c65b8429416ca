//! Final synthesis over bounded samples of every earlier stage.

use std::collections::BTreeMap;

use super::{prompts, request, StageConfig};
use crate::data::schema::SynthesisResponse;
use crate::data::{
    Category, Contradiction, Finding, MissingRequirement, Perspective, RightsImbalance,
    StructuralSummary,
};
use crate::dispatch::Dispatcher;
use crate::document::Paragraph;
use crate::error::StageError;
use crate::progress::Stage;

/// Everything the synthesis call sees.
///
/// Each list holds at most `synthesis_top_n` entries of at most
/// `synthesis_snippet_chars` characters, so the payload does not grow with
/// the contract.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SynthesisInput {
    /// Paragraph counts per category label.
    pub category_counts: BTreeMap<String, usize>,
    /// Top risk findings.
    pub risks: Vec<String>,
    /// Top partial or ambiguous findings.
    pub weak_clauses: Vec<String>,
    /// Top missing requirements.
    pub missing: Vec<String>,
    /// Top contradictions.
    pub contradictions: Vec<String>,
    /// Top rights imbalances.
    pub imbalances: Vec<String>,
}

fn finding_line(paragraph: &Paragraph, finding: &Finding, chars: usize) -> String {
    let source = if finding.comment.is_empty() {
        &paragraph.text
    } else {
        &finding.comment
    };
    format!("[{}] {}", paragraph.id, prompts::snippet(source, chars))
}

/// Collects the bounded synthesis samples.
pub fn build_synthesis_input(
    paragraphs: &[Paragraph],
    findings: &[Finding],
    missing: &[MissingRequirement],
    contradictions: &[Contradiction],
    imbalances: &[RightsImbalance],
    stages: &StageConfig,
) -> SynthesisInput {
    let top_n = stages.synthesis_top_n;
    let chars = stages.synthesis_snippet_chars;

    let mut category_counts = BTreeMap::new();
    for finding in findings {
        *category_counts
            .entry(finding.category.to_string())
            .or_insert(0) += 1;
    }

    let pick = |wanted: &[Category]| -> Vec<String> {
        paragraphs
            .iter()
            .zip(findings)
            .filter(|(_, f)| wanted.contains(&f.category))
            .take(top_n)
            .map(|(p, f)| finding_line(p, f, chars))
            .collect()
    };

    SynthesisInput {
        category_counts,
        risks: pick(&[Category::Risk]),
        weak_clauses: pick(&[Category::Partial, Category::Ambiguous]),
        missing: missing
            .iter()
            .take(top_n)
            .map(|m| prompts::snippet(&format!("{}: {}", m.requirement_text, m.comment), chars))
            .collect(),
        contradictions: contradictions
            .iter()
            .take(top_n)
            .map(|c| {
                prompts::snippet(
                    &format!(
                        "{} vs {} ({} / {}): {}",
                        c.first.value,
                        c.second.value,
                        c.first.paragraph_id,
                        c.second.paragraph_id,
                        c.description
                    ),
                    chars,
                )
            })
            .collect(),
        imbalances: imbalances
            .iter()
            .take(top_n)
            .map(|i| {
                prompts::snippet(
                    &format!(
                        "{} (buyer {} / supplier {}): {}",
                        i.kind.as_str(),
                        i.buyer_right_count,
                        i.supplier_right_count,
                        i.description
                    ),
                    chars,
                )
            })
            .collect(),
    }
}

/// Produces the structural summary.
pub async fn synthesize(
    dispatcher: &Dispatcher,
    input: &SynthesisInput,
    perspective: Perspective,
    stages: &StageConfig,
) -> Result<StructuralSummary, StageError> {
    let response: SynthesisResponse = request(
        dispatcher,
        Stage::Synthesis,
        Stage::Synthesis.key(),
        &prompts::system_prompt(perspective),
        &prompts::synthesis_prompt(input, perspective),
        stages.stage_output_ceiling,
    )
    .await?;
    Ok(response.into_summary())
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    fn risky_contract(n: usize) -> (Vec<Paragraph>, Vec<Finding>) {
        let paragraphs: Vec<Paragraph> = (0..n)
            .map(|i| Paragraph {
                id: format!("p{}", i + 1),
                text: "The Supplier may change the price unilaterally at any time.".into(),
                ordinal: i,
            })
            .collect();
        let findings = paragraphs
            .iter()
            .map(|p| Finding {
                category: Category::Risk,
                comment: "Unilateral price change without notice or cap on the increase amount for the Buyer."
                    .into(),
                ..Finding::none(p.id.clone())
            })
            .collect();
        (paragraphs, findings)
    }

    #[test]
    fn payload_size_does_not_grow_with_findings() {
        let stages = StageConfig {
            synthesis_top_n: 5,
            synthesis_snippet_chars: 40,
            ..StageConfig::default()
        };
        let render = |n: usize| {
            let (paragraphs, findings) = risky_contract(n);
            let input = build_synthesis_input(&paragraphs, &findings, &[], &[], &[], &stages);
            assert_eq!(input.risks.len(), 5);
            prompts::synthesis_prompt(&input, Perspective::Buyer)
        };
        assert_eq!(render(100).len(), render(200).len());
    }

    #[test]
    fn lines_are_truncated() {
        let stages = StageConfig {
            synthesis_top_n: 2,
            synthesis_snippet_chars: 10,
            ..StageConfig::default()
        };
        let (paragraphs, findings) = risky_contract(3);
        let input = build_synthesis_input(&paragraphs, &findings, &[], &[], &[], &stages);
        assert_eq!(input.risks, vec!["[p1] Unilateral…", "[p2] Unilateral…"]);
        assert_eq!(input.category_counts.get("risk"), Some(&3));
        assert!(input.weak_clauses.is_empty());
    }
}
