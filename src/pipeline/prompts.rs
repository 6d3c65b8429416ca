//! Prompt templates for every inference call type.

use crate::data::Perspective;
use crate::document::{Chunk, Paragraph};

use super::contradictions::CandidatePair;
use super::synthesis::SynthesisInput;

/// Shared system instruction; `{party}` is replaced by the protected party.
const SYSTEM_PROMPT: &str = r#"You are a senior contract lawyer reviewing a supply agreement on behalf of the {party}.
Protect the interests of the {party}. Be concise and concrete.
Answer in the language the contract is written in.
Respond with a single JSON object and nothing else: no markdown fences, no commentary."#;

const CATEGORY_GUIDE: &str = r#"CATEGORIES:
- "compliant": fully meets a checklist requirement
- "partial": meets a checklist requirement only in part
- "risk": contains a condition from the risk list
- "ambiguous": vague wording without concrete criteria ("in a timely manner", "at its discretion", "reasonable time", "other expenses", "as agreed")
- "silence-risk": the paragraph leaves out something the {party} needs covered
- "external-reference": defers to another document, annex or rule whose content is not given
- null: nothing to report"#;

const CHUNK_FORMAT: &str = r#"REQUIRED JSON:
{
  "analysis": [
    {"id": "p1", "category": "risk", "comment": "short assessment", "recommendation": "short recommendation", "improvedClause": "improved wording", "legalRisk": "legal consequence"},
    {"id": "p2", "category": null, "comment": null, "recommendation": null, "improvedClause": null, "legalRisk": null}
  ]
}

RULES:
- Return exactly one entry for every labelled paragraph, using its label as "id".
- For category null every other field must be null.
- Text under CONTEXT FROM THE PREVIOUS SECTION is for reference only: never return an entry for it.
- Keep every field short."#;

/// System instruction for any call, steered by `perspective`.
pub fn system_prompt(perspective: Perspective) -> String {
    SYSTEM_PROMPT.replace("{party}", perspective.party())
}

fn or_placeholder(text: &str) -> &str {
    let text = text.trim();
    if text.is_empty() {
        "(none provided)"
    } else {
        text
    }
}

/// Shortens `text` to at most `max_chars` characters, marking the cut with `…`.
pub fn snippet(text: &str, max_chars: usize) -> String {
    let text = text.trim();
    match text.char_indices().nth(max_chars) {
        Some((end, _)) => format!("{}…", text[..end].trim_end()),
        None => text.to_string(),
    }
}

/// Classification prompt for one chunk.
///
/// Primary members are labelled with their ids; the overlap echo is shown
/// without any id.
pub fn chunk_prompt(
    chunk: &Chunk,
    paragraphs: &[Paragraph],
    checklist: &str,
    risks: &str,
    perspective: Perspective,
) -> String {
    let party = perspective.party();
    let mut prompt = String::new();

    prompt.push_str(&format!("Classify every labelled paragraph of this contract section from the {party}'s point of view.\n\n"));
    prompt.push_str(&format!("CHECKLIST OF {party} REQUIREMENTS:\n{}\n\n", or_placeholder(checklist)));
    prompt.push_str(&format!("RISKS FOR THE {party}:\n{}\n\n", or_placeholder(risks)));
    prompt.push_str(&format!("{}\n\n", CATEGORY_GUIDE.replace("{party}", party)));

    if let Some(echo) = &chunk.overlap {
        prompt.push_str(&format!(
            "CONTEXT FROM THE PREVIOUS SECTION (do not classify):\n{}\n\n",
            echo.text
        ));
    }

    prompt.push_str("PARAGRAPHS:\n");
    for paragraph in chunk.primary(paragraphs) {
        prompt.push_str(&format!("[{}] {}\n", paragraph.id, paragraph.text));
    }
    prompt.push_str(&format!("\n{CHUNK_FORMAT}"));
    prompt
}

/// Gap detection prompt: which checklist items are satisfied nowhere.
pub fn gap_prompt(checklist: &str, covered: &[(String, String)], perspective: Perspective) -> String {
    let party = perspective.party();
    let mut prompt = String::new();
    prompt.push_str(&format!("Compare the {party}'s checklist with the contract paragraphs that were found to satisfy it in full. \
         List every checklist requirement that no paragraph satisfies in full, including requirements met only in part.\n\n"));
    prompt.push_str(&format!("CHECKLIST:\n{}\n\n", checklist.trim()));
    prompt.push_str("PARAGRAPHS FULLY SATISFYING THE CHECKLIST:\n");
    if covered.is_empty() {
        prompt.push_str("(none)\n");
    }
    for (id, text) in covered {
        prompt.push_str(&format!("[{id}] {text}\n"));
    }
    prompt.push_str(&format!(r#"
REQUIRED JSON:
{{
  "missingRequirements": [
    {{"requirement": "requirement name", "comment": "why its absence matters, 1-2 sentences", "recommendation": "clause to add"}}
  ]
}}
Return an empty list if every requirement is satisfied."#));
    prompt
}

/// Verification prompt for one candidate contradiction.
pub fn verification_prompt(candidate: &CandidatePair, perspective: Perspective) -> String {
    let party = perspective.party();
    format!(
        r#"Two paragraphs of the same contract state different {kind} values. Decide whether they really contradict each other, or whether they govern different things.

PARAGRAPH {first_id}: value "{first_value}"
...{first_context}...

PARAGRAPH {second_id}: value "{second_value}"
...{second_context}...

REQUIRED JSON:
{{"isContradiction": true, "severity": "high|medium|low", "description": "what conflicts", "recommendation": "how the {party} should reconcile the clauses"}}"#,
        kind = kind_label(candidate),
        first_id = candidate.first.paragraph_id,
        first_value = candidate.first.value,
        first_context = candidate.first.context,
        second_id = candidate.second.paragraph_id,
        second_value = candidate.second.value,
        second_context = candidate.second.context,
    )
}

fn kind_label(candidate: &CandidatePair) -> &'static str {
    use crate::data::ContradictionType;

    match candidate.kind {
        ContradictionType::Temporal => "deadline",
        ContradictionType::Financial => "monetary",
        ContradictionType::Quantitative => "percentage",
        ContradictionType::Legal => "liability",
    }
}

/// Rights-imbalance prompt over a bounded sample of classified paragraphs.
pub fn rights_prompt(sample: &[(String, String, String)], perspective: Perspective) -> String {
    let party = perspective.party();
    let counterparty = perspective.counterparty();
    let mut prompt = String::new();
    prompt.push_str(&format!("Count the rights each party holds in these contract paragraphs and report every area where the {counterparty} holds noticeably more rights than the {party}, \
         or the reverse. Areas: termination, modification, liability, control, procedural, general-rights, weighted-analysis.\n\n"));
    prompt.push_str("PARAGRAPHS:\n");
    for (id, category, text) in sample {
        prompt.push_str(&format!("[{id}] ({category}) {text}\n"));
    }
    prompt.push_str(&format!(r#"
REQUIRED JSON:
{{
  "rightsImbalance": [
    {{"type": "termination", "description": "what is unbalanced", "buyerRightCount": 1, "supplierRightCount": 3, "severity": "high|medium|low", "recommendation": "how to rebalance"}}
  ]
}}
Return an empty list if the rights are balanced."#));
    prompt
}

/// Final synthesis prompt; its size depends only on the sample caps.
pub fn synthesis_prompt(input: &SynthesisInput, perspective: Perspective) -> String {
    let party = perspective.party();
    let mut prompt = String::new();
    prompt.push_str(&format!("Write the overall assessment of this contract for the {party} from the analysis summary below.\n\n"));
    prompt.push_str("PARAGRAPH COUNTS BY CATEGORY:\n");
    for (category, count) in &input.category_counts {
        prompt.push_str(&format!("- {category}: {count}\n"));
    }
    section(&mut prompt, "TOP RISKS", &input.risks);
    section(&mut prompt, "PARTIAL OR AMBIGUOUS CLAUSES", &input.weak_clauses);
    section(&mut prompt, "MISSING REQUIREMENTS", &input.missing);
    section(&mut prompt, "CONTRADICTIONS", &input.contradictions);
    section(&mut prompt, "RIGHTS IMBALANCES", &input.imbalances);
    prompt.push_str(&format!(r#"
REQUIRED JSON:
{{
  "overallAssessment": "short overall assessment",
  "keyRisks": ["risk 1", "risk 2"],
  "structureComments": "remarks on structure and completeness",
  "legalCompliance": "remarks on legal compliance",
  "recommendations": ["recommendation 1", "recommendation 2"]
}}"#));
    prompt
}

fn section(prompt: &mut String, title: &str, lines: &[String]) {
    prompt.push_str(&format!("\n{title}:\n"));
    if lines.is_empty() {
        prompt.push_str("(none)\n");
    }
    for line in lines {
        prompt.push_str(&format!("- {line}\n"));
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::document::{build_chunks, segment, ChunkingConfig, SegmenterConfig};

    #[test]
    fn snippet_cuts_on_char_boundaries() {
        assert_eq!(snippet("короткий", 20), "короткий");
        assert_eq!(snippet("Поставщик обязан", 9), "Поставщик…");
        assert_eq!(snippet("  padded  ", 10), "padded");
    }

    #[test]
    fn system_prompt_names_the_party() {
        assert!(system_prompt(Perspective::Supplier).contains("on behalf of the Supplier"));
        assert!(!system_prompt(Perspective::Buyer).contains("{party}"));
    }

    #[test]
    fn chunk_prompt_labels_primary_members_only() {
        let text = "First clause sets the price. It is fixed.\n\n\
                    Second clause sets delivery. Delivery is in 30 days.\n\n\
                    Third clause sets the penalty. It is 1% per day.";
        let paragraphs = segment(text, &SegmenterConfig::default());
        let chunks = build_chunks(
            &paragraphs,
            &ChunkingConfig {
                token_ceiling: 4_000,
                overlap_sentences: 1,
                max_paragraphs: 2,
            },
        );
        assert_eq!(chunks.len(), 2);

        let prompt = chunk_prompt(&chunks[1], &paragraphs, "Fixed price", "", Perspective::Buyer);
        assert!(prompt.contains("[p3] Third clause"));
        assert!(!prompt.contains("[p2]"));
        assert!(prompt.contains("CONTEXT FROM THE PREVIOUS SECTION (do not classify):\nDelivery is in 30 days."));
        assert!(prompt.contains("RISKS FOR THE Buyer:\n(none provided)"));
    }
}
