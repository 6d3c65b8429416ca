//! Contradiction detection: heuristic pairing, then one verification call per pair.

use std::collections::HashSet;
use std::sync::Arc;

use futures::future::join_all;
use tracing::{debug, info, warn};

use super::entities::Entity;
use super::{prompts, request, HeuristicsConfig, StageConfig};
use crate::data::schema::VerificationVerdict;
use crate::data::{Contradiction, ContradictionType, ParagraphValue, Perspective, Severity};
use crate::dispatch::Dispatcher;
use crate::error::StageError;
use crate::inference::InferenceError;
use crate::progress::Stage;

/// Two values of the same kind from different paragraphs that may conflict.
#[derive(Debug, Clone, PartialEq)]
pub struct CandidatePair {
    /// Shared value kind.
    pub kind: ContradictionType,
    /// Value from the earlier paragraph.
    pub first: Entity,
    /// Value from the later paragraph.
    pub second: Entity,
    /// Overlap coefficient of the two contexts.
    pub overlap: f64,
}

/// Lowercased words of at least four letters.
pub fn word_set(text: &str) -> HashSet<String> {
    text.split(|c: char| !c.is_alphabetic())
        .filter(|w| w.chars().count() >= 4)
        .map(str::to_lowercase)
        .collect()
}

/// `|a ∩ b| / min(|a|, |b|)`, or 0 when either set is empty.
pub fn overlap_coefficient(a: &HashSet<String>, b: &HashSet<String>) -> f64 {
    let smaller = a.len().min(b.len());
    if smaller == 0 {
        return 0.0;
    }
    a.intersection(b).count() as f64 / smaller as f64
}

/// Pairs values that look like statements about the same thing.
///
/// A pair needs the same kind, different paragraphs, different values and
/// a context overlap of at least the configured threshold. Pairs are
/// returned best-first, one per paragraph pair and kind, capped at
/// `max_candidate_pairs`.
pub fn find_candidates(entities: &[Entity], heuristics: &HeuristicsConfig) -> Vec<CandidatePair> {
    let words: Vec<HashSet<String>> = entities.iter().map(|e| word_set(&e.context)).collect();

    // only values of the same kind are compared
    let mut buckets: Vec<(ContradictionType, Vec<usize>)> = Vec::new();
    for (i, entity) in entities.iter().enumerate() {
        match buckets.iter_mut().find(|(kind, _)| *kind == entity.kind) {
            Some((_, members)) => members.push(i),
            None => buckets.push((entity.kind, vec![i])),
        }
    }

    let mut scored = Vec::new();
    for (_, members) in &buckets {
        for (n, &i) in members.iter().enumerate() {
            for &j in &members[n + 1..] {
                let (first, second) = (&entities[i], &entities[j]);
                if first.paragraph_id == second.paragraph_id || first.value == second.value {
                    continue;
                }
                let overlap = overlap_coefficient(&words[i], &words[j]);
                if overlap >= heuristics.word_overlap_threshold {
                    scored.push((i, j, overlap));
                }
            }
        }
    }

    // best first, ties in text order
    scored.sort_by(|a, b| b.2.total_cmp(&a.2).then((a.0, a.1).cmp(&(b.0, b.1))));
    let mut pairs: Vec<CandidatePair> = scored
        .into_iter()
        .map(|(i, j, overlap)| CandidatePair {
            kind: entities[i].kind,
            first: entities[i].clone(),
            second: entities[j].clone(),
            overlap,
        })
        .collect();

    let mut seen = HashSet::new();
    pairs.retain(|p| {
        seen.insert((
            p.kind,
            p.first.paragraph_id.clone(),
            p.second.paragraph_id.clone(),
        ))
    });
    pairs.truncate(heuristics.max_candidate_pairs);
    debug!(candidates = pairs.len(), "Contradiction candidates paired");
    pairs
}

fn to_contradiction(candidate: &CandidatePair, verdict: VerificationVerdict, number: usize) -> Contradiction {
    let description = if verdict.description.is_empty() {
        format!("{} vs {}", candidate.first.value, candidate.second.value)
    } else {
        verdict.description
    };
    Contradiction {
        id: format!("contradiction_{number}"),
        kind: candidate.kind,
        description,
        first: ParagraphValue {
            paragraph_id: candidate.first.paragraph_id.clone(),
            value: candidate.first.value.clone(),
            context: candidate.first.context.clone(),
        },
        second: ParagraphValue {
            paragraph_id: candidate.second.paragraph_id.clone(),
            value: candidate.second.value.clone(),
            context: candidate.second.context.clone(),
        },
        severity: Severity::from_label(&verdict.severity).unwrap_or(Severity::Medium),
        recommendation: verdict.recommendation,
    }
}

/// Verifies each candidate with one inference call, at most
/// [`Dispatcher::concurrency`] at a time.
///
/// Only pairs confirmed with `isContradiction: true` are kept, capped at
/// `max_contradictions`. An unparseable verdict drops its pair; an inference
/// failure fails the stage.
pub async fn verify_candidates(
    dispatcher: &Dispatcher,
    candidates: &[CandidatePair],
    perspective: Perspective,
    stages: &StageConfig,
    heuristics: &HeuristicsConfig,
) -> Result<Vec<Contradiction>, StageError> {
    if candidates.is_empty() {
        return Ok(Vec::new());
    }

    let system = prompts::system_prompt(perspective);
    let semaphore = Arc::new(tokio::sync::Semaphore::new(dispatcher.concurrency()));

    let futs: Vec<_> = candidates
        .iter()
        .enumerate()
        .map(|(index, candidate)| {
            let sem = semaphore.clone();
            let system = &system;
            async move {
                let _permit = sem.acquire().await.map_err(|e| {
                    StageError::Inference(InferenceError::Transient(format!(
                        "semaphore closed: {e}"
                    )))
                })?;
                let prompt = prompts::verification_prompt(candidate, perspective);
                request::<VerificationVerdict>(
                    dispatcher,
                    Stage::ContradictionDetection,
                    &format!("verify-{index}"),
                    system,
                    &prompt,
                    stages.stage_output_ceiling,
                )
                .await
            }
        })
        .collect();
    let verdicts = join_all(futs).await;

    let mut contradictions = Vec::new();
    for (candidate, verdict) in candidates.iter().zip(verdicts) {
        match verdict {
            Ok(verdict) if verdict.is_contradiction => {
                if contradictions.len() < heuristics.max_contradictions {
                    let number = contradictions.len() + 1;
                    contradictions.push(to_contradiction(candidate, verdict, number));
                }
            }
            Ok(_) => debug!(
                first = %candidate.first.paragraph_id,
                second = %candidate.second.paragraph_id,
                "Candidate rejected by verification"
            ),
            Err(StageError::Unparseable { reason, .. }) => warn!(
                first = %candidate.first.paragraph_id,
                second = %candidate.second.paragraph_id,
                reason = %reason,
                "Verification output unparseable, dropping candidate"
            ),
            Err(error) => return Err(error),
        }
    }

    info!(
        candidates = candidates.len(),
        confirmed = contradictions.len(),
        "Contradictions verified"
    );
    Ok(contradictions)
}
