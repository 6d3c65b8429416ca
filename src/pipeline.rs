//! Analysis orchestration: chunk classification followed by the aggregation stages.
//!
//! ```text
//! segment ─► chunk ─► dispatch ─► merge ─► gaps ─► contradictions ─► rights ─► synthesis
//! ```
//!
//! Failures before and during dispatch abort the run. Each stage after the
//! merge degrades to an empty result on failure and the failure is recorded
//! in the report diagnostics.

pub mod contradictions;
pub mod entities;
pub mod gaps;
pub mod merge;
pub mod prompts;
pub mod rights;
pub mod synthesis;

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::config::AnalysisConfig;
use crate::data::{AnalysisReport, Perspective, RunDiagnostics, StageFailure};
use crate::dispatch::{ChunkRequest, Dispatcher};
use crate::document::{build_chunks, segment, ChunkingConfig, SegmenterConfig};
use crate::error::{AnalysisError, StageError};
use crate::inference::{CredentialPool, InferenceClient, InferenceTransport};
use crate::progress::{ProgressReporter, ProgressUpdate, Stage};
use crate::recovery::{recover, Recovery, ResponseSchema};

pub use entities::{Entity, EntityExtractor, RegexEntityExtractor};

/// Limits for the aggregation stage calls.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct StageConfig {
    /// Output ceiling for every stage call.
    pub stage_output_ceiling: usize,
    /// Missing requirements kept.
    pub max_missing_requirements: usize,
    /// Characters per paragraph shown to gap detection.
    pub gap_snippet_chars: usize,
    /// Paragraphs shown to rights-imbalance detection.
    pub rights_sample_size: usize,
    /// Entries per list shown to synthesis.
    pub synthesis_top_n: usize,
    /// Characters per entry shown to synthesis.
    pub synthesis_snippet_chars: usize,
}

impl Default for StageConfig {
    fn default() -> Self {
        Self {
            stage_output_ceiling: 4_096,
            max_missing_requirements: 10,
            gap_snippet_chars: 200,
            rights_sample_size: 40,
            synthesis_top_n: 5,
            synthesis_snippet_chars: 200,
        }
    }
}

/// Contradiction and imbalance heuristics.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct HeuristicsConfig {
    /// Characters kept on each side of an extracted value.
    pub context_window_chars: usize,
    /// Minimum context overlap coefficient for a candidate pair.
    pub word_overlap_threshold: f64,
    /// Candidate pairs sent to verification.
    pub max_candidate_pairs: usize,
    /// Contradictions kept.
    pub max_contradictions: usize,
    /// Right-count ratio from which an imbalance is high.
    pub severity_high_ratio: f64,
    /// Right-count ratio from which an imbalance is medium.
    pub severity_medium_ratio: f64,
}

impl Default for HeuristicsConfig {
    fn default() -> Self {
        Self {
            context_window_chars: 80,
            word_overlap_threshold: 0.3,
            max_candidate_pairs: 10,
            max_contradictions: 5,
            severity_high_ratio: 3.0,
            severity_medium_ratio: 1.5,
        }
    }
}

/// Inputs of one analysis run.
#[derive(Debug, Clone, Default)]
pub struct AnalysisRequest {
    /// Full contract text.
    pub contract_text: String,
    /// Requirements the contract should satisfy; may be empty.
    pub checklist_text: String,
    /// Risks to look for; may be empty.
    pub risk_text: String,
    /// Party whose interests are protected.
    pub perspective: Perspective,
}

/// Sends one prompt of `stage` and recovers the typed response.
pub(crate) async fn request<T: ResponseSchema>(
    dispatcher: &Dispatcher,
    stage: Stage,
    label: &str,
    system_context: &str,
    prompt: &str,
    output_ceiling: usize,
) -> Result<T, StageError> {
    debug!(unit = label, prompt_chars = prompt.len(), "Sending stage prompt");
    let completion = dispatcher
        .call(label, system_context, prompt, output_ceiling)
        .await?;
    let unparseable = |reason: String| StageError::Unparseable {
        stage: stage.key(),
        reason,
    };
    match recover::<T>(&completion.text) {
        Recovery::Failed { reason } => Err(unparseable(reason)),
        recovery => recovery
            .value()
            .ok_or_else(|| unparseable("no value recovered".to_string())),
    }
}

/// Runs whole analyses against one transport and one credential pool.
pub struct Analyzer {
    dispatcher: Dispatcher,
    segmenter: SegmenterConfig,
    chunking: ChunkingConfig,
    stages: StageConfig,
    heuristics: HeuristicsConfig,
    extractor: Box<dyn EntityExtractor>,
}

impl Analyzer {
    /// Creates an analyzer with the regex entity extractor.
    pub fn new(
        transport: Arc<dyn InferenceTransport>,
        pool: Arc<CredentialPool>,
        config: &AnalysisConfig,
    ) -> Self {
        let client = InferenceClient::new(transport, config.safety.clone());
        Self {
            dispatcher: Dispatcher::new(client, pool, config.dispatch.clone()),
            segmenter: config.segmenter.clone(),
            chunking: config.chunking.clone(),
            stages: config.stages.clone(),
            heuristics: config.heuristics.clone(),
            extractor: Box::new(RegexEntityExtractor::new(
                config.heuristics.context_window_chars,
            )),
        }
    }

    /// Replaces the entity extractor used for contradiction detection.
    #[must_use]
    pub fn with_extractor(mut self, extractor: Box<dyn EntityExtractor>) -> Self {
        self.extractor = extractor;
        self
    }

    /// Returns the dispatcher.
    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    /// Analyzes one contract.
    ///
    /// Returns an error only when classification cannot cover every
    /// paragraph; later stages degrade instead of failing.
    pub async fn run_analysis(
        &self,
        request: &AnalysisRequest,
        progress: &dyn ProgressReporter,
    ) -> Result<AnalysisReport, AnalysisError> {
        let perspective = request.perspective;
        let mut diagnostics = RunDiagnostics::new();

        progress.report(&ProgressUpdate::new(Stage::Preparation, 0, "segmenting contract"));
        let paragraphs = segment(&request.contract_text, &self.segmenter);
        if paragraphs.is_empty() {
            return Err(AnalysisError::EmptyContract);
        }
        let chunks = build_chunks(&paragraphs, &self.chunking);
        let system = prompts::system_prompt(perspective);
        let requests: Vec<ChunkRequest> = chunks
            .iter()
            .map(|chunk| ChunkRequest {
                chunk_index: chunk.index,
                system_context: system.clone(),
                prompt: prompts::chunk_prompt(
                    chunk,
                    &paragraphs,
                    &request.checklist_text,
                    &request.risk_text,
                    perspective,
                ),
            })
            .collect();
        info!(
            paragraphs = paragraphs.len(),
            chunks = chunks.len(),
            perspective = %perspective,
            "Contract prepared"
        );
        progress.report(&ProgressUpdate::new(
            Stage::Preparation,
            100,
            format!("{} paragraphs in {} chunks", paragraphs.len(), chunks.len()),
        ));

        let outcome = self.dispatcher.dispatch(&requests, progress).await?;
        diagnostics.chunk_count = chunks.len();
        diagnostics.batch_count = outcome.batch_count;
        for output in &outcome.outputs {
            if output.truncated {
                diagnostics.truncated_chunks.push(output.chunk_index);
            }
            if output.degraded {
                diagnostics.degraded_chunks.push(output.chunk_index);
            }
        }

        progress.report(&ProgressUpdate::new(Stage::Merge, 0, ""));
        let findings = merge::merge_findings(&paragraphs, &chunks, &outcome.outputs);
        progress.report(&ProgressUpdate::new(
            Stage::Merge,
            100,
            format!("{} findings", findings.len()),
        ));

        progress.report(&ProgressUpdate::new(Stage::GapDetection, 0, ""));
        let missing_requirements = settle(
            Stage::GapDetection,
            gaps::detect_gaps(
                &self.dispatcher,
                &request.checklist_text,
                &paragraphs,
                &findings,
                perspective,
                &self.stages,
            )
            .await,
            &mut diagnostics,
        );
        progress.report(&ProgressUpdate::new(
            Stage::GapDetection,
            100,
            format!("{} missing requirements", missing_requirements.len()),
        ));

        progress.report(&ProgressUpdate::new(Stage::ContradictionDetection, 0, ""));
        let entities: Vec<Entity> = paragraphs
            .iter()
            .flat_map(|p| self.extractor.extract(p))
            .collect();
        let candidates = contradictions::find_candidates(&entities, &self.heuristics);
        progress.report(&ProgressUpdate::new(
            Stage::ContradictionDetection,
            50,
            format!("verifying {} candidates", candidates.len()),
        ));
        let contradictions = settle(
            Stage::ContradictionDetection,
            contradictions::verify_candidates(
                &self.dispatcher,
                &candidates,
                perspective,
                &self.stages,
                &self.heuristics,
            )
            .await,
            &mut diagnostics,
        );
        progress.report(&ProgressUpdate::new(
            Stage::ContradictionDetection,
            100,
            format!("{} contradictions", contradictions.len()),
        ));

        progress.report(&ProgressUpdate::new(Stage::RightsImbalance, 0, ""));
        let rights_imbalance = settle(
            Stage::RightsImbalance,
            rights::detect_imbalance(
                &self.dispatcher,
                &paragraphs,
                &findings,
                perspective,
                &self.stages,
                &self.heuristics,
            )
            .await,
            &mut diagnostics,
        );
        progress.report(&ProgressUpdate::new(
            Stage::RightsImbalance,
            100,
            format!("{} imbalances", rights_imbalance.len()),
        ));

        progress.report(&ProgressUpdate::new(Stage::Synthesis, 0, ""));
        let input = synthesis::build_synthesis_input(
            &paragraphs,
            &findings,
            &missing_requirements,
            &contradictions,
            &rights_imbalance,
            &self.stages,
        );
        let structural_summary = settle(
            Stage::Synthesis,
            synthesis::synthesize(&self.dispatcher, &input, perspective, &self.stages).await,
            &mut diagnostics,
        );
        progress.report(&ProgressUpdate::new(Stage::Synthesis, 100, "done"));

        info!(
            findings = findings.len(),
            missing = missing_requirements.len(),
            contradictions = contradictions.len(),
            imbalances = rights_imbalance.len(),
            degraded_stages = diagnostics.stage_failures.len(),
            "Analysis complete"
        );

        Ok(AnalysisReport {
            paragraphs,
            findings,
            missing_requirements,
            contradictions,
            rights_imbalance,
            structural_summary,
            diagnostics,
        })
    }
}

/// Unwraps a stage result, recording a failure and substituting an empty value.
fn settle<T: Default>(
    stage: Stage,
    result: Result<T, StageError>,
    diagnostics: &mut RunDiagnostics,
) -> T {
    result.unwrap_or_else(|error| {
        warn!(stage = stage.key(), error = %error, "Stage degraded to an empty result");
        diagnostics.stage_failures.push(StageFailure {
            stage: stage.key().to_string(),
            error: error.to_string(),
        });
        T::default()
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use std::sync::Mutex;

    use super::*;
    use crate::data::Category;
    use crate::inference::test_utils::{stop, RecordedCall, ScriptedTransport};
    use crate::inference::{InferenceError, RawCompletion};
    use crate::progress::NoProgress;

    const CONTRACT: &str = "1. The Supplier delivers the goods within 30 days after payment.\n\n\
        2. The price is fixed in roubles and may be changed by the Supplier at its discretion.\n\n\
        3. Delivery of the goods takes place within 10 days after payment by the Buyer.\n\n\
        4. The Buyer pays the invoice in a timely manner.";

    fn config() -> AnalysisConfig {
        let mut config = AnalysisConfig::default();
        config.dispatch.inter_batch_delay_ms = 0;
        config.dispatch.short_inter_batch_delay_ms = 0;
        config.dispatch.backoff_base_ms = 1;
        config
    }

    fn sample_request() -> AnalysisRequest {
        AnalysisRequest {
            contract_text: CONTRACT.to_string(),
            checklist_text: "Fixed price".to_string(),
            risk_text: "Unilateral price change".to_string(),
            perspective: Perspective::Buyer,
        }
    }

    /// Answers by prompt shape.
    fn respond(call: &RecordedCall) -> Result<RawCompletion, InferenceError> {
        let prompt = &call.prompt;
        if prompt.contains("PARAGRAPHS:\n[p1]") {
            stop(
                r#"{"analysis":[
                {"id":"p1","category":null},
                {"id":"p2","category":"risk","comment":"Unilateral price change"},
                {"id":"p3","category":null},
                {"id":"p4","category":null,"comment":"No deadline"}
            ]}"#,
            )
        } else if prompt.contains("\"missingRequirements\"") {
            stop(r#"{"missingRequirements":[{"requirement":"Warranty","comment":"Absent"}]}"#)
        } else if prompt.contains("\"isContradiction\"") {
            stop(r#"{"isContradiction":true,"severity":"high","description":"30 vs 10 days"}"#)
        } else if prompt.contains("\"rightsImbalance\"") {
            stop(r#"{"rightsImbalance":[]}"#)
        } else {
            stop(r#"{"overallAssessment":"Needs work","keyRisks":["Price"],"recommendations":[]}"#)
        }
    }

    fn analyzer(transport: ScriptedTransport) -> Analyzer {
        let pool = Arc::new(CredentialPool::new(["k1", "k2"]).unwrap());
        Analyzer::new(Arc::new(transport), pool, &config())
    }

    #[tokio::test]
    async fn empty_contract_is_rejected() {
        let a = analyzer(ScriptedTransport::queued(vec![]));
        let err = a
            .run_analysis(&AnalysisRequest::default(), &NoProgress)
            .await
            .unwrap_err();
        assert!(matches!(err, AnalysisError::EmptyContract));
    }

    #[tokio::test]
    async fn full_run_produces_every_section() {
        let a = analyzer(ScriptedTransport::from_fn(respond));
        let stages = Mutex::new(Vec::new());
        let reporter = |u: &ProgressUpdate| {
            let mut seen = stages.lock().unwrap();
            if seen.last() != Some(&u.stage) {
                seen.push(u.stage);
            }
        };

        let report = a.run_analysis(&sample_request(), &reporter).await.unwrap();

        assert_eq!(report.paragraphs.len(), 4);
        assert_eq!(report.findings.len(), 4);
        assert_eq!(report.findings[1].category, Category::Risk);
        assert_eq!(report.findings[3].category, Category::Ambiguous);
        assert_eq!(report.missing_requirements[0].id, "missing_1");
        assert_eq!(report.contradictions.len(), 1);
        assert_eq!(report.contradictions[0].first.paragraph_id, "p1");
        assert_eq!(report.contradictions[0].second.paragraph_id, "p3");
        assert_eq!(report.structural_summary.overall_assessment, "Needs work");
        assert!(report.diagnostics.stage_failures.is_empty());
        assert_eq!(*stages.lock().unwrap(), Stage::ALL.to_vec());
    }

    #[tokio::test]
    async fn failing_stage_degrades_to_empty() {
        let transport = ScriptedTransport::from_fn(|call| {
            if call.prompt.contains("\"rightsImbalance\"") {
                Err(InferenceError::SafetyBlocked("SAFETY".into()))
            } else if call.prompt.contains("\"overallAssessment\"") {
                stop("I cannot produce JSON today")
            } else {
                respond(call)
            }
        });
        let a = analyzer(transport);

        let report = a.run_analysis(&sample_request(), &NoProgress).await.unwrap();

        assert!(report.rights_imbalance.is_empty());
        assert_eq!(report.structural_summary, Default::default());
        assert_eq!(report.missing_requirements.len(), 1);
        let failed: Vec<_> = report
            .diagnostics
            .stage_failures
            .iter()
            .map(|f| f.stage.as_str())
            .collect();
        assert_eq!(failed, vec!["rights-imbalance", "synthesis"]);
    }
}
