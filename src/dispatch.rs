//! Bounded-concurrency dispatch of chunk classification calls.
//!
//! Chunks run in sequential batches. Every call inside a batch runs
//! concurrently and writes to its own pre-sized output slot, so output order
//! always matches chunk order. A single chunk failure aborts the run.

pub mod unit;

use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::data::schema::{ChunkResponse, WireFinding};
use crate::data::Finding;
use crate::error::AnalysisError;
use crate::inference::token_budget::TokenBudget;
use crate::inference::{CredentialPool, InferenceClient, InferenceError};
use crate::progress::{ProgressReporter, ProgressUpdate, Stage};
use crate::recovery::{recover, Recovery};

pub use unit::{Completion, RetryPolicy, RetryReason, UnitState};

/// Dispatcher limits and pacing.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct DispatchConfig {
    /// Upper bound on concurrent calls; also bounded by available credentials.
    pub concurrency_cap: usize,
    /// Pause between batches.
    pub inter_batch_delay_ms: u64,
    /// Pause between batches while many credentials remain.
    pub short_inter_batch_delay_ms: u64,
    /// Credentials that must remain for the short pause.
    pub many_credentials_threshold: usize,
    /// Attempts per call for transient errors.
    pub max_transient_attempts: usize,
    /// Linear backoff unit for transient errors.
    pub backoff_base_ms: u64,
    /// Output ceiling for chunk calls.
    pub chunk_output_ceiling: usize,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            concurrency_cap: 5,
            inter_batch_delay_ms: 2_000,
            short_inter_batch_delay_ms: 500,
            many_credentials_threshold: 3,
            max_transient_attempts: 3,
            backoff_base_ms: 1_000,
            chunk_output_ceiling: 8_192,
        }
    }
}

/// A rendered chunk prompt.
#[derive(Debug, Clone)]
pub struct ChunkRequest {
    /// Zero-based chunk index.
    pub chunk_index: usize,
    /// System instruction.
    pub system_context: String,
    /// User prompt.
    pub prompt: String,
}

/// Parsed output of one chunk call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkOutput {
    /// Zero-based chunk index.
    pub chunk_index: usize,
    /// Findings as returned; ids are not yet checked against the chunk.
    pub findings: Vec<Finding>,
    /// The response hit the output ceiling.
    pub truncated: bool,
    /// The response could not be parsed; `findings` is empty.
    pub degraded: bool,
}

/// Result of dispatching all chunks.
#[derive(Debug, Clone)]
pub struct DispatchOutcome {
    /// One output per chunk, in chunk order.
    pub outputs: Vec<ChunkOutput>,
    /// Number of sequential batches.
    pub batch_count: usize,
}

/// Runs inference calls under the credential pool.
pub struct Dispatcher {
    client: InferenceClient,
    pool: Arc<CredentialPool>,
    config: DispatchConfig,
}

impl Dispatcher {
    /// Creates a dispatcher sharing `pool` with the caller.
    pub fn new(client: InferenceClient, pool: Arc<CredentialPool>, config: DispatchConfig) -> Self {
        Self {
            client,
            pool,
            config,
        }
    }

    /// Returns the inference client.
    pub fn client(&self) -> &InferenceClient {
        &self.client
    }

    /// Returns the credential pool.
    pub fn pool(&self) -> &CredentialPool {
        &self.pool
    }

    /// Returns the dispatcher configuration.
    pub fn config(&self) -> &DispatchConfig {
        &self.config
    }

    /// Concurrent calls allowed right now.
    pub fn concurrency(&self) -> usize {
        self.config
            .concurrency_cap
            .min(self.pool.available())
            .max(1)
    }

    /// Retry limits for one call.
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_rotations: self.pool.len(),
            max_transient_attempts: self.config.max_transient_attempts,
            backoff_base: Duration::from_millis(self.config.backoff_base_ms),
        }
    }

    fn inter_batch_delay(&self) -> Duration {
        let millis = if self.pool.available() >= self.config.many_credentials_threshold {
            self.config.short_inter_batch_delay_ms
        } else {
            self.config.inter_batch_delay_ms
        };
        Duration::from_millis(millis)
    }

    /// Runs one prompt through the retry state machine.
    pub async fn call(
        &self,
        label: &str,
        system_context: &str,
        prompt: &str,
        output_ceiling: usize,
    ) -> Result<Completion, InferenceError> {
        let policy = self.retry_policy();
        unit::UnitOfWork {
            label,
            pool: &self.pool,
            client: &self.client,
            policy: &policy,
            system_context,
            prompt,
            output_ceiling,
        }
        .run()
        .await
    }

    /// Rejects any chunk prompt that cannot fit the model's input window.
    fn validate_prompts(&self, requests: &[ChunkRequest]) -> Result<(), AnalysisError> {
        let budget = TokenBudget::from_metadata(
            self.client.metadata(),
            self.client.effective_ceiling(self.config.chunk_output_ceiling),
        );
        for request in requests {
            let estimate = budget
                .validate_prompt(&request.system_context, &request.prompt)
                .map_err(|e| AnalysisError::PromptTooLarge {
                    chunk: request.chunk_index,
                    estimated_tokens: e.estimated_tokens,
                    max_tokens: e.max_tokens,
                    model: e.model,
                })?;
            debug!(
                chunk = request.chunk_index,
                estimated_tokens = estimate.estimated_tokens,
                utilization_pct = format!("{:.1}", estimate.utilization_pct),
                "Chunk prompt fits the input window"
            );
        }
        Ok(())
    }

    async fn run_chunk(&self, request: &ChunkRequest) -> Result<ChunkOutput, InferenceError> {
        let label = format!("chunk-{}", request.chunk_index);
        let completion = self
            .call(
                &label,
                &request.system_context,
                &request.prompt,
                self.config.chunk_output_ceiling,
            )
            .await?;

        let output = match recover::<ChunkResponse>(&completion.text) {
            Recovery::Failed { reason } => {
                warn!(
                    chunk = request.chunk_index,
                    reason = %reason,
                    "Chunk output unparseable, its paragraphs default to none"
                );
                ChunkOutput {
                    chunk_index: request.chunk_index,
                    findings: Vec::new(),
                    truncated: completion.truncated,
                    degraded: true,
                }
            }
            recovery => {
                let findings = recovery
                    .value()
                    .map(|r| r.analysis.into_iter().map(WireFinding::into_finding).collect())
                    .unwrap_or_default();
                ChunkOutput {
                    chunk_index: request.chunk_index,
                    findings,
                    truncated: completion.truncated,
                    degraded: false,
                }
            }
        };
        Ok(output)
    }

    /// Classifies every chunk, in batches of [`Dispatcher::concurrency`].
    ///
    /// Returns exactly one output per request, index-aligned with `requests`.
    pub async fn dispatch(
        &self,
        requests: &[ChunkRequest],
        progress: &dyn ProgressReporter,
    ) -> Result<DispatchOutcome, AnalysisError> {
        self.validate_prompts(requests)?;

        let concurrency = self.concurrency();
        let batch_total = requests.len().div_ceil(concurrency);
        info!(
            chunks = requests.len(),
            concurrency,
            batches = batch_total,
            credentials = self.pool.available(),
            "Dispatching chunks"
        );

        let mut slots: Vec<Option<ChunkOutput>> = vec![None; requests.len()];

        for (batch_index, batch) in requests.chunks(concurrency).enumerate() {
            if batch_index > 0 {
                let delay = self.inter_batch_delay();
                debug!(delay_ms = delay.as_millis() as u64, "Pausing between batches");
                tokio::time::sleep(delay).await;
            }

            progress.report(&ProgressUpdate::new(
                Stage::Classification,
                percent(batch_index, batch_total),
                format!("batch {} of {}", batch_index + 1, batch_total),
            ));

            let offset = batch_index * concurrency;
            let results = join_all(batch.iter().map(|request| self.run_chunk(request))).await;

            let mut failure = None;
            for (position, result) in results.into_iter().enumerate() {
                match result {
                    Ok(output) => slots[offset + position] = Some(output),
                    Err(error) => {
                        let chunk = batch[position].chunk_index;
                        failure.get_or_insert((chunk, error));
                    }
                }
            }
            if let Some((chunk, error)) = failure {
                return Err(AnalysisError::from_chunk_failure(chunk, error));
            }
        }

        progress.report(&ProgressUpdate::new(
            Stage::Classification,
            100,
            format!("{} chunks classified", requests.len()),
        ));

        let outputs: Vec<ChunkOutput> = slots.into_iter().flatten().collect();
        if !outputs.is_empty() && outputs.iter().all(|o| o.degraded) {
            return Err(AnalysisError::UnparseableOutput {
                chunks: outputs.len(),
            });
        }

        Ok(DispatchOutcome {
            outputs,
            batch_count: batch_total,
        })
    }
}

fn percent(done: usize, total: usize) -> u8 {
    if total == 0 {
        return 100;
    }
    u8::try_from(done * 100 / total).unwrap_or(100)
}
