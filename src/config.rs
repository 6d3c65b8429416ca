//! Analysis configuration: defaults, overridden by an optional YAML file.

use std::fs;
use std::path::Path;

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};

use crate::dispatch::DispatchConfig;
use crate::document::{ChunkingConfig, SegmenterConfig};
use crate::inference::SafetyConfig;
use crate::pipeline::{HeuristicsConfig, StageConfig};

/// Model used when neither the config file nor the command line names one.
pub const DEFAULT_MODEL: &str = "gemini-2.0-flash";

/// Every tunable of an analysis run.
///
/// Missing sections and fields fall back to their defaults, so a config file
/// only needs the values it changes.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AnalysisConfig {
    /// Model identifier.
    pub model: String,
    /// Paragraph segmentation.
    pub segmenter: SegmenterConfig,
    /// Chunk building.
    pub chunking: ChunkingConfig,
    /// Dispatch concurrency, pacing and retries.
    pub dispatch: DispatchConfig,
    /// Aggregation stage limits.
    pub stages: StageConfig,
    /// Contradiction and imbalance heuristics.
    pub heuristics: HeuristicsConfig,
    /// Safety settings attached to every call.
    pub safety: SafetyConfig,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            model: DEFAULT_MODEL.to_string(),
            segmenter: SegmenterConfig::default(),
            chunking: ChunkingConfig::default(),
            dispatch: DispatchConfig::default(),
            stages: StageConfig::default(),
            heuristics: HeuristicsConfig::default(),
            safety: SafetyConfig::default(),
        }
    }
}

impl AnalysisConfig {
    /// Loads and validates a YAML config file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        let config: Self = serde_yaml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;
        config
            .validate()
            .with_context(|| format!("Invalid config file: {}", path.display()))?;
        Ok(config)
    }

    /// Loads `path` if given, otherwise returns the defaults.
    pub fn load_or_default(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::load(path),
            None => Ok(Self::default()),
        }
    }

    /// Serializes the configuration as YAML.
    pub fn to_yaml(&self) -> Result<String> {
        serde_yaml::to_string(self).context("Failed to serialize configuration")
    }

    /// Rejects values that would stall or break a run.
    pub fn validate(&self) -> Result<()> {
        if self.model.trim().is_empty() {
            bail!("model must not be empty");
        }
        if self.segmenter.max_paragraph_chars <= self.segmenter.min_paragraph_chars {
            bail!("segmenter.max_paragraph_chars must exceed segmenter.min_paragraph_chars");
        }
        if self.chunking.token_ceiling == 0 || self.chunking.max_paragraphs == 0 {
            bail!("chunking.token_ceiling and chunking.max_paragraphs must be positive");
        }
        if self.dispatch.concurrency_cap == 0 {
            bail!("dispatch.concurrency_cap must be positive");
        }
        if self.dispatch.max_transient_attempts == 0 {
            bail!("dispatch.max_transient_attempts must be positive");
        }
        if self.dispatch.chunk_output_ceiling == 0 || self.stages.stage_output_ceiling == 0 {
            bail!("output ceilings must be positive");
        }
        if !(0.0..=1.0).contains(&self.heuristics.word_overlap_threshold) {
            bail!("heuristics.word_overlap_threshold must be between 0 and 1");
        }
        if self.heuristics.severity_medium_ratio > self.heuristics.severity_high_ratio {
            bail!("heuristics.severity_medium_ratio must not exceed heuristics.severity_high_ratio");
        }
        Ok(())
    }
}
