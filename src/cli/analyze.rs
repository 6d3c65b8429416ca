//! Analyze command: runs the full analysis on one contract.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use tracing::debug;

use crate::config::AnalysisConfig;
use crate::data::{AnalysisReport, Perspective};
use crate::inference::{CredentialPool, GeminiTransport};
use crate::pipeline::{AnalysisRequest, Analyzer};
use crate::progress::ProgressUpdate;

/// Report serialization formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum OutputFormat {
    /// Pretty-printed JSON.
    #[default]
    Json,
    /// YAML.
    Yaml,
}

/// Analyze command options.
#[derive(Parser)]
pub struct AnalyzeCommand {
    /// Contract text file.
    #[arg(long, value_name = "FILE")]
    pub contract: PathBuf,

    /// Checklist of requirements the contract should meet.
    #[arg(long, value_name = "FILE")]
    pub checklist: Option<PathBuf>,

    /// List of conditions that count as risks.
    #[arg(long, value_name = "FILE")]
    pub risks: Option<PathBuf>,

    /// Party whose interests the analysis protects.
    #[arg(long, value_enum, default_value_t = Perspective::Buyer)]
    pub perspective: Perspective,

    /// Gemini model to use (overrides the config file).
    #[arg(long)]
    pub model: Option<String>,

    /// YAML analysis configuration.
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Report format.
    #[arg(long, value_enum, default_value_t = OutputFormat::Json)]
    pub format: OutputFormat,

    /// Writes the report to a file instead of stdout.
    #[arg(long, value_name = "FILE")]
    pub output: Option<PathBuf>,
}

impl AnalyzeCommand {
    /// Executes the analyze command.
    pub async fn execute(self) -> Result<()> {
        let mut config = AnalysisConfig::load_or_default(self.config.as_deref())?;
        if let Some(model) = &self.model {
            config.model.clone_from(model);
        }

        // Fail on missing keys before reading inputs
        let credentials = crate::utils::check_credentials(&config.model)?;
        eprintln!(
            "✓ {} Gemini credential(s) found (model: {})",
            credentials.keys.len(),
            credentials.model
        );

        let request = AnalysisRequest {
            contract_text: read_input(&self.contract)?,
            checklist_text: read_optional(self.checklist.as_deref())?,
            risk_text: read_optional(self.risks.as_deref())?,
            perspective: self.perspective,
        };

        let pool = Arc::new(CredentialPool::new(&credentials.keys)?);
        let transport = Arc::new(GeminiTransport::new(config.model.clone())?);
        let analyzer = Analyzer::new(transport, pool, &config);

        let progress = |update: &ProgressUpdate| eprintln!("🔄 {update}");
        let report = analyzer.run_analysis(&request, &progress).await?;
        debug!(
            paragraphs = report.paragraphs.len(),
            failures = report.diagnostics.stage_failures.len(),
            "Analysis finished"
        );
        print_summary(&report);

        let rendered = render(&report, self.format)?;
        match &self.output {
            Some(path) => {
                fs::write(path, rendered)
                    .with_context(|| format!("Failed to write report: {}", path.display()))?;
                eprintln!("✓ Report written to {}", path.display());
            }
            None => println!("{rendered}"),
        }
        Ok(())
    }
}

fn read_input(path: &Path) -> Result<String> {
    fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()))
}

fn read_optional(path: Option<&Path>) -> Result<String> {
    path.map_or_else(|| Ok(String::new()), read_input)
}

/// Serializes the report in the requested format.
pub fn render(report: &AnalysisReport, format: OutputFormat) -> Result<String> {
    match format {
        OutputFormat::Json => {
            serde_json::to_string_pretty(report).context("Failed to serialize report as JSON")
        }
        OutputFormat::Yaml => {
            serde_yaml::to_string(report).context("Failed to serialize report as YAML")
        }
    }
}

fn print_summary(report: &AnalysisReport) {
    eprintln!("✓ {} paragraphs analyzed", report.paragraphs.len());
    for (category, count) in report.category_counts() {
        eprintln!("   {category}: {count}");
    }
    let diagnostics = &report.diagnostics;
    if !diagnostics.truncated_chunks.is_empty() || !diagnostics.degraded_chunks.is_empty() {
        eprintln!(
            "⚠️  {} truncated, {} degraded chunk(s)",
            diagnostics.truncated_chunks.len(),
            diagnostics.degraded_chunks.len()
        );
    }
    for failure in &diagnostics.stage_failures {
        eprintln!("⚠️  {} skipped: {}", failure.stage, failure.error);
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use clap::Parser;
    use tempfile::TempDir;

    use super::*;
    use crate::cli::{Cli, Commands};
    use crate::data::{Finding, RunDiagnostics, StructuralSummary};
    use crate::document::Paragraph;

    fn report() -> AnalysisReport {
        AnalysisReport {
            paragraphs: vec![Paragraph {
                id: "p1".into(),
                text: "The price is fixed.".into(),
                ordinal: 0,
            }],
            findings: vec![Finding::none("p1")],
            missing_requirements: Vec::new(),
            contradictions: Vec::new(),
            rights_imbalance: Vec::new(),
            structural_summary: StructuralSummary::default(),
            diagnostics: RunDiagnostics::new(),
        }
    }

    #[test]
    fn analyze_flags_parse() {
        let cli = Cli::try_parse_from([
            "contract-analyst",
            "analyze",
            "--contract",
            "contract.txt",
            "--perspective",
            "supplier",
            "--format",
            "yaml",
        ])
        .unwrap();
        let Commands::Analyze(cmd) = cli.command else {
            panic!("expected analyze");
        };
        assert_eq!(cmd.contract, PathBuf::from("contract.txt"));
        assert_eq!(cmd.perspective, Perspective::Supplier);
        assert_eq!(cmd.format, OutputFormat::Yaml);
        assert!(cmd.checklist.is_none());
    }

    #[test]
    fn contract_flag_is_required() {
        assert!(Cli::try_parse_from(["contract-analyst", "analyze"]).is_err());
    }

    #[test]
    fn report_renders_in_both_formats() {
        let json = render(&report(), OutputFormat::Json).unwrap();
        assert!(json.contains("\"paragraphId\": \"p1\""));
        let yaml = render(&report(), OutputFormat::Yaml).unwrap();
        assert!(yaml.contains("paragraphs:"));
    }

    #[test]
    fn optional_inputs_default_to_empty() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("checklist.txt");
        fs::write(&path, "1. Fixed price").unwrap();

        assert_eq!(read_optional(Some(&path)).unwrap(), "1. Fixed price");
        assert_eq!(read_optional(None).unwrap(), "");
        assert!(read_input(&temp_dir.path().join("absent.txt")).is_err());
    }
}
