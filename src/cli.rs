//! CLI interface for contract-analyst.

use anyhow::Result;
use clap::{Parser, Subcommand};

pub mod analyze;
pub mod config;

/// contract-analyst: LLM-assisted review of supply contracts.
#[derive(Parser)]
#[command(name = "contract-analyst")]
#[command(about = "Reviews a supply contract against a checklist and a risk list", long_about = None)]
#[command(version)]
pub struct Cli {
    /// The main command to execute.
    #[command(subcommand)]
    pub command: Commands,
}

/// Main command categories.
#[derive(Subcommand)]
pub enum Commands {
    /// Analyzes a contract.
    Analyze(analyze::AnalyzeCommand),
    /// Configuration and model information.
    Config(config::ConfigCommand),
}

impl Cli {
    /// Executes the CLI command.
    pub async fn execute(self) -> Result<()> {
        match self.command {
            Commands::Analyze(analyze_cmd) => analyze_cmd.execute().await,
            Commands::Config(config_cmd) => config_cmd.execute(),
        }
    }
}
