//! # contract-analyst
//!
//! Reviews a supply contract with a large language model: the text is split
//! into labelled paragraphs, classified in budgeted chunks across a pool of
//! API keys, and aggregated into missing requirements, verified
//! contradictions, rights imbalances and an overall assessment.
//!
//! ## Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use contract_analyst::{
//!     AnalysisConfig, AnalysisRequest, Analyzer, CredentialPool, GeminiTransport, NoProgress,
//! };
//!
//! # async fn run() -> anyhow::Result<()> {
//! let config = AnalysisConfig::default();
//! let pool = Arc::new(CredentialPool::new(["key-1", "key-2"])?);
//! let transport = Arc::new(GeminiTransport::new(config.model.clone())?);
//! let analyzer = Analyzer::new(transport, pool, &config);
//!
//! let request = AnalysisRequest {
//!     contract_text: "1. Subject. The Supplier delivers the goods.".into(),
//!     ..AnalysisRequest::default()
//! };
//! let report = analyzer.run_analysis(&request, &NoProgress).await?;
//! println!("{} paragraphs", report.paragraphs.len());
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(unsafe_code)]

pub mod cli;
pub mod config;
pub mod data;
pub mod dispatch;
pub mod document;
pub mod error;
pub mod inference;
pub mod pipeline;
pub mod progress;
pub mod recovery;
pub mod utils;

pub use crate::cli::Cli;
pub use crate::config::AnalysisConfig;
pub use crate::data::{AnalysisReport, Category, Finding, Perspective};
pub use crate::error::AnalysisError;
pub use crate::inference::{CredentialPool, GeminiTransport, InferenceError, InferenceTransport};
pub use crate::pipeline::{AnalysisRequest, Analyzer};
pub use crate::progress::{NoProgress, ProgressReporter, ProgressUpdate, Stage, TracingProgress};

/// The current version of contract-analyst.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
