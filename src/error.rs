//! Run-level error handling.

use thiserror::Error;

use crate::inference::InferenceError;

/// Failure of a whole analysis run.
///
/// Stage-level failures never surface here; they degrade their stage and are
/// recorded in the report diagnostics.
#[derive(Error, Debug)]
pub enum AnalysisError {
    /// The contract produced no paragraphs.
    #[error("Contract text is empty or contains no analysable paragraphs")]
    EmptyContract,

    /// Every credential hit its quota before all chunks were classified.
    #[error("Inference quota exhausted on every configured credential; retry later or add credentials")]
    QuotaExhausted,

    /// A chunk was blocked by the safety filter.
    #[error("Chunk {chunk} was blocked by the safety filter; paragraph coverage cannot be guaranteed")]
    SafetyBlocked {
        /// Zero-based chunk index.
        chunk: usize,
    },

    /// No chunk output could be parsed.
    #[error("Inference output could not be parsed for any of the {chunks} chunks")]
    UnparseableOutput {
        /// Number of chunks dispatched.
        chunks: usize,
    },

    /// A chunk failed after exhausting its retries.
    #[error("Chunk {chunk} failed after retries")]
    ChunkFailed {
        /// Zero-based chunk index.
        chunk: usize,
        /// Last inference error.
        #[source]
        source: InferenceError,
    },

    /// A chunk prompt does not fit the model's input window.
    #[error(
        "Prompt for chunk {chunk} needs ~{estimated_tokens} tokens but {model} accepts {max_tokens}; lower chunking.token_ceiling"
    )]
    PromptTooLarge {
        /// Zero-based chunk index.
        chunk: usize,
        /// Estimated prompt tokens.
        estimated_tokens: usize,
        /// Available input tokens.
        max_tokens: usize,
        /// Model identifier.
        model: String,
    },

    /// No credentials were configured.
    #[error("No inference credentials configured. Set GEMINI_API_KEYS (comma-separated) or GEMINI_API_KEY")]
    NoCredentials,
}

/// Failure of one aggregation stage; the stage degrades to an empty result.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StageError {
    /// The stage call failed after retries.
    #[error(transparent)]
    Inference(#[from] InferenceError),

    /// The stage output could not be recovered.
    #[error("Unparseable {stage} output: {reason}")]
    Unparseable {
        /// Stage key.
        stage: &'static str,
        /// Why recovery failed.
        reason: String,
    },
}

impl AnalysisError {
    /// Classifies the terminal error of a chunk.
    pub fn from_chunk_failure(chunk: usize, error: InferenceError) -> Self {
        match error {
            InferenceError::AllCredentialsExhausted | InferenceError::QuotaExceeded(_) => {
                Self::QuotaExhausted
            }
            InferenceError::SafetyBlocked(_) => Self::SafetyBlocked { chunk },
            InferenceError::NoCredentials => Self::NoCredentials,
            source => Self::ChunkFailed { chunk, source },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chunk_failures_are_distinct() {
        assert!(matches!(
            AnalysisError::from_chunk_failure(1, InferenceError::AllCredentialsExhausted),
            AnalysisError::QuotaExhausted
        ));
        assert!(matches!(
            AnalysisError::from_chunk_failure(2, InferenceError::SafetyBlocked("x".into())),
            AnalysisError::SafetyBlocked { chunk: 2 }
        ));
        assert!(matches!(
            AnalysisError::from_chunk_failure(0, InferenceError::Transient("503".into())),
            AnalysisError::ChunkFailed { chunk: 0, .. }
        ));
    }

    #[test]
    fn stage_errors_render_their_cause() {
        let error = StageError::from(InferenceError::AllCredentialsExhausted);
        assert!(error.to_string().contains("exhausted"));
        let error = StageError::Unparseable {
            stage: "synthesis",
            reason: "no JSON value found".into(),
        };
        assert_eq!(
            error.to_string(),
            "Unparseable synthesis output: no JSON value found"
        );
    }

    #[test]
    fn chunk_failure_keeps_source() {
        let error = AnalysisError::from_chunk_failure(3, InferenceError::Transient("503".into()));
        let source = std::error::Error::source(&error).map(ToString::to_string);
        assert_eq!(source.as_deref(), Some("Transient inference failure: 503"));
    }
}
