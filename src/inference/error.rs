//! Inference-specific error handling.

use thiserror::Error;

/// Failure of a single inference call or of credential acquisition.
///
/// Variants are `Clone` so a unit of work can record the error it last saw
/// while it keeps retrying.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum InferenceError {
    /// No credentials were configured.
    #[error(
        "No inference credentials configured. Set GEMINI_API_KEYS (comma-separated) or GEMINI_API_KEY"
    )]
    NoCredentials,

    /// Every credential in the pool has been rejected for quota.
    #[error("All inference credentials have exhausted their quota")]
    AllCredentialsExhausted,

    /// The service rejected the credential for quota or authorization.
    #[error("Quota exceeded: {0}")]
    QuotaExceeded(String),

    /// The service blocked the prompt or the response for safety.
    #[error("Response blocked by safety filter: {0}")]
    SafetyBlocked(String),

    /// The response hit the output ceiling; carries the text produced so far.
    #[error("Response truncated at the output ceiling ({} chars received)", partial.len())]
    Truncated {
        /// Text returned before truncation.
        partial: String,
    },

    /// The service refused the request itself; resending it cannot succeed.
    #[error("Request rejected: {0}")]
    Rejected(String),

    /// Network failure, server error or an unusable response body.
    #[error("Transient inference failure: {0}")]
    Transient(String),
}

impl InferenceError {
    /// Returns true when the error means the credential should leave rotation.
    pub fn is_quota(&self) -> bool {
        matches!(self, Self::QuotaExceeded(_))
    }
}
