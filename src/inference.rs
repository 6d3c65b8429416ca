//! Inference service integration: credentials, transport and model limits.

pub mod client;
pub mod credentials;
pub mod error;
pub mod gemini;
pub mod model_config;
pub mod token_budget;

#[cfg(test)]
pub(crate) mod test_utils;

pub use client::{
    ClientMetadata, FinishReason, InferenceClient, InferenceTransport, RawCompletion,
    SafetyConfig, SafetyThreshold, TransportRequest,
};
pub use credentials::{parse_credential_list, Credential, CredentialPool, CredentialUsage};
pub use error::InferenceError;
pub use gemini::GeminiTransport;
