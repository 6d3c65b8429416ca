//! Inference client: one request, one completion-reason signal.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::inference::credentials::Credential;
use crate::inference::error::InferenceError;

/// HTTP request timeout for inference calls.
///
/// Generous enough for an 8k-token JSON answer over a full chunk prompt.
pub(crate) const REQUEST_TIMEOUT: Duration = Duration::from_secs(300);

/// Builds an HTTP client with the standard request timeout.
pub(crate) fn build_http_client() -> Result<Client> {
    Client::builder()
        .timeout(REQUEST_TIMEOUT)
        .build()
        .context("Failed to build HTTP client")
}

/// Metadata about an inference transport.
#[derive(Clone, Debug)]
pub struct ClientMetadata {
    /// Service provider name.
    pub provider: String,
    /// Model identifier.
    pub model: String,
    /// Maximum context length supported.
    pub max_context_length: usize,
    /// Maximum token response length supported.
    pub max_response_length: usize,
}

/// Blocking threshold applied to every safety category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SafetyThreshold {
    /// Never block.
    BlockNone,
    /// Block only high-probability harm.
    BlockOnlyHigh,
    /// Block medium and high.
    BlockMediumAndAbove,
    /// Block low, medium and high.
    BlockLowAndAbove,
}

/// Safety filtering attached to every request.
///
/// Contract text routinely mentions penalties, liability and damages, so the
/// default threshold is the most permissive one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SafetyConfig {
    /// Threshold applied to each category.
    pub threshold: SafetyThreshold,
    /// Harm categories the threshold is applied to.
    pub categories: Vec<String>,
}

impl Default for SafetyConfig {
    fn default() -> Self {
        Self {
            threshold: SafetyThreshold::BlockNone,
            categories: [
                "HARM_CATEGORY_HARASSMENT",
                "HARM_CATEGORY_HATE_SPEECH",
                "HARM_CATEGORY_SEXUALLY_EXPLICIT",
                "HARM_CATEGORY_DANGEROUS_CONTENT",
            ]
            .into_iter()
            .map(String::from)
            .collect(),
        }
    }
}

/// One request as seen by the transport.
#[derive(Debug, Clone)]
pub struct TransportRequest<'a> {
    /// System instruction.
    pub system_context: &'a str,
    /// User prompt.
    pub prompt: &'a str,
    /// Output ceiling in tokens, already clamped to the model maximum.
    pub output_ceiling: usize,
    /// Safety filtering.
    pub safety: &'a SafetyConfig,
}

/// Why the service stopped generating.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FinishReason {
    /// Normal end of output.
    Stop,
    /// Output hit the ceiling.
    MaxTokens,
    /// Output was blocked by a safety filter.
    Safety,
    /// Anything else the service reports.
    Other(String),
}

impl FinishReason {
    /// Maps a Gemini `finishReason` value; a missing value means a normal stop.
    pub fn from_wire(reason: Option<&str>) -> Self {
        match reason {
            None | Some("STOP") => Self::Stop,
            Some("MAX_TOKENS") => Self::MaxTokens,
            Some("SAFETY" | "PROHIBITED_CONTENT" | "BLOCKLIST" | "SPII") => Self::Safety,
            Some(other) => Self::Other(other.to_string()),
        }
    }
}

/// Raw transport output before completion-reason mapping.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawCompletion {
    /// Concatenated response text.
    pub text: String,
    /// Completion signal.
    pub finish_reason: FinishReason,
}

/// Network side of the inference client.
pub trait InferenceTransport: Send + Sync {
    /// Sends one request authenticated with `key`.
    fn generate<'a>(
        &'a self,
        key: &'a str,
        request: &'a TransportRequest<'a>,
    ) -> Pin<Box<dyn Future<Output = Result<RawCompletion, InferenceError>> + Send + 'a>>;

    /// Returns metadata about the transport and its model.
    fn metadata(&self) -> ClientMetadata;
}

/// Issues single inference calls and maps completion reasons to errors.
#[derive(Clone)]
pub struct InferenceClient {
    transport: Arc<dyn InferenceTransport>,
    safety: SafetyConfig,
    metadata: ClientMetadata,
}

impl InferenceClient {
    /// Creates a client over a transport with the given safety configuration.
    pub fn new(transport: Arc<dyn InferenceTransport>, safety: SafetyConfig) -> Self {
        let metadata = transport.metadata();
        Self {
            transport,
            safety,
            metadata,
        }
    }

    /// Returns the transport metadata.
    pub fn metadata(&self) -> &ClientMetadata {
        &self.metadata
    }

    /// Clamps a requested output ceiling to what the model accepts.
    pub fn effective_ceiling(&self, requested: usize) -> usize {
        requested.min(self.metadata.max_response_length).max(1)
    }

    /// Sends one request and returns the completion text.
    ///
    /// A size-limit stop is returned as [`InferenceError::Truncated`] carrying
    /// the partial text; an empty normal stop counts as transient.
    pub async fn complete(
        &self,
        credential: &Credential,
        system_context: &str,
        prompt: &str,
        output_ceiling: usize,
    ) -> Result<String, InferenceError> {
        let request = TransportRequest {
            system_context,
            prompt,
            output_ceiling: self.effective_ceiling(output_ceiling),
            safety: &self.safety,
        };

        debug!(
            credential = %credential,
            model = %self.metadata.model,
            prompt_len = prompt.len(),
            output_ceiling = request.output_ceiling,
            "Sending inference request"
        );
        debug!(prompt = %prompt, "Inference prompt content");

        let raw = self.transport.generate(credential.key(), &request).await?;

        debug!(
            response_len = raw.text.len(),
            finish_reason = ?raw.finish_reason,
            "Received inference response"
        );
        debug!(response = %raw.text, "Inference response content");

        match raw.finish_reason {
            FinishReason::Stop if raw.text.trim().is_empty() => Err(InferenceError::Transient(
                "service returned an empty response".to_string(),
            )),
            FinishReason::Stop => Ok(raw.text),
            FinishReason::MaxTokens => Err(InferenceError::Truncated { partial: raw.text }),
            FinishReason::Safety => Err(InferenceError::SafetyBlocked(
                "finish reason SAFETY".to_string(),
            )),
            FinishReason::Other(reason) => Err(InferenceError::Transient(format!(
                "unexpected finish reason {reason}"
            ))),
        }
    }
}

impl std::fmt::Debug for InferenceClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InferenceClient")
            .field("metadata", &self.metadata)
            .field("safety", &self.safety)
            .finish()
    }
}
