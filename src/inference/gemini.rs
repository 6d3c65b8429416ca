//! Gemini `generateContent` REST transport.

use std::future::Future;
use std::pin::Pin;

use anyhow::Result;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::inference::client::{
    build_http_client, ClientMetadata, FinishReason, InferenceTransport, RawCompletion,
    SafetyConfig, TransportRequest,
};
use crate::inference::error::InferenceError;
use crate::inference::model_config::get_model_registry;

/// Public Gemini API endpoint.
pub const DEFAULT_API_BASE: &str = "https://generativelanguage.googleapis.com";

/// Sampling temperature; kept low for stable JSON output.
const TEMPERATURE: f32 = 0.1;
const TOP_P: f32 = 0.95;
const TOP_K: u32 = 64;

#[derive(Serialize, Deserialize, Debug, Default)]
struct Part {
    #[serde(default)]
    text: String,
}

#[derive(Serialize, Deserialize, Debug, Default)]
struct Content {
    #[serde(skip_serializing_if = "Option::is_none")]
    role: Option<String>,
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Serialize, Debug)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    temperature: f32,
    top_p: f32,
    top_k: u32,
    max_output_tokens: usize,
    response_mime_type: &'static str,
}

#[derive(Serialize, Debug)]
struct SafetySetting<'a> {
    category: &'a str,
    threshold: crate::inference::client::SafetyThreshold,
}

#[derive(Serialize, Debug)]
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<Content>,
    contents: Vec<Content>,
    generation_config: GenerationConfig,
    safety_settings: Vec<SafetySetting<'a>>,
}

#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    #[serde(default)]
    content: Option<Content>,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
struct PromptFeedback {
    #[serde(default)]
    block_reason: Option<String>,
}

#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
struct UsageMetadata {
    #[serde(default)]
    prompt_token_count: Option<u64>,
    #[serde(default)]
    candidates_token_count: Option<u64>,
}

#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    #[serde(default)]
    prompt_feedback: Option<PromptFeedback>,
    #[serde(default)]
    usage_metadata: Option<UsageMetadata>,
}

fn safety_settings(safety: &SafetyConfig) -> Vec<SafetySetting<'_>> {
    safety
        .categories
        .iter()
        .map(|category| SafetySetting {
            category,
            threshold: safety.threshold,
        })
        .collect()
}

/// Maps a non-success HTTP status to the error taxonomy.
///
/// Rate limiting and rejected keys both take the credential out of rotation.
/// Any other client error means the request itself is malformed and is not retried.
fn status_error(status: StatusCode, body: &str) -> InferenceError {
    let message = format!("HTTP {status}: {body}");
    match status {
        StatusCode::TOO_MANY_REQUESTS | StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
            InferenceError::QuotaExceeded(message)
        }
        StatusCode::BAD_REQUEST if body.contains("API_KEY_INVALID") => {
            InferenceError::QuotaExceeded(message)
        }
        StatusCode::REQUEST_TIMEOUT => InferenceError::Transient(message),
        status if status.is_client_error() => InferenceError::Rejected(message),
        _ => InferenceError::Transient(message),
    }
}

/// Gemini REST transport.
pub struct GeminiTransport {
    client: Client,
    model: String,
    api_base: String,
}

impl GeminiTransport {
    /// Creates a transport for `model` against the public endpoint.
    pub fn new(model: impl Into<String>) -> Result<Self> {
        let api_base = get_model_registry()
            .get_provider_config("gemini")
            .map_or_else(|| DEFAULT_API_BASE.to_string(), |p| p.api_base.clone());
        Ok(Self {
            client: build_http_client()?,
            model: model.into(),
            api_base,
        })
    }

    /// Overrides the API base URL.
    #[must_use]
    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into();
        self
    }

    fn endpoint(&self) -> String {
        let model = self.model.strip_prefix("models/").unwrap_or(&self.model);
        format!(
            "{}/v1beta/models/{}:generateContent",
            self.api_base.trim_end_matches('/'),
            model
        )
    }

    async fn send(
        &self,
        key: &str,
        request: &TransportRequest<'_>,
    ) -> Result<RawCompletion, InferenceError> {
        let body = GenerateContentRequest {
            system_instruction: (!request.system_context.is_empty()).then(|| Content {
                role: None,
                parts: vec![Part {
                    text: request.system_context.to_string(),
                }],
            }),
            contents: vec![Content {
                role: Some("user".to_string()),
                parts: vec![Part {
                    text: request.prompt.to_string(),
                }],
            }],
            generation_config: GenerationConfig {
                temperature: TEMPERATURE,
                top_p: TOP_P,
                top_k: TOP_K,
                max_output_tokens: request.output_ceiling,
                response_mime_type: "application/json",
            },
            safety_settings: safety_settings(request.safety),
        };

        let url = self.endpoint();
        info!(url = %url, model = %self.model, "Sending request to Gemini API");

        let response = self
            .client
            .post(&url)
            .header("x-goog-api-key", key)
            .json(&body)
            .send()
            .await
            .map_err(|e| InferenceError::Transient(format!("network error: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_else(|e| {
                debug!("Failed to read error response body: {e}");
                String::new()
            });
            return Err(status_error(status, &error_text));
        }

        let parsed: GenerateContentResponse = response
            .json()
            .await
            .map_err(|e| InferenceError::Transient(format!("invalid response body: {e}")))?;

        if let Some(usage) = &parsed.usage_metadata {
            debug!(
                prompt_tokens = ?usage.prompt_token_count,
                output_tokens = ?usage.candidates_token_count,
                "Gemini token usage"
            );
        }

        if let Some(reason) = parsed
            .prompt_feedback
            .as_ref()
            .and_then(|f| f.block_reason.as_deref())
        {
            return Err(InferenceError::SafetyBlocked(format!(
                "prompt blocked: {reason}"
            )));
        }

        let candidate = parsed.candidates.into_iter().next().ok_or_else(|| {
            InferenceError::Transient("response contained no candidates".to_string())
        })?;

        let text = candidate
            .content
            .map(|c| c.parts.into_iter().map(|p| p.text).collect::<String>())
            .unwrap_or_default();

        Ok(RawCompletion {
            text,
            finish_reason: FinishReason::from_wire(candidate.finish_reason.as_deref()),
        })
    }
}

impl InferenceTransport for GeminiTransport {
    fn generate<'a>(
        &'a self,
        key: &'a str,
        request: &'a TransportRequest<'a>,
    ) -> Pin<Box<dyn Future<Output = Result<RawCompletion, InferenceError>> + Send + 'a>> {
        Box::pin(self.send(key, request))
    }

    fn metadata(&self) -> ClientMetadata {
        let registry = get_model_registry();
        ClientMetadata {
            provider: "Google Gemini".to_string(),
            model: self.model.clone(),
            max_context_length: registry.get_input_context(&self.model),
            max_response_length: registry.get_max_output_tokens(&self.model),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const PATH: &str = "/v1beta/models/gemini-2.0-flash:generateContent";

    async fn transport(server: &MockServer) -> GeminiTransport {
        GeminiTransport::new("gemini-2.0-flash")
            .unwrap()
            .with_api_base(server.uri())
    }

    fn request(safety: &SafetyConfig) -> TransportRequest<'_> {
        TransportRequest {
            system_context: "You are a contract lawyer.",
            prompt: "Analyze",
            output_ceiling: 4096,
            safety,
        }
    }

    #[tokio::test]
    async fn successful_completion() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(PATH))
            .and(header("x-goog-api-key", "key-1"))
            .and(body_partial_json(json!({
                "generationConfig": {
                    "maxOutputTokens": 4096,
                    "responseMimeType": "application/json"
                },
                "systemInstruction": {"parts": [{"text": "You are a contract lawyer."}]}
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "candidates": [{
                    "content": {"role": "model", "parts": [{"text": "{\"analysis\":"}, {"text": "[]}"}]},
                    "finishReason": "STOP"
                }]
            })))
            .mount(&server)
            .await;

        let safety = SafetyConfig::default();
        let transport = transport(&server).await;
        let completion = transport.generate("key-1", &request(&safety)).await.unwrap();
        assert_eq!(completion.text, "{\"analysis\":[]}");
        assert_eq!(completion.finish_reason, FinishReason::Stop);
    }

    #[tokio::test]
    async fn sends_safety_settings() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(PATH))
            .and(body_partial_json(json!({
                "safetySettings": [
                    {"category": "HARM_CATEGORY_HARASSMENT", "threshold": "BLOCK_NONE"},
                    {"category": "HARM_CATEGORY_HATE_SPEECH", "threshold": "BLOCK_NONE"},
                    {"category": "HARM_CATEGORY_SEXUALLY_EXPLICIT", "threshold": "BLOCK_NONE"},
                    {"category": "HARM_CATEGORY_DANGEROUS_CONTENT", "threshold": "BLOCK_NONE"}
                ]
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "candidates": [{"content": {"parts": [{"text": "{}"}]}, "finishReason": "STOP"}]
            })))
            .mount(&server)
            .await;

        let safety = SafetyConfig::default();
        let transport = transport(&server).await;
        assert!(transport.generate("k", &request(&safety)).await.is_ok());
    }

    #[tokio::test]
    async fn max_tokens_keeps_partial_text() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(PATH))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "candidates": [{
                    "content": {"parts": [{"text": "{\"analysis\":[{\"id\":\"p1\""}]},
                    "finishReason": "MAX_TOKENS"
                }]
            })))
            .mount(&server)
            .await;

        let safety = SafetyConfig::default();
        let transport = transport(&server).await;
        let completion = transport.generate("k", &request(&safety)).await.unwrap();
        assert_eq!(completion.finish_reason, FinishReason::MaxTokens);
        assert_eq!(completion.text, "{\"analysis\":[{\"id\":\"p1\"");
    }

    #[tokio::test]
    async fn rate_limit_is_quota() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(PATH))
            .respond_with(
                ResponseTemplate::new(429).set_body_string("RESOURCE_EXHAUSTED"),
            )
            .mount(&server)
            .await;

        let safety = SafetyConfig::default();
        let transport = transport(&server).await;
        let err = transport.generate("k", &request(&safety)).await.unwrap_err();
        assert!(err.is_quota(), "{err:?}");
    }

    #[tokio::test]
    async fn server_error_is_transient() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(PATH))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let safety = SafetyConfig::default();
        let transport = transport(&server).await;
        assert!(matches!(
            transport.generate("k", &request(&safety)).await,
            Err(InferenceError::Transient(_))
        ));
    }

    #[tokio::test]
    async fn blocked_prompt_is_safety() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(PATH))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "promptFeedback": {"blockReason": "SAFETY"}
            })))
            .mount(&server)
            .await;

        let safety = SafetyConfig::default();
        let transport = transport(&server).await;
        assert!(matches!(
            transport.generate("k", &request(&safety)).await,
            Err(InferenceError::SafetyBlocked(_))
        ));
    }

    #[tokio::test]
    async fn undecodable_body_is_transient() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(PATH))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>"))
            .mount(&server)
            .await;

        let safety = SafetyConfig::default();
        let transport = transport(&server).await;
        assert!(matches!(
            transport.generate("k", &request(&safety)).await,
            Err(InferenceError::Transient(_))
        ));
    }

    #[tokio::test]
    async fn malformed_request_is_rejected() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(PATH))
            .respond_with(
                ResponseTemplate::new(400).set_body_string("Invalid JSON payload received"),
            )
            .expect(1)
            .mount(&server)
            .await;

        let safety = SafetyConfig::default();
        let transport = transport(&server).await;
        assert!(matches!(
            transport.generate("k", &request(&safety)).await,
            Err(InferenceError::Rejected(_))
        ));
    }

    #[test]
    fn status_mapping() {
        assert!(status_error(StatusCode::FORBIDDEN, "").is_quota());
        assert!(status_error(StatusCode::BAD_REQUEST, "reason: API_KEY_INVALID").is_quota());
        assert!(matches!(
            status_error(StatusCode::BAD_REQUEST, "bad field"),
            InferenceError::Rejected(_)
        ));
        assert!(matches!(
            status_error(StatusCode::NOT_FOUND, "model not found"),
            InferenceError::Rejected(_)
        ));
        assert!(matches!(
            status_error(StatusCode::UNPROCESSABLE_ENTITY, ""),
            InferenceError::Rejected(_)
        ));
        assert!(matches!(
            status_error(StatusCode::REQUEST_TIMEOUT, ""),
            InferenceError::Transient(_)
        ));
        assert!(matches!(
            status_error(StatusCode::INTERNAL_SERVER_ERROR, ""),
            InferenceError::Transient(_)
        ));
    }

    #[test]
    fn endpoint_strips_resource_prefix() {
        let transport = GeminiTransport::new("models/gemini-2.5-pro")
            .unwrap()
            .with_api_base("http://localhost:1234/");
        assert_eq!(
            transport.endpoint(),
            "http://localhost:1234/v1beta/models/gemini-2.5-pro:generateContent"
        );
        assert_eq!(transport.metadata().max_response_length, 65536);
    }
}
