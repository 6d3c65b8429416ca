//! Inference model configuration and specifications.
//!
//! Model limits are loaded from an embedded YAML template so output ceilings
//! and prompt budgets match what the service actually accepts.

use std::collections::HashMap;
use std::sync::OnceLock;

use anyhow::Result;
use serde::Deserialize;

/// Embedded model registry source.
pub const MODELS_YAML: &str = include_str!("../templates/models.yaml");

/// Output ceiling used when neither the model nor its provider is known.
const FALLBACK_MAX_OUTPUT_TOKENS: usize = 8192;

/// Input context used when neither the model nor its provider is known.
const FALLBACK_INPUT_CONTEXT: usize = 128_000;

/// Model specification from YAML configuration.
#[derive(Debug, Deserialize, Clone)]
pub struct ModelSpec {
    /// Provider key (e.g., "gemini").
    pub provider: String,
    /// Human-readable model name.
    pub model: String,
    /// API identifier used in request URLs.
    pub api_identifier: String,
    /// Maximum number of tokens that can be generated in a single response.
    pub max_output_tokens: usize,
    /// Maximum number of tokens accepted as input.
    pub input_context: usize,
    /// Whether this is a legacy model that may be withdrawn.
    #[serde(default)]
    pub legacy: bool,
}

/// Default fallback configuration for a provider.
#[derive(Debug, Deserialize)]
pub struct DefaultConfig {
    /// Default maximum output tokens for unknown models.
    pub max_output_tokens: usize,
    /// Default input context for unknown models.
    pub input_context: usize,
}

/// Provider-specific configuration.
#[derive(Debug, Deserialize)]
pub struct ProviderConfig {
    /// Human-readable provider name.
    pub name: String,
    /// Base URL for API requests.
    pub api_base: String,
    /// Model used when none is configured.
    pub default_model: String,
    /// Limits for unknown models of this provider.
    pub defaults: DefaultConfig,
}

/// Complete model configuration.
#[derive(Debug, Deserialize)]
pub struct ModelConfiguration {
    /// All known models.
    pub models: Vec<ModelSpec>,
    /// Provider-specific configurations.
    pub providers: HashMap<String, ProviderConfig>,
}

/// Model registry for looking up specifications.
pub struct ModelRegistry {
    config: ModelConfiguration,
    by_identifier: HashMap<String, ModelSpec>,
}

impl ModelRegistry {
    /// Loads the model registry from the embedded YAML.
    pub fn load() -> Result<Self> {
        let config: ModelConfiguration = serde_yaml::from_str(MODELS_YAML)?;
        let by_identifier = config
            .models
            .iter()
            .map(|m| (m.api_identifier.clone(), m.clone()))
            .collect();

        Ok(Self {
            config,
            by_identifier,
        })
    }

    /// Returns the model specification for an API identifier.
    ///
    /// Accepts the `models/` resource prefix and `-latest` / dated suffixes
    /// used by the Gemini API.
    pub fn get_model_spec(&self, api_identifier: &str) -> Option<&ModelSpec> {
        let core = Self::core_identifier(api_identifier);
        self.by_identifier.get(core).or_else(|| {
            self.config
                .models
                .iter()
                .filter(|m| core.starts_with(&m.api_identifier))
                .max_by_key(|m| m.api_identifier.len())
        })
    }

    /// Returns max output tokens for a model, with fallback to provider defaults.
    pub fn get_max_output_tokens(&self, api_identifier: &str) -> usize {
        if let Some(spec) = self.get_model_spec(api_identifier) {
            return spec.max_output_tokens;
        }
        self.provider_defaults(api_identifier)
            .map_or(FALLBACK_MAX_OUTPUT_TOKENS, |d| d.max_output_tokens)
    }

    /// Returns the input context limit for a model, with fallback to provider defaults.
    pub fn get_input_context(&self, api_identifier: &str) -> usize {
        if let Some(spec) = self.get_model_spec(api_identifier) {
            return spec.input_context;
        }
        self.provider_defaults(api_identifier)
            .map_or(FALLBACK_INPUT_CONTEXT, |d| d.input_context)
    }

    /// Returns true if the model is marked legacy.
    pub fn is_legacy_model(&self, api_identifier: &str) -> bool {
        self.get_model_spec(api_identifier)
            .is_some_and(|spec| spec.legacy)
    }

    /// Returns all known models.
    pub fn get_all_models(&self) -> &[ModelSpec] {
        &self.config.models
    }

    /// Returns a provider's configuration.
    pub fn get_provider_config(&self, provider: &str) -> Option<&ProviderConfig> {
        self.config.providers.get(provider)
    }

    fn provider_defaults(&self, api_identifier: &str) -> Option<&DefaultConfig> {
        let provider = Self::infer_provider(api_identifier)?;
        self.config.providers.get(provider).map(|p| &p.defaults)
    }

    fn infer_provider(api_identifier: &str) -> Option<&'static str> {
        Self::core_identifier(api_identifier)
            .starts_with("gemini")
            .then_some("gemini")
    }

    fn core_identifier(api_identifier: &str) -> &str {
        api_identifier
            .strip_prefix("models/")
            .unwrap_or(api_identifier)
    }
}

/// Global model registry instance.
static MODEL_REGISTRY: OnceLock<ModelRegistry> = OnceLock::new();

/// Returns the global model registry instance.
pub fn get_model_registry() -> &'static ModelRegistry {
    MODEL_REGISTRY.get_or_init(|| ModelRegistry::load().expect("embedded models.yaml is valid"))
}
