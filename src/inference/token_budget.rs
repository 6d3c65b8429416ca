//! Token estimation and budget validation for inference requests.
//!
//! Provides a lightweight heuristic to estimate token counts from text and
//! validates that assembled prompts fit within a model's input context window
//! before any request is sent.

use crate::inference::client::ClientMetadata;

/// Approximate characters per token for heuristic estimation.
///
/// Counted in Unicode scalar values so Cyrillic contract text is not
/// over-counted by its two-byte UTF-8 encoding.
pub const CHARS_PER_TOKEN: f64 = 3.5;

/// Safety margin multiplier applied to token estimates.
///
/// Adds 10% overhead to account for tokenizer variance.
const SAFETY_MARGIN: f64 = 1.10;

/// Estimates the token count for a text string using a character-based heuristic.
#[must_use]
pub fn estimate_tokens(text: &str) -> usize {
    estimate_tokens_from_char_count(text.chars().count())
}

/// Estimates token count from a pre-computed character count.
#[must_use]
pub fn estimate_tokens_from_char_count(char_count: usize) -> usize {
    let raw_estimate = char_count as f64 / CHARS_PER_TOKEN;
    (raw_estimate * SAFETY_MARGIN).ceil() as usize
}

/// Result of a token budget validation.
#[derive(Debug, Clone)]
pub struct TokenEstimate {
    /// Estimated total prompt tokens (system + user).
    pub estimated_tokens: usize,
    /// Maximum available input tokens for this model.
    pub available_tokens: usize,
    /// Utilization percentage (0.0 to 100.0+).
    pub utilization_pct: f64,
}

/// A prompt that does not fit the model's input budget.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BudgetExceeded {
    /// Estimated prompt tokens.
    pub estimated_tokens: usize,
    /// Tokens available after reserving output.
    pub max_tokens: usize,
    /// Model identifier.
    pub model: String,
}

/// Token budget derived from model metadata.
#[derive(Debug, Clone)]
pub struct TokenBudget {
    /// Model identifier (for error messages).
    model: String,
    /// Total context window (input + output).
    max_context_length: usize,
    /// Tokens reserved for the model's response.
    reserved_output_tokens: usize,
}

impl TokenBudget {
    /// Creates a token budget from client metadata, reserving `output_ceiling`
    /// tokens for the response.
    #[must_use]
    pub fn from_metadata(metadata: &ClientMetadata, output_ceiling: usize) -> Self {
        Self {
            model: metadata.model.clone(),
            max_context_length: metadata.max_context_length,
            reserved_output_tokens: output_ceiling.min(metadata.max_response_length),
        }
    }

    /// Returns the maximum number of input tokens available after reserving
    /// output tokens.
    #[must_use]
    pub fn available_input_tokens(&self) -> usize {
        self.max_context_length
            .saturating_sub(self.reserved_output_tokens)
    }

    /// Validates that the combined prompt fits within the model's input token
    /// budget.
    pub fn validate_prompt(
        &self,
        system_prompt: &str,
        user_prompt: &str,
    ) -> Result<TokenEstimate, BudgetExceeded> {
        let estimated_tokens = estimate_tokens(system_prompt) + estimate_tokens(user_prompt);
        let available = self.available_input_tokens();
        let utilization_pct = if available > 0 {
            (estimated_tokens as f64 / available as f64) * 100.0
        } else {
            f64::INFINITY
        };

        if estimated_tokens > available {
            return Err(BudgetExceeded {
                estimated_tokens,
                max_tokens: available,
                model: self.model.clone(),
            });
        }

        Ok(TokenEstimate {
            estimated_tokens,
            available_tokens: available,
            utilization_pct,
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    fn make_metadata(context: usize, response: usize) -> ClientMetadata {
        ClientMetadata {
            provider: "test".to_string(),
            model: "test-model".to_string(),
            max_context_length: context,
            max_response_length: response,
        }
    }

    #[test]
    fn estimate_tokens_empty_string() {
        assert_eq!(estimate_tokens(""), 0);
    }

    #[test]
    fn estimate_tokens_short_text() {
        // 5 chars -> 5/3.5 * 1.10 = 1.571... -> ceil = 2
        assert_eq!(estimate_tokens("hello"), 2);
    }

    #[test]
    fn estimate_tokens_counts_chars_not_bytes() {
        assert_eq!(estimate_tokens("привет"), estimate_tokens("abcdef"));
    }

    #[test]
    fn estimate_tokens_includes_safety_margin() {
        let text = "x".repeat(3500);
        assert_eq!(estimate_tokens(&text), 1100);
    }

    #[test]
    fn budget_reserves_output_ceiling() {
        let budget = TokenBudget::from_metadata(&make_metadata(100_000, 8_192), 4_000);
        assert_eq!(budget.available_input_tokens(), 96_000);
    }

    #[test]
    fn budget_validation_within_limits() {
        let budget = TokenBudget::from_metadata(&make_metadata(200_000, 64_000), 64_000);
        let estimate = budget.validate_prompt("system", "user").unwrap();
        assert!(estimate.utilization_pct < 1.0);
        assert_eq!(estimate.available_tokens, 136_000);
    }

    #[test]
    fn budget_validation_exceeds_limits() {
        let budget = TokenBudget::from_metadata(&make_metadata(1000, 500), 500);
        let large_text = "x".repeat(2000);
        let err = budget.validate_prompt(&large_text, "user").unwrap_err();
        assert_eq!(err.max_tokens, 500);
        assert_eq!(err.model, "test-model");
    }

    #[test]
    fn budget_saturates_when_output_exceeds_context() {
        let budget = TokenBudget::from_metadata(&make_metadata(100, 200), 200);
        assert!(budget.validate_prompt("a", "b").is_err());
    }
}
