//! Preflight validation checks for early failure detection.
//!
//! Commands call these before reading inputs or starting any inference.

use anyhow::{bail, Context, Result};

use super::settings::{self, Settings, KEYS_VAR, KEY_VAR};

/// Outcome of the credential check.
#[derive(Debug)]
pub struct CredentialInfo {
    /// Distinct keys found.
    pub keys: Vec<String>,
    /// Model that will be used.
    pub model: String,
}

/// Validates that at least one Gemini key is configured.
pub fn check_credentials(model: &str) -> Result<CredentialInfo> {
    let keys = settings::get_credentials().context("Failed to load settings")?;
    credentials_or_bail(keys, model)
}

fn credentials_or_bail(keys: Vec<String>, model: &str) -> Result<CredentialInfo> {
    if keys.is_empty() {
        let settings_path = Settings::get_settings_path()
            .map_or_else(|_| "settings.json".to_string(), |p| p.display().to_string());
        bail!(
            "No Gemini API key found.\n\
             Set {KEYS_VAR} (comma-separated) or {KEY_VAR}, \
             or add one of them under \"env\" in {settings_path}"
        );
    }
    Ok(CredentialInfo {
        keys,
        model: model.to_string(),
    })
}
