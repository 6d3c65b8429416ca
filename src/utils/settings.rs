//! Settings and credential discovery.
//!
//! Values are read from the environment first, then from
//! `$HOME/.contract-analyst/settings.json`.

use std::collections::HashMap;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::inference::parse_credential_list;

/// Comma-delimited list of Gemini API keys.
pub const KEYS_VAR: &str = "GEMINI_API_KEYS";
/// Single Gemini API key, used when [`KEYS_VAR`] is unset.
pub const KEY_VAR: &str = "GEMINI_API_KEY";

/// Settings loaded from `$HOME/.contract-analyst/settings.json`.
#[derive(Debug, Default, Deserialize)]
pub struct Settings {
    /// Environment variable overrides.
    #[serde(default)]
    pub env: HashMap<String, String>,
}

impl Settings {
    /// Loads settings from the default location.
    pub fn load() -> Result<Self> {
        let settings_path = Self::get_settings_path()?;
        Self::load_from_path(&settings_path)
    }

    /// Loads settings from a specific path; a missing file yields empty settings.
    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read settings file: {}", path.display()))?;
        serde_json::from_str::<Self>(&content)
            .with_context(|| format!("Failed to parse settings file: {}", path.display()))
    }

    /// Returns the default settings path.
    pub fn get_settings_path() -> Result<PathBuf> {
        let home_dir = dirs::home_dir().context("Failed to determine home directory")?;
        Ok(home_dir.join(".contract-analyst").join("settings.json"))
    }

    /// Returns an environment variable with fallback to settings.
    pub fn get_env_var(&self, key: &str) -> Option<String> {
        env::var(key).ok().or_else(|| self.env.get(key).cloned())
    }

    /// Returns the Gemini keys visible through these settings.
    pub fn credentials(&self) -> Vec<String> {
        credentials_from(|key| self.get_env_var(key))
    }
}

/// Resolves the key list through `lookup`.
///
/// A non-empty [`KEYS_VAR`] wins over [`KEY_VAR`]; both are split on commas
/// and deduplicated.
pub fn credentials_from<F>(lookup: F) -> Vec<String>
where
    F: Fn(&str) -> Option<String>,
{
    [KEYS_VAR, KEY_VAR]
        .into_iter()
        .filter_map(&lookup)
        .map(|raw| parse_credential_list(&raw))
        .find(|keys| !keys.is_empty())
        .unwrap_or_default()
}

/// Returns the Gemini keys from the environment or the settings file.
pub fn get_credentials() -> Result<Vec<String>> {
    let settings = Settings::load()?;
    Ok(settings.credentials())
}
