//! Agent configuration
//!
//! Loaded from a TOML file with every field optional; missing fields fall
//! back to defaults so a partial config stays valid across releases.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::error::{Error, Result};

/// Session and adapter settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    /// Provider id (openai, anthropic, gemini, groq, deepseek, ollama)
    pub provider: String,
    /// Decision model; the provider default is used when unset
    pub model: Option<String>,
    /// API key; falls back to the provider's environment variable
    pub api_key: Option<String>,
    /// Small model for the peek pre-classifier
    pub peek_model: Option<String>,
    /// Model for the presentation rewrite pass
    pub presentation_model: Option<String>,
    /// Route direct answers through the peek classifier
    pub enable_peek: bool,
    /// Rewrite direct answers with the presentation model
    pub enable_presentation: bool,
    /// Messages kept after the seed when truncating history
    pub history_tail: usize,
    /// Maximum decide/invoke rounds within one turn
    pub max_capability_rounds: usize,
    /// Timeout for one decision model call, in seconds
    pub decision_timeout_secs: u64,
    /// Timeout for one capability invocation, in seconds
    pub capability_timeout_secs: u64,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            provider: "openai".to_string(),
            model: None,
            api_key: None,
            peek_model: Some("gpt-4.1-nano".to_string()),
            presentation_model: None,
            enable_peek: false,
            enable_presentation: false,
            history_tail: 16,
            max_capability_rounds: 8,
            decision_timeout_secs: 120,
            capability_timeout_secs: 30,
        }
    }
}

impl AgentConfig {
    /// Default config file location
    pub fn default_path() -> Result<PathBuf> {
        let base = dirs::config_dir()
            .ok_or_else(|| Error::Config("could not determine config directory".to_string()))?;
        Ok(base.join("tabletalk").join("config.toml"))
    }

    /// Load from a TOML file, returning defaults when the file is absent
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            debug!(path = %path.display(), "config file absent, using defaults");
            return Ok(Self::default());
        }
        let text = std::fs::read_to_string(path)?;
        toml::from_str(&text).map_err(|e| Error::Config(format!("{}: {e}", path.display())))
    }

    /// Write the config as TOML, creating parent directories as needed
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let text = toml::to_string_pretty(self)
            .map_err(|e| Error::Config(format!("serialize config: {e}")))?;
        std::fs::write(path, text)?;
        Ok(())
    }
}
