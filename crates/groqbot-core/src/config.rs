//! Configuration management for groqbot.
//!
//! Loads configuration from ${GROQBOT_HOME}/config.toml with sensible defaults.
//! The file is only ever written by [`Config::init`].

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};

use crate::models::DEFAULT_MODEL;
use crate::prompts::SYSTEM_PROMPT;
use crate::providers::shared::{resolve_api_key, resolve_base_url};
use crate::providers::{
    API_KEY_ENV, BASE_URL_ENV, CompletionConfig, DEFAULT_BASE_URL, DEFAULT_MAX_TOKENS,
    DEFAULT_TEMPERATURE,
};

/// Returns the default config template with comments.
///
/// Embedded from default_config.toml at compile time.
fn default_config_template() -> &'static str {
    include_str!("../default_config.toml")
}

pub mod paths {
    //! Path resolution for the groqbot home directory.
    //!
    //! GROQBOT_HOME resolution order:
    //! 1. GROQBOT_HOME environment variable (if set)
    //! 2. ~/.config/groqbot (default)

    use std::path::PathBuf;

    /// Returns the groqbot home directory.
    pub fn groqbot_home() -> PathBuf {
        if let Ok(home) = std::env::var("GROQBOT_HOME") {
            return PathBuf::from(home);
        }

        dirs::home_dir().map_or_else(
            || PathBuf::from(".groqbot"),
            |h| h.join(".config").join("groqbot"),
        )
    }

    /// Returns the path to the config.toml file.
    pub fn config_path() -> PathBuf {
        groqbot_home().join("config.toml")
    }
}

/// Main configuration structure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Model for new sessions
    pub model: String,
    /// Sampling temperature sent with every request
    pub temperature: f64,
    /// Maximum tokens per reply
    pub max_tokens: u32,
    /// Replaces the built-in system instruction when non-empty
    pub system_prompt: Option<String>,
    /// Log to this file (daily rotation) instead of stderr
    pub log_file: Option<PathBuf>,
    pub provider: ProviderConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            model: DEFAULT_MODEL.to_string(),
            temperature: DEFAULT_TEMPERATURE,
            max_tokens: DEFAULT_MAX_TOKENS,
            system_prompt: None,
            log_file: None,
            provider: ProviderConfig::default(),
        }
    }
}

impl Config {
    /// Loads configuration from the default config path.
    ///
    /// # Errors
    /// Returns an error if the file exists but cannot be read or parsed.
    pub fn load() -> Result<Self> {
        Self::load_from(&paths::config_path())
    }

    /// Loads configuration from a specific path.
    /// Returns defaults if the file doesn't exist.
    ///
    /// # Errors
    /// Returns an error if the file cannot be read, parsed or validated.
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Config::default());
        }

        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config from {}", path.display()))?;
        let config: Config = toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config from {}", path.display()))?;
        config
            .validate()
            .with_context(|| format!("Invalid config in {}", path.display()))?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.model.trim().is_empty() {
            bail!("model must not be empty");
        }
        if !(0.0..=2.0).contains(&self.temperature) {
            bail!("temperature must be between 0.0 and 2.0, got {}", self.temperature);
        }
        if self.max_tokens == 0 {
            bail!("max_tokens must be greater than 0");
        }
        Ok(())
    }

    /// Creates a default config file at the given path.
    ///
    /// # Errors
    /// Returns an error if the file already exists or cannot be written.
    pub fn init(path: &Path) -> Result<()> {
        if path.exists() {
            bail!("Config file already exists at {}", path.display());
        }

        Self::write_config(path, default_config_template())
    }

    fn write_config(path: &Path, content: &str) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory {}", parent.display()))?;
        }

        let tmp_path = path.with_extension("toml.tmp");
        fs::write(&tmp_path, content)
            .with_context(|| format!("Failed to write config to {}", tmp_path.display()))?;
        fs::rename(&tmp_path, path).with_context(|| {
            format!(
                "Failed to rename {} to {}",
                tmp_path.display(),
                path.display()
            )
        })?;

        Ok(())
    }

    /// API key from `[provider]`, else `GROQ_API_KEY`.
    pub fn api_key(&self) -> Option<String> {
        resolve_api_key(self.provider.effective_api_key(), API_KEY_ENV)
    }

    /// System instruction: the configured one if non-empty, else the built-in.
    pub fn effective_system_prompt(&self) -> &str {
        self.system_prompt
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .unwrap_or(SYSTEM_PROMPT)
    }

    /// Builds the completion client settings.
    ///
    /// # Errors
    /// Returns an error if the configured or environment base URL is invalid.
    pub fn completion_config(&self) -> Result<CompletionConfig> {
        let base_url = resolve_base_url(
            self.provider.effective_base_url(),
            BASE_URL_ENV,
            DEFAULT_BASE_URL,
        )?;

        Ok(CompletionConfig {
            base_url,
            system_prompt: self.effective_system_prompt().to_string(),
            temperature: self.temperature,
            max_tokens: self.max_tokens,
        })
    }
}

/// Provider configuration (`[provider]`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct ProviderConfig {
    /// Optional API key (overrides environment variable).
    pub api_key: Option<String>,
    /// Optional API base URL (for proxies).
    pub base_url: Option<String>,
}

impl ProviderConfig {
    /// Returns the effective API key if set and non-empty.
    pub fn effective_api_key(&self) -> Option<&str> {
        self.api_key
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
    }

    /// Returns the effective base URL if set and non-empty.
    pub fn effective_base_url(&self) -> Option<&str> {
        self.base_url
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
    }
}
