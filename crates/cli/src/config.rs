//! Configuration persistence for the specedit CLI.
//!
//! Configuration is loaded with the following priority:
//! 1. CLI arguments (highest priority)
//! 2. Config file (~/.config/specedit/config.toml)
//! 3. Default values (lowest priority)

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use specedit_core::{MatcherBackend, SpecEditConfig};

/// Persistent configuration stored in TOML format.
///
/// Every field is optional; unset fields keep the library default.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CliConfig {
    /// Matcher backend (sequential, parallel, indexed).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub backend: Option<MatcherBackend>,

    /// Draft tokens per step.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub num_speculative_tokens: Option<usize>,

    /// Maximum model context length.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_model_len: Option<usize>,

    /// Live sessions before the oldest is evicted.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_sessions: Option<usize>,

    /// Refuse to start when the backend is not compiled in.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub strict_backend: Option<bool>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub spec_edit_enabled: Option<bool>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub ngram_fallback_enabled: Option<bool>,

    /// Window length divisor applied to the reference length.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub window_divisor: Option<usize>,

    /// Shortest window that is ever applied.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_window: Option<usize>,

    /// Reference window length in windows.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reference_factor: Option<usize>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub autojunk: Option<bool>,

    /// Shortest trailing match that may trigger a draft.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_tail_match: Option<usize>,

    /// Log level used when RUST_LOG is unset.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub log_level: Option<String>,
}

impl CliConfig {
    /// Get the default config file path.
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("specedit").join("config.toml"))
    }

    /// Load configuration from the default path. A missing or unreadable
    /// file yields the defaults.
    pub fn load() -> Self {
        Self::default_path()
            .and_then(|path| Self::load_from(&path).ok())
            .unwrap_or_default()
    }

    /// Load configuration from a specific path.
    pub fn load_from(path: &Path) -> Result<Self, ConfigFileError> {
        let content = fs::read_to_string(path)?;
        Ok(toml::from_str(&content)?)
    }

    /// Save configuration to the default path.
    pub fn save(&self) -> Result<PathBuf, ConfigFileError> {
        let path = Self::default_path().ok_or(ConfigFileError::NoConfigDir)?;
        self.save_to(&path)?;
        Ok(path)
    }

    /// Save configuration to a specific path, creating parent directories.
    pub fn save_to(&self, path: &Path) -> Result<(), ConfigFileError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, self.to_toml()?)?;
        Ok(())
    }

    pub fn to_toml(&self) -> Result<String, ConfigFileError> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Merge with another config, preferring values from `other`.
    pub fn merge(&mut self, other: &CliConfig) {
        if other.backend.is_some() {
            self.backend = other.backend;
        }
        if other.num_speculative_tokens.is_some() {
            self.num_speculative_tokens = other.num_speculative_tokens;
        }
        if other.max_model_len.is_some() {
            self.max_model_len = other.max_model_len;
        }
        if other.max_sessions.is_some() {
            self.max_sessions = other.max_sessions;
        }
        if other.strict_backend.is_some() {
            self.strict_backend = other.strict_backend;
        }
        if other.spec_edit_enabled.is_some() {
            self.spec_edit_enabled = other.spec_edit_enabled;
        }
        if other.ngram_fallback_enabled.is_some() {
            self.ngram_fallback_enabled = other.ngram_fallback_enabled;
        }
        if other.window_divisor.is_some() {
            self.window_divisor = other.window_divisor;
        }
        if other.min_window.is_some() {
            self.min_window = other.min_window;
        }
        if other.reference_factor.is_some() {
            self.reference_factor = other.reference_factor;
        }
        if other.autojunk.is_some() {
            self.autojunk = other.autojunk;
        }
        if other.min_tail_match.is_some() {
            self.min_tail_match = other.min_tail_match;
        }
        if other.log_level.is_some() {
            self.log_level = other.log_level.clone();
        }
    }

    /// Library configuration with every set field applied over the
    /// defaults. Not validated.
    pub fn to_spec_config(&self) -> SpecEditConfig {
        let mut config = SpecEditConfig::default();
        if let Some(backend) = self.backend {
            config.backend = backend;
        }
        if let Some(n) = self.num_speculative_tokens {
            config.num_speculative_tokens = n;
        }
        if let Some(len) = self.max_model_len {
            config.max_model_len = len;
        }
        if let Some(n) = self.max_sessions {
            config.max_sessions = n;
        }
        if let Some(strict) = self.strict_backend {
            config.strict_backend = strict;
        }
        if let Some(enabled) = self.spec_edit_enabled {
            config.spec_edit_enabled = enabled;
        }
        if let Some(enabled) = self.ngram_fallback_enabled {
            config.ngram_fallback_enabled = enabled;
        }

        let matcher = &mut config.matcher;
        if let Some(divisor) = self.window_divisor {
            matcher.window.divisor = divisor;
        }
        if let Some(min_window) = self.min_window {
            matcher.window.min_window = min_window;
        }
        if let Some(factor) = self.reference_factor {
            matcher.window.reference_factor = factor;
        }
        if let Some(autojunk) = self.autojunk {
            matcher.autojunk = autojunk;
        }
        if let Some(min_tail_match) = self.min_tail_match {
            matcher.min_tail_match = min_tail_match;
        }
        config
    }
}

/// Configuration file errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigFileError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("parse error: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("serialize error: {0}")]
    Serialize(#[from] toml::ser::Error),
    #[error("no config directory available")]
    NoConfigDir,
}
