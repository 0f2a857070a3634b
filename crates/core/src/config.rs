//! Static engine configuration.
//!
//! Everything here is read once at startup. Values that may change while
//! requests are in flight live in [`RuntimeToggles`](crate::RuntimeToggles).

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::matcher::{MatcherBackend, MatcherConfig};

/// Upper bound on draft tokens per step.
pub const MAX_SPEC_LEN: usize = 128;

/// Configuration errors, surfaced at startup.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid configuration: {0}")]
    Invalid(String),

    #[error("matcher backend '{0}' is not compiled in")]
    BackendUnavailable(&'static str),
}

/// Speculative-edit settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SpecEditConfig {
    pub backend: MatcherBackend,
    /// Draft tokens requested per step, before the context budget clamp.
    pub num_speculative_tokens: usize,
    /// Model context limit; drafts never run past it.
    pub max_model_len: usize,
    /// Live sessions kept before the oldest is evicted.
    pub max_sessions: usize,
    /// Fail at startup instead of falling back when `backend` is missing.
    pub strict_backend: bool,
    /// Initial value of the speculative-edit toggle.
    pub spec_edit_enabled: bool,
    /// Initial value of the n-gram fallback toggle.
    pub ngram_fallback_enabled: bool,
    pub matcher: MatcherConfig,
}

impl Default for SpecEditConfig {
    fn default() -> Self {
        Self {
            backend: MatcherBackend::default(),
            num_speculative_tokens: 40,
            max_model_len: 8192,
            max_sessions: 1000,
            strict_backend: false,
            spec_edit_enabled: true,
            ngram_fallback_enabled: true,
            matcher: MatcherConfig::default(),
        }
    }
}

impl SpecEditConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.num_speculative_tokens == 0 {
            return Err(ConfigError::Invalid(
                "num_speculative_tokens must be at least 1".into(),
            ));
        }
        if self.num_speculative_tokens > MAX_SPEC_LEN {
            return Err(ConfigError::Invalid(format!(
                "num_speculative_tokens {} exceeds the maximum of {MAX_SPEC_LEN}",
                self.num_speculative_tokens
            )));
        }
        if self.max_model_len == 0 {
            return Err(ConfigError::Invalid("max_model_len must be positive".into()));
        }
        if self.max_sessions == 0 {
            return Err(ConfigError::Invalid("max_sessions must be positive".into()));
        }
        if self.matcher.window.divisor == 0 {
            return Err(ConfigError::Invalid("matcher.window.divisor must be positive".into()));
        }
        if self.matcher.window.reference_factor == 0 {
            return Err(ConfigError::Invalid(
                "matcher.window.reference_factor must be positive".into(),
            ));
        }
        Ok(())
    }

    /// Validate and resolve the backend against what was compiled in.
    pub fn resolved(mut self) -> Result<Self, ConfigError> {
        self.validate()?;
        self.backend = self.backend.resolve(self.strict_backend)?;
        Ok(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = SpecEditConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.num_speculative_tokens, 40);
        assert_eq!(config.max_model_len, 8192);
        assert_eq!(config.max_sessions, 1000);
        assert_eq!(config.matcher.window.divisor, 15);
        assert!(!config.matcher.autojunk);
    }

    #[test]
    fn zero_budget_is_rejected() {
        let config = SpecEditConfig {
            num_speculative_tokens: 0,
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn oversized_budget_is_rejected() {
        let config = SpecEditConfig {
            num_speculative_tokens: MAX_SPEC_LEN + 1,
            ..Default::default()
        };
        let err = config.validate().unwrap_err();
        assert_eq!(
            err.to_string(),
            "invalid configuration: num_speculative_tokens 129 exceeds the maximum of 128"
        );
    }

    #[test]
    fn zero_window_divisor_is_rejected() {
        let mut config = SpecEditConfig::default();
        config.matcher.window.divisor = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn resolved_keeps_available_backend() {
        let config = SpecEditConfig {
            backend: MatcherBackend::Indexed,
            strict_backend: true,
            ..Default::default()
        };
        assert_eq!(config.resolved().unwrap().backend, MatcherBackend::Indexed);
    }

    #[test]
    fn partial_json_fills_defaults() {
        let config: SpecEditConfig =
            serde_json::from_str(r#"{"backend": "indexed", "matcher": {"autojunk": true}}"#)
                .unwrap();
        assert_eq!(config.backend, MatcherBackend::Indexed);
        assert!(config.matcher.autojunk);
        assert_eq!(config.matcher.min_tail_match, 2);
        assert_eq!(config.num_speculative_tokens, 40);
    }

    #[test]
    fn error_display_backend_unavailable() {
        let e = ConfigError::BackendUnavailable("parallel");
        assert_eq!(e.to_string(), "matcher backend 'parallel' is not compiled in");
    }
}
