//! Runtime switches flipped by operators while requests are in flight.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tracing::info;

use crate::config::SpecEditConfig;

#[derive(Debug)]
struct Flags {
    speculative_edit: AtomicBool,
    ngram_fallback: AtomicBool,
}

/// Shared handle to the runtime toggles. Clones observe the same flags.
///
/// Proposers re-read the flags on every call, so a flip takes effect on the
/// next decoding step. Nothing here is persisted.
#[derive(Debug, Clone)]
pub struct RuntimeToggles {
    flags: Arc<Flags>,
}

impl RuntimeToggles {
    pub fn new(speculative_edit: bool, ngram_fallback: bool) -> Self {
        Self {
            flags: Arc::new(Flags {
                speculative_edit: AtomicBool::new(speculative_edit),
                ngram_fallback: AtomicBool::new(ngram_fallback),
            }),
        }
    }

    pub fn from_config(config: &SpecEditConfig) -> Self {
        Self::new(config.spec_edit_enabled, config.ngram_fallback_enabled)
    }

    pub fn speculative_edit_enabled(&self) -> bool {
        self.flags.speculative_edit.load(Ordering::SeqCst)
    }

    pub fn set_speculative_edit(&self, enabled: bool) {
        let was = self.flags.speculative_edit.swap(enabled, Ordering::SeqCst);
        if was != enabled {
            info!(enabled, "speculative edit toggled");
        }
    }

    pub fn ngram_fallback_enabled(&self) -> bool {
        self.flags.ngram_fallback.load(Ordering::SeqCst)
    }

    pub fn set_ngram_fallback(&self, enabled: bool) {
        let was = self.flags.ngram_fallback.swap(enabled, Ordering::SeqCst);
        if was != enabled {
            info!(enabled, "n-gram fallback toggled");
        }
    }
}

impl Default for RuntimeToggles {
    fn default() -> Self {
        Self::new(true, true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_enable_both() {
        let toggles = RuntimeToggles::default();
        assert!(toggles.speculative_edit_enabled());
        assert!(toggles.ngram_fallback_enabled());
    }

    #[test]
    fn clones_share_flags() {
        let toggles = RuntimeToggles::default();
        let handle = toggles.clone();
        handle.set_speculative_edit(false);
        handle.set_ngram_fallback(false);
        assert!(!toggles.speculative_edit_enabled());
        assert!(!toggles.ngram_fallback_enabled());
    }

    #[test]
    fn from_config_uses_initial_values() {
        let config = SpecEditConfig {
            spec_edit_enabled: false,
            ..Default::default()
        };
        let toggles = RuntimeToggles::from_config(&config);
        assert!(!toggles.speculative_edit_enabled());
        assert!(toggles.ngram_fallback_enabled());
    }

    #[test]
    fn flips_are_visible_across_threads() {
        let toggles = RuntimeToggles::default();
        std::thread::scope(|s| {
            let handle = toggles.clone();
            s.spawn(move || handle.set_speculative_edit(false));
        });
        assert!(!toggles.speculative_edit_enabled());
    }
}
