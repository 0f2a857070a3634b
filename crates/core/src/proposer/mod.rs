//! Draft proposal for the host engine's decoding loop.
//!
//! [`SpecEditProposer`] holds the per-step decision: propose from the
//! request's reference when speculative edit is on and the request has a
//! session, otherwise defer to a [`FallbackProposer`] when the n-gram toggle
//! allows it. Engines reach it through one of two [`DraftProposer`]
//! adapters:
//!
//! - [`PerRequestAdapter`]: engines that ask for one request's draft at a
//!   time and get `None` for "no draft".
//! - [`SamplerOutputAdapter`]: engines that expect one fixed-length output
//!   per sequence group for the whole batch.

mod ngram;
mod per_request;
mod sampler_output;

use std::fmt;
use std::sync::Arc;

use tracing::{debug, warn};

use crate::config::{ConfigError, SpecEditConfig};
use crate::session::{SessionError, SessionRegistry};
use crate::toggles::RuntimeToggles;

pub use ngram::{PromptLookupConfig, PromptLookupFallback};
pub use per_request::{BatchSlot, PerRequestAdapter};
pub use sampler_output::{DraftOutput, SamplerOutputAdapter, SequenceGroup};

/// Draft proposer as seen by the host engine.
///
/// `propose` is invoked once per request per decoding step. Implementations
/// are shared across the engine's worker threads.
pub trait DraftProposer: Send + Sync {
    /// Register a request that carries a reference text.
    fn on_request_start(&self, request_id: &str, reference: &[u32]) -> Result<(), SessionError>;

    /// Draft tokens for this step, possibly empty.
    ///
    /// `context_tokens` is everything the model has seen (prompt and output),
    /// `output_tokens` only what it generated. Without a request id only the
    /// fallback is consulted.
    fn propose(
        &self,
        request_id: Option<&str>,
        context_tokens: &[u32],
        output_tokens: &[u32],
    ) -> Vec<u32>;

    /// The request completed, was cancelled or failed.
    fn on_request_finished(&self, request_id: &str);

    fn name(&self) -> &str;
}

/// Draft source used when reference matching has nothing to offer.
pub trait FallbackProposer: Send + Sync {
    /// Up to `max_len` draft tokens continuing `context_tokens`.
    fn propose(&self, context_tokens: &[u32], max_len: usize) -> Vec<u32>;

    fn name(&self) -> &str {
        "fallback"
    }
}

/// Where a proposal came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProposalSource {
    Reference,
    Fallback,
    Empty,
}

/// A draft together with its source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Proposal {
    pub tokens: Vec<u32>,
    pub source: ProposalSource,
}

impl Proposal {
    pub fn empty() -> Self {
        Self {
            tokens: Vec::new(),
            source: ProposalSource::Empty,
        }
    }

    fn reference(tokens: Vec<u32>) -> Self {
        Self {
            tokens,
            source: ProposalSource::Reference,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }
}

/// Reference-matching proposer shared by both engine adapters.
pub struct SpecEditProposer {
    sessions: SessionRegistry,
    toggles: RuntimeToggles,
    fallback: Option<Arc<dyn FallbackProposer>>,
    num_speculative_tokens: usize,
    max_model_len: usize,
}

impl fmt::Debug for SpecEditProposer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SpecEditProposer")
            .field("backend", &self.sessions.backend())
            .field("sessions", &self.sessions.len())
            .field("fallback", &self.fallback.as_ref().map(|f| f.name().to_string()))
            .field("num_speculative_tokens", &self.num_speculative_tokens)
            .field("max_model_len", &self.max_model_len)
            .finish()
    }
}

impl SpecEditProposer {
    /// Validate `config`, resolve its backend and build the proposer.
    pub fn new(config: SpecEditConfig, toggles: RuntimeToggles) -> Result<Self, ConfigError> {
        let config = config.resolved()?;
        tracing::info!(
            backend = %config.backend,
            num_speculative_tokens = config.num_speculative_tokens,
            max_model_len = config.max_model_len,
            max_sessions = config.max_sessions,
            "speculative edit proposer ready"
        );
        Ok(Self {
            sessions: SessionRegistry::from_config(&config),
            toggles,
            fallback: None,
            num_speculative_tokens: config.num_speculative_tokens,
            max_model_len: config.max_model_len,
        })
    }

    /// Install the proposer consulted when reference matching gives nothing.
    pub fn with_fallback(mut self, fallback: Arc<dyn FallbackProposer>) -> Self {
        self.fallback = Some(fallback);
        self
    }

    pub fn sessions(&self) -> &SessionRegistry {
        &self.sessions
    }

    pub fn toggles(&self) -> &RuntimeToggles {
        &self.toggles
    }

    pub fn num_speculative_tokens(&self) -> usize {
        self.num_speculative_tokens
    }

    pub fn max_model_len(&self) -> usize {
        self.max_model_len
    }

    /// Draft budget for a context of `context_len` tokens.
    pub fn budget(&self, context_len: usize) -> usize {
        self.num_speculative_tokens
            .min(self.max_model_len.saturating_sub(context_len))
    }

    pub fn start_request(&self, request_id: &str, reference: &[u32]) -> Result<(), SessionError> {
        self.sessions.create(request_id, reference)
    }

    pub fn finish_request(&self, request_id: &str) {
        self.sessions.remove(request_id);
    }

    /// One step's proposal for one request.
    pub fn propose(
        &self,
        request_id: Option<&str>,
        context_tokens: &[u32],
        output_tokens: &[u32],
    ) -> Proposal {
        let k = self.budget(context_tokens.len());
        let Some(request_id) = request_id else {
            return self.fallback(context_tokens, k);
        };
        if !self.toggles.speculative_edit_enabled() {
            return self.fallback(context_tokens, k);
        }
        if !self.sessions.contains(request_id) {
            debug!(request_id, "no reference session, using fallback");
            return self.fallback(context_tokens, k);
        }
        if k == 0 {
            return Proposal::empty();
        }

        match self.reference_chunk(request_id, output_tokens, k) {
            Some(chunk) if !chunk.is_empty() => {
                debug!(request_id, k, proposed = chunk.len(), "reference draft");
                Proposal::reference(chunk)
            }
            _ => self.fallback(context_tokens, k),
        }
    }

    /// Reference continuation for `request_id`; `None` when the session is
    /// gone. A rewound sequence recreates the session and retries once.
    pub fn reference_chunk(&self, request_id: &str, output_tokens: &[u32], k: usize) -> Option<Vec<u32>> {
        match self.sessions.next_chunk(request_id, output_tokens, k) {
            Ok(chunk) => Some(chunk),
            Err(SessionError::SequenceRewound {
                stored, received, ..
            }) => {
                warn!(request_id, stored, received, "generated sequence rewound, recreating session");
                self.sessions.recreate(request_id).ok()?;
                self.sessions.next_chunk(request_id, output_tokens, k).ok()
            }
            Err(e) => {
                debug!(request_id, error = %e, "no reference chunk");
                None
            }
        }
    }

    /// Fallback draft, truncated to `k`. Empty when the n-gram toggle is off
    /// or no fallback is installed.
    pub fn fallback(&self, context_tokens: &[u32], k: usize) -> Proposal {
        if k == 0 || !self.toggles.ngram_fallback_enabled() {
            return Proposal::empty();
        }
        let Some(fallback) = &self.fallback else {
            return Proposal::empty();
        };
        let mut tokens = fallback.propose(context_tokens, k);
        tokens.truncate(k);
        if tokens.is_empty() {
            return Proposal::empty();
        }
        debug!(fallback = fallback.name(), proposed = tokens.len(), "fallback draft");
        Proposal {
            tokens,
            source: ProposalSource::Fallback,
        }
    }

    pub(crate) fn fallback_installed(&self) -> bool {
        self.fallback.is_some()
    }
}
