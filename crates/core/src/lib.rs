//! Draft proposals for speculative decoding of edit-style requests.
//!
//! A request that rewrites an existing text carries that text as its
//! reference. While the model generates, [`matcher`] locates where the
//! output currently sits in the reference and proposes the tokens that
//! follow; [`proposer`] wires the matchers into the engine's draft step and
//! [`stop`] checks streamed text against stop strings and patterns.

pub mod config;
pub mod eval;
pub mod matcher;
pub mod proposer;
pub mod session;
pub mod stop;
pub mod toggles;

#[cfg(any(test, feature = "test-utils"))]
pub mod testing;

pub use config::{ConfigError, SpecEditConfig};
pub use matcher::{build_matcher, MatcherBackend, MatcherConfig, ReferenceMatcher};
pub use proposer::{
    DraftProposer, FallbackProposer, PerRequestAdapter, Proposal, ProposalSource,
    SamplerOutputAdapter, SpecEditProposer,
};
pub use session::{RequestId, SessionError, SessionRegistry, SharedSession};
pub use stop::{StopMatch, StopMatcher};
pub use toggles::RuntimeToggles;
