//! Shared test utilities for specedit-core.
//!
//! Deterministic token fixtures and a recording fallback proposer for unit
//! tests, integration tests and benches.

mod fixtures;
mod mock_fallback;

pub use fixtures::{edited_copy, pseudo_random_tokens, Edit};
pub use mock_fallback::RecordingFallback;
