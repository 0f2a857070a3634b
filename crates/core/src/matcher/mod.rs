//! Reference matching: propose the next chunk of a reference sequence.
//!
//! Every backend answers the same question: given everything generated so
//! far, where in the reference is generation currently copying from? The
//! answer is the matching block whose end in the generated sequence is as far
//! right as possible. When that block reaches the very end of the generated
//! sequence, the reference tokens right after it are the draft.
//!
//! Backends:
//! - [`SequentialMatcher`]: incremental value→positions index over the
//!   generated window plus bounded dynamic programming.
//! - [`ParallelMatcher`]: one rayon lane per diagonal, recomputed every call
//!   (feature `parallel`).
//! - [`IndexedMatcher`]: suffix array over the reference window and a table
//!   of the longest match for every generated start offset.
//!
//! All backends share [`WindowConfig`] trimming and one proposal rule, so
//! they differ only in how they find the last block.

mod indexed;
#[cfg(feature = "parallel")]
mod parallel;
mod sequential;
mod window;

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::config::ConfigError;

pub use indexed::{IndexedMatcher, SuffixArray};
#[cfg(feature = "parallel")]
pub use parallel::ParallelMatcher;
pub use sequential::SequentialMatcher;
pub use window::{WindowConfig, WindowPlan};

/// Proposes reference continuations for one in-flight request.
///
/// `generated` is always the *whole* generated sequence, never a delta.
/// Implementations may cache indexes between calls on the assumption that
/// `generated` only grows; callers that rewind must call [`reset`] first.
///
/// [`reset`]: ReferenceMatcher::reset
pub trait ReferenceMatcher: Send + Sync + fmt::Debug {
    /// Reference tokens to propose after the last matched block, at most
    /// `max_len` of them. Empty when generation has drifted from the
    /// reference.
    fn next_chunk(&mut self, generated: &[u32], max_len: usize) -> Vec<u32>;

    /// The immutable reference this matcher was built over.
    fn reference(&self) -> &[u32];

    fn backend(&self) -> MatcherBackend;

    /// Drop incremental state; the next call rebuilds from scratch.
    fn reset(&mut self);
}

/// Matcher backend, selected once at startup.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatcherBackend {
    #[default]
    Sequential,
    Parallel,
    Indexed,
}

impl MatcherBackend {
    pub const ALL: [MatcherBackend; 3] = [Self::Sequential, Self::Parallel, Self::Indexed];

    pub const fn name(self) -> &'static str {
        match self {
            Self::Sequential => "sequential",
            Self::Parallel => "parallel",
            Self::Indexed => "indexed",
        }
    }

    /// Whether this backend was compiled in.
    pub const fn is_available(self) -> bool {
        match self {
            Self::Parallel => cfg!(feature = "parallel"),
            Self::Sequential | Self::Indexed => true,
        }
    }

    /// Map the requested backend onto one that is compiled in.
    ///
    /// With `strict`, an unavailable backend is a startup error; otherwise
    /// the sequential backend takes its place.
    pub fn resolve(self, strict: bool) -> Result<Self, ConfigError> {
        if self.is_available() {
            return Ok(self);
        }
        if strict {
            return Err(ConfigError::BackendUnavailable(self.name()));
        }
        warn!(
            requested = self.name(),
            "matcher backend not compiled in, falling back to sequential"
        );
        Ok(Self::Sequential)
    }
}

impl fmt::Display for MatcherBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for MatcherBackend {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|backend| backend.name().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| ConfigError::Invalid(format!("unknown matcher backend '{s}'")))
    }
}

/// Matching parameters shared by all backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MatcherConfig {
    pub window: WindowConfig,
    /// Skip very frequent generated tokens during the sequential DP pass.
    pub autojunk: bool,
    /// Shortest final block that may trigger a proposal unless it covers the
    /// whole generated sequence.
    pub min_tail_match: usize,
}

impl Default for MatcherConfig {
    fn default() -> Self {
        Self {
            window: WindowConfig::default(),
            autojunk: false,
            min_tail_match: 2,
        }
    }
}

/// Build a matcher over `reference` for the given backend.
///
/// The backend should already be [`resolve`](MatcherBackend::resolve)d; an
/// unavailable backend is replaced by the sequential one.
pub fn build_matcher(
    backend: MatcherBackend,
    reference: impl Into<Arc<[u32]>>,
    config: &MatcherConfig,
) -> Box<dyn ReferenceMatcher> {
    let reference = reference.into();
    match backend {
        MatcherBackend::Sequential => Box::new(SequentialMatcher::with_config(reference, *config)),
        MatcherBackend::Indexed => Box::new(IndexedMatcher::with_config(reference, *config)),
        #[cfg(feature = "parallel")]
        MatcherBackend::Parallel => Box::new(ParallelMatcher::with_config(reference, *config)),
        #[cfg(not(feature = "parallel"))]
        MatcherBackend::Parallel => {
            tracing::debug!("parallel backend unavailable, building sequential matcher");
            Box::new(SequentialMatcher::with_config(reference, *config))
        }
    }
}

/// Internal matcher failure. Never escapes [`ReferenceMatcher::next_chunk`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MatchError {
    #[error("matched block {block:?} out of range (reference {reference_len}, generated {generated_len})")]
    BlockOutOfRange {
        block: MatchBlock,
        reference_len: usize,
        generated_len: usize,
    },
    #[error("corrupt index: {0}")]
    CorruptIndex(String),
}

/// A run of equal tokens: `reference[reference_start..][..len] ==
/// generated[generated_start..][..len]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MatchBlock {
    pub reference_start: usize,
    pub generated_start: usize,
    pub len: usize,
}

impl MatchBlock {
    pub const fn new(reference_start: usize, generated_start: usize, len: usize) -> Self {
        Self {
            reference_start,
            generated_start,
            len,
        }
    }

    pub const fn reference_end(&self) -> usize {
        self.reference_start + self.len
    }

    pub const fn generated_end(&self) -> usize {
        self.generated_start + self.len
    }

    /// Shift window-relative coordinates back to absolute positions.
    pub fn to_absolute(self, plan: &WindowPlan) -> Self {
        Self {
            reference_start: self.reference_start + plan.reference.start,
            generated_start: self.generated_start + plan.generated_start,
            len: self.len,
        }
    }

    /// Preference order between candidate longest blocks: longer first,
    /// then earliest in the reference, then earliest in the generated
    /// sequence. `Ordering::Less` means `self` is preferred.
    pub fn preference(&self, other: &Self) -> Ordering {
        other
            .len
            .cmp(&self.len)
            .then(self.reference_start.cmp(&other.reference_start))
            .then(self.generated_start.cmp(&other.generated_start))
    }

    pub(crate) fn preferred(self, other: Self) -> Self {
        if other.preference(&self) == Ordering::Less {
            other
        } else {
            self
        }
    }
}

/// Walk the right spine of the recursive matching-block decomposition.
///
/// `longest` returns the longest block inside `reference[alo..ahi]` x
/// `generated[blo..bhi]`; the final non-empty block on the spine is the
/// block with the rightmost position among all matching blocks.
pub(crate) fn last_block_on_spine<F>(
    reference_len: usize,
    generated_len: usize,
    mut longest: F,
) -> Option<MatchBlock>
where
    F: FnMut(usize, usize, usize, usize) -> MatchBlock,
{
    let mut last = None;
    let (mut alo, mut blo) = (0, 0);
    while alo < reference_len && blo < generated_len {
        let block = longest(alo, reference_len, blo, generated_len);
        if block.len == 0 {
            break;
        }
        alo = block.reference_end();
        blo = block.generated_end();
        last = Some(block);
    }
    last
}

/// Locates the last matching block in absolute coordinates.
pub(crate) trait BlockFinder {
    fn reference_tokens(&self) -> &[u32];

    fn config(&self) -> &MatcherConfig;

    fn last_block(&mut self, generated: &[u32]) -> Result<Option<MatchBlock>, MatchError>;

    fn clear(&mut self);
}

/// Shared proposal rule on top of a [`BlockFinder`].
pub(crate) fn propose_chunk<F: BlockFinder>(
    finder: &mut F,
    backend: MatcherBackend,
    generated: &[u32],
    max_len: usize,
) -> Vec<u32> {
    let reference_len = finder.reference_tokens().len();
    if reference_len == 0 || max_len == 0 {
        return Vec::new();
    }
    if generated.is_empty() {
        return finder.reference_tokens()[..max_len.min(reference_len)].to_vec();
    }

    let block = match finder.last_block(generated) {
        Ok(Some(block)) => block,
        Ok(None) => return Vec::new(),
        Err(e) => {
            warn!(%backend, error = %e, "matcher failed, proposing nothing");
            finder.clear();
            return Vec::new();
        }
    };

    if block.reference_end() > reference_len || block.generated_end() > generated.len() {
        let e = MatchError::BlockOutOfRange {
            block,
            reference_len,
            generated_len: generated.len(),
        };
        warn!(%backend, error = %e, "matcher failed, proposing nothing");
        finder.clear();
        return Vec::new();
    }

    if block.generated_end() != generated.len() {
        return Vec::new();
    }
    let covers_all = block.generated_start == 0;
    if block.len < finder.config().min_tail_match && !covers_all {
        return Vec::new();
    }

    let start = block.reference_end();
    let end = (start + max_len).min(reference_len);
    finder.reference_tokens()[start..end].to_vec()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reference() -> Vec<u32> {
        (1..=10).collect()
    }

    fn all_matchers(reference: &[u32]) -> Vec<Box<dyn ReferenceMatcher>> {
        let config = MatcherConfig::default();
        MatcherBackend::ALL
            .into_iter()
            .map(|backend| build_matcher(backend, reference.to_vec(), &config))
            .collect()
    }

    // ─── Proposal contract, every backend ─────────────────────────────────

    #[test]
    fn exact_prefix_proposes_continuation() {
        for mut matcher in all_matchers(&reference()) {
            assert_eq!(
                matcher.next_chunk(&[1, 2, 3], 4),
                vec![4, 5, 6, 7],
                "{}",
                matcher.backend()
            );
        }
    }

    #[test]
    fn diverged_tail_proposes_nothing() {
        for mut matcher in all_matchers(&reference()) {
            assert!(matcher.next_chunk(&[1, 2, 9], 4).is_empty(), "{}", matcher.backend());
            assert!(matcher.next_chunk(&[1, 2, 99], 4).is_empty(), "{}", matcher.backend());
        }
    }

    #[test]
    fn empty_generated_proposes_reference_start() {
        for mut matcher in all_matchers(&reference()) {
            assert_eq!(matcher.next_chunk(&[], 3), vec![1, 2, 3]);
        }
    }

    #[test]
    fn empty_reference_proposes_nothing() {
        for mut matcher in all_matchers(&[]) {
            assert!(matcher.next_chunk(&[], 4).is_empty());
            assert!(matcher.next_chunk(&[1, 2], 4).is_empty());
        }
    }

    #[test]
    fn zero_budget_proposes_nothing() {
        for mut matcher in all_matchers(&reference()) {
            assert!(matcher.next_chunk(&[1, 2, 3], 0).is_empty());
            assert!(matcher.next_chunk(&[], 0).is_empty());
        }
    }

    #[test]
    fn block_at_reference_end_proposes_nothing() {
        for mut matcher in all_matchers(&reference()) {
            assert!(matcher.next_chunk(&reference(), 4).is_empty());
            assert!(matcher.next_chunk(&[0, 8, 9, 10], 4).is_empty());
        }
    }

    #[test]
    fn chunk_is_truncated_at_reference_end() {
        for mut matcher in all_matchers(&reference()) {
            assert_eq!(matcher.next_chunk(&[1, 2, 3, 4, 5, 6, 7, 8], 5), vec![9, 10]);
        }
    }

    #[test]
    fn repeated_calls_are_idempotent() {
        for mut matcher in all_matchers(&reference()) {
            let first = matcher.next_chunk(&[1, 2, 3], 4);
            let second = matcher.next_chunk(&[1, 2, 3], 4);
            assert_eq!(first, second, "{}", matcher.backend());
        }
    }

    #[test]
    fn resumes_after_an_edit() {
        // generation replaced 4 with 40, then re-joined the reference
        for mut matcher in all_matchers(&reference()) {
            assert!(matcher.next_chunk(&[1, 2, 3, 40], 3).is_empty());
            assert!(matcher.next_chunk(&[1, 2, 3, 40, 5], 3).is_empty());
            assert_eq!(
                matcher.next_chunk(&[1, 2, 3, 40, 5, 6], 3),
                vec![7, 8, 9],
                "{}",
                matcher.backend()
            );
        }
    }

    #[test]
    fn single_token_covering_everything_counts() {
        for mut matcher in all_matchers(&reference()) {
            assert_eq!(matcher.next_chunk(&[1], 2), vec![2, 3]);
            assert_eq!(matcher.next_chunk(&[5], 2), vec![6, 7], "{}", matcher.backend());
        }
    }

    #[test]
    fn repeated_reference_prefers_earliest_occurrence() {
        let reference = vec![7, 8, 1, 7, 8, 2];
        for mut matcher in all_matchers(&reference) {
            assert_eq!(matcher.next_chunk(&[7, 8], 1), vec![1], "{}", matcher.backend());
        }
    }

    #[test]
    fn incremental_growth_walks_the_reference() {
        let reference: Vec<u32> = (1..=10).map(|x| x * 10).collect();
        for mut matcher in all_matchers(&reference) {
            let mut generated = Vec::new();
            let mut steps = 0;
            loop {
                let chunk = matcher.next_chunk(&generated, 3);
                if chunk.is_empty() {
                    break;
                }
                generated.extend(chunk);
                steps += 1;
            }
            assert_eq!(generated, reference, "{}", matcher.backend());
            assert_eq!(steps, 4);
        }
    }

    #[test]
    fn reset_keeps_answers_stable() {
        for mut matcher in all_matchers(&reference()) {
            let before = matcher.next_chunk(&[1, 2, 3], 4);
            matcher.reset();
            assert_eq!(matcher.next_chunk(&[1, 2, 3], 4), before);
            // after reset a rewound sequence is fine
            matcher.reset();
            assert_eq!(matcher.next_chunk(&[1], 2), vec![2, 3]);
        }
    }

    // ─── MatcherBackend ───────────────────────────────────────────────────

    #[test]
    fn backend_parses_case_insensitively() {
        assert_eq!("Indexed".parse::<MatcherBackend>().unwrap(), MatcherBackend::Indexed);
        assert_eq!(" parallel ".parse::<MatcherBackend>().unwrap(), MatcherBackend::Parallel);
        assert!("gpu".parse::<MatcherBackend>().is_err());
    }

    #[test]
    fn backend_display_round_trips_through_serde() {
        let json = serde_json::to_string(&MatcherBackend::Indexed).unwrap();
        assert_eq!(json, "\"indexed\"");
        assert_eq!(MatcherBackend::Sequential.to_string(), "sequential");
    }

    #[test]
    fn available_backends_resolve_to_themselves() {
        assert_eq!(MatcherBackend::Sequential.resolve(true).unwrap(), MatcherBackend::Sequential);
        assert_eq!(MatcherBackend::Indexed.resolve(true).unwrap(), MatcherBackend::Indexed);
    }

    #[cfg(feature = "parallel")]
    #[test]
    fn parallel_resolves_when_compiled_in() {
        assert_eq!(MatcherBackend::Parallel.resolve(true).unwrap(), MatcherBackend::Parallel);
    }

    #[cfg(not(feature = "parallel"))]
    #[test]
    fn parallel_falls_back_or_fails_when_missing() {
        assert_eq!(
            MatcherBackend::Parallel.resolve(false).unwrap(),
            MatcherBackend::Sequential
        );
        assert!(matches!(
            MatcherBackend::Parallel.resolve(true),
            Err(ConfigError::BackendUnavailable("parallel"))
        ));
    }

    // ─── MatchBlock ───────────────────────────────────────────────────────

    #[test]
    fn preference_orders_by_length_then_position() {
        let long = MatchBlock::new(5, 5, 3);
        let short = MatchBlock::new(0, 0, 2);
        assert_eq!(long.preferred(short), long);
        assert_eq!(short.preferred(long), long);

        let early_ref = MatchBlock::new(1, 9, 3);
        let late_ref = MatchBlock::new(4, 0, 3);
        assert_eq!(late_ref.preferred(early_ref), early_ref);

        let early_gen = MatchBlock::new(1, 2, 3);
        assert_eq!(early_ref.preferred(early_gen), early_gen);
    }

    #[test]
    fn absolute_mapping_adds_window_offsets() {
        let plan = WindowPlan {
            generated_start: 200,
            reference: 100..900,
        };
        let block = MatchBlock::new(10, 20, 5).to_absolute(&plan);
        assert_eq!(block, MatchBlock::new(110, 220, 5));
    }

    #[test]
    fn resynchronises_after_each_kind_of_edit() {
        use crate::testing::{edited_copy, pseudo_random_tokens, Edit};

        let reference = pseudo_random_tokens(5, 400, 1_000);
        let output = edited_copy(
            &reference,
            &[
                Edit::Insert { at: 100, tokens: vec![5_000, 5_001, 5_002] },
                Edit::Delete { at: 200, len: 4 },
                Edit::Replace { at: 300, len: 2, with: vec![6_000] },
            ],
        );

        // (generated length, reference position it resumes at)
        let checkpoints = [(113, 110), (213, 214), (310, 312)];
        for mut matcher in all_matchers(&reference) {
            for (generated_len, resume) in checkpoints {
                assert_eq!(
                    matcher.next_chunk(&output[..generated_len], 5),
                    reference[resume..resume + 5],
                    "{} at {generated_len}",
                    matcher.backend()
                );
            }
        }
    }

    #[test]
    fn backends_agree_on_a_tail_that_is_not_a_reference_prefix() {
        // [9, 1] matches the reference start, [1, 2, 3] matches later
        let reference = vec![9, 1, 7, 2, 3, 6, 0, 1, 2, 3, 4];
        for mut matcher in all_matchers(&reference) {
            assert_eq!(matcher.next_chunk(&[9, 1, 2, 3], 1), vec![4], "{}", matcher.backend());
        }
    }

    #[test]
    fn backends_agree_on_random_edits() {
        use crate::testing::pseudo_random_tokens;

        for seed in 0..10 {
            let reference = pseudo_random_tokens(seed, 250, 5);
            let mut generated = pseudo_random_tokens(seed + 100, 7, 5);
            generated.extend_from_slice(&reference[60..120]);
            generated.extend(pseudo_random_tokens(seed + 200, 4, 5));
            generated.extend_from_slice(&reference[30..90]);

            let mut matchers = all_matchers(&reference);
            for len in (1..=generated.len()).step_by(5) {
                let chunks: Vec<Vec<u32>> = matchers
                    .iter_mut()
                    .map(|matcher| matcher.next_chunk(&generated[..len], 4))
                    .collect();
                assert!(
                    chunks.windows(2).all(|pair| pair[0] == pair[1]),
                    "seed {seed} len {len}: {chunks:?}"
                );
            }
        }
    }

    #[test]
    fn match_error_display() {
        let e = MatchError::CorruptIndex("stale suffix array".into());
        assert_eq!(e.to_string(), "corrupt index: stale suffix array");
    }
}
