//! Sequential backend: incremental positions index plus bounded DP.
//!
//! The generated window is indexed as a map from token value to the
//! ascending positions where it occurs. New tokens are appended to the index
//! as generation advances; the index is only rebuilt when the window moves.
//! The longest block inside a sub-range is found with the classic
//! "longest common substring over position lists" dynamic program followed
//! by a greedy extension on both ends.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::debug;

use super::{
    last_block_on_spine, propose_chunk, BlockFinder, MatchBlock, MatchError, MatcherBackend,
    MatcherConfig, ReferenceMatcher, WindowPlan,
};

/// Popularity exclusion only kicks in for windows at least this long.
const AUTOJUNK_MIN_LEN: usize = 200;

/// Token value → ascending positions inside the generated window.
#[derive(Debug, Default)]
struct PositionIndex {
    positions: HashMap<u32, Vec<usize>>,
    indexed: Vec<u32>,
}

impl PositionIndex {
    /// Bring the index up to date with `window`. Rebuilds from scratch when
    /// `window` does not extend what was indexed before.
    fn sync(&mut self, window: &[u32]) {
        if !window.starts_with(&self.indexed) {
            debug!(
                indexed = self.indexed.len(),
                window = window.len(),
                "generated window was rewritten, rebuilding index"
            );
            self.clear();
        }
        let from = self.indexed.len();
        for (offset, &token) in window.iter().enumerate().skip(from) {
            self.positions.entry(token).or_default().push(offset);
        }
        self.indexed.extend_from_slice(&window[from..]);
    }

    fn clear(&mut self) {
        self.positions.clear();
        self.indexed.clear();
    }

    fn positions(&self, token: u32) -> &[usize] {
        self.positions.get(&token).map_or(&[], Vec::as_slice)
    }

    /// Occurrence count above which a value is skipped during the DP.
    fn popular_limit(&self, autojunk: bool) -> Option<usize> {
        let n = self.indexed.len();
        (autojunk && n >= AUTOJUNK_MIN_LEN).then_some(n / 100 + 1)
    }
}

/// Longest block inside `reference[alo..ahi]` x `generated[blo..bhi]`.
///
/// Ties go to the earliest reference start, then the earliest generated
/// start. Values whose position list exceeds `popular_limit` do not seed
/// runs; the extension pass can still absorb them at the block edges.
#[allow(clippy::too_many_arguments)]
fn longest_match(
    reference: &[u32],
    generated: &[u32],
    index: &PositionIndex,
    popular_limit: Option<usize>,
    alo: usize,
    ahi: usize,
    blo: usize,
    bhi: usize,
) -> MatchBlock {
    let mut best = MatchBlock::new(alo, blo, 0);
    // run length of the match ending at generated[j], for the previous i
    let mut run_len: HashMap<usize, usize> = HashMap::new();
    let mut next_run: HashMap<usize, usize> = HashMap::new();

    for i in alo..ahi {
        next_run.clear();
        let positions = index.positions(reference[i]);
        let popular = popular_limit.is_some_and(|limit| positions.len() > limit);
        if !popular {
            let from = positions.partition_point(|&j| j < blo);
            for &j in &positions[from..] {
                if j >= bhi {
                    break;
                }
                let k = j
                    .checked_sub(1)
                    .and_then(|prev| run_len.get(&prev))
                    .map_or(1, |len| len + 1);
                next_run.insert(j, k);
                if k > best.len {
                    best = MatchBlock::new(i + 1 - k, j + 1 - k, k);
                }
            }
        }
        std::mem::swap(&mut run_len, &mut next_run);
    }

    while best.reference_start > alo
        && best.generated_start > blo
        && reference[best.reference_start - 1] == generated[best.generated_start - 1]
    {
        best.reference_start -= 1;
        best.generated_start -= 1;
        best.len += 1;
    }
    while best.reference_end() < ahi
        && best.generated_end() < bhi
        && reference[best.reference_end()] == generated[best.generated_end()]
    {
        best.len += 1;
    }
    best
}

/// Matcher that keeps an incremental index over the generated window.
#[derive(Debug)]
pub struct SequentialMatcher {
    reference: Arc<[u32]>,
    config: MatcherConfig,
    plan: Option<WindowPlan>,
    index: PositionIndex,
}

impl SequentialMatcher {
    pub fn new(reference: impl Into<Arc<[u32]>>) -> Self {
        Self::with_config(reference, MatcherConfig::default())
    }

    pub fn with_config(reference: impl Into<Arc<[u32]>>, config: MatcherConfig) -> Self {
        Self {
            reference: reference.into(),
            config,
            plan: None,
            index: PositionIndex::default(),
        }
    }

    /// Number of generated tokens currently indexed.
    pub fn indexed_len(&self) -> usize {
        self.index.indexed.len()
    }
}

impl BlockFinder for SequentialMatcher {
    fn reference_tokens(&self) -> &[u32] {
        &self.reference
    }

    fn config(&self) -> &MatcherConfig {
        &self.config
    }

    fn last_block(&mut self, generated: &[u32]) -> Result<Option<MatchBlock>, MatchError> {
        let plan = self.config.window.plan(self.reference.len(), generated.len());
        if self.plan.as_ref() != Some(&plan) {
            if self.plan.is_some() {
                debug!(
                    generated_start = plan.generated_start,
                    reference_start = plan.reference.start,
                    "window moved, rebuilding index"
                );
            }
            self.index.clear();
            self.plan = Some(plan.clone());
        }

        let reference = plan.reference_slice(&self.reference);
        let window = plan.generated_slice(generated);
        self.index.sync(window);

        let index = &self.index;
        let limit = index.popular_limit(self.config.autojunk);
        let block = last_block_on_spine(reference.len(), window.len(), |alo, ahi, blo, bhi| {
            longest_match(reference, window, index, limit, alo, ahi, blo, bhi)
        });
        Ok(block.map(|block| block.to_absolute(&plan)))
    }

    fn clear(&mut self) {
        self.plan = None;
        self.index.clear();
    }
}

impl ReferenceMatcher for SequentialMatcher {
    fn next_chunk(&mut self, generated: &[u32], max_len: usize) -> Vec<u32> {
        propose_chunk(self, MatcherBackend::Sequential, generated, max_len)
    }

    fn reference(&self) -> &[u32] {
        &self.reference
    }

    fn backend(&self) -> MatcherBackend {
        MatcherBackend::Sequential
    }

    fn reset(&mut self) {
        BlockFinder::clear(self);
    }
}
