//! Parallel backend: one lane per diagonal, reduced with rayon.
//!
//! A diagonal is a fixed offset between a reference position and a
//! generated position. Walking one diagonal finds every run of equal tokens
//! at that offset with plain equality checks, so lanes are independent and
//! no index has to be maintained. Nothing is cached between calls.

use std::sync::Arc;

use rayon::prelude::*;

use super::{
    last_block_on_spine, propose_chunk, BlockFinder, MatchBlock, MatchError, MatcherBackend,
    MatcherConfig, ReferenceMatcher,
};

/// Sub-problems with fewer cells than this are scanned on the calling
/// thread.
const PARALLEL_MIN_CELLS: usize = 64 * 1024;

/// Best run on the diagonal that starts at `(i, j)`, walking while both
/// positions stay below `ahi` / `bhi`.
fn scan_lane(
    reference: &[u32],
    generated: &[u32],
    mut i: usize,
    mut j: usize,
    ahi: usize,
    bhi: usize,
) -> Option<MatchBlock> {
    let mut best: Option<MatchBlock> = None;
    let mut run = 0;
    while i < ahi && j < bhi {
        if reference[i] == generated[j] {
            run += 1;
            if best.map_or(true, |b| run > b.len) {
                best = Some(MatchBlock::new(i + 1 - run, j + 1 - run, run));
            }
        } else {
            run = 0;
        }
        i += 1;
        j += 1;
    }
    best
}

/// Longest block inside `reference[alo..ahi]` x `generated[blo..bhi]` using
/// one lane per diagonal.
fn longest_match(
    reference: &[u32],
    generated: &[u32],
    alo: usize,
    ahi: usize,
    blo: usize,
    bhi: usize,
) -> MatchBlock {
    let empty = MatchBlock::new(alo, blo, 0);
    let lane = |(i, j): (usize, usize)| scan_lane(reference, generated, i, j, ahi, bhi);
    let reduce = |a: MatchBlock, b: MatchBlock| a.preferred(b);

    // lanes starting on the first generated position, then on the first
    // reference position
    let best = if (ahi - alo).saturating_mul(bhi - blo) < PARALLEL_MIN_CELLS {
        (alo..ahi)
            .map(|i| (i, blo))
            .chain((blo + 1..bhi).map(|j| (alo, j)))
            .filter_map(lane)
            .reduce(reduce)
    } else {
        (alo..ahi)
            .into_par_iter()
            .map(|i| (i, blo))
            .chain((blo + 1..bhi).into_par_iter().map(|j| (alo, j)))
            .filter_map(lane)
            .reduce_with(reduce)
    };
    best.unwrap_or(empty)
}

/// Matcher that recomputes the last block from scratch on every call.
#[derive(Debug)]
pub struct ParallelMatcher {
    reference: Arc<[u32]>,
    config: MatcherConfig,
}

impl ParallelMatcher {
    pub fn new(reference: impl Into<Arc<[u32]>>) -> Self {
        Self::with_config(reference, MatcherConfig::default())
    }

    pub fn with_config(reference: impl Into<Arc<[u32]>>, config: MatcherConfig) -> Self {
        Self {
            reference: reference.into(),
            config,
        }
    }
}

impl BlockFinder for ParallelMatcher {
    fn reference_tokens(&self) -> &[u32] {
        &self.reference
    }

    fn config(&self) -> &MatcherConfig {
        &self.config
    }

    fn last_block(&mut self, generated: &[u32]) -> Result<Option<MatchBlock>, MatchError> {
        let plan = self.config.window.plan(self.reference.len(), generated.len());
        let reference = plan.reference_slice(&self.reference);
        let window = plan.generated_slice(generated);
        let block = last_block_on_spine(reference.len(), window.len(), |alo, ahi, blo, bhi| {
            longest_match(reference, window, alo, ahi, blo, bhi)
        });
        Ok(block.map(|block| block.to_absolute(&plan)))
    }

    fn clear(&mut self) {}
}

impl ReferenceMatcher for ParallelMatcher {
    fn next_chunk(&mut self, generated: &[u32], max_len: usize) -> Vec<u32> {
        propose_chunk(self, MatcherBackend::Parallel, generated, max_len)
    }

    fn reference(&self) -> &[u32] {
        &self.reference
    }

    fn backend(&self) -> MatcherBackend {
        MatcherBackend::Parallel
    }

    fn reset(&mut self) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::matcher::{SequentialMatcher, WindowConfig};
    use crate::testing::pseudo_random_tokens as tokens;

    #[test]
    fn lane_keeps_first_longest_run() {
        // diagonal 0: runs of 2 at 0 and 2 at 3
        let reference = [1, 2, 0, 3, 4];
        let generated = [1, 2, 9, 3, 4];
        assert_eq!(
            scan_lane(&reference, &generated, 0, 0, 5, 5),
            Some(MatchBlock::new(0, 0, 2))
        );
    }

    #[test]
    fn lane_without_equal_tokens_is_none() {
        assert_eq!(scan_lane(&[1, 2], &[3, 4], 0, 0, 2, 2), None);
    }

    #[test]
    fn longest_match_covers_every_diagonal() {
        // best run sits on a diagonal starting at the first reference position
        let reference = [7, 8, 9];
        let generated = [0, 0, 7, 8, 9];
        assert_eq!(longest_match(&reference, &generated, 0, 3, 0, 5), MatchBlock::new(0, 2, 3));

        // and on one starting at the first generated position
        let reference = [0, 0, 7, 8, 9];
        let generated = [7, 8, 9];
        assert_eq!(longest_match(&reference, &generated, 0, 5, 0, 3), MatchBlock::new(2, 0, 3));
    }

    #[test]
    fn longest_match_tie_break_is_deterministic() {
        let reference = [5, 6, 1, 5, 6];
        let generated = [5, 6, 2, 5, 6];
        assert_eq!(longest_match(&reference, &generated, 0, 5, 0, 5), MatchBlock::new(0, 0, 2));
    }

    #[test]
    fn agrees_with_sequential_on_random_inputs() {
        for seed in 0..20 {
            let reference = tokens(seed, 400, 8);
            let mut generated = reference[..150].to_vec();
            generated.extend(tokens(seed + 100, 10, 8));
            generated.extend_from_slice(&reference[200..260]);

            let mut parallel = ParallelMatcher::new(reference.clone());
            let mut sequential = SequentialMatcher::new(reference);
            for len in [1, 50, 155, 160, 175, 220] {
                assert_eq!(
                    parallel.next_chunk(&generated[..len], 6),
                    sequential.next_chunk(&generated[..len], 6),
                    "seed {seed} len {len}"
                );
            }
        }
    }

    #[test]
    fn large_inputs_take_the_rayon_path() {
        let reference = tokens(3, 3000, 4000);
        let generated = reference[..1500].to_vec();
        let mut parallel = ParallelMatcher::new(reference.clone());
        assert_eq!(parallel.next_chunk(&generated, 4), reference[1500..1504]);
    }

    #[test]
    fn windowed_result_equals_matching_the_slices() {
        let reference = tokens(13, 3000, 50);
        let mut generated = reference[..480].to_vec();
        generated.extend(tokens(14, 15, 50));
        generated.extend_from_slice(&reference[520..700]);

        let config = MatcherConfig::default();
        let plan = config.window.plan(reference.len(), generated.len());
        assert!(plan.is_windowed(reference.len()));

        let unwindowed = MatcherConfig {
            window: WindowConfig {
                divisor: 0,
                ..Default::default()
            },
            ..config
        };
        let mut windowed = ParallelMatcher::with_config(reference.clone(), config);
        let mut on_slices =
            ParallelMatcher::with_config(plan.reference_slice(&reference).to_vec(), unwindowed);

        assert_eq!(
            windowed.next_chunk(&generated, 16),
            on_slices.next_chunk(plan.generated_slice(&generated), 16)
        );
    }
}
