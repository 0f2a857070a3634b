//! Indexed backend: suffix array over the reference window.
//!
//! The reference window is indexed once per window position. For every start
//! offset of the generated window the longest prefix found anywhere in the
//! reference window is looked up by binary search over the sorted suffixes.
//! A lookup whose match stopped before the previous end of the generated
//! sequence cannot change when more tokens arrive, so only lookups that
//! reached the old end and the newly generated offsets are redone. The last
//! block is then taken from the right spine of the matching-block
//! decomposition, the same rule every backend follows.

use std::sync::Arc;

use tracing::debug;

use super::{
    last_block_on_spine, propose_chunk, BlockFinder, MatchBlock, MatchError, MatcherBackend,
    MatcherConfig, ReferenceMatcher, WindowPlan,
};

/// Suffix array over a token sequence.
///
/// `suffixes()[r]` is the start of the `r`-th smallest suffix.
#[derive(Debug, Clone, Default)]
pub struct SuffixArray {
    tokens: Vec<u32>,
    order: Vec<usize>,
}

impl SuffixArray {
    /// Build by prefix doubling: rank suffixes by their first token, then
    /// repeatedly re-sort by `(rank[p], rank[p + span])` until all ranks are
    /// distinct. Each round is one `O(n log n)` sort.
    pub fn build(tokens: &[u32]) -> Self {
        let n = tokens.len();
        let mut order: Vec<usize> = (0..n).collect();
        if n < 2 {
            return Self {
                tokens: tokens.to_vec(),
                order,
            };
        }

        order.sort_unstable_by_key(|&p| tokens[p]);
        let mut rank = vec![0usize; n];
        for w in 1..n {
            let bump = tokens[order[w]] != tokens[order[w - 1]];
            rank[order[w]] = rank[order[w - 1]] + usize::from(bump);
        }

        let mut next = vec![0usize; n];
        let mut span = 1;
        while rank[order[n - 1]] < n - 1 {
            // 0 sorts suffixes that end inside the span first
            let key = |rank: &[usize], p: usize| (rank[p], rank.get(p + span).map_or(0, |&r| r + 1));
            order.sort_unstable_by_key(|&p| key(&rank, p));
            next[order[0]] = 0;
            for w in 1..n {
                let bump = key(&rank, order[w]) != key(&rank, order[w - 1]);
                next[order[w]] = next[order[w - 1]] + usize::from(bump);
            }
            std::mem::swap(&mut rank, &mut next);
            span *= 2;
        }

        Self {
            tokens: tokens.to_vec(),
            order,
        }
    }

    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    pub fn suffixes(&self) -> &[usize] {
        &self.order
    }

    /// Longest prefix of `pattern` that occurs in the indexed tokens, as
    /// `(position, length)`. Among equal-length matches the earliest
    /// position wins.
    pub fn longest_prefix_match(&self, pattern: &[u32]) -> Option<(usize, usize)> {
        self.longest_prefix_match_from(pattern, 0)
    }

    /// [`longest_prefix_match`](Self::longest_prefix_match) restricted to
    /// positions at or after `min_position`.
    pub fn longest_prefix_match_from(
        &self,
        pattern: &[u32],
        min_position: usize,
    ) -> Option<(usize, usize)> {
        if pattern.is_empty() || self.order.is_empty() {
            return None;
        }
        let text = &self.tokens;
        let insert_at = self.order.partition_point(|&p| text[p..] < *pattern);

        // the common prefix with `pattern` only shrinks moving away from
        // insert_at, so each side stops once it falls below the best
        let mut best: Option<(usize, usize)> = None;
        self.scan_ranks((0..insert_at).rev(), pattern, min_position, &mut best);
        self.scan_ranks(insert_at..self.order.len(), pattern, min_position, &mut best);
        best
    }

    fn scan_ranks(
        &self,
        ranks: impl Iterator<Item = usize>,
        pattern: &[u32],
        min_position: usize,
        best: &mut Option<(usize, usize)>,
    ) {
        for r in ranks {
            let position = self.order[r];
            let len = common_prefix(&self.tokens[position..], pattern);
            if len == 0 || best.is_some_and(|(_, best_len)| len < best_len) {
                break;
            }
            if position < min_position {
                continue;
            }
            let better = match *best {
                None => true,
                Some((best_position, best_len)) => {
                    len > best_len || (len == best_len && position < best_position)
                }
            };
            if better {
                *best = Some((position, len));
            }
        }
    }

    /// Whether `position + len` is followed by `token`.
    fn continues_with(&self, position: usize, len: usize, token: u32) -> bool {
        self.tokens.get(position + len) == Some(&token)
    }
}

fn common_prefix(a: &[u32], b: &[u32]) -> usize {
    a.iter().zip(b).take_while(|(x, y)| x == y).count()
}

/// Longest reference match for every start offset of the generated window,
/// kept across calls.
#[derive(Debug, Default)]
struct MatchTable {
    /// `starts[j]`: longest prefix of `window[j..]` in the reference window.
    starts: Vec<Option<MatchBlock>>,
    /// Offsets whose match reached the end of `synced`.
    open: Vec<usize>,
    synced: Vec<u32>,
}

impl MatchTable {
    fn clear(&mut self) {
        self.starts.clear();
        self.open.clear();
        self.synced.clear();
    }

    fn advance(&mut self, window: &[u32], suffixes: &SuffixArray) {
        if !window.starts_with(&self.synced) {
            debug!(
                synced = self.synced.len(),
                window = window.len(),
                "generated window was rewritten, re-indexing matches"
            );
            self.clear();
        }
        if window.len() == self.synced.len() {
            return;
        }

        let old_end = self.synced.len();
        let open = std::mem::take(&mut self.open);
        for j in open.into_iter().chain(old_end..window.len()) {
            let block = match self.starts.get(j).copied().flatten() {
                // still the earliest position if it keeps matching
                Some(mut block) => {
                    while block.generated_end() < window.len()
                        && suffixes.continues_with(
                            block.reference_start,
                            block.len,
                            window[block.generated_end()],
                        )
                    {
                        block.len += 1;
                    }
                    if block.generated_end() == window.len() {
                        Some(block)
                    } else {
                        lookup(suffixes, window, j)
                    }
                }
                None => lookup(suffixes, window, j),
            };
            if block.is_some_and(|b| b.generated_end() == window.len()) {
                self.open.push(j);
            }
            match self.starts.get_mut(j) {
                Some(slot) => *slot = block,
                None => self.starts.push(block),
            }
        }
        self.synced.extend_from_slice(&window[old_end..]);
    }

    /// Longest block with reference start at or after `alo` and generated
    /// start at or after `blo`; both ranges run to the end.
    fn longest_from(
        &self,
        suffixes: &SuffixArray,
        window: &[u32],
        alo: usize,
        blo: usize,
    ) -> MatchBlock {
        let mut best = MatchBlock::new(alo, blo, 0);
        for (j, start) in self.starts.iter().enumerate().skip(blo) {
            let candidate = match *start {
                Some(block) if block.reference_start >= alo => Some(block),
                Some(_) => suffixes
                    .longest_prefix_match_from(&window[j..], alo)
                    .map(|(position, len)| MatchBlock::new(position, j, len)),
                None => None,
            };
            if let Some(candidate) = candidate {
                best = best.preferred(candidate);
            }
        }
        best
    }
}

fn lookup(suffixes: &SuffixArray, window: &[u32], j: usize) -> Option<MatchBlock> {
    suffixes
        .longest_prefix_match(&window[j..])
        .map(|(position, len)| MatchBlock::new(position, j, len))
}

/// Matcher backed by a suffix array over the reference window.
#[derive(Debug)]
pub struct IndexedMatcher {
    reference: Arc<[u32]>,
    config: MatcherConfig,
    plan: Option<WindowPlan>,
    suffixes: SuffixArray,
    table: MatchTable,
}

impl IndexedMatcher {
    pub fn new(reference: impl Into<Arc<[u32]>>) -> Self {
        Self::with_config(reference, MatcherConfig::default())
    }

    pub fn with_config(reference: impl Into<Arc<[u32]>>, config: MatcherConfig) -> Self {
        Self {
            reference: reference.into(),
            config,
            plan: None,
            suffixes: SuffixArray::default(),
            table: MatchTable::default(),
        }
    }

    /// Longest match per generated start offset, window-relative.
    pub fn matches(&self) -> &[Option<MatchBlock>] {
        &self.table.starts
    }
}

impl BlockFinder for IndexedMatcher {
    fn reference_tokens(&self) -> &[u32] {
        &self.reference
    }

    fn config(&self) -> &MatcherConfig {
        &self.config
    }

    fn last_block(&mut self, generated: &[u32]) -> Result<Option<MatchBlock>, MatchError> {
        let plan = self.config.window.plan(self.reference.len(), generated.len());
        if self.plan.as_ref() != Some(&plan) {
            let reference_moved = self.plan.as_ref().map(|p| &p.reference) != Some(&plan.reference);
            if reference_moved {
                debug!(
                    start = plan.reference.start,
                    end = plan.reference.end,
                    "building suffix array over reference window"
                );
                self.suffixes = SuffixArray::build(plan.reference_slice(&self.reference));
            }
            self.table.clear();
            self.plan = Some(plan.clone());
        }

        if self.suffixes.len() != plan.reference.len() {
            return Err(MatchError::CorruptIndex(format!(
                "suffix array covers {} tokens, window has {}",
                self.suffixes.len(),
                plan.reference.len()
            )));
        }

        let window = plan.generated_slice(generated);
        self.table.advance(window, &self.suffixes);

        let (table, suffixes) = (&self.table, &self.suffixes);
        let block = last_block_on_spine(suffixes.len(), window.len(), |alo, _, blo, _| {
            table.longest_from(suffixes, window, alo, blo)
        });
        Ok(block.map(|block| block.to_absolute(&plan)))
    }

    fn clear(&mut self) {
        self.plan = None;
        self.suffixes = SuffixArray::default();
        self.table.clear();
    }
}

impl ReferenceMatcher for IndexedMatcher {
    fn next_chunk(&mut self, generated: &[u32], max_len: usize) -> Vec<u32> {
        propose_chunk(self, MatcherBackend::Indexed, generated, max_len)
    }

    fn reference(&self) -> &[u32] {
        &self.reference
    }

    fn backend(&self) -> MatcherBackend {
        MatcherBackend::Indexed
    }

    fn reset(&mut self) {
        BlockFinder::clear(self);
    }
}
