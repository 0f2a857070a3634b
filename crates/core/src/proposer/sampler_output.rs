//! Adapter for engines that expect a fixed-length batch sampler output.

use std::sync::Arc;

use tracing::debug;

use super::{DraftProposer, SpecEditProposer};
use crate::session::SessionError;

/// One sequence group of the engine batch.
#[derive(Debug, Clone, Copy)]
pub struct SequenceGroup<'a> {
    pub request_id: &'a str,
    pub context_tokens: &'a [u32],
    pub output_tokens: &'a [u32],
}

/// Fixed-length draft for one sequence group.
///
/// `token_ids` always holds `sample_len` tokens; drafts shorter than that
/// are padded with their last token. `proposed_len` is the unpadded length.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DraftOutput {
    pub token_ids: Vec<u32>,
    pub proposed_len: usize,
}

impl DraftOutput {
    /// Pad `tokens` to `sample_len`. Empty drafts have no output.
    pub fn padded(mut tokens: Vec<u32>, sample_len: usize) -> Option<Self> {
        tokens.truncate(sample_len);
        let last = *tokens.last()?;
        let proposed_len = tokens.len();
        tokens.resize(sample_len, last);
        Some(Self {
            token_ids: tokens,
            proposed_len,
        })
    }

    /// The draft without padding.
    pub fn proposed(&self) -> &[u32] {
        &self.token_ids[..self.proposed_len]
    }
}

/// [`DraftProposer`] for engines that collect one sampler output per
/// sequence group for the whole batch.
#[derive(Debug, Clone)]
pub struct SamplerOutputAdapter {
    inner: Arc<SpecEditProposer>,
}

impl SamplerOutputAdapter {
    pub fn new(inner: Arc<SpecEditProposer>) -> Self {
        Self { inner }
    }

    pub fn inner(&self) -> &SpecEditProposer {
        &self.inner
    }

    /// Drafts for every group, or `None` when the batch has no draft at all.
    ///
    /// Groups without a reference draft get `None` entries. When no group got
    /// a reference draft (or speculative edit is off) the whole batch goes to
    /// the fallback instead.
    pub fn sampler_output(
        &self,
        groups: &[SequenceGroup<'_>],
        sample_len: usize,
    ) -> Option<Vec<Option<DraftOutput>>> {
        if sample_len == 0 || groups.is_empty() {
            return None;
        }
        if !self.inner.toggles().speculative_edit_enabled() {
            return self.fallback_batch(groups, sample_len);
        }

        let outputs: Vec<Option<DraftOutput>> = groups
            .iter()
            .map(|group| self.reference_output(group, sample_len))
            .collect();

        if outputs.iter().all(Option::is_none) {
            debug!(groups = groups.len(), "no reference drafts in batch");
            return self.fallback_batch(groups, sample_len);
        }
        Some(outputs)
    }

    fn reference_output(&self, group: &SequenceGroup<'_>, sample_len: usize) -> Option<DraftOutput> {
        if !self.inner.sessions().contains(group.request_id) {
            return None;
        }
        let k = sample_len.min(self.inner.budget(group.context_tokens.len()));
        if k == 0 {
            return None;
        }
        let chunk = self.inner.reference_chunk(group.request_id, group.output_tokens, k)?;
        DraftOutput::padded(chunk, sample_len)
    }

    fn fallback_batch(
        &self,
        groups: &[SequenceGroup<'_>],
        sample_len: usize,
    ) -> Option<Vec<Option<DraftOutput>>> {
        if !self.inner.toggles().ngram_fallback_enabled() || !self.inner.fallback_installed() {
            return None;
        }
        let outputs: Vec<Option<DraftOutput>> = groups
            .iter()
            .map(|group| {
                let proposal = self.inner.fallback(group.context_tokens, sample_len);
                DraftOutput::padded(proposal.tokens, sample_len)
            })
            .collect();
        if outputs.iter().all(Option::is_none) {
            return None;
        }
        Some(outputs)
    }
}

impl DraftProposer for SamplerOutputAdapter {
    fn on_request_start(&self, request_id: &str, reference: &[u32]) -> Result<(), SessionError> {
        self.inner.start_request(request_id, reference)
    }

    fn propose(
        &self,
        request_id: Option<&str>,
        context_tokens: &[u32],
        output_tokens: &[u32],
    ) -> Vec<u32> {
        let sample_len = self.inner.num_speculative_tokens();
        let output = match request_id {
            Some(request_id) => {
                let group = SequenceGroup {
                    request_id,
                    context_tokens,
                    output_tokens,
                };
                self.sampler_output(&[group], sample_len)
            }
            None => {
                let fallback = self.inner.fallback(context_tokens, sample_len);
                return fallback.tokens;
            }
        };
        output
            .and_then(|mut outputs| outputs.pop().flatten())
            .map(|draft| draft.proposed().to_vec())
            .unwrap_or_default()
    }

    fn on_request_finished(&self, request_id: &str) {
        self.inner.finish_request(request_id);
    }

    fn name(&self) -> &str {
        "specedit-sampler-output"
    }
}
