//! Adapter for engines that request one draft per request.

use std::sync::Arc;

use super::{DraftProposer, SpecEditProposer};
use crate::session::SessionError;

/// One slot of the engine's running batch.
#[derive(Debug, Clone, Copy)]
pub struct BatchSlot<'a> {
    pub request_id: &'a str,
    /// Tokens sampled for this slot in the last step; zero skips drafting.
    pub num_sampled: usize,
    /// False when the request uses sampling parameters speculative decoding
    /// cannot honour.
    pub spec_decode_supported: bool,
    pub context_tokens: &'a [u32],
    pub output_tokens: &'a [u32],
}

/// [`DraftProposer`] for engines that call a per-request propose function
/// and treat `None` as "no draft".
#[derive(Debug, Clone)]
pub struct PerRequestAdapter {
    inner: Arc<SpecEditProposer>,
}

impl PerRequestAdapter {
    pub fn new(inner: Arc<SpecEditProposer>) -> Self {
        Self { inner }
    }

    pub fn inner(&self) -> &SpecEditProposer {
        &self.inner
    }

    /// Draft for one request, `None` when there is nothing to propose.
    pub fn propose_for(
        &self,
        context_tokens: &[u32],
        output_tokens: Option<&[u32]>,
        request_id: Option<&str>,
    ) -> Option<Vec<u32>> {
        let proposal = self
            .inner
            .propose(request_id, context_tokens, output_tokens.unwrap_or(&[]));
        (!proposal.is_empty()).then_some(proposal.tokens)
    }

    /// Drafts for a whole batch, one entry per slot. Slots that sampled
    /// nothing, use unsupported sampling parameters or already reached the
    /// model length get an empty draft.
    pub fn propose_draft_token_ids(&self, batch: &[BatchSlot<'_>]) -> Vec<Vec<u32>> {
        batch
            .iter()
            .map(|slot| {
                if slot.num_sampled == 0
                    || !slot.spec_decode_supported
                    || slot.context_tokens.len() >= self.inner.max_model_len()
                {
                    return Vec::new();
                }
                self.propose_for(slot.context_tokens, Some(slot.output_tokens), Some(slot.request_id))
                    .unwrap_or_default()
            })
            .collect()
    }
}

impl DraftProposer for PerRequestAdapter {
    fn on_request_start(&self, request_id: &str, reference: &[u32]) -> Result<(), SessionError> {
        self.inner.start_request(request_id, reference)
    }

    fn propose(
        &self,
        request_id: Option<&str>,
        context_tokens: &[u32],
        output_tokens: &[u32],
    ) -> Vec<u32> {
        self.propose_for(context_tokens, Some(output_tokens), request_id)
            .unwrap_or_default()
    }

    fn on_request_finished(&self, request_id: &str) {
        self.inner.finish_request(request_id);
    }

    fn name(&self) -> &str {
        "specedit-per-request"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SpecEditConfig;
    use crate::testing::RecordingFallback;
    use crate::toggles::RuntimeToggles;

    fn adapter() -> PerRequestAdapter {
        let config = SpecEditConfig {
            num_speculative_tokens: 3,
            max_model_len: 50,
            ..Default::default()
        };
        let inner = SpecEditProposer::new(config, RuntimeToggles::default())
            .unwrap()
            .with_fallback(Arc::new(RecordingFallback::new(vec![77, 78, 79])));
        PerRequestAdapter::new(Arc::new(inner))
    }

    fn slot<'a>(request_id: &'a str, context: &'a [u32], output: &'a [u32]) -> BatchSlot<'a> {
        BatchSlot {
            request_id,
            num_sampled: 1,
            spec_decode_supported: true,
            context_tokens: context,
            output_tokens: output,
        }
    }

    #[test]
    fn propose_for_returns_none_when_empty() {
        let adapter = adapter();
        adapter.inner().toggles().set_ngram_fallback(false);
        adapter.on_request_start("r1", &[1, 2, 3, 4, 5]).unwrap();
        assert_eq!(adapter.propose_for(&[1, 2], Some(&[1, 2][..]), Some("r1")), Some(vec![3, 4, 5]));
        assert_eq!(adapter.propose_for(&[1, 9], Some(&[1, 9][..]), Some("r1")), None);
    }

    #[test]
    fn missing_output_tokens_means_nothing_generated() {
        let adapter = adapter();
        adapter.on_request_start("r1", &[1, 2, 3, 4, 5]).unwrap();
        assert_eq!(adapter.propose_for(&[100, 101], None, Some("r1")), Some(vec![1, 2, 3]));
    }

    #[test]
    fn batch_skips_ineligible_slots() {
        let adapter = adapter();
        adapter.on_request_start("r1", &[1, 2, 3, 4, 5]).unwrap();
        adapter.on_request_start("r2", &[1, 2, 3, 4, 5]).unwrap();
        adapter.on_request_start("r3", &[1, 2, 3, 4, 5]).unwrap();
        adapter.on_request_start("r4", &[1, 2, 3, 4, 5]).unwrap();

        let long_context = vec![0u32; 50];
        let mut no_samples = slot("r2", &[1], &[1]);
        no_samples.num_sampled = 0;
        let mut unsupported = slot("r3", &[1], &[1]);
        unsupported.spec_decode_supported = false;

        let drafts = adapter.propose_draft_token_ids(&[
            slot("r1", &[1], &[1]),
            no_samples,
            unsupported,
            slot("r4", &long_context, &[1]),
        ]);
        assert_eq!(drafts, vec![vec![2, 3, 4], vec![], vec![], vec![]]);
    }

    #[test]
    fn model_length_comes_from_the_proposer_config() {
        let adapter = adapter();
        assert_eq!(adapter.inner().max_model_len(), 50);
        adapter.on_request_start("r1", &[1, 2, 3, 4, 5]).unwrap();

        let mut context = vec![0u32; 48];
        context.push(1);
        let at_limit = vec![0u32; 50];
        let drafts = adapter.propose_draft_token_ids(&[
            slot("r1", &context, &[1]),
            slot("r1", &at_limit, &[1]),
        ]);
        // one position left before the limit
        assert_eq!(drafts, vec![vec![2], vec![]]);
    }

    #[test]
    fn trait_lifecycle() {
        let adapter = adapter();
        let proposer: &dyn DraftProposer = &adapter;
        proposer.on_request_start("r1", &[1, 2, 3, 4]).unwrap();
        assert!(proposer.on_request_start("r1", &[1]).is_err());
        assert_eq!(proposer.propose(Some("r1"), &[1], &[1]), vec![2, 3, 4]);
        proposer.on_request_finished("r1");
        assert_eq!(proposer.propose(Some("r1"), &[1], &[1]), vec![77, 78, 79]);
        assert_eq!(proposer.name(), "specedit-per-request");
    }
}
