use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use crate::proposer::FallbackProposer;

/// Fallback that always offers the same draft and records how it was
/// called.
#[derive(Debug, Default)]
pub struct RecordingFallback {
    draft: Vec<u32>,
    calls: AtomicUsize,
    last_context: Mutex<Vec<u32>>,
}

impl RecordingFallback {
    pub fn new(draft: Vec<u32>) -> Self {
        Self {
            draft,
            ..Default::default()
        }
    }

    /// A fallback that never proposes anything.
    pub fn silent() -> Self {
        Self::default()
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn last_context(&self) -> Vec<u32> {
        self.last_context
            .lock()
            .map(|context| context.clone())
            .unwrap_or_default()
    }
}

impl FallbackProposer for RecordingFallback {
    fn propose(&self, context_tokens: &[u32], max_len: usize) -> Vec<u32> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut last) = self.last_context.lock() {
            *last = context_tokens.to_vec();
        }
        self.draft.iter().copied().take(max_len).collect()
    }

    fn name(&self) -> &str {
        "recording"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn records_calls_and_context() {
        let fallback = RecordingFallback::new(vec![1, 2, 3]);
        assert_eq!(fallback.propose(&[9, 9], 2), vec![1, 2]);
        assert_eq!(fallback.calls(), 1);
        assert_eq!(fallback.last_context(), vec![9, 9]);
    }

    #[test]
    fn silent_fallback_proposes_nothing() {
        assert!(RecordingFallback::silent().propose(&[1], 4).is_empty());
    }
}
