//! Prompt-lookup n-gram fallback.
//!
//! When the reference has nothing to say, the context itself often does:
//! code and structured text repeat. The longest suffix of the context (up to
//! `max_n` tokens) that also occurs earlier is located, and the tokens that
//! followed its earliest occurrence are proposed.
//!
//! Reading the context backwards turns "suffix that occurs earlier" into
//! "prefix that occurs later", which one pass of a KMP failure function
//! answers in linear time.

use super::FallbackProposer;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PromptLookupConfig {
    /// Shortest suffix worth matching.
    pub min_n: usize,
    /// Longest suffix tried.
    pub max_n: usize,
}

impl Default for PromptLookupConfig {
    fn default() -> Self {
        Self { min_n: 2, max_n: 5 }
    }
}

/// [`FallbackProposer`] that looks the context's own suffix up in the
/// context.
#[derive(Debug, Clone, Default)]
pub struct PromptLookupFallback {
    config: PromptLookupConfig,
}

impl PromptLookupFallback {
    pub fn new(config: PromptLookupConfig) -> Self {
        Self { config }
    }
}

impl FallbackProposer for PromptLookupFallback {
    fn propose(&self, context_tokens: &[u32], max_len: usize) -> Vec<u32> {
        lookup(context_tokens, self.config.min_n.max(1), self.config.max_n, max_len)
    }

    fn name(&self) -> &str {
        "prompt-lookup"
    }
}

fn lookup(tokens: &[u32], min_n: usize, max_n: usize, max_len: usize) -> Vec<u32> {
    let total = tokens.len();
    if max_len == 0 || max_n < min_n || total <= min_n {
        return Vec::new();
    }

    // back(i) is the i-th token counting from the end
    let back = |i: usize| tokens[total - 1 - i];

    // failure function of the reversed context, capped at max_n
    let mut fail = vec![0usize; max_n];
    let mut matched = 0usize;
    let mut best_len = 0usize;
    let mut best_end = 0usize;

    let mut i = 1;
    while i < total {
        if back(matched) == back(i) {
            matched += 1;
            // >= keeps the last hit backwards, the earliest one forwards
            if matched >= best_len {
                best_len = matched;
                best_end = i;
            }
            if i < max_n {
                fail[i] = matched;
            }
            if matched == max_n {
                matched = fail[max_n - 1];
            }
            i += 1;
        } else if matched > 0 {
            matched = fail[matched - 1];
        } else {
            i += 1;
        }
    }

    if best_len < min_n {
        return Vec::new();
    }
    let from = total - 1 - best_end + best_len;
    let to = (from + max_len).min(total);
    tokens[from..to].to_vec()
}
