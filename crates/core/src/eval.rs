//! Offline replay of recorded edits through a [`DraftProposer`].
//!
//! A case pairs the reference the request was started with and the output
//! the model actually produced. The replay pretends to be the engine: it
//! asks for a draft, accepts the prefix that agrees with the recorded output
//! and otherwise advances by one recorded token.

use std::time::Instant;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::proposer::DraftProposer;

/// Upper bound on propose calls per case.
pub const MAX_ITERATIONS: usize = 20_000;

/// How a case is replayed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EvalMode {
    /// Register the reference and pass the request id on every step.
    #[default]
    SpecEdit,
    /// Withhold the request id so only the fallback proposes.
    NGram,
}

impl EvalMode {
    pub const ALL: [EvalMode; 2] = [EvalMode::NGram, EvalMode::SpecEdit];

    pub fn name(self) -> &'static str {
        match self {
            EvalMode::SpecEdit => "specedit",
            EvalMode::NGram => "ngram",
        }
    }
}

impl std::fmt::Display for EvalMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// One recorded request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvalCase {
    pub id: String,
    /// Tokens the request was started with.
    pub reference: Vec<u32>,
    /// Tokens the model produced.
    pub output: Vec<u32>,
    /// Prompt tokens preceding the output in the model context.
    #[serde(default)]
    pub prompt: Option<Vec<u32>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct EvalMetrics {
    pub execution_time_ms: f64,
    pub propose_count: usize,
    pub total_accepted_tokens: usize,
    pub total_output_tokens: usize,
}

impl EvalMetrics {
    /// Share of the output that arrived through accepted drafts.
    pub fn acceptance_rate(&self) -> f64 {
        if self.total_output_tokens == 0 {
            return 0.0;
        }
        self.total_accepted_tokens as f64 / self.total_output_tokens as f64
    }

    /// A case that never ran.
    pub fn is_failed_case(&self) -> bool {
        self.execution_time_ms == 0.0
            && self.propose_count == 0
            && self.total_accepted_tokens == 0
            && self.total_output_tokens == 0
    }
}

/// Metrics summed over many cases.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct EvalSummary {
    pub cases: usize,
    pub failed_cases: usize,
    pub execution_time_ms: f64,
    pub propose_count: usize,
    pub total_accepted_tokens: usize,
    pub total_output_tokens: usize,
}

impl EvalSummary {
    pub fn from_metrics<'a>(metrics: impl IntoIterator<Item = &'a EvalMetrics>) -> Self {
        metrics.into_iter().fold(Self::default(), |mut summary, m| {
            summary.cases += 1;
            if m.is_failed_case() {
                summary.failed_cases += 1;
                return summary;
            }
            summary.execution_time_ms += m.execution_time_ms;
            summary.propose_count += m.propose_count;
            summary.total_accepted_tokens += m.total_accepted_tokens;
            summary.total_output_tokens += m.total_output_tokens;
            summary
        })
    }

    pub fn acceptance_rate(&self) -> f64 {
        if self.total_output_tokens == 0 {
            return 0.0;
        }
        self.total_accepted_tokens as f64 / self.total_output_tokens as f64
    }
}

/// Number of leading positions where `draft` and `truth` agree.
pub fn prefix_match_len(draft: &[u32], truth: &[u32]) -> usize {
    draft
        .iter()
        .zip(truth)
        .take_while(|(d, t)| d == t)
        .count()
}

/// Replay `case` through `proposer`.
pub fn simulate_case(proposer: &dyn DraftProposer, case: &EvalCase, mode: EvalMode) -> EvalMetrics {
    let started = Instant::now();
    let request_id = format!("eval-{}-{}", mode, case.id);

    let registered = mode == EvalMode::SpecEdit
        && match proposer.on_request_start(&request_id, &case.reference) {
            Ok(()) => true,
            Err(err) => {
                warn!(case = %case.id, error = %err, "could not register reference");
                false
            }
        };
    let id = (mode == EvalMode::SpecEdit).then_some(request_id.as_str());

    let truth = &case.output;
    let prompt = case.prompt.as_deref().unwrap_or(&[]);
    let mut context: Vec<u32> = Vec::with_capacity(prompt.len() + truth.len());
    context.extend_from_slice(prompt);

    let mut generated = 0usize;
    let mut propose_count = 0usize;
    let mut accepted_total = 0usize;
    let mut iteration = 0usize;

    while iteration < MAX_ITERATIONS && generated < truth.len() {
        propose_count += 1;
        let draft = proposer.propose(id, &context, &truth[..generated]);
        let remaining = &truth[generated..];
        let accepted = prefix_match_len(&draft, remaining);

        if accepted == 0 {
            context.push(remaining[0]);
            generated += 1;
        } else {
            accepted_total += accepted;
            context.extend_from_slice(&remaining[..accepted]);
            generated += accepted;
        }
        iteration += 1;
    }

    if iteration >= MAX_ITERATIONS {
        debug!(case = %case.id, "stopped at iteration limit");
    }
    if registered {
        proposer.on_request_finished(&request_id);
    }

    EvalMetrics {
        execution_time_ms: started.elapsed().as_secs_f64() * 1000.0,
        propose_count,
        total_accepted_tokens: accepted_total,
        total_output_tokens: truth.len(),
    }
}
