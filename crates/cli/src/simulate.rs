//! `specedit simulate`: replay recorded cases and report draft acceptance.

use std::fs;
use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use serde::Serialize;
use specedit_core::eval::{simulate_case, EvalCase, EvalMetrics, EvalMode, EvalSummary};
use specedit_core::proposer::{PerRequestAdapter, PromptLookupConfig, PromptLookupFallback};
use specedit_core::{RuntimeToggles, SpecEditConfig, SpecEditProposer};
use tracing::{debug, info};

/// Metrics for one case under one mode.
#[derive(Debug, Clone, Serialize)]
pub struct CaseReport {
    pub id: String,
    pub mode: EvalMode,
    #[serde(flatten)]
    pub metrics: EvalMetrics,
    pub acceptance_rate: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct ModeSummary {
    pub mode: EvalMode,
    #[serde(flatten)]
    pub summary: EvalSummary,
    pub acceptance_rate: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct Report {
    pub backend: String,
    pub num_speculative_tokens: usize,
    pub cases: Vec<CaseReport>,
    pub summary: Vec<ModeSummary>,
}

/// Read cases from a JSON array or from JSON lines.
pub fn load_cases(path: &Path) -> anyhow::Result<Vec<EvalCase>> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("failed to read cases from {}", path.display()))?;
    parse_cases(&content).with_context(|| format!("invalid cases in {}", path.display()))
}

pub fn parse_cases(content: &str) -> anyhow::Result<Vec<EvalCase>> {
    if content.trim_start().starts_with('[') {
        return Ok(serde_json::from_str(content)?);
    }
    content
        .lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(i, line)| {
            serde_json::from_str(line).with_context(|| format!("line {}", i + 1))
        })
        .collect()
}

/// Run every case under every requested mode.
///
/// Each mode gets a fresh proposer so sessions never leak between modes.
pub fn run(config: &SpecEditConfig, cases: &[EvalCase], modes: &[EvalMode]) -> anyhow::Result<Report> {
    let mut reports = Vec::with_capacity(cases.len() * modes.len());
    let mut summary = Vec::with_capacity(modes.len());
    let mut backend = config.backend;

    for &mode in modes {
        let proposer = build_proposer(config)?;
        backend = proposer.inner().sessions().backend();
        info!(%mode, %backend, cases = cases.len(), "simulating");

        let metrics: Vec<EvalMetrics> = cases
            .iter()
            .map(|case| {
                let metrics = simulate_case(&proposer, case, mode);
                debug!(case = %case.id, %mode, accepted = metrics.total_accepted_tokens, "case done");
                metrics
            })
            .collect();

        let mode_summary = EvalSummary::from_metrics(&metrics);
        summary.push(ModeSummary {
            mode,
            summary: mode_summary,
            acceptance_rate: mode_summary.acceptance_rate(),
        });
        reports.extend(cases.iter().zip(metrics).map(|(case, metrics)| CaseReport {
            id: case.id.clone(),
            mode,
            acceptance_rate: metrics.acceptance_rate(),
            metrics,
        }));
    }

    Ok(Report {
        backend: backend.to_string(),
        num_speculative_tokens: config.num_speculative_tokens,
        cases: reports,
        summary,
    })
}

fn build_proposer(config: &SpecEditConfig) -> anyhow::Result<PerRequestAdapter> {
    let toggles = RuntimeToggles::from_config(config);
    let fallback = PromptLookupFallback::new(PromptLookupConfig { min_n: 1, max_n: 5 });
    let inner = SpecEditProposer::new(config.clone(), toggles)?.with_fallback(Arc::new(fallback));
    Ok(PerRequestAdapter::new(Arc::new(inner)))
}
