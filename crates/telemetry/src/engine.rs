//! Thread-safe telemetry engine — keeps completed run records and serves
//! aggregate usage reports.
//!
//! Runs write here only once, after their own ledger is closed; per-run
//! accounting never touches this shared state.

use crate::ledger::format_reduction;
use crate::model::{RunRecord, UsageSnapshot};
use std::collections::VecDeque;
use std::sync::{PoisonError, RwLock};

/// The process-wide telemetry engine.
pub struct TelemetryEngine {
    enabled: bool,
    /// Completed runs, oldest first.
    history: RwLock<VecDeque<RunRecord>>,
    history_limit: usize,
    totals: RwLock<RunningTotals>,
}

#[derive(Debug, Default)]
struct RunningTotals {
    runs: u64,
    input_tokens: u64,
    output_tokens: u64,
    elapsed_ms: u64,
    failed_stages: u64,
}

impl TelemetryEngine {
    pub fn new(history_limit: usize) -> Self {
        Self {
            enabled: true,
            history: RwLock::new(VecDeque::new()),
            history_limit,
            totals: RwLock::new(RunningTotals::default()),
        }
    }

    pub fn from_config(config: &docsmith_config::TelemetryConfig) -> Self {
        Self {
            enabled: config.enabled,
            ..Self::new(config.history_limit)
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Fold a finished run into the totals and history.
    pub fn record_run(&self, record: RunRecord) {
        if !self.enabled {
            return;
        }

        {
            let mut totals = self.totals.write().unwrap_or_else(PoisonError::into_inner);
            totals.runs += 1;
            totals.input_tokens += record.resources.total_input_tokens;
            totals.output_tokens += record.resources.total_output_tokens;
            totals.elapsed_ms += record.duration_ms;
            totals.failed_stages += record.failed_stages as u64;
        }

        tracing::debug!(run_id = %record.run_id, "Run recorded");

        let mut history = self.history.write().unwrap_or_else(PoisonError::into_inner);
        history.push_back(record);
        while history.len() > self.history_limit {
            history.pop_front();
        }
    }

    /// Look up a retained run.
    pub fn get_run(&self, run_id: &str) -> Option<RunRecord> {
        let history = self.history.read().unwrap_or_else(PoisonError::into_inner);
        history.iter().find(|r| r.run_id == run_id).cloned()
    }

    /// Retained runs, most recent first.
    pub fn recent_runs(&self, limit: usize) -> Vec<RunRecord> {
        let history = self.history.read().unwrap_or_else(PoisonError::into_inner);
        history.iter().rev().take(limit).cloned().collect()
    }

    pub fn usage_snapshot(&self) -> UsageSnapshot {
        let totals = self.totals.read().unwrap_or_else(PoisonError::into_inner);
        UsageSnapshot {
            runs_completed: totals.runs,
            total_input_tokens: totals.input_tokens,
            total_output_tokens: totals.output_tokens,
            total_elapsed_ms: totals.elapsed_ms,
            failed_stages: totals.failed_stages,
            overall_reduction: format_reduction(totals.input_tokens, totals.output_tokens),
            recent_runs: self.recent_runs(self.history_limit),
        }
    }
}

impl Default for TelemetryEngine {
    fn default() -> Self {
        Self::from_config(&docsmith_config::TelemetryConfig::default())
    }
}
