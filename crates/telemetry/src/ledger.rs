//! Run-scoped resource accounting.
//!
//! One [`ResourceAccountant`] per documentation run. It is the only writer of
//! its [`ResourceLedger`]; nothing here is shared between runs.

use docsmith_core::document::{ResourceSummary, StageUsage};
use std::time::{Duration, Instant};

/// `(1 - output / input) * 100`; zero when `input` is zero.
pub fn reduction_percent(input_tokens: u64, output_tokens: u64) -> f64 {
    if input_tokens == 0 {
        return 0.0;
    }
    (1.0 - output_tokens as f64 / input_tokens as f64) * 100.0
}

/// `"42.5%"`, or `"0%"` when nothing was read.
pub fn format_reduction(input_tokens: u64, output_tokens: u64) -> String {
    if input_tokens == 0 {
        return "0%".into();
    }
    format!("{:.1}%", reduction_percent(input_tokens, output_tokens))
}

/// Append-only per-stage usage rows, in stage order.
#[derive(Debug, Clone, Default)]
pub struct ResourceLedger {
    stages: Vec<StageUsage>,
}

impl ResourceLedger {
    pub fn new() -> Self {
        Self::default()
    }

    fn row(&mut self, stage: &str, model: &str) -> &mut StageUsage {
        let index = match self.stages.iter().position(|s| s.stage == stage) {
            Some(index) => index,
            None => {
                self.stages.push(StageUsage {
                    stage: stage.to_string(),
                    model: model.to_string(),
                    input_tokens: 0,
                    output_tokens: 0,
                    elapsed_ms: 0,
                    calls: 0,
                });
                self.stages.len() - 1
            }
        };
        &mut self.stages[index]
    }

    /// Add one generation call's tokens to `stage`.
    pub fn record(&mut self, stage: &str, model: &str, input_tokens: u64, output_tokens: u64) {
        let row = self.row(stage, model);
        row.input_tokens += input_tokens;
        row.output_tokens += output_tokens;
        row.calls += 1;
    }

    /// Add wall time spent in `stage`.
    pub fn add_elapsed(&mut self, stage: &str, model: &str, elapsed: Duration) {
        let row = self.row(stage, model);
        row.elapsed_ms += elapsed.as_millis() as u64;
    }

    pub fn stages(&self) -> &[StageUsage] {
        &self.stages
    }

    pub fn total_input_tokens(&self) -> u64 {
        self.stages.iter().map(|s| s.input_tokens).sum()
    }

    pub fn total_output_tokens(&self) -> u64 {
        self.stages.iter().map(|s| s.output_tokens).sum()
    }

    pub fn summary(&self) -> ResourceSummary {
        let input = self.total_input_tokens();
        let output = self.total_output_tokens();
        ResourceSummary {
            stages: self.stages.clone(),
            total_input_tokens: input,
            total_output_tokens: output,
            total_elapsed_ms: self.stages.iter().map(|s| s.elapsed_ms).sum(),
            reduction_percent: reduction_percent(input, output),
            reduction: format_reduction(input, output),
        }
    }
}

/// Stage timer plus token recorder over a [`ResourceLedger`].
#[derive(Debug, Default)]
pub struct ResourceAccountant {
    ledger: ResourceLedger,
    open: Option<(String, String, Instant)>,
}

impl ResourceAccountant {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start the clock for `stage`. Closes any stage left open.
    pub fn begin_stage(&mut self, stage: &str, model: &str) {
        self.end_stage();
        self.ledger.row(stage, model);
        self.open = Some((stage.to_string(), model.to_string(), Instant::now()));
    }

    /// Stop the clock for the open stage, if any.
    pub fn end_stage(&mut self) {
        if let Some((stage, model, started)) = self.open.take() {
            let elapsed = started.elapsed();
            self.ledger.add_elapsed(&stage, &model, elapsed);
            tracing::debug!(stage = %stage, elapsed_ms = elapsed.as_millis() as u64, "Stage timed");
        }
    }

    pub fn record(&mut self, stage: &str, model: &str, input_tokens: u64, output_tokens: u64) {
        self.ledger.record(stage, model, input_tokens, output_tokens);
    }

    /// Close the open stage and summarize.
    pub fn finish(mut self) -> ResourceSummary {
        self.end_stage();
        let summary = self.ledger.summary();
        tracing::info!(
            input_tokens = summary.total_input_tokens,
            output_tokens = summary.total_output_tokens,
            reduction = %summary.reduction,
            "Resource ledger closed"
        );
        summary
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_input_is_zero_percent() {
        assert_eq!(reduction_percent(0, 0), 0.0);
        assert_eq!(reduction_percent(0, 500), 0.0);
        assert_eq!(format_reduction(0, 500), "0%");
        assert_eq!(ResourceLedger::new().summary().reduction, "0%");
    }

    #[test]
    fn reduction_formula() {
        assert!((reduction_percent(1000, 250) - 75.0).abs() < 1e-9);
        assert_eq!(format_reduction(1000, 250), "75.0%");
        // Expansion shows as negative reduction
        assert_eq!(format_reduction(100, 150), "-50.0%");
    }

    #[test]
    fn ledger_aggregates_per_stage() {
        let mut ledger = ResourceLedger::new();
        ledger.record("draft", "tinyllama", 100, 40);
        ledger.record("draft", "tinyllama", 50, 10);
        ledger.record("polish", "qwen", 60, 30);

        assert_eq!(ledger.stages().len(), 2);
        assert_eq!(ledger.stages()[0].input_tokens, 150);
        assert_eq!(ledger.stages()[0].calls, 2);

        let summary = ledger.summary();
        assert_eq!(summary.total_input_tokens, 210);
        assert_eq!(summary.total_output_tokens, 80);
    }

    #[test]
    fn accountant_times_stages() {
        let mut accountant = ResourceAccountant::new();
        accountant.begin_stage("summarize", "flan");
        accountant.record("summarize", "flan", 10, 2);
        std::thread::sleep(Duration::from_millis(5));
        accountant.begin_stage("draft", "tinyllama");
        accountant.record("draft", "tinyllama", 20, 8);

        let summary = accountant.finish();
        assert_eq!(summary.stages.len(), 2);
        assert!(summary.stages[0].elapsed_ms >= 5);
        assert_eq!(summary.stages[1].model, "tinyllama");
        assert_eq!(summary.total_input_tokens, 30);
    }

    #[test]
    fn stage_without_calls_still_listed() {
        let mut accountant = ResourceAccountant::new();
        accountant.begin_stage("refine", "gemma");
        let summary = accountant.finish();
        assert_eq!(summary.stages.len(), 1);
        assert_eq!(summary.stages[0].calls, 0);
    }
}
