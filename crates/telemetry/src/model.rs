//! Data model for completed-run records and usage reports.

use chrono::{DateTime, Utc};
use docsmith_core::document::ResourceSummary;
use serde::{Deserialize, Serialize};

/// One finished documentation run, as kept in process history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunRecord {
    /// Same id as the returned document payload.
    pub run_id: String,
    pub project_name: String,
    pub finished_at: DateTime<Utc>,
    /// Wall time of the whole run.
    pub duration_ms: u64,
    /// Stages that failed (model load or outright failure).
    pub failed_stages: usize,
    /// Headings that fell back across all stages.
    pub fallbacks: usize,
    pub resources: ResourceSummary,
}

/// Process-wide usage, served by `GET /v1/usage`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UsageSnapshot {
    pub runs_completed: u64,
    pub total_input_tokens: u64,
    pub total_output_tokens: u64,
    pub total_elapsed_ms: u64,
    pub failed_stages: u64,
    /// Reduction over all recorded runs.
    pub overall_reduction: String,
    /// Most recent first.
    pub recent_runs: Vec<RunRecord>,
}
