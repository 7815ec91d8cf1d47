//! Resource accounting and usage reporting for docsmith.
//!
//! Two scopes, kept apart:
//!
//! - [`ResourceAccountant`] / [`ResourceLedger`] — per-run token and wall-time
//!   accounting, owned by exactly one documentation run
//! - [`TelemetryEngine`] — process-wide history of completed runs, fed once
//!   per run after its ledger is closed

pub mod engine;
pub mod ledger;
pub mod model;

pub use engine::TelemetryEngine;
pub use ledger::{ResourceAccountant, ResourceLedger, format_reduction, reduction_percent};
pub use model::{RunRecord, UsageSnapshot};
