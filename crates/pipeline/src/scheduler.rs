//! Stage scheduler — runs an ordered list of stages over one compute device.
//!
//! Each stage is bound to one model. The scheduler acquires that model before
//! the stage's work starts and releases it when the work ends, whatever the
//! reason. Release happens through [`ResidencyGuard`]'s `Drop`, so an early
//! return, an error, or cancellation all reclaim the device before the next
//! stage begins acquiring.
//!
//! A stage whose model cannot be loaded is recorded as failed and the run
//! continues with the next stage. Only cancellation ends a run early.

use async_trait::async_trait;
use docsmith_config::{StageConfig, StageIntent};
use docsmith_core::document::{StageOutcome, StageStatus};
use docsmith_core::error::{Error, ProviderError, StageError};
use docsmith_core::provider::{
    Generation, GenerationProvider, GenerationRequest, ModelHandle, SamplingConfig,
};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// One entry of the scheduler's fixed stage list.
#[derive(Debug, Clone)]
pub struct StageSpec {
    pub id: String,
    pub model: String,
    pub intent: StageIntent,
    pub max_output_tokens: u32,
    pub sampling: SamplingConfig,
    /// Per generation call; `None` waits indefinitely
    pub timeout: Option<Duration>,
}

impl StageSpec {
    pub fn new(id: impl Into<String>, model: impl Into<String>, intent: StageIntent) -> Self {
        Self {
            id: id.into(),
            model: model.into(),
            intent,
            max_output_tokens: 256,
            sampling: SamplingConfig::default(),
            timeout: None,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Build a request carrying this stage's budget and sampling.
    pub fn request(&self, prompt: String) -> GenerationRequest {
        GenerationRequest::new(prompt, self.max_output_tokens).with_sampling(self.sampling.clone())
    }
}

impl From<&StageConfig> for StageSpec {
    fn from(config: &StageConfig) -> Self {
        Self {
            id: config.id.clone(),
            model: config.model.clone(),
            intent: config.intent,
            max_output_tokens: config.max_output_tokens,
            sampling: SamplingConfig {
                temperature: config.temperature,
                repetition_penalty: config.repetition_penalty,
                top_p: None,
            },
            timeout: (config.timeout_secs > 0).then(|| Duration::from_secs(config.timeout_secs)),
        }
    }
}

// ── Residency audit ───────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ResidencyEvent {
    Acquired { stage: String, model: String },
    AcquireFailed { stage: String, model: String },
    Released { stage: String, model: String },
}

/// Acquisition/release log for one run.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ResidencyAudit {
    events: Vec<ResidencyEvent>,
    resident: usize,
    max_resident: usize,
}

impl ResidencyAudit {
    fn acquired(&mut self, stage: &str, model: &str) {
        self.resident += 1;
        self.max_resident = self.max_resident.max(self.resident);
        self.events.push(ResidencyEvent::Acquired {
            stage: stage.into(),
            model: model.into(),
        });
    }

    fn acquire_failed(&mut self, stage: &str, model: &str) {
        self.events.push(ResidencyEvent::AcquireFailed {
            stage: stage.into(),
            model: model.into(),
        });
    }

    fn released(&mut self, stage: &str, model: &str) {
        self.resident = self.resident.saturating_sub(1);
        self.events.push(ResidencyEvent::Released {
            stage: stage.into(),
            model: model.into(),
        });
    }

    pub fn events(&self) -> &[ResidencyEvent] {
        &self.events
    }

    /// Handles currently held. Zero once a run has returned.
    pub fn resident(&self) -> usize {
        self.resident
    }

    /// Highest number of handles held at the same time.
    pub fn max_resident(&self) -> usize {
        self.max_resident
    }
}

// ── Scoped acquisition ────────────────────────────────────────────────

/// Owns the stage's [`ModelHandle`] and gives it back on drop.
pub struct ResidencyGuard<'a> {
    provider: &'a dyn GenerationProvider,
    handle: Option<ModelHandle>,
    stage: &'a str,
    audit: &'a mut ResidencyAudit,
}

impl<'a> ResidencyGuard<'a> {
    fn new(
        provider: &'a dyn GenerationProvider,
        handle: ModelHandle,
        stage: &'a str,
        audit: &'a mut ResidencyAudit,
    ) -> Self {
        audit.acquired(stage, handle.model());
        Self {
            provider,
            handle: Some(handle),
            stage,
            audit,
        }
    }

    /// Bring `model` onto the device for `stage`. A failed load is audited
    /// and nothing is held.
    pub async fn acquire(
        provider: &'a dyn GenerationProvider,
        model: &str,
        stage: &'a str,
        audit: &'a mut ResidencyAudit,
    ) -> Result<Self, ProviderError> {
        match provider.acquire(model).await {
            Ok(handle) => Ok(Self::new(provider, handle, stage, audit)),
            Err(e) => {
                audit.acquire_failed(stage, model);
                Err(e)
            }
        }
    }

    pub fn resident(&self) -> Option<ResidentModel<'_>> {
        self.handle.as_ref().map(|handle| ResidentModel {
            provider: self.provider,
            handle,
        })
    }

    /// Release now instead of at end of scope.
    pub fn release(mut self) {
        self.release_inner();
    }

    fn release_inner(&mut self) {
        if let Some(handle) = self.handle.take() {
            let model = handle.model().to_string();
            let held_ms = (chrono::Utc::now() - handle.acquired_at()).num_milliseconds();
            self.provider.release(handle);
            self.audit.released(self.stage, &model);
            info!(stage = %self.stage, model = %model, held_ms, "Model released");
        }
    }
}

impl Drop for ResidencyGuard<'_> {
    fn drop(&mut self) {
        self.release_inner();
    }
}

/// What a stage's work sees of the device: generation against the one
/// resident model, with no way to acquire or release.
#[derive(Clone, Copy)]
pub struct ResidentModel<'a> {
    provider: &'a dyn GenerationProvider,
    handle: &'a ModelHandle,
}

impl ResidentModel<'_> {
    pub fn model(&self) -> &str {
        self.handle.model()
    }

    pub async fn generate(&self, request: GenerationRequest) -> Result<Generation, ProviderError> {
        self.provider.generate(self.handle, request).await
    }

    pub fn count_tokens(&self, text: &str) -> usize {
        self.provider.count_tokens(text)
    }
}

// ── Executor seam ─────────────────────────────────────────────────────

/// The per-stage work the scheduler drives.
#[async_trait]
pub trait StageExecutor: Send {
    /// Called before the stage's model is acquired.
    fn enter_stage(&mut self, _stage: &StageSpec) {}

    /// Do the stage's work against its resident model.
    ///
    /// Returns the number of headings that fell back to placeholder text.
    async fn run_stage(
        &mut self,
        stage: &StageSpec,
        model: ResidentModel<'_>,
    ) -> Result<usize, StageError>;

    /// The stage could not run; record placeholder output for it.
    fn stage_failed(&mut self, stage: &StageSpec, error: &StageError);

    /// Called after the stage's model has been released.
    fn exit_stage(&mut self, _stage: &StageSpec) {}
}

/// Result of a full schedule.
#[derive(Debug, Clone)]
pub struct ScheduleReport {
    pub outcomes: Vec<StageOutcome>,
    pub audit: ResidencyAudit,
}

impl ScheduleReport {
    pub fn failed_stages(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|o| o.status != StageStatus::Completed)
            .count()
    }

    pub fn fallbacks(&self) -> usize {
        self.outcomes.iter().map(|o| o.fallbacks).sum()
    }
}

/// Sequential stage runner with at most one resident model.
pub struct StageScheduler {
    provider: Arc<dyn GenerationProvider>,
    stages: Vec<StageSpec>,
}

impl StageScheduler {
    pub fn new(provider: Arc<dyn GenerationProvider>, stages: Vec<StageSpec>) -> Self {
        Self { provider, stages }
    }

    pub fn from_config(
        provider: Arc<dyn GenerationProvider>,
        stages: &[StageConfig],
    ) -> Self {
        Self::new(provider, stages.iter().map(StageSpec::from).collect())
    }

    pub fn stages(&self) -> &[StageSpec] {
        &self.stages
    }

    /// Run every stage once, in order.
    ///
    /// `&mut self` keeps a scheduler to one in-flight run. Returns
    /// [`Error::Cancelled`] if `cancel` fires; every acquired model has been
    /// released by then.
    pub async fn run(
        &mut self,
        executor: &mut dyn StageExecutor,
        cancel: &CancellationToken,
    ) -> Result<ScheduleReport, Error> {
        let provider = self.provider.as_ref();
        let mut audit = ResidencyAudit::default();
        let mut outcomes = Vec::with_capacity(self.stages.len());

        for stage in &self.stages {
            if cancel.is_cancelled() {
                info!(stage = %stage.id, "Run cancelled before acquisition");
                return Err(Error::Cancelled {
                    stage: stage.id.clone(),
                });
            }

            executor.enter_stage(stage);
            info!(stage = %stage.id, model = %stage.model, intent = %stage.intent, "Stage starting");

            let guard =
                match ResidencyGuard::acquire(provider, &stage.model, &stage.id, &mut audit).await {
                    Ok(guard) => guard,
                    Err(source) => {
                        let error = StageError::ModelLoad {
                            stage: stage.id.clone(),
                            source,
                        };
                        warn!(stage = %stage.id, error = %error, "Stage skipped");
                        executor.stage_failed(stage, &error);
                        executor.exit_stage(stage);
                        outcomes.push(outcome(stage, StageStatus::Failed, Some(error.to_string()), 0));
                        continue;
                    }
                };

            let result = match guard.resident() {
                Some(model) => {
                    tokio::select! {
                        biased;
                        _ = cancel.cancelled() => Err(StageError::Cancelled { stage: stage.id.clone() }),
                        result = executor.run_stage(stage, model) => result,
                    }
                }
                None => Err(StageError::Failed {
                    stage: stage.id.clone(),
                    reason: "model handle missing".into(),
                }),
            };
            guard.release();

            match result {
                Ok(fallbacks) => {
                    info!(stage = %stage.id, fallbacks, "Stage completed");
                    executor.exit_stage(stage);
                    outcomes.push(outcome(stage, StageStatus::Completed, None, fallbacks));
                }
                Err(StageError::Cancelled { stage: id }) => {
                    executor.exit_stage(stage);
                    warn!(stage = %id, "Stage cancelled");
                    return Err(Error::Cancelled { stage: id });
                }
                Err(error) => {
                    warn!(stage = %stage.id, error = %error, "Stage failed");
                    executor.stage_failed(stage, &error);
                    executor.exit_stage(stage);
                    outcomes.push(outcome(stage, StageStatus::Failed, Some(error.to_string()), 0));
                }
            }
        }

        Ok(ScheduleReport { outcomes, audit })
    }
}

fn outcome(
    stage: &StageSpec,
    status: StageStatus,
    detail: Option<String>,
    fallbacks: usize,
) -> StageOutcome {
    StageOutcome {
        stage: stage.id.clone(),
        model: stage.model.clone(),
        status,
        detail,
        fallbacks,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::ScriptedProvider;

    /// Records the order of hook calls and generates once per stage.
    #[derive(Default)]
    struct RecordingExecutor {
        calls: Vec<String>,
        fail_stage: Option<String>,
        hang_stage: Option<String>,
    }

    #[async_trait]
    impl StageExecutor for RecordingExecutor {
        fn enter_stage(&mut self, stage: &StageSpec) {
            self.calls.push(format!("enter:{}", stage.id));
        }

        async fn run_stage(
            &mut self,
            stage: &StageSpec,
            model: ResidentModel<'_>,
        ) -> Result<usize, StageError> {
            if self.hang_stage.as_deref() == Some(stage.id.as_str()) {
                std::future::pending::<()>().await;
            }
            if self.fail_stage.as_deref() == Some(stage.id.as_str()) {
                return Err(StageError::Failed {
                    stage: stage.id.clone(),
                    reason: "boom".into(),
                });
            }
            let out = model
                .generate(stage.request("prompt".into()))
                .await
                .map_err(|e| StageError::Failed {
                    stage: stage.id.clone(),
                    reason: e.to_string(),
                })?;
            self.calls.push(format!("run:{}:{}", stage.id, out.text));
            Ok(0)
        }

        fn stage_failed(&mut self, stage: &StageSpec, _error: &StageError) {
            self.calls.push(format!("failed:{}", stage.id));
        }

        fn exit_stage(&mut self, stage: &StageSpec) {
            self.calls.push(format!("exit:{}", stage.id));
        }
    }

    fn stages(ids: &[&str]) -> Vec<StageSpec> {
        ids.iter()
            .map(|id| StageSpec::new(*id, format!("model-{id}"), StageIntent::Draft))
            .collect()
    }

    #[tokio::test]
    async fn stages_run_in_order_with_one_resident_model() {
        let provider = Arc::new(ScriptedProvider::new());
        let mut scheduler = StageScheduler::new(provider.clone(), stages(&["a", "b", "c"]));
        let mut executor = RecordingExecutor::default();

        let report = scheduler
            .run(&mut executor, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(report.outcomes.len(), 3);
        assert_eq!(report.failed_stages(), 0);
        assert_eq!(report.audit.max_resident(), 1);
        assert_eq!(report.audit.resident(), 0);
        assert_eq!(provider.max_resident(), 1);
        assert_eq!(provider.resident(), 0);
        assert_eq!(
            provider.acquisitions(),
            vec!["model-a", "model-b", "model-c"]
        );
        assert_eq!(executor.calls[0], "enter:a");
        assert_eq!(executor.calls[2], "exit:a");
    }

    #[tokio::test]
    async fn load_failure_skips_stage_but_run_completes() {
        let provider = Arc::new(ScriptedProvider::new().fail_load("model-b"));
        let mut scheduler = StageScheduler::new(provider.clone(), stages(&["a", "b", "c"]));
        let mut executor = RecordingExecutor::default();

        let report = scheduler
            .run(&mut executor, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(report.outcomes[1].status, StageStatus::Failed);
        assert_eq!(report.outcomes[2].status, StageStatus::Completed);
        assert!(executor.calls.contains(&"failed:b".to_string()));
        assert!(executor.calls.iter().any(|c| c.starts_with("run:c")));
        assert_eq!(provider.resident(), 0);
        assert!(report
            .audit
            .events()
            .contains(&ResidencyEvent::AcquireFailed {
                stage: "b".into(),
                model: "model-b".into()
            }));
    }

    #[tokio::test]
    async fn work_failure_still_releases() {
        let provider = Arc::new(ScriptedProvider::new());
        let mut scheduler = StageScheduler::new(provider.clone(), stages(&["a", "b"]));
        let mut executor = RecordingExecutor {
            fail_stage: Some("a".into()),
            ..Default::default()
        };

        let report = scheduler
            .run(&mut executor, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(report.failed_stages(), 1);
        assert_eq!(provider.releases(), 2);
        assert_eq!(provider.max_resident(), 1);
    }

    #[tokio::test]
    async fn cancel_before_start_acquires_nothing() {
        let provider = Arc::new(ScriptedProvider::new());
        let mut scheduler = StageScheduler::new(provider.clone(), stages(&["a"]));
        let cancel = CancellationToken::new();
        cancel.cancel();

        let err = scheduler
            .run(&mut RecordingExecutor::default(), &cancel)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Cancelled { ref stage } if stage == "a"));
        assert!(provider.acquisitions().is_empty());
    }

    #[tokio::test]
    async fn mid_stage_cancel_releases_before_returning() {
        let provider = Arc::new(ScriptedProvider::new());
        let mut scheduler = StageScheduler::new(provider.clone(), stages(&["a", "b"]));
        let mut executor = RecordingExecutor {
            hang_stage: Some("a".into()),
            ..Default::default()
        };
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            trigger.cancel();
        });

        let err = scheduler.run(&mut executor, &cancel).await.unwrap_err();
        assert!(matches!(err, Error::Cancelled { .. }));
        assert_eq!(provider.resident(), 0);
        assert_eq!(provider.releases(), 1);
        assert_eq!(provider.acquisitions(), vec!["model-a"]);
    }

    #[tokio::test]
    async fn randomized_failure_injection_keeps_residency_bounded() {
        // Deterministic pseudo-random pattern over many schedules
        let mut seed: u64 = 0x9E37_79B9_7F4A_7C15;
        for _ in 0..40 {
            let mut provider = ScriptedProvider::new();
            let ids = ["s1", "s2", "s3", "s4", "s5"];
            let mut fail_stage = None;
            for id in ids {
                seed ^= seed << 13;
                seed ^= seed >> 7;
                seed ^= seed << 17;
                match seed % 4 {
                    0 => provider = provider.fail_load(&format!("model-{id}")),
                    1 => fail_stage = Some(id.to_string()),
                    _ => {}
                }
            }
            let provider = Arc::new(provider);
            let mut scheduler = StageScheduler::new(provider.clone(), stages(&ids));
            let mut executor = RecordingExecutor {
                fail_stage,
                ..Default::default()
            };

            let report = scheduler
                .run(&mut executor, &CancellationToken::new())
                .await
                .unwrap();

            assert_eq!(report.outcomes.len(), ids.len());
            assert!(report.audit.max_resident() <= 1);
            assert!(provider.max_resident() <= 1);
            assert_eq!(provider.resident(), 0);
        }
    }

    #[test]
    fn stage_spec_from_config() {
        let config = StageConfig {
            id: "draft".into(),
            model: "tinyllama".into(),
            intent: StageIntent::Draft,
            max_output_tokens: 512,
            temperature: 0.6,
            repetition_penalty: Some(1.15),
            timeout_secs: 0,
        };
        let spec = StageSpec::from(&config);
        assert_eq!(spec.max_output_tokens, 512);
        assert_eq!(spec.sampling.repetition_penalty, Some(1.15));
        assert!(spec.timeout.is_none());
    }
}
