//! The run driver: archive bytes in, document payload out.
//!
//! Only an unusable archive or cancellation fails a run. Model load failures,
//! heading failures and timeouts all degrade the document instead.

use crate::assembler::{DocumentAssembler, DocumentParts};
use crate::chat::{self, ChatMessage, ChatReply};
use crate::diagrams;
use crate::prompt::ProjectBrief;
use crate::scheduler::StageScheduler;
use crate::section::SectionPipeline;
use chrono::Utc;
use docsmith_config::{AppConfig, PipelineConfig};
use docsmith_core::document::DocumentPayload;
use docsmith_core::error::Error;
use docsmith_core::heading::SectionHeadings;
use docsmith_core::provider::GenerationProvider;
use docsmith_ingest::Ingestor;
use docsmith_telemetry::{RunRecord, TelemetryEngine};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::info;

/// One documentation request.
#[derive(Debug, Clone)]
pub struct RunRequest {
    pub brief: ProjectBrief,
    pub headings: SectionHeadings,
}

/// Long-lived entry point shared by the gateway and the CLI.
pub struct DocumentationService {
    provider: Arc<dyn GenerationProvider>,
    ingestor: Arc<Ingestor>,
    pipeline: PipelineConfig,
    telemetry: Arc<TelemetryEngine>,
}

impl DocumentationService {
    pub fn new(
        provider: Arc<dyn GenerationProvider>,
        config: &AppConfig,
        telemetry: Arc<TelemetryEngine>,
    ) -> Self {
        Self {
            provider,
            ingestor: Arc::new(Ingestor::from_config(config)),
            pipeline: config.pipeline.clone(),
            telemetry,
        }
    }

    /// Replace the archive ingestor built from config.
    pub fn with_ingestor(mut self, ingestor: Ingestor) -> Self {
        self.ingestor = Arc::new(ingestor);
        self
    }

    pub fn provider(&self) -> &Arc<dyn GenerationProvider> {
        &self.provider
    }

    pub fn ingestor(&self) -> &Ingestor {
        &self.ingestor
    }

    pub fn pipeline_config(&self) -> &PipelineConfig {
        &self.pipeline
    }

    pub fn telemetry(&self) -> &Arc<TelemetryEngine> {
        &self.telemetry
    }

    /// Ingest `archive`, run every stage and assemble the document.
    pub async fn generate(
        &self,
        archive: Vec<u8>,
        request: RunRequest,
        cancel: &CancellationToken,
    ) -> Result<DocumentPayload, Error> {
        let started = Instant::now();
        let run_id = uuid::Uuid::new_v4().to_string();
        info!(run_id = %run_id, project = %request.brief.name, headings = request.headings.len(), "Run starting");

        let ingestor = self.ingestor.clone();
        let ingested = tokio::task::spawn_blocking(move || ingestor.ingest(&archive))
            .await
            .map_err(|e| Error::Internal(format!("ingest task failed: {e}")))??;
        let context = Arc::new(ingested.context);

        let mut scheduler = StageScheduler::from_config(self.provider.clone(), &self.pipeline.stages);
        let mut pipeline =
            SectionPipeline::new(context.clone(), request.brief.clone(), request.headings)
                .with_fallback_text(self.pipeline.fallback_text.clone())
                .with_duplicate_suppression(self.pipeline.suppress_duplicates);

        let report = scheduler.run(&mut pipeline, cancel).await?;
        let output = pipeline.finish();
        let resources = output.accountant.finish();

        let diagrams = diagrams::generate_all(
            &request.brief.name,
            &ingested.analysis,
            context.modules(),
            scheduler.stages(),
        );

        let payload = DocumentAssembler::assemble(DocumentParts {
            run_id: run_id.clone(),
            brief: request.brief,
            sections: output.sections,
            polished: output.polished,
            diagrams,
            resources,
            analysis: ingested.analysis,
            outcomes: report.outcomes.clone(),
            elapsed: started.elapsed(),
        });

        self.telemetry.record_run(RunRecord {
            run_id,
            project_name: payload.project_name.clone(),
            finished_at: Utc::now(),
            duration_ms: payload.processing_time_ms,
            failed_stages: report.failed_stages(),
            fallbacks: report.fallbacks(),
            resources: payload.resource_summary.clone(),
        });

        info!(
            run_id = %payload.run_id,
            sections = payload.sections.len(),
            failed_stages = report.failed_stages(),
            reduction = %payload.resource_summary.reduction,
            elapsed_ms = payload.processing_time_ms,
            "Run finished"
        );
        Ok(payload)
    }

    /// Answer `message` with the configured chat model.
    pub async fn chat(&self, history: &[ChatMessage], message: &str) -> Result<ChatReply, Error> {
        let timeout = (self.pipeline.chat_timeout_secs > 0)
            .then(|| Duration::from_secs(self.pipeline.chat_timeout_secs));
        chat::reply(
            self.provider.as_ref(),
            &self.pipeline.chat_model,
            history,
            message,
            timeout,
        )
        .await
    }
}
