//! Section pipeline: the per-heading work every stage repeats.
//!
//! For each heading, in order, a stage builds a prompt from the project
//! context and the previous stage's text for that heading, generates, filters
//! the result and records it. A heading whose call fails, times out, comes
//! back empty or duplicates earlier output gets placeholder text instead, so
//! the next stage always has something to chain from.
//!
//! A `polish` stage is different: it makes one call over the concatenation of
//! all sections (see [`crate::assembler`]).

use crate::assembler::combine_sections;
use crate::filter::ContentFilter;
use crate::prompt::{ProjectBrief, polish_prompt, section_prompt};
use crate::scheduler::{ResidentModel, StageExecutor, StageSpec};
use async_trait::async_trait;
use docsmith_config::StageIntent;
use docsmith_core::context::ProjectContext;
use docsmith_core::document::Sections;
use docsmith_core::error::{GenerationError, StageError};
use docsmith_core::heading::SectionHeadings;
use docsmith_core::provider::Generation;
use docsmith_telemetry::ResourceAccountant;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Heading → text produced by one stage. Frozen once the stage ends.
#[derive(Debug, Clone)]
pub struct StageState {
    stage: String,
    sections: Sections,
}

impl StageState {
    pub fn stage(&self) -> &str {
        &self.stage
    }

    pub fn sections(&self) -> &Sections {
        &self.sections
    }

    pub fn get(&self, heading: &str) -> Option<&str> {
        self.sections.get(heading)
    }
}

/// Everything a run's stages produced.
#[derive(Debug)]
pub struct SectionOutput {
    pub states: Vec<StageState>,
    /// Final per-heading text
    pub sections: Sections,
    /// Output of the polish stage, if it ran and produced something usable
    pub polished: Option<String>,
    pub accountant: ResourceAccountant,
}

/// [`StageExecutor`] that turns headings into sections.
pub struct SectionPipeline {
    context: Arc<ProjectContext>,
    brief: ProjectBrief,
    headings: SectionHeadings,
    fallback_text: String,
    suppress_duplicates: bool,
    filter: ContentFilter,
    accountant: ResourceAccountant,
    states: Vec<StageState>,
    polished: Option<String>,
}

impl SectionPipeline {
    pub fn new(context: Arc<ProjectContext>, brief: ProjectBrief, headings: SectionHeadings) -> Self {
        Self {
            context,
            brief,
            headings,
            fallback_text: "Overview of this module.".into(),
            suppress_duplicates: true,
            filter: ContentFilter::new(),
            accountant: ResourceAccountant::new(),
            states: Vec::new(),
            polished: None,
        }
    }

    pub fn with_fallback_text(mut self, text: impl Into<String>) -> Self {
        self.fallback_text = text.into();
        self
    }

    pub fn with_duplicate_suppression(mut self, enabled: bool) -> Self {
        self.suppress_duplicates = enabled;
        self
    }

    pub fn with_filter(mut self, filter: ContentFilter) -> Self {
        self.filter = filter;
        self
    }

    pub fn headings(&self) -> &SectionHeadings {
        &self.headings
    }

    pub fn states(&self) -> &[StageState] {
        &self.states
    }

    /// Latest text for `heading` from any completed per-heading stage.
    fn latest(&self, heading: &str) -> Option<&str> {
        self.states.last().and_then(|state| state.get(heading))
    }

    /// Final per-heading text: the last stage's state, or placeholders.
    pub fn final_sections(&self) -> Sections {
        let mut sections = Sections::new();
        for heading in &self.headings {
            let text = self.latest(heading).unwrap_or(self.fallback_text.as_str());
            sections.insert(heading.as_str(), text);
        }
        sections
    }

    pub fn finish(self) -> SectionOutput {
        let sections = self.final_sections();
        SectionOutput {
            states: self.states,
            sections,
            polished: self.polished,
            accountant: self.accountant,
        }
    }

    /// One generation call with the stage's timeout, tokens recorded.
    async fn call(
        &mut self,
        stage: &StageSpec,
        model: ResidentModel<'_>,
        heading: &str,
        prompt: String,
    ) -> Result<Generation, GenerationError> {
        let prompt_tokens = model.count_tokens(&prompt) as u64;
        let request = stage.request(prompt);

        let result = match stage.timeout {
            Some(limit) => match tokio::time::timeout(limit, model.generate(request)).await {
                Ok(result) => result,
                Err(_) => {
                    self.accountant.record(&stage.id, &stage.model, prompt_tokens, 0);
                    return Err(GenerationError::Timeout {
                        heading: heading.to_string(),
                        timeout_secs: limit.as_secs(),
                    });
                }
            },
            None => model.generate(request).await,
        };

        match result {
            Ok(generation) => {
                let (input, output) = match generation.usage {
                    Some(usage) => (usage.input_tokens as u64, usage.output_tokens as u64),
                    None => (prompt_tokens, model.count_tokens(&generation.text) as u64),
                };
                self.accountant.record(&stage.id, &stage.model, input, output);
                Ok(generation)
            }
            Err(source) => {
                self.accountant.record(&stage.id, &stage.model, prompt_tokens, 0);
                Err(GenerationError::Provider {
                    heading: heading.to_string(),
                    source,
                })
            }
        }
    }

    /// Filtered text, or `None` if nothing usable is left.
    fn accept(&mut self, raw: &str) -> Option<String> {
        let text = self.filter.clean(raw);
        if text.is_empty() {
            return None;
        }
        if self.suppress_duplicates && self.filter.is_duplicate(&text) {
            return None;
        }
        Some(text)
    }

    async fn run_headings(
        &mut self,
        stage: &StageSpec,
        model: ResidentModel<'_>,
    ) -> Result<usize, StageError> {
        let mut sections = Sections::new();
        let mut fallbacks = 0;
        let headings = self.headings.clone();

        for heading in &headings {
            let prior = self.latest(heading).map(str::to_string);
            let prompt = section_prompt(
                stage.intent,
                &self.context,
                &self.brief,
                heading,
                prior.as_deref(),
            );

            let text = match self.call(stage, model, heading, prompt).await {
                Ok(generation) => match self.accept(&generation.text) {
                    Some(text) => Some(text),
                    None => {
                        debug!(stage = %stage.id, heading = %heading, "Output empty or duplicate");
                        None
                    }
                },
                Err(e) => {
                    warn!(stage = %stage.id, heading = %heading, error = %e, "Heading generation failed");
                    None
                }
            };

            let text = text.unwrap_or_else(|| {
                fallbacks += 1;
                self.fallback_text.clone()
            });
            sections.insert(heading.as_str(), text);
        }

        self.states.push(StageState {
            stage: stage.id.clone(),
            sections,
        });
        Ok(fallbacks)
    }

    async fn run_polish(
        &mut self,
        stage: &StageSpec,
        model: ResidentModel<'_>,
    ) -> Result<usize, StageError> {
        let combined = combine_sections(&self.final_sections());
        let prompt = polish_prompt(&self.brief, &combined);

        match self.call(stage, model, "document", prompt).await {
            Ok(generation) => match self.accept(&generation.text) {
                Some(text) => {
                    self.polished = Some(text);
                    Ok(0)
                }
                None => {
                    info!(stage = %stage.id, "Polished output unusable, keeping concatenation");
                    Ok(1)
                }
            },
            Err(e) => {
                warn!(stage = %stage.id, error = %e, "Polish generation failed");
                Ok(1)
            }
        }
    }
}

#[async_trait]
impl StageExecutor for SectionPipeline {
    fn enter_stage(&mut self, stage: &StageSpec) {
        self.accountant.begin_stage(&stage.id, &stage.model);
    }

    async fn run_stage(
        &mut self,
        stage: &StageSpec,
        model: ResidentModel<'_>,
    ) -> Result<usize, StageError> {
        match stage.intent {
            StageIntent::Polish => self.run_polish(stage, model).await,
            _ => self.run_headings(stage, model).await,
        }
    }

    fn stage_failed(&mut self, stage: &StageSpec, error: &StageError) {
        if stage.intent == StageIntent::Polish {
            return;
        }
        warn!(stage = %stage.id, error = %error, "Carrying previous output through failed stage");
        let sections = self.final_sections();
        self.states.push(StageState {
            stage: stage.id.clone(),
            sections,
        });
    }

    fn exit_stage(&mut self, _stage: &StageSpec) {
        self.accountant.end_stage();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scheduler::StageScheduler;
    use crate::testing::{Reply, ScriptedProvider};
    use docsmith_core::document::StageStatus;
    use std::time::Duration;
    use tokio_util::sync::CancellationToken;

    fn context() -> Arc<ProjectContext> {
        Arc::new(ProjectContext::new(
            vec!["package.json".into(), "src/app.js".into()],
            "--- FILE: package.json ---\n{}".into(),
            "--- FILE: src/app.js ---\nconsole.log(1)".into(),
            vec!["express".into()],
        ))
    }

    fn three_stages() -> Vec<StageSpec> {
        vec![
            StageSpec::new("summarize", "small", StageIntent::Summarize),
            StageSpec::new("draft", "medium", StageIntent::Draft)
                .with_timeout(Duration::from_secs(5)),
            StageSpec::new("refine", "large", StageIntent::Refine),
        ]
    }

    fn pipeline(headings: &[&str]) -> SectionPipeline {
        SectionPipeline::new(
            context(),
            ProjectBrief::new("demo"),
            SectionHeadings::new(headings.iter().copied()),
        )
    }

    #[tokio::test(start_paused = true)]
    async fn timed_out_heading_gets_fallback_and_chains() {
        let provider = Arc::new(
            ScriptedProvider::new()
                .reply("small", "'API'", Reply::Text("API objective.".into()))
                .reply("medium", "**Section Title:** API", Reply::Hang),
        );
        let mut scheduler = StageScheduler::new(provider.clone(), three_stages());
        let mut pipeline = pipeline(&["Overview", "API"]);

        let report = scheduler
            .run(&mut pipeline, &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(report.failed_stages(), 0);
        assert_eq!(report.outcomes[1].fallbacks, 1);

        let output = pipeline.finish();
        assert_eq!(output.states[1].get("API"), Some("Overview of this module."));

        // Stage 3 ran and was fed the fallback for "API"
        let refine_api = provider
            .prompts()
            .into_iter()
            .find(|(model, prompt)| model == "large" && prompt.contains("SECTION: API"))
            .unwrap();
        assert!(refine_api.1.contains("RAW DRAFT:\nOverview of this module."));
        assert!(output.sections.get("API").is_some());
        assert_ne!(output.sections.get("API"), Some("Overview of this module."));
    }

    #[tokio::test]
    async fn failing_heading_does_not_abort_stage() {
        let provider = Arc::new(
            ScriptedProvider::new().reply("small", "'Overview'", Reply::Fail),
        );
        let mut scheduler = StageScheduler::new(
            provider.clone(),
            vec![StageSpec::new("summarize", "small", StageIntent::Summarize)],
        );
        let mut pipeline = pipeline(&["Overview", "Usage"]);

        let report = scheduler
            .run(&mut pipeline, &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(report.outcomes[0].status, StageStatus::Completed);
        assert_eq!(report.outcomes[0].fallbacks, 1);

        let output = pipeline.finish();
        assert_eq!(output.sections.get("Overview"), Some("Overview of this module."));
        assert!(output.sections.get("Usage").unwrap().starts_with("Generated by small"));
    }

    #[tokio::test]
    async fn duplicate_output_across_headings_is_suppressed() {
        let provider = Arc::new(
            ScriptedProvider::new()
                .reply("small", "'A'", Reply::Text("Same text.".into()))
                .reply("small", "'B'", Reply::Text("Same text.".into())),
        );
        let mut scheduler = StageScheduler::new(
            provider,
            vec![StageSpec::new("summarize", "small", StageIntent::Summarize)],
        );
        let mut pipeline = pipeline(&["A", "B"]);
        scheduler
            .run(&mut pipeline, &CancellationToken::new())
            .await
            .unwrap();

        let output = pipeline.finish();
        assert_eq!(output.sections.get("A"), Some("Same text."));
        assert_eq!(output.sections.get("B"), Some("Overview of this module."));
    }

    #[tokio::test]
    async fn duplicates_kept_when_suppression_disabled() {
        let provider = Arc::new(
            ScriptedProvider::new()
                .reply("small", "'A'", Reply::Text("Same text.".into()))
                .reply("small", "'B'", Reply::Text("Same text.".into())),
        );
        let mut scheduler = StageScheduler::new(
            provider,
            vec![StageSpec::new("summarize", "small", StageIntent::Summarize)],
        );
        let mut pipeline = pipeline(&["A", "B"]).with_duplicate_suppression(false);
        scheduler
            .run(&mut pipeline, &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(pipeline.finish().sections.get("B"), Some("Same text."));
    }

    #[tokio::test]
    async fn failed_stage_carries_previous_text() {
        let provider = Arc::new(ScriptedProvider::new().fail_load("medium"));
        let mut scheduler = StageScheduler::new(provider.clone(), three_stages());
        let mut pipeline = pipeline(&["Overview"]);

        let report = scheduler
            .run(&mut pipeline, &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(report.outcomes[1].status, StageStatus::Failed);
        assert_eq!(report.outcomes[2].status, StageStatus::Completed);

        let output = pipeline.finish();
        let summary = output.states[0].get("Overview").unwrap().to_string();
        assert_eq!(output.states[1].get("Overview"), Some(summary.as_str()));

        let refine_prompt = provider
            .prompts()
            .into_iter()
            .find(|(model, _)| model == "large")
            .unwrap();
        assert!(refine_prompt.1.contains(&summary));
    }

    #[tokio::test]
    async fn hedging_is_stripped_from_sections() {
        let provider = Arc::new(ScriptedProvider::new().reply(
            "small",
            "'Overview'",
            Reply::Text("<|assistant|>I think it probably serves HTTP.".into()),
        ));
        let mut scheduler = StageScheduler::new(
            provider,
            vec![StageSpec::new("summarize", "small", StageIntent::Summarize)],
        );
        let mut pipeline = pipeline(&["Overview"]);
        scheduler
            .run(&mut pipeline, &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(
            pipeline.finish().sections.get("Overview"),
            Some("it  serves HTTP.")
        );
    }

    #[tokio::test]
    async fn polish_stage_makes_one_call_over_all_sections() {
        let provider = Arc::new(ScriptedProvider::new().reply(
            "big",
            "Polish and combine",
            Reply::Text("# Final document".into()),
        ));
        let mut stages = three_stages();
        stages.push(StageSpec::new("polish", "big", StageIntent::Polish));
        let mut scheduler = StageScheduler::new(provider.clone(), stages);
        let mut pipeline = pipeline(&["Overview", "API"]);

        scheduler
            .run(&mut pipeline, &CancellationToken::new())
            .await
            .unwrap();

        let polish_calls: Vec<_> = provider
            .prompts()
            .into_iter()
            .filter(|(model, _)| model == "big")
            .collect();
        assert_eq!(polish_calls.len(), 1);
        assert!(polish_calls[0].1.contains("## Overview"));
        assert!(polish_calls[0].1.contains("## API"));

        let output = pipeline.finish();
        assert_eq!(output.polished.as_deref(), Some("# Final document"));
        assert_eq!(output.states.len(), 3);
    }

    #[tokio::test]
    async fn ledger_records_every_stage() {
        let provider = Arc::new(ScriptedProvider::new().fail_load("large"));
        let mut scheduler = StageScheduler::new(provider, three_stages());
        let mut pipeline = pipeline(&["Overview", "API"]);
        scheduler
            .run(&mut pipeline, &CancellationToken::new())
            .await
            .unwrap();

        let summary = pipeline.finish().accountant.finish();
        assert_eq!(summary.stages.len(), 3);
        assert_eq!(summary.stages[0].calls, 2);
        assert_eq!(summary.stages[2].calls, 0);
        assert_eq!(summary.total_input_tokens, 400);
        assert_eq!(summary.total_output_tokens, 80);
    }
}
