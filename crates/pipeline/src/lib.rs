//! # docsmith Pipeline
//!
//! The staged documentation run. One model is resident at a time; each stage
//! walks the requested headings, chaining from the previous stage's text.
//!
//! - [`StageScheduler`] owns stage order and model residency
//! - [`SectionPipeline`] is the per-heading work run inside each stage
//! - [`ContentFilter`] strips hedging and suppresses duplicate output
//! - [`DocumentAssembler`] merges sections, diagrams and accounting
//! - [`DocumentationService`] drives a whole run from archive bytes, and
//!   answers one-off chat messages with the configured chat model

pub mod assembler;
pub mod chat;
pub mod diagrams;
pub mod filter;
pub mod headings;
pub mod prompt;
pub mod run;
pub mod scheduler;
pub mod section;

#[cfg(test)]
mod testing;

pub use assembler::{DocumentAssembler, DocumentParts, combine_sections};
pub use chat::{ChatMessage, ChatReply, ChatRole, ChatTurn, build_conversation};
pub use filter::{ContentFilter, PhraseCatalogue};
pub use headings::{PlainTextExtractor, extract_template_headings, resolve_headings};
pub use prompt::ProjectBrief;
pub use run::{DocumentationService, RunRequest};
pub use scheduler::{
    ResidencyAudit, ResidencyEvent, ResidencyGuard, ResidentModel, ScheduleReport, StageExecutor,
    StageScheduler, StageSpec,
};
pub use section::{SectionOutput, SectionPipeline, StageState};
