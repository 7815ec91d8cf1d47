//! Document assembly: stage output, diagrams and accounting merged into the
//! response payload.

use crate::prompt::ProjectBrief;
use chrono::Utc;
use docsmith_core::document::{
    AnalysisSummary, Diagram, DocumentMetadata, DocumentPayload, ResourceSummary, Sections,
    StageOutcome,
};
use std::time::Duration;

/// `## heading` blocks joined by blank lines, in heading order.
pub fn combine_sections(sections: &Sections) -> String {
    sections
        .iter()
        .map(|(heading, text)| format!("## {heading}\n{text}"))
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// Inputs to [`DocumentAssembler::assemble`].
#[derive(Debug, Clone)]
pub struct DocumentParts {
    pub run_id: String,
    pub brief: ProjectBrief,
    pub sections: Sections,
    /// Polish stage output; `None` falls back to the concatenated sections
    pub polished: Option<String>,
    pub diagrams: Vec<Diagram>,
    pub resources: ResourceSummary,
    pub analysis: AnalysisSummary,
    pub outcomes: Vec<StageOutcome>,
    pub elapsed: Duration,
}

pub struct DocumentAssembler;

impl DocumentAssembler {
    pub fn assemble(parts: DocumentParts) -> DocumentPayload {
        let documentation = parts
            .polished
            .unwrap_or_else(|| combine_sections(&parts.sections));

        let metadata = DocumentMetadata {
            total_sections: parts.sections.len(),
            files_analyzed: parts.analysis.total_files,
            lines_analyzed: parts.analysis.total_lines,
            processing_stages: parts.outcomes.iter().map(|o| o.stage.clone()).collect(),
            stage_outcomes: parts.outcomes,
        };

        DocumentPayload {
            run_id: parts.run_id,
            project_name: parts.brief.name,
            description: parts.brief.description,
            domain: parts.brief.domain,
            generated_at: Utc::now(),
            sections: parts.sections,
            documentation,
            diagrams: parts.diagrams,
            resource_summary: parts.resources,
            analysis_summary: parts.analysis,
            metadata,
            processing_time_ms: parts.elapsed.as_millis() as u64,
        }
    }
}
