//! `docsmith generate` — Document a source archive from the command line.

use docsmith_config::AppConfig;
use docsmith_core::document::{DiagramKind, DocumentPayload, StageStatus};
use docsmith_pipeline::{DocumentationService, ProjectBrief, RunRequest, resolve_headings};
use docsmith_telemetry::TelemetryEngine;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

pub struct GenerateArgs {
    pub archive: PathBuf,
    pub name: Option<String>,
    pub description: String,
    pub domain: String,
    pub headings: Vec<String>,
    pub headings_file: Option<PathBuf>,
    pub out: Option<PathBuf>,
}

pub async fn run(args: GenerateArgs) -> Result<(), Box<dyn std::error::Error>> {
    let config = AppConfig::load().map_err(|e| format!("Failed to load config: {e}"))?;
    let bytes = std::fs::read(&args.archive)
        .map_err(|e| format!("Cannot read {}: {e}", args.archive.display()))?;
    tracing::debug!(archive = %args.archive.display(), bytes = bytes.len(), "Archive loaded");

    let template = match &args.headings_file {
        Some(path) => Some(
            std::fs::read_to_string(path)
                .map_err(|e| format!("Cannot read {}: {e}", path.display()))?,
        ),
        None => None,
    };
    let headings = resolve_headings(&args.headings, template.as_deref(), &config.pipeline);

    let name = args
        .name
        .clone()
        .unwrap_or_else(|| project_name_from(&args.archive));
    let request = RunRequest {
        brief: ProjectBrief::new(name)
            .with_description(args.description)
            .with_domain(args.domain),
        headings,
    };

    let provider = docsmith_providers::build_from_config(&config)?;
    let telemetry = Arc::new(TelemetryEngine::from_config(&config.telemetry));
    let service = DocumentationService::new(provider, &config, telemetry);

    // Ctrl-C stops the run at the next stage boundary; the resident model is
    // still released first.
    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("⏹  Interrupted, finishing the current step...");
            on_interrupt.cancel();
        }
    });

    let payload = service.generate(bytes, request, &cancel).await?;

    if let Some(out) = &args.out {
        std::fs::write(out, serde_json::to_string_pretty(&payload)?)?;
        eprintln!("✅ Wrote {}", out.display());
    }

    println!("{}", render_markdown(&payload));
    print_summary(&payload);

    Ok(())
}

/// `shop-1.2.zip` → `shop-1.2`.
fn project_name_from(archive: &Path) -> String {
    archive
        .file_stem()
        .and_then(|s| s.to_str())
        .filter(|s| !s.is_empty())
        .unwrap_or("project")
        .to_string()
}

/// The document as markdown, diagrams appended as fenced blocks.
pub fn render_markdown(payload: &DocumentPayload) -> String {
    let mut out = format!("# {}\n\n", payload.project_name);
    if !payload.description.is_empty() {
        out.push_str(&format!("> {}\n\n", payload.description));
    }
    out.push_str(payload.documentation.trim());
    out.push('\n');

    if !payload.diagrams.is_empty() {
        out.push_str("\n## Diagrams\n");
        for diagram in &payload.diagrams {
            let fence = match diagram.kind {
                DiagramKind::Mermaid => "mermaid",
                DiagramKind::Text => "text",
            };
            out.push_str(&format!(
                "\n### {}\n\n```{fence}\n{}\n```\n",
                diagram.title, diagram.code
            ));
        }
    }
    out
}

fn print_summary(payload: &DocumentPayload) {
    let resources = &payload.resource_summary;
    eprintln!("\n📊 Run {}", payload.run_id);
    eprintln!("─────────────────────────────────────");
    for outcome in &payload.metadata.stage_outcomes {
        let mark = match outcome.status {
            StageStatus::Completed => "✅",
            StageStatus::Failed => "⚠️ ",
        };
        eprintln!(
            "  {mark} {:<10} {:<16} fallbacks: {}",
            outcome.stage, outcome.model, outcome.fallbacks
        );
    }
    eprintln!(
        "  Tokens: {} in / {} out ({} reduction)",
        resources.total_input_tokens, resources.total_output_tokens, resources.reduction
    );
    eprintln!("  Time:   {} ms", payload.processing_time_ms);
}

#[cfg(test)]
mod tests {
    use super::*;
    use docsmith_core::document::{
        AnalysisSummary, Diagram, DocumentMetadata, ResourceSummary, Sections,
    };

    fn payload() -> DocumentPayload {
        DocumentPayload {
            run_id: "run-1".into(),
            project_name: "shop".into(),
            description: "A web shop".into(),
            domain: String::new(),
            generated_at: serde_json::from_str("\"2026-01-01T00:00:00Z\"").unwrap(),
            sections: Sections::new(),
            documentation: "## Overview\nSells things.\n".into(),
            diagrams: vec![Diagram {
                title: "Processing Flow".into(),
                kind: DiagramKind::Mermaid,
                code: "graph LR".into(),
            }],
            resource_summary: ResourceSummary {
                stages: Vec::new(),
                total_input_tokens: 0,
                total_output_tokens: 0,
                total_elapsed_ms: 0,
                reduction_percent: 0.0,
                reduction: "0%".into(),
            },
            analysis_summary: AnalysisSummary::default(),
            metadata: DocumentMetadata {
                total_sections: 0,
                files_analyzed: 0,
                lines_analyzed: 0,
                processing_stages: Vec::new(),
                stage_outcomes: Vec::new(),
            },
            processing_time_ms: 0,
        }
    }

    #[test]
    fn markdown_has_title_body_and_diagrams() {
        let md = render_markdown(&payload());
        assert!(md.starts_with("# shop\n\n> A web shop\n\n## Overview\nSells things.\n"));
        assert!(md.contains("### Processing Flow\n\n```mermaid\ngraph LR\n```"));
    }

    #[test]
    fn project_name_defaults_to_file_stem() {
        assert_eq!(project_name_from(Path::new("/tmp/shop-1.2.zip")), "shop-1.2");
        assert_eq!(project_name_from(Path::new("")), "project");
    }
}
