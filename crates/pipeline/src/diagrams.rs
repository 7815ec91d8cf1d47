//! Deterministic diagrams built from the analysis and the stage list.

use crate::scheduler::StageSpec;
use docsmith_core::document::{AnalysisSummary, Diagram, DiagramKind};

const MAX_UML_CLASSES: usize = 10;

/// Mermaid-safe label text.
fn label(text: &str) -> String {
    text.replace('"', "'")
}

/// Mermaid-safe identifier.
fn ident(text: &str) -> String {
    let id: String = text
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect();
    if id.starts_with(|c: char| c.is_ascii_digit()) || id.is_empty() {
        format!("C_{id}")
    } else {
        id
    }
}

/// Input → per-language analyzers → extraction → generation → final document.
pub fn architecture(analysis: &AnalysisSummary) -> Diagram {
    let mut lines = vec![
        "graph TD".to_string(),
        "    IN[Project Input] --> FA[File Analysis Layer]".to_string(),
    ];
    for (i, language) in analysis.languages.keys().enumerate() {
        lines.push(format!("    FA --> L{i}[\"{} Analyzer\"]", label(language)));
        lines.push(format!("    L{i} --> EX[Code Structure Extraction]"));
    }
    if analysis.config_files > 0 {
        lines.push("    FA --> CP[Config Parser]".into());
        lines.push("    CP --> EX[Code Structure Extraction]".into());
    }
    if analysis.languages.is_empty() && analysis.config_files == 0 {
        lines.push("    FA --> EX[Code Structure Extraction]".into());
    }
    lines.push("    EX --> DG[Documentation Generation]".into());
    lines.push("    DG --> DD[Deduplication Engine]".into());
    lines.push("    DD --> FD[Final Document]".into());

    Diagram {
        title: "System Architecture".into(),
        kind: DiagramKind::Mermaid,
        code: lines.join("\n"),
    }
}

/// The stage sequence, each stage freeing the device before the next.
pub fn processing_flow(stages: &[StageSpec]) -> Diagram {
    let mut lines = vec!["graph LR".to_string()];
    for (i, stage) in stages.iter().enumerate() {
        let node = format!(
            "S{i}[\"{}. {}<br/>{}\"]",
            i + 1,
            label(&stage.id),
            label(&stage.model)
        );
        let next = if i + 1 < stages.len() {
            format!("S{}", i + 1)
        } else {
            "FD[Final Doc]".to_string()
        };
        lines.push(format!("    {node} --> {next}"));
        lines.push(format!("    S{i} -.->|Free device| MEM[Memory]"));
    }
    if stages.is_empty() {
        lines.push("    IN[Input] --> FD[Final Doc]".into());
    }

    Diagram {
        title: "Processing Flow".into(),
        kind: DiagramKind::Mermaid,
        code: lines.join("\n"),
    }
}

pub fn folder_structure(analysis: &AnalysisSummary) -> Diagram {
    Diagram {
        title: "Folder Structure".into(),
        kind: DiagramKind::Text,
        code: analysis.folder_structure.clone(),
    }
}

/// The project and its detected classes, or its modules when no class was found.
pub fn component_uml(project: &str, analysis: &AnalysisSummary, modules: &[String]) -> Diagram {
    let root = ident(if project.is_empty() { "Project" } else { project });
    let members: Vec<&String> = if analysis.class_names.is_empty() {
        modules.iter().take(MAX_UML_CLASSES).collect()
    } else {
        analysis.class_names.iter().take(MAX_UML_CLASSES).collect()
    };

    let mut lines = vec!["classDiagram".to_string(), format!("    class {root}")];
    for member in &members {
        let id = ident(member);
        if id != root {
            lines.push(format!("    class {id}"));
            lines.push(format!("    {root} --> {id}"));
        }
    }

    Diagram {
        title: "Component UML".into(),
        kind: DiagramKind::Mermaid,
        code: lines.join("\n"),
    }
}

/// All four diagrams in display order.
pub fn generate_all(
    project: &str,
    analysis: &AnalysisSummary,
    modules: &[String],
    stages: &[StageSpec],
) -> Vec<Diagram> {
    vec![
        architecture(analysis),
        processing_flow(stages),
        folder_structure(analysis),
        component_uml(project, analysis, modules),
    ]
}
