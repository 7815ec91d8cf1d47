//! Document payload types — what a finished run hands back to its caller.

use chrono::{DateTime, Utc};
use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::BTreeMap;
use std::fmt;

/// Heading → final text, kept in heading order.
///
/// Serializes as a JSON object whose keys follow insertion order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Sections(Vec<(String, String)>);

impl Sections {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace the text for `heading`, keeping its original position.
    pub fn insert(&mut self, heading: impl Into<String>, text: impl Into<String>) {
        let heading = heading.into();
        let text = text.into();
        match self.0.iter_mut().find(|(h, _)| *h == heading) {
            Some(entry) => entry.1 = text,
            None => self.0.push((heading, text)),
        }
    }

    pub fn get(&self, heading: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|(h, _)| h == heading)
            .map(|(_, t)| t.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(h, t)| (h.as_str(), t.as_str()))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl Serialize for Sections {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (heading, text) in &self.0 {
            map.serialize_entry(heading, text)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for Sections {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct SectionsVisitor;

        impl<'de> Visitor<'de> for SectionsVisitor {
            type Value = Sections;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("a map of heading to text")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<Sections, A::Error> {
                let mut sections = Sections::new();
                while let Some((heading, text)) = access.next_entry::<String, String>()? {
                    sections.insert(heading, text);
                }
                Ok(sections)
            }
        }

        deserializer.deserialize_map(SectionsVisitor)
    }
}

/// Rendering format of a diagram artifact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiagramKind {
    Mermaid,
    Text,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diagram {
    pub title: String,
    pub kind: DiagramKind,
    pub code: String,
}

/// Token and time usage of one stage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageUsage {
    pub stage: String,
    pub model: String,
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub elapsed_ms: u64,
    /// Number of generation calls recorded
    pub calls: u32,
}

/// Aggregated ledger of one run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceSummary {
    pub stages: Vec<StageUsage>,
    pub total_input_tokens: u64,
    pub total_output_tokens: u64,
    pub total_elapsed_ms: u64,
    /// `(1 - output / input) * 100`, zero when nothing was read
    pub reduction_percent: f64,
    /// Display form of `reduction_percent` (`"42.5%"`, `"0%"`)
    pub reduction: String,
}

/// Counts of scanned files per language and category.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalysisSummary {
    pub languages: BTreeMap<String, usize>,
    pub config_files: usize,
    pub documentation_files: usize,
    pub total_files: usize,
    pub total_lines: usize,
    /// Declared class / type names, first few only
    #[serde(default)]
    pub class_names: Vec<String>,
    /// Indented folder tree of the accepted files
    pub folder_structure: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageStatus {
    Completed,
    /// The stage's model could not be acquired or the stage failed outright
    Failed,
}

/// How one stage ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageOutcome {
    pub stage: String,
    pub model: String,
    pub status: StageStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    /// Headings that fell back instead of using model output
    #[serde(default)]
    pub fallbacks: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentMetadata {
    pub total_sections: usize,
    pub files_analyzed: usize,
    pub lines_analyzed: usize,
    pub processing_stages: Vec<String>,
    pub stage_outcomes: Vec<StageOutcome>,
}

/// The structured document returned for one archive.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentPayload {
    pub run_id: String,
    pub project_name: String,
    pub description: String,
    pub domain: String,
    pub generated_at: DateTime<Utc>,
    pub sections: Sections,
    /// Single reflowed document produced by the polish stage
    pub documentation: String,
    pub diagrams: Vec<Diagram>,
    pub resource_summary: ResourceSummary,
    pub analysis_summary: AnalysisSummary,
    pub metadata: DocumentMetadata,
    pub processing_time_ms: u64,
}
