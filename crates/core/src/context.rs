//! Project context — the bounded view of an archive every stage reads.

use serde::{Deserialize, Serialize};

/// Which accumulator a scanned file feeds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FileClass {
    /// A recognized manifest / config / README file.
    Priority,
    /// Any other allowed source file.
    General,
}

/// One accepted archive entry, decoded as text.
///
/// Ephemeral: produced while scanning and dropped once the context is built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawFile {
    /// Archive-relative path with `/` separators
    pub path: String,
    /// Lower-cased extension including the dot (`".rs"`), empty if none
    pub extension: String,
    /// Lossily decoded content
    pub content: String,
    /// Size of the raw bytes
    pub size: usize,
    pub class: FileClass,
}

/// The final segment of a `/`-separated path.
pub fn base_name(path: &str) -> &str {
    path.rsplit('/').next().unwrap_or(path)
}

impl RawFile {
    pub fn line_count(&self) -> usize {
        self.content.lines().count()
    }
}

/// Immutable, bounded context extracted from one archive.
///
/// Built once by the context builder and then only ever borrowed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProjectContext {
    structure: Vec<String>,
    priority_content: String,
    general_content: String,
    modules: Vec<String>,
}

impl ProjectContext {
    pub fn new(
        structure: Vec<String>,
        priority_content: String,
        general_content: String,
        modules: Vec<String>,
    ) -> Self {
        Self {
            structure,
            priority_content,
            general_content,
            modules,
        }
    }

    /// File paths in archive order.
    pub fn structure(&self) -> &[String] {
        &self.structure
    }

    /// One path per line, as fed to prompts.
    pub fn structure_listing(&self) -> String {
        self.structure.join("\n")
    }

    /// Concatenated manifest / config file blocks.
    pub fn priority_content(&self) -> &str {
        &self.priority_content
    }

    /// Concatenated ordinary source file blocks.
    pub fn general_content(&self) -> &str {
        &self.general_content
    }

    /// Detected import / dependency names, sorted.
    pub fn modules(&self) -> &[String] {
        &self.modules
    }

    pub fn modules_listing(&self) -> String {
        self.modules.join(", ")
    }

    /// True if no file made it into any accumulator.
    pub fn is_empty(&self) -> bool {
        self.structure.is_empty()
            && self.priority_content.is_empty()
            && self.general_content.is_empty()
    }
}

/// Take at most `max_bytes` of `text`, backing off to a char boundary.
pub fn truncate_on_char_boundary(text: &str, max_bytes: usize) -> &str {
    if text.len() <= max_bytes {
        return text;
    }
    let mut end = max_bytes;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    &text[..end]
}
