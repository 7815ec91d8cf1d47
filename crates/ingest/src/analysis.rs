//! Content classification summary and folder tree.

use docsmith_core::context::RawFile;
use docsmith_core::document::AnalysisSummary;
use std::collections::BTreeMap;

use crate::recognizers::RecognizerTable;

const CONFIG_EXTENSIONS: &[&str] = &[".json", ".yaml", ".yml", ".toml", ".xml", ".ini"];
const DOC_EXTENSIONS: &[&str] = &[".md", ".txt", ".rst"];

/// Rendering limits for [`folder_tree`].
#[derive(Debug, Clone, Copy)]
pub struct TreeLimits {
    pub max_depth: usize,
    pub files_per_folder: usize,
    pub max_lines: usize,
}

impl Default for TreeLimits {
    fn default() -> Self {
        Self {
            max_depth: 3,
            files_per_folder: 5,
            max_lines: 50,
        }
    }
}

#[derive(Default)]
struct Folder {
    folders: BTreeMap<String, Folder>,
    files: Vec<String>,
}

impl Folder {
    fn insert(&mut self, path: &str) {
        let mut segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
        let Some(file) = segments.pop() else {
            return;
        };
        let mut node = self;
        for segment in segments {
            node = node.folders.entry(segment.to_string()).or_default();
        }
        node.files.push(file.to_string());
    }

    fn render(&self, name: &str, level: usize, limits: &TreeLimits, out: &mut Vec<String>) {
        if level >= limits.max_depth {
            return;
        }
        out.push(format!("{}{}/", "    ".repeat(level), name));
        let indent = "    ".repeat(level + 1);
        for file in self.files.iter().take(limits.files_per_folder) {
            out.push(format!("{indent}{file}"));
        }
        if self.files.len() > limits.files_per_folder {
            out.push(format!(
                "{indent}... ({} more)",
                self.files.len() - limits.files_per_folder
            ));
        }
        for (child_name, child) in &self.folders {
            child.render(child_name, level + 1, limits, out);
        }
    }
}

/// Indented tree of `paths` under a `root/` line.
pub fn folder_tree<'a>(paths: impl IntoIterator<Item = &'a str>, limits: TreeLimits) -> String {
    let mut root = Folder::default();
    for path in paths {
        root.insert(path);
    }

    let mut lines = Vec::new();
    root.render("root", 0, &limits, &mut lines);
    lines.truncate(limits.max_lines);
    lines.join("\n")
}

/// Per-language and per-category counts over the accepted files.
pub fn analyze(files: &[RawFile], recognizers: &RecognizerTable) -> AnalysisSummary {
    let mut summary = AnalysisSummary::default();

    for file in files {
        summary.total_files += 1;
        summary.total_lines += file.line_count();

        if let Some(recognizer) = recognizers.for_extension(&file.extension) {
            *summary
                .languages
                .entry(recognizer.language().to_string())
                .or_default() += 1;

            for name in recognizer.declarations(&file.content) {
                if summary.class_names.len() >= 10 {
                    break;
                }
                if !summary.class_names.contains(&name) {
                    summary.class_names.push(name);
                }
            }
        } else if CONFIG_EXTENSIONS.contains(&file.extension.as_str()) {
            summary.config_files += 1;
        } else if DOC_EXTENSIONS.contains(&file.extension.as_str()) {
            summary.documentation_files += 1;
        }
    }

    summary.folder_structure = folder_tree(
        files.iter().map(|f| f.path.as_str()),
        TreeLimits::default(),
    );
    summary
}
