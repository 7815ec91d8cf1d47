//! Context builder — folds scanned files into one bounded [`ProjectContext`].

use docsmith_config::ContextConfig;
use docsmith_core::context::{FileClass, ProjectContext, RawFile};
use std::collections::BTreeSet;
use std::sync::Arc;

use crate::recognizers::RecognizerTable;

/// Size and count ceilings for a built context.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContextLimits {
    pub max_priority_bytes: usize,
    pub max_general_bytes: usize,
    pub max_structure_entries: usize,
    pub max_modules: usize,
}

impl From<&ContextConfig> for ContextLimits {
    fn from(config: &ContextConfig) -> Self {
        Self {
            max_priority_bytes: config.max_priority_bytes,
            max_general_bytes: config.max_general_bytes,
            max_structure_entries: config.max_structure_entries,
            max_modules: config.max_modules,
        }
    }
}

impl Default for ContextLimits {
    fn default() -> Self {
        Self::from(&ContextConfig::default())
    }
}

/// The block a file contributes to an accumulator.
pub fn file_block(file: &RawFile) -> String {
    format!("\n\n--- FILE: {} ---\n{}\n", file.path, file.content)
}

/// A text accumulator that only ever holds whole file blocks.
struct BoundedText {
    text: String,
    limit: usize,
    dropped: usize,
}

impl BoundedText {
    fn new(limit: usize) -> Self {
        Self {
            text: String::new(),
            limit,
            dropped: 0,
        }
    }

    /// Append `block` if it fits; blocks that don't are skipped whole.
    fn push(&mut self, block: &str) {
        if self.text.len() + block.len() <= self.limit {
            self.text.push_str(block);
        } else {
            self.dropped += 1;
        }
    }
}

pub struct ContextBuilder {
    limits: ContextLimits,
    recognizers: Arc<RecognizerTable>,
}

impl ContextBuilder {
    pub fn new(limits: ContextLimits) -> Self {
        Self {
            limits,
            recognizers: Arc::new(RecognizerTable::builtin()),
        }
    }

    pub fn with_recognizers(mut self, recognizers: Arc<RecognizerTable>) -> Self {
        self.recognizers = recognizers;
        self
    }

    pub fn limits(&self) -> ContextLimits {
        self.limits
    }

    /// Build the context. Same files in, byte-identical context out.
    pub fn build(&self, files: &[RawFile]) -> ProjectContext {
        let mut priority = BoundedText::new(self.limits.max_priority_bytes);
        let mut general = BoundedText::new(self.limits.max_general_bytes);
        let mut modules = BTreeSet::new();

        let structure: Vec<String> = files
            .iter()
            .take(self.limits.max_structure_entries)
            .map(|f| f.path.clone())
            .collect();

        for file in files {
            if let Some(recognizer) = self.recognizers.for_extension(&file.extension) {
                modules.extend(recognizer.modules(&file.content));
            }

            let block = file_block(file);
            match file.class {
                FileClass::Priority => priority.push(&block),
                FileClass::General => general.push(&block),
            }
        }

        if priority.dropped + general.dropped > 0 {
            tracing::debug!(
                priority_dropped = priority.dropped,
                general_dropped = general.dropped,
                "Context ceilings reached"
            );
        }

        let modules: Vec<String> = modules.into_iter().take(self.limits.max_modules).collect();

        tracing::info!(
            files = files.len(),
            priority_bytes = priority.text.len(),
            general_bytes = general.text.len(),
            modules = modules.len(),
            "Project context built"
        );

        ProjectContext::new(structure, priority.text, general.text, modules)
    }
}

impl Default for ContextBuilder {
    fn default() -> Self {
        Self::new(ContextLimits::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn file(path: &str, content: &str, class: FileClass) -> RawFile {
        RawFile {
            path: path.into(),
            extension: crate::scanner::extension_of(path),
            content: content.into(),
            size: content.len(),
            class,
        }
    }

    #[test]
    fn files_land_in_their_accumulator() {
        let files = vec![
            file("package.json", "{\"name\": \"demo\"}", FileClass::Priority),
            file("src/app.js", "const x = require('express');", FileClass::General),
        ];
        let ctx = ContextBuilder::default().build(&files);

        assert_eq!(ctx.structure(), ["package.json", "src/app.js"]);
        assert!(ctx.priority_content().contains("--- FILE: package.json ---"));
        assert!(ctx.priority_content().contains("\"demo\""));
        assert!(!ctx.priority_content().contains("app.js"));
        assert!(ctx.general_content().contains("require('express')"));
        assert_eq!(ctx.modules(), ["express"]);
    }

    #[test]
    fn ceilings_hold_and_never_split_a_file() {
        let body = "line\n".repeat(100); // 500 bytes
        let files: Vec<RawFile> = (0..50)
            .map(|i| file(&format!("src/m{i:02}.py"), &body, FileClass::General))
            .collect();
        let limits = ContextLimits {
            max_general_bytes: 2_000,
            max_structure_entries: 10,
            ..ContextLimits::default()
        };
        let ctx = ContextBuilder::new(limits).build(&files);

        assert!(ctx.general_content().len() <= 2_000);
        assert_eq!(ctx.structure().len(), 10);

        // Every block that made it in is complete
        let block = file_block(&files[0]);
        assert!(ctx.general_content().starts_with(&block));
        let blocks = ctx.general_content().matches("--- FILE: ").count();
        assert_eq!(ctx.general_content().len(), blocks * block.len());
    }

    #[test]
    fn oversized_block_is_skipped_whole() {
        let files = vec![
            file("README.md", &"r".repeat(200), FileClass::Priority),
            file("setup.py", "x = 1", FileClass::Priority),
        ];
        let limits = ContextLimits {
            max_priority_bytes: 100,
            ..ContextLimits::default()
        };
        let ctx = ContextBuilder::new(limits).build(&files);
        assert!(!ctx.priority_content().contains("README.md"));
        assert!(ctx.priority_content().contains("setup.py"));
    }

    #[test]
    fn modules_are_sorted_and_capped() {
        let src = "import zlib\nimport abc\nimport os\nimport abc\n";
        let files = vec![file("a.py", src, FileClass::General)];
        let limits = ContextLimits {
            max_modules: 2,
            ..ContextLimits::default()
        };
        let ctx = ContextBuilder::new(limits).build(&files);
        assert_eq!(ctx.modules(), ["abc", "os"]);
    }

    #[test]
    fn build_is_deterministic() {
        let files = vec![
            file("b.js", "import a from 'alpha';", FileClass::General),
            file("a.py", "import beta\n", FileClass::General),
            file("requirements.txt", "flask\n", FileClass::Priority),
        ];
        let builder = ContextBuilder::default();
        assert_eq!(builder.build(&files), builder.build(&files));
    }
}
