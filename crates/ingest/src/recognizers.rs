//! Per-language pattern table.
//!
//! Each language family is a row: the extensions it owns, a pattern whose
//! first capture group is an imported module name, and a pattern whose first
//! capture group is a declared type name. Adding a language is adding a row.

use regex_lite::Regex;

/// One language family's recognizers.
#[derive(Debug, Clone)]
pub struct LanguageRecognizer {
    language: String,
    extensions: Vec<String>,
    imports: Option<Regex>,
    declarations: Option<Regex>,
}

/// Compile a pattern, logging and dropping it if invalid.
fn compile(pattern: &str) -> Option<Regex> {
    match Regex::new(pattern) {
        Ok(re) => Some(re),
        Err(e) => {
            tracing::warn!(pattern, error = %e, "Recognizer pattern failed to compile; skipping");
            None
        }
    }
}

fn captures(re: &Option<Regex>, content: &str) -> Vec<String> {
    match re {
        Some(re) => re
            .captures_iter(content)
            .filter_map(|c| c.get(1))
            .map(|m| m.as_str().to_string())
            .collect(),
        None => Vec::new(),
    }
}

impl LanguageRecognizer {
    pub fn new(
        language: impl Into<String>,
        extensions: &[&str],
        import_pattern: Option<&str>,
        declaration_pattern: Option<&str>,
    ) -> Self {
        Self {
            language: language.into(),
            extensions: extensions.iter().map(|e| e.to_lowercase()).collect(),
            imports: import_pattern.and_then(compile),
            declarations: declaration_pattern.and_then(compile),
        }
    }

    pub fn language(&self) -> &str {
        &self.language
    }

    pub fn handles(&self, extension: &str) -> bool {
        self.extensions.iter().any(|e| e == extension)
    }

    /// Module / dependency names imported by `content`.
    pub fn modules(&self, content: &str) -> Vec<String> {
        captures(&self.imports, content)
    }

    /// Class / struct / interface names declared in `content`.
    pub fn declarations(&self, content: &str) -> Vec<String> {
        captures(&self.declarations, content)
    }
}

/// Extension → recognizer lookup.
#[derive(Debug, Clone)]
pub struct RecognizerTable {
    recognizers: Vec<LanguageRecognizer>,
}

impl RecognizerTable {
    pub fn empty() -> Self {
        Self {
            recognizers: Vec::new(),
        }
    }

    /// The built-in language families.
    pub fn builtin() -> Self {
        Self::empty()
            .with(LanguageRecognizer::new(
                "Python",
                &[".py"],
                Some(r"(?m)^(?:from|import)\s+([a-zA-Z0-9_]+)"),
                Some(r"(?m)^\s*class\s+([A-Za-z_][A-Za-z0-9_]*)"),
            ))
            .with(LanguageRecognizer::new(
                "JavaScript",
                &[".js", ".jsx", ".mjs", ".cjs"],
                Some(r#"(?:require\(|from\s+)['"]([@a-zA-Z0-9_/-]+)['"]"#),
                Some(r"\bclass\s+([A-Za-z_$][A-Za-z0-9_$]*)"),
            ))
            .with(LanguageRecognizer::new(
                "TypeScript",
                &[".ts", ".tsx"],
                Some(r#"(?:require\(|from\s+)['"]([@a-zA-Z0-9_/-]+)['"]"#),
                Some(r"\b(?:class|interface)\s+([A-Za-z_$][A-Za-z0-9_$]*)"),
            ))
            .with(LanguageRecognizer::new(
                "Java",
                &[".java"],
                Some(r"(?m)^import\s+(?:static\s+)?([a-zA-Z0-9_.]+)"),
                Some(r"\b(?:class|interface|enum|record)\s+([A-Za-z_][A-Za-z0-9_]*)"),
            ))
            .with(LanguageRecognizer::new(
                "Rust",
                &[".rs"],
                Some(r"(?m)^\s*(?:pub\s+)?(?:use|extern\s+crate)\s+([a-zA-Z0-9_]+)"),
                Some(r"(?m)^\s*(?:pub(?:\([a-z]+\))?\s+)?(?:struct|enum|trait)\s+([A-Za-z_][A-Za-z0-9_]*)"),
            ))
            .with(LanguageRecognizer::new(
                "Go",
                &[".go"],
                Some(r#"(?m)^\s*(?:import\s+)?(?:[a-zA-Z_][a-zA-Z0-9_]*\s+)?"([a-zA-Z0-9_./-]+)"\s*$"#),
                Some(r"(?m)^type\s+([A-Za-z_][A-Za-z0-9_]*)\s+(?:struct|interface)"),
            ))
            .with(LanguageRecognizer::new(
                "C#",
                &[".cs"],
                Some(r"(?m)^using\s+([A-Za-z0-9_.]+)\s*;"),
                Some(r"\b(?:class|interface|struct|record)\s+([A-Za-z_][A-Za-z0-9_]*)"),
            ))
            .with(LanguageRecognizer::new("C++", &[".cpp", ".cc", ".hpp", ".h"], None, None))
    }

    pub fn with(mut self, recognizer: LanguageRecognizer) -> Self {
        self.recognizers.push(recognizer);
        self
    }

    /// First recognizer owning `extension` (lower-cased, with the dot).
    pub fn for_extension(&self, extension: &str) -> Option<&LanguageRecognizer> {
        self.recognizers.iter().find(|r| r.handles(extension))
    }

    pub fn len(&self) -> usize {
        self.recognizers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.recognizers.is_empty()
    }
}

impl Default for RecognizerTable {
    fn default() -> Self {
        Self::builtin()
    }
}
