//! Heading resolution: request lists, free-form templates and template documents.

use docsmith_config::PipelineConfig;
use docsmith_core::extract::TextExtractor;
use docsmith_core::heading::SectionHeadings;

/// Substituted when a template document yields no heading-like line.
pub const TEMPLATE_FALLBACK_HEADINGS: &[&str] = &[
    "1. Introduction",
    "2. System Architecture",
    "3. Installation",
    "4. API Usage",
    "5. Conclusion",
];

/// Lines that look like section titles: 4 to 59 characters, and numbered,
/// all upper-case, or ending in a colon.
pub fn looks_like_heading(line: &str) -> bool {
    let len = line.chars().count();
    if !(4..60).contains(&len) {
        return false;
    }
    let numbered = line.starts_with(|c: char| c.is_ascii_digit());
    let shouting = line.chars().any(char::is_alphabetic) && !line.chars().any(char::is_lowercase);
    numbered || shouting || line.ends_with(':')
}

/// Pull heading candidates out of template text, capped at `max`.
pub fn extract_template_headings(text: &str, max: usize) -> SectionHeadings {
    let candidates = text.lines().map(str::trim).filter(|line| looks_like_heading(line));
    SectionHeadings::with_fallback(candidates, TEMPLATE_FALLBACK_HEADINGS).truncated(max)
}

/// Headings for a run: an explicit list wins, then a free-form template
/// (one heading per line), then the configured defaults. Capped at
/// `max_headings`.
pub fn resolve_headings(
    explicit: &[String],
    template: Option<&str>,
    config: &PipelineConfig,
) -> SectionHeadings {
    let defaults: Vec<&str> = config.default_headings.iter().map(String::as_str).collect();
    let headings = if explicit.iter().any(|h| !h.trim().is_empty()) {
        SectionHeadings::with_fallback(explicit, &defaults)
    } else {
        SectionHeadings::with_fallback(template.unwrap_or_default().lines(), &defaults)
    };
    headings.truncated(config.max_headings)
}

/// Text extraction for plain-text template formats.
///
/// Binary formats (PDF, DOCX) need an external extractor; this one returns
/// an empty string for them.
#[derive(Debug, Clone, Copy, Default)]
pub struct PlainTextExtractor;

impl PlainTextExtractor {
    const KINDS: &'static [&'static str] = &["", "txt", "text", "md", "markdown", "rst"];

    pub fn supports(kind: &str) -> bool {
        Self::KINDS.contains(&kind.to_ascii_lowercase().as_str())
    }
}

impl TextExtractor for PlainTextExtractor {
    fn extract_text(&self, bytes: &[u8], kind: &str) -> String {
        if Self::supports(kind) {
            String::from_utf8_lossy(bytes).into_owned()
        } else {
            tracing::warn!(kind, "No text extractor for template format");
            String::new()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn heading_shapes() {
        assert!(looks_like_heading("1. Introduction"));
        assert!(looks_like_heading("ARCHITECTURE"));
        assert!(looks_like_heading("Deployment notes:"));
        assert!(!looks_like_heading("API"));
        assert!(!looks_like_heading("just a sentence in the body"));
        assert!(!looks_like_heading(&"A".repeat(60)));
    }

    #[test]
    fn extracts_and_deduplicates_in_order() {
        let text = "1. Overview\nsome body text\nINSTALLATION\n1. Overview\n  Usage:  \n";
        let headings = extract_template_headings(text, 15);
        assert_eq!(headings.as_slice(), ["1. Overview", "INSTALLATION", "Usage:"]);
    }

    #[test]
    fn empty_template_gets_fallback_list() {
        let headings = extract_template_headings("nothing here\nat all", 15);
        assert_eq!(headings.as_slice(), TEMPLATE_FALLBACK_HEADINGS);
    }

    #[test]
    fn extraction_is_capped() {
        let text: String = (1..=20).map(|i| format!("{i}. Section {i}\n")).collect();
        assert_eq!(extract_template_headings(&text, 15).len(), 15);
    }

    #[test]
    fn duplicate_request_headings_collapse() {
        let config = PipelineConfig::default();
        let headings = resolve_headings(&["Overview".into(), "Overview".into()], None, &config);
        assert_eq!(headings.as_slice(), ["Overview"]);
    }

    #[test]
    fn template_string_then_defaults() {
        let config = PipelineConfig::default();
        let from_template = resolve_headings(&[], Some("Setup\n\nAPI\n"), &config);
        assert_eq!(from_template.as_slice(), ["Setup", "API"]);

        let defaults = resolve_headings(&["  ".into()], Some("\n \n"), &config);
        assert_eq!(defaults.as_slice(), ["Overview", "Technical Implementation"]);
    }

    #[test]
    fn request_headings_are_capped() {
        let config = PipelineConfig {
            max_headings: 2,
            ..PipelineConfig::default()
        };
        let explicit: Vec<String> = ["A", "B", "C"].map(String::from).to_vec();
        assert_eq!(resolve_headings(&explicit, None, &config).as_slice(), ["A", "B"]);
    }

    #[test]
    fn plain_text_extractor() {
        let extractor = PlainTextExtractor;
        assert_eq!(extractor.extract_text(b"# Title", "md"), "# Title");
        assert_eq!(extractor.extract_text(b"%PDF-1.7", "pdf"), "");
        assert!(PlainTextExtractor::supports("TXT"));
    }
}
