//! `docsmith headings` — Extract section headings from a template document.

use docsmith_config::AppConfig;
use docsmith_core::extract::TextExtractor;
use docsmith_pipeline::{PlainTextExtractor, extract_template_headings};
use std::path::Path;

pub fn run(file: &Path) -> Result<(), Box<dyn std::error::Error>> {
    let config = AppConfig::load()?;
    let bytes = std::fs::read(file).map_err(|e| format!("Cannot read {}: {e}", file.display()))?;
    let kind = file
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or_default();

    let text = PlainTextExtractor.extract_text(&bytes, kind);
    if text.is_empty() && !PlainTextExtractor::supports(kind) {
        println!("⚠️  No text extractor for .{kind}; showing the default headings.");
    }

    let headings = extract_template_headings(&text, config.pipeline.max_headings);
    for (i, heading) in headings.iter().enumerate() {
        println!("{:>3}. {heading}", i + 1);
    }

    Ok(())
}
