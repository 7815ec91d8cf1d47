//! `docsmith scan` — Show what ingestion extracts from an archive.

use docsmith_config::AppConfig;
use docsmith_ingest::Ingestor;
use std::path::Path;

pub fn run(archive: &Path) -> Result<(), Box<dyn std::error::Error>> {
    let config = AppConfig::load()?;
    let bytes =
        std::fs::read(archive).map_err(|e| format!("Cannot read {}: {e}", archive.display()))?;
    let project = Ingestor::from_config(&config).ingest(&bytes)?;
    let ctx = &project.context;
    let analysis = &project.analysis;

    println!("🔎 {}", archive.display());
    println!("─────────────────────────────────────");
    println!("  Files accepted:   {}", analysis.total_files);
    println!("  Lines:            {}", analysis.total_lines);
    println!("  Config files:     {}", analysis.config_files);
    println!("  Doc files:        {}", analysis.documentation_files);
    println!(
        "  Priority context: {} / {} bytes",
        ctx.priority_content().len(),
        config.context.max_priority_bytes
    );
    println!(
        "  General context:  {} / {} bytes",
        ctx.general_content().len(),
        config.context.max_general_bytes
    );

    if !analysis.languages.is_empty() {
        println!("\n  Languages:");
        for (language, files) in &analysis.languages {
            println!("    {language:<14} {files}");
        }
    }

    if !ctx.modules().is_empty() {
        println!("\n  Modules: {}", ctx.modules().join(", "));
    }

    println!("\n  Structure:");
    for line in analysis.folder_structure.lines() {
        println!("    {line}");
    }

    Ok(())
}
