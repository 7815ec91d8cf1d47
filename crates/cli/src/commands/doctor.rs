//! `docsmith doctor` — Diagnose configuration and provider health.

use docsmith_config::AppConfig;
use docsmith_providers::router::{KNOWN_KINDS, build_from_config};

/// Hosted providers that refuse anonymous requests.
const KEYED_KINDS: &[&str] = &["openai", "openrouter", "groq", "together"];

pub async fn run() -> Result<(), Box<dyn std::error::Error>> {
    println!("🩺 docsmith doctor — System Diagnostics");
    println!("========================================\n");

    let mut issues = 0;

    let config_path = AppConfig::config_dir().join("config.toml");
    if !config_path.exists() {
        println!("  ⚠️  No config file, using defaults — run `docsmith init`");
        issues += 1;
    }

    let config = match AppConfig::load() {
        Ok(config) => {
            println!("  ✅ Configuration valid");
            config
        }
        Err(e) => {
            println!("  ❌ Configuration invalid: {e}");
            println!("\n  ⚠️  1 blocking issue found.");
            return Ok(());
        }
    };

    let kind = config.provider.kind.as_str();
    if KNOWN_KINDS.contains(&kind) || config.provider.api_url.is_some() {
        println!("  ✅ Provider kind: {kind}");
    } else {
        println!("  ❌ Unknown provider kind '{kind}' and no api_url set");
        issues += 1;
    }

    if KEYED_KINDS.contains(&kind) && !config.has_api_key() {
        println!("  ⚠️  No API key — set DOCSMITH_API_KEY or provider.api_key");
        issues += 1;
    }

    match build_from_config(&config) {
        Ok(provider) => match provider.health_check().await {
            Ok(true) => println!("  ✅ Provider '{}' reachable", provider.name()),
            Ok(false) => {
                println!("  ⚠️  Provider '{}' did not answer", provider.name());
                issues += 1;
            }
            Err(e) => {
                println!("  ❌ Provider '{}' health check failed: {e}", provider.name());
                issues += 1;
            }
        },
        Err(e) => {
            println!("  ❌ Provider unavailable: {e}");
            if kind == "local" {
                println!("     Rebuild with `--features local` for on-device inference.");
            }
            issues += 1;
        }
    }

    println!("\n  Stages:");
    for stage in &config.pipeline.stages {
        println!(
            "    {:<10} {:<16} {} tokens",
            stage.id, stage.model, stage.max_output_tokens
        );
    }
    println!("    {:<10} {}", "chat", config.pipeline.chat_model);

    println!();
    if issues == 0 {
        println!("  🎉 All checks passed!");
    } else {
        println!("  ⚠️  {issues} issue(s) found. See above for details.");
    }

    Ok(())
}
