//! Provider selection — builds the one provider a process runs against.

use crate::openai_compat::OpenAiCompatProvider;
use docsmith_config::AppConfig;
use docsmith_core::error::ProviderError;
use docsmith_core::provider::GenerationProvider;
use std::sync::Arc;
use std::time::Duration;

/// Provider kinds with a known default endpoint.
pub const KNOWN_KINDS: &[&str] = &[
    "local",
    "openai",
    "openrouter",
    "ollama",
    "groq",
    "together",
    "vllm",
    "llamacpp",
];

/// Build the configured provider.
pub fn build_from_config(
    config: &AppConfig,
) -> Result<Arc<dyn GenerationProvider>, ProviderError> {
    let provider_config = &config.provider;
    let kind = provider_config.kind.as_str();

    if kind == "local" {
        return build_local();
    }

    let base_url = provider_config
        .api_url
        .clone()
        .or_else(|| default_base_url(kind))
        .ok_or_else(|| {
            ProviderError::NotConfigured(format!(
                "provider '{kind}' needs provider.api_url"
            ))
        })?;
    let api_key = provider_config.api_key.clone().unwrap_or_default();

    tracing::info!(provider = kind, base_url = %base_url, "Using remote provider");
    Ok(Arc::new(OpenAiCompatProvider::with_timeout(
        kind,
        base_url,
        api_key,
        Duration::from_secs(provider_config.request_timeout_secs),
    )))
}

#[cfg(feature = "local")]
fn build_local() -> Result<Arc<dyn GenerationProvider>, ProviderError> {
    tracing::info!("Using local Candle provider");
    Ok(Arc::new(crate::local::LocalProvider::new()))
}

#[cfg(not(feature = "local"))]
fn build_local() -> Result<Arc<dyn GenerationProvider>, ProviderError> {
    Err(ProviderError::NotConfigured(
        "this build has no local inference; rebuild with `--features local` or set provider.kind".into(),
    ))
}

/// Get the default base URL for well-known providers.
pub fn default_base_url(kind: &str) -> Option<String> {
    let url = match kind {
        "openrouter" => "https://openrouter.ai/api/v1",
        "openai" => "https://api.openai.com/v1",
        "ollama" => "http://localhost:11434/v1",
        "groq" => "https://api.groq.com/openai/v1",
        "together" => "https://api.together.xyz/v1",
        "vllm" => "http://localhost:8000/v1",
        "llamacpp" | "llama.cpp" => "http://localhost:8080/v1",
        _ => return None,
    };
    Some(url.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_base_urls() {
        assert!(default_base_url("openrouter").unwrap().contains("openrouter.ai"));
        assert!(default_base_url("openai").unwrap().contains("api.openai.com"));
        assert!(default_base_url("ollama").unwrap().contains("localhost:11434"));
        assert!(default_base_url("mystery").is_none());
    }

    #[test]
    fn build_remote_provider() {
        let mut config = AppConfig::default();
        config.provider.kind = "ollama".into();
        let provider = build_from_config(&config).unwrap();
        assert_eq!(provider.name(), "ollama");
    }

    #[test]
    fn custom_kind_requires_url() {
        let mut config = AppConfig::default();
        config.provider.kind = "in-house".into();
        assert!(matches!(
            build_from_config(&config),
            Err(ProviderError::NotConfigured(_))
        ));

        config.provider.api_url = Some("http://10.0.0.5:9000/v1".into());
        assert_eq!(build_from_config(&config).unwrap().name(), "in-house");
    }

    #[cfg(not(feature = "local"))]
    #[test]
    fn local_without_feature_is_not_configured() {
        let config = AppConfig::default();
        assert!(matches!(
            build_from_config(&config),
            Err(ProviderError::NotConfigured(_))
        ));
    }
}
