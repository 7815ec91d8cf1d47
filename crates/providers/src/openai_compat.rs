//! OpenAI-compatible provider implementation.
//!
//! Works with: OpenAI, OpenRouter, Ollama, vLLM, llama.cpp server, Together AI,
//! and any endpoint exposing `/models` and `/chat/completions`.
//!
//! The remote server owns the weights, so acquisition is a reachability check
//! plus the same one-model-at-a-time bookkeeping the local provider enforces.

use async_trait::async_trait;
use docsmith_core::error::ProviderError;
use docsmith_core::provider::{
    Generation, GenerationProvider, GenerationRequest, ModelHandle, Usage,
};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;
use tracing::{debug, info, warn};

/// An OpenAI-compatible LLM provider.
pub struct OpenAiCompatProvider {
    name: String,
    base_url: String,
    api_key: String,
    client: reqwest::Client,
    timeout: Duration,
    /// `(handle id, model)` of the acquired model.
    resident: Mutex<Option<(u64, String)>>,
    next_id: AtomicU64,
}

impl OpenAiCompatProvider {
    /// Create a new OpenAI-compatible provider.
    pub fn new(
        name: impl Into<String>,
        base_url: impl Into<String>,
        api_key: impl Into<String>,
    ) -> Self {
        Self::with_timeout(name, base_url, api_key, Duration::from_secs(120))
    }

    /// Same as [`new`](Self::new) with a custom per-request timeout.
    pub fn with_timeout(
        name: impl Into<String>,
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        timeout: Duration,
    ) -> Self {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_else(|e| {
                warn!(error = %e, "Falling back to default HTTP client");
                reqwest::Client::new()
            });

        Self {
            name: name.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            client,
            timeout,
            resident: Mutex::new(None),
            next_id: AtomicU64::new(1),
        }
    }

    /// Create an Ollama provider (convenience constructor).
    pub fn ollama(base_url: Option<&str>) -> Self {
        Self::new(
            "ollama",
            base_url.unwrap_or("http://localhost:11434/v1"),
            "ollama",
        )
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn authorized(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        if self.api_key.is_empty() {
            builder
        } else {
            builder.header("Authorization", format!("Bearer {}", self.api_key))
        }
    }

    fn lock_resident(&self) -> std::sync::MutexGuard<'_, Option<(u64, String)>> {
        self.resident.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Model ids advertised by `/models`. Empty when the endpoint lists nothing.
    async fn list_models(&self) -> Result<Vec<String>, ProviderError> {
        let url = format!("{}/models", self.base_url);
        let response = self
            .authorized(self.client.get(&url))
            .send()
            .await
            .map_err(|e| ProviderError::Network(e.to_string()))?;

        let status = response.status().as_u16();
        if status == 401 || status == 403 {
            return Err(ProviderError::ApiError {
                status_code: status,
                message: "Invalid API key or insufficient permissions".into(),
            });
        }
        if !response.status().is_success() {
            return Ok(Vec::new());
        }

        let body: ModelList = response
            .json()
            .await
            .map_err(|e| ProviderError::Network(e.to_string()))?;
        Ok(body.data.into_iter().map(|m| m.id).collect())
    }

    fn build_body(model: &str, request: &GenerationRequest) -> ChatRequest {
        ChatRequest {
            model: model.to_string(),
            messages: vec![ApiMessage {
                role: "user".into(),
                content: request.prompt.clone(),
            }],
            max_tokens: request.max_output_tokens,
            temperature: request.sampling.temperature,
            top_p: request.sampling.top_p,
            repetition_penalty: request.sampling.repetition_penalty,
            stream: false,
        }
    }
}

#[async_trait]
impl GenerationProvider for OpenAiCompatProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn acquire(&self, model: &str) -> Result<ModelHandle, ProviderError> {
        if let Some((_, resident)) = self.lock_resident().as_ref() {
            return Err(ProviderError::DeviceBusy {
                resident: resident.clone(),
            });
        }

        let models = self.list_models().await.map_err(|e| match e {
            ProviderError::ApiError { .. } => e,
            other => ProviderError::ModelLoad {
                model: model.to_string(),
                reason: other.to_string(),
            },
        })?;
        if !models.is_empty() && !models.iter().any(|m| m == model) {
            return Err(ProviderError::ModelNotFound(format!(
                "'{model}' is not served by {}",
                self.base_url
            )));
        }

        let mut resident = self.lock_resident();
        if let Some((_, other)) = resident.as_ref() {
            return Err(ProviderError::DeviceBusy {
                resident: other.clone(),
            });
        }
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        *resident = Some((id, model.to_string()));
        info!(provider = %self.name, model, "Model acquired");
        Ok(ModelHandle::new(id, model))
    }

    fn release(&self, handle: ModelHandle) {
        let mut resident = self.lock_resident();
        match resident.as_ref() {
            Some((id, _)) if *id == handle.id() => {
                *resident = None;
                info!(provider = %self.name, model = handle.model(), "Model released");
            }
            _ => warn!(model = handle.model(), "Release of a handle that is not resident"),
        }
    }

    async fn generate(
        &self,
        handle: &ModelHandle,
        request: GenerationRequest,
    ) -> Result<Generation, ProviderError> {
        let is_resident = matches!(
            self.lock_resident().as_ref(),
            Some((id, _)) if *id == handle.id()
        );
        if !is_resident {
            return Err(ProviderError::Generation(format!(
                "model '{}' is not resident",
                handle.model()
            )));
        }

        let url = format!("{}/chat/completions", self.base_url);
        let body = Self::build_body(handle.model(), &request);

        debug!(provider = %self.name, model = handle.model(), "Sending completion request");

        let response = self
            .authorized(self.client.post(&url))
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    ProviderError::Timeout {
                        model: handle.model().to_string(),
                        timeout_secs: self.timeout.as_secs(),
                    }
                } else {
                    ProviderError::Network(e.to_string())
                }
            })?;

        let status = response.status().as_u16();
        if status != 200 {
            let error_body = response.text().await.unwrap_or_default();
            warn!(status, body = %error_body, "Provider returned error");
            return Err(ProviderError::ApiError {
                status_code: status,
                message: error_body,
            });
        }

        let api_response: ChatResponse =
            response.json().await.map_err(|e| ProviderError::ApiError {
                status_code: 200,
                message: format!("Failed to parse response: {e}"),
            })?;

        let choice = api_response
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| ProviderError::ApiError {
                status_code: 200,
                message: "No choices in response".into(),
            })?;

        Ok(Generation {
            text: choice.message.content.unwrap_or_default(),
            usage: api_response.usage.map(|u| Usage {
                input_tokens: u.prompt_tokens,
                output_tokens: u.completion_tokens,
            }),
        })
    }

    async fn health_check(&self) -> Result<bool, ProviderError> {
        let url = format!("{}/models", self.base_url);
        let response = self
            .authorized(self.client.get(&url))
            .send()
            .await
            .map_err(|e| ProviderError::Network(e.to_string()))?;

        Ok(response.status().is_success())
    }
}

// --- Wire types ---

#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ApiMessage>,
    max_tokens: u32,
    temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    top_p: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    repetition_penalty: Option<f32>,
    stream: bool,
}

#[derive(Debug, Serialize, Deserialize)]
struct ApiMessage {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ApiChoice>,
    usage: Option<ApiUsage>,
}

#[derive(Debug, Deserialize)]
struct ApiChoice {
    message: ApiChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ApiChoiceMessage {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiUsage {
    prompt_tokens: u32,
    completion_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct ModelList {
    #[serde(default)]
    data: Vec<ModelEntry>,
}

#[derive(Debug, Deserialize)]
struct ModelEntry {
    id: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::routing::{get, post};
    use axum::{Json, Router};
    use docsmith_core::provider::SamplingConfig;

    /// Serve a fake OpenAI-compatible API on an ephemeral port.
    async fn fake_server(models: &'static [&'static str]) -> String {
        let app = Router::new()
            .route(
                "/v1/models",
                get(move || async move {
                    let data: Vec<_> = models
                        .iter()
                        .map(|id| serde_json::json!({ "id": id }))
                        .collect();
                    Json(serde_json::json!({ "data": data }))
                }),
            )
            .route(
                "/v1/chat/completions",
                post(|Json(body): Json<serde_json::Value>| async move {
                    let prompt = body["messages"][0]["content"].as_str().unwrap_or_default();
                    Json(serde_json::json!({
                        "choices": [{ "message": { "role": "assistant", "content": format!("echo: {prompt}") } }],
                        "usage": { "prompt_tokens": 12, "completion_tokens": 3 }
                    }))
                }),
            );

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{addr}/v1")
    }

    #[test]
    fn ollama_constructor() {
        let provider = OpenAiCompatProvider::ollama(None);
        assert_eq!(provider.name(), "ollama");
        assert_eq!(provider.base_url(), "http://localhost:11434/v1");
    }

    #[test]
    fn trailing_slash_is_trimmed() {
        let provider = OpenAiCompatProvider::new("vllm", "http://localhost:8000/v1/", "");
        assert_eq!(provider.base_url(), "http://localhost:8000/v1");
    }

    #[test]
    fn request_body_carries_sampling() {
        let request = GenerationRequest::new("Explain", 64).with_sampling(SamplingConfig {
            temperature: 0.5,
            repetition_penalty: Some(1.2),
            top_p: None,
        });
        let body = serde_json::to_value(OpenAiCompatProvider::build_body("qwen", &request)).unwrap();
        assert_eq!(body["model"], "qwen");
        assert_eq!(body["max_tokens"], 64);
        assert_eq!(body["messages"][0]["content"], "Explain");
        assert!((body["repetition_penalty"].as_f64().unwrap() - 1.2).abs() < 1e-6);
        assert!(body.get("top_p").is_none());
    }

    #[test]
    fn parse_chat_response() {
        let json = r#"{"choices":[{"message":{"role":"assistant","content":"Hello"}}],"usage":{"prompt_tokens":5,"completion_tokens":1,"total_tokens":6}}"#;
        let response: ChatResponse = serde_json::from_str(json).unwrap();
        assert_eq!(response.choices[0].message.content.as_deref(), Some("Hello"));
        assert_eq!(response.usage.unwrap().prompt_tokens, 5);
    }

    #[tokio::test]
    async fn acquire_generate_release() {
        let base = fake_server(&["tinyllama"]).await;
        let provider = OpenAiCompatProvider::new("test", base, "");

        let handle = provider.acquire("tinyllama").await.unwrap();
        let generation = provider
            .generate(&handle, GenerationRequest::new("hi", 8))
            .await
            .unwrap();
        assert_eq!(generation.text, "echo: hi");
        assert_eq!(generation.usage.unwrap().input_tokens, 12);

        provider.release(handle);
        let again = provider.acquire("tinyllama").await.unwrap();
        provider.release(again);
    }

    #[tokio::test]
    async fn second_acquire_is_refused() {
        let base = fake_server(&[]).await;
        let provider = OpenAiCompatProvider::new("test", base, "");

        let handle = provider.acquire("a").await.unwrap();
        let err = provider.acquire("b").await.unwrap_err();
        assert!(matches!(err, ProviderError::DeviceBusy { ref resident } if resident == "a"));
        provider.release(handle);
    }

    #[tokio::test]
    async fn unlisted_model_is_not_found() {
        let base = fake_server(&["tinyllama"]).await;
        let provider = OpenAiCompatProvider::new("test", base, "");

        let err = provider.acquire("gemma").await.unwrap_err();
        assert!(matches!(err, ProviderError::ModelNotFound(_)));
        // Slot stays free after a failed acquire
        let handle = provider.acquire("tinyllama").await.unwrap();
        provider.release(handle);
    }

    #[tokio::test]
    async fn unreachable_endpoint_is_load_failure() {
        let provider = OpenAiCompatProvider::new("test", "http://127.0.0.1:1/v1", "");
        let err = provider.acquire("tinyllama").await.unwrap_err();
        assert!(err.is_load_failure());
    }

    #[tokio::test]
    async fn stale_handle_cannot_generate() {
        let base = fake_server(&[]).await;
        let provider = OpenAiCompatProvider::new("test", base, "");
        let handle = provider.acquire("a").await.unwrap();
        let stale = ModelHandle::new(handle.id() + 100, "a");
        assert!(provider
            .generate(&stale, GenerationRequest::new("x", 1))
            .await
            .is_err());
        provider.release(handle);
    }
}
