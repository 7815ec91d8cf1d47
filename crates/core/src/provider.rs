//! Generation provider trait — the abstraction over model backends.
//!
//! A provider knows how to bring a model onto the compute device
//! ([`GenerationProvider::acquire`]), run prompts against the resident model
//! ([`GenerationProvider::generate`]) and reclaim its memory again
//! ([`GenerationProvider::release`]).
//!
//! Implementations: local candle inference, OpenAI-compatible endpoints.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ProviderError;
use crate::tokens::estimate_tokens;

/// An exclusively owned, resident model.
///
/// Deliberately neither `Clone` nor `Copy`: the only way to get rid of a
/// handle is to give it back to the provider through `release`.
#[derive(Debug, PartialEq, Eq)]
pub struct ModelHandle {
    id: u64,
    model: String,
    acquired_at: DateTime<Utc>,
}

impl ModelHandle {
    /// Mint a handle. Only providers should call this, from `acquire`.
    pub fn new(id: u64, model: impl Into<String>) -> Self {
        Self {
            id,
            model: model.into(),
            acquired_at: Utc::now(),
        }
    }

    /// Provider-assigned identifier, unique per acquisition.
    pub fn id(&self) -> u64 {
        self.id
    }

    /// The model identity this handle represents.
    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn acquired_at(&self) -> DateTime<Utc> {
        self.acquired_at
    }
}

/// Sampling knobs for one generation call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SamplingConfig {
    /// Temperature (0.0 = greedy, higher = more creative)
    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// Penalty applied to recently generated tokens
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub repetition_penalty: Option<f32>,

    /// Nucleus sampling cut-off
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f32>,
}

fn default_temperature() -> f32 {
    0.7
}

impl Default for SamplingConfig {
    fn default() -> Self {
        Self {
            temperature: default_temperature(),
            repetition_penalty: None,
            top_p: None,
        }
    }
}

/// A single prompt to run against a resident model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationRequest {
    /// The fully rendered prompt
    pub prompt: String,

    /// Maximum number of tokens to generate
    pub max_output_tokens: u32,

    /// Sampling configuration
    #[serde(default)]
    pub sampling: SamplingConfig,
}

impl GenerationRequest {
    pub fn new(prompt: impl Into<String>, max_output_tokens: u32) -> Self {
        Self {
            prompt: prompt.into(),
            max_output_tokens,
            sampling: SamplingConfig::default(),
        }
    }

    pub fn with_sampling(mut self, sampling: SamplingConfig) -> Self {
        self.sampling = sampling;
        self
    }
}

/// Token usage reported by the backend.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    pub input_tokens: u32,
    pub output_tokens: u32,
}

/// The text a model produced for one request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Generation {
    pub text: String,

    /// Token usage, when the backend knows it
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<Usage>,
}

impl Generation {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            usage: None,
        }
    }
}

/// The core provider trait.
///
/// Callers must hold at most one [`ModelHandle`] per provider at a time; the
/// stage scheduler is the only component that calls `acquire` and `release`.
#[async_trait]
pub trait GenerationProvider: Send + Sync {
    /// A human-readable name for this provider (e.g., "local", "ollama").
    fn name(&self) -> &str;

    /// Load `model` onto the device and hand out exclusive access to it.
    async fn acquire(&self, model: &str) -> std::result::Result<ModelHandle, ProviderError>;

    /// Reclaim the memory held by `handle`.
    ///
    /// Synchronous and infallible so it can run from `Drop` on every exit path.
    fn release(&self, handle: ModelHandle);

    /// Run one prompt against the resident model.
    async fn generate(
        &self,
        handle: &ModelHandle,
        request: GenerationRequest,
    ) -> std::result::Result<Generation, ProviderError>;

    /// Count tokens in `text` for accounting.
    ///
    /// Default implementation uses the character heuristic from [`estimate_tokens`].
    fn count_tokens(&self, text: &str) -> usize {
        estimate_tokens(text)
    }

    /// Health check: can we reach the backend?
    async fn health_check(&self) -> std::result::Result<bool, ProviderError> {
        Ok(true)
    }
}
