//! Error types for the docsmith domain.
//!
//! Uses `thiserror` for ergonomic error definitions.
//! Each bounded context has its own error enum; failures are contained at the
//! smallest scope that still lets a run finish (heading > stage > run).

use thiserror::Error;

/// The top-level error type for docsmith operations.
///
/// Only [`Error::Archive`] and [`Error::Cancelled`] ever abort a documentation
/// run. Everything else degrades output quality instead.
#[derive(Debug, Error)]
pub enum Error {
    // --- Ingest errors ---
    #[error("Archive error: {0}")]
    Archive(#[from] ArchiveError),

    // --- Provider errors ---
    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    // --- Configuration errors ---
    #[error("Configuration error: {message}")]
    Config { message: String },

    // --- Run control ---
    #[error("Run cancelled before stage '{stage}'")]
    Cancelled { stage: String },

    // --- Serialization ---
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    // --- Generic ---
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type alias using our Error.
pub type Result<T> = std::result::Result<T, Error>;

// --- Bounded context errors ---

/// The uploaded archive could not be turned into a project context.
#[derive(Debug, Clone, Error)]
pub enum ArchiveError {
    #[error("Archive is unreadable: {0}")]
    Unreadable(String),

    #[error("Archive is structurally invalid: {0}")]
    Invalid(String),

    #[error("Archive contains no usable source files")]
    Empty,
}

#[derive(Debug, Clone, Error)]
pub enum ProviderError {
    #[error("Failed to load model '{model}': {reason}")]
    ModelLoad { model: String, reason: String },

    #[error("A model is already resident: {resident}")]
    DeviceBusy { resident: String },

    #[error("Generation failed: {0}")]
    Generation(String),

    #[error("Generation with '{model}' timed out after {timeout_secs}s")]
    Timeout { model: String, timeout_secs: u64 },

    #[error("API request failed: {message} (status: {status_code})")]
    ApiError { status_code: u16, message: String },

    #[error("Model not found: {0}")]
    ModelNotFound(String),

    #[error("Provider not configured: {0}")]
    NotConfigured(String),

    #[error("Network error: {0}")]
    Network(String),
}

impl ProviderError {
    /// Whether this error happened while bringing a model onto the device.
    pub fn is_load_failure(&self) -> bool {
        matches!(
            self,
            Self::ModelLoad { .. } | Self::DeviceBusy { .. } | Self::ModelNotFound(_)
        )
    }
}

/// Stage-level failure. Non-fatal: the scheduler records it and moves on.
#[derive(Debug, Clone, Error)]
pub enum StageError {
    #[error("Stage '{stage}' could not acquire its model: {source}")]
    ModelLoad {
        stage: String,
        #[source]
        source: ProviderError,
    },

    #[error("Stage '{stage}' failed: {reason}")]
    Failed { stage: String, reason: String },

    #[error("Stage '{stage}' was cancelled")]
    Cancelled { stage: String },
}

/// Heading-level failure. Non-fatal: a fallback text is substituted.
#[derive(Debug, Clone, Error)]
pub enum GenerationError {
    #[error("Generation for '{heading}' failed: {source}")]
    Provider {
        heading: String,
        #[source]
        source: ProviderError,
    },

    #[error("Generation for '{heading}' timed out after {timeout_secs}s")]
    Timeout { heading: String, timeout_secs: u64 },
}
