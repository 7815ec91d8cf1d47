//! Configuration loading, validation, and management for docsmith.
//!
//! Loads configuration from `~/.docsmith/config.toml` with environment
//! variable overrides. Validates all settings at startup.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};

/// The root configuration structure.
///
/// Maps directly to `~/.docsmith/config.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Generation backend
    #[serde(default)]
    pub provider: ProviderConfig,

    /// HTTP gateway
    #[serde(default)]
    pub gateway: GatewayConfig,

    /// Archive scanning policy
    #[serde(default)]
    pub scanner: ScannerConfig,

    /// Context ceilings
    #[serde(default)]
    pub context: ContextConfig,

    /// Stage list and heading policy
    #[serde(default)]
    pub pipeline: PipelineConfig,

    /// Usage history
    #[serde(default)]
    pub telemetry: TelemetryConfig,
}

/// Redact a secret string for Debug output.
fn redact(s: &Option<String>) -> &'static str {
    match s {
        Some(_) => "[REDACTED]",
        None => "None",
    }
}

#[derive(Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    /// `"local"`, `"openai"`, or any OpenAI-compatible name (`"ollama"`, `"vllm"`)
    #[serde(default = "default_provider_kind")]
    pub kind: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_url: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

fn default_provider_kind() -> String {
    "local".into()
}
fn default_request_timeout() -> u64 {
    120
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            kind: default_provider_kind(),
            api_url: None,
            api_key: None,
            request_timeout_secs: default_request_timeout(),
        }
    }
}

impl std::fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderConfig")
            .field("kind", &self.kind)
            .field("api_url", &self.api_url)
            .field("api_key", &redact(&self.api_key))
            .field("request_timeout_secs", &self.request_timeout_secs)
            .finish()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    /// Largest accepted request body (archive upload)
    #[serde(default = "default_max_upload")]
    pub max_upload_bytes: usize,

    /// CORS origins; empty means any origin
    #[serde(default)]
    pub allowed_origins: Vec<String>,
}

fn default_host() -> String {
    "127.0.0.1".into()
}
fn default_port() -> u16 {
    8000
}
fn default_max_upload() -> usize {
    50 * 1024 * 1024
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            max_upload_bytes: default_max_upload(),
            allowed_origins: vec![],
        }
    }
}

/// Which archive entries are read, and which are dropped as noise.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScannerConfig {
    /// Any path containing one of these segments is skipped
    #[serde(default = "default_ignored_dirs")]
    pub ignored_dirs: Vec<String>,

    /// Extensions (with the dot) of ordinary source files
    #[serde(default = "default_allowed_extensions")]
    pub allowed_extensions: Vec<String>,

    /// Manifest / config base names, accepted regardless of extension
    #[serde(default = "default_priority_files")]
    pub priority_files: Vec<String>,

    /// Hard per-file cap
    #[serde(default = "default_max_file_bytes")]
    pub max_file_bytes: usize,

    /// Files above this size need at least `min_newlines` newlines
    #[serde(default = "default_sparse_file_bytes")]
    pub sparse_file_bytes: usize,

    #[serde(default = "default_min_newlines")]
    pub min_newlines: usize,
}

fn default_ignored_dirs() -> Vec<String> {
    [
        "node_modules",
        ".git",
        "__pycache__",
        "dist",
        "build",
        "venv",
        ".idea",
        ".vscode",
        "coverage",
        "assets",
        "images",
        "bin",
        "obj",
        "target",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}

fn default_allowed_extensions() -> Vec<String> {
    [
        ".py", ".js", ".jsx", ".ts", ".tsx", ".java", ".cpp", ".css", ".html", ".sql", ".json",
        ".yml", ".md", ".cs", ".rs", ".go",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}

fn default_priority_files() -> Vec<String> {
    [
        "package.json",
        "requirements.txt",
        "README.md",
        "Dockerfile",
        "docker-compose.yml",
        "settings.py",
        "config.js",
        "pom.xml",
        "build.gradle",
        "Cargo.toml",
        "go.mod",
        ".env.example",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}

fn default_max_file_bytes() -> usize {
    12_000
}
fn default_sparse_file_bytes() -> usize {
    500
}
fn default_min_newlines() -> usize {
    3
}

impl Default for ScannerConfig {
    fn default() -> Self {
        Self {
            ignored_dirs: default_ignored_dirs(),
            allowed_extensions: default_allowed_extensions(),
            priority_files: default_priority_files(),
            max_file_bytes: default_max_file_bytes(),
            sparse_file_bytes: default_sparse_file_bytes(),
            min_newlines: default_min_newlines(),
        }
    }
}

/// Ceilings applied while folding scanned files into a project context.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContextConfig {
    #[serde(default = "default_max_priority_bytes")]
    pub max_priority_bytes: usize,

    #[serde(default = "default_max_general_bytes")]
    pub max_general_bytes: usize,

    #[serde(default = "default_max_structure_entries")]
    pub max_structure_entries: usize,

    #[serde(default = "default_max_modules")]
    pub max_modules: usize,
}

fn default_max_priority_bytes() -> usize {
    10_000
}
fn default_max_general_bytes() -> usize {
    15_000
}
fn default_max_structure_entries() -> usize {
    60
}
fn default_max_modules() -> usize {
    30
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self {
            max_priority_bytes: default_max_priority_bytes(),
            max_general_bytes: default_max_general_bytes(),
            max_structure_entries: default_max_structure_entries(),
            max_modules: default_max_modules(),
        }
    }
}

/// What a stage is asked to do with each heading.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageIntent {
    /// One-line objective per heading
    Summarize,
    /// First long-form pass
    Draft,
    /// Rewrites the previous stage's text
    Refine,
    /// Terminal pass over the concatenated document
    Polish,
}

impl std::fmt::Display for StageIntent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Summarize => "summarize",
            Self::Draft => "draft",
            Self::Refine => "refine",
            Self::Polish => "polish",
        };
        f.write_str(name)
    }
}

/// One entry of the ordered stage list.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageConfig {
    pub id: String,
    pub model: String,
    pub intent: StageIntent,
    pub max_output_tokens: u32,

    #[serde(default = "default_temperature")]
    pub temperature: f32,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub repetition_penalty: Option<f32>,

    /// Per generation call; 0 disables the timeout
    #[serde(default = "default_stage_timeout")]
    pub timeout_secs: u64,
}

fn default_temperature() -> f32 {
    0.7
}
fn default_stage_timeout() -> u64 {
    300
}

fn default_stages() -> Vec<StageConfig> {
    vec![
        StageConfig {
            id: "summarize".into(),
            model: "qwen2.5:0.5b".into(),
            intent: StageIntent::Summarize,
            max_output_tokens: 60,
            temperature: 0.0,
            repetition_penalty: None,
            timeout_secs: default_stage_timeout(),
        },
        StageConfig {
            id: "draft".into(),
            model: "tinyllama".into(),
            intent: StageIntent::Draft,
            max_output_tokens: 512,
            temperature: 0.6,
            repetition_penalty: Some(1.15),
            timeout_secs: default_stage_timeout(),
        },
        StageConfig {
            id: "refine".into(),
            model: "qwen2.5:1.5b".into(),
            intent: StageIntent::Refine,
            max_output_tokens: 600,
            temperature: 0.5,
            repetition_penalty: Some(1.2),
            timeout_secs: default_stage_timeout(),
        },
        StageConfig {
            id: "polish".into(),
            model: "qwen2.5:3b".into(),
            intent: StageIntent::Polish,
            max_output_tokens: 1024,
            temperature: 0.5,
            repetition_penalty: None,
            timeout_secs: default_stage_timeout(),
        },
    ]
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    #[serde(default = "default_stages")]
    pub stages: Vec<StageConfig>,

    /// Used when a request supplies no headings
    #[serde(default = "default_headings")]
    pub default_headings: Vec<String>,

    /// Cap on headings extracted from a template document
    #[serde(default = "default_max_headings")]
    pub max_headings: usize,

    /// Substituted for a heading whose generation failed or was suppressed
    #[serde(default = "default_fallback_text")]
    pub fallback_text: String,

    /// Drop output identical to text already produced in the same run
    #[serde(default = "default_true")]
    pub suppress_duplicates: bool,

    /// Model loaded for `/v1/chat` conversations
    #[serde(default = "default_chat_model")]
    pub chat_model: String,

    /// Per chat reply; 0 disables the timeout
    #[serde(default = "default_stage_timeout")]
    pub chat_timeout_secs: u64,
}

fn default_headings() -> Vec<String> {
    vec!["Overview".into(), "Technical Implementation".into()]
}
fn default_max_headings() -> usize {
    15
}
fn default_fallback_text() -> String {
    "Overview of this module.".into()
}
fn default_true() -> bool {
    true
}
fn default_chat_model() -> String {
    "qwen2.5:1.5b".into()
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            stages: default_stages(),
            default_headings: default_headings(),
            max_headings: default_max_headings(),
            fallback_text: default_fallback_text(),
            suppress_duplicates: true,
            chat_model: default_chat_model(),
            chat_timeout_secs: default_stage_timeout(),
        }
    }
}

impl PipelineConfig {
    /// Distinct model identities, in stage order.
    pub fn models(&self) -> Vec<&str> {
        let mut seen = HashSet::new();
        self.stages
            .iter()
            .map(|s| s.model.as_str())
            .filter(|m| seen.insert(*m))
            .collect()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelemetryConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Completed run summaries kept for `/v1/usage`
    #[serde(default = "default_history_limit")]
    pub history_limit: usize,
}

fn default_history_limit() -> usize {
    50
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            history_limit: default_history_limit(),
        }
    }
}

impl AppConfig {
    /// Load configuration from the default path (~/.docsmith/config.toml).
    ///
    /// Environment overrides:
    /// - `DOCSMITH_PROVIDER`
    /// - `DOCSMITH_API_KEY` (then `OPENAI_API_KEY`) when no key is configured
    /// - `DOCSMITH_API_URL`
    /// - `DOCSMITH_PORT`
    pub fn load() -> Result<Self, ConfigError> {
        let config_path = Self::config_dir().join("config.toml");
        let mut config = Self::load_from(&config_path)?;
        config.apply_env_overrides()?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a specific file path.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            tracing::info!("No config file found at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        let config: Self = toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        config.validate()?;
        Ok(config)
    }

    fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        if let Ok(kind) = std::env::var("DOCSMITH_PROVIDER") {
            self.provider.kind = kind;
        }

        if self.provider.api_key.is_none() {
            self.provider.api_key = std::env::var("DOCSMITH_API_KEY")
                .ok()
                .or_else(|| std::env::var("OPENAI_API_KEY").ok());
        }

        if let Ok(url) = std::env::var("DOCSMITH_API_URL") {
            self.provider.api_url = Some(url);
        }

        if let Ok(port) = std::env::var("DOCSMITH_PORT") {
            self.gateway.port = port.parse().map_err(|_| {
                ConfigError::ValidationError(format!("DOCSMITH_PORT is not a valid port: {port}"))
            })?;
        }

        Ok(())
    }

    /// Get the configuration directory path.
    pub fn config_dir() -> PathBuf {
        dirs_home().join(".docsmith")
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let stages = &self.pipeline.stages;
        if stages.is_empty() {
            return Err(ConfigError::ValidationError(
                "pipeline.stages must contain at least one stage".into(),
            ));
        }

        let mut ids = HashSet::new();
        for (i, stage) in stages.iter().enumerate() {
            if !ids.insert(stage.id.as_str()) {
                return Err(ConfigError::ValidationError(format!(
                    "duplicate stage id '{}'",
                    stage.id
                )));
            }
            if !(0.0..=2.0).contains(&stage.temperature) {
                return Err(ConfigError::ValidationError(format!(
                    "stage '{}': temperature must be between 0.0 and 2.0",
                    stage.id
                )));
            }
            if stage.max_output_tokens == 0 {
                return Err(ConfigError::ValidationError(format!(
                    "stage '{}': max_output_tokens must be > 0",
                    stage.id
                )));
            }
            if stage.intent == StageIntent::Polish && i + 1 != stages.len() {
                return Err(ConfigError::ValidationError(format!(
                    "stage '{}': a polish stage must be the last stage",
                    stage.id
                )));
            }
        }

        let ceilings = [
            ("scanner.max_file_bytes", self.scanner.max_file_bytes),
            ("context.max_priority_bytes", self.context.max_priority_bytes),
            ("context.max_general_bytes", self.context.max_general_bytes),
            ("context.max_structure_entries", self.context.max_structure_entries),
            ("pipeline.max_headings", self.pipeline.max_headings),
            ("gateway.max_upload_bytes", self.gateway.max_upload_bytes),
        ];
        if let Some((name, _)) = ceilings.iter().find(|(_, v)| *v == 0) {
            return Err(ConfigError::ValidationError(format!("{name} must be > 0")));
        }

        if self.pipeline.fallback_text.trim().is_empty() {
            return Err(ConfigError::ValidationError(
                "pipeline.fallback_text must not be empty".into(),
            ));
        }

        if self.pipeline.chat_model.trim().is_empty() {
            return Err(ConfigError::ValidationError(
                "pipeline.chat_model must not be empty".into(),
            ));
        }

        Ok(())
    }

    /// Check if an API key is available (from config or environment).
    pub fn has_api_key(&self) -> bool {
        self.provider.api_key.is_some()
    }

    /// Generate a default config TOML string (for the `init` command).
    pub fn default_toml() -> String {
        let config = Self::default();
        toml::to_string_pretty(&config).unwrap_or_default()
    }
}

/// Get the user's home directory.
fn dirs_home() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        std::env::var("USERPROFILE")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("C:\\Users\\Default"))
    }
    #[cfg(not(target_os = "windows"))]
    {
        std::env::var("HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("/tmp"))
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file at {path}: {reason}")]
    ReadError { path: PathBuf, reason: String },

    #[error("Failed to parse config file at {path}: {reason}")]
    ParseError { path: PathBuf, reason: String },

    #[error("Configuration validation failed: {0}")]
    ValidationError(String),
}
