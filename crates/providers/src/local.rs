//! Local inference provider — runs GGUF models on this machine via Candle.
//!
//! The device has one model slot. [`acquire`](GenerationProvider::acquire)
//! downloads (if needed) and loads weights plus tokenizer into the slot and
//! refuses while another model is resident; [`release`](GenerationProvider::release)
//! empties it. A generation still running on a released model is aborted at
//! the next token, and the following `acquire` waits for those weights to be
//! dropped before loading anything new.
//!
//! Supported presets (all Q4_K_M):
//! - **TinyLlama** 1.1B (`tinyllama`)
//! - **SmolLM** 135M / 360M / 1.7B (`smollm:135m`, …)
//! - **Qwen2.5** 0.5B / 1.5B / 3B (`qwen2.5:0.5b`, …)
//!
//! Any other model identity is treated as a path to a `.gguf` file.

use async_trait::async_trait;
use candle_core::quantized::gguf_file;
use candle_core::{Device, Tensor};
use candle_transformers::generation::LogitsProcessor;
use candle_transformers::models::quantized_llama as qlm;
use candle_transformers::models::quantized_qwen2 as qqwen2;
use docsmith_core::error::ProviderError;
use docsmith_core::provider::{
    Generation, GenerationProvider, GenerationRequest, ModelHandle, Usage,
};
use hf_hub::api::sync::Api;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, Weak};
use std::time::Duration;
use tokenizers::Tokenizer;
use tracing::{debug, info, warn};

/// Tokens considered when applying the repetition penalty.
const REPEAT_WINDOW: usize = 64;

// ── Presets ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Architecture {
    Llama,
    Qwen2,
}

/// Chat template used to wrap a prompt for the model.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ChatTemplate {
    /// `<|system|>\n…</s>\n<|user|>\n…</s>\n<|assistant|>\n`
    TinyLlama,
    /// `<|im_start|>user\n…<|im_end|>\n<|im_start|>assistant\n`
    ChatML,
}

struct ModelPreset {
    repo: &'static str,
    gguf_file: &'static str,
    tokenizer_repo: &'static str,
    architecture: Architecture,
    chat_template: ChatTemplate,
}

fn resolve_preset(alias: &str) -> Option<ModelPreset> {
    let preset = match alias.to_lowercase().as_str() {
        "tinyllama" | "tiny-llama" | "tinyllama-1.1b" => ModelPreset {
            repo: "TheBloke/TinyLlama-1.1B-Chat-v1.0-GGUF",
            gguf_file: "tinyllama-1.1b-chat-v1.0.Q4_K_M.gguf",
            tokenizer_repo: "TinyLlama/TinyLlama-1.1B-Chat-v1.0",
            architecture: Architecture::Llama,
            chat_template: ChatTemplate::TinyLlama,
        },
        "smollm" | "smollm:135m" | "smollm-135m" => ModelPreset {
            repo: "TheBloke/SmolLM-135M-Instruct-GGUF",
            gguf_file: "smollm-135m-instruct.Q4_K_M.gguf",
            tokenizer_repo: "HuggingFaceTB/SmolLM-135M-Instruct",
            architecture: Architecture::Llama,
            chat_template: ChatTemplate::ChatML,
        },
        "smollm:360m" | "smollm-360m" => ModelPreset {
            repo: "TheBloke/SmolLM-360M-Instruct-GGUF",
            gguf_file: "smollm-360m-instruct.Q4_K_M.gguf",
            tokenizer_repo: "HuggingFaceTB/SmolLM-360M-Instruct",
            architecture: Architecture::Llama,
            chat_template: ChatTemplate::ChatML,
        },
        "smollm:1.7b" | "smollm-1.7b" => ModelPreset {
            repo: "TheBloke/SmolLM-1.7B-Instruct-GGUF",
            gguf_file: "smollm-1.7b-instruct.Q4_K_M.gguf",
            tokenizer_repo: "HuggingFaceTB/SmolLM-1.7B-Instruct",
            architecture: Architecture::Llama,
            chat_template: ChatTemplate::ChatML,
        },
        "qwen2.5:0.5b" | "qwen2.5-0.5b" => ModelPreset {
            repo: "Qwen/Qwen2.5-0.5B-Instruct-GGUF",
            gguf_file: "qwen2.5-0.5b-instruct-q4_k_m.gguf",
            tokenizer_repo: "Qwen/Qwen2.5-0.5B-Instruct",
            architecture: Architecture::Qwen2,
            chat_template: ChatTemplate::ChatML,
        },
        "qwen2.5:1.5b" | "qwen2.5-1.5b" => ModelPreset {
            repo: "Qwen/Qwen2.5-1.5B-Instruct-GGUF",
            gguf_file: "qwen2.5-1.5b-instruct-q4_k_m.gguf",
            tokenizer_repo: "Qwen/Qwen2.5-1.5B-Instruct",
            architecture: Architecture::Qwen2,
            chat_template: ChatTemplate::ChatML,
        },
        "qwen2.5:3b" | "qwen2.5-3b" => ModelPreset {
            repo: "Qwen/Qwen2.5-3B-Instruct-GGUF",
            gguf_file: "qwen2.5-3b-instruct-q4_k_m.gguf",
            tokenizer_repo: "Qwen/Qwen2.5-3B-Instruct",
            architecture: Architecture::Qwen2,
            chat_template: ChatTemplate::ChatML,
        },
        _ => return None,
    };
    Some(preset)
}

/// Preset aliases accepted as model identities.
pub const PRESETS: &[&str] = &[
    "tinyllama",
    "smollm:135m",
    "smollm:360m",
    "smollm:1.7b",
    "qwen2.5:0.5b",
    "qwen2.5:1.5b",
    "qwen2.5:3b",
];

/// Wrap `prompt` in the model's chat template.
fn format_prompt(template: ChatTemplate, prompt: &str) -> String {
    const SYSTEM: &str = "You are a precise technical documentation writer.";
    match template {
        ChatTemplate::TinyLlama => {
            format!("<|system|>\n{SYSTEM}</s>\n<|user|>\n{prompt}</s>\n<|assistant|>\n")
        }
        ChatTemplate::ChatML => format!(
            "<|im_start|>system\n{SYSTEM}<|im_end|>\n<|im_start|>user\n{prompt}<|im_end|>\n<|im_start|>assistant\n"
        ),
    }
}

// ── Loaded model ───────────────────────────────────────────────────────

enum Weights {
    Llama(qlm::ModelWeights),
    Qwen2(qqwen2::ModelWeights),
}

impl Weights {
    fn forward(&mut self, input: &Tensor, index_pos: usize) -> candle_core::Result<Tensor> {
        match self {
            Self::Llama(m) => m.forward(input, index_pos),
            Self::Qwen2(m) => m.forward(input, index_pos),
        }
    }
}

struct LoadedModel {
    weights: Weights,
    tokenizer: Tokenizer,
    device: Device,
    chat_template: ChatTemplate,
    eos_token_id: u32,
}

fn load_err(model: &str, reason: impl std::fmt::Display) -> ProviderError {
    ProviderError::ModelLoad {
        model: model.to_string(),
        reason: reason.to_string(),
    }
}

fn map_candle_err(e: candle_core::Error) -> ProviderError {
    ProviderError::Generation(format!("Candle inference error: {e}"))
}

impl LoadedModel {
    /// Load a preset alias or a `.gguf` path. Blocking.
    fn load(model_name: &str) -> Result<Self, ProviderError> {
        let device = Device::Cpu;

        if let Some(preset) = resolve_preset(model_name) {
            info!(model = model_name, repo = preset.repo, "Fetching model weights");
            let api = Api::new().map_err(|e| load_err(model_name, format!("hub init: {e}")))?;
            let model_path = api
                .model(preset.repo.to_string())
                .get(preset.gguf_file)
                .map_err(|e| load_err(model_name, format!("weights download: {e}")))?;
            let tokenizer_path = api
                .model(preset.tokenizer_repo.to_string())
                .get("tokenizer.json")
                .map_err(|e| load_err(model_name, format!("tokenizer download: {e}")))?;
            return Self::load_files(
                model_name,
                &model_path,
                &tokenizer_path,
                Some(preset.architecture),
                preset.chat_template,
                device,
            );
        }

        let path = Path::new(model_name);
        if path.extension().is_some_and(|e| e == "gguf") && path.exists() {
            let tokenizer_path = path.with_file_name("tokenizer.json");
            if !tokenizer_path.exists() {
                return Err(load_err(
                    model_name,
                    "no tokenizer.json next to the GGUF file",
                ));
            }
            return Self::load_files(
                model_name,
                path,
                &tokenizer_path,
                None,
                ChatTemplate::ChatML,
                device,
            );
        }

        Err(ProviderError::ModelNotFound(format!(
            "Unknown local model '{model_name}'. Presets: {}. Or give a path to a .gguf file.",
            PRESETS.join(", ")
        )))
    }

    fn load_files(
        model_name: &str,
        model_path: &Path,
        tokenizer_path: &Path,
        architecture: Option<Architecture>,
        chat_template: ChatTemplate,
        device: Device,
    ) -> Result<Self, ProviderError> {
        let tokenizer = Tokenizer::from_file(tokenizer_path)
            .map_err(|e| load_err(model_name, format!("tokenizer: {e}")))?;

        let mut file = std::fs::File::open(model_path)
            .map_err(|e| load_err(model_name, format!("open weights: {e}")))?;
        let gguf = gguf_file::Content::read(&mut file)
            .map_err(|e| load_err(model_name, format!("parse GGUF: {e}")))?;

        let architecture = architecture.unwrap_or_else(|| {
            let declared = gguf
                .metadata
                .get("general.architecture")
                .and_then(|v| v.to_string().ok())
                .cloned()
                .unwrap_or_default();
            if declared == "qwen2" {
                Architecture::Qwen2
            } else {
                Architecture::Llama
            }
        });

        let weights = match architecture {
            Architecture::Llama => {
                Weights::Llama(qlm::ModelWeights::from_gguf(gguf, &mut file, &device).map_err(
                    |e| load_err(model_name, format!("weights: {e}")),
                )?)
            }
            Architecture::Qwen2 => {
                Weights::Qwen2(qqwen2::ModelWeights::from_gguf(gguf, &mut file, &device).map_err(
                    |e| load_err(model_name, format!("weights: {e}")),
                )?)
            }
        };

        let eos_token_id = tokenizer
            .token_to_id("</s>")
            .or_else(|| tokenizer.token_to_id("<|im_end|>"))
            .or_else(|| tokenizer.token_to_id("<|endoftext|>"))
            .unwrap_or(2);

        info!(model = model_name, ?architecture, eos_token_id, "Model resident");

        Ok(Self {
            weights,
            tokenizer,
            device,
            chat_template,
            eos_token_id,
        })
    }

    /// Tokenize → sample → decode. Checks `abort` between tokens.
    fn generate(
        &mut self,
        request: &GenerationRequest,
        abort: &AtomicBool,
    ) -> Result<Generation, ProviderError> {
        let prompt = format_prompt(self.chat_template, &request.prompt);
        let encoding = self
            .tokenizer
            .encode(prompt, true)
            .map_err(|e| ProviderError::Generation(format!("Tokenization failed: {e}")))?;
        let prompt_tokens = encoding.get_ids().to_vec();

        let sampling = &request.sampling;
        let temperature = (sampling.temperature > 0.0).then_some(sampling.temperature as f64);
        let top_p = sampling.top_p.map(f64::from);
        let mut logits_processor = LogitsProcessor::new(42, temperature, top_p);

        debug!(
            prompt_tokens = prompt_tokens.len(),
            max_tokens = request.max_output_tokens,
            "Starting local generation"
        );

        let mut all_tokens = prompt_tokens.clone();
        let mut generated: Vec<u32> = Vec::new();
        let mut input = Tensor::new(prompt_tokens.as_slice(), &self.device)
            .and_then(|t| t.unsqueeze(0))
            .map_err(map_candle_err)?;
        let mut index_pos = 0;

        for _ in 0..request.max_output_tokens {
            if abort.load(Ordering::Relaxed) {
                return Err(ProviderError::Generation(
                    "model released during generation".into(),
                ));
            }

            let seq_len = input.dim(1).map_err(map_candle_err)?;
            let logits = self
                .weights
                .forward(&input, index_pos)
                .and_then(|l| l.squeeze(0))
                .map_err(map_candle_err)?;
            index_pos += seq_len;

            let logits = match sampling.repetition_penalty {
                Some(penalty) if penalty != 1.0 => {
                    let start = all_tokens.len().saturating_sub(REPEAT_WINDOW);
                    candle_transformers::utils::apply_repeat_penalty(
                        &logits,
                        penalty,
                        &all_tokens[start..],
                    )
                    .map_err(map_candle_err)?
                }
                _ => logits,
            };

            let next = logits_processor.sample(&logits).map_err(map_candle_err)?;
            if next == self.eos_token_id {
                break;
            }
            generated.push(next);
            all_tokens.push(next);

            input = Tensor::new(&[next][..], &self.device)
                .and_then(|t| t.unsqueeze(0))
                .map_err(map_candle_err)?;
        }

        let text = self
            .tokenizer
            .decode(&generated, true)
            .map_err(|e| ProviderError::Generation(format!("Detokenization failed: {e}")))?;
        let text = text
            .trim()
            .trim_end_matches("</s>")
            .trim_end_matches("<|im_end|>")
            .trim()
            .to_string();

        Ok(Generation {
            text,
            usage: Some(Usage {
                input_tokens: prompt_tokens.len() as u32,
                output_tokens: generated.len() as u32,
            }),
        })
    }
}

// ── The slot ───────────────────────────────────────────────────────────

enum SlotState {
    Empty,
    Loading {
        model: String,
    },
    Resident {
        handle_id: u64,
        model: String,
        loaded: Arc<Mutex<LoadedModel>>,
        abort: Arc<AtomicBool>,
    },
}

struct Slot {
    state: SlotState,
    /// Weights released while a generation still held them.
    draining: Option<Weak<Mutex<LoadedModel>>>,
}

impl Slot {
    fn occupant(&self) -> Option<String> {
        match &self.state {
            SlotState::Empty => None,
            SlotState::Loading { model } | SlotState::Resident { model, .. } => Some(model.clone()),
        }
    }
}

/// A provider that runs one GGUF model at a time on the local device.
pub struct LocalProvider {
    slot: Mutex<Slot>,
    next_id: AtomicU64,
}

impl LocalProvider {
    pub fn new() -> Self {
        Self {
            slot: Mutex::new(Slot {
                state: SlotState::Empty,
                draining: None,
            }),
            next_id: AtomicU64::new(1),
        }
    }

    fn lock_slot(&self) -> std::sync::MutexGuard<'_, Slot> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Name of the resident (or loading) model, if any.
    pub fn resident(&self) -> Option<String> {
        self.lock_slot().occupant()
    }

    async fn wait_for_drain(&self) {
        loop {
            let draining = {
                let mut slot = self.lock_slot();
                let alive = slot
                    .draining
                    .as_ref()
                    .is_some_and(|weak| weak.strong_count() > 0);
                if !alive {
                    slot.draining = None;
                }
                alive
            };
            if !draining {
                return;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    }
}

/// Empties a slot still marked `Loading` when an `acquire` future is
/// dropped before the load completes.
struct LoadingSlot<'a>(&'a LocalProvider);

impl Drop for LoadingSlot<'_> {
    fn drop(&mut self) {
        let mut slot = self.0.lock_slot();
        if let SlotState::Loading { model } = &slot.state {
            debug!(model = %model, "Abandoned load, slot freed");
            slot.state = SlotState::Empty;
        }
    }
}

impl Default for LocalProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl GenerationProvider for LocalProvider {
    fn name(&self) -> &str {
        "local"
    }

    async fn acquire(&self, model: &str) -> Result<ModelHandle, ProviderError> {
        {
            let mut slot = self.lock_slot();
            if let Some(resident) = slot.occupant() {
                return Err(ProviderError::DeviceBusy { resident });
            }
            slot.state = SlotState::Loading {
                model: model.to_string(),
            };
        }
        let _loading = LoadingSlot(self);

        self.wait_for_drain().await;

        let name = model.to_string();
        let loaded = tokio::task::spawn_blocking(move || LoadedModel::load(&name))
            .await
            .map_err(|e| load_err(model, format!("loader task failed: {e}")))
            .and_then(|r| r);

        let mut slot = self.lock_slot();
        match loaded {
            Ok(loaded) => {
                let handle_id = self.next_id.fetch_add(1, Ordering::Relaxed);
                slot.state = SlotState::Resident {
                    handle_id,
                    model: model.to_string(),
                    loaded: Arc::new(Mutex::new(loaded)),
                    abort: Arc::new(AtomicBool::new(false)),
                };
                Ok(ModelHandle::new(handle_id, model))
            }
            Err(e) => {
                slot.state = SlotState::Empty;
                warn!(model, error = %e, "Model failed to load");
                Err(e)
            }
        }
    }

    fn release(&self, handle: ModelHandle) {
        let mut slot = self.lock_slot();
        let matches = matches!(
            &slot.state,
            SlotState::Resident { handle_id, .. } if *handle_id == handle.id()
        );
        if !matches {
            warn!(model = handle.model(), "Release of a handle that is not resident");
            return;
        }

        if let SlotState::Resident { loaded, abort, .. } =
            std::mem::replace(&mut slot.state, SlotState::Empty)
        {
            abort.store(true, Ordering::Relaxed);
            slot.draining = Some(Arc::downgrade(&loaded));
            drop(loaded);
        }
        info!(model = handle.model(), "Model released");
    }

    async fn generate(
        &self,
        handle: &ModelHandle,
        request: GenerationRequest,
    ) -> Result<Generation, ProviderError> {
        let (loaded, abort) = match &self.lock_slot().state {
            SlotState::Resident {
                handle_id,
                loaded,
                abort,
                ..
            } if *handle_id == handle.id() => (loaded.clone(), abort.clone()),
            _ => {
                return Err(ProviderError::Generation(format!(
                    "model '{}' is not resident",
                    handle.model()
                )));
            }
        };

        tokio::task::spawn_blocking(move || {
            let mut model = loaded.lock().unwrap_or_else(PoisonError::into_inner);
            model.generate(&request, &abort)
        })
        .await
        .map_err(|e| ProviderError::Generation(format!("Inference task failed: {e}")))?
    }
}
