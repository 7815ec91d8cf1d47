//! Shared test helpers: a scripted provider with a residency audit.

use async_trait::async_trait;
use docsmith_core::error::ProviderError;
use docsmith_core::provider::{
    Generation, GenerationProvider, GenerationRequest, ModelHandle, Usage,
};
use std::collections::HashSet;
use std::sync::Mutex;

/// What a scripted rule answers with.
#[derive(Debug, Clone)]
pub enum Reply {
    Text(String),
    Fail,
    /// Never completes; only a timeout or cancellation ends the call.
    Hang,
}

#[derive(Default)]
struct Log {
    resident: Option<(u64, String)>,
    max_resident: usize,
    acquisitions: Vec<String>,
    releases: usize,
    prompts: Vec<(String, String)>,
    next_id: u64,
    calls: usize,
}

/// A provider whose answers are scripted per `(model, prompt substring)`.
///
/// Unmatched prompts get a unique generated sentence. Enforces a single
/// resident model exactly like the real providers.
#[derive(Default)]
pub struct ScriptedProvider {
    rules: Vec<(String, String, Reply)>,
    failing_loads: HashSet<String>,
    log: Mutex<Log>,
}

impl ScriptedProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer prompts for `model` containing `needle` with `reply`.
    pub fn reply(mut self, model: &str, needle: &str, reply: Reply) -> Self {
        self.rules.push((model.into(), needle.into(), reply));
        self
    }

    pub fn fail_load(mut self, model: &str) -> Self {
        self.failing_loads.insert(model.into());
        self
    }

    pub fn resident(&self) -> usize {
        usize::from(self.log.lock().unwrap().resident.is_some())
    }

    pub fn max_resident(&self) -> usize {
        self.log.lock().unwrap().max_resident
    }

    pub fn acquisitions(&self) -> Vec<String> {
        self.log.lock().unwrap().acquisitions.clone()
    }

    pub fn releases(&self) -> usize {
        self.log.lock().unwrap().releases
    }

    /// `(model, prompt)` of every generation call, in order.
    pub fn prompts(&self) -> Vec<(String, String)> {
        self.log.lock().unwrap().prompts.clone()
    }
}

#[async_trait]
impl GenerationProvider for ScriptedProvider {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn acquire(&self, model: &str) -> Result<ModelHandle, ProviderError> {
        let mut log = self.log.lock().unwrap();
        if let Some((_, resident)) = log.resident.clone() {
            // A second concurrent acquisition is a scheduler bug; count it.
            log.max_resident = 2;
            return Err(ProviderError::DeviceBusy { resident });
        }
        log.acquisitions.push(model.to_string());
        if self.failing_loads.contains(model) {
            return Err(ProviderError::ModelLoad {
                model: model.into(),
                reason: "injected failure".into(),
            });
        }
        log.next_id += 1;
        let id = log.next_id;
        log.resident = Some((id, model.to_string()));
        log.max_resident = log.max_resident.max(1);
        Ok(ModelHandle::new(id, model))
    }

    fn release(&self, handle: ModelHandle) {
        let mut log = self.log.lock().unwrap();
        assert_eq!(
            log.resident.as_ref().map(|(id, _)| *id),
            Some(handle.id()),
            "released a handle that is not resident"
        );
        log.resident = None;
        log.releases += 1;
    }

    async fn generate(
        &self,
        handle: &ModelHandle,
        request: GenerationRequest,
    ) -> Result<Generation, ProviderError> {
        let reply = {
            let mut log = self.log.lock().unwrap();
            assert_eq!(
                log.resident.as_ref().map(|(id, _)| *id),
                Some(handle.id()),
                "generate on a model that is not resident"
            );
            log.prompts
                .push((handle.model().to_string(), request.prompt.clone()));
            log.calls += 1;
            let call = log.calls;
            self.rules
                .iter()
                .find(|(model, needle, _)| model == handle.model() && request.prompt.contains(needle.as_str()))
                .map(|(_, _, reply)| reply.clone())
                .unwrap_or_else(|| {
                    Reply::Text(format!("Generated by {} on call {call}.", handle.model()))
                })
        };

        match reply {
            Reply::Text(text) => Ok(Generation {
                usage: Some(Usage {
                    input_tokens: 100,
                    output_tokens: 20,
                }),
                text,
            }),
            Reply::Fail => Err(ProviderError::Generation("scripted failure".into())),
            Reply::Hang => {
                std::future::pending::<()>().await;
                unreachable!()
            }
        }
    }
}
