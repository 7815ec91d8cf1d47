//! Free-form chat against a single model.
//!
//! A chat reply is a one-stage run: the chat model is acquired, asked once
//! and released before the reply is returned.

use crate::filter::trim_prompt_echo;
use crate::scheduler::{ResidencyAudit, ResidencyGuard};
use docsmith_core::error::{Error, ProviderError};
use docsmith_core::provider::{GenerationProvider, GenerationRequest, SamplingConfig};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::info;

/// Audit label for the chat model's residency.
pub const CHAT_STAGE: &str = "chat";

const CHAT_MAX_OUTPUT_TOKENS: u32 = 1024;
const CHAT_TEMPERATURE: f32 = 0.7;
const CHAT_REPETITION_PENALTY: f32 = 1.1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    User,
    Assistant,
}

impl ChatRole {
    /// `"user"` is the user; any other role name is the assistant.
    pub fn from_name(name: &str) -> Self {
        if name.eq_ignore_ascii_case("user") {
            Self::User
        } else {
            Self::Assistant
        }
    }

    fn label(self) -> &'static str {
        match self {
            Self::User => "User",
            Self::Assistant => "Assistant",
        }
    }
}

/// A history entry as clients send it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn new(role: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: role.into(),
            content: content.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatTurn {
    pub role: ChatRole,
    pub content: String,
}

/// Strictly alternating turns ending with the user's `message`.
///
/// A history entry whose role repeats the previous kept turn is dropped. If
/// the history already ends on a user turn, `message` is appended to it on a
/// new line instead of opening another turn.
pub fn build_conversation(history: &[ChatMessage], message: &str) -> Vec<ChatTurn> {
    let mut turns: Vec<ChatTurn> = Vec::with_capacity(history.len() + 1);
    for entry in history {
        let role = ChatRole::from_name(&entry.role);
        if turns.last().is_some_and(|t| t.role == role) {
            continue;
        }
        turns.push(ChatTurn {
            role,
            content: entry.content.clone(),
        });
    }

    match turns.last_mut() {
        Some(last) if last.role == ChatRole::User => {
            last.content.push('\n');
            last.content.push_str(message);
        }
        _ => turns.push(ChatTurn {
            role: ChatRole::User,
            content: message.to_string(),
        }),
    }
    turns
}

/// Render turns as one prompt; the provider wraps it in the model's own
/// chat template.
pub fn render_conversation(turns: &[ChatTurn]) -> String {
    let mut prompt = String::from(
        "Continue the conversation below as the assistant. Reply to the last user message only.\n",
    );
    for turn in turns {
        prompt.push_str(&format!("\n{}: {}\n", turn.role.label(), turn.content.trim()));
    }
    prompt
}

pub fn chat_request(turns: &[ChatTurn]) -> GenerationRequest {
    GenerationRequest::new(render_conversation(turns), CHAT_MAX_OUTPUT_TOKENS).with_sampling(
        SamplingConfig {
            temperature: CHAT_TEMPERATURE,
            repetition_penalty: Some(CHAT_REPETITION_PENALTY),
            top_p: None,
        },
    )
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatReply {
    pub reply: String,
    pub model: String,
}

/// Acquire `model`, generate one reply and release the model on every path.
pub async fn reply(
    provider: &dyn GenerationProvider,
    model: &str,
    history: &[ChatMessage],
    message: &str,
    timeout: Option<Duration>,
) -> Result<ChatReply, Error> {
    let turns = build_conversation(history, message);
    let request = chat_request(&turns);

    let mut audit = ResidencyAudit::default();
    let guard = ResidencyGuard::acquire(provider, model, CHAT_STAGE, &mut audit).await?;
    let result = match guard.resident() {
        Some(resident) => match timeout {
            Some(limit) => tokio::time::timeout(limit, resident.generate(request))
                .await
                .unwrap_or_else(|_| {
                    Err(ProviderError::Timeout {
                        model: model.to_string(),
                        timeout_secs: limit.as_secs(),
                    })
                }),
            None => resident.generate(request).await,
        },
        None => Err(ProviderError::Generation("model handle missing".into())),
    };
    guard.release();

    let generation = result?;
    let reply = trim_prompt_echo(&generation.text).trim().to_string();
    info!(model, turns = turns.len(), reply_chars = reply.len(), "Chat reply generated");
    Ok(ChatReply {
        reply,
        model: model.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{Reply, ScriptedProvider};

    fn history(entries: &[(&str, &str)]) -> Vec<ChatMessage> {
        entries
            .iter()
            .map(|(role, content)| ChatMessage::new(*role, *content))
            .collect()
    }

    #[test]
    fn repeated_roles_are_dropped() {
        let turns = build_conversation(
            &history(&[
                ("user", "hi"),
                ("user", "anyone?"),
                ("model", "hello"),
                ("assistant", "still here"),
            ]),
            "what does main.rs do?",
        );
        let roles: Vec<ChatRole> = turns.iter().map(|t| t.role).collect();
        assert_eq!(roles, [ChatRole::User, ChatRole::Assistant, ChatRole::User]);
        assert_eq!(turns[0].content, "hi");
        assert_eq!(turns[1].content, "hello");
        assert_eq!(turns[2].content, "what does main.rs do?");
    }

    #[test]
    fn trailing_user_turn_absorbs_message() {
        let turns = build_conversation(
            &history(&[("assistant", "ask away"), ("user", "first")]),
            "second",
        );
        assert_eq!(turns.len(), 2);
        assert_eq!(turns[1].role, ChatRole::User);
        assert_eq!(turns[1].content, "first\nsecond");
    }

    #[test]
    fn empty_history_is_one_user_turn() {
        let turns = build_conversation(&[], "hello");
        assert_eq!(
            turns,
            [ChatTurn {
                role: ChatRole::User,
                content: "hello".into()
            }]
        );
    }

    #[test]
    fn request_carries_chat_sampling() {
        let turns = build_conversation(&history(&[("assistant", "hey")]), "explain");
        let request = chat_request(&turns);
        assert_eq!(request.max_output_tokens, 1024);
        assert_eq!(request.sampling.temperature, 0.7);
        assert_eq!(request.sampling.repetition_penalty, Some(1.1));
        assert!(request.prompt.contains("\nAssistant: hey\n\nUser: explain\n"));
    }

    #[tokio::test]
    async fn reply_releases_the_model() {
        let provider = ScriptedProvider::new().reply(
            "qwen2.5:1.5b",
            "User: explain",
            Reply::Text("echo<|assistant|>  It parses archives. ".into()),
        );

        let reply = reply(&provider, "qwen2.5:1.5b", &[], "explain", None)
            .await
            .unwrap();
        assert_eq!(reply.reply, "It parses archives.");
        assert_eq!(reply.model, "qwen2.5:1.5b");
        assert_eq!(provider.acquisitions(), ["qwen2.5:1.5b"]);
        assert_eq!(provider.releases(), 1);
        assert_eq!(provider.resident(), 0);
    }

    #[tokio::test]
    async fn failed_generation_still_releases() {
        let provider = ScriptedProvider::new().reply("tinyllama", "User:", Reply::Fail);
        let err = reply(&provider, "tinyllama", &[], "hi", None)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Provider(ProviderError::Generation(_))));
        assert_eq!(provider.releases(), 1);
        assert_eq!(provider.resident(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn timed_out_reply_still_releases() {
        let provider = ScriptedProvider::new().reply("tinyllama", "User:", Reply::Hang);
        let err = reply(&provider, "tinyllama", &[], "hi", Some(Duration::from_secs(5)))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Provider(ProviderError::Timeout { timeout_secs: 5, .. })));
        assert_eq!(provider.resident(), 0);
    }

    #[tokio::test]
    async fn load_failure_holds_nothing() {
        let provider = ScriptedProvider::new().fail_load("tinyllama");
        let err = reply(&provider, "tinyllama", &[], "hi", None)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Provider(ProviderError::ModelLoad { .. })));
        assert_eq!(provider.releases(), 0);
        assert_eq!(provider.resident(), 0);
    }
}
