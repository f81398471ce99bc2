use serde::{Deserialize, Serialize};

use crate::prompts::ADVISOR_SYSTEM_PROMPT;

/// Model the advisor pipe is provisioned with.
pub const ADVISOR_MODEL: &str = "openai:gpt-4o-mini";
/// Sampling temperature for advisor replies.
pub const ADVISOR_TEMPERATURE: f64 = 0.3;
/// Completion budget per round.
pub const ADVISOR_MAX_TOKENS: u32 = 2000;

/// Chat message role
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    System,
    User,
}

/// One chat message sent to the pipe
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub role: MessageRole,
    pub content: String,
}

impl Message {
    /// System message
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::System,
            content: content.into(),
        }
    }

    /// User message
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::User,
            content: content.into(),
        }
    }
}

/// Body of `POST /v1/pipes/run`
#[derive(Debug, Clone, Serialize)]
pub struct PipeRequest {
    pub name: String,
    pub messages: Vec<Message>,
    /// Rounds await whole completions, so this is always false.
    pub stream: bool,
}

impl PipeRequest {
    /// Run `name` over `messages`
    pub fn new(name: impl Into<String>, messages: Vec<Message>) -> Self {
        Self {
            name: name.into(),
            messages,
            stream: false,
        }
    }

    /// One advisory round: the standing system prompt plus the round prompt.
    pub fn round(name: impl Into<String>, prompt: &str) -> Self {
        Self::new(
            name,
            vec![Message::system(ADVISOR_SYSTEM_PROMPT), Message::user(prompt)],
        )
    }
}

/// Token accounting reported by the pipe
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Usage {
    #[serde(default)]
    pub prompt_tokens: Option<u32>,
    #[serde(default)]
    pub completion_tokens: Option<u32>,
    #[serde(default)]
    pub total_tokens: Option<u32>,
}

/// Model-level details of a run
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawResponse {
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub usage: Option<Usage>,
}

/// Reply of `POST /v1/pipes/run`
#[derive(Debug, Clone, Deserialize)]
pub struct PipeResponse {
    pub success: bool,
    #[serde(default)]
    pub completion: String,
    #[serde(rename = "threadId", default)]
    pub thread_id: Option<String>,
    #[serde(default)]
    pub raw: Option<RawResponse>,
}

impl PipeResponse {
    /// Total tokens reported by the pipe, if any.
    pub fn total_tokens(&self) -> Option<u32> {
        self.raw
            .as_ref()
            .and_then(|r| r.usage.as_ref())
            .and_then(|u| u.total_tokens)
    }
}

/// Body of `POST /v1/pipes`: the full definition of the advisor pipe.
///
/// Always sent as an upsert so a redeployed binary refreshes the prompt of
/// an existing pipe.
#[derive(Debug, Clone, Serialize)]
pub struct PipeDefinition {
    pub name: String,
    pub description: String,
    pub model: String,
    pub upsert: bool,
    pub json: bool,
    pub temperature: f64,
    pub max_tokens: u32,
    pub messages: Vec<Message>,
}

impl PipeDefinition {
    /// The forecast advisor pipe under `name`.
    pub fn advisor(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: "Forecast adjustment advisor".to_string(),
            model: ADVISOR_MODEL.to_string(),
            upsert: true,
            json: true,
            temperature: ADVISOR_TEMPERATURE,
            max_tokens: ADVISOR_MAX_TOKENS,
            messages: vec![Message::system(ADVISOR_SYSTEM_PROMPT)],
        }
    }
}

/// Reply of `POST /v1/pipes`
#[derive(Debug, Clone, Deserialize)]
pub struct PipeInfo {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
}
