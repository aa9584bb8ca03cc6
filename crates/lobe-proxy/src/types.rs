//! OpenAI chat completions wire types.
//!
//! Callers speak (a subset of) OpenAI's `/v1/chat/completions` API. The
//! upstream accepts nearly the same request body, so the same message type is
//! reused in both directions.
//!
//! Notes:
//! - Roles are kept as plain strings; unknown roles pass through untouched.
//! - `content` is kept as raw JSON so multi-part content is forwarded as-is.

use serde::{Deserialize, Serialize};

pub const ROLE_ASSISTANT: &str = "assistant";
pub const FINISH_REASON_STOP: &str = "stop";
pub const OBJECT_COMPLETION: &str = "chat.completion";
pub const OBJECT_COMPLETION_CHUNK: &str = "chat.completion.chunk";

/// A chat message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    #[serde(default)]
    pub content: serde_json::Value,
}

impl ChatMessage {
    pub fn new(role: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: role.into(),
            content: serde_json::Value::String(content.into()),
        }
    }
}

/// Request body for `/v1/chat/completions`.
///
/// `messages` is optional at the serde level so a missing field can be
/// reported with the proxy's own error envelope instead of a bare 400.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChatCompletionRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub messages: Option<Vec<ChatMessage>>,
    #[serde(default)]
    pub stream: bool,
}

impl ChatCompletionRequest {
    pub fn model_or<'a>(&'a self, default_model: &'a str) -> &'a str {
        self.model
            .as_deref()
            .filter(|m| !m.is_empty())
            .unwrap_or(default_model)
    }

    pub fn message_count(&self) -> usize {
        self.messages.as_ref().map_or(0, Vec::len)
    }
}

/// Aggregated (non-streaming) response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatCompletionResponse {
    pub id: String,
    pub object: String,
    pub created: i64,
    pub model: String,
    pub system_fingerprint: Option<String>,
    pub choices: Vec<Choice>,
    pub usage: Usage,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Choice {
    pub index: u32,
    pub finish_reason: String,
    pub message: ChoiceMessage,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChoiceMessage {
    pub role: String,
    pub content: String,
}

/// Token usage. The upstream does not report counts, so these stay zero.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

/// One incremental streaming envelope (`chat.completion.chunk`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatCompletionChunk {
    pub id: String,
    pub object: String,
    pub created: i64,
    pub model: String,
    pub system_fingerprint: Option<String>,
    pub choices: Vec<ChunkChoice>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkChoice {
    pub index: u32,
    pub delta: ChunkDelta,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkDelta {
    pub content: String,
    pub role: String,
    pub finish_reason: Option<String>,
}

/// Body of every error response: `{status: false, error: {message, type}}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorEnvelope {
    pub status: bool,
    pub error: ErrorBody,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorBody {
    pub message: String,
    #[serde(rename = "type")]
    pub kind: String,
}

impl ErrorEnvelope {
    pub fn new(message: impl Into<String>, kind: impl Into<String>) -> Self {
        Self {
            status: false,
            error: ErrorBody {
                message: message.into(),
                kind: kind.into(),
            },
        }
    }
}
