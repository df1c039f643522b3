//! LLM collaborator port.
//!
//! The model is an opaque decision-maker: given a message list and optional
//! tool specs it returns either text or a structured tool call. On the
//! hybrid path its verdict on whether/which tool to call is authoritative.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

/// Role of a chat message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    /// System instruction.
    System,
    /// End-user utterance.
    User,
    /// Model output.
    Assistant,
    /// Tool result fed back to the model.
    Tool,
}

/// One chat message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    /// Message role.
    pub role: ChatRole,
    /// Message content.
    pub content: String,
}

impl ChatMessage {
    /// Create a system message.
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::System,
            content: content.into(),
        }
    }

    /// Create a user message.
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::User,
            content: content.into(),
        }
    }

    /// Create an assistant message.
    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::Assistant,
            content: content.into(),
        }
    }

    /// Create a tool-result message.
    pub fn tool(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::Tool,
            content: content.into(),
        }
    }
}

/// Tool specification handed to the model on the hybrid path.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolSpec {
    /// Tool name.
    pub name: String,
    /// Human-readable description.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// JSON Schema for input parameters.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub input_schema: Option<Value>,
}

/// Model reply: plain text or a structured tool call.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "lowercase", tag = "kind")]
pub enum LlmReply {
    /// Plain text answer.
    Text {
        /// The answer text.
        content: String,
    },
    /// The model chose to call a tool.
    ToolCall {
        /// Name of the tool to call.
        name: String,
        /// Arguments for the call.
        arguments: Map<String, Value>,
    },
}

/// Errors from the LLM collaborator.
#[derive(Debug, Error)]
pub enum LlmError {
    /// The provider is not reachable or not configured.
    #[error("LLM provider unavailable: {0}")]
    Unavailable(String),

    /// The provider returned a failure.
    #[error("LLM provider error: {0}")]
    Provider(String),
}

/// Port for the LLM collaborator.
#[async_trait]
pub trait ChatModel: Send + Sync {
    /// Complete a conversation, optionally offering tool specs the model may
    /// choose to call.
    async fn complete(
        &self,
        messages: &[ChatMessage],
        tools: &[ToolSpec],
    ) -> Result<LlmReply, LlmError>;
}
