use serde::Serialize;

use super::{FinishReason, ToolCall};

/// The assistant message assembled from a response or a stream delta.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct AssistantMessage {
    pub content: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCall>,
}

impl AssistantMessage {
    #[must_use]
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            tool_calls: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_tool_calls(content: impl Into<String>, tool_calls: Vec<ToolCall>) -> Self {
        Self {
            content: content.into(),
            tool_calls,
        }
    }
}

/// Token usage and cost for a completed invocation.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct LlmUsage {
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    pub total_tokens: u64,
    pub prompt_price: f64,
    pub completion_price: f64,
    pub total_price: f64,
    pub currency: String,
    /// Wall-clock seconds from request start to result.
    pub latency: f64,
}

/// One output delta of a streamed invocation.
///
/// Per-frame chunks carry the frame's content fragment; the chunk whose
/// `finish_reason` is [`FinishReason::ToolCalls`] carries the full accumulated
/// tool-call snapshot; the terminal chunk carries empty content, a `stop`
/// finish reason, and the computed usage.
#[derive(Debug, Clone, Serialize)]
pub struct ChatChunk {
    pub model: String,
    pub index: u32,
    pub message: AssistantMessage,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finish_reason: Option<FinishReason>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub usage: Option<LlmUsage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system_fingerprint: Option<String>,
}

/// The result of a non-streaming invocation.
#[derive(Debug, Clone, Serialize)]
pub struct ChatResult {
    pub model: String,
    pub message: AssistantMessage,
    pub usage: LlmUsage,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system_fingerprint: Option<String>,
}
