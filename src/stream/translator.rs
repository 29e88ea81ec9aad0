//! Translation of decoded wire chunks into delta results.
//!
//! Each decoded chunk yields at most one delta per choice. Frames that only
//! carry usage (no choices) are recorded for the finalizer and produce no
//! output. The assembled tool-call snapshot is attached exactly once, on the
//! choice whose finish reason is `tool_calls`.

use crate::protocol::result::{AssistantMessage, ChatChunk};
use crate::protocol::{FinishReason, StreamChunk, Usage};
use crate::stream::accumulator::ToolCallAccumulator;

/// Folds decoded chunks into delta results while tracking stream-level state.
#[derive(Debug)]
pub struct ChunkTranslator {
    model: String,
    chunk_count: u64,
    usage: Option<Usage>,
    system_fingerprint: Option<String>,
    tool_calls: ToolCallAccumulator,
    completion_text: String,
}

impl ChunkTranslator {
    #[must_use]
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            chunk_count: 0,
            usage: None,
            system_fingerprint: None,
            tool_calls: ToolCallAccumulator::new(),
            completion_text: String::new(),
        }
    }

    /// Number of chunks decoded so far.
    #[must_use]
    pub fn chunk_count(&self) -> u64 {
        self.chunk_count
    }

    /// Usage reported by the gateway, if any frame carried one.
    #[must_use]
    pub fn reported_usage(&self) -> Option<&Usage> {
        self.usage.as_ref()
    }

    #[must_use]
    pub fn system_fingerprint(&self) -> Option<&str> {
        self.system_fingerprint.as_deref()
    }

    /// All content emitted so far, concatenated. Used for the local token
    /// count when the gateway never reports completion usage.
    #[must_use]
    pub fn completion_text(&self) -> &str {
        &self.completion_text
    }

    #[must_use]
    pub fn model(&self) -> &str {
        &self.model
    }

    /// The tool calls assembled so far.
    #[must_use]
    pub fn tool_call_snapshot(&self) -> Vec<crate::protocol::ToolCall> {
        self.tool_calls.snapshot()
    }

    /// Translate one decoded chunk into zero or more delta results.
    pub fn apply(&mut self, chunk: StreamChunk) -> Vec<ChatChunk> {
        self.chunk_count += 1;
        if let Some(usage) = chunk.usage {
            self.usage = Some(usage);
        }
        if let Some(fingerprint) = chunk.system_fingerprint {
            self.system_fingerprint = Some(fingerprint);
        }

        let mut out = Vec::with_capacity(chunk.choices.len());
        for choice in chunk.choices {
            for fragment in choice.delta.tool_calls.iter().flatten() {
                self.tool_calls.apply(fragment);
            }

            let content = choice.delta.content.unwrap_or_default();
            self.completion_text.push_str(&content);
            let message = if choice.finish_reason == Some(FinishReason::ToolCalls) {
                AssistantMessage::with_tool_calls(content, self.tool_calls.snapshot())
            } else {
                AssistantMessage::new(content)
            };

            out.push(ChatChunk {
                model: self.model.clone(),
                index: choice.index,
                message,
                finish_reason: choice.finish_reason,
                usage: None,
                system_fingerprint: self.system_fingerprint.clone(),
            });
        }
        out
    }
}
