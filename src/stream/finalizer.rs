//! End-of-stream accounting and the terminal chunk.
//!
//! When the byte stream ends, the finalizer settles usage (falling back to
//! local token counts when the gateway reported none), prices the invocation,
//! and produces one last chunk with a `stop` finish reason. A stream that
//! produced no chunks at all is handed back to the caller as raw bytes so it
//! can be reinterpreted as a non-streaming body.

use std::time::Duration;

use tracing::info;

use crate::pricing::{price_info, token_cost};
use crate::protocol::result::{AssistantMessage, ChatChunk, ChatResult, LlmUsage};
use crate::protocol::{ChatMessage, ChatResponse, FinishReason, Tool, ToolCall, Usage};
use crate::stream::translator::ChunkTranslator;
use crate::tokenizer;

/// Request-side context needed to settle usage after the fact.
#[derive(Debug, Clone, Default)]
pub struct PromptContext {
    pub messages: Vec<ChatMessage>,
    pub tools: Vec<Tool>,
}

/// Compute final usage for an invocation.
///
/// A reported token count of zero is treated the same as a missing one: the
/// gateway sometimes emits a usage frame before counts are known. The local
/// completion count covers the full synthesized reply, tool calls included.
#[must_use]
pub fn settle_usage(
    model: &str,
    reported: Option<&Usage>,
    prompt: &PromptContext,
    completion_text: &str,
    completion_tool_calls: &[ToolCall],
    latency: Duration,
) -> LlmUsage {
    let prompt_tokens = match reported.map(|u| u.prompt_tokens) {
        Some(n) if n > 0 => n,
        _ => tokenizer::count_messages(&prompt.messages, &prompt.tools),
    };
    let completion_tokens = match reported.map(|u| u.completion_tokens) {
        Some(n) if n > 0 => n,
        _ => tokenizer::count_completion(completion_text, completion_tool_calls),
    };

    let prices = price_info(model);
    let prompt_price = token_cost(prompt_tokens, prices.prompt_price_per_1k);
    let completion_price = token_cost(completion_tokens, prices.completion_price_per_1k);

    LlmUsage {
        prompt_tokens,
        completion_tokens,
        total_tokens: prompt_tokens + completion_tokens,
        prompt_price,
        completion_price,
        total_price: prompt_price + completion_price,
        currency: prices.currency.to_string(),
        latency: latency.as_secs_f64(),
    }
}

/// Build the terminal chunk closing a stream.
#[must_use]
pub fn final_chunk(translator: &ChunkTranslator, prompt: &PromptContext, latency: Duration) -> ChatChunk {
    let usage = settle_usage(
        translator.model(),
        translator.reported_usage(),
        prompt,
        translator.completion_text(),
        &translator.tool_call_snapshot(),
        latency,
    );
    info!(
        model = translator.model(),
        chunks = translator.chunk_count(),
        prompt_tokens = usage.prompt_tokens,
        completion_tokens = usage.completion_tokens,
        latency_secs = usage.latency,
        "stream complete"
    );
    ChatChunk {
        model: translator.model().to_string(),
        index: 0,
        message: AssistantMessage::new(""),
        finish_reason: Some(FinishReason::Stop),
        usage: Some(usage),
        system_fingerprint: translator.system_fingerprint().map(str::to_string),
    }
}

/// Assemble a [`ChatResult`] from a non-streaming response body.
///
/// Shared between the blocking invocation path and the empty-stream fallback,
/// where a gateway labels a plain JSON body as an event stream.
#[must_use]
pub fn complete_from_response(
    model: &str,
    response: ChatResponse,
    prompt: &PromptContext,
    latency: Duration,
) -> ChatResult {
    let message = response
        .choices
        .into_iter()
        .next()
        .map(|choice| {
            let content = choice.message.content.unwrap_or_default();
            match choice.message.tool_calls {
                Some(calls) if !calls.is_empty() => {
                    AssistantMessage::with_tool_calls(content, calls)
                }
                _ => AssistantMessage::new(content),
            }
        })
        .unwrap_or_default();

    let usage = settle_usage(
        model,
        response.usage.as_ref(),
        prompt,
        &message.content,
        &message.tool_calls,
        latency,
    );
    ChatResult {
        model: model.to_string(),
        message,
        usage,
        system_fingerprint: response.system_fingerprint,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{ResponseChoice, ResponseMessage};

    #[test]
    fn test_reported_usage_wins() {
        let usage = settle_usage(
            "qwen-plus",
            Some(&Usage {
                prompt_tokens: 100,
                completion_tokens: 50,
            }),
            &PromptContext::default(),
            "ignored",
            &[],
            Duration::from_millis(250),
        );
        assert_eq!(usage.prompt_tokens, 100);
        assert_eq!(usage.completion_tokens, 50);
        assert_eq!(usage.total_tokens, 150);
        assert!((usage.prompt_price - 0.0008).abs() < 1e-12);
        assert!((usage.completion_price - 0.001).abs() < 1e-12);
        assert!((usage.total_price - 0.0018).abs() < 1e-12);
        assert_eq!(usage.currency, "USD");
        assert!((usage.latency - 0.25).abs() < 1e-9);
    }

    #[test]
    fn test_zero_usage_falls_back_to_local_count() {
        let prompt = PromptContext {
            messages: vec![ChatMessage::user("Hello there")],
            tools: vec![],
        };
        let usage = settle_usage(
            "m",
            Some(&Usage {
                prompt_tokens: 0,
                completion_tokens: 0,
            }),
            &prompt,
            "General Kenobi",
            &[],
            Duration::ZERO,
        );
        assert!(usage.prompt_tokens > 0);
        assert!(usage.completion_tokens > 0);
    }

    #[test]
    fn test_fallback_counts_tool_calls_with_empty_content() {
        use crate::protocol::{FunctionCall, ToolCall};
        let calls = vec![ToolCall {
            id: "call_1".to_string(),
            type_: "function".to_string(),
            function: FunctionCall {
                name: "query".to_string(),
                arguments: "{\"key\":\"val\"}".to_string(),
            },
        }];
        let usage = settle_usage("m", None, &PromptContext::default(), "", &calls, Duration::ZERO);
        assert!(usage.completion_tokens > 0, "tool calls must be counted");
        assert!(usage.completion_price > 0.0);
    }

    #[test]
    fn test_final_chunk_shape() {
        let mut translator = ChunkTranslator::new("deepseek-v3");
        translator.apply(StreamChunkFixture::content("hi"));
        let chunk = final_chunk(&translator, &PromptContext::default(), Duration::from_secs(1));
        assert_eq!(chunk.index, 0);
        assert_eq!(chunk.message.content, "");
        assert_eq!(chunk.finish_reason, Some(FinishReason::Stop));
        let usage = chunk.usage.unwrap();
        assert!(usage.completion_tokens > 0);
        assert!((usage.latency - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_complete_from_response_with_tool_calls() {
        use crate::protocol::{FunctionCall, ToolCall};
        let response = ChatResponse {
            choices: vec![ResponseChoice {
                index: 0,
                message: ResponseMessage {
                    content: None,
                    tool_calls: Some(vec![ToolCall {
                        id: "call_1".to_string(),
                        type_: "function".to_string(),
                        function: FunctionCall {
                            name: "query".to_string(),
                            arguments: "{}".to_string(),
                        },
                    }]),
                },
                finish_reason: Some(FinishReason::ToolCalls),
            }],
            usage: Some(Usage {
                prompt_tokens: 9,
                completion_tokens: 4,
            }),
            system_fingerprint: Some("fp".to_string()),
        };
        let result = complete_from_response(
            "m",
            response,
            &PromptContext::default(),
            Duration::from_millis(10),
        );
        assert_eq!(result.message.tool_calls.len(), 1);
        assert_eq!(result.usage.prompt_tokens, 9);
        assert_eq!(result.system_fingerprint.as_deref(), Some("fp"));
    }

    // Minimal chunk builder for translator-driven tests.
    struct StreamChunkFixture;

    impl StreamChunkFixture {
        fn content(text: &str) -> crate::protocol::StreamChunk {
            crate::protocol::StreamChunk {
                choices: vec![crate::protocol::StreamChoice {
                    index: 0,
                    delta: crate::protocol::Delta {
                        content: Some(text.to_string()),
                        tool_calls: None,
                    },
                    finish_reason: None,
                }],
                usage: None,
                system_fingerprint: None,
            }
        }
    }
}
