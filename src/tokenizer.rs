//! Local token counting for usage fallback.
//!
//! The gateway usually reports usage itself; when it does not, prompt and
//! completion tokens are counted here with the `cl100k_base` encoding. If
//! the encoder cannot be loaded, counts degrade to a bytes/4 estimate.

use std::sync::OnceLock;

use tiktoken_rs::CoreBPE;

use crate::protocol::{ChatMessage, Tool, ToolCall};

static ENCODER: OnceLock<Option<CoreBPE>> = OnceLock::new();

fn encoder() -> Option<&'static CoreBPE> {
    ENCODER.get_or_init(|| tiktoken_rs::cl100k_base().ok()).as_ref()
}

/// Rough token estimate used when no encoder is available.
#[must_use]
pub fn estimate_tokens(text: &str) -> u64 {
    text.len().div_ceil(4) as u64
}

/// Count tokens in a single string.
#[must_use]
pub fn count_text(text: &str) -> u64 {
    match encoder() {
        Some(bpe) => bpe.encode_with_special_tokens(text).len() as u64,
        None => estimate_tokens(text),
    }
}

/// Count tokens of a synthesized assistant reply: its content plus the name
/// and argument text of every accumulated tool call.
#[must_use]
pub fn count_completion(content: &str, tool_calls: &[ToolCall]) -> u64 {
    let mut total = count_text(content);
    for call in tool_calls {
        total = total.saturating_add(count_text(&call.function.name));
        total = total.saturating_add(count_text(&call.function.arguments));
    }
    total
}

/// Count prompt tokens for a chat request: per-message framing overhead plus
/// the encoded message fields, plus any tool definitions.
#[must_use]
pub fn count_messages(messages: &[ChatMessage], tools: &[Tool]) -> u64 {
    let mut total: u64 = 0;
    for message in messages {
        // Every message carries a fixed framing cost.
        total = total.saturating_add(3);
        total = total.saturating_add(count_text(message.role.as_str()));
        if let Some(content) = &message.content {
            total = total.saturating_add(count_text(content));
        }
        if let Some(name) = &message.name {
            total = total.saturating_add(count_text(name));
            total = total.saturating_add(1);
        }
    }
    // Replies are primed with an assistant header.
    total = total.saturating_add(3);

    for tool in tools {
        if let Ok(serialized) = serde_json::to_string(tool) {
            total = total.saturating_add(count_text(&serialized));
        }
    }
    total
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_estimate_rounds_up() {
        assert_eq!(estimate_tokens(""), 0);
        assert_eq!(estimate_tokens("abc"), 1);
        assert_eq!(estimate_tokens("abcde"), 2);
    }

    #[test]
    fn test_count_text_nonzero_for_text() {
        assert!(count_text("Hello, world!") > 0);
        assert_eq!(count_text(""), 0);
    }

    #[test]
    fn test_count_messages_includes_framing() {
        let messages = [ChatMessage::user("hi")];
        // 3 per message + 3 primer, plus role and content tokens.
        assert!(count_messages(&messages, &[]) >= 6);
    }

    #[test]
    fn test_completion_count_includes_tool_calls() {
        use crate::protocol::{FunctionCall, ToolCall};
        let call = ToolCall {
            id: "call_1".to_string(),
            type_: "function".to_string(),
            function: FunctionCall {
                name: "query".to_string(),
                arguments: "{\"key\":\"val\"}".to_string(),
            },
        };
        let with_call = count_completion("", std::slice::from_ref(&call));
        assert!(with_call > 0);
        assert!(count_completion("plus text", std::slice::from_ref(&call)) > with_call);
    }

    #[test]
    fn test_tools_add_tokens() {
        let messages = [ChatMessage::user("hi")];
        let tool = Tool::function(
            "get_weather",
            "Look up current weather",
            serde_json::json!({"type": "object", "properties": {}}),
        );
        let with_tools = count_messages(&messages, std::slice::from_ref(&tool));
        let without = count_messages(&messages, &[]);
        assert!(with_tools > without);
    }
}
