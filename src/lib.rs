//! `chatgw` reassembles streamed chat completions from an OpenAI-compatible
//! gateway into whole assistant messages.
//!
//! The gateway delivers completions as `data: <json>` event-stream frames
//! whose deltas interleave text content with fragmented tool calls. This
//! crate decodes those frames incrementally, folds tool-call fragments back
//! into complete calls, settles token usage and cost, and exposes the result
//! either as an async stream of deltas or as a single assembled message.
//!
//! ```no_run
//! use chatgw::{ChatMessage, ChatParams, GatewayClient, GatewayConfig};
//! use futures_util::StreamExt;
//!
//! # async fn run() -> Result<(), chatgw::InvokeError> {
//! let config = GatewayConfig::new("https://gateway.internal/llm", "api-key");
//! let client = GatewayClient::new(config)?;
//! let params = ChatParams::new("qwen-plus", vec![ChatMessage::user("hello")]);
//! let mut stream = std::pin::pin!(client.chat_stream(&params).await?);
//! while let Some(chunk) = stream.next().await {
//!     print!("{}", chunk?.message.content);
//! }
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod config;
pub mod error;
pub mod observability;
pub mod pricing;
pub mod protocol;
pub mod stream;
pub mod tokenizer;
pub mod transport;

pub use client::{ChatParams, GatewayClient};
pub use config::GatewayConfig;
pub use error::InvokeError;
pub use protocol::result::{AssistantMessage, ChatChunk, ChatResult, LlmUsage};
pub use protocol::{ChatMessage, FinishReason, Role, Tool, ToolCall};
