//! High-level gateway client.

use std::time::Instant;

use bytes::Bytes;
use futures_util::stream::Stream;
use reqwest::header::CONTENT_TYPE;
use serde_json::{json, Map, Value};
use tracing::info;

use crate::config::GatewayConfig;
use crate::error::{extract_error_message, InvokeError};
use crate::protocol::result::{ChatChunk, ChatResult};
use crate::protocol::{ChatMessage, ChatResponse, Tool};
use crate::stream::finalizer::{complete_from_response, PromptContext};
use crate::stream::{chat_stream, collect_stream, ByteStream};
use crate::transport::Transport;

/// Parameters of one chat invocation.
#[derive(Debug, Clone)]
pub struct ChatParams {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    pub tools: Vec<Tool>,
    pub stop: Vec<String>,
    pub user: Option<String>,
    /// Pass-through sampling parameters such as `temperature` and
    /// `max_tokens`. A string `response_format` is normalized to the object
    /// form the gateway expects.
    pub model_parameters: Map<String, Value>,
}

impl ChatParams {
    #[must_use]
    pub fn new(model: impl Into<String>, messages: Vec<ChatMessage>) -> Self {
        Self {
            model: model.into(),
            messages,
            tools: Vec::new(),
            stop: Vec::new(),
            user: None,
            model_parameters: Map::new(),
        }
    }

    fn prompt_context(&self) -> PromptContext {
        PromptContext {
            messages: self.messages.clone(),
            tools: self.tools.clone(),
        }
    }
}

/// Client for an OpenAI-compatible chat gateway.
#[derive(Debug, Clone)]
pub struct GatewayClient {
    config: GatewayConfig,
    transport: Transport,
}

impl GatewayClient {
    /// # Errors
    ///
    /// Returns `InvokeError::Config` when the transport cannot be built.
    pub fn new(config: GatewayConfig) -> Result<Self, InvokeError> {
        let transport = Transport::new(&config)?;
        Ok(Self { config, transport })
    }

    /// Invoke the model without streaming.
    ///
    /// # Errors
    ///
    /// Maps non-success statuses through the upstream error mapping and
    /// rejects bodies that parse as neither a response nor an event stream.
    pub async fn chat(&self, params: &ChatParams) -> Result<ChatResult, InvokeError> {
        let started = Instant::now();
        let (url, body) = self.prepare(params, false)?;
        info!(model = %params.model, stream = false, "invoking chat completion");
        let response = self
            .transport
            .post_json(&url, &self.config.headers(), &body)
            .await?;

        let status = response.status().as_u16();
        let streamed_body = content_type_is_event_stream(&response);
        let text = response.text().await?;
        if status != 200 {
            let message = extract_error_message(status, &text);
            return Err(InvokeError::from_upstream_status(status, message));
        }

        let prompt = params.prompt_context();
        let mut result = if streamed_body || text.trim_start().starts_with("data:") {
            // Mislabeled body: the gateway streamed despite stream=false.
            reassemble_text(&params.model, text, prompt).await?
        } else {
            let parsed: ChatResponse = serde_json::from_str(&text)
                .map_err(|err| InvokeError::InvalidResponse(err.to_string()))?;
            complete_from_response(&params.model, parsed, &prompt, started.elapsed())
        };

        if !params.stop.is_empty() {
            result.message.content = enforce_stop_tokens(&result.message.content, &params.stop);
        }
        Ok(result)
    }

    /// Invoke the model with streaming, yielding reassembled delta results.
    ///
    /// A body that decodes no chunks is reparsed as a plain JSON response;
    /// if that also fails the stream yields `InvokeError::EmptyStream`.
    ///
    /// # Errors
    ///
    /// Returns an error for request failures and non-success statuses; errors
    /// after the response starts arrive as stream items.
    pub async fn chat_stream(
        &self,
        params: &ChatParams,
    ) -> Result<impl Stream<Item = Result<ChatChunk, InvokeError>>, InvokeError> {
        let (url, body) = self.prepare(params, true)?;
        info!(model = %params.model, stream = true, "invoking chat completion");
        let response = self
            .transport
            .post_json(&url, &self.config.headers(), &body)
            .await?;

        let status = response.status().as_u16();
        if status != 200 {
            let text = response.text().await.unwrap_or_default();
            let message = extract_error_message(status, &text);
            return Err(InvokeError::from_upstream_status(status, message));
        }

        if !content_type_is_event_stream(&response) {
            // Mislabeled body: the gateway answered with plain JSON despite
            // stream=true. Read it whole and run it through the pipeline,
            // which reparses undecodable bodies as non-streaming responses.
            let text = response.text().await?;
            let bytes: ByteStream = Box::pin(futures_util::stream::once(async move {
                Ok::<_, reqwest::Error>(Bytes::from(text))
            }));
            return Ok(chat_stream(bytes, params.model.clone(), params.prompt_context()));
        }

        let bytes: ByteStream = Box::pin(response.bytes_stream());
        Ok(chat_stream(bytes, params.model.clone(), params.prompt_context()))
    }

    /// Check the configured credentials with a minimal completion request.
    ///
    /// # Errors
    ///
    /// Returns `InvokeError::CredentialsValidation` unless the gateway
    /// answers 200 with a body that contains choices.
    pub async fn validate_credentials(&self, model: &str) -> Result<(), InvokeError> {
        let url = self.config.endpoint(model)?;
        let body = json!({
            "messages": [{"role": "user", "content": "ping"}],
            "max_tokens": 10,
            "temperature": 0.1,
            "stream": false,
        });
        let response = self
            .transport
            .post_json(&url, &self.config.headers(), &body)
            .await?;
        let status = response.status().as_u16();
        let text = response.text().await?;
        if status != 200 {
            let message = extract_error_message(status, &text);
            return Err(InvokeError::CredentialsValidation(message));
        }
        let has_choices = serde_json::from_str::<Value>(&text)
            .ok()
            .is_some_and(|v| v.get("choices").is_some());
        if !has_choices {
            return Err(InvokeError::CredentialsValidation(
                "response body has no choices".to_string(),
            ));
        }
        Ok(())
    }

    fn prepare(&self, params: &ChatParams, stream: bool) -> Result<(String, Value), InvokeError> {
        let url = self.config.endpoint(&params.model)?;
        Ok((url, build_body(params, stream)?))
    }
}

fn build_body(params: &ChatParams, stream: bool) -> Result<Value, InvokeError> {
    let mut body = Map::new();
    for (key, value) in &params.model_parameters {
        body.insert(key.clone(), normalize_parameter(key, value));
    }
    body.insert(
        "messages".to_string(),
        serde_json::to_value(&params.messages)
            .map_err(|err| InvokeError::Config(err.to_string()))?,
    );
    body.insert("stream".to_string(), Value::Bool(stream));
    if !params.tools.is_empty() {
        body.insert(
            "tools".to_string(),
            serde_json::to_value(&params.tools)
                .map_err(|err| InvokeError::Config(err.to_string()))?,
        );
        body.entry("tool_choice".to_string())
            .or_insert_with(|| Value::String("auto".to_string()));
    }
    if !params.stop.is_empty() {
        body.insert(
            "stop".to_string(),
            Value::Array(params.stop.iter().cloned().map(Value::String).collect()),
        );
    }
    if let Some(user) = &params.user {
        body.insert("user".to_string(), Value::String(user.clone()));
    }
    Ok(Value::Object(body))
}

/// A bare-string `response_format` becomes `{"type": <value>}`.
fn normalize_parameter(key: &str, value: &Value) -> Value {
    if key == "response_format" {
        if let Value::String(kind) = value {
            return json!({"type": kind});
        }
    }
    value.clone()
}

/// Truncate content at the first occurrence of any stop token.
#[must_use]
pub fn enforce_stop_tokens(content: &str, stop: &[String]) -> String {
    let cut = stop
        .iter()
        .filter(|token| !token.is_empty())
        .filter_map(|token| content.find(token.as_str()))
        .min();
    match cut {
        Some(index) => content[..index].to_string(),
        None => content.to_string(),
    }
}

/// Run a complete in-memory body through the stream pipeline.
async fn reassemble_text(
    model: &str,
    text: String,
    prompt: PromptContext,
) -> Result<ChatResult, InvokeError> {
    let bytes: ByteStream = Box::pin(futures_util::stream::once(async move {
        Ok::<_, reqwest::Error>(Bytes::from(text))
    }));
    collect_stream(chat_stream(bytes, model, prompt)).await
}

fn content_type_is_event_stream(response: &reqwest::Response) -> bool {
    response
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.starts_with("text/event-stream"))
}
