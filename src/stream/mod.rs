//! Streamed invocation pipeline.
//!
//! Raw response bytes flow through three stages: the [`decoder`] turns bytes
//! into wire chunks, the [`translator`] turns wire chunks into delta results
//! while assembling tool calls, and the [`finalizer`] settles usage and
//! closes the stream. [`chat_stream`] wires the stages into one async
//! `Stream` of results.

pub mod accumulator;
pub mod decoder;
pub mod finalizer;
pub mod translator;

use std::collections::VecDeque;
use std::pin::Pin;
use std::time::Instant;

use bytes::Bytes;
use futures_util::stream::{unfold, Stream, StreamExt};
use tracing::warn;

use crate::error::InvokeError;
use crate::protocol::result::{ChatChunk, ChatResult};
use crate::protocol::{ChatResponse, FinishReason};
use decoder::{Frame, FrameDecoder};
use finalizer::PromptContext;
use translator::ChunkTranslator;

/// Raw response body as produced by `reqwest::Response::bytes_stream`.
pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Bytes, reqwest::Error>> + Send>>;

enum Phase {
    Reading,
    Finalizing,
    Done,
}

struct StreamState {
    bytes: ByteStream,
    decoder: FrameDecoder,
    translator: ChunkTranslator,
    prompt: PromptContext,
    started: Instant,
    /// Body bytes captured until the first chunk decodes, kept so an
    /// empty stream can be reparsed as a plain JSON response.
    raw_body: Vec<u8>,
    pending: VecDeque<ChatChunk>,
    phase: Phase,
}

impl StreamState {
    fn ingest(&mut self, data: &[u8]) {
        if self.translator.chunk_count() == 0 {
            self.raw_body.extend_from_slice(data);
        }
        self.decoder.push(data);
        self.drain_decoder();
    }

    fn drain_decoder(&mut self) {
        while let Some(frame) = self.decoder.next_frame() {
            match frame {
                Frame::Chunk(chunk) => {
                    self.pending.extend(self.translator.apply(chunk));
                    if !self.raw_body.is_empty() {
                        self.raw_body = Vec::new();
                    }
                }
                Frame::Done => {
                    self.phase = Phase::Finalizing;
                    return;
                }
            }
        }
    }

    fn on_eof(&mut self) {
        if let Some(Frame::Chunk(chunk)) = self.decoder.finish() {
            self.pending.extend(self.translator.apply(chunk));
            self.raw_body = Vec::new();
        }
        self.phase = Phase::Finalizing;
    }

    /// Close the stream: either the normal terminal chunk, or the
    /// empty-stream fallback when nothing decoded.
    fn finalize(&mut self) -> Result<ChatChunk, InvokeError> {
        let latency = self.started.elapsed();
        if self.translator.chunk_count() > 0 {
            return Ok(finalizer::final_chunk(&self.translator, &self.prompt, latency));
        }

        // Some gateways answer with a plain JSON body under a streaming
        // content type. Reinterpret the captured body before giving up.
        match serde_json::from_slice::<ChatResponse>(&self.raw_body) {
            Ok(response) if !response.choices.is_empty() => {
                warn!("stream produced no chunks, body reparsed as non-streaming response");
                let result = finalizer::complete_from_response(
                    self.translator.model(),
                    response,
                    &self.prompt,
                    latency,
                );
                Ok(result_as_chunk(result))
            }
            _ => Err(InvokeError::EmptyStream),
        }
    }
}

fn result_as_chunk(result: ChatResult) -> ChatChunk {
    ChatChunk {
        model: result.model,
        index: 0,
        message: result.message,
        finish_reason: Some(FinishReason::Stop),
        usage: Some(result.usage),
        system_fingerprint: result.system_fingerprint,
    }
}

/// Reassemble a streamed chat completion from its raw response bytes.
///
/// Yields one [`ChatChunk`] per content delta, then a terminal chunk with a
/// `stop` finish reason and settled usage. Transport failures mid-stream and
/// the empty-stream case surface as `Err` items, after which the stream ends.
pub fn chat_stream(
    bytes: ByteStream,
    model: impl Into<String>,
    prompt: PromptContext,
) -> impl Stream<Item = Result<ChatChunk, InvokeError>> {
    let state = StreamState {
        bytes,
        decoder: FrameDecoder::new(),
        translator: ChunkTranslator::new(model),
        prompt,
        started: Instant::now(),
        raw_body: Vec::new(),
        pending: VecDeque::new(),
        phase: Phase::Reading,
    };

    unfold(state, |mut state| async move {
        loop {
            if let Some(chunk) = state.pending.pop_front() {
                return Some((Ok(chunk), state));
            }
            match state.phase {
                Phase::Done => return None,
                Phase::Finalizing => {
                    let item = state.finalize();
                    state.phase = Phase::Done;
                    return Some((item, state));
                }
                Phase::Reading => match state.bytes.next().await {
                    Some(Ok(data)) => state.ingest(&data),
                    Some(Err(err)) => {
                        state.phase = Phase::Done;
                        return Some((Err(InvokeError::Connection(err.to_string())), state));
                    }
                    None => state.on_eof(),
                },
            }
        }
    })
}

/// Fold a chunk stream into a single result, concatenating content deltas.
///
/// The terminal chunk supplies usage; the tool-call snapshot is taken from
/// the chunk that carries one.
///
/// # Errors
///
/// Propagates the first `Err` item from the stream.
pub async fn collect_stream(
    stream: impl Stream<Item = Result<ChatChunk, InvokeError>>,
) -> Result<ChatResult, InvokeError> {
    futures_util::pin_mut!(stream);
    let mut model = String::new();
    let mut content = String::new();
    let mut tool_calls = Vec::new();
    let mut usage = None;
    let mut system_fingerprint = None;
    while let Some(chunk) = stream.next().await {
        let chunk = chunk?;
        model = chunk.model;
        content.push_str(&chunk.message.content);
        if !chunk.message.tool_calls.is_empty() {
            tool_calls = chunk.message.tool_calls;
        }
        if chunk.usage.is_some() {
            usage = chunk.usage;
        }
        if chunk.system_fingerprint.is_some() {
            system_fingerprint = chunk.system_fingerprint;
        }
    }
    Ok(ChatResult {
        model,
        message: crate::protocol::result::AssistantMessage::with_tool_calls(content, tool_calls),
        usage: usage.unwrap_or_default(),
        system_fingerprint,
    })
}
