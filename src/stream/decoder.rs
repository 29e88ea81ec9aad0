//! Incremental decoder from raw response bytes to chunk events.
//!
//! The gateway streams `data: <json>` lines terminated by `\n`. Bytes arrive
//! in arbitrary splits, so the decoder buffers until a full line is present.
//! Lines that are not data frames, and data frames that fail to parse, are
//! skipped; the `[DONE]` sentinel ends the stream regardless of what follows.

use memchr::memchr;
use tracing::{debug, warn};

use crate::protocol::StreamChunk;

/// Threshold past which consumed bytes are compacted out of the buffer.
const COMPACT_THRESHOLD: usize = 8 * 1024;

const DATA_PREFIX: &[u8] = b"data:";
const DONE_SENTINEL: &str = "[DONE]";

/// One decoded wire event.
#[derive(Debug)]
pub enum Frame {
    /// A parsed streaming chunk.
    Chunk(StreamChunk),
    /// The terminal sentinel was seen.
    Done,
}

/// Stateful line decoder. Feed bytes with [`push`](Self::push), then drain
/// frames with [`next_frame`](Self::next_frame) until it returns `None`.
#[derive(Debug, Default)]
pub struct FrameDecoder {
    buf: Vec<u8>,
    read_offset: usize,
    done: bool,
}

impl FrameDecoder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether the `[DONE]` sentinel has been observed.
    #[must_use]
    pub fn is_done(&self) -> bool {
        self.done
    }

    pub fn push(&mut self, data: &[u8]) {
        if self.done {
            return;
        }
        self.compact();
        self.buf.extend_from_slice(data);
    }

    /// Decode the next complete frame, if one is buffered.
    pub fn next_frame(&mut self) -> Option<Frame> {
        while !self.done {
            let pending = &self.buf[self.read_offset..];
            let newline = memchr(b'\n', pending)?;
            let line = &pending[..newline];
            self.read_offset += newline + 1;
            if let Some(frame) = Self::decode_line(line) {
                if matches!(frame, Frame::Done) {
                    self.done = true;
                }
                return Some(frame);
            }
        }
        None
    }

    /// Flush a trailing line that was never newline-terminated. Call once at
    /// end of input.
    pub fn finish(&mut self) -> Option<Frame> {
        if self.done || self.read_offset >= self.buf.len() {
            return None;
        }
        let line = self.buf.split_off(self.read_offset);
        self.read_offset = self.buf.len();
        let frame = Self::decode_line(&line);
        if matches!(frame, Some(Frame::Done)) {
            self.done = true;
        }
        frame
    }

    fn decode_line(line: &[u8]) -> Option<Frame> {
        let line = strip_cr(line);
        if !line.starts_with(DATA_PREFIX) {
            // Blank keep-alive lines and SSE comments carry no payload.
            return None;
        }
        let payload = match std::str::from_utf8(&line[DATA_PREFIX.len()..]) {
            Ok(p) => p.trim(),
            Err(_) => {
                warn!("skipping non-UTF-8 data line");
                return None;
            }
        };
        if payload.is_empty() {
            return None;
        }
        if payload == DONE_SENTINEL {
            return Some(Frame::Done);
        }
        match serde_json::from_str::<StreamChunk>(payload) {
            Ok(chunk) => {
                debug!(choices = chunk.choices.len(), "decoded stream chunk");
                Some(Frame::Chunk(chunk))
            }
            Err(err) => {
                warn!(error = %err, "skipping undecodable data line");
                None
            }
        }
    }

    fn compact(&mut self) {
        if self.read_offset > COMPACT_THRESHOLD || self.read_offset > self.buf.len() / 2 {
            self.buf.drain(..self.read_offset);
            self.read_offset = 0;
        }
    }
}

fn strip_cr(line: &[u8]) -> &[u8] {
    match line.last() {
        Some(b'\r') => &line[..line.len() - 1],
        _ => line,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn drain(decoder: &mut FrameDecoder) -> Vec<Frame> {
        let mut frames = Vec::new();
        while let Some(frame) = decoder.next_frame() {
            frames.push(frame);
        }
        frames
    }

    #[test]
    fn test_single_chunk_line() {
        let mut decoder = FrameDecoder::new();
        decoder.push(b"data: {\"choices\":[{\"index\":0,\"delta\":{\"content\":\"hi\"}}]}\n");
        let frames = drain(&mut decoder);
        assert_eq!(frames.len(), 1);
        match &frames[0] {
            Frame::Chunk(chunk) => {
                assert_eq!(chunk.choices[0].delta.content.as_deref(), Some("hi"));
            }
            Frame::Done => panic!("expected chunk"),
        }
    }

    #[test]
    fn test_line_split_across_pushes() {
        let mut decoder = FrameDecoder::new();
        decoder.push(b"data: {\"choices\":[{\"index\":0,\"del");
        assert!(decoder.next_frame().is_none());
        decoder.push(b"ta\":{}}]}\n");
        assert!(matches!(decoder.next_frame(), Some(Frame::Chunk(_))));
    }

    #[test]
    fn test_done_sentinel_stops_decoding() {
        let mut decoder = FrameDecoder::new();
        decoder.push(b"data: [DONE]\ndata: {\"choices\":[]}\n");
        assert!(matches!(decoder.next_frame(), Some(Frame::Done)));
        assert!(decoder.next_frame().is_none());
        assert!(decoder.is_done());
        // Later bytes are ignored entirely.
        decoder.push(b"data: {\"choices\":[]}\n");
        assert!(decoder.next_frame().is_none());
    }

    #[test]
    fn test_malformed_and_non_data_lines_skipped() {
        let mut decoder = FrameDecoder::new();
        decoder.push(b": keep-alive\n\ndata: not json\ndata: {\"choices\":[]}\n");
        let frames = drain(&mut decoder);
        assert_eq!(frames.len(), 1);
        assert!(matches!(frames[0], Frame::Chunk(_)));
    }

    #[test]
    fn test_crlf_lines() {
        let mut decoder = FrameDecoder::new();
        decoder.push(b"data: {\"choices\":[]}\r\ndata: [DONE]\r\n");
        assert!(matches!(decoder.next_frame(), Some(Frame::Chunk(_))));
        assert!(matches!(decoder.next_frame(), Some(Frame::Done)));
    }

    #[test]
    fn test_finish_flushes_unterminated_line() {
        let mut decoder = FrameDecoder::new();
        decoder.push(b"data: {\"choices\":[]}");
        assert!(decoder.next_frame().is_none());
        assert!(matches!(decoder.finish(), Some(Frame::Chunk(_))));
        assert!(decoder.finish().is_none());
    }

    #[test]
    fn test_compaction_preserves_pending_bytes() {
        let mut decoder = FrameDecoder::new();
        for _ in 0..2000 {
            decoder.push(b"data: {\"choices\":[]}\n");
            assert!(matches!(decoder.next_frame(), Some(Frame::Chunk(_))));
        }
        decoder.push(b"data: {\"choi");
        decoder.push(b"ces\":[]}\n");
        assert!(matches!(decoder.next_frame(), Some(Frame::Chunk(_))));
    }
}
