//! Streaming SSE decoding
//!
//! Turns a raw server-sent-event byte stream into text chunks. The decoder is
//! provider-agnostic; each provider supplies a parser that maps one event's
//! `data` payload to a [`ChunkEvent`].

use crate::error::{CallContext, Result};
use crate::llm::provider::TextStream;
use async_stream::try_stream;
use bytes::Bytes;
use futures::{Stream, StreamExt};
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, trace};

/// What a provider parser made of one SSE event
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChunkEvent {
    /// Text to hand to the caller
    Text(String),
    /// End-of-answer sentinel
    Done,
    /// Event carries nothing for the caller (role headers, pings, usage)
    Skip,
}

/// Maps an event's `data` to a chunk, or to an error message from the API
pub type ChunkParser = fn(&str) -> std::result::Result<ChunkEvent, String>;

/// Incremental SSE decoder
///
/// Bytes go in as they arrive; complete events' `data` payloads come out.
/// Lines are split on raw bytes so chunks that cut through a multi-byte
/// character decode correctly.
#[derive(Debug, Default)]
pub struct SseDecoder {
    buffer: Vec<u8>,
    data_lines: Vec<String>,
    ready: std::collections::VecDeque<String>,
}

impl SseDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed raw bytes
    pub fn push(&mut self, bytes: &[u8]) -> std::result::Result<(), String> {
        self.buffer.extend_from_slice(bytes);

        while let Some(pos) = self.buffer.iter().position(|b| *b == b'\n') {
            let raw: Vec<u8> = self.buffer.drain(..=pos).collect();
            let line = std::str::from_utf8(&raw)
                .map_err(|e| format!("invalid UTF-8 in stream: {}", e))?
                .trim_end_matches(['\n', '\r'])
                .to_string();
            self.handle_line(&line);
        }

        Ok(())
    }

    /// Flush whatever is left once the body ends
    pub fn finish(&mut self) -> std::result::Result<(), String> {
        if !self.buffer.is_empty() {
            let raw = std::mem::take(&mut self.buffer);
            let line = String::from_utf8(raw).map_err(|e| format!("invalid UTF-8 in stream: {}", e))?;
            self.handle_line(line.trim_end_matches('\r'));
        }
        self.dispatch();
        Ok(())
    }

    /// Next complete event payload
    pub fn next_data(&mut self) -> Option<String> {
        self.ready.pop_front()
    }

    fn handle_line(&mut self, line: &str) {
        if line.is_empty() {
            self.dispatch();
            return;
        }
        if line.starts_with(':') {
            return;
        }

        let (field, value) = match line.split_once(':') {
            Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
            None => (line, ""),
        };
        // `event:`, `id:` and `retry:` carry nothing the parsers need.
        if field == "data" {
            self.data_lines.push(value.to_string());
        }
    }

    fn dispatch(&mut self) {
        if !self.data_lines.is_empty() {
            self.ready.push_back(self.data_lines.join("\n"));
            self.data_lines.clear();
        }
    }
}

/// Adapt an SSE byte stream into a text stream.
///
/// Ends on the parser's `Done` or when the body ends. API errors and
/// transport failures become `Generation` errors; reaching `deadline` ends the
/// stream with `Timeout`. Dropping the returned stream drops `bytes` and the
/// connection behind it.
pub fn text_stream<S>(
    bytes: S,
    parser: ChunkParser,
    deadline: Instant,
    timeout: Duration,
    context: CallContext,
) -> TextStream
where
    S: Stream<Item = reqwest::Result<Bytes>> + Send + 'static,
{
    Box::pin(sse_chunks(bytes, parser, deadline, timeout, context))
}

fn sse_chunks<S>(
    bytes: S,
    parser: ChunkParser,
    deadline: Instant,
    timeout: Duration,
    context: CallContext,
) -> impl Stream<Item = Result<String>> + Send
where
    S: Stream<Item = reqwest::Result<Bytes>> + Send + 'static,
{
    try_stream! {
        let mut bytes = Box::pin(bytes);
        let mut decoder = SseDecoder::new();
        let mut chunks = 0usize;

        'body: loop {
            while let Some(data) = decoder.next_data() {
                match parser(&data).map_err(|message| context.generation(message, None))? {
                    ChunkEvent::Text(text) => {
                        chunks += 1;
                        trace!(len = text.len(), "Stream chunk");
                        yield text;
                    }
                    ChunkEvent::Done => {
                        debug!(provider = %context.provider, chunks, "Stream completed");
                        break 'body;
                    }
                    ChunkEvent::Skip => {}
                }
            }

            let next = tokio::time::timeout_at(deadline, bytes.next())
                .await
                .map_err(|_| context.timeout(timeout))?;

            match next {
                Some(Ok(chunk)) => decoder
                    .push(&chunk)
                    .map_err(|message| context.generation(message, None))?,
                Some(Err(e)) => Err::<(), _>(context.generation(format!("stream interrupted: {}", e), None))?,
                None => {
                    decoder.finish().map_err(|message| context.generation(message, None))?;
                    while let Some(data) = decoder.next_data() {
                        match parser(&data).map_err(|message| context.generation(message, None))? {
                            ChunkEvent::Text(text) => yield text,
                            ChunkEvent::Done => break,
                            ChunkEvent::Skip => {}
                        }
                    }
                    debug!(provider = %context.provider, chunks, "Stream body ended");
                    break 'body;
                }
            }
        }
    }
}
