//! Line scanner and event-line decoder for OpenAI-style chat completion streams.
//!
//! The upstream sends one JSON payload per `data: ` line and terminates with
//! `data: [DONE]`. Anything else (comments, keep-alives, `event:` lines,
//! blank separators) is skipped.

use bytes::{Bytes, BytesMut};
use memchr::memchr;
use serde::Deserialize;

use crate::error::GoxError;
use crate::transport::ByteStream;

pub const DATA_PREFIX: &[u8] = b"data: ";
pub const DONE_PAYLOAD: &[u8] = b"[DONE]";

// ---------------------------------------------------------------------------
// LineScanner: splits a chunked body into lines
// ---------------------------------------------------------------------------

/// Incremental line reader over a [`ByteStream`].
///
/// Lines may span any number of chunks; there is no length limit. The
/// trailing `\n` (and a `\r` before it) is stripped. A final line without a
/// terminator is still yielded at end of stream.
pub struct LineScanner {
    stream: ByteStream,
    buffer: BytesMut,
    scan_from: usize,
    eof: bool,
}

impl LineScanner {
    #[must_use]
    pub fn new(stream: ByteStream) -> Self {
        Self {
            stream,
            buffer: BytesMut::with_capacity(4096),
            scan_from: 0,
            eof: false,
        }
    }

    /// Next complete line, `None` at end of stream.
    ///
    /// Cancel-safe: dropping the returned future loses no bytes.
    pub async fn next_line(&mut self) -> Option<Result<Bytes, GoxError>> {
        loop {
            if let Some(rel_pos) = memchr(b'\n', &self.buffer[self.scan_from..]) {
                let line_end = self.scan_from + rel_pos;
                let mut line = self.buffer.split_to(line_end + 1).freeze();
                line.truncate(line_end);
                if line.last().copied() == Some(b'\r') {
                    line.truncate(line.len() - 1);
                }
                self.scan_from = 0;
                return Some(Ok(line));
            }
            self.scan_from = self.buffer.len();

            if self.eof {
                if self.buffer.is_empty() {
                    return None;
                }
                self.scan_from = 0;
                return Some(Ok(self.buffer.split().freeze()));
            }

            match self.stream.next_chunk().await {
                Some(Ok(chunk)) => self.buffer.extend_from_slice(&chunk),
                Some(Err(err)) => return Some(Err(err)),
                None => self.eof = true,
            }
        }
    }

    /// Close the underlying stream. Idempotent.
    pub fn close(&mut self) -> bool {
        self.eof = true;
        self.stream.close()
    }
}

// ---------------------------------------------------------------------------
// Event decoding
// ---------------------------------------------------------------------------

/// A piece of delta text extracted from one event line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fragment {
    pub text: String,
    pub reasoning: bool,
}

impl Fragment {
    #[must_use]
    pub fn reasoning(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            reasoning: true,
        }
    }

    #[must_use]
    pub fn content(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            reasoning: false,
        }
    }
}

/// Result of decoding one line of the event stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventLine {
    /// Not an event, malformed, or no text in it.
    Skip,
    /// The `[DONE]` terminator.
    Done,
    Fragment(Fragment),
}

#[derive(Deserialize)]
struct ChunkWire {
    #[serde(default)]
    choices: Vec<ChoiceWire>,
}

#[derive(Deserialize)]
struct ChoiceWire {
    #[serde(default)]
    delta: Option<DeltaWire>,
}

#[derive(Deserialize)]
struct DeltaWire {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    reasoning_content: Option<String>,
}

/// Decode one raw line.
///
/// `inspect_reasoning` is `false` once final content has begun; from then on
/// `reasoning_content` is ignored entirely.
#[must_use]
pub fn decode_event_line(line: &[u8], inspect_reasoning: bool) -> EventLine {
    let Some(payload) = line.strip_prefix(DATA_PREFIX) else {
        return EventLine::Skip;
    };
    if payload == DONE_PAYLOAD {
        return EventLine::Done;
    }

    let Ok(chunk) = serde_json::from_slice::<ChunkWire>(payload) else {
        return EventLine::Skip;
    };
    let Some(delta) = chunk.choices.into_iter().next().and_then(|c| c.delta) else {
        return EventLine::Skip;
    };

    if inspect_reasoning {
        if let Some(text) = delta.reasoning_content.filter(|t| !t.is_empty()) {
            return EventLine::Fragment(Fragment::reasoning(text));
        }
    }
    match delta.content.filter(|t| !t.is_empty()) {
        Some(text) => EventLine::Fragment(Fragment::content(text)),
        None => EventLine::Skip,
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
