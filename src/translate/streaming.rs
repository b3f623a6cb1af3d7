//! Framing and translation of SenseNova's event stream into canonical chunks.
//!
//! The vendor's stream is not standard SSE. A frame boundary is only recognised
//! once the buffer holds both a blank line (`\n\n`) and a colon somewhere; until both
//! show up the [`StreamFramer`] keeps buffering. Whatever is left when the byte
//! source ends is flushed as one last frame.
//!
//! Each frame is then classified by [`classify_frame`] and, if it carries a payload,
//! handed to the [`StreamTranslator`], which produces at most one
//! [`ChatCompletionChunk`] per frame.

use super::openai_types::{ChatCompletionChunk, ChunkChoice, ChunkDelta, Usage};
use super::sensetime_types::Response;
use crate::error::{AdaptorError, Result};

pub const EVENT_MARKER: &str = "data:";
pub const DONE_MARKER: &str = "[DONE]";

/// Frames shorter than this are blank lines or garbage.
const MIN_FRAME_LEN: usize = 5;

/// Largest partial frame held while waiting for a boundary. A stream that
/// exceeds it is ended as if the input had run out.
pub const MAX_BUFFERED: usize = 64 * 1024;

const FRAME_DELIMITER: &[u8] = b"\n\n";

/// Splits a byte stream into vendor frames.
#[derive(Debug, Default)]
pub struct StreamFramer {
    buffer: Vec<u8>,
    /// Bytes already searched for a delimiter.
    scanned: usize,
    has_colon: bool,
}

impl StreamFramer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append bytes and return every frame that is now complete, in order.
    pub fn push(&mut self, bytes: &[u8]) -> Vec<String> {
        self.has_colon |= bytes.contains(&b':');
        self.buffer.extend_from_slice(bytes);

        let mut frames = Vec::new();
        while let Some(frame) = self.next_frame() {
            frames.push(frame);
        }
        frames
    }

    /// Cut the next frame if the buffer holds both a blank line and a colon.
    pub fn next_frame(&mut self) -> Option<String> {
        // A delimiter may straddle the end of the previous scan.
        let start = self.scanned.saturating_sub(FRAME_DELIMITER.len() - 1);
        let Some(end) = find(&self.buffer[start..], FRAME_DELIMITER).map(|i| start + i) else {
            self.scanned = self.buffer.len();
            return None;
        };
        if !self.has_colon {
            self.scanned = end;
            return None;
        }

        let frame = String::from_utf8_lossy(&self.buffer[..end]).into_owned();
        self.buffer.drain(..end + FRAME_DELIMITER.len());
        self.scanned = 0;
        self.has_colon = self.buffer.contains(&b':');
        Some(frame)
    }

    /// End of input: the residual buffer, if any, is the final frame.
    pub fn finish(&mut self) -> Option<String> {
        self.scanned = 0;
        self.has_colon = false;
        if self.buffer.is_empty() {
            return None;
        }
        let frame = String::from_utf8_lossy(&self.buffer).into_owned();
        self.buffer.clear();
        Some(frame)
    }

    pub fn buffered_len(&self) -> usize {
        self.buffer.len()
    }

    /// True once the unframed remainder is larger than [`MAX_BUFFERED`].
    pub fn is_overflowing(&self) -> bool {
        self.buffer.len() > MAX_BUFFERED
    }
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len()).position(|w| w == needle)
}

/// What to do with one frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    /// A vendor event payload to translate, marker stripped.
    Payload(String),
    Skip,
    /// The `[DONE]` terminator. No chunk is produced for it.
    Terminate,
}

pub fn classify_frame(frame: &str) -> Frame {
    if frame.len() < MIN_FRAME_LEN {
        return Frame::Skip;
    }
    let Some(payload) = frame.strip_prefix(EVENT_MARKER) else {
        return Frame::Skip;
    };
    if payload.trim() == DONE_MARKER {
        return Frame::Terminate;
    }
    Frame::Payload(payload.to_string())
}

/// One item of the canonical stream handed back to the client.
#[derive(Debug, Clone)]
pub enum StreamEvent {
    Chunk(ChatCompletionChunk),
    Done,
}

impl StreamEvent {
    /// The `data:` field of the SSE event.
    pub fn data(&self) -> Result<String> {
        match self {
            Self::Chunk(chunk) => serde_json::to_string(chunk).map_err(AdaptorError::marshal),
            Self::Done => Ok(DONE_MARKER.to_string()),
        }
    }

    /// The full SSE event, including the trailing blank line.
    pub fn to_sse(&self) -> Result<String> {
        Ok(format!("data: {}\n\n", self.data()?))
    }

    pub fn is_done(&self) -> bool {
        matches!(self, Self::Done)
    }
}

/// Translates vendor stream payloads into canonical chunks, remembering the latest
/// usage snapshot so the final accumulated usage can be reported.
#[derive(Debug)]
pub struct StreamTranslator {
    model: String,
    fallback_id: String,
    usage: Option<Usage>,
    chunks: usize,
}

impl StreamTranslator {
    pub fn new(model: &str) -> Self {
        Self {
            model: model.to_string(),
            fallback_id: format!("chatcmpl-{}", uuid::Uuid::new_v4().simple()),
            usage: None,
            chunks: 0,
        }
    }

    /// Translate one payload. Undecodable payloads and payloads without a choice
    /// produce nothing.
    pub fn process_payload(&mut self, payload: &str) -> Option<ChatCompletionChunk> {
        let event: Response = match serde_json::from_str(payload) {
            Ok(e) => e,
            Err(e) => {
                tracing::warn!(error = %e, "Skipping undecodable stream payload");
                return None;
            }
        };

        if !event.status.msg.is_empty() {
            tracing::warn!(
                code = event.status.code,
                message = %event.status.msg,
                "Vendor reported an error inside the stream"
            );
        }

        let Some(choice) = event.data.choices.first() else {
            tracing::debug!("Skipping stream payload without choices");
            return None;
        };

        if let Some(ref usage) = event.data.usage {
            self.usage = Some(usage.clone());
        }

        let id = if event.data.id.is_empty() {
            self.fallback_id.clone()
        } else {
            event.data.id.clone()
        };

        self.chunks += 1;

        Some(ChatCompletionChunk {
            id,
            object: "chat.completion.chunk".to_string(),
            created: chrono::Utc::now().timestamp(),
            model: self.model.clone(),
            choices: vec![ChunkChoice {
                index: 0,
                delta: ChunkDelta {
                    role: non_empty(&choice.role),
                    content: Some(choice.delta.clone()),
                },
                finish_reason: None,
            }],
            usage: event.data.usage,
        })
    }

    /// Latest usage snapshot seen on the stream.
    pub fn usage(&self) -> Option<&Usage> {
        self.usage.as_ref()
    }

    pub fn chunk_count(&self) -> usize {
        self.chunks
    }
}

fn non_empty(s: &str) -> Option<String> {
    if s.is_empty() {
        None
    } else {
        Some(s.to_string())
    }
}
