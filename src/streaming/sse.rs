use std::fmt::Display;

use futures_util::{Stream, StreamExt};
use serde_json::Value;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::constants::{SSE_DATA_PREFIX, SSE_DONE_MESSAGE, SSE_LINE_BOUNDARY};
use crate::error::StreamError;
use crate::streaming::chunks::extract_delta_content;

/// One item of a completion stream. At most one terminal item
/// (`Complete` or `Failed`) is ever produced, and it is always the last.
#[derive(Debug, Clone)]
pub enum StreamEvent {
    Chunk(String),
    Complete,
    Failed(StreamError),
}

impl StreamEvent {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, StreamEvent::Chunk(_))
    }
}

/// How the read loop ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamOutcome {
    Done,
    EndOfStream,
    Cancelled,
    Failed,
    ReceiverDropped,
}

/// Meaning of a single complete SSE line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SseFrame {
    Done,
    Delta(String),
    Skip,
}

/// Incremental UTF-8 line splitter. Bytes may arrive split anywhere,
/// including inside a multi-byte code point.
#[derive(Debug, Default)]
pub struct SseLineDecoder {
    pending_bytes: Vec<u8>,
    line_buffer: String,
}

impl SseLineDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feeds one read and returns the lines it completed.
    pub fn push(&mut self, bytes: &[u8]) -> Vec<String> {
        self.pending_bytes.extend_from_slice(bytes);
        self.decode_pending();

        let mut lines = Vec::new();
        while let Some(pos) = self.line_buffer.find(SSE_LINE_BOUNDARY) {
            let line: String = self.line_buffer.drain(..=pos).collect();
            lines.push(line);
        }
        lines
    }

    /// Flushes whatever is left once the byte stream has ended.
    pub fn finish(&mut self) -> Option<String> {
        if !self.pending_bytes.is_empty() {
            self.line_buffer
                .push_str(&String::from_utf8_lossy(&self.pending_bytes));
            self.pending_bytes.clear();
        }
        if self.line_buffer.trim().is_empty() {
            self.line_buffer.clear();
            None
        } else {
            Some(std::mem::take(&mut self.line_buffer))
        }
    }

    fn decode_pending(&mut self) {
        loop {
            match std::str::from_utf8(&self.pending_bytes) {
                Ok(text) => {
                    self.line_buffer.push_str(text);
                    self.pending_bytes.clear();
                    return;
                }
                Err(err) => {
                    let valid_up_to = err.valid_up_to();
                    if let Ok(valid) = std::str::from_utf8(&self.pending_bytes[..valid_up_to]) {
                        self.line_buffer.push_str(valid);
                    }
                    match err.error_len() {
                        Some(invalid_len) => {
                            self.line_buffer.push(char::REPLACEMENT_CHARACTER);
                            self.pending_bytes.drain(..valid_up_to + invalid_len);
                        }
                        None => {
                            // incomplete code point, wait for the next read
                            self.pending_bytes.drain(..valid_up_to);
                            return;
                        }
                    }
                }
            }
        }
    }
}

/// Interprets one complete line of the event stream.
pub fn parse_sse_line(line: &str) -> SseFrame {
    let trimmed = line.trim();
    let Some(data_content) = trimmed.strip_prefix(SSE_DATA_PREFIX) else {
        return SseFrame::Skip;
    };

    if data_content == SSE_DONE_MESSAGE {
        return SseFrame::Done;
    }

    match serde_json::from_str::<Value>(data_content) {
        Ok(event) => match extract_delta_content(&event) {
            Some(text) => SseFrame::Delta(text),
            None => SseFrame::Skip,
        },
        Err(e) => {
            log::debug!("discarding malformed SSE frame: {}", e);
            SseFrame::Skip
        }
    }
}

/// Drives a byte stream to its terminal event, forwarding deltas to `tx`.
///
/// Cancellation is only observed while waiting on the next read. A cancelled
/// stream terminates with `Complete`, as does a stream that ends without
/// `[DONE]`. Read errors terminate with `Failed`.
pub async fn pump_event_stream<S, E>(
    mut stream: S,
    cancellation_token: CancellationToken,
    tx: &mpsc::UnboundedSender<StreamEvent>,
) -> (StreamOutcome, u64)
where
    S: Stream<Item = Result<bytes::Bytes, E>> + Unpin,
    E: Display,
{
    let mut decoder = SseLineDecoder::new();
    let mut chunk_count = 0u64;

    let outcome = 'stream_loop: loop {
        tokio::select! {
            biased;
            _ = cancellation_token.cancelled() => {
                let _ = tx.send(StreamEvent::Complete);
                break 'stream_loop StreamOutcome::Cancelled;
            }

            next = stream.next() => {
                match next {
                    Some(Ok(bytes_chunk)) => {
                        for line in decoder.push(&bytes_chunk) {
                            match parse_sse_line(&line) {
                                SseFrame::Done => {
                                    let _ = tx.send(StreamEvent::Complete);
                                    break 'stream_loop StreamOutcome::Done;
                                }
                                SseFrame::Delta(text) => {
                                    chunk_count += 1;
                                    if tx.send(StreamEvent::Chunk(text)).is_err() {
                                        break 'stream_loop StreamOutcome::ReceiverDropped;
                                    }
                                }
                                SseFrame::Skip => {}
                            }
                        }
                    }
                    Some(Err(e)) => {
                        if cancellation_token.is_cancelled() {
                            let _ = tx.send(StreamEvent::Complete);
                            break 'stream_loop StreamOutcome::Cancelled;
                        }
                        let _ = tx.send(StreamEvent::Failed(StreamError::stream(&format!(
                            "streaming error: {}",
                            e
                        ))));
                        break 'stream_loop StreamOutcome::Failed;
                    }
                    None => {
                        if let Some(line) = decoder.finish() {
                            match parse_sse_line(&line) {
                                SseFrame::Delta(text) => {
                                    chunk_count += 1;
                                    let _ = tx.send(StreamEvent::Chunk(text));
                                }
                                SseFrame::Done => {
                                    let _ = tx.send(StreamEvent::Complete);
                                    break 'stream_loop StreamOutcome::Done;
                                }
                                SseFrame::Skip => {}
                            }
                        }
                        log::warn!("stream ended without [DONE]");
                        let _ = tx.send(StreamEvent::Complete);
                        break 'stream_loop StreamOutcome::EndOfStream;
                    }
                }
            }
        }
    };

    (outcome, chunk_count)
}
