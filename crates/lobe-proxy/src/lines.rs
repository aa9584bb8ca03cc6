//! Line reassembly over an arbitrarily chunked byte stream.
//!
//! Transport chunks carry no protocol meaning: one chunk may hold several
//! lines, and one line may span several chunks. [`LineReassembler`] keeps the
//! unterminated tail of the last chunk and only emits a line once its `\n` has
//! been seen. Buffering happens on bytes, so a multi-byte UTF-8 character split
//! between two chunks is decoded intact.

use async_stream::try_stream;
use futures::{Stream, StreamExt};
use std::fmt::Display;
use tracing::debug;

use crate::error::ProxyError;

/// Carry-over buffer turning raw chunks into complete, trimmed lines.
#[derive(Debug, Default)]
pub struct LineReassembler {
    buffer: Vec<u8>,
    // Prefix of `buffer` already searched for a terminator.
    scanned: usize,
}

impl LineReassembler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append one chunk and drain every line it completes, in order.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        self.buffer.extend_from_slice(chunk);

        let mut lines = Vec::new();
        let mut start = 0;
        let mut from = self.scanned;
        while let Some(offset) = self.buffer[from..].iter().position(|&b| b == b'\n') {
            let end = from + offset;
            let line = String::from_utf8_lossy(&self.buffer[start..end]);
            lines.push(line.trim_end().to_string());
            start = end + 1;
            from = start;
        }
        self.buffer.drain(..start);
        self.scanned = self.buffer.len();
        lines
    }

    /// End of input. The unterminated tail is never a complete line and is
    /// discarded; returns how many bytes were dropped.
    pub fn finish(&mut self) -> usize {
        let dropped = self.buffer.len();
        self.buffer.clear();
        self.scanned = 0;
        dropped
    }
}

/// Lazily reassemble lines from a byte stream.
///
/// Lines are yielded in arrival order as soon as their terminator arrives. A
/// transport error ends the stream with [`ProxyError::Transport`].
pub fn logical_lines<S, B, E>(
    chunks: S,
) -> impl Stream<Item = Result<String, ProxyError>> + Send
where
    S: Stream<Item = Result<B, E>> + Send,
    B: AsRef<[u8]> + Send,
    E: Display + Send,
{
    try_stream! {
        let mut reassembler = LineReassembler::new();
        futures::pin_mut!(chunks);

        while let Some(chunk) = chunks.next().await {
            let chunk = chunk.map_err(|e| ProxyError::Transport(e.to_string()))?;
            for line in reassembler.push(chunk.as_ref()) {
                yield line;
            }
        }

        let dropped = reassembler.finish();
        if dropped > 0 {
            debug!(bytes = dropped, "discarding unterminated trailing line");
        }
    }
}
