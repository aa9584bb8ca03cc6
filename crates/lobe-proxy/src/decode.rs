//! Payload fragment decoding.

use tracing::warn;

use crate::config::DecodeMode;

/// Turns payload fragments into text deltas. Never fails the stream: a
/// fragment that cannot be decoded yields `None`.
#[derive(Debug, Clone, Copy)]
pub struct ContentDecoder {
    mode: DecodeMode,
}

impl ContentDecoder {
    pub fn new(mode: DecodeMode) -> Self {
        Self { mode }
    }

    /// Whether empty deltas are forwarded to streaming callers. The raw-text
    /// upstream contract forwards every fragment.
    pub fn forwards_empty(&self) -> bool {
        self.mode == DecodeMode::RawText
    }

    pub fn decode(&self, fragment: &str) -> Option<String> {
        match self.mode {
            DecodeMode::StrictJson => decode_json(fragment),
            DecodeMode::RawText => Some(decode_raw(fragment).to_string()),
        }
    }
}

fn decode_json(fragment: &str) -> Option<String> {
    match serde_json::from_str::<String>(fragment.trim()) {
        Ok(text) => Some(text),
        Err(e) => {
            warn!(error = %e, fragment, "skipping undecodable payload fragment");
            None
        }
    }
}

/// Raw fragments are kept verbatim, whitespace included, apart from one
/// surrounding pair of quotes.
fn decode_raw(fragment: &str) -> &str {
    fragment
        .strip_prefix('"')
        .and_then(|rest| rest.strip_suffix('"'))
        .unwrap_or(fragment)
}
