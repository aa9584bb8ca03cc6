//! Payload extraction from reassembled lines.
//!
//! Only `data: ` lines carry payload. Everything else (blank separators,
//! `event:` lines, `:` comments) is dropped. The sentinel ends the stream
//! whether it arrives as `data: <sentinel>` or as a bare line.

use async_stream::try_stream;
use futures::{Stream, StreamExt};

use crate::error::ProxyError;

pub const DATA_PREFIX: &str = "data: ";

/// What a single line means to the extractor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineEvent<'a> {
    /// Payload with the framing prefix removed.
    Payload(&'a str),
    /// Not a payload line.
    Skip,
    /// End-of-stream sentinel.
    End,
}

#[derive(Debug, Clone)]
pub struct EventExtractor {
    sentinel: String,
}

impl EventExtractor {
    pub fn new(sentinel: impl Into<String>) -> Self {
        Self {
            sentinel: sentinel.into(),
        }
    }

    pub fn classify<'a>(&self, line: &'a str) -> LineEvent<'a> {
        if self.is_sentinel(line) {
            return LineEvent::End;
        }
        // Lines arrive with trailing whitespace trimmed, so an empty
        // `data: ` payload shows up as a bare `data:`.
        if line == DATA_PREFIX.trim_end() {
            return LineEvent::Payload("");
        }
        match line.strip_prefix(DATA_PREFIX) {
            Some(payload) if self.is_sentinel(payload) => LineEvent::End,
            Some(payload) => LineEvent::Payload(payload),
            None => LineEvent::Skip,
        }
    }

    fn is_sentinel(&self, text: &str) -> bool {
        !self.sentinel.is_empty() && text.trim() == self.sentinel
    }
}

/// Lazily turn a line stream into payload fragments, stopping at the sentinel.
///
/// Lines after the sentinel are never pulled from `lines`.
pub fn payload_fragments<S>(
    lines: S,
    extractor: EventExtractor,
) -> impl Stream<Item = Result<String, ProxyError>> + Send
where
    S: Stream<Item = Result<String, ProxyError>> + Send,
{
    try_stream! {
        futures::pin_mut!(lines);

        while let Some(line) = lines.next().await {
            let line = line?;
            match extractor.classify(&line) {
                LineEvent::Payload(payload) => yield payload.to_string(),
                LineEvent::Skip => continue,
                LineEvent::End => break,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::stream;

    fn extractor() -> EventExtractor {
        EventExtractor::new("[DONE]")
    }

    #[test]
    fn classify_strips_prefix() {
        assert_eq!(
            extractor().classify("data: \"hello\""),
            LineEvent::Payload("\"hello\"")
        );
        assert_eq!(extractor().classify("data:"), LineEvent::Payload(""));
    }

    #[test]
    fn classify_skips_non_payload_lines() {
        let e = extractor();
        let lines = [
            "",
            "event: text",
            ": keep-alive",
            "data:\"no-space\"",
            " data: x",
            "data:x",
        ];
        for line in lines {
            assert_eq!(e.classify(line), LineEvent::Skip, "line {:?}", line);
        }
    }

    #[test]
    fn classify_recognizes_sentinel() {
        let e = extractor();
        assert_eq!(e.classify("data: [DONE]"), LineEvent::End);
        assert_eq!(e.classify("[DONE]"), LineEvent::End);
        assert_eq!(e.classify("data: \"[DONE]\""), LineEvent::Payload("\"[DONE]\""));
    }

    #[test]
    fn custom_sentinel() {
        let e = EventExtractor::new("<<END>>");
        assert_eq!(e.classify("data: <<END>>"), LineEvent::End);
        assert_eq!(e.classify("data: [DONE]"), LineEvent::Payload("[DONE]"));
    }

    #[test]
    fn empty_sentinel_never_matches() {
        let e = EventExtractor::new("");
        assert_eq!(e.classify(""), LineEvent::Skip);
        assert_eq!(e.classify("data:"), LineEvent::Payload(""));
    }

    #[test]
    fn long_fragments_are_not_truncated() {
        let long = "x".repeat(1 << 20);
        let line = format!("data: {long}");
        assert_eq!(extractor().classify(&line), LineEvent::Payload(long.as_str()));
    }

    #[tokio::test]
    async fn stops_at_sentinel_without_pulling_further_lines() {
        let lines = stream::iter(vec![
            Ok("data: \"a\"".to_string()),
            Ok("event: noise".to_string()),
            Ok("data: [DONE]".to_string()),
            Err(ProxyError::Transport("must not be reached".to_string())),
        ]);
        let fragments: Vec<_> = payload_fragments(lines, extractor()).collect().await;
        assert_eq!(fragments.len(), 1);
        assert_eq!(fragments[0].as_ref().unwrap(), "\"a\"");
    }
}
