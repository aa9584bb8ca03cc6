//! Byte stream → text delta pipeline.
//!
//! `chunks → logical_lines → payload_fragments → decode`. Every stage is a
//! lazy stream, so nothing is read from the upstream before the consumer asks
//! for the next delta.

use async_stream::try_stream;
use futures::{Stream, StreamExt};
use std::fmt::Display;

use crate::config::{DecodeMode, ProxyConfig};
use crate::decode::ContentDecoder;
use crate::error::ProxyError;
use crate::extract::{payload_fragments, EventExtractor};
use crate::lines::logical_lines;

/// Per-deployment transcoding settings.
#[derive(Debug, Clone)]
pub struct TranscodeOptions {
    pub extractor: EventExtractor,
    pub decoder: ContentDecoder,
}

impl TranscodeOptions {
    pub fn new(decode_mode: DecodeMode, sentinel: impl Into<String>) -> Self {
        Self {
            extractor: EventExtractor::new(sentinel),
            decoder: ContentDecoder::new(decode_mode),
        }
    }

    pub fn from_config(config: &ProxyConfig) -> Self {
        Self::new(config.decode_mode, config.sentinel.clone())
    }
}

/// Decode an upstream byte stream into content deltas.
///
/// Fragments that fail to decode are skipped. Empty deltas are dropped unless
/// the decoder forwards them (raw-text mode).
pub fn content_deltas<S, B, E>(
    chunks: S,
    options: TranscodeOptions,
) -> impl Stream<Item = Result<String, ProxyError>> + Send
where
    S: Stream<Item = Result<B, E>> + Send,
    B: AsRef<[u8]> + Send,
    E: Display + Send,
{
    let TranscodeOptions { extractor, decoder } = options;
    let fragments = payload_fragments(logical_lines(chunks), extractor);

    try_stream! {
        futures::pin_mut!(fragments);

        while let Some(fragment) = fragments.next().await {
            let fragment = fragment?;
            let Some(delta) = decoder.decode(&fragment) else {
                continue;
            };
            if delta.is_empty() && !decoder.forwards_empty() {
                continue;
            }
            yield delta;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::stream;
    use std::convert::Infallible;

    async fn deltas(chunks: &[&str], mode: DecodeMode) -> Vec<String> {
        let owned: Vec<Vec<u8>> = chunks.iter().map(|c| c.as_bytes().to_vec()).collect();
        let source = stream::iter(owned.into_iter().map(Ok::<_, Infallible>));
        content_deltas(source, TranscodeOptions::new(mode, "[DONE]"))
            .map(|r| r.unwrap())
            .collect()
            .await
    }

    #[tokio::test]
    async fn split_scenario_yields_two_deltas() {
        let out = deltas(
            &["data: \"Hi\"\nda", "ta: \" there\"\ndata: [DONE]\n"],
            DecodeMode::StrictJson,
        )
        .await;
        assert_eq!(out, vec!["Hi".to_string(), " there".to_string()]);
    }

    #[tokio::test]
    async fn malformed_fragment_does_not_abort() {
        let out = deltas(
            &["data: not-json\ndata: \"ok\"\n"],
            DecodeMode::StrictJson,
        )
        .await;
        assert_eq!(out, vec!["ok".to_string()]);
    }

    #[tokio::test]
    async fn non_payload_lines_never_become_deltas() {
        let out = deltas(
            &["event: text\n\"orphan\"\n: comment\ndata: \"kept\"\n"],
            DecodeMode::RawText,
        )
        .await;
        assert_eq!(out, vec!["kept".to_string()]);
    }

    #[tokio::test]
    async fn empty_deltas_depend_on_mode() {
        let chunks = ["data: \"\"\ndata: \"x\"\n"];
        assert_eq!(deltas(&chunks, DecodeMode::StrictJson).await, vec!["x".to_string()]);
        assert_eq!(
            deltas(&chunks, DecodeMode::RawText).await,
            vec![String::new(), "x".to_string()]
        );
    }

    #[tokio::test]
    async fn nothing_after_sentinel() {
        let out = deltas(
            &["data: \"a\"\ndata: [DONE]\ndata: \"late\"\n"],
            DecodeMode::StrictJson,
        )
        .await;
        assert_eq!(out, vec!["a".to_string()]);
    }

    #[tokio::test]
    async fn raw_text_keeps_leading_whitespace() {
        let out = deltas(&["data: Hello\ndata:  world\n"], DecodeMode::RawText).await;
        assert_eq!(out, vec!["Hello".to_string(), " world".to_string()]);
        assert_eq!(out.concat(), "Hello world");
    }

    #[tokio::test]
    async fn bare_data_line_is_an_empty_fragment() {
        let chunks = ["data: \ndata: x\n"];
        assert_eq!(
            deltas(&chunks, DecodeMode::RawText).await,
            vec![String::new(), "x".to_string()]
        );
        assert_eq!(deltas(&chunks, DecodeMode::StrictJson).await, vec!["x".to_string()]);
    }
}
