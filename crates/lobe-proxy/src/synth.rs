//! Response synthesis.
//!
//! Aggregated mode collects every delta and returns one `chat.completion`.
//! Streaming mode wraps each delta in a `chat.completion.chunk` and frames it
//! as `data: <json>\n\n`. Both modes share one id and one `created` stamp per
//! request, carried by [`CompletionContext`].

use async_stream::{stream, try_stream};
use bytes::Bytes;
use futures::{Stream, StreamExt};
use rand::{distributions::Alphanumeric, Rng};
use std::convert::Infallible;
use tracing::{debug, error};

use crate::error::ProxyResult;
use crate::types::{
    ChatCompletionChunk, ChatCompletionResponse, Choice, ChoiceMessage, ChunkChoice, ChunkDelta,
    Usage, FINISH_REASON_STOP, OBJECT_COMPLETION, OBJECT_COMPLETION_CHUNK, ROLE_ASSISTANT,
};

pub const COMPLETION_ID_PREFIX: &str = "chatcmpl-";
const COMPLETION_ID_LEN: usize = 28;

/// `chatcmpl-` followed by 28 random alphanumerics.
pub fn generate_completion_id() -> String {
    let suffix: String = rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(COMPLETION_ID_LEN)
        .map(char::from)
        .collect();
    format!("{COMPLETION_ID_PREFIX}{suffix}")
}

/// Identity shared by every envelope of one request.
#[derive(Debug, Clone)]
pub struct CompletionContext {
    pub id: String,
    pub created: i64,
    pub model: String,
}

impl CompletionContext {
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            id: generate_completion_id(),
            created: chrono::Utc::now().timestamp(),
            model: model.into(),
        }
    }

    pub fn completion(&self, content: String) -> ChatCompletionResponse {
        ChatCompletionResponse {
            id: self.id.clone(),
            object: OBJECT_COMPLETION.to_string(),
            created: self.created,
            model: self.model.clone(),
            system_fingerprint: None,
            choices: vec![Choice {
                index: 0,
                finish_reason: FINISH_REASON_STOP.to_string(),
                message: ChoiceMessage {
                    role: ROLE_ASSISTANT.to_string(),
                    content,
                },
            }],
            usage: Usage::default(),
        }
    }

    pub fn chunk(&self, delta: String) -> ChatCompletionChunk {
        ChatCompletionChunk {
            id: self.id.clone(),
            object: OBJECT_COMPLETION_CHUNK.to_string(),
            created: self.created,
            model: self.model.clone(),
            system_fingerprint: None,
            choices: vec![ChunkChoice {
                index: 0,
                delta: ChunkDelta {
                    content: delta,
                    role: ROLE_ASSISTANT.to_string(),
                    finish_reason: None,
                },
            }],
        }
    }
}

/// Collect all deltas into one response. Any stream error fails the whole
/// response, since nothing has been sent yet.
pub async fn aggregate<S>(
    deltas: S,
    ctx: &CompletionContext,
) -> ProxyResult<ChatCompletionResponse>
where
    S: Stream<Item = ProxyResult<String>>,
{
    futures::pin_mut!(deltas);

    let mut content = String::new();
    while let Some(delta) = deltas.next().await {
        content.push_str(&delta?);
    }

    debug!(id = %ctx.id, chars = content.len(), "aggregated completion");
    Ok(ctx.completion(content))
}

pub fn sse_frame(chunk: &ChatCompletionChunk) -> ProxyResult<String> {
    Ok(format!("data: {}\n\n", serde_json::to_string(chunk)?))
}

/// One SSE frame per delta, in arrival order.
pub fn event_stream<S>(
    deltas: S,
    ctx: CompletionContext,
) -> impl Stream<Item = ProxyResult<Bytes>> + Send
where
    S: Stream<Item = ProxyResult<String>> + Send,
{
    try_stream! {
        futures::pin_mut!(deltas);

        while let Some(delta) = deltas.next().await {
            let frame = sse_frame(&ctx.chunk(delta?))?;
            yield Bytes::from(frame);
        }
    }
}

/// Pull the first frame before any response header is committed.
///
/// An error before the first frame is returned to the caller, who can still
/// answer with a JSON error. Errors after that only close the stream: once
/// frames are on the wire there is no way to send a structured error.
pub async fn start_event_stream<S>(
    events: S,
) -> ProxyResult<impl Stream<Item = Result<Bytes, Infallible>> + Send>
where
    S: Stream<Item = ProxyResult<Bytes>> + Send + 'static,
{
    let mut events = Box::pin(events);
    let first = events.next().await.transpose()?;

    Ok(stream! {
        if let Some(frame) = first {
            yield Ok::<_, Infallible>(frame);
        }
        while let Some(item) = events.next().await {
            match item {
                Ok(frame) => yield Ok(frame),
                Err(e) => {
                    error!(error = %e, "upstream failed mid-stream; closing event stream");
                    break;
                }
            }
        }
    })
}
