//! lobe-proxy - OpenAI-compatible chat completions in front of a
//! LobeChat-style upstream.
//!
//! Callers speak OpenAI's `/v1/chat/completions` API. The upstream always
//! streams `data: <json string>` lines, one text fragment per line, ending with
//! a sentinel. This crate rebuilds those lines from arbitrary network chunks,
//! decodes the fragments, and answers either with one aggregated
//! `chat.completion` or with `chat.completion.chunk` SSE frames.
//!
//! Pipeline: [`lines`] → [`extract`] → [`decode`] → [`synth`], composed by
//! [`transcode`].

pub mod auth;
pub mod config;
pub mod decode;
pub mod error;
pub mod extract;
pub mod lines;
pub mod server;
pub mod synth;
pub mod transcode;
pub mod types;
pub mod upstream;

pub use config::{DecodeMode, ProxyConfig};
pub use error::{ProxyError, ProxyResult};
pub use server::serve;
