//! Outbound calls to the LobeChat-style upstream.
//!
//! The upstream always streams, whatever the caller asked for; aggregation
//! happens on our side.

use bytes::Bytes;
use futures::stream::{BoxStream, StreamExt};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use serde::Serialize;
use std::time::Duration;
use tracing::{debug, error};

use crate::auth::{create_access_token, AUTH_HEADER};
use crate::config::ProxyConfig;
use crate::error::{ProxyError, ProxyResult};
use crate::types::{ChatCompletionRequest, ChatMessage};

const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
                          (KHTML, like Gecko) Chrome/123.0.0.0 Safari/537.36";

const TEMPERATURE: f32 = 0.6;
const TOP_P: f32 = 1.0;

/// Body sent upstream.
#[derive(Debug, Clone, Serialize)]
pub struct UpstreamRequest {
    pub model: String,
    pub stream: bool,
    pub frequency_penalty: f32,
    pub presence_penalty: f32,
    pub temperature: f32,
    pub top_p: f32,
    pub messages: Vec<ChatMessage>,
}

impl UpstreamRequest {
    /// Reshape a caller request. `system` messages become `user` messages;
    /// every other role passes through unchanged.
    pub fn from_chat(req: &ChatCompletionRequest, default_model: &str) -> Self {
        let messages = req
            .messages
            .iter()
            .flatten()
            .map(|m| ChatMessage {
                role: remap_role(&m.role).to_string(),
                content: m.content.clone(),
            })
            .collect();

        Self {
            model: req.model_or(default_model).to_string(),
            stream: true,
            frequency_penalty: 0.0,
            presence_penalty: 0.0,
            temperature: TEMPERATURE,
            top_p: TOP_P,
            messages,
        }
    }
}

fn remap_role(role: &str) -> &str {
    match role {
        "system" => "user",
        other => other,
    }
}

/// Raw upstream body, chunked however the transport delivers it.
pub type ByteStream = BoxStream<'static, reqwest::Result<Bytes>>;

/// HTTP client bound to one upstream.
#[derive(Debug, Clone)]
pub struct UpstreamClient {
    client: reqwest::Client,
    url: String,
    access_code: String,
    default_model: String,
    token_ttl_secs: i64,
}

impl UpstreamClient {
    pub fn new(config: &ProxyConfig) -> ProxyResult<Self> {
        let mut builder = reqwest::Client::builder()
            .default_headers(default_headers(config.base_url_trimmed())?)
            .danger_accept_invalid_certs(config.accept_invalid_certs);
        if let Some(secs) = config.request_timeout_secs {
            builder = builder.timeout(Duration::from_secs(secs));
        }

        Ok(Self {
            client: builder.build()?,
            url: config.upstream_url(),
            access_code: config.access_code.clone(),
            default_model: config.default_model.clone(),
            token_ttl_secs: config.token_ttl_secs,
        })
    }

    pub fn default_model(&self) -> &str {
        &self.default_model
    }

    /// Send the request and open the upstream body stream once the upstream
    /// has answered with a success status.
    pub async fn open(&self, req: &ChatCompletionRequest) -> ProxyResult<ByteStream> {
        let body = UpstreamRequest::from_chat(req, &self.default_model);
        let token = create_access_token(
            &self.access_code,
            chrono::Utc::now().timestamp(),
            self.token_ttl_secs,
        )?;

        debug!(
            url = %self.url,
            model = %body.model,
            messages = body.messages.len(),
            "calling upstream"
        );

        let response = self
            .client
            .post(&self.url)
            .header(AUTH_HEADER, token)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            error!(%status, body = %text, "upstream error");
            return Err(ProxyError::UpstreamStatus {
                status: status.as_u16(),
                body: text,
            });
        }

        Ok(response.bytes_stream().boxed())
    }
}

fn default_headers(base_url: &str) -> ProxyResult<HeaderMap> {
    let mut headers = HeaderMap::new();
    let fixed: [(&str, &str); 7] = [
        ("accept", "*/*"),
        ("accept-language", "en-US,en;q=0.9"),
        ("cache-control", "no-cache"),
        ("content-type", "application/json"),
        ("oai-language", "en-US"),
        ("pragma", "no-cache"),
        ("user-agent", USER_AGENT),
    ];
    for (name, value) in fixed {
        headers.insert(HeaderName::from_static(name), HeaderValue::from_static(value));
    }

    let origin = HeaderValue::from_str(base_url)
        .map_err(|e| ProxyError::Config(format!("invalid BASE_URL header value: {e}")))?;
    headers.insert(reqwest::header::ORIGIN, origin.clone());
    headers.insert(reqwest::header::REFERER, origin);
    Ok(headers)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn reshapes_request_for_upstream() {
        let req: ChatCompletionRequest = serde_json::from_value(json!({
            "model": "gpt-4",
            "stream": false,
            "messages": [
                {"role": "system", "content": "be brief"},
                {"role": "user", "content": "hi"},
                {"role": "assistant", "content": "hello"},
                {"role": "function", "content": "{}"}
            ]
        }))
        .unwrap();

        let body = serde_json::to_value(UpstreamRequest::from_chat(&req, "gpt-3.5-turbo")).unwrap();
        assert_eq!(body["model"], "gpt-4");
        assert_eq!(body["stream"], true);
        assert_eq!(body["frequency_penalty"], 0.0);
        assert_eq!(body["presence_penalty"], 0.0);
        assert_eq!(body["top_p"], 1.0);
        let roles: Vec<_> = body["messages"]
            .as_array()
            .unwrap()
            .iter()
            .map(|m| m["role"].as_str().unwrap().to_string())
            .collect();
        assert_eq!(roles, vec!["user", "user", "assistant", "function"]);
        assert_eq!(body["messages"][0]["content"], "be brief");
    }

    #[test]
    fn missing_model_uses_default() {
        let req = ChatCompletionRequest {
            messages: Some(vec![ChatMessage::new("user", "hi")]),
            ..Default::default()
        };
        let body = UpstreamRequest::from_chat(&req, "gpt-3.5-turbo");
        assert_eq!(body.model, "gpt-3.5-turbo");
    }

    #[test]
    fn default_headers_mirror_base_url() {
        let headers = default_headers("https://chat.example.com").unwrap();
        assert_eq!(headers["origin"], "https://chat.example.com");
        assert_eq!(headers["referer"], "https://chat.example.com");
        assert_eq!(headers["accept"], "*/*");
    }

    #[test]
    fn client_takes_default_model_from_config() {
        let config = ProxyConfig {
            base_url: "https://chat.example.com/".to_string(),
            default_model: "gpt-4o-mini".to_string(),
            ..ProxyConfig::default()
        };
        let client = UpstreamClient::new(&config).unwrap();
        assert_eq!(client.default_model(), "gpt-4o-mini");
        assert_eq!(config.upstream_url(), "https://chat.example.com/api/chat/openai");
    }
}
