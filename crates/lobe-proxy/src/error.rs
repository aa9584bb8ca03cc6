//! Proxy error types and their HTTP rendering.

use actix_web::{http::StatusCode, HttpResponse, ResponseError};
use thiserror::Error;

use crate::types::ErrorEnvelope;

/// Message returned to callers for any server-side failure. Upstream details
/// are logged, never echoed.
pub const GENERIC_SERVER_ERROR: &str = "An error occurred while processing your request.";

#[derive(Debug, Error)]
pub enum ProxyError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("unauthorized")]
    Unauthorized,

    #[error("endpoint not found")]
    NotFound,

    #[error("upstream returned {status}: {body}")]
    UpstreamStatus { status: u16, body: String },

    #[error("upstream request failed: {0}")]
    Upstream(#[from] reqwest::Error),

    #[error("upstream stream error: {0}")]
    Transport(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl ProxyError {
    /// The `error.type` tag of the JSON error envelope.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::InvalidRequest(_) | Self::NotFound => "invalid_request_error",
            Self::Unauthorized => "authentication_error",
            _ => "server_error",
        }
    }

    /// Caller-facing message. Server-side failures collapse to a generic text.
    pub fn public_message(&self) -> String {
        match self {
            Self::InvalidRequest(msg) => msg.clone(),
            Self::Unauthorized => "Invalid or missing bearer token.".to_string(),
            Self::NotFound => "The requested endpoint was not found.".to_string(),
            _ => GENERIC_SERVER_ERROR.to_string(),
        }
    }
}

impl ResponseError for ProxyError {
    fn status_code(&self) -> StatusCode {
        match self {
            Self::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            Self::Unauthorized => StatusCode::UNAUTHORIZED,
            Self::NotFound => StatusCode::NOT_FOUND,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(self.status_code())
            .json(ErrorEnvelope::new(self.public_message(), self.kind()))
    }
}

pub type ProxyResult<T> = Result<T, ProxyError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn server_errors_hide_upstream_details() {
        let err = ProxyError::UpstreamStatus {
            status: 502,
            body: "secret upstream trace".to_string(),
        };
        assert_eq!(err.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(err.kind(), "server_error");
        assert_eq!(err.public_message(), GENERIC_SERVER_ERROR);
    }

    #[test]
    fn invalid_request_is_client_error() {
        let err = ProxyError::InvalidRequest("`messages` is required".to_string());
        assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(err.kind(), "invalid_request_error");
        assert_eq!(err.public_message(), "`messages` is required");
    }

    #[test]
    fn not_found_uses_invalid_request_tag() {
        let err = ProxyError::NotFound;
        assert_eq!(err.status_code(), StatusCode::NOT_FOUND);
        assert_eq!(err.kind(), "invalid_request_error");
    }
}
