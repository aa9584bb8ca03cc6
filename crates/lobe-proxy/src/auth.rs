//! Caller bearer-token check and the upstream access credential.

use base64::{engine::general_purpose::STANDARD, Engine};
use serde::Serialize;

use crate::error::ProxyResult;

/// Prefix the upstream expects in front of the encoded claims.
pub const TOKEN_PREFIX: &str = "http_nosafe.";

/// Header carrying the credential on upstream requests.
pub const AUTH_HEADER: &str = "x-lobe-chat-auth";

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct AccessClaims<'a> {
    access_code: &'a str,
    api_key: &'a str,
    endpoint: &'a str,
    iat: i64,
    exp: i64,
}

/// Build the unsigned upstream credential: `http_nosafe.` + base64 of the JSON
/// claims, valid for `ttl_secs` from `now`.
pub fn create_access_token(access_code: &str, now: i64, ttl_secs: i64) -> ProxyResult<String> {
    let claims = AccessClaims {
        access_code,
        api_key: "",
        endpoint: "",
        iat: now,
        exp: now + ttl_secs,
    };
    let json = serde_json::to_vec(&claims)?;
    Ok(format!("{TOKEN_PREFIX}{}", STANDARD.encode(json)))
}

/// Check an `Authorization` header value against the configured token.
/// With no token configured every request is allowed.
pub fn is_authorized(expected: Option<&str>, header: Option<&str>) -> bool {
    let Some(expected) = expected else {
        return true;
    };
    header
        .and_then(|value| value.strip_prefix("Bearer "))
        .is_some_and(|token| token == expected)
}
