//! Configuration from defaults, an optional `lobe-proxy.yml`, and environment
//! variables (later sources win).
//!
//! ```yaml
//! port: 3000
//! base_url: "https://chat.example.com"
//! auth_token: "sk-local"
//! decode_mode: raw-text
//! sentinel: "[DONE]"
//! ```
//!
//! **Environment variables:**
//! - `PORT`: server port (default: 3000)
//! - `BASE_URL`: upstream base URL (default: http://localhost:1234)
//! - `AUTH_TOKEN`: bearer token callers must present (unset: no auth)
//! - `ACCESS_CODE`: access code embedded in the upstream credential
//! - `DEFAULT_MODEL`: model used when a request names none (default: gpt-3.5-turbo)
//! - `DECODE_MODE`: `strict-json` or `raw-text` (default: strict-json)
//! - `STREAM_SENTINEL`: end-of-stream payload (default: `[DONE]`)
//! - `REQUEST_TIMEOUT_SECS`: upstream request timeout (default: none)

use anyhow::{Context, Result};
use serde::Deserialize;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::error::ProxyError;

pub const DEFAULT_PORT: u16 = 3000;
pub const DEFAULT_BASE_URL: &str = "http://localhost:1234";
pub const DEFAULT_MODEL: &str = "gpt-3.5-turbo";
pub const DEFAULT_SENTINEL: &str = "[DONE]";
pub const DEFAULT_TOKEN_TTL_SECS: i64 = 100;
pub const UPSTREAM_PATH: &str = "/api/chat/openai";

const CONFIG_CANDIDATES: &[&str] = &["lobe-proxy.yml", "lobe-proxy.yaml", ".lobe-proxy.yml"];

/// How upstream payload fragments are turned into text.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DecodeMode {
    /// Each fragment is a JSON string literal.
    #[default]
    StrictJson,
    /// Each fragment is taken verbatim, minus one pair of surrounding quotes.
    RawText,
}

impl FromStr for DecodeMode {
    type Err = ProxyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "strict-json" | "strict_json" | "json" => Ok(Self::StrictJson),
            "raw-text" | "raw_text" | "raw" => Ok(Self::RawText),
            other => Err(ProxyError::Config(format!("unknown decode mode: {other}"))),
        }
    }
}

impl fmt::Display for DecodeMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::StrictJson => f.write_str("strict-json"),
            Self::RawText => f.write_str("raw-text"),
        }
    }
}

/// Immutable process configuration, built once at startup.
#[derive(Debug, Clone)]
pub struct ProxyConfig {
    pub port: u16,
    pub base_url: String,
    pub auth_token: Option<String>,
    pub access_code: String,
    pub default_model: String,
    pub decode_mode: DecodeMode,
    pub sentinel: String,
    pub request_timeout_secs: Option<u64>,
    pub accept_invalid_certs: bool,
    pub token_ttl_secs: i64,
}

/// On-disk shape of `lobe-proxy.yml`. Every field is optional.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct FileConfig {
    port: Option<u16>,
    base_url: Option<String>,
    auth_token: Option<String>,
    access_code: Option<String>,
    default_model: Option<String>,
    decode_mode: Option<DecodeMode>,
    sentinel: Option<String>,
    request_timeout_secs: Option<u64>,
    accept_invalid_certs: Option<bool>,
    token_ttl_secs: Option<i64>,
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            base_url: DEFAULT_BASE_URL.to_string(),
            auth_token: None,
            access_code: String::new(),
            default_model: DEFAULT_MODEL.to_string(),
            decode_mode: DecodeMode::default(),
            sentinel: DEFAULT_SENTINEL.to_string(),
            request_timeout_secs: None,
            accept_invalid_certs: true,
            token_ttl_secs: DEFAULT_TOKEN_TTL_SECS,
        }
    }
}

impl ProxyConfig {
    /// Defaults, then the config file (explicit path or first candidate found),
    /// then the process environment.
    pub fn load(config_path: Option<&Path>) -> Result<Self> {
        let mut config = Self::default();

        let path = config_path.map(Path::to_path_buf).or_else(find_config_file);
        if let Some(path) = path {
            config = config.merge_yaml_file(&path)?;
        }

        config
            .apply_env(|key| std::env::var(key).ok())
            .context("invalid environment configuration")?;
        Ok(config)
    }

    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self> {
        Self::default().merge_yaml_file(path.as_ref())
    }

    fn merge_yaml_file(self, path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        let file: FileConfig = serde_yaml_ng::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;
        Ok(self.merge_file(file))
    }

    fn merge_file(mut self, file: FileConfig) -> Self {
        if let Some(port) = file.port {
            self.port = port;
        }
        if let Some(base_url) = file.base_url {
            self.base_url = base_url;
        }
        if file.auth_token.is_some() {
            self.auth_token = file.auth_token.filter(|t| !t.is_empty());
        }
        if let Some(access_code) = file.access_code {
            self.access_code = access_code;
        }
        if let Some(model) = file.default_model {
            self.default_model = model;
        }
        if let Some(mode) = file.decode_mode {
            self.decode_mode = mode;
        }
        if let Some(sentinel) = file.sentinel {
            self.sentinel = sentinel;
        }
        if file.request_timeout_secs.is_some() {
            self.request_timeout_secs = file.request_timeout_secs;
        }
        if let Some(accept) = file.accept_invalid_certs {
            self.accept_invalid_certs = accept;
        }
        if let Some(ttl) = file.token_ttl_secs {
            self.token_ttl_secs = ttl;
        }
        self
    }

    /// Overlay values from an environment lookup. Taking the lookup as a
    /// closure keeps tests away from the real process environment.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<(), ProxyError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(port) = lookup("PORT") {
            self.port = port
                .trim()
                .parse()
                .map_err(|_| ProxyError::Config(format!("invalid PORT: {port}")))?;
        }
        if let Some(base_url) = lookup("BASE_URL") {
            self.base_url = base_url;
        }
        if let Some(token) = lookup("AUTH_TOKEN") {
            self.auth_token = Some(token).filter(|t| !t.is_empty());
        }
        if let Some(access_code) = lookup("ACCESS_CODE") {
            self.access_code = access_code;
        }
        if let Some(model) = lookup("DEFAULT_MODEL") {
            self.default_model = model;
        }
        if let Some(mode) = lookup("DECODE_MODE") {
            self.decode_mode = mode.parse()?;
        }
        if let Some(sentinel) = lookup("STREAM_SENTINEL") {
            self.sentinel = sentinel;
        }
        if let Some(timeout) = lookup("REQUEST_TIMEOUT_SECS") {
            let secs = timeout.trim().parse().map_err(|_| {
                ProxyError::Config(format!("invalid REQUEST_TIMEOUT_SECS: {timeout}"))
            })?;
            self.request_timeout_secs = Some(secs);
        }
        Ok(())
    }

    pub fn base_url_trimmed(&self) -> &str {
        self.base_url.trim_end_matches('/')
    }

    pub fn upstream_url(&self) -> String {
        format!("{}{}", self.base_url_trimmed(), UPSTREAM_PATH)
    }

    pub fn requires_auth(&self) -> bool {
        self.auth_token.is_some()
    }
}

fn find_config_file() -> Option<PathBuf> {
    CONFIG_CANDIDATES
        .iter()
        .map(PathBuf::from)
        .find(|path| path.exists())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env_of(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn defaults_match_original_deployment() {
        let config = ProxyConfig::default();
        assert_eq!(config.port, 3000);
        assert_eq!(config.upstream_url(), "http://localhost:1234/api/chat/openai");
        assert_eq!(config.decode_mode, DecodeMode::StrictJson);
        assert_eq!(config.sentinel, "[DONE]");
        assert!(!config.requires_auth());
    }

    #[test]
    fn env_overrides_defaults() {
        let env = env_of(&[
            ("PORT", "8080"),
            ("BASE_URL", "https://chat.example.com/"),
            ("AUTH_TOKEN", "secret"),
            ("DECODE_MODE", "raw-text"),
            ("REQUEST_TIMEOUT_SECS", "30"),
        ]);
        let mut config = ProxyConfig::default();
        config.apply_env(|k| env.get(k).cloned()).unwrap();

        assert_eq!(config.port, 8080);
        assert_eq!(
            config.upstream_url(),
            "https://chat.example.com/api/chat/openai"
        );
        assert_eq!(config.auth_token.as_deref(), Some("secret"));
        assert_eq!(config.decode_mode, DecodeMode::RawText);
        assert_eq!(config.request_timeout_secs, Some(30));
    }

    #[test]
    fn empty_auth_token_disables_auth() {
        let env = env_of(&[("AUTH_TOKEN", "")]);
        let mut config = ProxyConfig::default();
        config.apply_env(|k| env.get(k).cloned()).unwrap();
        assert!(!config.requires_auth());
    }

    #[test]
    fn invalid_port_is_rejected() {
        let env = env_of(&[("PORT", "eighty")]);
        let mut config = ProxyConfig::default();
        let err = config.apply_env(|k| env.get(k).cloned()).unwrap_err();
        assert!(matches!(err, ProxyError::Config(_)));
    }

    #[test]
    fn decode_mode_parses_aliases() {
        assert_eq!("json".parse::<DecodeMode>().unwrap(), DecodeMode::StrictJson);
        assert_eq!("RAW".parse::<DecodeMode>().unwrap(), DecodeMode::RawText);
        assert!("xml".parse::<DecodeMode>().is_err());
        assert_eq!(DecodeMode::RawText.to_string(), "raw-text");
    }
}
