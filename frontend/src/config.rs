// frontend/src/config.rs

use crate::error::FeedError;
use serde::de::Deserializer;
use serde::Deserialize;
use std::time::Duration;
use tracing::warn;

pub const WS_URL_ENV: &str = "RIVERWATCH_WS_URL";
pub const RECONNECT_BASE_ENV: &str = "RIVERWATCH_RECONNECT_BASE_MS";
pub const RECONNECT_MAX_ENV: &str = "RIVERWATCH_RECONNECT_MAX_MS";
pub const RECONNECT_ATTEMPTS_ENV: &str = "RIVERWATCH_RECONNECT_MAX_ATTEMPTS";

const DEFAULT_BASE_DELAY_MS: u64 = 1_000;
const DEFAULT_MAX_DELAY_MS: u64 = 30_000;
const DEFAULT_MAX_ATTEMPTS: u32 = 10;

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ReconnectConfig {
    #[serde(rename = "base_delay_ms", deserialize_with = "millis")]
    pub base_delay: Duration,
    #[serde(rename = "max_delay_ms", deserialize_with = "millis")]
    pub max_delay: Duration,
    pub max_attempts: u32,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_millis(DEFAULT_BASE_DELAY_MS),
            max_delay: Duration::from_millis(DEFAULT_MAX_DELAY_MS),
            max_attempts: DEFAULT_MAX_ATTEMPTS,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct FeedConfig {
    pub endpoint: Option<String>,
    pub reconnect: ReconnectConfig,
}

impl FeedConfig {
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = Some(endpoint.into());
        self
    }

    pub fn with_reconnect(mut self, reconnect: ReconnectConfig) -> Self {
        self.reconnect = reconnect;
        self
    }

    /// Normalized, validated stream endpoint.
    pub fn endpoint(&self) -> Result<String, FeedError> {
        match self.endpoint.as_deref() {
            Some(raw) => validate_endpoint(raw),
            None => Err(FeedError::MissingEndpoint),
        }
    }

    /// Build a config from a key lookup. Unparseable numbers keep their defaults.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut reconnect = ReconnectConfig::default();
        if let Some(ms) = parse_key::<u64>(&lookup, RECONNECT_BASE_ENV) {
            reconnect.base_delay = Duration::from_millis(ms);
        }
        if let Some(ms) = parse_key::<u64>(&lookup, RECONNECT_MAX_ENV) {
            reconnect.max_delay = Duration::from_millis(ms);
        }
        if let Some(n) = parse_key::<u32>(&lookup, RECONNECT_ATTEMPTS_ENV) {
            reconnect.max_attempts = n;
        }

        Self {
            endpoint: lookup(WS_URL_ENV).filter(|s| !s.trim().is_empty()),
            reconnect,
        }
    }

    #[cfg(not(target_arch = "wasm32"))]
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Browser builds bake the endpoint in at compile time and otherwise
    /// talk to `/ws` on the host that served the page.
    #[cfg(target_arch = "wasm32")]
    pub fn from_env() -> Self {
        let mut cfg = Self::from_lookup(|key| {
            let baked = match key {
                WS_URL_ENV => option_env!("RIVERWATCH_WS_URL"),
                RECONNECT_BASE_ENV => option_env!("RIVERWATCH_RECONNECT_BASE_MS"),
                RECONNECT_MAX_ENV => option_env!("RIVERWATCH_RECONNECT_MAX_MS"),
                RECONNECT_ATTEMPTS_ENV => option_env!("RIVERWATCH_RECONNECT_MAX_ATTEMPTS"),
                _ => None,
            };
            baked.map(str::to_string)
        });
        if cfg.endpoint.is_none() {
            cfg.endpoint = page_ws_endpoint();
        }
        cfg
    }
}

fn parse_key<T: std::str::FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Option<T> {
    let raw = lookup(key)?;
    match raw.trim().parse::<T>() {
        Ok(v) => Some(v),
        Err(_) => {
            warn!(key, value = %raw, "ignoring unparseable feed setting");
            None
        }
    }
}

fn millis<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
    u64::deserialize(d).map(Duration::from_millis)
}

#[cfg(target_arch = "wasm32")]
fn page_ws_endpoint() -> Option<String> {
    let loc = web_sys::window()?.location();
    let protocol = loc.protocol().unwrap_or_else(|_| "http:".to_string());
    let host = loc.host().ok().filter(|h| !h.is_empty())?;
    let ws_scheme = if protocol == "https:" { "wss" } else { "ws" };
    Some(format!("{ws_scheme}://{host}/ws"))
}

/// Map an http(s) base or bare host onto a ws(s) URL. Fragments are dropped.
pub fn normalize_endpoint(raw: &str) -> String {
    let mut url = raw.trim().to_string();
    if let Some(idx) = url.find('#') {
        url.truncate(idx);
    }
    let url = url.trim_end_matches('/');

    if let Some(rest) = url.strip_prefix("https://") {
        format!("wss://{rest}")
    } else if let Some(rest) = url.strip_prefix("http://") {
        format!("ws://{rest}")
    } else if url.contains("://") {
        url.to_string()
    } else {
        format!("ws://{url}")
    }
}

pub fn validate_endpoint(raw: &str) -> Result<String, FeedError> {
    if raw.trim().is_empty() {
        return Err(FeedError::MissingEndpoint);
    }

    let normalized = normalize_endpoint(raw);
    let invalid = |reason: String| FeedError::InvalidEndpoint {
        endpoint: raw.to_string(),
        reason,
    };

    let parsed = url::Url::parse(&normalized).map_err(|e| invalid(e.to_string()))?;
    if !matches!(parsed.scheme(), "ws" | "wss") {
        return Err(invalid(format!("unsupported scheme {:?}", parsed.scheme())));
    }
    if parsed.host_str().is_none_or(str::is_empty) {
        return Err(invalid("missing host".to_string()));
    }
    Ok(normalized)
}
