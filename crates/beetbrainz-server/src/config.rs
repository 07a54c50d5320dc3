//! Configuration loading and parsing.
//!
//! Defines the relay config schema and resolves defaults into the settings
//! consumed by the clients, the tracker and the webhook server.

use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Deserialize;

const DEFAULT_BIND: &str = "0.0.0.0:5000";
const DEFAULT_LISTENBRAINZ_URL: &str = "https://api.listenbrainz.org";
const DEFAULT_LISTENING_FROM: &str = "Plex Media Server";
const DEFAULT_BEETS_PORT: u16 = 8337;
const DEFAULT_POLL_INTERVAL_MS: u64 = 2000;
const DEFAULT_REFRESH_WINDOW_MS: u64 = 10_000;
const DEFAULT_MAX_ATTEMPTS: u32 = 5;
const DEFAULT_RETRY_STEP_MS: u64 = 5000;
const DEFAULT_SUBMIT_TIMEOUT_MS: u64 = 10_000;
const DEFAULT_LOOKUP_TIMEOUT_MS: u64 = 5000;

/// Top-level relay configuration loaded from TOML.
#[derive(Debug, Default, Deserialize)]
pub struct RelayConfig {
    /// Webhook listener bind address (host:port).
    pub bind: Option<String>,
    /// ListenBrainz submission settings.
    pub listenbrainz: Option<ListenBrainzConfig>,
    /// beets web plugin settings; enrichment is disabled when absent.
    pub beets: Option<BeetsConfig>,
    /// Plex server settings; required for polling mode.
    pub plex: Option<PlexConfig>,
    /// Per-user ListenBrainz tokens.
    #[serde(default)]
    pub users: Vec<UserConfig>,
}

/// ListenBrainz configuration.
#[derive(Debug, Default, Deserialize)]
pub struct ListenBrainzConfig {
    /// Optional API root override (defaults to https://api.listenbrainz.org).
    pub base_url: Option<String>,
    /// Per-request timeout in milliseconds (default: 10000).
    pub timeout_ms: Option<u64>,
    /// Total attempts for a listen submission (default: 5).
    pub max_attempts: Option<u32>,
    /// Linear backoff step in milliseconds (default: 5000).
    pub retry_step_ms: Option<u64>,
    /// Source tag attached to enriched metadata (default: "Plex Media Server").
    pub listening_from: Option<String>,
}

/// beets web plugin configuration.
#[derive(Debug, Default, Deserialize)]
pub struct BeetsConfig {
    /// Set to false to keep the section but skip lookups.
    pub enabled: Option<bool>,
    /// Host or IP of the beets web server.
    pub host: Option<String>,
    /// Port of the beets web server (default: 8337).
    pub port: Option<u16>,
    /// Per-request timeout in milliseconds (default: 5000).
    pub timeout_ms: Option<u64>,
}

/// Plex server configuration.
#[derive(Debug, Default, Deserialize)]
pub struct PlexConfig {
    /// Plex base URL, e.g. http://127.0.0.1:32400.
    pub url: Option<String>,
    /// Plex access token.
    pub token: Option<String>,
    /// Poll `/status/sessions` instead of relying on webhooks.
    pub polling: Option<bool>,
    /// Delay between polls in milliseconds (default: 2000).
    pub poll_interval_ms: Option<u64>,
    /// How often Plex refreshes the reported offset, in milliseconds (default: 10000).
    pub refresh_window_ms: Option<u64>,
    /// Per-request timeout in milliseconds (default: 5000).
    pub timeout_ms: Option<u64>,
}

/// A user allowed to scrobble, keyed by their Plex account title.
#[derive(Debug, Deserialize)]
pub struct UserConfig {
    pub name: String,
    pub token: String,
}

/// Resolved ListenBrainz client settings.
#[derive(Debug, Clone)]
pub struct ListenBrainzSettings {
    pub base_url: String,
    pub timeout: Duration,
    pub max_attempts: u32,
    pub retry_step: Duration,
    pub listening_from: String,
}

/// Resolved beets client settings.
#[derive(Debug, Clone)]
pub struct BeetsSettings {
    pub base_url: String,
    pub timeout: Duration,
}

/// Resolved Plex settings.
#[derive(Debug, Clone)]
pub struct PlexSettings {
    pub base_url: String,
    pub token: String,
    pub polling: bool,
    pub poll_interval: Duration,
    pub refresh_window: Duration,
    pub timeout: Duration,
}

/// Case-insensitive lookup of ListenBrainz tokens by user name.
#[derive(Debug, Clone, Default)]
pub struct UserTokens {
    entries: Vec<(String, String)>,
}

impl UserTokens {
    pub fn new(entries: Vec<(String, String)>) -> Self {
        Self { entries }
    }

    /// Return the token configured for `user`, if any.
    pub fn lookup(&self, user: &str) -> Option<&str> {
        let user = user.trim().to_lowercase();
        self.entries
            .iter()
            .find(|(name, _)| name.to_lowercase() == user)
            .map(|(_, token)| token.as_str())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl RelayConfig {
    /// Load configuration from disk.
    pub fn load(path: &Path) -> Result<Self> {
        let raw =
            std::fs::read_to_string(path).with_context(|| format!("read config {:?}", path))?;
        Self::parse(&raw).with_context(|| format!("parse config {:?}", path))
    }

    fn parse(raw: &str) -> Result<Self> {
        Ok(toml::from_str::<RelayConfig>(raw)?)
    }
}

/// Parse the bind address, falling back to 0.0.0.0:5000.
pub fn bind_from_config(cfg: &RelayConfig) -> Result<SocketAddr> {
    let bind = cfg.bind.as_deref().unwrap_or(DEFAULT_BIND);
    bind.parse().with_context(|| format!("parse bind {bind}"))
}

/// Collect user tokens, skipping entries without a token.
pub fn tokens_from_config(cfg: &RelayConfig) -> UserTokens {
    let mut entries = Vec::new();
    for user in &cfg.users {
        let name = user.name.trim();
        let token = user.token.trim();
        if name.is_empty() || token.is_empty() {
            tracing::warn!(user = %name, "user entry without name or token ignored");
            continue;
        }
        entries.push((name.to_string(), token.to_string()));
    }
    UserTokens::new(entries)
}

/// Resolve ListenBrainz settings and defaults.
pub fn listenbrainz_from_config(cfg: &RelayConfig) -> Result<ListenBrainzSettings> {
    let default = ListenBrainzConfig::default();
    let lb = cfg.listenbrainz.as_ref().unwrap_or(&default);
    let max_attempts = lb.max_attempts.unwrap_or(DEFAULT_MAX_ATTEMPTS);
    if max_attempts == 0 {
        return Err(anyhow::anyhow!("listenbrainz.max_attempts must be at least 1"));
    }
    let base_url = lb
        .base_url
        .as_deref()
        .unwrap_or(DEFAULT_LISTENBRAINZ_URL)
        .trim_end_matches('/')
        .to_string();
    let listening_from = lb
        .listening_from
        .clone()
        .filter(|value| !value.trim().is_empty())
        .unwrap_or_else(|| DEFAULT_LISTENING_FROM.to_string());
    Ok(ListenBrainzSettings {
        base_url,
        timeout: non_zero_millis(lb.timeout_ms, DEFAULT_SUBMIT_TIMEOUT_MS, "listenbrainz.timeout_ms")?,
        max_attempts,
        retry_step: Duration::from_millis(lb.retry_step_ms.unwrap_or(DEFAULT_RETRY_STEP_MS)),
        listening_from,
    })
}

/// Resolve beets settings; `None` disables metadata enrichment.
pub fn beets_from_config(cfg: &RelayConfig) -> Result<Option<BeetsSettings>> {
    let Some(beets) = cfg.beets.as_ref() else {
        return Ok(None);
    };
    if !beets.enabled.unwrap_or(true) {
        return Ok(None);
    }
    let Some(host) = beets.host.as_deref().map(str::trim).filter(|h| !h.is_empty()) else {
        tracing::warn!("beets section present but host is missing; enrichment disabled");
        return Ok(None);
    };
    let port = beets.port.unwrap_or(DEFAULT_BEETS_PORT);
    Ok(Some(BeetsSettings {
        base_url: format!("http://{host}:{port}"),
        timeout: non_zero_millis(beets.timeout_ms, DEFAULT_LOOKUP_TIMEOUT_MS, "beets.timeout_ms")?,
    }))
}

/// Resolve Plex settings; `None` when no Plex section is configured.
pub fn plex_from_config(cfg: &RelayConfig) -> Result<Option<PlexSettings>> {
    let Some(plex) = cfg.plex.as_ref() else {
        return Ok(None);
    };
    let polling = plex.polling.unwrap_or(false);
    let url = plex.url.as_deref().map(str::trim).filter(|u| !u.is_empty());
    let token = plex.token.as_deref().map(str::trim).filter(|t| !t.is_empty());
    let (base_url, token) = match (url, token) {
        (Some(url), Some(token)) => (url.trim_end_matches('/').to_string(), token.to_string()),
        _ if polling => {
            return Err(anyhow::anyhow!("plex.url and plex.token are required for polling"));
        }
        _ => return Ok(None),
    };
    Ok(Some(PlexSettings {
        base_url,
        token,
        polling,
        poll_interval: non_zero_millis(plex.poll_interval_ms, DEFAULT_POLL_INTERVAL_MS, "plex.poll_interval_ms")?,
        refresh_window: non_zero_millis(plex.refresh_window_ms, DEFAULT_REFRESH_WINDOW_MS, "plex.refresh_window_ms")?,
        timeout: non_zero_millis(plex.timeout_ms, DEFAULT_LOOKUP_TIMEOUT_MS, "plex.timeout_ms")?,
    }))
}

fn non_zero_millis(value: Option<u64>, default: u64, key: &str) -> Result<Duration> {
    match value.unwrap_or(default) {
        0 => Err(anyhow::anyhow!("{key} must be greater than zero")),
        ms => Ok(Duration::from_millis(ms)),
    }
}
