//! HTTP client for the Plex sessions endpoint.
//!
//! Wraps `/status/sessions` with a timeout and maps entries into snapshots.

use anyhow::{bail, Context, Result};

use beetbrainz_types::{PlexSession, PlexSessionsResponse};

use crate::config::PlexSettings;
use crate::models::{MediaItem, PlayerState, SessionSnapshot};

/// Source of active playback sessions for the poller.
pub trait SessionSource: Send {
    /// Fetch every active playback entry.
    fn fetch_sessions(&self) -> Result<Vec<SessionSnapshot>>;
}

pub struct PlexClient {
    sessions_url: String,
    token: String,
    agent: ureq::Agent,
}

impl PlexClient {
    pub fn new(settings: &PlexSettings) -> Self {
        let config = ureq::Agent::config_builder()
            .timeout_global(Some(settings.timeout))
            .http_status_as_error(false)
            .build();
        Self {
            sessions_url: format!("{}/status/sessions", settings.base_url.trim_end_matches('/')),
            token: settings.token.clone(),
            agent: ureq::Agent::new_with_config(config),
        }
    }
}

impl SessionSource for PlexClient {
    fn fetch_sessions(&self) -> Result<Vec<SessionSnapshot>> {
        let url = &self.sessions_url;
        let mut resp = match self
            .agent
            .get(url)
            .query("X-Plex-Token", &self.token)
            .header("Accept", "application/json")
            .call()
        {
            Ok(resp) => resp,
            Err(err) => bail!("plex sessions request failed (transport) url={url}: {err}"),
        };
        let code = resp.status();
        if code.as_u16() >= 400 {
            bail!("plex sessions request failed (status {code}) url={url}");
        }
        let body: PlexSessionsResponse = resp
            .body_mut()
            .read_json()
            .context("plex sessions response parse failed")?;
        Ok(body
            .media_container
            .metadata
            .into_iter()
            .map(snapshot_from_session)
            .collect())
    }
}

fn snapshot_from_session(session: PlexSession) -> SessionSnapshot {
    SessionSnapshot {
        user_id: session.user.id,
        user_name: session.user.title,
        media_type: session.media_type,
        item: MediaItem {
            artist: session.grandparent_title,
            album: session.parent_title,
            track: session.title,
        },
        offset_ms: session.view_offset,
        duration_ms: session.duration,
        state: PlayerState::from_plex(&session.player.state),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn snapshot_maps_plex_hierarchy() {
        let raw = r#"{"MediaContainer":{"Metadata":[{
            "type":"track","title":"Song","parentTitle":"Album","grandparentTitle":"Band",
            "viewOffset":42000,"duration":200000,
            "User":{"id":"7","title":"alice"},"Player":{"state":"playing"}
        }]}}"#;
        let resp: PlexSessionsResponse = serde_json::from_str(raw).unwrap();
        let snapshot = snapshot_from_session(resp.media_container.metadata[0].clone());
        assert_eq!(snapshot.user_id, "7");
        assert_eq!(snapshot.user_name, "alice");
        assert_eq!(snapshot.item.artist, "Band");
        assert_eq!(snapshot.item.album, "Album");
        assert_eq!(snapshot.item.track, "Song");
        assert_eq!(snapshot.offset_ms, 42000);
        assert_eq!(snapshot.state, PlayerState::Playing);
    }

    #[test]
    fn unreachable_server_is_an_error() {
        let client = PlexClient::new(&PlexSettings {
            base_url: "http://127.0.0.1:1".to_string(),
            token: "plex-token".to_string(),
            polling: true,
            poll_interval: Duration::from_secs(2),
            refresh_window: Duration::from_secs(10),
            timeout: Duration::from_millis(200),
        });
        assert!(client.fetch_sessions().is_err());
    }
}
