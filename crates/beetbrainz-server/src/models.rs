//! Domain models shared by the poller and the webhook path.

use std::fmt;

/// Track identity as reported by the media server.
///
/// Equality is exact and case-sensitive on all three fields.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MediaItem {
    pub artist: String,
    pub album: String,
    pub track: String,
}

impl fmt::Display for MediaItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} - {} ({})", self.artist, self.track, self.album)
    }
}

/// Player state as observed in a session snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlayerState {
    Playing,
    Paused,
}

impl PlayerState {
    /// Map a Plex `Player.state` string; buffering does not advance playback.
    pub fn from_plex(state: &str) -> Self {
        match state {
            "paused" | "buffering" => PlayerState::Paused,
            _ => PlayerState::Playing,
        }
    }
}

/// One active playback entry observed on a poll tick.
#[derive(Debug, Clone)]
pub struct SessionSnapshot {
    pub user_id: String,
    pub user_name: String,
    pub media_type: String,
    pub item: MediaItem,
    pub offset_ms: i64,
    pub duration_ms: i64,
    pub state: PlayerState,
}

/// Canonical webhook event kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    Play,
    Resume,
    Scrobble,
}

/// Source-agnostic record produced from a webhook payload.
#[derive(Debug, Clone)]
pub struct PlaybackEvent {
    pub kind: EventKind,
    pub user: String,
    pub media_type: String,
    pub item: MediaItem,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn media_item_display_matches_log_format() {
        let item = MediaItem {
            artist: "Band".to_string(),
            album: "Album".to_string(),
            track: "Song".to_string(),
        };
        assert_eq!(item.to_string(), "Band - Song (Album)");
    }

    #[test]
    fn player_state_maps_plex_values() {
        assert_eq!(PlayerState::from_plex("playing"), PlayerState::Playing);
        assert_eq!(PlayerState::from_plex("paused"), PlayerState::Paused);
        assert_eq!(PlayerState::from_plex("buffering"), PlayerState::Paused);
        assert_eq!(PlayerState::from_plex(""), PlayerState::Playing);
    }
}
