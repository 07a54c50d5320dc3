//! Push-mode request processor.
//!
//! Translates webhook payloads into [`PlaybackEvent`]s and forwards them to
//! ListenBrainz. There is no per-user state on this path; the media server
//! decides when a track counts as scrobbled.

use std::sync::Arc;

use beetbrainz_types::{PlexWebhook, TautulliWebhook};

use crate::config::UserTokens;
use crate::listenbrainz::{unix_now, ListenSink, SubmissionError};
use crate::metadata::MetadataResolver;
use crate::models::{EventKind, MediaItem, PlaybackEvent};

/// What happened to a webhook event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Forwarded to ListenBrainz (successfully or not).
    Handled,
    /// Not an audio track, or the user has no token.
    Ignored,
}

pub struct RequestProcessor {
    resolver: Arc<MetadataResolver>,
    sink: Arc<dyn ListenSink>,
    tokens: Arc<UserTokens>,
}

impl RequestProcessor {
    pub fn new(
        resolver: Arc<MetadataResolver>,
        sink: Arc<dyn ListenSink>,
        tokens: Arc<UserTokens>,
    ) -> Self {
        Self {
            resolver,
            sink,
            tokens,
        }
    }

    /// Handle one event; submission failures are logged, not returned.
    pub fn handle(&self, event: &PlaybackEvent) -> Outcome {
        if event.media_type != "track" {
            tracing::debug!(item = %event.item, media_type = %event.media_type, "not an audio track; ignoring");
            return Outcome::Ignored;
        }
        let Some(token) = self.tokens.lookup(&event.user) else {
            tracing::debug!(user = %event.user, "no listenbrainz token configured for user");
            return Outcome::Ignored;
        };

        let metadata = self.resolver.resolve(&event.item);
        let result = match event.kind {
            EventKind::Play | EventKind::Resume => self.sink.playing_now(token, &metadata),
            EventKind::Scrobble => self.sink.submit_listen(token, &metadata, unix_now()),
        };
        log_result(event, &result);
        Outcome::Handled
    }
}

fn log_result(event: &PlaybackEvent, result: &Result<(), SubmissionError>) {
    match (event.kind, result) {
        (EventKind::Scrobble, Ok(())) => {
            tracing::info!(user = %event.user, item = %event.item, "user has listened")
        }
        (_, Ok(())) => tracing::info!(user = %event.user, item = %event.item, "user is now listening"),
        (kind, Err(err)) => tracing::warn!(
            user = %event.user,
            item = %event.item,
            kind = ?kind,
            error = %err,
            "listenbrainz submission failed"
        ),
    }
}

/// Map a Plex webhook; `None` for events that carry no playback meaning.
pub fn from_plex_webhook(hook: PlexWebhook) -> Option<PlaybackEvent> {
    let kind = match hook.event.as_str() {
        "media.play" => EventKind::Play,
        "media.resume" => EventKind::Resume,
        "media.scrobble" => EventKind::Scrobble,
        _ => return None,
    };
    Some(PlaybackEvent {
        kind,
        user: hook.account.title,
        media_type: hook.metadata.media_type,
        item: MediaItem {
            artist: hook.metadata.grandparent_title,
            album: hook.metadata.parent_title,
            track: hook.metadata.title,
        },
    })
}

/// Map a Tautulli notification; `watched` counts as a scrobble.
pub fn from_tautulli(hook: TautulliWebhook) -> Option<PlaybackEvent> {
    let kind = match hook.action.as_str() {
        "play" => EventKind::Play,
        "resume" => EventKind::Resume,
        "watched" => EventKind::Scrobble,
        _ => return None,
    };
    Some(PlaybackEvent {
        kind,
        user: hook.user_name,
        media_type: hook.media_type,
        item: MediaItem {
            artist: hook.artist_name,
            album: hook.album_name,
            track: hook.track_name,
        },
    })
}
