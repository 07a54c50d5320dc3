use serde::{Deserialize, Serialize};

/// Kind discriminator for a ListenBrainz submission.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ListenType {
    /// Ephemeral "now playing" notification.
    PlayingNow,
    /// A single completed listen.
    Single,
}

/// Optional enrichment block attached to submitted track metadata.
///
/// Empty fields are omitted from the wire payload.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct AdditionalInfo {
    /// Source tag, e.g. `Plex Media Server`.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub listening_from: String,
    /// MusicBrainz release id.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub release_mbid: Option<String>,
    /// MusicBrainz artist ids.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub artist_mbids: Vec<String>,
    /// MusicBrainz recording id.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recording_mbid: Option<String>,
    /// MusicBrainz release group id.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub release_group_mbid: Option<String>,
    /// MusicBrainz work ids.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub work_mbids: Vec<String>,
    /// Free-form tags.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
}

/// Track metadata as submitted to ListenBrainz.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct TrackMetadata {
    pub artist_name: String,
    pub track_name: String,
    pub release_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub additional_info: Option<AdditionalInfo>,
}

/// One entry of the `payload` array.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct ListenPayload {
    /// Unix timestamp (seconds); absent for now-playing notifications.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub listened_at: Option<i64>,
    pub track_metadata: TrackMetadata,
}

/// Request body for `POST /1/submit-listens`.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct SubmitListens {
    pub listen_type: ListenType,
    pub payload: Vec<ListenPayload>,
}

impl SubmitListens {
    /// Build a now-playing submission for a single track.
    pub fn playing_now(track_metadata: TrackMetadata) -> Self {
        Self {
            listen_type: ListenType::PlayingNow,
            payload: vec![ListenPayload {
                listened_at: None,
                track_metadata,
            }],
        }
    }

    /// Build a single-listen submission stamped with `listened_at`.
    pub fn single(track_metadata: TrackMetadata, listened_at: i64) -> Self {
        Self {
            listen_type: ListenType::Single,
            payload: vec![ListenPayload {
                listened_at: Some(listened_at),
                track_metadata,
            }],
        }
    }
}

/// Item returned by the beets web plugin (`/item/query/...`).
///
/// Only the fields used for matching and enrichment are decoded.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct BeetsItem {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub album: String,
    #[serde(default)]
    pub artist: String,
    #[serde(default, rename = "mb_trackid")]
    pub recording_id: String,
    #[serde(default, rename = "mb_albumid")]
    pub release_id: String,
    #[serde(default, rename = "mb_artistid")]
    pub artist_id: String,
    #[serde(default, rename = "mb_releasegroupid")]
    pub release_group_id: String,
    #[serde(default, rename = "mb_workid")]
    pub work_id: String,
}

/// Response envelope for a beets item query.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct BeetsQueryResponse {
    #[serde(default)]
    pub results: Vec<BeetsItem>,
}

/// Response of the Plex `/status/sessions` endpoint.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct PlexSessionsResponse {
    #[serde(rename = "MediaContainer", default)]
    pub media_container: PlexMediaContainer,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct PlexMediaContainer {
    /// Active playback entries; Plex omits the key when nothing is playing.
    #[serde(rename = "Metadata", default)]
    pub metadata: Vec<PlexSession>,
}

/// One active playback entry reported by Plex.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct PlexSession {
    #[serde(rename = "type", default)]
    pub media_type: String,
    #[serde(default)]
    pub title: String,
    #[serde(rename = "parentTitle", default)]
    pub parent_title: String,
    #[serde(rename = "grandparentTitle", default)]
    pub grandparent_title: String,
    /// Playback offset in milliseconds.
    #[serde(rename = "viewOffset", default)]
    pub view_offset: i64,
    /// Track duration in milliseconds.
    #[serde(default)]
    pub duration: i64,
    #[serde(rename = "User", default)]
    pub user: PlexUser,
    #[serde(rename = "Player", default)]
    pub player: PlexPlayer,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct PlexUser {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub title: String,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct PlexPlayer {
    /// `playing`, `paused` or `buffering`.
    #[serde(default)]
    pub state: String,
}

/// JSON carried in the `payload` form field of a Plex webhook.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct PlexWebhook {
    /// Event name, e.g. `media.play` or `media.scrobble`.
    #[serde(default)]
    pub event: String,
    #[serde(rename = "Account", default)]
    pub account: PlexAccount,
    #[serde(rename = "Metadata", default)]
    pub metadata: PlexWebhookItem,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct PlexAccount {
    #[serde(default)]
    pub title: String,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct PlexWebhookItem {
    #[serde(rename = "type", default)]
    pub media_type: String,
    #[serde(default)]
    pub title: String,
    #[serde(rename = "parentTitle", default)]
    pub parent_title: String,
    #[serde(rename = "grandparentTitle", default)]
    pub grandparent_title: String,
}

/// Tautulli notification agent payload.
///
/// The JSON body has to be configured in Tautulli's webhook agent to carry
/// these keys.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct TautulliWebhook {
    /// `play`, `resume` or `watched`.
    #[serde(default)]
    pub action: String,
    #[serde(default)]
    pub user_name: String,
    #[serde(default)]
    pub artist_name: String,
    #[serde(default)]
    pub album_name: String,
    #[serde(default)]
    pub track_name: String,
    #[serde(default)]
    pub media_type: String,
}
