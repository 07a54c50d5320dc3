//! Track metadata resolution against the local beets index.
//!
//! The index is queried by title only; artist and album from the media server
//! are used to pick between several candidates. Lookups never fail the caller:
//! when nothing usable comes back the source metadata is returned unchanged.

use anyhow::Result;

use beetbrainz_types::{AdditionalInfo, BeetsItem, TrackMetadata};

use crate::models::MediaItem;

/// Compilation artist name that matches any candidate artist.
pub const VARIOUS_ARTISTS: &str = "Various Artists";

/// Title lookup against a metadata index.
pub trait MetadataIndex: Send + Sync {
    /// Return every entry whose title matches, in index order.
    fn query_title(&self, title: &str) -> Result<Vec<BeetsItem>>;
}

pub struct MetadataResolver {
    index: Option<Box<dyn MetadataIndex>>,
    listening_from: String,
}

impl MetadataResolver {
    pub fn new(index: Option<Box<dyn MetadataIndex>>, listening_from: String) -> Self {
        Self {
            index,
            listening_from,
        }
    }

    /// Resolver that always returns source metadata.
    pub fn disabled() -> Self {
        Self::new(None, String::new())
    }

    /// Resolve `item` into submission metadata.
    pub fn resolve(&self, item: &MediaItem) -> TrackMetadata {
        let Some(index) = self.index.as_ref() else {
            return source_metadata(item);
        };
        tracing::debug!(item = %item, "looking up additional track metadata");
        let candidates = match index.query_title(&item.track) {
            Ok(candidates) => candidates,
            Err(err) => {
                tracing::warn!(item = %item, error = %err, "metadata lookup failed; using source metadata");
                return source_metadata(item);
            }
        };
        match select_candidate(&candidates, item) {
            Some(candidate) => {
                tracing::info!(item = %item, recording = %candidate.recording_id, "using beets metadata");
                self.enriched(candidate)
            }
            None => {
                tracing::info!(item = %item, candidates = candidates.len(), "no beets match; using source metadata");
                source_metadata(item)
            }
        }
    }

    fn enriched(&self, candidate: &BeetsItem) -> TrackMetadata {
        TrackMetadata {
            artist_name: candidate.artist.clone(),
            track_name: candidate.title.clone(),
            release_name: candidate.album.clone(),
            additional_info: Some(AdditionalInfo {
                listening_from: self.listening_from.clone(),
                release_mbid: non_empty(&candidate.release_id),
                artist_mbids: non_empty(&candidate.artist_id).into_iter().collect(),
                recording_mbid: non_empty(&candidate.recording_id),
                release_group_mbid: non_empty(&candidate.release_group_id),
                work_mbids: non_empty(&candidate.work_id).into_iter().collect(),
                tags: Vec::new(),
            }),
        }
    }
}

/// Metadata built from the media server's own fields, without enrichment.
pub fn source_metadata(item: &MediaItem) -> TrackMetadata {
    TrackMetadata {
        artist_name: item.artist.clone(),
        track_name: item.track.clone(),
        release_name: item.album.clone(),
        additional_info: None,
    }
}

fn select_candidate<'a>(candidates: &'a [BeetsItem], item: &MediaItem) -> Option<&'a BeetsItem> {
    match candidates {
        [] => None,
        [only] => Some(only),
        many => {
            tracing::debug!(
                item = %item,
                candidates = ?many
                    .iter()
                    .map(|c| format!("{} - {} ({})", c.artist, c.title, c.album))
                    .collect::<Vec<_>>(),
                "multiple beets results"
            );
            many.iter().find(|candidate| matches_context(candidate, item))
        }
    }
}

fn matches_context(candidate: &BeetsItem, item: &MediaItem) -> bool {
    candidate.title == item.track
        && candidate.album == item.album
        && (item.artist == candidate.artist || item.artist == VARIOUS_ARTISTS)
}

fn non_empty(value: &str) -> Option<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct FakeIndex {
        results: Vec<BeetsItem>,
        fail: bool,
        calls: Arc<AtomicUsize>,
    }

    impl MetadataIndex for FakeIndex {
        fn query_title(&self, _title: &str) -> Result<Vec<BeetsItem>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                anyhow::bail!("connection refused");
            }
            Ok(self.results.clone())
        }
    }

    fn resolver(results: Vec<BeetsItem>) -> MetadataResolver {
        MetadataResolver::new(
            Some(Box::new(FakeIndex {
                results,
                fail: false,
                calls: Arc::new(AtomicUsize::new(0)),
            })),
            "Plex Media Server".to_string(),
        )
    }

    fn candidate(title: &str, album: &str, artist: &str, recording: &str) -> BeetsItem {
        BeetsItem {
            title: title.to_string(),
            album: album.to_string(),
            artist: artist.to_string(),
            recording_id: recording.to_string(),
            release_id: format!("{recording}-release"),
            artist_id: format!("{recording}-artist"),
            ..BeetsItem::default()
        }
    }

    fn item(artist: &str, album: &str, track: &str) -> MediaItem {
        MediaItem {
            artist: artist.to_string(),
            album: album.to_string(),
            track: track.to_string(),
        }
    }

    #[test]
    fn disabled_resolver_returns_source_metadata() {
        let meta = MetadataResolver::disabled().resolve(&item("Band", "Album", "Song"));
        assert_eq!(meta, source_metadata(&item("Band", "Album", "Song")));
        assert!(meta.additional_info.is_none());
    }

    #[test]
    fn no_results_falls_back() {
        let meta = resolver(Vec::new()).resolve(&item("Band", "Album", "Song"));
        assert_eq!(meta, source_metadata(&item("Band", "Album", "Song")));
    }

    #[test]
    fn index_failure_falls_back() {
        let calls = Arc::new(AtomicUsize::new(0));
        let resolver = MetadataResolver::new(
            Some(Box::new(FakeIndex {
                results: Vec::new(),
                fail: true,
                calls: calls.clone(),
            })),
            "Plex Media Server".to_string(),
        );
        let meta = resolver.resolve(&item("Band", "Album", "Song"));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(meta.additional_info.is_none());
    }

    #[test]
    fn single_result_is_accepted_unconditionally() {
        let meta = resolver(vec![candidate("T", "A", "Various Artists", "rec-1")])
            .resolve(&item("Anyone", "A", "T"));
        assert_eq!(meta.artist_name, "Various Artists");
        let info = meta.additional_info.expect("enriched");
        assert_eq!(info.listening_from, "Plex Media Server");
        assert_eq!(info.recording_mbid.as_deref(), Some("rec-1"));
        assert_eq!(info.release_mbid.as_deref(), Some("rec-1-release"));
        assert_eq!(info.artist_mbids, vec!["rec-1-artist".to_string()]);
        assert!(info.work_mbids.is_empty());
    }

    #[test]
    fn single_result_with_different_album_is_still_accepted() {
        let meta = resolver(vec![candidate("Song", "Other Album", "Other", "rec-1")])
            .resolve(&item("Band", "Album", "Song"));
        assert_eq!(meta.release_name, "Other Album");
    }

    #[test]
    fn multiple_results_match_on_title_album_and_artist() {
        let meta = resolver(vec![
            candidate("Song", "Live", "Band", "rec-live"),
            candidate("Song", "Album", "Cover Band", "rec-cover"),
            candidate("Song", "Album", "Band", "rec-studio"),
        ])
        .resolve(&item("Band", "Album", "Song"));
        let info = meta.additional_info.expect("enriched");
        assert_eq!(info.recording_mbid.as_deref(), Some("rec-studio"));
    }

    #[test]
    fn various_artists_context_takes_first_title_album_match() {
        let meta = resolver(vec![
            candidate("Song", "Hits", "Singer A", "rec-a"),
            candidate("Song", "Hits", "Singer B", "rec-b"),
        ])
        .resolve(&item(VARIOUS_ARTISTS, "Hits", "Song"));
        assert_eq!(meta.artist_name, "Singer A");
    }

    #[test]
    fn multiple_results_without_title_and_album_match_fall_back() {
        let source = item("Band", "Album", "Song");
        let meta = resolver(vec![
            candidate("Song", "Live", "Band", "rec-live"),
            candidate("Song (Remix)", "Album", "Band", "rec-remix"),
        ])
        .resolve(&source);
        assert_eq!(meta, source_metadata(&source));
    }

    #[test]
    fn matching_is_case_sensitive() {
        let source = item("band", "Album", "Song");
        let meta = resolver(vec![
            candidate("Song", "Album", "Band", "rec-1"),
            candidate("Song", "Album", "BAND", "rec-2"),
        ])
        .resolve(&source);
        assert!(meta.additional_info.is_none());
    }
}
