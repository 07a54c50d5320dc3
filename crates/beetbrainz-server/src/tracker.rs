//! Pull-mode session tracker.
//!
//! Polls the media server on a fixed interval and infers now-playing and
//! listen events from coarse offset snapshots. Plex refreshes `viewOffset`
//! only every few seconds, so between refreshes the offset is extrapolated at
//! the polling rate and snapped back to the reported value when they disagree.
//!
//! The per-user map is owned by the poller thread; nothing else touches it.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use crossbeam_channel::{Receiver, RecvTimeoutError};

use crate::config::UserTokens;
use crate::listenbrainz::{unix_now, ListenSink, SubmissionError};
use crate::metadata::MetadataResolver;
use crate::models::{MediaItem, PlayerState, SessionSnapshot};
use crate::plex::SessionSource;

/// Absolute playback threshold for a listen (4 minutes).
pub const LISTEN_THRESHOLD_MS: i64 = 240_000;

/// True once `offset_ms` reaches `min(4 min, duration / 2)`.
///
/// Non-positive durations only use the absolute threshold.
pub fn is_eligible(offset_ms: i64, duration_ms: i64) -> bool {
    let threshold = if duration_ms > 0 {
        (duration_ms / 2).min(LISTEN_THRESHOLD_MS)
    } else {
        LISTEN_THRESHOLD_MS
    };
    offset_ms >= threshold
}

/// Listen state of one tracked track instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmissionStatus {
    /// Threshold not reached yet.
    NotEligible,
    /// Threshold reached; the listen has not been delivered yet.
    Pending { listened_at: i64 },
    /// Delivered, or rejected by the API and never resent.
    Submitted,
}

/// Extrapolation parameters derived from the poll interval.
#[derive(Debug, Clone, Copy)]
pub struct TrackerTiming {
    /// Offset advance per tick.
    step_ms: i64,
    /// Source refresh window; larger drift forces reconciliation.
    window_ms: i64,
    /// Maximum extrapolation steps before reconciliation.
    ceiling: u32,
}

impl TrackerTiming {
    pub fn new(poll_interval: Duration, refresh_window: Duration) -> Self {
        let step_ms = (poll_interval.as_millis() as i64).max(1);
        let window_ms = (refresh_window.as_millis() as i64).max(step_ms);
        let ceiling = ((window_ms + step_ms - 1) / step_ms).max(1) as u32;
        Self {
            step_ms,
            window_ms,
            ceiling,
        }
    }
}

/// Playback state tracked for one user's current track instance.
#[derive(Debug, Clone)]
struct TrackedSession {
    item: MediaItem,
    user_name: String,
    observed_offset_ms: i64,
    duration_ms: i64,
    state: PlayerState,
    extrapolated_offset_ms: i64,
    reconcile_count: u32,
    submission: SubmissionStatus,
}

impl TrackedSession {
    fn start(snapshot: &SessionSnapshot) -> Self {
        Self {
            item: snapshot.item.clone(),
            user_name: snapshot.user_name.clone(),
            observed_offset_ms: snapshot.offset_ms,
            duration_ms: snapshot.duration_ms,
            state: snapshot.state,
            extrapolated_offset_ms: snapshot.offset_ms,
            reconcile_count: 0,
            submission: SubmissionStatus::NotEligible,
        }
    }

    fn offset_ms(&self) -> i64 {
        self.observed_offset_ms.max(self.extrapolated_offset_ms)
    }

    fn observe(&mut self, snapshot: &SessionSnapshot, timing: &TrackerTiming) {
        self.observed_offset_ms = snapshot.offset_ms;
        self.duration_ms = snapshot.duration_ms;
        self.state = snapshot.state;
        if self.state == PlayerState::Paused {
            self.reconcile();
            return;
        }

        let observed = self.observed_offset_ms;
        let estimate = self.extrapolated_offset_ms;
        let caught_up = observed > estimate || (observed == estimate && self.reconcile_count > 0);
        let diverged = (estimate - observed).abs() > timing.window_ms;
        if caught_up || diverged || self.reconcile_count >= timing.ceiling {
            self.reconcile();
            return;
        }

        let mut next = estimate + timing.step_ms;
        if self.duration_ms > 0 {
            next = next.min(self.duration_ms);
        }
        self.extrapolated_offset_ms = next;
        self.reconcile_count += 1;
    }

    fn reconcile(&mut self) {
        self.extrapolated_offset_ms = self.observed_offset_ms;
        self.reconcile_count = 0;
    }

    /// Timestamp of the listen to deliver now, if one is due.
    fn listen_due(&mut self, now: i64) -> Option<i64> {
        match self.submission {
            SubmissionStatus::Submitted => None,
            SubmissionStatus::Pending { listened_at } => Some(listened_at),
            SubmissionStatus::NotEligible => {
                if is_eligible(self.offset_ms(), self.duration_ms) {
                    self.submission = SubmissionStatus::Pending { listened_at: now };
                    Some(now)
                } else {
                    None
                }
            }
        }
    }

    fn record_outcome(&mut self, result: &Result<(), SubmissionError>) {
        match result {
            Ok(()) => self.submission = SubmissionStatus::Submitted,
            Err(err) if !err.is_transient() => self.submission = SubmissionStatus::Submitted,
            Err(_) => {}
        }
    }
}

pub struct SessionTracker {
    source: Box<dyn SessionSource>,
    resolver: Arc<MetadataResolver>,
    sink: Arc<dyn ListenSink>,
    tokens: Arc<UserTokens>,
    poll_interval: Duration,
    timing: TrackerTiming,
    sessions: HashMap<String, TrackedSession>,
    started: bool,
    clock: fn() -> i64,
}

impl SessionTracker {
    pub fn new(
        source: Box<dyn SessionSource>,
        resolver: Arc<MetadataResolver>,
        sink: Arc<dyn ListenSink>,
        tokens: Arc<UserTokens>,
        poll_interval: Duration,
        refresh_window: Duration,
    ) -> Self {
        Self {
            source,
            resolver,
            sink,
            tokens,
            poll_interval,
            timing: TrackerTiming::new(poll_interval, refresh_window),
            sessions: HashMap::new(),
            started: false,
            clock: unix_now,
        }
    }

    /// Run the first poll; any source failure here is returned.
    ///
    /// Called by [`SessionTracker::run`] when the caller has not done so.
    pub fn start(&mut self) -> Result<()> {
        let initial = self
            .source
            .fetch_sessions()
            .context("initial poll of the session source failed")?;
        tracing::info!(
            interval_ms = self.poll_interval.as_millis() as u64,
            sessions = initial.len(),
            "session poller started"
        );
        self.started = true;
        self.process_all(initial);
        Ok(())
    }

    /// Poll until `shutdown` fires or its sender is dropped.
    pub fn run(mut self, shutdown: Receiver<()>) -> Result<()> {
        if !self.started {
            self.start()?;
        }
        loop {
            match shutdown.recv_timeout(self.poll_interval) {
                Err(RecvTimeoutError::Timeout) => self.poll(),
                Ok(()) | Err(RecvTimeoutError::Disconnected) => {
                    tracing::info!("session poller stopping");
                    return Ok(());
                }
            }
        }
    }

    /// Run one poll tick.
    pub fn poll(&mut self) {
        match self.source.fetch_sessions() {
            Ok(snapshots) => self.process_all(snapshots),
            Err(err) => {
                tracing::warn!(error = %err, "failed to get sessions from plex; skipping tick");
            }
        }
    }

    fn process_all(&mut self, snapshots: Vec<SessionSnapshot>) {
        let mut seen = HashSet::new();
        for snapshot in snapshots {
            if let Some(user_id) = self.process(snapshot) {
                seen.insert(user_id);
            }
        }
        let ended: Vec<String> = self
            .sessions
            .keys()
            .filter(|user_id| !seen.contains(*user_id))
            .cloned()
            .collect();
        for user_id in ended {
            if let Some(outgoing) = self.sessions.remove(&user_id) {
                tracing::debug!(user = %outgoing.user_name, item = %outgoing.item, "playback ended");
                let tokens = Arc::clone(&self.tokens);
                if let Some(token) = tokens.lookup(&outgoing.user_name) {
                    self.flush(token, outgoing);
                }
            }
        }
    }

    /// Apply one snapshot; returns the user id when it is being tracked.
    fn process(&mut self, snapshot: SessionSnapshot) -> Option<String> {
        if snapshot.media_type != "track" {
            tracing::debug!(item = %snapshot.item, media_type = %snapshot.media_type, "not an audio track; skipping");
            return None;
        }
        let tokens = Arc::clone(&self.tokens);
        let Some(token) = tokens.lookup(&snapshot.user_name) else {
            tracing::debug!(user = %snapshot.user_name, "no listenbrainz token configured for user");
            return None;
        };

        match self.sessions.remove(&snapshot.user_id) {
            None => self.begin(token, &snapshot),
            Some(outgoing) if outgoing.item != snapshot.item => {
                tracing::debug!(
                    user = %snapshot.user_name,
                    from = %outgoing.item,
                    to = %snapshot.item,
                    "track changed"
                );
                self.flush(token, outgoing);
                self.begin(token, &snapshot);
            }
            Some(mut tracked) => {
                tracked.observe(&snapshot, &self.timing);
                if tracked.state == PlayerState::Playing {
                    self.deliver_listen(token, &mut tracked);
                } else {
                    tracing::debug!(user = %tracked.user_name, item = %tracked.item, "playback paused");
                }
                self.sessions.insert(snapshot.user_id.clone(), tracked);
            }
        }
        Some(snapshot.user_id)
    }

    fn begin(&mut self, token: &str, snapshot: &SessionSnapshot) {
        let metadata = self.resolver.resolve(&snapshot.item);
        match self.sink.playing_now(token, &metadata) {
            Ok(()) => tracing::info!(user = %snapshot.user_name, item = %snapshot.item, "user is now listening"),
            Err(err) => tracing::warn!(
                user = %snapshot.user_name,
                item = %snapshot.item,
                error = %err,
                "playing now request failed"
            ),
        }
        self.sessions
            .insert(snapshot.user_id.clone(), TrackedSession::start(snapshot));
    }

    fn deliver_listen(&self, token: &str, tracked: &mut TrackedSession) {
        let Some(listened_at) = tracked.listen_due((self.clock)()) else {
            return;
        };
        let result = self.submit(token, tracked, listened_at);
        tracked.record_outcome(&result);
    }

    /// Submit a due listen for an instance that is being discarded.
    fn flush(&self, token: &str, mut outgoing: TrackedSession) {
        if let Some(listened_at) = outgoing.listen_due((self.clock)()) {
            let _ = self.submit(token, &outgoing, listened_at);
        }
    }

    fn submit(
        &self,
        token: &str,
        tracked: &TrackedSession,
        listened_at: i64,
    ) -> Result<(), SubmissionError> {
        let metadata = self.resolver.resolve(&tracked.item);
        let result = self.sink.submit_listen(token, &metadata, listened_at);
        match &result {
            Ok(()) => tracing::info!(user = %tracked.user_name, item = %tracked.item, "user has listened"),
            Err(err) => tracing::warn!(
                user = %tracked.user_name,
                item = %tracked.item,
                error = %err,
                retry = err.is_transient(),
                "listen submission failed"
            ),
        }
        result
    }
}
