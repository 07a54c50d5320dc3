//! ListenBrainz submission client.
//!
//! Now-playing notifications are sent once and never retried. Listens are
//! retried with a linear backoff on transport failures and 5xx responses;
//! any other non-200 response aborts immediately.

use std::fmt;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use beetbrainz_types::{SubmitListens, TrackMetadata};

use crate::config::ListenBrainzSettings;

/// Destination for now-playing notifications and listens.
pub trait ListenSink: Send + Sync {
    /// Single attempt, never retried.
    fn playing_now(&self, token: &str, metadata: &TrackMetadata) -> Result<(), SubmissionError>;

    /// Durable submission of a completed listen.
    fn submit_listen(
        &self,
        token: &str,
        metadata: &TrackMetadata,
        listened_at: i64,
    ) -> Result<(), SubmissionError>;
}

#[derive(Debug)]
pub enum SubmissionError {
    /// The payload could not be serialized.
    Encode(String),
    /// The request never produced a response (connect, timeout, TLS).
    Transport(String),
    /// The API answered with a 5xx status.
    Server { status: u16, detail: String },
    /// The API answered with a non-200, non-5xx status.
    Rejected { status: u16, detail: String },
    /// Every attempt failed transiently.
    Exhausted {
        attempts: u32,
        last: Box<SubmissionError>,
    },
}

impl SubmissionError {
    /// True when sending the same payload again later may succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            SubmissionError::Transport(_)
            | SubmissionError::Server { .. }
            | SubmissionError::Exhausted { .. } => true,
            SubmissionError::Encode(_) | SubmissionError::Rejected { .. } => false,
        }
    }
}

impl fmt::Display for SubmissionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SubmissionError::Encode(msg) => write!(f, "listen encode failed: {msg}"),
            SubmissionError::Transport(msg) => write!(f, "listenbrainz request failed (transport): {msg}"),
            SubmissionError::Server { status, detail } => {
                write!(f, "listenbrainz request failed (status {status}): {detail}")
            }
            SubmissionError::Rejected { status, detail } => {
                write!(f, "listenbrainz rejected request (status {status}): {detail}")
            }
            SubmissionError::Exhausted { attempts, last } => {
                write!(f, "listen submission gave up after {attempts} attempts: {last}")
            }
        }
    }
}

impl std::error::Error for SubmissionError {}

pub struct ListenBrainzClient {
    submit_url: String,
    agent: ureq::Agent,
    max_attempts: u32,
    retry_step: Duration,
}

impl ListenBrainzClient {
    pub fn new(settings: &ListenBrainzSettings) -> Self {
        let config = ureq::Agent::config_builder()
            .timeout_global(Some(settings.timeout))
            .http_status_as_error(false)
            .build();
        Self {
            submit_url: format!("{}/1/submit-listens", settings.base_url.trim_end_matches('/')),
            agent: ureq::Agent::new_with_config(config),
            max_attempts: settings.max_attempts.max(1),
            retry_step: settings.retry_step,
        }
    }

    fn post(&self, token: &str, body: &str) -> Result<(), SubmissionError> {
        let mut resp = self
            .agent
            .post(&self.submit_url)
            .header("Authorization", format!("Token {token}"))
            .header("Content-Type", "application/json")
            .send(body)
            .map_err(|err| SubmissionError::Transport(err.to_string()))?;
        let status = resp.status().as_u16();
        if status == 200 {
            return Ok(());
        }
        let detail = resp.body_mut().read_to_string().unwrap_or_default();
        Err(classify_failure(status, detail))
    }
}

impl ListenSink for ListenBrainzClient {
    fn playing_now(&self, token: &str, metadata: &TrackMetadata) -> Result<(), SubmissionError> {
        let body = encode(&SubmitListens::playing_now(metadata.clone()))?;
        self.post(token, &body).inspect_err(|err| {
            tracing::warn!(error = %err, "playing now request failed");
        })
    }

    fn submit_listen(
        &self,
        token: &str,
        metadata: &TrackMetadata,
        listened_at: i64,
    ) -> Result<(), SubmissionError> {
        let body = encode(&SubmitListens::single(metadata.clone(), listened_at))?;
        submit_with_retry(
            self.max_attempts,
            self.retry_step,
            || self.post(token, &body),
            std::thread::sleep,
        )
    }
}

/// Current Unix time in seconds.
pub fn unix_now() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

fn encode(body: &SubmitListens) -> Result<String, SubmissionError> {
    serde_json::to_string(body).map_err(|err| SubmissionError::Encode(err.to_string()))
}

fn classify_failure(status: u16, detail: String) -> SubmissionError {
    let detail = detail.trim().chars().take(300).collect::<String>();
    if status >= 500 {
        SubmissionError::Server { status, detail }
    } else {
        SubmissionError::Rejected { status, detail }
    }
}

/// Run `send` until it succeeds, fails permanently, or `max_attempts` is hit.
///
/// Waits `attempt * step` after failed attempt `attempt`.
fn submit_with_retry<F, S>(
    max_attempts: u32,
    step: Duration,
    mut send: F,
    mut sleep: S,
) -> Result<(), SubmissionError>
where
    F: FnMut() -> Result<(), SubmissionError>,
    S: FnMut(Duration),
{
    let mut attempt = 1u32;
    loop {
        match send() {
            Ok(()) => {
                if attempt > 1 {
                    tracing::info!(attempt, "listen submission recovered");
                }
                return Ok(());
            }
            Err(err) if !err.is_transient() => {
                tracing::warn!(attempt, error = %err, "listen submission aborted");
                return Err(err);
            }
            Err(err) if attempt >= max_attempts => {
                tracing::warn!(attempt, error = %err, "listen submission failed; giving up");
                return Err(SubmissionError::Exhausted {
                    attempts: attempt,
                    last: Box::new(err),
                });
            }
            Err(err) => {
                let backoff = step * attempt;
                tracing::warn!(
                    attempt,
                    backoff_ms = backoff.as_millis() as u64,
                    error = %err,
                    "listen submission failed; retrying"
                );
                sleep(backoff);
                attempt += 1;
            }
        }
    }
}
