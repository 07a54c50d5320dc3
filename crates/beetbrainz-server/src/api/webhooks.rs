//! Webhook receivers for Plex and Tautulli.
//!
//! Both endpoints translate the payload into a playback event and run the
//! processor on the blocking pool, since it performs synchronous HTTP calls.

use actix_multipart::{Multipart, MultipartError};
use actix_web::{post, web, HttpResponse, Responder};
use futures_util::TryStreamExt;

use beetbrainz_types::{PlexWebhook, TautulliWebhook};

use crate::models::PlaybackEvent;
use crate::processor::{self, Outcome};
use crate::state::AppState;

/// Form field Plex uses for the JSON event body.
const PAYLOAD_FIELD: &str = "payload";

#[utoipa::path(
    post,
    path = "/plex",
    request_body(
        content = String,
        content_type = "multipart/form-data",
        description = "Plex webhook form; the `payload` field carries the event JSON"
    ),
    responses(
        (status = 200, description = "Event forwarded to ListenBrainz"),
        (status = 204, description = "Event ignored"),
        (status = 400, description = "Malformed webhook")
    )
)]
#[post("/plex")]
/// Receive a Plex media webhook.
pub async fn plex_webhook(state: web::Data<AppState>, mut form: Multipart) -> impl Responder {
    let raw = match read_payload_field(&mut form).await {
        Ok(Some(raw)) => raw,
        Ok(None) => return HttpResponse::BadRequest().body("payload field is required"),
        Err(err) => {
            tracing::warn!(error = %err, "plex webhook form unreadable");
            return HttpResponse::BadRequest().body(err.to_string());
        }
    };
    let hook: PlexWebhook = match serde_json::from_str(&raw) {
        Ok(hook) => hook,
        Err(err) => {
            tracing::warn!(error = %err, "plex webhook payload is not valid json");
            return HttpResponse::BadRequest().body(format!("invalid payload: {err}"));
        }
    };
    tracing::debug!(event = %hook.event, user = %hook.account.title, "plex webhook received");
    match processor::from_plex_webhook(hook) {
        Some(event) => dispatch(state, event).await,
        None => HttpResponse::NoContent().finish(),
    }
}

#[utoipa::path(
    post,
    path = "/tautulli",
    request_body = TautulliWebhook,
    responses(
        (status = 200, description = "Event forwarded to ListenBrainz"),
        (status = 204, description = "Event ignored"),
        (status = 400, description = "Malformed webhook")
    )
)]
#[post("/tautulli")]
/// Receive a Tautulli notification agent webhook.
pub async fn tautulli_webhook(
    state: web::Data<AppState>,
    body: web::Json<TautulliWebhook>,
) -> impl Responder {
    let hook = body.into_inner();
    tracing::debug!(action = %hook.action, user = %hook.user_name, "tautulli webhook received");
    match processor::from_tautulli(hook) {
        Some(event) => dispatch(state, event).await,
        None => HttpResponse::NoContent().finish(),
    }
}

async fn dispatch(state: web::Data<AppState>, event: PlaybackEvent) -> HttpResponse {
    let processor = state.processor.clone();
    match web::block(move || processor.handle(&event)).await {
        Ok(Outcome::Handled) => HttpResponse::Ok().finish(),
        Ok(Outcome::Ignored) => HttpResponse::NoContent().finish(),
        Err(err) => HttpResponse::InternalServerError().body(err.to_string()),
    }
}

/// Return the text of the `payload` field, draining every other field.
async fn read_payload_field(form: &mut Multipart) -> Result<Option<String>, MultipartError> {
    let mut payload = None;
    while let Some(mut field) = form.try_next().await? {
        let wanted = payload.is_none() && field.name() == Some(PAYLOAD_FIELD);
        let mut raw = Vec::new();
        while let Some(chunk) = field.try_next().await? {
            if wanted {
                raw.extend_from_slice(&chunk);
            }
        }
        if wanted {
            payload = Some(String::from_utf8_lossy(&raw).into_owned());
        }
    }
    Ok(payload)
}
