//! HTTP API handlers.
//!
//! Defines the Actix routes for the webhook receivers and health check.

#[path = "health.rs"]
pub mod health_handler;
pub mod webhooks;

pub use health_handler::{__path_health, health, HealthResponse};
pub use webhooks::{__path_plex_webhook, __path_tautulli_webhook, plex_webhook, tautulli_webhook};

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use actix_web::http::StatusCode;
    use actix_web::{test, App};
    use beetbrainz_types::TrackMetadata;

    use crate::api;
    use crate::config::UserTokens;
    use crate::listenbrainz::{ListenSink, SubmissionError};
    use crate::metadata::MetadataResolver;
    use crate::processor::RequestProcessor;
    use crate::state::AppState;

    #[derive(Default)]
    struct RecordingSink {
        calls: Mutex<Vec<(&'static str, String)>>,
    }

    impl ListenSink for RecordingSink {
        fn playing_now(&self, _token: &str, metadata: &TrackMetadata) -> Result<(), SubmissionError> {
            self.calls
                .lock()
                .unwrap()
                .push(("playing_now", metadata.track_name.clone()));
            Ok(())
        }

        fn submit_listen(
            &self,
            _token: &str,
            metadata: &TrackMetadata,
            _listened_at: i64,
        ) -> Result<(), SubmissionError> {
            self.calls
                .lock()
                .unwrap()
                .push(("single", metadata.track_name.clone()));
            Ok(())
        }
    }

    fn make_state(sink: Arc<RecordingSink>) -> actix_web::web::Data<AppState> {
        let processor = RequestProcessor::new(
            Arc::new(MetadataResolver::disabled()),
            sink,
            Arc::new(UserTokens::new(vec![(
                "alice".to_string(),
                "tok-a".to_string(),
            )])),
        );
        actix_web::web::Data::new(AppState::new(Arc::new(processor)))
    }

    const BOUNDARY: &str = "plex-boundary";

    fn plex_form(fields: &[(&str, &str)]) -> test::TestRequest {
        let mut body = String::new();
        for (name, value) in fields {
            body.push_str(&format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{name}\"\r\n\r\n{value}\r\n"
            ));
        }
        body.push_str(&format!("--{BOUNDARY}--\r\n"));
        test::TestRequest::post()
            .uri("/plex")
            .insert_header((
                "content-type",
                format!("multipart/form-data; boundary={BOUNDARY}"),
            ))
            .set_payload(body)
    }

    fn plex_payload(event: &str, user: &str) -> String {
        serde_json::json!({
            "event": event,
            "Account": { "title": user },
            "Metadata": {
                "type": "track",
                "title": "Song",
                "parentTitle": "Album",
                "grandparentTitle": "Band"
            }
        })
        .to_string()
    }

    #[actix_web::test]
    async fn health_reports_ok() {
        let app = test::init_service(App::new().service(api::health)).await;
        let req = test::TestRequest::get().uri("/health").to_request();
        let body: serde_json::Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["status"], "ok");
        assert_eq!(body["version"], crate::VERSION);
    }

    #[actix_web::test]
    async fn plex_scrobble_submits_listen() {
        let sink = Arc::new(RecordingSink::default());
        let app = test::init_service(
            App::new()
                .app_data(make_state(sink.clone()))
                .service(api::plex_webhook),
        )
        .await;

        let payload = plex_payload("media.scrobble", "Alice");
        let req = plex_form(&[("thumb", "not-an-image"), ("payload", &payload)]).to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(
            sink.calls.lock().unwrap().as_slice(),
            &[("single", "Song".to_string())]
        );
    }

    #[actix_web::test]
    async fn plex_untracked_event_is_ignored() {
        let sink = Arc::new(RecordingSink::default());
        let app = test::init_service(
            App::new()
                .app_data(make_state(sink.clone()))
                .service(api::plex_webhook),
        )
        .await;

        let payload = plex_payload("media.pause", "alice");
        let req = plex_form(&[("payload", &payload)]).to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::NO_CONTENT);
        assert!(sink.calls.lock().unwrap().is_empty());
    }

    #[actix_web::test]
    async fn plex_form_without_payload_is_rejected() {
        let sink = Arc::new(RecordingSink::default());
        let app = test::init_service(
            App::new()
                .app_data(make_state(sink.clone()))
                .service(api::plex_webhook),
        )
        .await;

        let req = plex_form(&[("thumb", "x")]).to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

        let req = plex_form(&[("payload", "{not json")]).to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }

    #[actix_web::test]
    async fn tautulli_play_sends_now_playing() {
        let sink = Arc::new(RecordingSink::default());
        let app = test::init_service(
            App::new()
                .app_data(make_state(sink.clone()))
                .service(api::tautulli_webhook),
        )
        .await;

        let req = test::TestRequest::post()
            .uri("/tautulli")
            .set_json(serde_json::json!({
                "action": "play",
                "user_name": "alice",
                "artist_name": "Band",
                "album_name": "Album",
                "track_name": "Song",
                "media_type": "track"
            }))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(
            sink.calls.lock().unwrap().as_slice(),
            &[("playing_now", "Song".to_string())]
        );
    }

    #[actix_web::test]
    async fn tautulli_unknown_user_is_ignored() {
        let sink = Arc::new(RecordingSink::default());
        let app = test::init_service(
            App::new()
                .app_data(make_state(sink.clone()))
                .service(api::tautulli_webhook),
        )
        .await;

        let req = test::TestRequest::post()
            .uri("/tautulli")
            .set_json(serde_json::json!({
                "action": "watched",
                "user_name": "mallory",
                "artist_name": "Band",
                "album_name": "Album",
                "track_name": "Song",
                "media_type": "track"
            }))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::NO_CONTENT);
        assert!(sink.calls.lock().unwrap().is_empty());
    }

    #[actix_web::test]
    async fn tautulli_malformed_body_is_rejected() {
        let sink = Arc::new(RecordingSink::default());
        let app = test::init_service(
            App::new()
                .app_data(make_state(sink))
                .service(api::tautulli_webhook),
        )
        .await;

        let req = test::TestRequest::post()
            .uri("/tautulli")
            .insert_header(("content-type", "application/json"))
            .set_payload("{\"action\":")
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }
}
