use utoipa::OpenApi;

use crate::api;

#[derive(OpenApi)]
#[openapi(
    paths(
        api::health,
        api::plex_webhook,
        api::tautulli_webhook,
    ),
    components(
        schemas(
            api::HealthResponse,
            beetbrainz_types::TautulliWebhook,
            beetbrainz_types::PlexWebhook,
            beetbrainz_types::PlexAccount,
            beetbrainz_types::PlexWebhookItem,
        )
    ),
    tags(
        (name = "beetbrainz-server", description = "Plex to ListenBrainz scrobble relay")
    )
)]
pub struct ApiDoc;
