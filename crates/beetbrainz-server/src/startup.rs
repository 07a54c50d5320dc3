//! Actix server startup + app wiring.
//!
//! Builds the shared clients, starts the session poller when enabled, and
//! serves the webhook routes until Ctrl+C.

use std::path::PathBuf;
use std::sync::Arc;
use std::thread::JoinHandle;

use actix_web::middleware::Logger;
use actix_web::{App, HttpServer, web};
use anyhow::{Context, Result};
use crossbeam_channel::{Receiver, Sender};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::api;
use crate::beets::BeetsClient;
use crate::config::{self, PlexSettings, UserTokens};
use crate::listenbrainz::{ListenBrainzClient, ListenSink};
use crate::metadata::{MetadataIndex, MetadataResolver};
use crate::openapi;
use crate::plex::PlexClient;
use crate::processor::RequestProcessor;
use crate::state::AppState;
use crate::tracker::SessionTracker;

/// Build the relay components and run the HTTP server.
pub(crate) async fn run(args: crate::Args) -> Result<()> {
    let cfg = load_config(args.config.as_ref())?;
    let bind = resolve_bind(args.bind, &cfg)?;
    let tokens = Arc::new(config::tokens_from_config(&cfg));
    let listenbrainz = config::listenbrainz_from_config(&cfg)?;
    let beets = config::beets_from_config(&cfg)?;
    let plex = config::plex_from_config(&cfg)?.filter(|plex| plex.polling);
    tracing::info!(
        bind = %bind,
        version = crate::VERSION,
        users = tokens.len(),
        enrichment = beets.is_some(),
        polling = plex.is_some(),
        "starting beetbrainz-server"
    );
    if tokens.is_empty() {
        tracing::warn!("no users configured; nothing will be scrobbled");
    }

    let index = beets
        .as_ref()
        .map(|settings| Box::new(BeetsClient::new(settings)) as Box<dyn MetadataIndex>);
    let resolver = Arc::new(MetadataResolver::new(
        index,
        listenbrainz.listening_from.clone(),
    ));
    let sink: Arc<dyn ListenSink> = Arc::new(ListenBrainzClient::new(&listenbrainz));

    let (shutdown_tx, shutdown_rx) = crossbeam_channel::bounded::<()>(1);
    let poller = match plex.as_ref() {
        Some(plex) => Some(spawn_poller(
            plex,
            resolver.clone(),
            sink.clone(),
            tokens.clone(),
            shutdown_rx,
        )?),
        None => None,
    };
    setup_shutdown(shutdown_tx.clone());

    let processor = Arc::new(RequestProcessor::new(resolver, sink, tokens));
    let state = web::Data::new(AppState::new(processor));
    HttpServer::new(move || {
        App::new()
            .app_data(state.clone())
            .wrap(Logger::default().exclude("/health"))
            .service(
                SwaggerUi::new("/swagger-ui/{_:.*}")
                    .url("/api-doc/openapi.json", openapi::ApiDoc::openapi()),
            )
            .service(api::health)
            .service(api::plex_webhook)
            .service(api::tautulli_webhook)
    })
    .bind(bind)
    .with_context(|| format!("bind {bind}"))?
    .run()
    .await?;

    let _ = shutdown_tx.try_send(());
    if let Some(handle) = poller {
        match handle.join() {
            Ok(result) => result?,
            Err(_) => return Err(anyhow::anyhow!("session poller panicked")),
        }
    }
    Ok(())
}

/// Load config from `--config`, or `config.toml` next to the executable.
fn load_config(path: Option<&PathBuf>) -> Result<config::RelayConfig> {
    match path {
        Some(path) => config::RelayConfig::load(path),
        None => {
            let auto_path = std::env::current_exe()
                .ok()
                .and_then(|path| path.parent().map(|dir| dir.join("config.toml")));
            match auto_path {
                Some(path) if path.exists() => config::RelayConfig::load(&path),
                _ => Err(anyhow::anyhow!(
                    "config file is required; use --config or BEETBRAINZ_CONFIG"
                )),
            }
        }
    }
}

/// Resolve the final bind address from args + config.
fn resolve_bind(
    bind: Option<std::net::SocketAddr>,
    cfg: &config::RelayConfig,
) -> Result<std::net::SocketAddr> {
    match bind {
        Some(addr) => Ok(addr),
        None => config::bind_from_config(cfg),
    }
}

/// Probe Plex, then hand the tracker to its own thread.
fn spawn_poller(
    plex: &PlexSettings,
    resolver: Arc<MetadataResolver>,
    sink: Arc<dyn ListenSink>,
    tokens: Arc<UserTokens>,
    shutdown: Receiver<()>,
) -> Result<JoinHandle<Result<()>>> {
    let mut tracker = SessionTracker::new(
        Box::new(PlexClient::new(plex)),
        resolver,
        sink,
        tokens,
        plex.poll_interval,
        plex.refresh_window,
    );
    tracker
        .start()
        .with_context(|| format!("plex server unreachable at {}", plex.base_url))?;
    std::thread::Builder::new()
        .name("plex-poller".to_string())
        .spawn(move || tracker.run(shutdown))
        .context("spawn session poller")
}

/// Install Ctrl+C handler to stop the poller and the HTTP server.
fn setup_shutdown(shutdown: Sender<()>) {
    let _ = ctrlc::set_handler(move || {
        let _ = shutdown.try_send(());
        if let Some(system) = actix_web::rt::System::try_current() {
            system.stop();
        } else {
            std::process::exit(0);
        }
    });
}
