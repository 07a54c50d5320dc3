mod api;
mod beets;
mod config;
mod listenbrainz;
mod metadata;
mod models;
mod openapi;
mod plex;
mod processor;
mod startup;
mod state;
mod tracker;

use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

const VERSION: &str = concat!(
    env!("CARGO_PKG_VERSION"),
    " (",
    env!("GIT_SHA"),
    ", ",
    env!("BUILD_DATE"),
    ")"
);

#[derive(Parser, Debug)]
#[command(name = "beetbrainz-server", version = VERSION)]
pub(crate) struct Args {
    /// HTTP bind address for webhooks, e.g. 0.0.0.0:5000
    #[arg(long, env = "BEETBRAINZ_BIND")]
    bind: Option<std::net::SocketAddr>,

    /// Relay config file (TOML)
    #[arg(long, env = "BEETBRAINZ_CONFIG")]
    config: Option<PathBuf>,
}

#[actix_web::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new("info,actix_web=info,beetbrainz_server=info")
        }))
        .init();

    startup::run(args).await
}
