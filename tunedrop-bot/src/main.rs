//! tunedrop-bot - Playlist chat service
//!
//! Resolves an artist name into playable top tracks and delivers fetched
//! audio through a chat conversation. The entry point wires the pipeline
//! (resolver → locator → acquisition engine → orchestrator) to the Telegram
//! transport, selecting long-poll or webhook delivery from configuration.

use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

use tunedrop_bot::acquire::AcquisitionEngine;
use tunedrop_bot::config::{BotConfig, Secrets, TransportMode};
use tunedrop_bot::locator::SourceLocator;
use tunedrop_bot::orchestrator::Orchestrator;
use tunedrop_bot::providers::spotify::SpotifyClient;
use tunedrop_bot::providers::ytdlp::YtDlpProvider;
use tunedrop_bot::providers::SourceProvider;
use tunedrop_bot::resolver::TrackResolver;
use tunedrop_bot::session::SessionStore;
use tunedrop_bot::transport::telegram::TelegramApi;
use tunedrop_bot::transport::{long_poll, webhook};

#[derive(Debug, Parser)]
#[command(name = "tunedrop-bot", version, about = "Playlist chat service")]
struct Cli {
    /// Path to the bootstrap configuration file
    #[arg(long, default_value = "tunedrop.toml", env = "TUNEDROP_CONFIG")]
    config: PathBuf,

    /// Override the configured update delivery mechanism
    #[arg(long, value_enum)]
    transport: Option<TransportMode>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = BotConfig::load(&cli.config)?;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.logging.level.clone()));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    info!("Starting tunedrop-bot");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));

    let transport = cli.transport.unwrap_or(config.transport);
    let secrets = Secrets::from_env()?;

    let spotify = Arc::new(SpotifyClient::new(
        secrets.spotify_client_id.clone(),
        secrets.spotify_client_secret.clone(),
    )?);
    let ytdlp = Arc::new(YtDlpProvider::new());

    let resolver = TrackResolver::new(spotify);
    let locator = SourceLocator::new(Arc::clone(&ytdlp) as Arc<dyn SourceProvider>);
    let engine = AcquisitionEngine::new(
        ytdlp,
        config.temp_dir.clone(),
        config.max_artifact_bytes(),
    )?;
    info!(temp_dir = %config.temp_dir.display(), "Acquisition directory ready");

    let orchestrator = Arc::new(Orchestrator::new(
        SessionStore::new(),
        resolver,
        locator,
        engine,
    ));

    let api = Arc::new(TelegramApi::new(&secrets.telegram_token)?);

    match transport {
        TransportMode::LongPoll => {
            long_poll::run(api, orchestrator).await;
        }
        TransportMode::Webhook => {
            webhook::run(api, orchestrator, &config.webhook).await?;
        }
    }

    Ok(())
}
