//! Janken lobby server entry point.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use tracing::info;

use janken::lobby::{self, LobbyState};
use janken::network::registry::SessionRegistry;
use janken::network::session::SessionConfig;
use janken::store::ScoreStore;

/// Lobby and game host for elimination-style janken rounds.
#[derive(Parser, Debug)]
#[command(name = "janken-server", version, about = "Janken lobby/game server")]
struct Cli {
    /// Address the HTTP bootstrap endpoint listens on
    #[arg(long, default_value = "127.0.0.1:3000")]
    bind: SocketAddr,

    /// Path to the score snapshot file
    #[arg(long, default_value = "janken-scores.json")]
    data: PathBuf,

    /// Verbose logging
    #[arg(long, default_value_t = false)]
    debug: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Default to info for our crate, warn for everything else.
    let log_filter = if cli.debug { "debug" } else { "janken=info,warn" };
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_filter));
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(cli.debug)
        .init();

    info!("janken server v{}", janken::VERSION);

    let store = Arc::new(
        ScoreStore::open(&cli.data)
            .await
            .with_context(|| format!("opening score store '{}'", cli.data.display()))?,
    );
    let registry = Arc::new(SessionRegistry::new(store.clone(), SessionConfig::default()));
    let _reaper = registry.spawn_reaper(Duration::from_secs(1));

    let app = lobby::router(LobbyState {
        registry: registry.clone(),
        store,
    });
    let listener = tokio::net::TcpListener::bind(cli.bind)
        .await
        .with_context(|| format!("failed to bind lobby endpoint {}", cli.bind))?;
    info!("lobby endpoint listening on {}", cli.bind);

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let _ = tokio::signal::ctrl_c().await;
            info!("shutting down, signalling running sessions");
            registry.shutdown();
        })
        .await
        .context("lobby endpoint failed")?;
    Ok(())
}
