//! playingpack: an OpenAI-compatible debugging proxy.
//!
//! Forwards `/v1/chat/completions` (and passes through everything else
//! under `/v1`) to a configured upstream, content-addressing every
//! request so it can be replayed from an on-disk cache or synthesized
//! from an operator-supplied mock instead of hitting the network again.

use std::net::SocketAddr;
use std::sync::Arc;

use clap::{Parser, ValueEnum};
use playingpack_broker::{spawn_reaper, SessionBroker};
use playingpack_cache::CacheStore;
use playingpack_core::{CacheMode, Settings, SettingsStore};
use playingpack_egress::UpstreamClient;
use playingpack_engine::LifecycleEngine;
use playingpack_server::{build_router, AppState};
use tokio::net::TcpListener;
use tracing::info;
use tracing_subscriber::EnvFilter;

const MAX_SESSIONS: usize = 100;
const REAPER_INTERVAL: std::time::Duration = std::time::Duration::from_secs(30);

#[derive(Parser)]
#[command(name = "playingpack")]
#[command(about = "OpenAI-compatible proxy for deterministic LLM agent testing", long_about = None)]
struct Cli {
    /// Host to bind to
    #[arg(long, env = "PLAYINGPACK_HOST", default_value = "127.0.0.1")]
    host: String,

    /// Port to bind to
    #[arg(long, env = "PLAYINGPACK_PORT", default_value_t = 8787)]
    port: u16,

    /// Directory holding cached responses
    #[arg(long, env = "PLAYINGPACK_CACHE_DIR", default_value = "./.playingpack-cache")]
    cache_dir: std::path::PathBuf,

    /// Upstream base URL requests are forwarded to
    #[arg(long, env = "PLAYINGPACK_UPSTREAM", default_value = "https://api.openai.com")]
    upstream: String,

    /// Cache mode: off, read (replay only), or read-write
    #[arg(long, value_enum, env = "PLAYINGPACK_CACHE_MODE", default_value_t = CliCacheMode::ReadWrite)]
    cache_mode: CliCacheMode,

    /// Suspend each request at points 1 and 2 for operator review
    #[arg(long, default_value_t = true, overrides_with = "no_intervene")]
    intervene: bool,
    /// Disable suspension: every request auto-selects cache-if-available, then returns
    #[arg(long, default_value_t = false, overrides_with = "intervene")]
    no_intervene: bool,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum CliCacheMode {
    Off,
    Read,
    ReadWrite,
}

impl From<CliCacheMode> for CacheMode {
    fn from(mode: CliCacheMode) -> Self {
        match mode {
            CliCacheMode::Off => CacheMode::Off,
            CliCacheMode::Read => CacheMode::Read,
            CliCacheMode::ReadWrite => CacheMode::ReadWrite,
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    let intervene = cli.intervene && !cli.no_intervene;

    std::fs::create_dir_all(&cli.cache_dir)?;

    let settings = Settings {
        cache: cli.cache_mode.into(),
        intervene,
        upstream: cli.upstream.clone(),
    };

    info!(
        host = %cli.host,
        port = cli.port,
        cache_dir = %cli.cache_dir.display(),
        upstream = %cli.upstream,
        cache_mode = ?settings.cache,
        intervene,
        "starting playingpack"
    );

    let broker = Arc::new(SessionBroker::new(MAX_SESSIONS));
    spawn_reaper(broker.clone(), REAPER_INTERVAL);

    let cache = CacheStore::new(cli.cache_dir);
    let upstream = UpstreamClient::new()?;
    let settings = Arc::new(SettingsStore::new(settings));
    let engine = Arc::new(LifecycleEngine::new(broker, cache, upstream, settings));

    let router = build_router(AppState::new(engine));

    let addr: SocketAddr = format!("{}:{}", cli.host, cli.port).parse()?;
    let listener = TcpListener::bind(addr).await?;
    info!(%addr, "listening");

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    use tokio::signal;

    let ctrl_c = async {
        signal::ctrl_c().await.expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("shutdown signal received");
}
