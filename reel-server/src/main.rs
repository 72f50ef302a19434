//! reel-server binary entry point.
//!
//! Usage:
//! ```bash
//! reel-server --config player.toml
//! reel-server --bind 0.0.0.0:9000
//! ```

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use reel_cache::{HotCache, HotCacheConfig};
use reel_server::access::FreeStreamVerifier;
use reel_server::http::{build_router, health};
use reel_server::resolve::RpcResolver;
use reel_server::transcoder::{HttpTranscoder, NoopTranscoder, TranscoderClient};
use reel_server::{Config, Player};
use reel_store::{spawn_sweep_task, DiskStore, OriginClient, TieredStore};

/// HTTP media-delivery edge server over a content-addressed blob network.
#[derive(Parser, Debug)]
#[command(name = "reel-server")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Path to the TOML configuration file
    #[arg(long, default_value = "player.toml")]
    config: PathBuf,

    /// Override the configured bind address
    #[arg(long)]
    bind: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    let mut config = if cli.config.exists() {
        Config::from_file(&cli.config)?
    } else {
        tracing::warn!(
            "config file {:?} not found, using built-in defaults",
            cli.config
        );
        Config::default()
    };
    if let Some(bind) = cli.bind {
        config.server.bind_address = bind;
    }

    let disk = Arc::new(
        DiskStore::open(&config.disk_cache.dir, config.disk_cache.max_size)
            .await
            .context("opening disk blob cache")?,
    );
    let _sweep = spawn_sweep_task(Arc::clone(&disk), config.disk_cache.sweep_interval_secs);

    let origin = OriginClient::new(
        config.reflector.address.clone(),
        Duration::from_secs(config.reflector.timeout_secs),
    );
    let cold = Arc::new(TieredStore::new(Arc::clone(&disk), origin));

    let hot = Arc::new(HotCache::new(
        cold,
        HotCacheConfig {
            sd_entries: config.hot_cache.sd_entries,
            chunk_bytes: config.hot_cache.chunk_bytes,
        },
    ));

    let resolver = Arc::new(RpcResolver::new(config.resolver.url.clone()));
    let transcoder: Arc<dyn TranscoderClient> = match &config.transcoder.url {
        Some(url) => Arc::new(HttpTranscoder::new(url.clone())),
        None => Arc::new(NoopTranscoder),
    };

    let bind_address = config.server.bind_address.clone();
    let player = Arc::new(
        Player::new(
            config,
            hot,
            resolver,
            Arc::new(FreeStreamVerifier),
            transcoder,
        )
        .with_disk_stats(disk),
    );

    health::init_start_time();
    let router = build_router(player);

    let listener = tokio::net::TcpListener::bind(&bind_address)
        .await
        .with_context(|| format!("binding {bind_address}"))?;
    tracing::info!("reel-server v{} listening on {bind_address}", env!("CARGO_PKG_VERSION"));

    axum::serve(listener, router).await?;
    Ok(())
}
