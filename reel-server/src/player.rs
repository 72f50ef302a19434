//! Shared server state.

use std::sync::atomic::Ordering;
use std::sync::Arc;

use reel_cache::HotCache;
use reel_store::DiskStore;

use crate::access::AccessVerifier;
use crate::config::Config;
use crate::error::PlayerError;
use crate::metrics::PlayerMetrics;
use crate::resolve::{Claim, StreamResolver};
use crate::stream::Stream;
use crate::transcoder::TranscoderClient;

/// The player: caches, collaborators, and per-process metrics, shared by
/// every request task.
pub struct Player {
    config: Config,
    hot: Arc<HotCache>,
    disk: Option<Arc<DiskStore>>,
    resolver: Arc<dyn StreamResolver>,
    verifier: Arc<dyn AccessVerifier>,
    transcoder: Arc<dyn TranscoderClient>,
    metrics: PlayerMetrics,
    name: String,
}

impl Player {
    /// Assemble a player from its collaborators.
    pub fn new(
        config: Config,
        hot: Arc<HotCache>,
        resolver: Arc<dyn StreamResolver>,
        verifier: Arc<dyn AccessVerifier>,
        transcoder: Arc<dyn TranscoderClient>,
    ) -> Self {
        let name = resolve_player_name(config.server.player_name.as_deref());
        Self {
            config,
            hot,
            disk: None,
            resolver,
            verifier,
            transcoder,
            metrics: PlayerMetrics::default(),
            name,
        }
    }

    /// Attach the disk tier for health/metrics reporting.
    pub fn with_disk_stats(mut self, disk: Arc<DiskStore>) -> Self {
        self.disk = Some(disk);
        self
    }

    /// Resolve a URI and construct its request-scoped stream.
    pub async fn resolve_stream(self: &Arc<Self>, uri: &str) -> Result<Stream, PlayerError> {
        let claim = self.resolver.resolve(uri).await?;
        self.metrics.streams_resolved.fetch_add(1, Ordering::Relaxed);
        Ok(Stream::new(Arc::clone(self), uri.to_string(), claim))
    }

    /// Verify that a request may read a claim.
    pub async fn verify_access(
        &self,
        claim: &Claim,
        token: Option<&str>,
    ) -> Result<(), PlayerError> {
        self.verifier.verify(claim, token).await
    }

    /// The hot cache.
    pub fn hot(&self) -> &Arc<HotCache> {
        &self.hot
    }

    /// The disk tier, when attached.
    pub fn disk(&self) -> Option<&Arc<DiskStore>> {
        self.disk.as_ref()
    }

    /// The transcoded-variant registry.
    pub fn transcoder(&self) -> &Arc<dyn TranscoderClient> {
        &self.transcoder
    }

    /// Operational counters.
    pub fn metrics(&self) -> &PlayerMetrics {
        &self.metrics
    }

    /// The loaded configuration.
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Name reported in `X-Powered-By`.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Whether chunk reads schedule background prefetch.
    pub fn prefetch_enabled(&self) -> bool {
        self.config.prefetch.enabled
    }

    /// How many chunks ahead to prefetch.
    pub fn prefetch_window(&self) -> usize {
        self.config.prefetch.window
    }
}

/// `PLAYER_NAME` env var beats the configured name beats the hostname.
fn resolve_player_name(configured: Option<&str>) -> String {
    if let Ok(name) = std::env::var("PLAYER_NAME") {
        if !name.is_empty() {
            return name;
        }
    }
    if let Some(name) = configured {
        if !name.is_empty() {
            return name.to_string();
        }
    }
    std::env::var("HOSTNAME").unwrap_or_else(|_| "unknown-player".to_string())
}
