//! Health check endpoint.

use crate::player::Player;
use axum::{Extension, Json};
use serde::Serialize;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Instant;

/// Global start time for uptime calculation.
static START_TIME: std::sync::OnceLock<Instant> = std::sync::OnceLock::new();

/// Initialize the start time (call once at startup).
pub fn init_start_time() {
    START_TIME.get_or_init(Instant::now);
}

/// Health status response.
#[derive(Debug, Clone, Serialize)]
pub struct HealthStatus {
    /// Overall status.
    pub status: String,
    /// Server version.
    pub version: String,
    /// Name reported in `X-Powered-By`.
    pub player_name: String,
    /// Uptime in seconds.
    pub uptime_seconds: u64,
    /// Streams served since startup.
    pub streams_served: u64,
    /// Plaintext bytes delivered since startup.
    pub out_bytes: u64,
    /// Blobs currently in the disk cache.
    pub disk_blobs: usize,
    /// Bytes currently in the disk cache.
    pub disk_bytes: u64,
    /// Decrypted bytes currently in the hot chunk cache.
    pub hot_chunk_bytes: u64,
    /// Stream descriptors currently cached.
    pub sd_entries: usize,
}

/// Health check handler.
pub async fn health_handler(Extension(player): Extension<Arc<Player>>) -> Json<HealthStatus> {
    let uptime = START_TIME
        .get()
        .map(|start| start.elapsed().as_secs())
        .unwrap_or(0);

    let (disk_blobs, disk_bytes) = match player.disk() {
        Some(disk) => (disk.len(), disk.total_bytes()),
        None => (0, 0),
    };

    Json(HealthStatus {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        player_name: player.name().to_string(),
        uptime_seconds: uptime,
        streams_served: player.metrics().streams_served.load(Ordering::Relaxed),
        out_bytes: player.metrics().out_bytes.load(Ordering::Relaxed),
        disk_blobs,
        disk_bytes,
        hot_chunk_bytes: player.hot().chunk_cache_bytes(),
        sd_entries: player.hot().sd_cache_len(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn health_status_serializes() {
        let status = HealthStatus {
            status: "ok".to_string(),
            version: "0.1.0".to_string(),
            player_name: "edge-01".to_string(),
            uptime_seconds: 3600,
            streams_served: 12,
            out_bytes: 1_048_576,
            disk_blobs: 4,
            disk_bytes: 8_388_608,
            hot_chunk_bytes: 2_097_136,
            sd_entries: 2,
        };

        let json = serde_json::to_string(&status).unwrap();
        assert!(json.contains("\"status\":\"ok\""));
        assert!(json.contains("\"streams_served\":12"));
        assert!(json.contains("\"disk_blobs\":4"));
    }
}
