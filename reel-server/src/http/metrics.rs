//! Prometheus metrics endpoint.

use crate::player::Player;
use axum::{http::header::CONTENT_TYPE, response::IntoResponse, Extension};
use std::sync::atomic::Ordering;
use std::sync::Arc;

/// Prometheus metrics handler.
///
/// Returns metrics in Prometheus text format.
/// Includes both gauges (current state) and counters (monotonic since startup).
pub async fn metrics_handler(Extension(player): Extension<Arc<Player>>) -> impl IntoResponse {
    let m = player.metrics();
    let cache = player.hot().stats();

    // Counters — monotonic since startup
    let resolved = m.streams_resolved.load(Ordering::Relaxed);
    let served = m.streams_served.load(Ordering::Relaxed);
    let out_bytes = m.out_bytes.load(Ordering::Relaxed);
    let errors = m.errors_total.load(Ordering::Relaxed);
    let redirects = m.transcoded_redirects.load(Ordering::Relaxed);
    let sd_hits = cache.sd_hits.load(Ordering::Relaxed);
    let sd_misses = cache.sd_misses.load(Ordering::Relaxed);
    let chunk_hits = cache.chunk_hits.load(Ordering::Relaxed);
    let chunk_misses = cache.chunk_misses.load(Ordering::Relaxed);

    // Gauges — current state
    let hot_bytes = player.hot().chunk_cache_bytes();
    let sd_entries = player.hot().sd_cache_len();
    let (disk_blobs, disk_bytes) = match player.disk() {
        Some(disk) => (disk.len() as u64, disk.total_bytes()),
        None => (0, 0),
    };

    let body = format!(
        r#"# HELP player_streams_resolved_total URIs successfully resolved
# TYPE player_streams_resolved_total counter
player_streams_resolved_total {resolved}

# HELP player_streams_served_total Streams with content bytes served
# TYPE player_streams_served_total counter
player_streams_served_total {served}

# HELP player_out_bytes_total Plaintext bytes delivered to clients
# TYPE player_out_bytes_total counter
player_out_bytes_total {out_bytes}

# HELP player_errors_total Requests answered with an error status
# TYPE player_errors_total counter
player_errors_total {errors}

# HELP player_transcoded_redirects_total Requests redirected to an HLS variant
# TYPE player_transcoded_redirects_total counter
player_transcoded_redirects_total {redirects}

# HELP player_sd_cache_hits_total Stream descriptor cache hits
# TYPE player_sd_cache_hits_total counter
player_sd_cache_hits_total {sd_hits}

# HELP player_sd_cache_misses_total Stream descriptor cache misses
# TYPE player_sd_cache_misses_total counter
player_sd_cache_misses_total {sd_misses}

# HELP player_chunk_cache_hits_total Hot chunk cache hits
# TYPE player_chunk_cache_hits_total counter
player_chunk_cache_hits_total {chunk_hits}

# HELP player_chunk_cache_misses_total Hot chunk cache misses
# TYPE player_chunk_cache_misses_total counter
player_chunk_cache_misses_total {chunk_misses}

# HELP player_info Server information
# TYPE player_info gauge
player_info{{version="{version}"}} 1

# HELP player_hot_chunk_bytes Decrypted bytes in the hot chunk cache
# TYPE player_hot_chunk_bytes gauge
player_hot_chunk_bytes {hot_bytes}

# HELP player_sd_cache_entries Stream descriptors currently cached
# TYPE player_sd_cache_entries gauge
player_sd_cache_entries {sd_entries}

# HELP player_disk_blobs Blobs currently in the disk cache
# TYPE player_disk_blobs gauge
player_disk_blobs {disk_blobs}

# HELP player_disk_bytes Bytes currently in the disk cache
# TYPE player_disk_bytes gauge
player_disk_bytes {disk_bytes}
"#,
        version = env!("CARGO_PKG_VERSION"),
    );

    (
        [(CONTENT_TYPE, "text/plain; version=0.0.4; charset=utf-8")],
        body,
    )
}

#[cfg(test)]
mod tests {
    #[test]
    fn prometheus_format_is_valid() {
        let sample = format!(
            "# TYPE player_out_bytes_total counter\nplayer_out_bytes_total {}",
            42
        );
        assert!(sample.contains("counter"));
        assert!(sample.contains("42"));
    }
}
