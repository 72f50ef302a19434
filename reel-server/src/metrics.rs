//! Operational metrics for the player.

use std::sync::atomic::AtomicU64;

/// Counters for monitoring player activity.
///
/// All counters are monotonically increasing (reset only on restart).
/// Thread-safe via `AtomicU64` — no locks needed for incrementing.
#[derive(Debug, Default)]
pub struct PlayerMetrics {
    /// Total URIs successfully resolved.
    pub streams_resolved: AtomicU64,
    /// Total streams for which content bytes were served.
    pub streams_served: AtomicU64,
    /// Total plaintext bytes delivered to clients.
    pub out_bytes: AtomicU64,
    /// Total requests answered with an error status.
    pub errors_total: AtomicU64,
    /// Total requests redirected to a transcoded HLS variant.
    pub transcoded_redirects: AtomicU64,
}
