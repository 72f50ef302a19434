//! # reel-cache
//!
//! The hot tier: in-memory LRU caches of parsed stream descriptors and
//! decrypted chunks, fronting the cold (disk → origin) store.
//!
//! Both caches sit behind a single-flight gate: concurrent requests for the
//! same key coalesce into one underlying fetch, so a popular stream going
//! viral cannot stampede the reflector. Failures are delivered to every
//! waiter and never cached.
//!
//! ```text
//! get_chunk(hash, key, iv)
//!   ├─ hot hit ──────────────► Arc<chunk>
//!   └─ miss ─ single-flight ─► cold store get(hash)
//!                                 ├─ verify content hash
//!                                 ├─ decrypt (AES-CBC, PKCS#7)
//!                                 └─ insert hot, return
//! ```
//!
//! Cached values are immutable and handed out as `Arc` clones, so readers
//! never observe eviction mid-read.

#![warn(missing_docs)]
#![warn(clippy::all)]

mod error;
mod hot;
mod singleflight;
mod weighted;

pub use error::CacheError;
pub use hot::{CacheStats, HotCache, HotCacheConfig};
pub use singleflight::SingleFlight;
pub use weighted::WeightedCache;

#[cfg(any(test, feature = "test-util"))]
pub mod fixture;
