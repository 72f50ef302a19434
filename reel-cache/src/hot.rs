//! The two-tier hot cache.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use reel_content::{decrypt_chunk, StreamDescriptor, IV_SIZE};
use reel_store::BlobStore;
use reel_types::{BlobHash, MAX_CHUNK_SIZE};

use crate::error::CacheError;
use crate::singleflight::SingleFlight;
use crate::weighted::WeightedCache;

/// Key of a hot chunk entry.
///
/// Repeated-content blobs can share ciphertext (same hash) under different
/// IVs and decrypt to different plaintext, so the hash alone is not enough.
type ChunkKey = (BlobHash, [u8; IV_SIZE]);

/// Sizing for the hot cache tiers.
#[derive(Debug, Clone)]
pub struct HotCacheConfig {
    /// Maximum number of parsed stream descriptors to keep.
    pub sd_entries: usize,
    /// Aggregate plaintext budget for decrypted chunks, in bytes.
    pub chunk_bytes: u64,
}

impl Default for HotCacheConfig {
    fn default() -> Self {
        Self {
            sd_entries: 1_000,
            chunk_bytes: 256 * 1024 * 1024,
        }
    }
}

/// Hit/miss counters, cumulative since startup.
#[derive(Debug, Default)]
pub struct CacheStats {
    /// Descriptor cache hits.
    pub sd_hits: AtomicU64,
    /// Descriptor cache misses.
    pub sd_misses: AtomicU64,
    /// Chunk cache hits.
    pub chunk_hits: AtomicU64,
    /// Chunk cache misses.
    pub chunk_misses: AtomicU64,
}

/// In-memory cache of parsed descriptors and decrypted chunks over a cold
/// blob store, with single-flight fetch coalescing.
///
/// All methods take `&self`; internal locks are held only for map
/// operations, never across awaits.
pub struct HotCache {
    store: Arc<dyn BlobStore>,
    sd_cache: Arc<Mutex<WeightedCache<BlobHash, Arc<StreamDescriptor>>>>,
    chunk_cache: Arc<Mutex<WeightedCache<ChunkKey, Arc<Vec<u8>>>>>,
    sd_flights: SingleFlight<BlobHash, Arc<StreamDescriptor>>,
    chunk_flights: SingleFlight<ChunkKey, Arc<Vec<u8>>>,
    stats: CacheStats,
}

impl HotCache {
    /// Create a hot cache over a cold store.
    pub fn new(store: Arc<dyn BlobStore>, config: HotCacheConfig) -> Self {
        Self {
            store,
            sd_cache: Arc::new(Mutex::new(WeightedCache::bounded_by_entries(
                config.sd_entries,
            ))),
            chunk_cache: Arc::new(Mutex::new(WeightedCache::bounded_by_weight(
                config.chunk_bytes,
            ))),
            sd_flights: SingleFlight::new(),
            chunk_flights: SingleFlight::new(),
            stats: CacheStats::default(),
        }
    }

    /// Fetch, parse and cache a stream descriptor by its SD blob hash.
    pub async fn get_sd_blob(
        &self,
        hash: &BlobHash,
    ) -> Result<Arc<StreamDescriptor>, CacheError> {
        if let Some(sd) = self.sd_cache.lock().unwrap().get(hash) {
            self.stats.sd_hits.fetch_add(1, Ordering::Relaxed);
            return Ok(sd);
        }
        self.stats.sd_misses.fetch_add(1, Ordering::Relaxed);

        let store = Arc::clone(&self.store);
        let sd_cache = Arc::clone(&self.sd_cache);
        let hash = *hash;
        self.sd_flights
            .run(hash, async move {
                // A flight that lost the race to a just-landed one sees the
                // cached value here instead of refetching.
                if let Some(sd) = sd_cache.lock().unwrap().get(&hash) {
                    return Ok(sd);
                }

                let bytes = store.get(&hash).await?;
                let sd = match StreamDescriptor::from_json(&bytes) {
                    Ok(sd) => Arc::new(sd),
                    Err(e) => {
                        // An unparseable SD blob is useless in the cold tier.
                        let _ = store.delete(&hash).await;
                        return Err(e.into());
                    }
                };

                sd_cache.lock().unwrap().insert(hash, Arc::clone(&sd), 1);
                Ok(sd)
            })
            .await
    }

    /// Fetch, decrypt and cache a content chunk.
    ///
    /// On a hot miss the blob is pulled from the cold store, verified against
    /// its content address, decrypted, and inserted. Corrupt content (wrong
    /// hash, empty or oversized plaintext) is purged from both tiers.
    pub async fn get_chunk(
        &self,
        hash: &BlobHash,
        key: &[u8],
        iv: &[u8; IV_SIZE],
    ) -> Result<Arc<Vec<u8>>, CacheError> {
        let cache_key: ChunkKey = (*hash, *iv);

        if let Some(chunk) = self.chunk_cache.lock().unwrap().get(&cache_key) {
            self.stats.chunk_hits.fetch_add(1, Ordering::Relaxed);
            return Ok(chunk);
        }
        self.stats.chunk_misses.fetch_add(1, Ordering::Relaxed);

        let store = Arc::clone(&self.store);
        let chunk_cache = Arc::clone(&self.chunk_cache);
        let hash = *hash;
        let key = key.to_vec();
        let iv = *iv;
        self.chunk_flights
            .run(cache_key, async move {
                if let Some(chunk) = chunk_cache.lock().unwrap().get(&cache_key) {
                    return Ok(chunk);
                }

                let bytes = store.get(&hash).await?;

                let actual = BlobHash::of(&bytes);
                if actual != hash {
                    let _ = store.delete(&hash).await;
                    return Err(CacheError::Corrupt {
                        hash: hash.to_hex(),
                        reason: format!("stored bytes hash to {actual}"),
                    });
                }

                let plaintext = decrypt_chunk(&key, &iv, &bytes)?;
                if plaintext.is_empty() || plaintext.len() > MAX_CHUNK_SIZE {
                    let _ = store.delete(&hash).await;
                    return Err(CacheError::Corrupt {
                        hash: hash.to_hex(),
                        reason: format!("implausible plaintext length {}", plaintext.len()),
                    });
                }

                let chunk = Arc::new(plaintext);
                chunk_cache.lock().unwrap().insert(
                    cache_key,
                    Arc::clone(&chunk),
                    chunk.len() as u64,
                );
                Ok(chunk)
            })
            .await
    }

    /// Whether a chunk is currently hot, without touching recency.
    pub fn is_chunk_cached(&self, hash: &BlobHash, iv: &[u8; IV_SIZE]) -> bool {
        self.chunk_cache.lock().unwrap().contains(&(*hash, *iv))
    }

    /// Remove a chunk from the hot tier and delete its blob from the cold
    /// store. Used when a served chunk turns out to be suspect.
    pub async fn clear_chunk(&self, hash: &BlobHash, iv: &[u8; IV_SIZE]) {
        self.chunk_cache.lock().unwrap().remove(&(*hash, *iv));
        if let Err(e) = self.store.delete(hash).await {
            tracing::warn!("failed to clear blob {hash} from cold store: {e}");
        }
    }

    /// Cumulative hit/miss counters.
    pub fn stats(&self) -> &CacheStats {
        &self.stats
    }

    /// Current aggregate plaintext bytes in the chunk tier.
    pub fn chunk_cache_bytes(&self) -> u64 {
        self.chunk_cache.lock().unwrap().total_weight()
    }

    /// Current number of cached descriptors.
    pub fn sd_cache_len(&self) -> usize {
        self.sd_cache.lock().unwrap().len()
    }
}
