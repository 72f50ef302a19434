//! The blob storage trait and a memory-backed implementation.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use reel_types::BlobHash;

use crate::error::{StoreError, StoreResult};

/// Trait for content-addressed blob storage.
///
/// Blobs are immutable; a `put` under a key that already exists is a no-op
/// beyond refreshing recency. Implementations must be safe to share across
/// request tasks.
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Retrieve a blob's bytes by content address.
    ///
    /// Returns `NotFound` if the blob is not in the store.
    async fn get(&self, hash: &BlobHash) -> StoreResult<Vec<u8>>;

    /// Store a blob under its content address.
    async fn put(&self, hash: &BlobHash, bytes: &[u8]) -> StoreResult<()>;

    /// Check whether a blob is present.
    async fn has(&self, hash: &BlobHash) -> bool;

    /// Remove a blob. Best-effort: a missing blob is not an error.
    async fn delete(&self, hash: &BlobHash) -> StoreResult<()>;
}

/// In-memory blob store.
///
/// Thread-safe map, no bounds, no persistence. Doubles as a fake origin in
/// tests.
#[derive(Default, Clone)]
pub struct MemStore {
    blobs: Arc<Mutex<HashMap<BlobHash, Vec<u8>>>>,
}

impl MemStore {
    /// Create a new empty memory store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of blobs currently stored.
    pub fn len(&self) -> usize {
        self.blobs.lock().unwrap().len()
    }

    /// Whether the store is empty.
    pub fn is_empty(&self) -> bool {
        self.blobs.lock().unwrap().is_empty()
    }

    /// Store a blob, computing its address from the bytes.
    pub fn put_anonymous(&self, bytes: &[u8]) -> BlobHash {
        let hash = BlobHash::of(bytes);
        self.blobs.lock().unwrap().insert(hash, bytes.to_vec());
        hash
    }
}

#[async_trait]
impl BlobStore for MemStore {
    async fn get(&self, hash: &BlobHash) -> StoreResult<Vec<u8>> {
        self.blobs
            .lock()
            .unwrap()
            .get(hash)
            .cloned()
            .ok_or_else(|| StoreError::not_found(hash))
    }

    async fn put(&self, hash: &BlobHash, bytes: &[u8]) -> StoreResult<()> {
        self.blobs.lock().unwrap().insert(*hash, bytes.to_vec());
        Ok(())
    }

    async fn has(&self, hash: &BlobHash) -> bool {
        self.blobs.lock().unwrap().contains_key(hash)
    }

    async fn delete(&self, hash: &BlobHash) -> StoreResult<()> {
        self.blobs.lock().unwrap().remove(hash);
        Ok(())
    }
}
