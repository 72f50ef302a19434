//! On-disk blob store with LRU eviction.
//!
//! Blobs live as files named by their hex hash under one directory; the
//! filesystem is the index. LRU metadata (size, last access, retention) is
//! kept in memory and rebuilt on startup from a directory scan, seeding
//! access times from file mtimes.

use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use async_trait::async_trait;
use dashmap::DashMap;
use reel_types::{BlobHash, MAX_BLOB_SIZE};

use crate::error::{StoreError, StoreResult};
use crate::store::BlobStore;

/// Counter making concurrent temp-file names unique within the process.
static TEMP_SEQ: AtomicU64 = AtomicU64::new(0);

#[derive(Debug)]
struct DiskEntry {
    size: u64,
    last_access: SystemTime,
    /// Readers currently holding this entry; the sweep never evicts while
    /// nonzero.
    retained: u32,
}

/// Size-bounded directory of blobs with in-memory LRU metadata.
pub struct DiskStore {
    dir: PathBuf,
    max_bytes: u64,
    entries: DashMap<BlobHash, DiskEntry>,
    total_bytes: AtomicU64,
}

impl DiskStore {
    /// Open a disk store, creating the directory if needed and rebuilding
    /// LRU metadata from the files already present.
    pub async fn open(dir: impl Into<PathBuf>, max_bytes: u64) -> StoreResult<Self> {
        let dir = dir.into();
        tokio::fs::create_dir_all(&dir).await?;

        let store = Self {
            dir,
            max_bytes,
            entries: DashMap::new(),
            total_bytes: AtomicU64::new(0),
        };
        store.scan().await?;
        Ok(store)
    }

    /// Rebuild entry metadata from the directory contents.
    async fn scan(&self) -> StoreResult<()> {
        let mut read_dir = tokio::fs::read_dir(&self.dir).await?;
        let mut total = 0u64;
        let mut count = 0usize;

        while let Some(dirent) = read_dir.next_entry().await? {
            let name = dirent.file_name();
            let Some(name) = name.to_str() else { continue };
            let Ok(hash) = BlobHash::from_hex(name) else {
                // Leftover temp files and strangers are not part of the store.
                continue;
            };
            let meta = match dirent.metadata().await {
                Ok(m) if m.is_file() => m,
                _ => continue,
            };
            let last_access = meta.modified().unwrap_or_else(|_| SystemTime::now());
            total += meta.len();
            count += 1;
            self.entries.insert(
                hash,
                DiskEntry {
                    size: meta.len(),
                    last_access,
                    retained: 0,
                },
            );
        }

        self.total_bytes.store(total, Ordering::Relaxed);
        tracing::info!(
            "disk store opened: {} blobs, {} bytes (cap {})",
            count,
            total,
            self.max_bytes
        );
        Ok(())
    }

    fn blob_path(&self, hash: &BlobHash) -> PathBuf {
        self.dir.join(hash.to_hex())
    }

    /// Pin an entry against eviction and refresh its LRU position.
    /// Returns false if the entry is unknown.
    fn retain(&self, hash: &BlobHash) -> bool {
        match self.entries.get_mut(hash) {
            Some(mut entry) => {
                entry.retained += 1;
                entry.last_access = SystemTime::now();
                true
            }
            None => false,
        }
    }

    fn release(&self, hash: &BlobHash) {
        if let Some(mut entry) = self.entries.get_mut(hash) {
            entry.retained = entry.retained.saturating_sub(1);
        }
    }

    /// Drop an entry from the metadata map and the filesystem.
    /// Skips (returns false) if the entry is currently retained.
    fn forget(&self, hash: &BlobHash) -> bool {
        let removed = self
            .entries
            .remove_if(hash, |_, entry| entry.retained == 0);
        match removed {
            Some((_, entry)) => {
                self.total_bytes.fetch_sub(entry.size, Ordering::Relaxed);
                true
            }
            None => false,
        }
    }

    /// Total bytes currently accounted on disk.
    pub fn total_bytes(&self) -> u64 {
        self.total_bytes.load(Ordering::Relaxed)
    }

    /// Number of blobs currently accounted on disk.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the store holds no blobs.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// The configured size cap in bytes.
    pub fn max_bytes(&self) -> u64 {
        self.max_bytes
    }

    /// Evict oldest-accessed, unretained entries until total size fits the
    /// cap. Returns the number of blobs removed.
    pub async fn evict_to_cap(&self) -> u64 {
        let mut evicted = 0u64;

        while self.total_bytes() > self.max_bytes {
            let mut oldest: Option<(BlobHash, SystemTime)> = None;
            for entry in self.entries.iter() {
                if entry.retained > 0 {
                    continue;
                }
                let candidate = (*entry.key(), entry.last_access);
                match &oldest {
                    Some((_, ts)) if *ts <= candidate.1 => {}
                    _ => oldest = Some(candidate),
                }
            }

            let Some((hash, _)) = oldest else {
                tracing::warn!(
                    "disk store over cap ({} > {}) but every entry is retained",
                    self.total_bytes(),
                    self.max_bytes
                );
                break;
            };

            if self.forget(&hash) {
                if let Err(e) = tokio::fs::remove_file(self.blob_path(&hash)).await {
                    if e.kind() != std::io::ErrorKind::NotFound {
                        tracing::warn!("failed to evict blob {hash}: {e}");
                    }
                }
                tracing::debug!("evicted blob {hash}");
                evicted += 1;
            }
        }

        evicted
    }
}

#[async_trait]
impl BlobStore for DiskStore {
    async fn get(&self, hash: &BlobHash) -> StoreResult<Vec<u8>> {
        if !self.retain(hash) {
            return Err(StoreError::not_found(hash));
        }

        let result = tokio::fs::read(self.blob_path(hash)).await;
        self.release(hash);

        match result {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                // File vanished underneath the metadata; drop the entry.
                self.forget(hash);
                Err(StoreError::not_found(hash))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn put(&self, hash: &BlobHash, bytes: &[u8]) -> StoreResult<()> {
        if bytes.len() > MAX_BLOB_SIZE {
            return Err(StoreError::BlobTooLarge {
                size: bytes.len(),
                limit: MAX_BLOB_SIZE,
            });
        }

        // Write-once per key: an existing entry only gets its recency bumped.
        if let Some(mut entry) = self.entries.get_mut(hash) {
            entry.last_access = SystemTime::now();
            return Ok(());
        }

        let final_path = self.blob_path(hash);
        let tmp_path = self.dir.join(format!(
            "{}.tmp.{}",
            hash.to_hex(),
            TEMP_SEQ.fetch_add(1, Ordering::Relaxed)
        ));

        tokio::fs::write(&tmp_path, bytes).await?;
        if let Err(e) = tokio::fs::rename(&tmp_path, &final_path).await {
            let _ = tokio::fs::remove_file(&tmp_path).await;
            return Err(e.into());
        }

        let size = bytes.len() as u64;
        self.entries.insert(
            *hash,
            DiskEntry {
                size,
                last_access: SystemTime::now(),
                retained: 0,
            },
        );
        self.total_bytes.fetch_add(size, Ordering::Relaxed);
        Ok(())
    }

    async fn has(&self, hash: &BlobHash) -> bool {
        self.entries.contains_key(hash)
    }

    async fn delete(&self, hash: &BlobHash) -> StoreResult<()> {
        self.forget(hash);
        match tokio::fs::remove_file(self.blob_path(hash)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

/// Spawn the background eviction sweep.
///
/// Returns a handle that can be used to abort the task.
pub fn spawn_sweep_task(store: Arc<DiskStore>, interval_secs: u64) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        tracing::info!("disk sweep task started (interval: {}s)", interval_secs);
        let mut timer = tokio::time::interval(Duration::from_secs(interval_secs));

        loop {
            timer.tick().await;
            let evicted = store.evict_to_cap().await;
            if evicted > 0 {
                tracing::info!("disk sweep: evicted {} blobs", evicted);
            } else {
                tracing::debug!("disk sweep: under cap");
            }
        }
    })
}
