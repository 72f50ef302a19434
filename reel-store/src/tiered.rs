//! Disk-over-origin read-through store.

use async_trait::async_trait;
use reel_types::BlobHash;
use std::sync::Arc;

use crate::disk::DiskStore;
use crate::error::{StoreError, StoreResult};
use crate::origin::OriginClient;
use crate::store::BlobStore;

/// Composes the disk cache over the reflector origin.
///
/// `get` reads from disk first; a disk miss pulls from the origin and writes
/// the verified bytes back to disk before returning them. `put`, `has` and
/// `delete` address the disk tier only — the origin is read-only.
pub struct TieredStore {
    disk: Arc<DiskStore>,
    origin: OriginClient,
}

impl TieredStore {
    /// Create a tiered store from an opened disk store and an origin client.
    pub fn new(disk: Arc<DiskStore>, origin: OriginClient) -> Self {
        Self { disk, origin }
    }

    /// The disk tier, for sweep scheduling and stats.
    pub fn disk(&self) -> &Arc<DiskStore> {
        &self.disk
    }
}

#[async_trait]
impl BlobStore for TieredStore {
    async fn get(&self, hash: &BlobHash) -> StoreResult<Vec<u8>> {
        match self.disk.get(hash).await {
            Ok(bytes) => return Ok(bytes),
            Err(StoreError::NotFound { .. }) => {}
            Err(e) => return Err(e),
        }

        let bytes = self.origin.fetch(hash).await?;
        // A failed write-back costs a future re-fetch, not this request.
        if let Err(e) = self.disk.put(hash, &bytes).await {
            tracing::warn!("failed to write blob {hash} through to disk: {e}");
        }
        Ok(bytes)
    }

    async fn put(&self, hash: &BlobHash, bytes: &[u8]) -> StoreResult<()> {
        self.disk.put(hash, bytes).await
    }

    async fn has(&self, hash: &BlobHash) -> bool {
        self.disk.has(hash).await
    }

    async fn delete(&self, hash: &BlobHash) -> StoreResult<()> {
        self.disk.delete(hash).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::time::Duration;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    async fn spawn_reflector(blobs: HashMap<String, Vec<u8>>) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        let blobs = Arc::new(blobs);

        tokio::spawn(async move {
            while let Ok((mut socket, _)) = listener.accept().await {
                let blobs = blobs.clone();
                tokio::spawn(async move {
                    let mut len_buf = [0u8; 4];
                    if socket.read_exact(&mut len_buf).await.is_err() {
                        return;
                    }
                    let mut request = vec![0u8; u32::from_be_bytes(len_buf) as usize];
                    if socket.read_exact(&mut request).await.is_err() {
                        return;
                    }
                    match blobs.get(&String::from_utf8_lossy(&request).into_owned()) {
                        Some(bytes) => {
                            let _ = socket.write_all(&[0u8]).await;
                            let _ = socket
                                .write_all(&(bytes.len() as u32).to_be_bytes())
                                .await;
                            let _ = socket.write_all(bytes).await;
                        }
                        None => {
                            let _ = socket.write_all(&[1u8]).await;
                        }
                    }
                });
            }
        });

        addr
    }

    #[tokio::test]
    async fn miss_pulls_from_origin_and_writes_back() {
        let bytes = b"origin-resident blob".to_vec();
        let hash = BlobHash::of(&bytes);
        let addr = spawn_reflector(HashMap::from([(hash.to_hex(), bytes.clone())])).await;

        let dir = tempfile::tempdir().unwrap();
        let disk = Arc::new(DiskStore::open(dir.path(), 1 << 20).await.unwrap());
        let store = TieredStore::new(disk.clone(), OriginClient::new(addr, Duration::from_secs(5)));

        assert!(!disk.has(&hash).await);
        assert_eq!(store.get(&hash).await.unwrap(), bytes);
        // Now resident on disk.
        assert!(disk.has(&hash).await);
        assert_eq!(disk.get(&hash).await.unwrap(), bytes);
    }

    #[tokio::test]
    async fn disk_hit_skips_origin() {
        // Origin that knows nothing; disk must satisfy the read.
        let addr = spawn_reflector(HashMap::new()).await;

        let dir = tempfile::tempdir().unwrap();
        let disk = Arc::new(DiskStore::open(dir.path(), 1 << 20).await.unwrap());
        let bytes = b"already on disk".to_vec();
        let hash = BlobHash::of(&bytes);
        disk.put(&hash, &bytes).await.unwrap();

        let store = TieredStore::new(disk, OriginClient::new(addr, Duration::from_secs(5)));
        assert_eq!(store.get(&hash).await.unwrap(), bytes);
    }

    #[tokio::test]
    async fn miss_everywhere_is_not_found() {
        let addr = spawn_reflector(HashMap::new()).await;
        let dir = tempfile::tempdir().unwrap();
        let disk = Arc::new(DiskStore::open(dir.path(), 1 << 20).await.unwrap());
        let store = TieredStore::new(disk, OriginClient::new(addr, Duration::from_secs(5)));

        let result = store.get(&BlobHash::of(b"nowhere")).await;
        assert!(matches!(result, Err(StoreError::NotFound { .. })));
    }
}
