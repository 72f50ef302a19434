//! Reflector origin client.
//!
//! The reflector serves blobs by hash over a framed TCP protocol:
//!
//! ```text
//! request:  [u32 BE length][hex hash bytes]
//! response: [u8 status]                      status 0 = found, 1 = not found
//!           [u32 BE length][blob bytes]      only when status is 0
//! ```
//!
//! Fetched bytes are re-hashed before they are returned; a mismatch is an
//! error, never silently served. Transient network failures are not retried
//! here; the caller decides.

use std::time::Duration;

use reel_types::{BlobHash, MAX_BLOB_SIZE};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

use crate::error::{StoreError, StoreResult};

/// Response status byte: blob found, length-prefixed bytes follow.
const STATUS_FOUND: u8 = 0;
/// Response status byte: blob unknown to the reflector.
const STATUS_NOT_FOUND: u8 = 1;

/// Client for fetching blobs from an upstream reflector.
///
/// Stateless: one connection per fetch, each under an independent deadline.
#[derive(Debug, Clone)]
pub struct OriginClient {
    address: String,
    timeout: Duration,
}

impl OriginClient {
    /// Create a client for the given `host:port` with a per-fetch deadline.
    pub fn new(address: impl Into<String>, timeout: Duration) -> Self {
        Self {
            address: address.into(),
            timeout,
        }
    }

    /// Fetch a blob by content address and verify it.
    pub async fn fetch(&self, hash: &BlobHash) -> StoreResult<Vec<u8>> {
        let bytes = tokio::time::timeout(self.timeout, self.fetch_frame(hash))
            .await
            .map_err(|_| StoreError::Timeout(self.timeout))??;

        let actual = BlobHash::of(&bytes);
        if actual != *hash {
            return Err(StoreError::HashMismatch {
                expected: hash.to_hex(),
                actual: actual.to_hex(),
            });
        }
        Ok(bytes)
    }

    async fn fetch_frame(&self, hash: &BlobHash) -> StoreResult<Vec<u8>> {
        let mut stream = TcpStream::connect(&self.address).await?;

        let request = hash.to_hex();
        stream
            .write_all(&(request.len() as u32).to_be_bytes())
            .await?;
        stream.write_all(request.as_bytes()).await?;
        stream.flush().await?;

        let mut status = [0u8; 1];
        stream.read_exact(&mut status).await?;
        match status[0] {
            STATUS_FOUND => {}
            STATUS_NOT_FOUND => return Err(StoreError::not_found(hash)),
            other => {
                return Err(StoreError::Protocol(format!(
                    "unknown response status {other}"
                )))
            }
        }

        let mut len_buf = [0u8; 4];
        stream.read_exact(&mut len_buf).await?;
        let len = u32::from_be_bytes(len_buf) as usize;
        if len == 0 || len > MAX_BLOB_SIZE {
            return Err(StoreError::Protocol(format!(
                "blob length {len} outside (0, {MAX_BLOB_SIZE}]"
            )));
        }

        let mut bytes = vec![0u8; len];
        stream.read_exact(&mut bytes).await?;
        Ok(bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Arc;
    use tokio::net::TcpListener;

    /// Minimal reflector speaking the framed protocol.
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
                    let len = u32::from_be_bytes(len_buf) as usize;
                    let mut request = vec![0u8; len];
                    if socket.read_exact(&mut request).await.is_err() {
                        return;
                    }
                    let key = String::from_utf8_lossy(&request).into_owned();

                    match blobs.get(&key) {
                        Some(bytes) => {
                            let _ = socket.write_all(&[STATUS_FOUND]).await;
                            let _ = socket
                                .write_all(&(bytes.len() as u32).to_be_bytes())
                                .await;
                            let _ = socket.write_all(bytes).await;
                        }
                        None => {
                            let _ = socket.write_all(&[STATUS_NOT_FOUND]).await;
                        }
                    }
                });
            }
        });

        addr
    }

    #[tokio::test]
    async fn fetch_returns_verified_bytes() {
        let bytes = b"reflector blob".to_vec();
        let hash = BlobHash::of(&bytes);
        let addr = spawn_reflector(HashMap::from([(hash.to_hex(), bytes.clone())])).await;

        let client = OriginClient::new(addr, Duration::from_secs(5));
        assert_eq!(client.fetch(&hash).await.unwrap(), bytes);
    }

    #[tokio::test]
    async fn fetch_unknown_blob_is_not_found() {
        let addr = spawn_reflector(HashMap::new()).await;
        let client = OriginClient::new(addr, Duration::from_secs(5));

        let result = client.fetch(&BlobHash::of(b"unknown")).await;
        assert!(matches!(result, Err(StoreError::NotFound { .. })));
    }

    #[tokio::test]
    async fn fetch_rejects_wrong_content() {
        let requested = BlobHash::of(b"what we asked for");
        // Reflector answers the request with different bytes.
        let addr = spawn_reflector(HashMap::from([(
            requested.to_hex(),
            b"something else entirely".to_vec(),
        )]))
        .await;

        let client = OriginClient::new(addr, Duration::from_secs(5));
        let result = client.fetch(&requested).await;
        assert!(matches!(result, Err(StoreError::HashMismatch { .. })));
    }

    #[tokio::test]
    async fn fetch_times_out_on_hung_reflector() {
        // Accepts connections but never responds.
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        tokio::spawn(async move {
            let mut sockets = Vec::new();
            while let Ok((socket, _)) = listener.accept().await {
                sockets.push(socket);
            }
        });

        let client = OriginClient::new(addr, Duration::from_millis(50));
        let result = client.fetch(&BlobHash::of(b"anything")).await;
        assert!(matches!(result, Err(StoreError::Timeout(_))));
    }
}
