//! Stream fixtures for tests.
//!
//! Builds a complete encrypted stream — SD blob plus content blobs — from a
//! plaintext, the way an authoring client would, so cache and reader tests
//! can run against realistic wire data.

use reel_content::{encrypt_chunk, StreamDescriptor, IV_SIZE};
use reel_store::BlobStore;
use reel_types::{BlobHash, MAX_CHUNK_SIZE};

/// A fully-built encrypted stream.
pub struct StreamFixture {
    /// The AES key used for every chunk.
    pub key: Vec<u8>,
    /// Serialized SD blob.
    pub sd_bytes: Vec<u8>,
    /// Content address of the SD blob.
    pub sd_hash: BlobHash,
    /// Content blobs in stream order: (hash, ciphertext).
    pub blobs: Vec<(BlobHash, Vec<u8>)>,
    /// The original plaintext.
    pub plaintext: Vec<u8>,
}

impl StreamFixture {
    /// Chunk `plaintext` at the maximum chunk size, encrypt each chunk, and
    /// assemble the descriptor.
    pub fn build(key: &[u8], plaintext: &[u8]) -> Self {
        Self::build_named(key, plaintext, "fixture.mp4")
    }

    /// Like [`build`](Self::build), with an explicit stream file name.
    pub fn build_named(key: &[u8], plaintext: &[u8], name: &str) -> Self {
        let mut blobs = Vec::new();
        let mut blob_entries = Vec::new();

        for (i, chunk) in plaintext.chunks(MAX_CHUNK_SIZE).enumerate() {
            let iv = iv_for(i);
            let ciphertext = encrypt_chunk(key, &iv, chunk).expect("fixture encryption");
            let hash = BlobHash::of(&ciphertext);
            blob_entries.push(serde_json::json!({
                "blob_num": i,
                "length": ciphertext.len(),
                "iv": hex::encode(iv),
                "blob_hash": hash.to_hex(),
            }));
            blobs.push((hash, ciphertext));
        }

        let terminator_iv = iv_for(blobs.len());
        blob_entries.push(serde_json::json!({
            "blob_num": blobs.len(),
            "length": 0,
            "iv": hex::encode(terminator_iv),
        }));

        let sd_json = serde_json::json!({
            "stream_name": hex::encode(name),
            "suggested_file_name": hex::encode(name),
            "stream_type": "media",
            "stream_hash": BlobHash::of(plaintext).to_hex(),
            "key": hex::encode(key),
            "blobs": blob_entries,
        });
        let sd_bytes = serde_json::to_vec(&sd_json).expect("fixture descriptor json");
        let sd_hash = BlobHash::of(&sd_bytes);

        Self {
            key: key.to_vec(),
            sd_bytes,
            sd_hash,
            blobs,
            plaintext: plaintext.to_vec(),
        }
    }

    /// Parse the fixture's descriptor the way the server would.
    pub fn descriptor(&self) -> StreamDescriptor {
        StreamDescriptor::from_json(&self.sd_bytes).expect("fixture descriptor parses")
    }
}

/// Deterministic per-index IV.
fn iv_for(index: usize) -> [u8; IV_SIZE] {
    let mut iv = [0u8; IV_SIZE];
    iv[..8].copy_from_slice(&(index as u64 + 1).to_be_bytes());
    iv
}

/// Load every blob of a fixture into a store, SD blob included.
pub async fn seed_store<S: BlobStore>(store: &S, fixture: &StreamFixture) {
    store
        .put(&fixture.sd_hash, &fixture.sd_bytes)
        .await
        .expect("seed sd blob");
    for (hash, bytes) in &fixture.blobs {
        store.put(hash, bytes).await.expect("seed content blob");
    }
}
