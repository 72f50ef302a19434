//! Error types for reel-store.

use std::time::Duration;

/// Errors from blob storage and origin fetches.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The blob is not present in this store.
    #[error("blob not found: {hash}")]
    NotFound {
        /// Hex hash of the missing blob.
        hash: String,
    },

    /// Fetched bytes do not hash to the requested address.
    #[error("hash mismatch: expected {expected}, got {actual}")]
    HashMismatch {
        /// The requested content address.
        expected: String,
        /// What the fetched bytes actually hash to.
        actual: String,
    },

    /// The blob exceeds the network's size limit.
    #[error("blob too large: {size} bytes (limit: {limit})")]
    BlobTooLarge {
        /// Actual size of the rejected blob.
        size: usize,
        /// Maximum allowed size.
        limit: usize,
    },

    /// An origin fetch exceeded its deadline.
    #[error("origin fetch timed out after {0:?}")]
    Timeout(Duration),

    /// The reflector sent a malformed or unexpected frame.
    #[error("origin protocol error: {0}")]
    Protocol(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl StoreError {
    /// Shorthand for a `NotFound` carrying the hex form of a hash.
    pub fn not_found(hash: &reel_types::BlobHash) -> Self {
        Self::NotFound {
            hash: hash.to_hex(),
        }
    }
}

/// Result type alias for store operations.
pub type StoreResult<T> = std::result::Result<T, StoreError>;
