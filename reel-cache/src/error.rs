//! Error types for reel-cache.
//!
//! `CacheError` is `Clone` so a single-flight leader's outcome can be
//! broadcast verbatim to every coalesced waiter; non-clonable causes are
//! wrapped in `Arc`.

use std::sync::Arc;

use reel_content::ContentError;
use reel_store::StoreError;

/// Errors surfaced by the hot cache.
#[derive(Debug, Clone, thiserror::Error)]
pub enum CacheError {
    /// The blob is not present in any tier.
    #[error("blob not found: {hash}")]
    NotFound {
        /// Hex hash of the missing blob.
        hash: String,
    },

    /// A fetched blob failed verification or decrypted to garbage; the entry
    /// has been purged from both tiers and a retry may succeed.
    #[error("corrupt chunk {hash}: {reason}")]
    Corrupt {
        /// Hex hash of the purged blob.
        hash: String,
        /// What the corruption looked like.
        reason: String,
    },

    /// The cold store failed.
    #[error("store error: {0}")]
    Store(Arc<StoreError>),

    /// Descriptor parsing or decryption failed.
    #[error("content error: {0}")]
    Content(Arc<ContentError>),

    /// The single-flight leader for this key went away without a result.
    #[error("coalesced fetch interrupted")]
    FlightInterrupted,
}

impl From<StoreError> for CacheError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::NotFound { hash } => Self::NotFound { hash },
            other => Self::Store(Arc::new(other)),
        }
    }
}

impl From<ContentError> for CacheError {
    fn from(e: ContentError) -> Self {
        Self::Content(Arc::new(e))
    }
}

impl CacheError {
    /// Whether this error indicates upstream content that failed hash
    /// verification (as opposed to being absent or unparseable).
    pub fn is_hash_mismatch(&self) -> bool {
        matches!(self, Self::Store(e) if matches!(**e, StoreError::HashMismatch { .. }))
    }
}
