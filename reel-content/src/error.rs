//! Error types for reel-content.

use thiserror::Error;

/// Errors that can occur while parsing descriptors or decrypting chunks.
#[derive(Error, Debug)]
pub enum ContentError {
    /// The SD blob is not valid JSON.
    #[error("descriptor is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),

    /// The SD blob parsed but violates the descriptor invariants.
    #[error("invalid descriptor: {reason}")]
    InvalidDescriptor {
        /// Which invariant was violated.
        reason: String,
    },

    /// The descriptor's key is neither 16 nor 32 bytes.
    #[error("unsupported AES key length: {len} bytes")]
    InvalidKeyLength {
        /// Length of the rejected key.
        len: usize,
    },

    /// Decryption failed (bad padding or malformed ciphertext).
    /// No details provided; the ciphertext is attacker-adjacent input.
    #[error("chunk decryption failed")]
    DecryptionFailed,
}

impl ContentError {
    pub(crate) fn invalid(reason: impl Into<String>) -> Self {
        Self::InvalidDescriptor {
            reason: reason.into(),
        }
    }
}
