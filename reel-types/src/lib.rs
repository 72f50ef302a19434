//! # reel-types
//!
//! Content-address types shared across the reelcast workspace.
//!
//! Everything on the blob network is addressed by the SHA-384 hash of its
//! bytes, written as 96 characters of lowercase hex. This crate provides the
//! [`BlobHash`] newtype plus the size constants that the wire format fixes.

#![warn(missing_docs)]
#![warn(clippy::all)]

mod hash;

pub use hash::{BlobHash, HashParseError};

/// Maximum size of a single blob on the network (2 MiB).
pub const MAX_BLOB_SIZE: usize = 2 * 1024 * 1024;

/// Maximum plaintext size of a decrypted chunk.
///
/// A full blob always ends in at least one 16-byte CBC padding block, so the
/// plaintext of a maximum-size blob is 16 bytes shorter than the blob itself.
pub const MAX_CHUNK_SIZE: usize = MAX_BLOB_SIZE - 16;
