//! # reel-content
//!
//! Stream descriptor parsing and chunk decryption.
//!
//! A stream on the blob network is described by an *SD blob*: a plaintext
//! JSON document listing the encrypted content blobs that make up the
//! stream, in order, together with the AES key and the per-blob IVs needed
//! to decrypt them.
//!
//! ```text
//! SD blob (JSON) ──parse──► StreamDescriptor
//!                                │ key, iv[i]
//! content blob i ──AES-CBC───────┴──► chunk i (PKCS#7 unpadded plaintext)
//! ```
//!
//! The last entry of every descriptor is a terminator: a blob info with
//! length zero and no hash. All preceding entries reference real content
//! blobs of at most [`MAX_BLOB_SIZE`](reel_types::MAX_BLOB_SIZE) bytes.

#![warn(missing_docs)]
#![warn(clippy::all)]

mod decrypt;
mod descriptor;
mod error;

pub use decrypt::{decrypt_chunk, IV_SIZE};
pub use descriptor::{BlobInfo, StreamDescriptor};
pub use error::ContentError;

#[cfg(any(test, feature = "test-util"))]
pub use decrypt::encrypt_chunk;
