//! # reel-store
//!
//! Blob storage tiers for reelcast.
//!
//! Every blob is immutable and addressed by its content hash, so storage is
//! write-once per key and never needs invalidation. This crate provides the
//! [`BlobStore`] trait plus three implementations:
//!
//! - [`MemStore`] — thread-safe in-memory map, used in tests and as a fake
//!   origin.
//! - [`DiskStore`] — a size-bounded directory of hash-named files with
//!   in-memory LRU metadata and a background eviction sweep.
//! - [`TieredStore`] — read-through composition of a [`DiskStore`] over an
//!   [`OriginClient`]: disk misses pull from the reflector and write back.
//!
//! [`OriginClient`] speaks the reflector's framed TCP protocol and verifies
//! that fetched bytes hash to the requested address before returning them.

#![warn(missing_docs)]
#![warn(clippy::all)]

mod disk;
mod error;
mod origin;
mod store;
mod tiered;

pub use disk::{spawn_sweep_task, DiskStore};
pub use error::{StoreError, StoreResult};
pub use origin::OriginClient;
pub use store::{BlobStore, MemStore};
pub use tiered::TieredStore;
