//! # reel-server
//!
//! HTTP media-delivery edge server over a content-addressed blob network.
//!
//! A request names a stream by symbolic URI. The server resolves the URI to
//! a claim, verifies access, fetches the stream descriptor, and serves the
//! plaintext bytes with full range-request semantics, decrypting content
//! blobs on the fly through the hot cache.
//!
//! ```text
//! GET /claims/{name}/{id}  ──resolve──► claim ──► Stream
//!                                                   │ prepare: SD blob, size
//!                                                   ▼
//!                                    Stream::read ──► HotCache ──► disk ──► reflector
//! ```
//!
//! The HTTP layer is the sole policy point mapping error kinds to status
//! codes; the cache layers below it only ever translate corruption into a
//! purge-and-retry.

#![warn(clippy::all)]

pub mod access;
pub mod config;
pub mod error;
pub mod http;
pub mod metrics;
pub mod mime;
pub mod player;
pub mod range;
pub mod resolve;
pub mod stream;
pub mod transcoder;

pub use config::Config;
pub use error::PlayerError;
pub use player::Player;
pub use stream::Stream;
