//! Error types for reel-server and their HTTP status mapping.

use axum::http::StatusCode;
use reel_cache::CacheError;

/// Errors surfaced while serving a stream.
///
/// The HTTP layer maps these to status codes via [`PlayerError::status_code`];
/// nothing below it makes status decisions.
#[derive(Debug, thiserror::Error)]
pub enum PlayerError {
    /// URI resolution yielded no claim.
    #[error("stream not found: {uri}")]
    StreamNotFound {
        /// The URI that failed to resolve.
        uri: String,
    },

    /// The claim requires payment and the request is not authorized.
    #[error("stream requires payment")]
    PaidStream,

    /// The access token is malformed or failed verification.
    #[error("invalid access token: {0}")]
    InvalidToken(String),

    /// The access token has expired.
    #[error("access token expired")]
    ExpiredToken,

    /// Blob pipeline failure (missing blob, corruption, upstream trouble).
    #[error(transparent)]
    Cache(#[from] CacheError),

    /// A collaborator service could not be reached.
    #[error("upstream unavailable: {0}")]
    UpstreamUnavailable(String),

    /// Seek or read attempted on a stream whose size is unknown.
    #[error("stream size is zero")]
    StreamSizeZero,

    /// Seek offset or chunk index outside the stream.
    #[error("out of bounds")]
    OutOfBounds,

    /// Seek resolved to a negative offset.
    #[error("seeking before start of the stream")]
    SeekingBeforeStart,

    /// The Range header could not be parsed.
    #[error("malformed range header: {0}")]
    MalformedRange(String),

    /// The Range header parsed but no byte of it overlaps the stream.
    #[error("range not satisfiable")]
    UnsatisfiableRange,

    /// Anything else.
    #[error("internal error: {0}")]
    Internal(String),
}

impl PlayerError {
    /// The HTTP status this error maps to.
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::StreamNotFound { .. } => StatusCode::NOT_FOUND,
            Self::PaidStream => StatusCode::PAYMENT_REQUIRED,
            Self::InvalidToken(_) => StatusCode::UNAUTHORIZED,
            Self::ExpiredToken => StatusCode::GONE,
            Self::Cache(_) | Self::UpstreamUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            Self::MalformedRange(_) => StatusCode::BAD_REQUEST,
            Self::UnsatisfiableRange => StatusCode::RANGE_NOT_SATISFIABLE,
            Self::StreamSizeZero
            | Self::OutOfBounds
            | Self::SeekingBeforeStart
            | Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}
