//! Access verification for paid streams.
//!
//! Token verification is an external collaborator (a signature check against
//! the payment service's key); the core only needs the pass/fail decision
//! expressed in [`PlayerError`] kinds. The shipped verifier admits free
//! streams and refuses paid ones, which is the correct behavior for an edge
//! with no payment service configured.

use async_trait::async_trait;

use crate::error::PlayerError;
use crate::resolve::Claim;

/// Decides whether a request may read a stream.
#[async_trait]
pub trait AccessVerifier: Send + Sync {
    /// Verify `token` against `claim`.
    ///
    /// Errors map to status codes upstream: `PaidStream` → 402,
    /// `InvalidToken` → 401, `ExpiredToken` → 410.
    async fn verify(&self, claim: &Claim, token: Option<&str>) -> Result<(), PlayerError>;
}

/// Verifier for edges serving free content only.
#[derive(Debug, Default, Clone)]
pub struct FreeStreamVerifier;

#[async_trait]
impl AccessVerifier for FreeStreamVerifier {
    async fn verify(&self, claim: &Claim, token: Option<&str>) -> Result<(), PlayerError> {
        if !claim.is_paid() {
            return Ok(());
        }
        match token {
            None => Err(PlayerError::PaidStream),
            Some(_) => Err(PlayerError::InvalidToken(
                "token verification is not configured on this edge".to_string(),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reel_types::BlobHash;

    fn claim(fee: f64) -> Claim {
        Claim {
            name: "test".into(),
            normalized_name: "test".into(),
            sd_hash: BlobHash::of(b"sd"),
            media_type: "video/mp4".into(),
            source_size: None,
            file_name: None,
            timestamp: 0,
            fee_amount: fee,
        }
    }

    #[tokio::test]
    async fn free_stream_passes() {
        let verifier = FreeStreamVerifier;
        assert!(verifier.verify(&claim(0.0), None).await.is_ok());
    }

    #[tokio::test]
    async fn paid_stream_without_token_is_payment_required() {
        let verifier = FreeStreamVerifier;
        let result = verifier.verify(&claim(1.0), None).await;
        assert!(matches!(result, Err(PlayerError::PaidStream)));
    }

    #[tokio::test]
    async fn paid_stream_with_token_is_unauthorized_here() {
        let verifier = FreeStreamVerifier;
        let result = verifier.verify(&claim(1.0), Some("tok.en.x")).await;
        assert!(matches!(result, Err(PlayerError::InvalidToken(_))));
    }
}
