//! URI resolution against the name-service daemon.
//!
//! Resolution is an external collaborator; the core only needs the claim
//! fields listed on [`Claim`]. The production implementation speaks the
//! daemon's JSON-RPC `resolve` call; tests substitute a map-backed stub.

use async_trait::async_trait;
use reel_types::BlobHash;
use serde_json::json;

use crate::error::PlayerError;

/// The claim metadata a stream needs.
#[derive(Debug, Clone)]
pub struct Claim {
    /// Claim name as published.
    pub name: String,
    /// Normalized (lowercased, canonical) claim name.
    pub normalized_name: String,
    /// Content address of the stream's SD blob.
    pub sd_hash: BlobHash,
    /// Declared media type.
    pub media_type: String,
    /// Authoritative stream size, when the claim carries one.
    pub source_size: Option<u64>,
    /// Original file name, when the claim carries one.
    pub file_name: Option<String>,
    /// Claim creation time, unix seconds.
    pub timestamp: i64,
    /// Price in the network's currency; zero or absent means free.
    pub fee_amount: f64,
}

impl Claim {
    /// Whether this stream requires payment.
    pub fn is_paid(&self) -> bool {
        self.fee_amount > 0.0
    }
}

/// Resolves a symbolic URI to a claim.
#[async_trait]
pub trait StreamResolver: Send + Sync {
    /// Resolve `uri` (`name` or `name#claim_id`).
    async fn resolve(&self, uri: &str) -> Result<Claim, PlayerError>;
}

/// JSON-RPC client for the resolution daemon.
pub struct RpcResolver {
    client: reqwest::Client,
    url: String,
}

impl RpcResolver {
    /// Create a resolver against the daemon's base URL.
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            url: url.into(),
        }
    }
}

#[async_trait]
impl StreamResolver for RpcResolver {
    async fn resolve(&self, uri: &str) -> Result<Claim, PlayerError> {
        let request = json!({
            "method": "resolve",
            "params": { "urls": [uri] },
        });

        let response: serde_json::Value = self
            .client
            .post(&self.url)
            .json(&request)
            .send()
            .await
            .map_err(|e| PlayerError::UpstreamUnavailable(format!("resolver: {e}")))?
            .json()
            .await
            .map_err(|e| PlayerError::UpstreamUnavailable(format!("resolver: {e}")))?;

        let entry = &response["result"][uri];
        if entry.is_null() || entry.get("error").is_some() {
            return Err(PlayerError::StreamNotFound {
                uri: uri.to_string(),
            });
        }

        parse_claim(uri, entry).ok_or_else(|| PlayerError::StreamNotFound {
            uri: uri.to_string(),
        })
    }
}

/// Pull the fields a stream needs out of one resolved claim entry.
fn parse_claim(uri: &str, entry: &serde_json::Value) -> Option<Claim> {
    let stream = &entry["value"];
    let source = &stream["source"];

    let sd_hash = BlobHash::from_hex(source["sd_hash"].as_str()?).ok()?;
    let name = entry["name"]
        .as_str()
        .unwrap_or_else(|| uri.split('#').next().unwrap_or(uri))
        .to_string();

    Some(Claim {
        normalized_name: entry["normalized_name"]
            .as_str()
            .map(str::to_string)
            .unwrap_or_else(|| name.to_lowercase()),
        name,
        sd_hash,
        media_type: source["media_type"].as_str().unwrap_or_default().to_string(),
        source_size: source["size"]
            .as_str()
            .and_then(|s| s.parse().ok())
            .or_else(|| source["size"].as_u64()),
        file_name: source["name"].as_str().map(str::to_string),
        timestamp: entry["timestamp"].as_i64().unwrap_or(0),
        fee_amount: stream["fee"]["amount"]
            .as_str()
            .and_then(|s| s.parse().ok())
            .or_else(|| stream["fee"]["amount"].as_f64())
            .unwrap_or(0.0),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_claim_extracts_fields() {
        let sd_hash = BlobHash::of(b"sd").to_hex();
        let entry = json!({
            "name": "Some-Movie",
            "normalized_name": "some-movie",
            "timestamp": 1_600_000_000,
            "value": {
                "source": {
                    "sd_hash": sd_hash,
                    "media_type": "video/mp4",
                    "size": "12345",
                    "name": "some movie.mp4",
                },
                "fee": { "amount": "0.5" },
            },
        });

        let claim = parse_claim("some-movie#ab12", &entry).unwrap();
        assert_eq!(claim.name, "Some-Movie");
        assert_eq!(claim.sd_hash.to_hex(), sd_hash);
        assert_eq!(claim.media_type, "video/mp4");
        assert_eq!(claim.source_size, Some(12345));
        assert_eq!(claim.file_name.as_deref(), Some("some movie.mp4"));
        assert_eq!(claim.timestamp, 1_600_000_000);
        assert!(claim.is_paid());
    }

    #[test]
    fn parse_claim_without_sd_hash_is_none() {
        let entry = json!({"value": {"source": {}}});
        assert!(parse_claim("x", &entry).is_none());
    }

    #[test]
    fn missing_fee_means_free() {
        let entry = json!({
            "value": { "source": { "sd_hash": BlobHash::of(b"sd").to_hex() } },
        });
        let claim = parse_claim("x", &entry).unwrap();
        assert!(!claim.is_paid());
        assert_eq!(claim.source_size, None);
    }
}
