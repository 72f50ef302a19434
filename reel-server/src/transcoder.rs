//! Transcoded-variant registry client.
//!
//! Before the blob pipeline runs, the handler asks whether an HLS variant of
//! the stream already exists; if it does, the request is redirected to the
//! variant's master playlist and the blob pipeline is skipped entirely. If
//! it doesn't, a transcode is kicked off in the background and the request
//! proceeds over blobs.

use async_trait::async_trait;
use reel_types::BlobHash;

/// A finished HLS rendition of a stream.
#[derive(Debug, Clone)]
pub struct TranscodedVariant {
    /// Path of the rendition below the transcoded-video surface.
    pub local_path: String,
}

impl TranscodedVariant {
    /// URL of the variant's master playlist.
    pub fn playlist_url(&self) -> String {
        format!("/api/v4/streams/t/{}/master.m3u8", self.local_path)
    }
}

/// Registry of transcoded variants.
#[async_trait]
pub trait TranscoderClient: Send + Sync {
    /// Look up a finished variant for the stream, if any.
    async fn variant(&self, uri: &str, sd_hash: &BlobHash) -> Option<TranscodedVariant>;

    /// Ask the transcoder to start producing a variant. Fire-and-forget;
    /// failures are logged, never surfaced.
    async fn request_transcode(&self, uri: &str, sd_hash: &BlobHash);
}

/// Registry that never has variants; used when no transcoder is configured.
#[derive(Debug, Default, Clone)]
pub struct NoopTranscoder;

#[async_trait]
impl TranscoderClient for NoopTranscoder {
    async fn variant(&self, _uri: &str, _sd_hash: &BlobHash) -> Option<TranscodedVariant> {
        None
    }

    async fn request_transcode(&self, _uri: &str, _sd_hash: &BlobHash) {}
}

/// HTTP client for the transcoder service.
pub struct HttpTranscoder {
    client: reqwest::Client,
    base_url: String,
}

impl HttpTranscoder {
    /// Create a client against the transcoder's base URL.
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into(),
        }
    }
}

#[async_trait]
impl TranscoderClient for HttpTranscoder {
    async fn variant(&self, uri: &str, sd_hash: &BlobHash) -> Option<TranscodedVariant> {
        let url = format!("{}/api/v1/video/hls/{}", self.base_url, sd_hash);
        let response = match self.client.get(&url).send().await {
            Ok(r) => r,
            Err(e) => {
                tracing::warn!("transcoder lookup for {uri} failed: {e}");
                return None;
            }
        };
        if !response.status().is_success() {
            return None;
        }

        let body: serde_json::Value = response.json().await.ok()?;
        let path = body["path"].as_str()?;
        Some(TranscodedVariant {
            local_path: path.to_string(),
        })
    }

    async fn request_transcode(&self, uri: &str, sd_hash: &BlobHash) {
        let url = format!("{}/api/v1/video/{}", self.base_url, sd_hash);
        if let Err(e) = self.client.post(&url).send().await {
            tracing::warn!("transcode request for {uri} failed: {e}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn playlist_url_points_at_master() {
        let variant = TranscodedVariant {
            local_path: "ab12cd".to_string(),
        };
        assert_eq!(
            variant.playlist_url(),
            "/api/v4/streams/t/ab12cd/master.m3u8"
        );
    }

    #[tokio::test]
    async fn noop_transcoder_has_no_variants() {
        let t = NoopTranscoder;
        assert!(t.variant("uri", &BlobHash::of(b"sd")).await.is_none());
    }
}
