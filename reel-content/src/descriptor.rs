//! Stream descriptor (SD blob) parsing.

use reel_types::{BlobHash, MAX_BLOB_SIZE};
use serde::Deserialize;

use crate::decrypt::IV_SIZE;
use crate::error::ContentError;

/// One entry of a descriptor's blob list.
#[derive(Debug, Clone)]
pub struct BlobInfo {
    /// Position of this blob within the stream, starting at 0.
    pub index: u32,
    /// Ciphertext length in bytes; 0 for the terminator.
    pub length: usize,
    /// CBC initialization vector for this blob.
    pub iv: [u8; IV_SIZE],
    /// Content address of the blob; `None` for the terminator.
    pub hash: Option<BlobHash>,
}

impl BlobInfo {
    /// Whether this entry is the stream terminator.
    pub fn is_terminator(&self) -> bool {
        self.length == 0
    }
}

/// A parsed and validated stream descriptor.
///
/// Invariants enforced at parse time: the blob list ends with exactly one
/// terminator (length 0, no hash), all preceding entries carry a hash and a
/// nonzero length within the blob size limit, and indices are contiguous
/// from 0.
#[derive(Debug, Clone)]
pub struct StreamDescriptor {
    /// Original file name recorded by the author.
    pub stream_name: String,
    /// File name suggested for saving the stream.
    pub suggested_file_name: String,
    /// Stream container type tag.
    pub stream_type: String,
    /// Hash identifying the whole stream.
    pub stream_hash: BlobHash,
    /// AES key; 16 bytes on legacy streams, 32 on newer ones.
    pub key: Vec<u8>,
    /// Ordered blob list, terminator last.
    pub blobs: Vec<BlobInfo>,
}

/// Raw JSON shape of an SD blob. String fields are hex-encoded on the wire.
#[derive(Debug, Deserialize)]
struct RawDescriptor {
    stream_name: String,
    #[serde(default)]
    suggested_file_name: String,
    #[serde(default)]
    stream_type: String,
    stream_hash: String,
    key: String,
    blobs: Vec<RawBlobInfo>,
}

#[derive(Debug, Deserialize)]
struct RawBlobInfo {
    blob_num: u32,
    length: usize,
    iv: String,
    #[serde(default)]
    blob_hash: Option<String>,
}

impl StreamDescriptor {
    /// Parse and validate an SD blob.
    pub fn from_json(bytes: &[u8]) -> Result<Self, ContentError> {
        let raw: RawDescriptor = serde_json::from_slice(bytes)?;

        let key = hex::decode(&raw.key)
            .map_err(|_| ContentError::invalid("key is not valid hex"))?;
        if key.len() != 16 && key.len() != 32 {
            return Err(ContentError::InvalidKeyLength { len: key.len() });
        }

        let stream_hash = BlobHash::from_hex(&raw.stream_hash)
            .map_err(|e| ContentError::invalid(format!("stream_hash: {e}")))?;

        if raw.blobs.is_empty() {
            return Err(ContentError::invalid("descriptor has no blob list"));
        }

        let last = raw.blobs.len() - 1;
        let mut blobs = Vec::with_capacity(raw.blobs.len());
        for (pos, raw_blob) in raw.blobs.into_iter().enumerate() {
            if raw_blob.blob_num as usize != pos {
                return Err(ContentError::invalid(format!(
                    "blob indices not contiguous: expected {pos}, got {}",
                    raw_blob.blob_num
                )));
            }

            let iv_raw = hex::decode(&raw_blob.iv)
                .map_err(|_| ContentError::invalid(format!("blob {pos}: iv is not valid hex")))?;
            let iv: [u8; IV_SIZE] = iv_raw.try_into().map_err(|_| {
                ContentError::invalid(format!("blob {pos}: iv is not {IV_SIZE} bytes"))
            })?;

            let is_last = pos == last;
            let hash = match (&raw_blob.blob_hash, raw_blob.length) {
                (None, 0) if is_last => None,
                (None, 0) => {
                    return Err(ContentError::invalid(format!(
                        "blob {pos}: terminator before end of list"
                    )))
                }
                (None, _) => {
                    return Err(ContentError::invalid(format!("blob {pos}: missing hash")))
                }
                (Some(_), 0) => {
                    return Err(ContentError::invalid(format!(
                        "blob {pos}: zero-length content blob"
                    )))
                }
                (Some(h), len) => {
                    if !is_last && len > MAX_BLOB_SIZE {
                        return Err(ContentError::invalid(format!(
                            "blob {pos}: length {len} exceeds blob size limit"
                        )));
                    }
                    if is_last {
                        return Err(ContentError::invalid("blob list has no terminator"));
                    }
                    Some(BlobHash::from_hex(h).map_err(|e| {
                        ContentError::invalid(format!("blob {pos}: bad hash: {e}"))
                    })?)
                }
            };

            blobs.push(BlobInfo {
                index: raw_blob.blob_num,
                length: raw_blob.length,
                iv,
                hash,
            });
        }

        Ok(Self {
            stream_name: decode_hex_name(&raw.stream_name),
            suggested_file_name: decode_hex_name(&raw.suggested_file_name),
            stream_type: raw.stream_type,
            stream_hash,
            key,
            blobs,
        })
    }

    /// Number of content blobs, excluding the terminator.
    pub fn content_blob_count(&self) -> usize {
        self.blobs.len() - 1
    }

    /// The content blobs, excluding the terminator.
    pub fn content_blobs(&self) -> &[BlobInfo] {
        &self.blobs[..self.content_blob_count()]
    }
}

/// Name fields are hex-encoded UTF-8 on the wire; tolerate plain strings
/// from older authors.
fn decode_hex_name(raw: &str) -> String {
    match hex::decode(raw) {
        Ok(bytes) => String::from_utf8_lossy(&bytes).into_owned(),
        Err(_) => raw.to_string(),
    }
}
