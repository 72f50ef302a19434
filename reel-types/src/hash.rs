//! Blob content addresses.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sha2::{Digest, Sha384};
use std::fmt;
use std::str::FromStr;

/// Number of raw bytes in a blob hash (SHA-384).
pub const HASH_SIZE: usize = 48;

/// Number of hex characters in a blob hash.
pub const HASH_HEX_SIZE: usize = HASH_SIZE * 2;

/// The content address of a blob: the SHA-384 hash of its bytes.
///
/// Displayed as 96 characters of lowercase hex, which is also how hashes
/// appear in stream descriptors and on the reflector wire.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct BlobHash([u8; HASH_SIZE]);

impl BlobHash {
    /// Compute the content address of a byte string.
    pub fn of(data: &[u8]) -> Self {
        let digest = Sha384::digest(data);
        let mut bytes = [0u8; HASH_SIZE];
        bytes.copy_from_slice(&digest);
        Self(bytes)
    }

    /// Create a BlobHash from raw bytes.
    pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
        if bytes.len() == HASH_SIZE {
            let mut arr = [0u8; HASH_SIZE];
            arr.copy_from_slice(bytes);
            Some(Self(arr))
        } else {
            None
        }
    }

    /// Parse a BlobHash from its 96-character hex form.
    pub fn from_hex(s: &str) -> Result<Self, HashParseError> {
        if s.len() != HASH_HEX_SIZE {
            return Err(HashParseError::BadLength { len: s.len() });
        }
        let raw = hex::decode(s).map_err(|_| HashParseError::BadHex)?;
        Ok(Self::from_bytes(&raw).expect("decoded hex has the checked length"))
    }

    /// Get the raw bytes of this hash.
    pub fn as_bytes(&self) -> &[u8; HASH_SIZE] {
        &self.0
    }

    /// Hex-encode this hash.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl fmt::Display for BlobHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl fmt::Debug for BlobHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "BlobHash({}…)", &self.to_hex()[..8])
    }
}

impl FromStr for BlobHash {
    type Err = HashParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_hex(s)
    }
}

impl Serialize for BlobHash {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for BlobHash {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::from_hex(&s).map_err(serde::de::Error::custom)
    }
}

/// Failure to parse a hex-encoded blob hash.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum HashParseError {
    /// The string is not 96 characters long.
    #[error("blob hash must be {HASH_HEX_SIZE} hex characters, got {len}")]
    BadLength {
        /// Length of the rejected string.
        len: usize,
    },

    /// The string contains non-hex characters.
    #[error("blob hash contains non-hex characters")]
    BadHex,
}
