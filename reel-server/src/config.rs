//! Configuration loading for reel-server.
//!
//! Configuration is loaded from a TOML file (default: `player.toml`). Byte
//! sizes accept plain integers or human-readable strings like `"10GB"`.

use serde::{Deserialize, Deserializer};
use std::path::PathBuf;

/// Root configuration for reel-server.
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    /// HTTP server configuration.
    pub server: ServerConfig,
    /// Upstream reflector configuration.
    pub reflector: ReflectorConfig,
    /// On-disk blob cache configuration.
    pub disk_cache: DiskCacheConfig,
    /// In-memory hot cache configuration.
    pub hot_cache: HotCacheConfig,
    /// Prefetch-ahead configuration.
    pub prefetch: PrefetchConfig,
    /// URI resolver configuration.
    pub resolver: ResolverConfig,
    /// Transcoder service configuration.
    pub transcoder: TranscoderConfig,
}

/// HTTP server configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Bind address for the HTTP listener.
    pub bind_address: String,
    /// Name reported in the `X-Powered-By` header. Overridden by the
    /// `PLAYER_NAME` environment variable; falls back to the hostname.
    pub player_name: Option<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".to_string(),
            player_name: None,
        }
    }
}

/// Upstream reflector configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ReflectorConfig {
    /// Reflector `host:port`.
    pub address: String,
    /// Deadline for a single blob fetch, in seconds.
    pub timeout_secs: u64,
}

impl Default for ReflectorConfig {
    fn default() -> Self {
        Self {
            address: "127.0.0.1:5567".to_string(),
            timeout_secs: 30,
        }
    }
}

/// On-disk blob cache configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DiskCacheConfig {
    /// Directory holding raw encrypted blobs, named by hash.
    pub dir: PathBuf,
    /// Total size cap, bytes or human-readable ("10GB").
    #[serde(deserialize_with = "de_byte_size")]
    pub max_size: u64,
    /// Eviction sweep interval in seconds.
    pub sweep_interval_secs: u64,
}

impl Default for DiskCacheConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("./blob_cache"),
            max_size: 10 * 1024 * 1024 * 1024,
            sweep_interval_secs: 60,
        }
    }
}

/// In-memory hot cache configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct HotCacheConfig {
    /// Aggregate decrypted-chunk budget, bytes or human-readable.
    #[serde(deserialize_with = "de_byte_size")]
    pub chunk_bytes: u64,
    /// Number of parsed stream descriptors to keep.
    pub sd_entries: usize,
}

impl Default for HotCacheConfig {
    fn default() -> Self {
        Self {
            chunk_bytes: 256 * 1024 * 1024,
            sd_entries: 1_000,
        }
    }
}

/// Prefetch-ahead configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PrefetchConfig {
    /// Whether chunk reads schedule background prefetch.
    pub enabled: bool,
    /// How many chunks ahead of the current read to fetch.
    pub window: usize,
}

impl Default for PrefetchConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            window: 5,
        }
    }
}

/// URI resolver configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ResolverConfig {
    /// Base URL of the resolution daemon's JSON-RPC endpoint.
    pub url: String,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            url: "http://127.0.0.1:5279".to_string(),
        }
    }
}

/// Transcoder service configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TranscoderConfig {
    /// Base URL of the transcoder service; unset disables the redirect
    /// surface.
    pub url: Option<String>,
    /// Directory for transcoded video output served by the HLS surface.
    pub cache_dir: PathBuf,
    /// Size cap for the transcoded-video cache, bytes or human-readable.
    #[serde(deserialize_with = "de_byte_size")]
    pub cache_size: u64,
}

impl Default for TranscoderConfig {
    fn default() -> Self {
        Self {
            url: None,
            cache_dir: PathBuf::from("./transcoded_cache"),
            cache_size: 50 * 1024 * 1024 * 1024,
        }
    }
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn from_file(path: &std::path::Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            source: e,
        })?;

        toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            source: e,
        })
    }
}

/// Configuration error types.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read the configuration file.
    #[error("failed to read config file {path}: {source}")]
    ReadError {
        /// Path to the configuration file.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },
    /// Failed to parse the configuration file.
    #[error("failed to parse config file {path}: {source}")]
    ParseError {
        /// Path to the configuration file.
        path: PathBuf,
        /// Underlying TOML parse error.
        source: toml::de::Error,
    },
}

/// Parse a byte size: a bare integer, or an integer with a B/KB/MB/GB/TB
/// suffix (binary multiples, case-insensitive).
pub fn parse_byte_size(s: &str) -> Result<u64, String> {
    let s = s.trim();
    let split = s
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(s.len());
    let (digits, suffix) = s.split_at(split);
    let value: u64 = digits
        .parse()
        .map_err(|_| format!("invalid byte size {s:?}"))?;

    let multiplier: u64 = match suffix.trim().to_ascii_uppercase().as_str() {
        "" | "B" => 1,
        "K" | "KB" => 1 << 10,
        "M" | "MB" => 1 << 20,
        "G" | "GB" => 1 << 30,
        "T" | "TB" => 1 << 40,
        other => return Err(format!("unknown byte size suffix {other:?}")),
    };

    value
        .checked_mul(multiplier)
        .ok_or_else(|| format!("byte size {s:?} overflows"))
}

fn de_byte_size<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u64, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Int(u64),
        Str(String),
    }

    match Raw::deserialize(deserializer)? {
        Raw::Int(n) => Ok(n),
        Raw::Str(s) => parse_byte_size(&s).map_err(serde::de::Error::custom),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        let config = Config::default();
        assert_eq!(config.server.bind_address, "0.0.0.0:8080");
        assert_eq!(config.reflector.timeout_secs, 30);
        assert_eq!(config.prefetch.window, 5);
        assert!(config.prefetch.enabled);
        assert_eq!(config.hot_cache.sd_entries, 1_000);
    }

    #[test]
    fn config_from_toml_string() {
        let toml = r#"
[server]
bind_address = "127.0.0.1:9000"
player_name = "edge-07"

[reflector]
address = "reflector.example.com:5567"
timeout_secs = 10

[disk_cache]
dir = "/var/cache/blobs"
max_size = "2GB"
sweep_interval_secs = 30

[hot_cache]
chunk_bytes = "64MB"
sd_entries = 500

[prefetch]
enabled = false
window = 3

[resolver]
url = "http://resolver.example.com:5279"

[transcoder]
url = "http://transcoder.example.com"
"#;

        let config: Config = toml::from_str(toml).unwrap();
        assert_eq!(config.server.bind_address, "127.0.0.1:9000");
        assert_eq!(config.server.player_name.as_deref(), Some("edge-07"));
        assert_eq!(config.disk_cache.max_size, 2 << 30);
        assert_eq!(config.disk_cache.dir, PathBuf::from("/var/cache/blobs"));
        assert_eq!(config.hot_cache.chunk_bytes, 64 << 20);
        assert!(!config.prefetch.enabled);
        assert_eq!(config.prefetch.window, 3);
        assert_eq!(
            config.transcoder.url.as_deref(),
            Some("http://transcoder.example.com")
        );
    }

    #[test]
    fn missing_sections_use_defaults() {
        let config: Config = toml::from_str("[server]\n").unwrap();
        assert_eq!(config.reflector.address, "127.0.0.1:5567");
        assert_eq!(config.disk_cache.max_size, 10 << 30);
    }

    #[test]
    fn byte_sizes_accept_integers_and_strings() {
        assert_eq!(parse_byte_size("1024"), Ok(1024));
        assert_eq!(parse_byte_size("4KB"), Ok(4096));
        assert_eq!(parse_byte_size("10 GB"), Ok(10 << 30));
        assert_eq!(parse_byte_size("1tb"), Ok(1 << 40));
        assert!(parse_byte_size("plenty").is_err());
        assert!(parse_byte_size("10XB").is_err());

        let config: Config = toml::from_str("[disk_cache]\nmax_size = 123456\n").unwrap();
        assert_eq!(config.disk_cache.max_size, 123456);
    }
}
