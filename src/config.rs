//! Configuration Module
//!
//! Holds the validated configuration record for the cache engine and the
//! server binary. A `Config` is checked as a whole by [`Config::validate`]
//! before any live state is touched.

use std::env;
use std::path::PathBuf;

use crate::codec::Strategy;
use crate::error::{CacheError, Result};
use crate::persistence::SnapshotFormat;

/// Default number of shards when `MUDIS_BUCKETS` is not set.
pub const DEFAULT_SHARD_COUNT: usize = 32;

/// Default soft memory cap: 1 GiB.
pub const DEFAULT_MAX_BYTES: u64 = 1_073_741_824;

/// Cache engine and server configuration.
///
/// All limits are in bytes, all durations in whole seconds.
#[derive(Debug, Clone)]
pub struct Config {
    /// Encode/decode strategy; fixed for the lifetime of a cache
    pub serializer: Strategy,
    /// Deflate payloads on write
    pub compress: bool,
    /// Soft cap used to derive the per-shard eviction threshold
    pub max_bytes: u64,
    /// Reject encoded payloads larger than this
    pub max_value_bytes: Option<u64>,
    /// Silently reject writes that would push the total past `max_bytes`
    pub hard_memory_limit: bool,
    /// Fraction of `max_bytes` above which LRU eviction kicks in
    pub eviction_threshold: f64,
    /// Number of shards; changing it requires a full reset
    pub shard_count: usize,
    /// Cap applied to any requested TTL
    pub max_ttl: Option<u64>,
    /// TTL used when a write supplies none
    pub default_ttl: Option<u64>,
    /// Background sweep period; `None` disables the sweeper thread
    pub sweep_interval: Option<u64>,
    /// Snapshot persistence settings
    pub persistence: PersistenceConfig,
    /// Transport settings for the server binary
    pub server: ServerConfig,
}

/// Snapshot persistence settings.
#[derive(Debug, Clone)]
pub struct PersistenceConfig {
    /// Enable snapshot save/load
    pub enabled: bool,
    /// Snapshot file path
    pub path: PathBuf,
    /// Container serialization: json or binary
    pub format: SnapshotFormat,
    /// Write to a temp file and rename over the target
    pub safe_write: bool,
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            path: PathBuf::from("mudis_data"),
            format: SnapshotFormat::Json,
            safe_write: true,
        }
    }
}

/// Server transport settings.
///
/// The server prefers a unix-domain socket where the platform supports one
/// and falls back to TCP otherwise, or when `force_tcp` is set.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Unix-domain socket path
    pub socket_path: PathBuf,
    /// TCP listen address
    pub tcp_addr: String,
    /// Always listen on TCP, even where unix sockets are available
    pub force_tcp: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            socket_path: PathBuf::from("/tmp/mudis.sock"),
            tcp_addr: "127.0.0.1:9876".to_string(),
            force_tcp: false,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            serializer: Strategy::Json,
            compress: false,
            max_bytes: DEFAULT_MAX_BYTES,
            max_value_bytes: None,
            hard_memory_limit: false,
            eviction_threshold: 0.9,
            shard_count: DEFAULT_SHARD_COUNT,
            max_ttl: None,
            default_ttl: None,
            sweep_interval: Some(60),
            persistence: PersistenceConfig::default(),
            server: ServerConfig::default(),
        }
    }
}

impl Config {
    /// Creates a Config from environment variables, starting from defaults.
    ///
    /// # Environment Variables
    /// - `MUDIS_BUCKETS` - shard count (positive integer)
    /// - `MUDIS_SOCKET_PATH` - unix socket path for the server
    /// - `MUDIS_TCP_ADDR` - TCP listen address for the server
    /// - `MUDIS_FORCE_TCP` - "true" forces the TCP transport
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Some(buckets) = env::var("MUDIS_BUCKETS")
            .ok()
            .and_then(|v| v.parse::<usize>().ok())
            .filter(|n| *n > 0)
        {
            config.shard_count = buckets;
        }
        if let Ok(path) = env::var("MUDIS_SOCKET_PATH") {
            config.server.socket_path = PathBuf::from(path);
        }
        if let Ok(addr) = env::var("MUDIS_TCP_ADDR") {
            config.server.tcp_addr = addr;
        }
        config.server.force_tcp = env::var("MUDIS_FORCE_TCP")
            .map(|v| v.eq_ignore_ascii_case("true"))
            .unwrap_or(false);

        config
    }

    /// Validates the whole record.
    ///
    /// Called before a cache is built or reconfigured, so a bad field never
    /// leaves live state half-updated.
    pub fn validate(&self) -> Result<()> {
        if self.max_bytes == 0 {
            return Err(CacheError::InvalidConfig(
                "max_bytes must be greater than 0".to_string(),
            ));
        }
        if let Some(max_value) = self.max_value_bytes {
            if max_value == 0 {
                return Err(CacheError::InvalidConfig(
                    "max_value_bytes must be greater than 0".to_string(),
                ));
            }
            if max_value > self.max_bytes {
                return Err(CacheError::InvalidConfig(format!(
                    "max_value_bytes ({}) must not exceed max_bytes ({})",
                    max_value, self.max_bytes
                )));
            }
        }
        if !(self.eviction_threshold > 0.0 && self.eviction_threshold <= 1.0) {
            return Err(CacheError::InvalidConfig(format!(
                "eviction_threshold must be in (0, 1], got {}",
                self.eviction_threshold
            )));
        }
        if self.shard_count == 0 {
            return Err(CacheError::InvalidConfig(
                "shard_count must be greater than 0".to_string(),
            ));
        }
        if self.max_ttl == Some(0) {
            return Err(CacheError::InvalidConfig(
                "max_ttl must be greater than 0 when set".to_string(),
            ));
        }
        if self.default_ttl == Some(0) {
            return Err(CacheError::InvalidConfig(
                "default_ttl must be greater than 0 when set".to_string(),
            ));
        }
        if self.sweep_interval == Some(0) {
            return Err(CacheError::InvalidConfig(
                "sweep_interval must be greater than 0 when set".to_string(),
            ));
        }
        Ok(())
    }

    /// Soft threshold in bytes above which eviction starts, globally.
    pub fn threshold_bytes(&self) -> u64 {
        (self.max_bytes as f64 * self.eviction_threshold).floor() as u64
    }

    /// Eviction threshold apportioned to a single shard.
    pub fn per_shard_threshold(&self) -> u64 {
        self.threshold_bytes() / self.shard_count as u64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_default() {
        let config = Config::default();
        assert_eq!(config.serializer, Strategy::Json);
        assert!(!config.compress);
        assert_eq!(config.max_bytes, DEFAULT_MAX_BYTES);
        assert!(config.max_value_bytes.is_none());
        assert!(!config.hard_memory_limit);
        assert_eq!(config.eviction_threshold, 0.9);
        assert_eq!(config.shard_count, 32);
        assert_eq!(config.sweep_interval, Some(60));
        assert!(!config.persistence.enabled);
        assert_eq!(config.persistence.path, PathBuf::from("mudis_data"));
        assert!(config.persistence.safe_write);
        config.validate().unwrap();
    }

    // Single test for the env override so parallel tests never race on
    // the variable
    #[test]
    fn test_config_from_env_buckets() {
        env::set_var("MUDIS_BUCKETS", "8");
        assert_eq!(Config::from_env().shard_count, 8);

        env::set_var("MUDIS_BUCKETS", "not-a-number");
        assert_eq!(Config::from_env().shard_count, DEFAULT_SHARD_COUNT);

        env::set_var("MUDIS_BUCKETS", "0");
        assert_eq!(Config::from_env().shard_count, DEFAULT_SHARD_COUNT);

        env::remove_var("MUDIS_BUCKETS");
        assert_eq!(Config::from_env().shard_count, DEFAULT_SHARD_COUNT);
    }

    #[test]
    fn test_validate_rejects_zero_max_bytes() {
        let config = Config {
            max_bytes: 0,
            ..Config::default()
        };
        assert!(matches!(
            config.validate(),
            Err(CacheError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_validate_rejects_value_limit_above_max_bytes() {
        let config = Config {
            max_bytes: 100,
            max_value_bytes: Some(200),
            ..Config::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_bad_threshold() {
        for threshold in [0.0, -0.5, 1.5] {
            let config = Config {
                eviction_threshold: threshold,
                ..Config::default()
            };
            assert!(config.validate().is_err(), "threshold {}", threshold);
        }
    }

    #[test]
    fn test_validate_accepts_threshold_of_one() {
        let config = Config {
            eviction_threshold: 1.0,
            ..Config::default()
        };
        config.validate().unwrap();
    }

    #[test]
    fn test_validate_rejects_zero_shards() {
        let config = Config {
            shard_count: 0,
            ..Config::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_zero_ttls() {
        let config = Config {
            max_ttl: Some(0),
            ..Config::default()
        };
        assert!(config.validate().is_err());

        let config = Config {
            default_ttl: Some(0),
            ..Config::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_per_shard_threshold() {
        let config = Config {
            max_bytes: 120,
            eviction_threshold: 0.5,
            shard_count: 1,
            ..Config::default()
        };
        assert_eq!(config.threshold_bytes(), 60);
        assert_eq!(config.per_shard_threshold(), 60);

        let config = Config {
            max_bytes: 1000,
            eviction_threshold: 0.9,
            shard_count: 4,
            ..Config::default()
        };
        assert_eq!(config.per_shard_threshold(), 225);
    }
}
