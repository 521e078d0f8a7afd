//! Storage engine configuration.
//!
//! Provides [`StoreConfig`] for configuring a ReStorage instance. Values are
//! loaded from environment variables; anything unset or unparsable falls back
//! to the default.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use typed_builder::TypedBuilder;

use crate::checksums::HashAlgorithm;

/// How `delete` disposes of an object file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeleteMode {
    /// Remove the file immediately.
    Unlink,
    /// Rename the file to a timestamped tombstone next to the original.
    #[default]
    Tombstone,
}

impl DeleteMode {
    /// Canonical lowercase name.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Unlink => "unlink",
            Self::Tombstone => "tombstone",
        }
    }
}

impl fmt::Display for DeleteMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when parsing a [`DeleteMode`] from a string fails.
#[derive(Debug, Clone, thiserror::Error)]
#[error("unknown delete mode: {0}")]
pub struct ParseDeleteModeError(String);

impl FromStr for DeleteMode {
    type Err = ParseDeleteModeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "unlink" => Ok(Self::Unlink),
            "tombstone" => Ok(Self::Tombstone),
            _ => Err(ParseDeleteModeError(s.to_owned())),
        }
    }
}

/// ReStorage configuration.
///
/// # Examples
///
/// ```
/// use restorage_core::config::{DeleteMode, StoreConfig};
///
/// let config = StoreConfig::default();
/// assert_eq!(config.gateway_listen, "0.0.0.0:7000");
/// assert_eq!(config.delete_mode, DeleteMode::Tombstone);
/// assert_eq!(config.max_tombstones, 3);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, TypedBuilder)]
#[serde(rename_all = "camelCase")]
pub struct StoreConfig {
    /// Root directory holding object files, descriptors, counter and log.
    #[builder(default = PathBuf::from("/var/lib/restorage"))]
    pub root_dir: PathBuf,

    /// Bind address for the HTTP gateway.
    #[builder(default = String::from("0.0.0.0:7000"))]
    pub gateway_listen: String,

    /// What `delete` does with the object file.
    #[builder(default)]
    pub delete_mode: DeleteMode,

    /// Tombstones retained per key before `delete` is refused.
    #[builder(default = 3)]
    pub max_tombstones: usize,

    /// Maximum number of cached bucket lookups.
    #[builder(default = 10_000)]
    pub bucket_cache_capacity: usize,

    /// Lifetime of a cached bucket lookup, in seconds.
    #[builder(default = 300)]
    pub bucket_cache_ttl_secs: u64,

    /// Digest used by `compute_hash`.
    #[builder(default)]
    pub hash_algorithm: HashAlgorithm,

    /// Whether writes are flushed to stable storage before returning.
    #[builder(default = false)]
    pub sync_writes: bool,

    /// Upper bound on concurrently running blocking engine calls.
    #[builder(default = 256)]
    pub worker_threads: usize,

    /// Log level filter string (e.g. `"info"`, `"debug"`).
    #[builder(default = String::from("info"))]
    pub log_level: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            root_dir: PathBuf::from("/var/lib/restorage"),
            gateway_listen: String::from("0.0.0.0:7000"),
            delete_mode: DeleteMode::default(),
            max_tombstones: 3,
            bucket_cache_capacity: 10_000,
            bucket_cache_ttl_secs: 300,
            hash_algorithm: HashAlgorithm::default(),
            sync_writes: false,
            worker_threads: 256,
            log_level: String::from("info"),
        }
    }
}

impl StoreConfig {
    /// Load configuration from environment variables.
    ///
    /// | Variable | Default |
    /// |----------|---------|
    /// | `STORAGE_ROOT` | `/var/lib/restorage` |
    /// | `GATEWAY_LISTEN` | `0.0.0.0:7000` |
    /// | `DELETE_MODE` | `tombstone` |
    /// | `MAX_TOMBSTONES` | `3` |
    /// | `BUCKET_CACHE_CAPACITY` | `10000` |
    /// | `BUCKET_CACHE_TTL_SECS` | `300` |
    /// | `HASH_ALGORITHM` | `md5` |
    /// | `SYNC_WRITES` | `false` |
    /// | `WORKER_THREADS` | `256` |
    /// | `LOG_LEVEL` | `info` |
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build a configuration from an arbitrary variable lookup.
    ///
    /// [`StoreConfig::from_env`] delegates here with `std::env::var`.
    #[must_use]
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(v) = lookup("STORAGE_ROOT") {
            config.root_dir = PathBuf::from(v);
        }
        if let Some(v) = lookup("GATEWAY_LISTEN") {
            config.gateway_listen = v;
        }
        if let Some(v) = lookup("DELETE_MODE") {
            match v.parse() {
                Ok(mode) => config.delete_mode = mode,
                Err(e) => tracing::warn!(%e, "ignoring DELETE_MODE"),
            }
        }
        if let Some(v) = lookup("MAX_TOMBSTONES") {
            if let Ok(n) = v.parse::<usize>() {
                config.max_tombstones = n;
            }
        }
        if let Some(v) = lookup("BUCKET_CACHE_CAPACITY") {
            if let Ok(n) = v.parse::<usize>() {
                config.bucket_cache_capacity = n;
            }
        }
        if let Some(v) = lookup("BUCKET_CACHE_TTL_SECS") {
            if let Ok(n) = v.parse::<u64>() {
                config.bucket_cache_ttl_secs = n;
            }
        }
        if let Some(v) = lookup("HASH_ALGORITHM") {
            match v.parse() {
                Ok(algorithm) => config.hash_algorithm = algorithm,
                Err(e) => tracing::warn!(%e, "ignoring HASH_ALGORITHM"),
            }
        }
        if let Some(v) = lookup("SYNC_WRITES") {
            config.sync_writes = parse_bool(&v);
        }
        if let Some(v) = lookup("WORKER_THREADS") {
            if let Ok(n) = v.parse::<usize>() {
                if n > 0 {
                    config.worker_threads = n;
                }
            }
        }
        if let Some(v) = lookup("LOG_LEVEL") {
            config.log_level = v;
        }

        config
    }

    /// Bucket cache entry lifetime.
    #[must_use]
    pub fn bucket_cache_ttl(&self) -> Duration {
        Duration::from_secs(self.bucket_cache_ttl_secs)
    }
}

/// Parse a string as a boolean, accepting `"1"` and `"true"` (case-insensitive).
fn parse_bool(value: &str) -> bool {
    value == "1" || value.eq_ignore_ascii_case("true")
}
