//! Configuration types

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::{ConfigError, EntcacheResult};

/// Default lifetime of a cache entry absent explicit invalidation.
pub const DEFAULT_TTL: Duration = Duration::from_secs(30 * 60);

/// Behaviour of the read-through cache and invalidation engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheConfig {
    /// TTL used when a read does not pass one.
    pub default_ttl: Duration,
    /// Flush relation caches when an entity is created.
    ///
    /// A new entity has no relation entries of its own, but related
    /// instances may hold collections that should now include it.
    pub flush_relations_on_create: bool,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            default_ttl: DEFAULT_TTL,
            flush_relations_on_create: true,
        }
    }
}

impl CacheConfig {
    /// Create a new cache config with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the default TTL.
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.default_ttl = ttl;
        self
    }

    /// Enable or disable relation flushing on create.
    pub fn with_flush_on_create(mut self, enabled: bool) -> Self {
        self.flush_relations_on_create = enabled;
        self
    }

    /// Resolve an optional per-call TTL against the default.
    pub fn ttl_or_default(&self, ttl: Option<Duration>) -> Duration {
        ttl.unwrap_or(self.default_ttl)
    }

    pub fn validate(&self) -> EntcacheResult<()> {
        if self.default_ttl.is_zero() {
            return Err(ConfigError::InvalidValue {
                field: "default_ttl".to_string(),
                value: format!("{:?}", self.default_ttl),
                reason: "must be greater than zero".to_string(),
            }
            .into());
        }
        Ok(())
    }
}

/// Settings for the LMDB file-backed cache backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LmdbConfig {
    /// Directory holding the LMDB files.
    pub path: PathBuf,
    /// Maximum map size in megabytes.
    pub max_size_mb: usize,
}

impl LmdbConfig {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            max_size_mb: 64,
        }
    }

    pub fn with_max_size_mb(mut self, max_size_mb: usize) -> Self {
        self.max_size_mb = max_size_mb;
        self
    }

    pub fn validate(&self) -> EntcacheResult<()> {
        if self.max_size_mb == 0 {
            return Err(ConfigError::InvalidValue {
                field: "max_size_mb".to_string(),
                value: "0".to_string(),
                reason: "must be greater than zero".to_string(),
            }
            .into());
        }
        Ok(())
    }
}
