//! Cache backend trait and statistics.
//!
//! This module defines the contract every storage adapter implements. The
//! read-through layer and the invalidation engine only ever talk to a
//! backend through this trait.

use std::time::Duration;

use entcache_core::{CacheKey, CachedValue, EntcacheResult};

/// Producer invoked by [`CacheBackend::remember`] on a miss.
pub type Producer<'a> = dyn FnMut() -> EntcacheResult<Option<CachedValue>> + 'a;

/// Cache backend trait for pluggable cache implementations.
///
/// Implementations must be safe to share between threads. Expired entries
/// must read as absent.
///
/// # Key Format
///
/// Keys arrive fully formed as [`CacheKey`]; backends store them verbatim
/// and never interpret them.
pub trait CacheBackend: Send + Sync {
    /// Get an unexpired value.
    fn get(&self, key: &CacheKey) -> EntcacheResult<Option<CachedValue>>;

    /// Store a value for `ttl`, replacing any previous entry.
    fn put(&self, key: &CacheKey, value: &CachedValue, ttl: Duration) -> EntcacheResult<()>;

    /// Delete an entry.
    ///
    /// Idempotent: deleting an absent or already expired key succeeds with
    /// `Ok(false)`. `Ok(true)` means a live entry was dropped.
    fn forget(&self, key: &CacheKey) -> EntcacheResult<bool>;

    /// Return the cached value if present, otherwise compute it with
    /// `producer`, store it for `ttl` and return it.
    ///
    /// `None` from the producer is returned as-is and not stored.
    fn remember(
        &self,
        key: &CacheKey,
        ttl: Duration,
        producer: &mut Producer<'_>,
    ) -> EntcacheResult<Option<CachedValue>> {
        if let Some(value) = self.get(key)? {
            return Ok(Some(value));
        }
        let value = producer()?;
        if let Some(value) = &value {
            self.put(key, value, ttl)?;
        }
        Ok(value)
    }

    /// Get cache statistics.
    fn stats(&self) -> EntcacheResult<CacheStats>;

    /// Short backend name, used in errors and logs.
    fn name(&self) -> &'static str;
}

/// Statistics about cache usage.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Number of cache hits.
    pub hits: u64,
    /// Number of cache misses.
    pub misses: u64,
    /// Number of writes.
    pub writes: u64,
    /// Number of entries removed by `forget`.
    pub forgets: u64,
    /// Number of entries currently in cache.
    pub entry_count: u64,
    /// Number of entries dropped because their TTL ran out.
    pub expired: u64,
}

impl CacheStats {
    /// Calculate the hit rate (0.0 to 1.0).
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}
