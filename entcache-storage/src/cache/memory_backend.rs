//! In-memory TTL cache backend.
//!
//! Entries live in a `HashMap` guarded by an `RwLock`. Expired entries are
//! dropped lazily when read, or in bulk via [`InMemoryCacheBackend::purge_expired`].
//! Each instance is an isolated namespace, which is what tests want.

use std::collections::HashMap;
use std::sync::RwLock;
use std::time::Duration;

use chrono::Utc;
use entcache_core::{CacheError, CacheKey, CachedValue, EntcacheResult};

use super::entry::StoredEntry;
use super::traits::{CacheBackend, CacheStats};

#[derive(Debug, Default)]
pub struct InMemoryCacheBackend {
    entries: RwLock<HashMap<String, StoredEntry>>,
    stats: RwLock<CacheStats>,
}

impl InMemoryCacheBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored entries, including expired ones not yet purged.
    pub fn len(&self) -> EntcacheResult<usize> {
        Ok(self
            .entries
            .read()
            .map_err(|_| CacheError::LockPoisoned)?
            .len())
    }

    pub fn is_empty(&self) -> EntcacheResult<bool> {
        Ok(self.len()? == 0)
    }

    /// Whether an unexpired entry exists, without touching statistics.
    pub fn contains(&self, key: &CacheKey) -> EntcacheResult<bool> {
        let now = Utc::now();
        Ok(self
            .entries
            .read()
            .map_err(|_| CacheError::LockPoisoned)?
            .get(key.as_str())
            .is_some_and(|entry| !entry.is_expired(now)))
    }

    /// Keys of every stored entry, sorted.
    pub fn keys(&self) -> EntcacheResult<Vec<String>> {
        let mut keys: Vec<String> = self
            .entries
            .read()
            .map_err(|_| CacheError::LockPoisoned)?
            .keys()
            .cloned()
            .collect();
        keys.sort();
        Ok(keys)
    }

    /// Drop every expired entry, returning how many were removed.
    pub fn purge_expired(&self) -> EntcacheResult<u64> {
        let now = Utc::now();
        let mut entries = self.entries.write().map_err(|_| CacheError::LockPoisoned)?;
        let before = entries.len();
        entries.retain(|_, entry| !entry.is_expired(now));
        let removed = (before - entries.len()) as u64;
        let remaining = entries.len() as u64;
        drop(entries);

        self.update_stats(|stats| {
            stats.expired += removed;
            stats.entry_count = remaining;
        })?;
        Ok(removed)
    }

    /// Remove every entry.
    pub fn clear(&self) -> EntcacheResult<()> {
        self.entries
            .write()
            .map_err(|_| CacheError::LockPoisoned)?
            .clear();
        self.update_stats(|stats| stats.entry_count = 0)
    }

    fn update_stats(&self, f: impl FnOnce(&mut CacheStats)) -> EntcacheResult<()> {
        let mut stats = self.stats.write().map_err(|_| CacheError::LockPoisoned)?;
        f(&mut stats);
        Ok(())
    }
}

impl CacheBackend for InMemoryCacheBackend {
    fn get(&self, key: &CacheKey) -> EntcacheResult<Option<CachedValue>> {
        let now = Utc::now();
        let mut entries = self.entries.write().map_err(|_| CacheError::LockPoisoned)?;

        let (value, expired) = match entries.get(key.as_str()) {
            Some(entry) if entry.is_expired(now) => (None, true),
            Some(entry) => (Some(entry.value.clone()), false),
            None => (None, false),
        };
        if expired {
            entries.remove(key.as_str());
        }
        let remaining = entries.len() as u64;
        drop(entries);

        self.update_stats(|stats| {
            if value.is_some() {
                stats.hits += 1;
            } else {
                stats.misses += 1;
            }
            if expired {
                stats.expired += 1;
                stats.entry_count = remaining;
            }
        })?;
        Ok(value)
    }

    fn put(&self, key: &CacheKey, value: &CachedValue, ttl: Duration) -> EntcacheResult<()> {
        let mut entries = self.entries.write().map_err(|_| CacheError::LockPoisoned)?;
        entries.insert(key.to_string(), StoredEntry::new(value.clone(), ttl));
        let count = entries.len() as u64;
        drop(entries);

        self.update_stats(|stats| {
            stats.writes += 1;
            stats.entry_count = count;
        })
    }

    /// Only a live entry counts as forgotten; an expired one is dropped
    /// and reported as absent.
    fn forget(&self, key: &CacheKey) -> EntcacheResult<bool> {
        let now = Utc::now();
        let mut entries = self.entries.write().map_err(|_| CacheError::LockPoisoned)?;
        let removed = entries.remove(key.as_str());
        let count = entries.len() as u64;
        drop(entries);

        let Some(entry) = removed else {
            return Ok(false);
        };
        let live = !entry.is_expired(now);
        self.update_stats(|stats| {
            if live {
                stats.forgets += 1;
            } else {
                stats.expired += 1;
            }
            stats.entry_count = count;
        })?;
        Ok(live)
    }

    fn stats(&self) -> EntcacheResult<CacheStats> {
        Ok(self
            .stats
            .read()
            .map_err(|_| CacheError::LockPoisoned)?
            .clone())
    }

    fn name(&self) -> &'static str {
        "memory"
    }
}
