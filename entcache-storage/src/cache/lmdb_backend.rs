//! LMDB-backed cache implementation.
//!
//! Uses the heed crate (Rust bindings for LMDB) to provide a memory-mapped
//! key-value store that survives process restarts.
//!
//! # Record Layout
//!
//! Keys are the UTF-8 bytes of the [`CacheKey`]. Values are
//! `[expires_at millis: 8 bytes LE][cached_at millis: 8 bytes LE][json]`.
//!
//! # Thread Safety
//!
//! LMDB provides ACID transactions. The backend uses:
//! - Read transactions for lookups
//! - Write transactions for `put`, `forget`, expiry removal and `clear`
//! - Counters live behind an `RwLock`; the entry count is read from LMDB

use std::path::Path;
use std::sync::RwLock;
use std::time::Duration;

use chrono::{DateTime, Utc};
use entcache_core::{CacheError, CacheKey, CachedValue, EntcacheError, EntcacheResult, LmdbConfig};
use heed::types::Bytes;
use heed::{Database, Env, EnvOpenOptions};
use tracing::debug;

use super::entry::StoredEntry;
use super::traits::{CacheBackend, CacheStats};

const HEADER_LEN: usize = 16;

/// Error type for LMDB cache operations.
#[derive(Debug, thiserror::Error)]
pub enum LmdbCacheError {
    /// Failed to open or create the LMDB environment.
    #[error("Failed to open LMDB environment: {0}")]
    EnvOpen(String),

    /// Failed to open the database within the environment.
    #[error("Failed to open database: {0}")]
    DbOpen(String),

    /// Transaction error.
    #[error("Transaction error: {0}")]
    Transaction(String),

    /// Serialization error.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Deserialization error.
    #[error("Deserialization error: {0}")]
    Deserialization(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<LmdbCacheError> for EntcacheError {
    fn from(e: LmdbCacheError) -> Self {
        match e {
            LmdbCacheError::Serialization(reason) | LmdbCacheError::Deserialization(reason) => {
                EntcacheError::Cache(CacheError::Serialization { reason })
            }
            other => EntcacheError::Cache(CacheError::Backend {
                backend: "lmdb".to_string(),
                reason: other.to_string(),
            }),
        }
    }
}

fn txn_err(e: heed::Error) -> LmdbCacheError {
    LmdbCacheError::Transaction(e.to_string())
}

/// LMDB-backed cache.
///
/// # Example
///
/// ```ignore
/// use entcache_storage::cache::{CacheBackend, LmdbCacheBackend};
///
/// let backend = LmdbCacheBackend::new("/tmp/entcache", 64)?;
/// backend.put(&key, &value, Duration::from_secs(60))?;
/// let cached = backend.get(&key)?;
/// ```
pub struct LmdbCacheBackend {
    env: Env,
    db: Database<Bytes, Bytes>,
    stats: RwLock<CacheStats>,
}

impl LmdbCacheBackend {
    /// Create a new LMDB cache backend.
    ///
    /// # Arguments
    ///
    /// * `path` - Directory where LMDB files will be stored
    /// * `max_size_mb` - Maximum size of the database in megabytes
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The directory cannot be created
    /// - LMDB environment cannot be opened
    /// - Database cannot be created
    pub fn new<P: AsRef<Path>>(path: P, max_size_mb: usize) -> Result<Self, LmdbCacheError> {
        std::fs::create_dir_all(&path)?;

        let env = unsafe {
            EnvOpenOptions::new()
                .map_size(max_size_mb * 1024 * 1024)
                .max_dbs(1)
                .open(path.as_ref())
        }
        .map_err(|e| LmdbCacheError::EnvOpen(e.to_string()))?;

        let mut wtxn = env.write_txn().map_err(txn_err)?;
        let db: Database<Bytes, Bytes> = env
            .create_database(&mut wtxn, None)
            .map_err(|e| LmdbCacheError::DbOpen(e.to_string()))?;
        wtxn.commit().map_err(txn_err)?;

        debug!(path = %path.as_ref().display(), max_size_mb, "opened lmdb cache");

        Ok(Self {
            env,
            db,
            stats: RwLock::new(CacheStats::default()),
        })
    }

    /// Create a backend from validated configuration.
    pub fn from_config(config: &LmdbConfig) -> EntcacheResult<Self> {
        config.validate()?;
        Ok(Self::new(&config.path, config.max_size_mb)?)
    }

    /// Drop every expired entry, returning how many were removed.
    pub fn purge_expired(&self) -> EntcacheResult<u64> {
        let now = Utc::now();
        let expired_keys = {
            let rtxn = self.env.read_txn().map_err(txn_err)?;
            let mut keys = Vec::new();
            for result in self.db.iter(&rtxn).map_err(txn_err)? {
                let (key, bytes) = result.map_err(txn_err)?;
                // Unreadable records are dropped along with expired ones.
                let expired = decode_entry(bytes).map_or(true, |entry| entry.is_expired(now));
                if expired {
                    keys.push(key.to_vec());
                }
            }
            keys
        };

        let mut wtxn = self.env.write_txn().map_err(txn_err)?;
        let mut removed = 0u64;
        for key in &expired_keys {
            if self.db.delete(&mut wtxn, key).map_err(txn_err)? {
                removed += 1;
            }
        }
        wtxn.commit().map_err(txn_err)?;

        self.update_stats(|stats| stats.expired += removed)?;
        Ok(removed)
    }

    /// Remove every entry.
    pub fn clear(&self) -> EntcacheResult<()> {
        let mut wtxn = self.env.write_txn().map_err(txn_err)?;
        self.db.clear(&mut wtxn).map_err(txn_err)?;
        wtxn.commit().map_err(txn_err)?;
        Ok(())
    }

    /// Delete a record, reporting whether it was still live. `None` when
    /// the key held nothing.
    fn take_raw(&self, key: &[u8], now: DateTime<Utc>) -> Result<Option<bool>, LmdbCacheError> {
        let mut wtxn = self.env.write_txn().map_err(txn_err)?;
        let live = self
            .db
            .get(&wtxn, key)
            .map_err(txn_err)?
            .map(|bytes| {
                // An unreadable header counts as expired.
                bytes
                    .get(0..8)
                    .and_then(|raw| read_millis(raw).ok())
                    .map_or(false, |expires_at| now < expires_at)
            });
        if live.is_some() {
            self.db.delete(&mut wtxn, key).map_err(txn_err)?;
        }
        wtxn.commit().map_err(txn_err)?;
        Ok(live)
    }

    fn remove_raw(&self, key: &[u8]) -> Result<bool, LmdbCacheError> {
        let mut wtxn = self.env.write_txn().map_err(txn_err)?;
        let deleted = self.db.delete(&mut wtxn, key).map_err(txn_err)?;
        wtxn.commit().map_err(txn_err)?;
        Ok(deleted)
    }

    fn update_stats(&self, f: impl FnOnce(&mut CacheStats)) -> EntcacheResult<()> {
        let mut stats = self.stats.write().map_err(|_| CacheError::LockPoisoned)?;
        f(&mut stats);
        Ok(())
    }
}

fn encode_entry(entry: &StoredEntry) -> Result<Vec<u8>, LmdbCacheError> {
    let json = serde_json::to_vec(&entry.value)
        .map_err(|e| LmdbCacheError::Serialization(e.to_string()))?;

    let mut bytes = Vec::with_capacity(HEADER_LEN + json.len());
    bytes.extend_from_slice(&entry.expires_at.timestamp_millis().to_le_bytes());
    bytes.extend_from_slice(&entry.cached_at.timestamp_millis().to_le_bytes());
    bytes.extend_from_slice(&json);
    Ok(bytes)
}

fn decode_entry(bytes: &[u8]) -> Result<StoredEntry, LmdbCacheError> {
    if bytes.len() < HEADER_LEN {
        return Err(LmdbCacheError::Deserialization(format!(
            "record too short: {} bytes",
            bytes.len()
        )));
    }
    let expires_at = read_millis(&bytes[0..8])?;
    let cached_at = read_millis(&bytes[8..16])?;
    let value: CachedValue = serde_json::from_slice(&bytes[HEADER_LEN..])
        .map_err(|e| LmdbCacheError::Deserialization(e.to_string()))?;

    Ok(StoredEntry {
        value,
        cached_at,
        expires_at,
    })
}

fn read_millis(bytes: &[u8]) -> Result<DateTime<Utc>, LmdbCacheError> {
    let raw: [u8; 8] = bytes
        .try_into()
        .map_err(|_| LmdbCacheError::Deserialization("Invalid timestamp".into()))?;
    DateTime::from_timestamp_millis(i64::from_le_bytes(raw))
        .ok_or_else(|| LmdbCacheError::Deserialization("Timestamp out of range".into()))
}

impl CacheBackend for LmdbCacheBackend {
    fn get(&self, key: &CacheKey) -> EntcacheResult<Option<CachedValue>> {
        let now = Utc::now();
        let encoded_key = key.as_str().as_bytes();

        let entry = {
            let rtxn = self.env.read_txn().map_err(txn_err)?;
            match self.db.get(&rtxn, encoded_key).map_err(txn_err)? {
                Some(bytes) => Some(decode_entry(bytes)?),
                None => None,
            }
        };

        match entry {
            Some(entry) if !entry.is_expired(now) => {
                self.update_stats(|stats| stats.hits += 1)?;
                Ok(Some(entry.value))
            }
            Some(_) => {
                let removed = self.remove_raw(encoded_key)?;
                self.update_stats(|stats| {
                    stats.misses += 1;
                    if removed {
                        stats.expired += 1;
                    }
                })?;
                Ok(None)
            }
            None => {
                self.update_stats(|stats| stats.misses += 1)?;
                Ok(None)
            }
        }
    }

    fn put(&self, key: &CacheKey, value: &CachedValue, ttl: Duration) -> EntcacheResult<()> {
        let bytes = encode_entry(&StoredEntry::new(value.clone(), ttl))?;

        let mut wtxn = self.env.write_txn().map_err(txn_err)?;
        self.db
            .put(&mut wtxn, key.as_str().as_bytes(), &bytes)
            .map_err(txn_err)?;
        wtxn.commit().map_err(txn_err)?;

        self.update_stats(|stats| stats.writes += 1)
    }

    fn forget(&self, key: &CacheKey) -> EntcacheResult<bool> {
        match self.take_raw(key.as_str().as_bytes(), Utc::now())? {
            Some(true) => {
                self.update_stats(|stats| stats.forgets += 1)?;
                Ok(true)
            }
            Some(false) => {
                self.update_stats(|stats| stats.expired += 1)?;
                Ok(false)
            }
            None => Ok(false),
        }
    }

    fn stats(&self) -> EntcacheResult<CacheStats> {
        let entry_count = {
            let rtxn = self.env.read_txn().map_err(txn_err)?;
            self.db.len(&rtxn).map_err(txn_err)?
        };
        let mut stats = self
            .stats
            .read()
            .map_err(|_| CacheError::LockPoisoned)?
            .clone();
        stats.entry_count = entry_count;
        Ok(stats)
    }

    fn name(&self) -> &'static str {
        "lmdb"
    }
}
