//! Stored cache entries with expiry metadata.

use std::time::Duration;

use chrono::{DateTime, Utc};
use entcache_core::{CachedValue, Timestamp};

/// A value plus the timestamps needed to enforce its TTL.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct StoredEntry {
    pub value: CachedValue,
    pub cached_at: Timestamp,
    pub expires_at: Timestamp,
}

impl StoredEntry {
    pub fn new(value: CachedValue, ttl: Duration) -> Self {
        let cached_at = Utc::now();
        Self {
            value,
            cached_at,
            expires_at: expiry_after(cached_at, ttl),
        }
    }

    /// An entry whose expiry instant has been reached reads as absent.
    pub fn is_expired(&self, now: Timestamp) -> bool {
        now >= self.expires_at
    }
}

/// `now + ttl`, saturating at the largest representable instant.
pub(crate) fn expiry_after(now: Timestamp, ttl: Duration) -> Timestamp {
    chrono::Duration::from_std(ttl)
        .ok()
        .and_then(|ttl| now.checked_add_signed(ttl))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}
