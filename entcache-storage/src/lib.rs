//! entcache Storage - Cache Backends, Read-Through Layer and Invalidation
//!
//! Builds on the contracts in `entcache-core`:
//! - [`CacheBackend`] with in-memory and LMDB adapters
//! - [`ReadThroughCache`] for get-or-populate reads
//! - [`InvalidationEngine`] for flushing on entity lifecycle events
//! - [`MockEntityStore`], an in-memory entity store with lifecycle events

pub mod cache;
mod mock_store;

#[cfg(test)]
mod fixtures;

pub use cache::{
    discover, discover_loaded, reverse_relation_names, CacheBackend, CacheStats, FlushFailure,
    FlushReport, InMemoryCacheBackend, InvalidationEngine, LmdbCacheBackend, LmdbCacheError,
    LoadedRelation, Producer, ReadThroughCache, RelationRegistry,
};
pub use mock_store::MockEntityStore;
