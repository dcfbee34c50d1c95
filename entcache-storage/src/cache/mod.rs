//! Cache layer: backends, read-through access and invalidation.
//!
//! This module provides a read-through cache for entities, entity
//! collections and materialized relations, plus the engine that keeps it
//! coherent with the entity store.
//!
//! # Design Philosophy
//!
//! Entries are only ever created by reads. Writes to the store never populate
//! the cache; they drop every entry that could now be stale, on the changed
//! entity and on the instances related to it. TTL expiry is the backstop,
//! not the mechanism.
//!
//! # Example
//!
//! ```ignore
//! let cache = ReadThroughCache::with_defaults(backend, store.clone());
//! let engine = InvalidationEngine::new(cache.clone());
//! engine.observe::<Product>()?;
//! engine.observe::<Review>()?;
//!
//! let reviews = cache.get_cached_relation(&product, "reviews", None)?;
//! store.update(&product)?; // drops products_1:reviews and reviews_*:product
//! ```

pub mod discovery;
mod entry;
pub mod invalidation;
pub mod lmdb_backend;
pub mod memory_backend;
pub mod read_through;
pub mod traits;

pub use discovery::{discover, discover_loaded, LoadedRelation, RelationRegistry};
pub use invalidation::{reverse_relation_names, FlushFailure, FlushReport, InvalidationEngine};
pub use lmdb_backend::{LmdbCacheBackend, LmdbCacheError};
pub use memory_backend::InMemoryCacheBackend;
pub use read_through::ReadThroughCache;
pub use traits::{CacheBackend, CacheStats, Producer};
