//! entcache Core - Entity, Relation and Key Types
//!
//! Pure data structures and contracts shared by every other crate:
//! identifiers, the [`Entity`] trait and its relation declarations, the
//! values a cache entry may hold, cache key naming, the entity store
//! contract, errors and configuration. No caching logic lives here.

mod config;
mod entity;
mod error;
mod identity;
pub mod key;
mod relation;
mod store;
mod value;

pub use config::{CacheConfig, LmdbConfig, DEFAULT_TTL};
pub use entity::{lower_camel, short_type_name, Entity, EntityRecord};
pub use error::{
    CacheError, ConfigError, EntcacheError, EntcacheResult, RelationError, StorageError,
    ValidationError,
};
pub use identity::{EntityId, Timestamp};
pub use key::{validate_relation_name, validate_table_name, CacheKey, KeyParts};
pub use relation::{Relation, RelationKind, RelationTarget, Relations};
pub use store::{EntityEvent, EntityStore, EntityStoreExt, LifecycleEvent, LifecycleHandler};
pub use value::CachedValue;
