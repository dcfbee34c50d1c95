//! The entity contract and its type-erased record form.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::{CacheError, EntcacheResult, EntityId, Relations};

/// A typed, identifiable persisted record.
///
/// `TABLE` names the cache namespace (conventionally the storage table).
/// Types opt into relation caching by setting `CACHEABLE = true`; relations
/// pointing at types that leave it `false` are never cached or flushed.
///
/// # Example
///
/// ```ignore
/// impl Entity for Review {
///     const TABLE: &'static str = "reviews";
///     const CACHEABLE: bool = true;
///
///     fn entity_id(&self) -> EntityId {
///         self.id.clone()
///     }
///
///     fn relations() -> Relations<Self> {
///         Relations::new().belongs_to::<Product, _>("product", |review, store| {
///             store.find::<Product>(&review.product_id)
///         })
///     }
/// }
/// ```
pub trait Entity: Clone + Serialize + DeserializeOwned + Send + Sync + 'static {
    /// Table name, used as the leading cache key segment.
    const TABLE: &'static str;

    /// Capability marker for relation caching.
    const CACHEABLE: bool = false;

    /// Identifier of this instance, unique within `TABLE`.
    fn entity_id(&self) -> EntityId;

    /// Short class name, e.g. `Product`.
    fn class_name() -> &'static str {
        short_type_name::<Self>()
    }

    /// Relations declared directly on this type.
    fn relations() -> Relations<Self> {
        Relations::new()
    }
}

/// Type-erased snapshot of an entity as held by stores and caches.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityRecord {
    pub table: String,
    pub id: EntityId,
    pub data: serde_json::Value,
}

impl EntityRecord {
    /// Snapshot an entity.
    pub fn from_entity<T: Entity>(entity: &T) -> EntcacheResult<Self> {
        Ok(Self {
            table: T::TABLE.to_string(),
            id: entity.entity_id(),
            data: serde_json::to_value(entity)?,
        })
    }

    /// Decode the snapshot back into `T`.
    pub fn decode<T: Entity>(&self) -> EntcacheResult<T> {
        if self.table != T::TABLE {
            return Err(CacheError::TypeMismatch {
                expected: T::TABLE.to_string(),
                found: self.table.clone(),
            }
            .into());
        }
        Ok(serde_json::from_value(self.data.clone())?)
    }
}

/// Last path segment of a type name, without generic arguments.
pub fn short_type_name<T: ?Sized>() -> &'static str {
    let full = std::any::type_name::<T>();
    let base = full.split('<').next().unwrap_or(full);
    base.rsplit("::").next().unwrap_or(base)
}

/// Lower-camel-case a class name: `OrderItem` becomes `orderItem`.
pub fn lower_camel(name: &str) -> String {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) => first.to_lowercase().chain(chars).collect(),
        None => String::new(),
    }
}
