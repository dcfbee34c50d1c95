//! Values held by cache entries.

use serde::{Deserialize, Serialize};

use crate::{Entity, EntcacheResult, EntityRecord};

/// What a cache entry holds: one entity, a collection, or a raw scalar.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum CachedValue {
    Entity(EntityRecord),
    Collection(Vec<EntityRecord>),
    Scalar(serde_json::Value),
}

impl CachedValue {
    /// Cache a single entity.
    pub fn entity<T: Entity>(entity: &T) -> EntcacheResult<Self> {
        Ok(Self::Entity(EntityRecord::from_entity(entity)?))
    }

    /// Cache a collection of entities.
    pub fn collection<T: Entity>(entities: &[T]) -> EntcacheResult<Self> {
        let records = entities
            .iter()
            .map(EntityRecord::from_entity)
            .collect::<EntcacheResult<Vec<_>>>()?;
        Ok(Self::Collection(records))
    }

    /// Entity records contained in this value. Scalars contain none.
    pub fn records(&self) -> &[EntityRecord] {
        match self {
            Self::Entity(record) => std::slice::from_ref(record),
            Self::Collection(records) => records,
            Self::Scalar(_) => &[],
        }
    }

    /// Decode as a single entity.
    ///
    /// A collection decodes to its first member; a scalar decodes to `None`.
    pub fn into_entity<T: Entity>(self) -> EntcacheResult<Option<T>> {
        self.records().first().map(EntityRecord::decode::<T>).transpose()
    }

    /// Decode every contained entity.
    pub fn into_entities<T: Entity>(self) -> EntcacheResult<Vec<T>> {
        self.records().iter().map(EntityRecord::decode::<T>).collect()
    }

    pub fn is_collection(&self) -> bool {
        matches!(self, Self::Collection(_))
    }
}
