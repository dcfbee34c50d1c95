//! Entity store contract.
//!
//! The store owns the authoritative entities. The cache only needs lookups
//! by id, full-table listing, and lifecycle subscriptions.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::{Entity, EntcacheResult, EntityId, EntityRecord};

/// Lifecycle events an entity store emits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum LifecycleEvent {
    /// After an entity was inserted.
    Created,
    /// After an entity was updated.
    Updated,
    /// Before an entity is deleted.
    Deleting,
}

impl fmt::Display for LifecycleEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Created => "created",
            Self::Updated => "updated",
            Self::Deleting => "deleting",
        };
        f.write_str(name)
    }
}

/// A lifecycle notification.
#[derive(Debug, Clone, PartialEq)]
pub struct EntityEvent {
    pub event: LifecycleEvent,
    /// Current state (for `Deleting`, the state about to be removed).
    pub record: EntityRecord,
    /// State before an update, when the store knows it.
    pub previous: Option<EntityRecord>,
}

/// Callback invoked for lifecycle events.
pub type LifecycleHandler = Arc<dyn Fn(&EntityEvent) -> EntcacheResult<()> + Send + Sync>;

/// Repository of persisted entities.
///
/// Object-safe so relation accessors can receive `&dyn EntityStore`; typed
/// access goes through [`EntityStoreExt`].
pub trait EntityStore: Send + Sync {
    /// Look up one entity by id.
    fn find_record(&self, table: &str, id: &EntityId) -> EntcacheResult<Option<EntityRecord>>;

    /// List every entity in a table.
    fn all_records(&self, table: &str) -> EntcacheResult<Vec<EntityRecord>>;

    /// Subscribe to a lifecycle event on a table.
    fn on(&self, table: &str, event: LifecycleEvent, handler: LifecycleHandler)
        -> EntcacheResult<()>;
}

/// Typed convenience methods over any [`EntityStore`].
pub trait EntityStoreExt: EntityStore {
    /// Find an entity of type `T` by id.
    fn find<T: Entity>(&self, id: &EntityId) -> EntcacheResult<Option<T>> {
        self.find_record(T::TABLE, id)?
            .map(|record| record.decode::<T>())
            .transpose()
    }

    /// Load every entity of type `T`.
    fn all<T: Entity>(&self) -> EntcacheResult<Vec<T>> {
        self.all_records(T::TABLE)?
            .iter()
            .map(EntityRecord::decode::<T>)
            .collect()
    }

    /// Load the entities of type `T` matching a predicate.
    fn filter<T, P>(&self, predicate: P) -> EntcacheResult<Vec<T>>
    where
        T: Entity,
        P: Fn(&T) -> bool,
    {
        Ok(self
            .all::<T>()?
            .into_iter()
            .filter(|entity| predicate(entity))
            .collect())
    }
}

impl<S: EntityStore + ?Sized> EntityStoreExt for S {}
