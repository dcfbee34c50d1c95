//! Relationship discovery.
//!
//! Entity types declare their relations once through [`Entity::relations`].
//! The registry resolves that declaration the first time a type is seen and
//! shares it afterwards. [`discover`] then decides, per instance, which of
//! those relations are worth caching.

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use entcache_core::{
    validate_table_name, CacheError, CachedValue, Entity, EntcacheResult, EntityStore, Relation,
    Relations,
};
use tracing::{debug, trace};

/// Per-type relation declarations, resolved once.
#[derive(Default)]
pub struct RelationRegistry {
    resolved: RwLock<HashMap<TypeId, Arc<dyn Any + Send + Sync>>>,
}

impl RelationRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// The relations declared on `T`.
    ///
    /// The first call for a type checks that its table can lead a cache key
    /// and that its relation declarations are valid. A type that fails is
    /// never registered, so every later call fails the same way.
    pub fn relations_for<T: Entity>(&self) -> EntcacheResult<Arc<Relations<T>>> {
        let type_id = TypeId::of::<T>();

        let cached = self
            .resolved
            .read()
            .map_err(|_| CacheError::LockPoisoned)?
            .get(&type_id)
            .cloned();
        if let Some(resolved) = cached {
            if let Ok(relations) = resolved.downcast::<Relations<T>>() {
                return Ok(relations);
            }
        }

        let mut resolved = self.resolved.write().map_err(|_| CacheError::LockPoisoned)?;
        if let Some(existing) = resolved.get(&type_id).cloned() {
            if let Ok(relations) = existing.downcast::<Relations<T>>() {
                return Ok(relations);
            }
        }

        trace!(table = T::TABLE, "resolving relations");
        validate_table_name(T::TABLE)?;
        let relations = T::relations();
        relations.validate()?;

        let relations = Arc::new(relations);
        let erased: Arc<dyn Any + Send + Sync> = relations.clone();
        resolved.insert(type_id, erased);
        Ok(relations)
    }

    /// Number of types resolved so far.
    pub fn len(&self) -> usize {
        self.resolved.read().map(|r| r.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl std::fmt::Debug for RelationRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RelationRegistry")
            .field("types", &self.len())
            .finish()
    }
}

/// A cacheable relation of one instance, with what its accessor returned.
pub struct LoadedRelation<'r, T> {
    pub relation: &'r Relation<T>,
    pub value: Option<CachedValue>,
}

/// Names of the cacheable relations of `entity`, in declaration order.
///
/// A relation qualifies when its target type opts into caching and its
/// accessor succeeds on this instance. Accessor failures are skipped, never
/// propagated.
pub fn discover<T: Entity>(
    relations: &Relations<T>,
    entity: &T,
    store: &dyn EntityStore,
) -> Vec<&'static str> {
    discover_loaded(relations, entity, store)
        .into_iter()
        .map(|loaded| loaded.relation.name())
        .collect()
}

/// Like [`discover`], keeping each accessor's result so callers never
/// invoke it a second time.
pub fn discover_loaded<'r, T: Entity>(
    relations: &'r Relations<T>,
    entity: &T,
    store: &dyn EntityStore,
) -> Vec<LoadedRelation<'r, T>> {
    let mut loaded = Vec::with_capacity(relations.len());
    for relation in relations.iter() {
        let target = relation.target();
        if !target.cacheable {
            trace!(
                table = T::TABLE,
                relation = relation.name(),
                target = target.table,
                "target not cacheable, skipping"
            );
            continue;
        }
        match relation.load(entity, store) {
            Ok(value) => loaded.push(LoadedRelation { relation, value }),
            Err(e) => {
                debug!(
                    table = T::TABLE,
                    relation = relation.name(),
                    error = %e,
                    "relation accessor failed, skipping"
                );
            }
        }
    }
    loaded
}
