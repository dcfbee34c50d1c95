//! Invalidation engine.
//!
//! Keeps the cache coherent with the entity store by reacting to lifecycle
//! events. For every cacheable relation of a changed entity it drops:
//!
//! - the entity's own relation entry (`products_1:reviews`)
//! - on each related instance, the reverse relation entries named after the
//!   changed type's table and lower-camel class name (`reviews_7:products`,
//!   `reviews_7:product`)
//!
//! The reverse accessor name is guessed, not declared. When neither guess
//! matches, the reverse entry stays until its TTL runs out.
//!
//! Flushes are idempotent: dropping an absent key is a no-op, so
//! overlapping invalidations for the same entity are harmless.

use std::collections::HashSet;
use std::sync::Arc;

use entcache_core::{
    lower_camel, CacheKey, Entity, EntcacheError, EntcacheResult, EntityEvent, EntityRecord,
    EntityStore, LifecycleEvent, LifecycleHandler, ValidationError,
};
use tracing::{debug, warn};

use super::discovery::{discover_loaded, LoadedRelation};
use super::read_through::{DetachedCache, ReadThroughCache};
use super::traits::CacheBackend;

/// A flush that failed, and what it was for.
#[derive(Debug, Clone, PartialEq)]
pub struct FlushFailure {
    /// Relation name, or the key for direct entity and collection entries.
    pub target: String,
    pub error: EntcacheError,
}

/// Outcome of an invalidation pass.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FlushReport {
    /// Keys that were present and have been dropped.
    pub flushed: Vec<CacheKey>,
    pub failures: Vec<FlushFailure>,
}

impl FlushReport {
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }

    pub fn merge(&mut self, other: FlushReport) {
        self.flushed.extend(other.flushed);
        self.failures.extend(other.failures);
    }

    /// The flushed keys, or the first failure.
    pub fn into_result(self) -> EntcacheResult<Vec<CacheKey>> {
        match self.failures.into_iter().next() {
            Some(failure) => Err(failure.error),
            None => Ok(self.flushed),
        }
    }

    fn forget<C, S>(&mut self, cache: &ReadThroughCache<C, S>, key: CacheKey)
    where
        C: CacheBackend,
        S: EntityStore,
    {
        match cache.forget(&key) {
            Ok(true) => self.flushed.push(key),
            Ok(false) => {}
            Err(error) => {
                warn!(key = %key, error = %error, "flush failed");
                self.failures.push(FlushFailure {
                    target: key.to_string(),
                    error,
                });
            }
        }
    }
}

/// Reacts to entity lifecycle events by dropping stale cache entries.
pub struct InvalidationEngine<C, S>
where
    C: CacheBackend,
    S: EntityStore,
{
    cache: ReadThroughCache<C, S>,
}

impl<C, S> InvalidationEngine<C, S>
where
    C: CacheBackend,
    S: EntityStore,
{
    pub fn new(cache: ReadThroughCache<C, S>) -> Self {
        Self { cache }
    }

    /// The read-through cache this engine invalidates.
    pub fn cache(&self) -> &ReadThroughCache<C, S> {
        &self.cache
    }

    /// Subscribe to the store's lifecycle events for `T`.
    ///
    /// Fails when `T` does not opt into caching, its table cannot be used as
    /// a key segment, or its relation declarations are invalid. These are
    /// setup failures: callers should observe every type once at startup and
    /// refuse to run when this errors.
    pub fn observe<T: Entity>(&self) -> EntcacheResult<()>
    where
        C: 'static,
        S: 'static,
    {
        if !T::CACHEABLE {
            return Err(ValidationError::NotCacheable {
                table: T::TABLE.to_string(),
            }
            .into());
        }
        self.cache.registry().relations_for::<T>()?;

        let store = self.cache.store();
        store.on(T::TABLE, LifecycleEvent::Created, handler::<C, S, T>(self.cache.detach()))?;
        store.on(T::TABLE, LifecycleEvent::Updated, handler::<C, S, T>(self.cache.detach()))?;
        store.on(T::TABLE, LifecycleEvent::Deleting, handler::<C, S, T>(self.cache.detach()))?;

        debug!(table = T::TABLE, "observing lifecycle events");
        Ok(())
    }

    /// Flush every cacheable relation of `entity`, locally and on the
    /// related side.
    ///
    /// A failing relation is recorded and the remaining relations are still
    /// attempted.
    pub fn flush_related_caches<T: Entity>(&self, entity: &T) -> EntcacheResult<FlushReport> {
        let relations = self.cache.registry().relations_for::<T>()?;
        let store: &dyn EntityStore = self.cache.store();
        let mut report = FlushReport::default();

        for loaded in discover_loaded(&relations, entity, store) {
            let name = loaded.relation.name();
            if let Err(error) = self.flush_relation(entity, loaded, &mut report) {
                warn!(
                    table = T::TABLE,
                    id = %entity.entity_id(),
                    relation = name,
                    error = %error,
                    "relation flush failed"
                );
                report.failures.push(FlushFailure {
                    target: name.to_string(),
                    error,
                });
            }
        }
        Ok(report)
    }

    /// A new entity may belong to cached collections on the related side.
    pub fn on_created<T: Entity>(&self, entity: &T) -> EntcacheResult<FlushReport> {
        let mut report = if self.cache.config().flush_relations_on_create {
            self.flush_related_caches(entity)?
        } else {
            FlushReport::default()
        };
        report.forget(&self.cache, CacheKey::for_type(T::TABLE));
        Ok(report)
    }

    /// Flush relations of both the new and, when known, the previous state,
    /// then the entity's own entry.
    pub fn on_updated<T: Entity>(
        &self,
        entity: &T,
        previous: Option<&T>,
    ) -> EntcacheResult<FlushReport> {
        let mut report = self.flush_related_caches(entity)?;
        if let Some(previous) = previous {
            report.merge(self.flush_related_caches(previous)?);
        }
        report.forget(&self.cache, CacheKey::for_entity(T::TABLE, &entity.entity_id()));
        report.forget(&self.cache, CacheKey::for_type(T::TABLE));
        Ok(report)
    }

    /// Flush relations, then the entity's own entry.
    pub fn on_deleting<T: Entity>(&self, entity: &T) -> EntcacheResult<FlushReport> {
        let mut report = self.flush_related_caches(entity)?;
        report.forget(&self.cache, CacheKey::for_entity(T::TABLE, &entity.entity_id()));
        report.forget(&self.cache, CacheKey::for_type(T::TABLE));
        Ok(report)
    }

    /// Dispatch a store event for `T`.
    pub fn handle<T: Entity>(&self, event: &EntityEvent) -> EntcacheResult<FlushReport> {
        let entity = event.record.decode::<T>()?;
        match event.event {
            LifecycleEvent::Created => self.on_created(&entity),
            LifecycleEvent::Updated => {
                let previous = event
                    .previous
                    .as_ref()
                    .map(EntityRecord::decode::<T>)
                    .transpose()?;
                self.on_updated(&entity, previous.as_ref())
            }
            LifecycleEvent::Deleting => self.on_deleting(&entity),
        }
    }

    fn flush_relation<T: Entity>(
        &self,
        entity: &T,
        loaded: LoadedRelation<'_, T>,
        report: &mut FlushReport,
    ) -> EntcacheResult<()> {
        let key = CacheKey::for_relation(T::TABLE, &entity.entity_id(), loaded.relation.name());

        // Related instances come from the cached entry and the current state,
        // so members that left or joined the relation are both covered.
        let mut related: Vec<EntityRecord> = Vec::new();
        if let Some(cached) = self.cache.backend().get(&key)? {
            related.extend(cached.records().iter().cloned());
        }
        if let Some(fresh) = &loaded.value {
            related.extend(fresh.records().iter().cloned());
        }

        let guesses = reverse_relation_names::<T>();
        let mut seen = HashSet::new();
        for record in related {
            if !seen.insert((record.table.clone(), record.id.clone())) {
                continue;
            }
            for guess in &guesses {
                report.forget(&self.cache, CacheKey::for_relation(&record.table, &record.id, guess));
            }
        }

        report.forget(&self.cache, key);
        Ok(())
    }
}

impl<C, S> Clone for InvalidationEngine<C, S>
where
    C: CacheBackend,
    S: EntityStore,
{
    fn clone(&self) -> Self {
        Self {
            cache: self.cache.clone(),
        }
    }
}

/// Conventional names a related type may use for its relation back to `T`.
pub fn reverse_relation_names<T: Entity>() -> Vec<String> {
    let mut names = vec![T::TABLE.to_string()];
    let camel = lower_camel(T::class_name());
    if camel != T::TABLE {
        names.push(camel);
    }
    names
}

fn handler<C, S, T>(detached: DetachedCache<C, S>) -> LifecycleHandler
where
    C: CacheBackend + 'static,
    S: EntityStore + 'static,
    T: Entity,
{
    Arc::new(move |event: &EntityEvent| -> EntcacheResult<()> {
        let Some(cache) = detached.attach() else {
            return Ok(());
        };
        let report = InvalidationEngine::new(cache).handle::<T>(event)?;
        debug!(
            table = T::TABLE,
            id = %event.record.id,
            event = %event.event,
            flushed = report.flushed.len(),
            failures = report.failures.len(),
            "invalidated"
        );
        report.into_result().map(|_| ())
    })
}
