//! Read-through cache over an entity store.
//!
//! Every read follows get-or-populate semantics: a miss loads from the
//! entity store, stores the result under its [`CacheKey`] and returns it.
//! A miss is never an error; only store and backend failures propagate,
//! unchanged.
//!
//! Only types that opt in with `CACHEABLE` are stored. Reads of any other
//! type, and of relations pointing at one, go straight to the store, since
//! nothing would invalidate their entries on write. A type whose table
//! cannot lead a key is rejected with a validation error before any key is
//! built.

use std::sync::{Arc, Weak};
use std::time::Duration;

use entcache_core::{
    validate_relation_name, CacheConfig, CacheKey, CachedValue, Entity, EntcacheResult,
    EntityId, EntityStore, EntityStoreExt, Relation, RelationError, Relations,
};
use tracing::{debug, trace};

use super::discovery::{discover, RelationRegistry};
use super::traits::CacheBackend;

/// Read-through cache for entities, collections and relations.
///
/// # Type Parameters
///
/// - `C`: The cache backend holding derived data
/// - `S`: The entity store holding authoritative data
///
/// # Example
///
/// ```ignore
/// let cache = ReadThroughCache::with_defaults(backend, store);
///
/// let product = cache.get_cached::<Product>(&id, None)?;
/// let reviews = cache.get_cached_relation(&product, "reviews", None)?;
/// ```
pub struct ReadThroughCache<C, S>
where
    C: CacheBackend,
    S: EntityStore,
{
    /// The cache backend.
    cache: Arc<C>,
    /// The authoritative entity store.
    store: Arc<S>,
    /// Cache configuration.
    config: CacheConfig,
    /// Relation declarations, resolved once per type.
    registry: Arc<RelationRegistry>,
}

impl<C, S> ReadThroughCache<C, S>
where
    C: CacheBackend,
    S: EntityStore,
{
    /// Create a new read-through cache.
    pub fn new(cache: Arc<C>, store: Arc<S>, config: CacheConfig) -> Self {
        Self {
            cache,
            store,
            config,
            registry: Arc::new(RelationRegistry::new()),
        }
    }

    /// Create a new read-through cache with default configuration.
    pub fn with_defaults(cache: Arc<C>, store: Arc<S>) -> Self {
        Self::new(cache, store, CacheConfig::default())
    }

    /// Get the cache configuration.
    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    /// Get a reference to the cache backend.
    pub fn backend(&self) -> &C {
        &self.cache
    }

    /// Get a reference to the entity store.
    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn registry(&self) -> &RelationRegistry {
        &self.registry
    }

    /// Every entity of `T`, from the collection snapshot or the store.
    pub fn get_all_cached<T: Entity>(&self, ttl: Option<Duration>) -> EntcacheResult<Vec<T>> {
        if !T::CACHEABLE {
            debug!(table = T::TABLE, "type not cacheable, loading uncached");
            return self.store.all::<T>();
        }
        self.registry.relations_for::<T>()?;

        let key = CacheKey::for_type(T::TABLE);
        let ttl = self.config.ttl_or_default(ttl);

        let value = self.cache.remember(&key, ttl, &mut || {
            debug!(key = %key, "collection miss, loading from store");
            let records = self.store.all_records(T::TABLE)?;
            Ok(Some(CachedValue::Collection(records)))
        })?;

        match value {
            Some(value) => value.into_entities::<T>(),
            None => Ok(Vec::new()),
        }
    }

    /// One entity of `T` by id, from the cache or the store.
    ///
    /// Entities missing from the store are not cached.
    pub fn get_cached<T: Entity>(
        &self,
        id: &EntityId,
        ttl: Option<Duration>,
    ) -> EntcacheResult<Option<T>> {
        if !T::CACHEABLE {
            debug!(table = T::TABLE, id = %id, "type not cacheable, loading uncached");
            return self.store.find::<T>(id);
        }
        if let Some(entity) = self.find_cached::<T>(id)? {
            return Ok(Some(entity));
        }

        let key = CacheKey::for_entity(T::TABLE, id);
        let ttl = self.config.ttl_or_default(ttl);
        let value = self.cache.remember(&key, ttl, &mut || {
            debug!(key = %key, "entity miss, loading from store");
            Ok(self
                .store
                .find_record(T::TABLE, id)?
                .map(CachedValue::Entity))
        })?;

        match value {
            Some(value) => value.into_entity::<T>(),
            None => Ok(None),
        }
    }

    /// Probe the cache for one entity. Never touches the store.
    pub fn find_cached<T: Entity>(&self, id: &EntityId) -> EntcacheResult<Option<T>> {
        if !T::CACHEABLE {
            return Ok(None);
        }
        self.registry.relations_for::<T>()?;

        let key = CacheKey::for_entity(T::TABLE, id);
        match self.cache.get(&key)? {
            Some(value) => {
                trace!(key = %key, "entity hit");
                value.into_entity::<T>()
            }
            None => Ok(None),
        }
    }

    /// Materialize a relation of `entity`, caching the result.
    ///
    /// With `ttl` set, the cached entry is bypassed and rewritten with that
    /// TTL. Relations from or to types that do not opt into caching are
    /// loaded but never stored. Returns `None` when a to-one relation has no target.
    pub fn get_cached_relation<T: Entity>(
        &self,
        entity: &T,
        relation: &str,
        ttl: Option<Duration>,
    ) -> EntcacheResult<Option<CachedValue>> {
        let relations = self.registry.relations_for::<T>()?;
        let relation = lookup(&relations, relation)?;
        let key = CacheKey::for_relation(T::TABLE, &entity.entity_id(), relation.name());

        if !T::CACHEABLE || !relation.target().cacheable {
            debug!(key = %key, target = relation.target().table, "relation not cacheable, loading uncached");
            return relation.load(entity, &*self.store);
        }

        if ttl.is_none() {
            if let Some(value) = self.cache.get(&key)? {
                trace!(key = %key, "relation hit");
                return Ok(Some(value));
            }
        }

        debug!(key = %key, "relation miss, invoking accessor");
        let value = relation.load(entity, &*self.store)?;
        if let Some(value) = &value {
            self.cache
                .put(&key, value, self.config.ttl_or_default(ttl))?;
        }
        Ok(value)
    }

    /// Probe the cache for a relation of `entity`. Never invokes the accessor.
    pub fn find_cached_relation<T: Entity>(
        &self,
        entity: &T,
        relation: &str,
    ) -> EntcacheResult<Option<CachedValue>> {
        let relations = self.registry.relations_for::<T>()?;
        let relation = lookup(&relations, relation)?;
        if !T::CACHEABLE || !relation.target().cacheable {
            return Ok(None);
        }
        let key = CacheKey::for_relation(T::TABLE, &entity.entity_id(), relation.name());
        self.cache.get(&key)
    }

    /// Drop the cached entity `T` with `id`.
    pub fn flush_cached<T: Entity>(&self, id: &EntityId) -> EntcacheResult<bool> {
        self.registry.relations_for::<T>()?;
        self.forget(&CacheKey::for_entity(T::TABLE, id))
    }

    /// Drop the collection snapshot of `T`.
    pub fn flush_all_cached<T: Entity>(&self) -> EntcacheResult<bool> {
        self.registry.relations_for::<T>()?;
        self.forget(&CacheKey::for_type(T::TABLE))
    }

    /// Drop a cached relation of `entity`. The name need not be declared.
    pub fn flush_cached_relation<T: Entity>(
        &self,
        entity: &T,
        relation: &str,
    ) -> EntcacheResult<bool> {
        self.registry.relations_for::<T>()?;
        validate_relation_name(relation)?;
        self.forget(&CacheKey::for_relation(T::TABLE, &entity.entity_id(), relation))
    }

    /// Drop a key. Absent keys are a no-op returning `false`.
    pub fn forget(&self, key: &CacheKey) -> EntcacheResult<bool> {
        let removed = self.cache.forget(key)?;
        trace!(key = %key, removed, "forget");
        Ok(removed)
    }

    /// Names of the relations of `entity` that participate in caching.
    pub fn cacheable_relations<T: Entity>(&self, entity: &T) -> EntcacheResult<Vec<&'static str>> {
        let relations = self.registry.relations_for::<T>()?;
        Ok(discover(&relations, entity, &*self.store))
    }
}

fn lookup<'r, T: Entity>(relations: &'r Relations<T>, name: &str) -> EntcacheResult<&'r Relation<T>> {
    relations.get(name).ok_or_else(|| {
        RelationError::Unknown {
            table: T::TABLE.to_string(),
            relation: name.to_string(),
        }
        .into()
    })
}

/// A [`ReadThroughCache`] holding its store weakly.
///
/// Lifecycle handlers live inside the store, so they keep this form to
/// avoid a reference cycle.
pub(crate) struct DetachedCache<C, S> {
    cache: Arc<C>,
    store: Weak<S>,
    config: CacheConfig,
    registry: Arc<RelationRegistry>,
}

impl<C, S> DetachedCache<C, S>
where
    C: CacheBackend,
    S: EntityStore,
{
    /// `None` once the store has been dropped.
    pub(crate) fn attach(&self) -> Option<ReadThroughCache<C, S>> {
        Some(ReadThroughCache {
            cache: Arc::clone(&self.cache),
            store: self.store.upgrade()?,
            config: self.config.clone(),
            registry: Arc::clone(&self.registry),
        })
    }
}

impl<C, S> ReadThroughCache<C, S>
where
    C: CacheBackend,
    S: EntityStore,
{
    pub(crate) fn detach(&self) -> DetachedCache<C, S> {
        DetachedCache {
            cache: Arc::clone(&self.cache),
            store: Arc::downgrade(&self.store),
            config: self.config.clone(),
            registry: Arc::clone(&self.registry),
        }
    }
}

impl<C, S> Clone for ReadThroughCache<C, S>
where
    C: CacheBackend,
    S: EntityStore,
{
    fn clone(&self) -> Self {
        Self {
            cache: Arc::clone(&self.cache),
            store: Arc::clone(&self.store),
            config: self.config.clone(),
            registry: Arc::clone(&self.registry),
        }
    }
}
