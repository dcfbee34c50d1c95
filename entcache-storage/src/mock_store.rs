//! In-memory entity store with lifecycle events.
//!
//! Used by tests and examples as the authoritative side of the cache. Writes
//! go through typed `insert`/`update`/`delete` and fire the matching
//! lifecycle handlers; reads go through the [`EntityStore`] contract and are
//! counted so tests can observe read-through behaviour.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::RwLock;

use entcache_core::{
    Entity, EntcacheError, EntcacheResult, EntityEvent, EntityId, EntityRecord, EntityStore,
    LifecycleEvent, LifecycleHandler, StorageError,
};
use tracing::trace;

type Tables = HashMap<String, BTreeMap<EntityId, EntityRecord>>;

/// Mock entity store for testing.
#[derive(Default)]
pub struct MockEntityStore {
    tables: RwLock<Tables>,
    handlers: RwLock<HashMap<(String, LifecycleEvent), Vec<LifecycleHandler>>>,
    find_calls: AtomicUsize,
    all_calls: AtomicUsize,
    unavailable: AtomicBool,
}

impl MockEntityStore {
    /// Create a new mock store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a new entity, then fire `Created`.
    pub fn insert<T: Entity>(&self, entity: &T) -> EntcacheResult<()> {
        let record = EntityRecord::from_entity(entity)?;
        {
            let mut tables = self.tables.write().map_err(|_| StorageError::LockPoisoned)?;
            let table = tables.entry(T::TABLE.to_string()).or_default();
            if table.contains_key(&record.id) {
                return Err(StorageError::InsertFailed {
                    table: T::TABLE.to_string(),
                    reason: format!("id {} already exists", record.id),
                }
                .into());
            }
            table.insert(record.id.clone(), record.clone());
        }

        self.fire(EntityEvent {
            event: LifecycleEvent::Created,
            record,
            previous: None,
        })
    }

    /// Replace an existing entity, then fire `Updated` with the prior state.
    pub fn update<T: Entity>(&self, entity: &T) -> EntcacheResult<()> {
        let record = EntityRecord::from_entity(entity)?;
        let previous = {
            let mut tables = self.tables.write().map_err(|_| StorageError::LockPoisoned)?;
            let slot = tables
                .get_mut(T::TABLE)
                .and_then(|table| table.get_mut(&record.id))
                .ok_or_else(|| StorageError::NotFound {
                    table: T::TABLE.to_string(),
                    id: record.id.clone(),
                })?;
            std::mem::replace(slot, record.clone())
        };

        self.fire(EntityEvent {
            event: LifecycleEvent::Updated,
            record,
            previous: Some(previous),
        })
    }

    /// Fire `Deleting`, then remove the entity.
    ///
    /// A failing handler aborts the delete and the entity stays stored.
    pub fn delete<T: Entity>(&self, id: &EntityId) -> EntcacheResult<()> {
        let record = self
            .read_tables()?
            .get(T::TABLE)
            .and_then(|table| table.get(id))
            .cloned()
            .ok_or_else(|| StorageError::NotFound {
                table: T::TABLE.to_string(),
                id: id.clone(),
            })?;

        self.fire(EntityEvent {
            event: LifecycleEvent::Deleting,
            record,
            previous: None,
        })?;

        let mut tables = self.tables.write().map_err(|_| StorageError::LockPoisoned)?;
        if let Some(table) = tables.get_mut(T::TABLE) {
            table.remove(id);
        }
        Ok(())
    }

    /// Number of entities stored in a table.
    pub fn count(&self, table: &str) -> usize {
        self.tables
            .read()
            .map(|tables| tables.get(table).map_or(0, BTreeMap::len))
            .unwrap_or(0)
    }

    /// Clear all stored data. Handlers stay subscribed.
    pub fn clear(&self) -> EntcacheResult<()> {
        self.tables
            .write()
            .map_err(|_| StorageError::LockPoisoned)?
            .clear();
        Ok(())
    }

    /// Number of `find_record` calls so far.
    pub fn find_calls(&self) -> usize {
        self.find_calls.load(Ordering::SeqCst)
    }

    /// Number of `all_records` calls so far.
    pub fn all_calls(&self) -> usize {
        self.all_calls.load(Ordering::SeqCst)
    }

    pub fn reset_calls(&self) {
        self.find_calls.store(0, Ordering::SeqCst);
        self.all_calls.store(0, Ordering::SeqCst);
    }

    /// Make every lookup fail with `StorageError::LookupFailed`.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Number of handlers subscribed to `event` on `table`.
    pub fn handler_count(&self, table: &str, event: LifecycleEvent) -> usize {
        self.handlers
            .read()
            .map(|h| h.get(&(table.to_string(), event)).map_or(0, Vec::len))
            .unwrap_or(0)
    }

    fn read_tables(&self) -> EntcacheResult<std::sync::RwLockReadGuard<'_, Tables>> {
        self.tables
            .read()
            .map_err(|_| EntcacheError::from(StorageError::LockPoisoned))
    }

    fn check_available(&self, table: &str) -> EntcacheResult<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(StorageError::LookupFailed {
                table: table.to_string(),
                reason: "store unavailable".to_string(),
            }
            .into());
        }
        Ok(())
    }

    // Handlers run without any lock held so they can read the store.
    fn fire(&self, event: EntityEvent) -> EntcacheResult<()> {
        let handlers = self
            .handlers
            .read()
            .map_err(|_| StorageError::LockPoisoned)?
            .get(&(event.record.table.clone(), event.event))
            .cloned()
            .unwrap_or_default();

        trace!(
            table = %event.record.table,
            id = %event.record.id,
            event = %event.event,
            handlers = handlers.len(),
            "firing lifecycle event"
        );
        for handler in handlers {
            handler(&event)?;
        }
        Ok(())
    }
}

impl EntityStore for MockEntityStore {
    fn find_record(&self, table: &str, id: &EntityId) -> EntcacheResult<Option<EntityRecord>> {
        self.find_calls.fetch_add(1, Ordering::SeqCst);
        self.check_available(table)?;
        Ok(self
            .read_tables()?
            .get(table)
            .and_then(|rows| rows.get(id))
            .cloned())
    }

    fn all_records(&self, table: &str) -> EntcacheResult<Vec<EntityRecord>> {
        self.all_calls.fetch_add(1, Ordering::SeqCst);
        self.check_available(table)?;
        Ok(self
            .read_tables()?
            .get(table)
            .map(|rows| rows.values().cloned().collect())
            .unwrap_or_default())
    }

    fn on(
        &self,
        table: &str,
        event: LifecycleEvent,
        handler: LifecycleHandler,
    ) -> EntcacheResult<()> {
        self.handlers
            .write()
            .map_err(|_| StorageError::LockPoisoned)?
            .entry((table.to_string(), event))
            .or_default()
            .push(handler);
        Ok(())
    }
}

impl std::fmt::Debug for MockEntityStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockEntityStore")
            .field("find_calls", &self.find_calls())
            .field("all_calls", &self.all_calls())
            .finish_non_exhaustive()
    }
}
