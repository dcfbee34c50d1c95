//! entcache Test Utilities
//!
//! Centralized test infrastructure for the entcache workspace:
//! - A small catalog domain (`products`, `reviews`, `vendors`)
//! - Proptest generators for ids, key segments and entities
//! - Scenario fixtures wiring a store, cache and invalidation engine
//! - Custom assertions for cache state and error variants

use std::sync::Arc;

// Re-export the mock store from its source crate
pub use entcache_storage::MockEntityStore;

// Re-export core types for convenience
pub use entcache_core::{
    CacheConfig, CacheError, CacheKey, CachedValue, Entity, EntcacheError, EntcacheResult,
    EntityId, EntityRecord, EntityStore, EntityStoreExt, RelationError, Relations,
    StorageError, ValidationError,
};
pub use entcache_storage::{
    CacheBackend, FlushReport, InMemoryCacheBackend, InvalidationEngine, LmdbCacheBackend,
    ReadThroughCache,
};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ============================================================================
// CATALOG DOMAIN
// ============================================================================

/// A product with reviews; optionally sold by a vendor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Product {
    pub id: EntityId,
    pub name: String,
    pub price_cents: u64,
    pub vendor_id: Option<EntityId>,
}

impl Entity for Product {
    const TABLE: &'static str = "products";
    const CACHEABLE: bool = true;

    fn entity_id(&self) -> EntityId {
        self.id.clone()
    }

    fn relations() -> Relations<Self> {
        Relations::new()
            .has_many::<Review, _>("reviews", |product: &Product, store| {
                store.filter::<Review, _>(|review| review.product_id.as_ref() == Some(&product.id))
            })
            .belongs_to::<Vendor, _>("vendor", |product: &Product, store| match &product.vendor_id {
                Some(id) => store.find::<Vendor>(id),
                None => Ok(None),
            })
    }
}

/// A review pointing back at its product.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Review {
    pub id: EntityId,
    pub product_id: Option<EntityId>,
    pub rating: u8,
    pub body: String,
}

impl Entity for Review {
    const TABLE: &'static str = "reviews";
    const CACHEABLE: bool = true;

    fn entity_id(&self) -> EntityId {
        self.id.clone()
    }

    fn relations() -> Relations<Self> {
        Relations::new().belongs_to::<Product, _>("product", |review: &Review, store| {
            let product_id = review.product_id.as_ref().ok_or_else(|| RelationError::MissingKey {
                table: Review::TABLE.to_string(),
                relation: "product".to_string(),
                field: "product_id".to_string(),
            })?;
            store.find::<Product>(product_id)
        })
    }
}

/// A vendor. Does not take part in relation caching.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Vendor {
    pub id: EntityId,
    pub name: String,
}

impl Entity for Vendor {
    const TABLE: &'static str = "vendors";

    fn entity_id(&self) -> EntityId {
        self.id.clone()
    }
}

// ============================================================================
// PROPTEST GENERATORS
// ============================================================================

pub mod generators {
    //! Proptest strategies for generating entcache values.

    use super::*;
    use proptest::prelude::*;
    use std::time::Duration;

    /// Generate a random UUID.
    pub fn arb_uuid() -> impl Strategy<Value = Uuid> {
        any::<[u8; 16]>().prop_map(Uuid::from_bytes)
    }

    /// Generate an EntityId from an integer, a UUID or a natural key.
    pub fn arb_entity_id() -> impl Strategy<Value = EntityId> {
        prop_oneof![
            any::<u64>().prop_map(EntityId::from),
            arb_uuid().prop_map(EntityId::from),
            "[a-zA-Z0-9_-]{1,16}".prop_map(|s| EntityId::new(s).unwrap_or_else(|_| EntityId::from(0u64))),
        ]
    }

    /// Generate a table name usable as a key segment.
    pub fn arb_table_name() -> impl Strategy<Value = String> {
        "[a-z][a-z0-9]{0,11}"
    }

    /// Generate a relation name usable as a key segment.
    pub fn arb_relation_name() -> impl Strategy<Value = String> {
        "[a-z][a-zA-Z0-9_]{0,11}"
    }

    /// Generate a (type, id?, relation?) triple in the shape keys are built from.
    pub fn arb_key_triple() -> impl Strategy<Value = (String, Option<EntityId>, Option<String>)> {
        prop_oneof![
            arb_table_name().prop_map(|t| (t, None::<EntityId>, None::<String>)),
            (arb_table_name(), arb_entity_id()).prop_map(|(t, id)| (t, Some(id), None::<String>)),
            (arb_table_name(), arb_entity_id(), arb_relation_name())
                .prop_map(|(t, id, r)| (t, Some(id), Some(r))),
        ]
    }

    /// Build the key for a triple.
    pub fn key_for(triple: &(String, Option<EntityId>, Option<String>)) -> CacheKey {
        match triple {
            (table, None, _) => CacheKey::for_type(table),
            (table, Some(id), None) => CacheKey::for_entity(table, id),
            (table, Some(id), Some(relation)) => CacheKey::for_relation(table, id, relation),
        }
    }

    /// Generate a TTL between one second and one day.
    pub fn arb_ttl() -> impl Strategy<Value = Duration> {
        (1u64..86_400).prop_map(Duration::from_secs)
    }

    /// Generate a product with the given id.
    pub fn arb_product(id: u64) -> impl Strategy<Value = Product> {
        ("[A-Z][a-z]{2,10}", 1u64..1_000_000).prop_map(move |(name, price_cents)| Product {
            id: EntityId::from(id),
            name,
            price_cents,
            vendor_id: None,
        })
    }

    /// Generate a review of `product_id`.
    pub fn arb_review(id: u64, product_id: EntityId) -> impl Strategy<Value = Review> {
        (1u8..=5, "[a-z ]{0,40}").prop_map(move |(rating, body)| Review {
            id: EntityId::from(id),
            product_id: Some(product_id.clone()),
            rating,
            body,
        })
    }

    /// Generate a product with between zero and `max_reviews` reviews.
    pub fn arb_catalog(max_reviews: usize) -> impl Strategy<Value = (Product, Vec<Review>)> {
        (arb_product(1), 0..=max_reviews).prop_flat_map(|(product, count)| {
            let reviews: Vec<_> = (0..count)
                .map(|i| arb_review(100 + i as u64, product.id.clone()))
                .collect();
            (Just(product), reviews)
        })
    }

    /// Generate a scalar cache value.
    pub fn arb_scalar() -> impl Strategy<Value = CachedValue> {
        prop_oneof![
            any::<i64>().prop_map(|n| CachedValue::Scalar(serde_json::json!(n))),
            "[a-z]{0,20}".prop_map(|s| CachedValue::Scalar(serde_json::json!(s))),
            any::<bool>().prop_map(|b| CachedValue::Scalar(serde_json::json!(b))),
        ]
    }
}

// ============================================================================
// TEST FIXTURES
// ============================================================================

pub mod fixtures {
    //! Pre-built entities and wired-up scenarios.

    use super::*;

    pub fn product(id: u64) -> Product {
        Product {
            id: EntityId::from(id),
            name: format!("Product {}", id),
            price_cents: 1_000 * id,
            vendor_id: None,
        }
    }

    pub fn review(id: u64, product_id: u64) -> Review {
        Review {
            id: EntityId::from(id),
            product_id: Some(EntityId::from(product_id)),
            rating: 4,
            body: format!("Review {} of product {}", id, product_id),
        }
    }

    /// A review whose product key was never set.
    pub fn orphan_review(id: u64) -> Review {
        Review {
            id: EntityId::from(id),
            product_id: None,
            rating: 1,
            body: "no product".to_string(),
        }
    }

    pub fn vendor(id: u64) -> Vendor {
        Vendor {
            id: EntityId::from(id),
            name: format!("Vendor {}", id),
        }
    }

    /// Store, cache and engine wired together, with `products` and
    /// `reviews` observed.
    pub struct Scenario<C: CacheBackend + 'static> {
        pub store: Arc<MockEntityStore>,
        pub backend: Arc<C>,
        pub cache: ReadThroughCache<C, MockEntityStore>,
        pub engine: InvalidationEngine<C, MockEntityStore>,
    }

    impl Scenario<InMemoryCacheBackend> {
        /// Scenario over a fresh in-memory backend.
        pub fn in_memory() -> EntcacheResult<Self> {
            Self::with_backend(Arc::new(InMemoryCacheBackend::new()), CacheConfig::default())
        }
    }

    impl<C: CacheBackend + 'static> Scenario<C> {
        pub fn with_backend(backend: Arc<C>, config: CacheConfig) -> EntcacheResult<Self> {
            config.validate()?;
            let store = Arc::new(MockEntityStore::new());
            let cache = ReadThroughCache::new(Arc::clone(&backend), Arc::clone(&store), config);
            let engine = InvalidationEngine::new(cache.clone());
            engine.observe::<Product>()?;
            engine.observe::<Review>()?;
            Ok(Self {
                store,
                backend,
                cache,
                engine,
            })
        }

        /// Product 1 with reviews 1 and 2, product 2 with review 3.
        pub fn seed_catalog(&self) -> EntcacheResult<()> {
            self.store.insert(&product(1))?;
            self.store.insert(&product(2))?;
            self.store.insert(&review(1, 1))?;
            self.store.insert(&review(2, 1))?;
            self.store.insert(&review(3, 2))?;
            self.store.reset_calls();
            Ok(())
        }

        /// Whether `key` holds an unexpired entry.
        pub fn is_cached(&self, key: &CacheKey) -> EntcacheResult<bool> {
            Ok(self.backend.get(key)?.is_some())
        }
    }
}

// ============================================================================
// CUSTOM ASSERTIONS
// ============================================================================

pub mod assertions {
    //! Custom assertion functions for entcache-specific validation.

    use super::*;

    /// Assert that `key` holds an unexpired entry.
    #[track_caller]
    pub fn assert_cached<C: CacheBackend + ?Sized>(backend: &C, key: &CacheKey) {
        match backend.get(key) {
            Ok(Some(_)) => {}
            other => panic!("Expected {} to be cached, got: {:?}", key, other),
        }
    }

    /// Assert that `key` holds nothing.
    #[track_caller]
    pub fn assert_not_cached<C: CacheBackend + ?Sized>(backend: &C, key: &CacheKey) {
        match backend.get(key) {
            Ok(None) => {}
            other => panic!("Expected {} to be absent, got: {:?}", key, other),
        }
    }

    /// Assert that an EntcacheResult is a Storage error.
    #[track_caller]
    pub fn assert_storage_error<T: std::fmt::Debug>(result: &EntcacheResult<T>) {
        match result {
            Err(EntcacheError::Storage(_)) => {}
            other => panic!("Expected Storage error, got: {:?}", other),
        }
    }

    /// Assert that an EntcacheResult is a Relation error.
    #[track_caller]
    pub fn assert_relation_error<T: std::fmt::Debug>(result: &EntcacheResult<T>) {
        match result {
            Err(EntcacheError::Relation(_)) => {}
            other => panic!("Expected Relation error, got: {:?}", other),
        }
    }

    /// Assert that an EntcacheResult is a Validation error.
    #[track_caller]
    pub fn assert_validation_error<T: std::fmt::Debug>(result: &EntcacheResult<T>) {
        match result {
            Err(EntcacheError::Validation(_)) => {}
            other => panic!("Expected Validation error, got: {:?}", other),
        }
    }

    /// Assert that an invalidation pass completed without failures.
    #[track_caller]
    pub fn assert_clean_flush(report: &FlushReport) {
        assert!(
            report.is_clean(),
            "Expected clean flush, got failures: {:?}",
            report.failures
        );
    }
}
