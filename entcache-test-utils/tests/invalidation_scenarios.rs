//! End-to-end invalidation scenarios over the catalog domain.

use entcache_test_utils::assertions::*;
use entcache_test_utils::fixtures::*;
use entcache_test_utils::*;
use serde::{Deserialize, Serialize};

/// An order line whose table name contains the id separator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct OrderItem {
    id: EntityId,
    order_id: EntityId,
}

impl Entity for OrderItem {
    const TABLE: &'static str = "order_items";
    const CACHEABLE: bool = true;

    fn entity_id(&self) -> EntityId {
        self.id.clone()
    }
}

/// An order whose table is fine but whose items relation is not.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Order {
    id: EntityId,
}

impl Entity for Order {
    const TABLE: &'static str = "order";
    const CACHEABLE: bool = true;

    fn entity_id(&self) -> EntityId {
        self.id.clone()
    }

    fn relations() -> Relations<Self> {
        Relations::new().has_many::<OrderItem, _>("items", |order: &Order, store| {
            store.filter::<OrderItem, _>(|item| item.order_id == order.id)
        })
    }
}

fn key(table: &str, id: u64) -> CacheKey {
    CacheKey::for_entity(table, &EntityId::from(id))
}

fn relation_key(table: &str, id: u64, relation: &str) -> CacheKey {
    CacheKey::for_relation(table, &EntityId::from(id), relation)
}

#[test]
fn product_update_flushes_reviews_in_both_directions() {
    let scenario = Scenario::in_memory().unwrap();
    scenario.seed_catalog().unwrap();
    let cache = &scenario.cache;

    let product1 = cache.get_cached::<Product>(&EntityId::from(1u64), None).unwrap().unwrap();
    let reviews = cache
        .get_cached_relation(&product1, "reviews", None)
        .unwrap()
        .unwrap()
        .into_entities::<Review>()
        .unwrap();
    assert_eq!(reviews, vec![review(1, 1), review(2, 1)]);
    assert_cached(scenario.backend.as_ref(), &relation_key("products", 1, "reviews"));

    for review in &reviews {
        cache.get_cached_relation(review, "product", None).unwrap();
        assert_cached(
            scenario.backend.as_ref(),
            &CacheKey::for_relation("reviews", &review.id, "product"),
        );
    }

    let mut renamed = product1.clone();
    renamed.name = "Renamed".to_string();
    scenario.store.update(&renamed).unwrap();

    assert_not_cached(scenario.backend.as_ref(), &relation_key("products", 1, "reviews"));
    for id in [1, 2] {
        assert_not_cached(scenario.backend.as_ref(), &relation_key("reviews", id, "product"));
        assert_not_cached(scenario.backend.as_ref(), &relation_key("reviews", id, "products"));
    }
    assert_eq!(cache.find_cached_relation(&renamed, "reviews").unwrap(), None);
    assert_eq!(cache.find_cached_relation(&review(1, 1), "product").unwrap(), None);

    // Fresh reads see the new state.
    let reloaded = cache
        .get_cached_relation(&review(1, 1), "product", None)
        .unwrap()
        .unwrap()
        .into_entity::<Product>()
        .unwrap();
    assert_eq!(reloaded, Some(renamed));
}

#[test]
fn unrelated_entries_survive_invalidation() {
    let scenario = Scenario::in_memory().unwrap();
    scenario.seed_catalog().unwrap();
    let cache = &scenario.cache;

    cache.get_cached_relation(&product(1), "reviews", None).unwrap();
    cache.get_cached_relation(&product(2), "reviews", None).unwrap();
    cache.get_cached_relation(&review(3, 2), "product", None).unwrap();

    scenario.store.update(&product(1)).unwrap();

    assert_cached(scenario.backend.as_ref(), &relation_key("products", 2, "reviews"));
    assert_cached(scenario.backend.as_ref(), &relation_key("reviews", 3, "product"));
}

#[test]
fn new_review_drops_stale_product_collection() {
    let scenario = Scenario::in_memory().unwrap();
    scenario.seed_catalog().unwrap();
    let cache = &scenario.cache;

    cache.get_cached_relation(&product(1), "reviews", None).unwrap();
    scenario.store.insert(&review(4, 1)).unwrap();

    assert_not_cached(scenario.backend.as_ref(), &relation_key("products", 1, "reviews"));
    let reviews = cache
        .get_cached_relation(&product(1), "reviews", None)
        .unwrap()
        .unwrap();
    assert_eq!(reviews.records().len(), 3);
}

#[test]
fn review_moving_products_drops_both_collections() {
    let scenario = Scenario::in_memory().unwrap();
    scenario.seed_catalog().unwrap();
    let cache = &scenario.cache;

    cache.get_cached_relation(&product(1), "reviews", None).unwrap();
    cache.get_cached_relation(&product(2), "reviews", None).unwrap();

    scenario.store.update(&review(2, 2)).unwrap();

    assert_not_cached(scenario.backend.as_ref(), &relation_key("products", 1, "reviews"));
    assert_not_cached(scenario.backend.as_ref(), &relation_key("products", 2, "reviews"));
    let reviews = cache
        .get_cached_relation(&product(2), "reviews", None)
        .unwrap()
        .unwrap()
        .into_entities::<Review>()
        .unwrap();
    assert_eq!(reviews, vec![review(2, 2), review(3, 2)]);
}

#[test]
fn delete_is_final() {
    let scenario = Scenario::in_memory().unwrap();
    scenario.seed_catalog().unwrap();
    let cache = &scenario.cache;

    cache.get_cached::<Product>(&EntityId::from(1u64), None).unwrap();
    cache.get_cached_relation(&product(1), "reviews", None).unwrap();
    cache.get_all_cached::<Product>(None).unwrap();

    scenario.store.delete::<Product>(&EntityId::from(1u64)).unwrap();

    assert_eq!(cache.find_cached::<Product>(&EntityId::from(1u64)).unwrap(), None);
    assert_not_cached(scenario.backend.as_ref(), &key("products", 1));
    assert_not_cached(scenario.backend.as_ref(), &relation_key("products", 1, "reviews"));
    assert_not_cached(scenario.backend.as_ref(), &CacheKey::for_type("products"));

    assert_eq!(cache.get_cached::<Product>(&EntityId::from(1u64), None).unwrap(), None);
    assert_eq!(cache.get_all_cached::<Product>(None).unwrap(), vec![product(2)]);
}

#[test]
fn non_participating_relation_is_never_discovered_or_cached() {
    let scenario = Scenario::in_memory().unwrap();
    scenario.store.insert(&vendor(5)).unwrap();
    let mut sold = product(1);
    sold.vendor_id = Some(EntityId::from(5u64));
    scenario.store.insert(&sold).unwrap();

    let relations = scenario.cache.cacheable_relations(&sold).unwrap();
    assert_eq!(relations, vec!["reviews"]);
    assert!(!relations.contains(&"vendor"));

    let vendor_value = scenario.cache.get_cached_relation(&sold, "vendor", None).unwrap();
    assert_eq!(
        vendor_value.unwrap().into_entity::<Vendor>().unwrap(),
        Some(vendor(5))
    );
    assert_not_cached(scenario.backend.as_ref(), &relation_key("products", 1, "vendor"));
}

#[test]
fn non_participating_type_cannot_be_observed() {
    let scenario = Scenario::in_memory().unwrap();
    assert_validation_error(&scenario.engine.observe::<Vendor>());
}

#[test]
fn accessor_failure_is_tolerated_during_invalidation() {
    let scenario = Scenario::in_memory().unwrap();
    scenario.seed_catalog().unwrap();

    // Orphan reviews have no product key; their relation is skipped.
    assert!(scenario.cache.cacheable_relations(&orphan_review(9)).unwrap().is_empty());
    scenario.store.insert(&orphan_review(9)).unwrap();
    scenario.store.update(&orphan_review(9)).unwrap();
    scenario.store.delete::<Review>(&EntityId::from(9u64)).unwrap();

    let report = scenario.engine.flush_related_caches(&orphan_review(9)).unwrap();
    assert_clean_flush(&report);
    assert!(report.flushed.is_empty());

    // Reading the relation directly still reports the missing key.
    assert_relation_error(&scenario.cache.get_cached_relation(&orphan_review(9), "product", None));
}

#[test]
fn store_errors_propagate_through_the_cache() {
    let scenario = Scenario::in_memory().unwrap();
    scenario.seed_catalog().unwrap();
    scenario.store.set_unavailable(true);

    assert_storage_error(&scenario.cache.get_cached::<Product>(&EntityId::from(1u64), None));
    assert_storage_error(&scenario.cache.get_all_cached::<Review>(None));
    assert!(matches!(
        scenario.cache.get_cached::<Product>(&EntityId::from(1u64), None),
        Err(EntcacheError::Storage(StorageError::LookupFailed { .. }))
    ));

    scenario.store.set_unavailable(false);
    assert_eq!(
        scenario.cache.get_cached::<Product>(&EntityId::from(1u64), None).unwrap(),
        Some(product(1))
    );
}

#[test]
fn explicit_flush_twice_never_fails() {
    let scenario = Scenario::in_memory().unwrap();
    scenario.seed_catalog().unwrap();
    scenario.cache.get_cached_relation(&product(1), "reviews", None).unwrap();

    let first = scenario.engine.flush_related_caches(&product(1)).unwrap();
    let second = scenario.engine.flush_related_caches(&product(1)).unwrap();
    assert_clean_flush(&first);
    assert_clean_flush(&second);
    assert!(!first.flushed.is_empty());
    assert!(second.flushed.is_empty());

    assert!(!scenario.cache.forget(&relation_key("products", 1, "reviews")).unwrap());
    assert!(!scenario.cache.forget(&relation_key("products", 1, "reviews")).unwrap());
}

#[test]
fn create_flush_can_be_disabled() {
    let scenario = Scenario::with_backend(
        std::sync::Arc::new(InMemoryCacheBackend::new()),
        CacheConfig::new().with_flush_on_create(false),
    )
    .unwrap();
    scenario.seed_catalog().unwrap();
    scenario.cache.get_cached_relation(&product(1), "reviews", None).unwrap();

    scenario.store.insert(&review(4, 1)).unwrap();

    // The stale collection stays until the next update or TTL expiry.
    assert_cached(scenario.backend.as_ref(), &relation_key("products", 1, "reviews"));
}

#[test]
fn non_participating_type_is_never_cached() {
    let scenario = Scenario::in_memory().unwrap();
    scenario.store.insert(&vendor(5)).unwrap();
    let cache = &scenario.cache;
    let id = EntityId::from(5u64);

    assert_eq!(cache.get_cached::<Vendor>(&id, None).unwrap(), Some(vendor(5)));
    assert_eq!(cache.get_all_cached::<Vendor>(None).unwrap(), vec![vendor(5)]);
    assert_not_cached(scenario.backend.as_ref(), &key("vendors", 5));
    assert_not_cached(scenario.backend.as_ref(), &CacheKey::for_type("vendors"));
    assert_eq!(cache.find_cached::<Vendor>(&id).unwrap(), None);

    let mut renamed = vendor(5);
    renamed.name = "Renamed".to_string();
    scenario.store.update(&renamed).unwrap();

    assert_eq!(cache.get_cached::<Vendor>(&id, None).unwrap(), Some(renamed.clone()));
    assert_eq!(cache.get_all_cached::<Vendor>(None).unwrap(), vec![renamed]);
    assert!(scenario.backend.is_empty().unwrap());
}

#[test]
fn table_containing_id_separator_cannot_collide() {
    let scenario = Scenario::in_memory().unwrap();
    let item = OrderItem {
        id: EntityId::from(1u64),
        order_id: EntityId::new("items_1").unwrap(),
    };
    let order = Order {
        id: EntityId::new("items_1").unwrap(),
    };
    scenario.store.insert(&item).unwrap();
    scenario.store.insert(&order).unwrap();

    // Both would otherwise name the key `order_items_1`.
    assert_validation_error(&scenario.cache.get_cached::<OrderItem>(&item.id, None));
    assert_validation_error(&scenario.cache.get_all_cached::<OrderItem>(None));
    assert_validation_error(&scenario.cache.get_cached_relation(&order, "items", None));
    assert_validation_error(&scenario.cache.get_cached::<Order>(&order.id, None));
    assert!(scenario.backend.is_empty().unwrap());
}
