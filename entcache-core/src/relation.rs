//! Relation declarations.
//!
//! Each entity type lists its relations once, through [`Entity::relations`].
//! A relation is a named accessor that, given an instance and the entity
//! store, yields one related entity, a collection, or nothing. The related
//! type's table, class name and capability marker are captured when the
//! relation is declared, so discovery never has to look at the target type
//! again.

use std::collections::HashSet;
use std::fmt;

use crate::key::{validate_relation_name, validate_table_name};
use crate::{CachedValue, Entity, EntcacheError, EntcacheResult, EntityStore, ValidationError};

/// Cardinality of a relation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RelationKind {
    One,
    Many,
}

/// The related type, as seen by discovery and invalidation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RelationTarget {
    pub table: &'static str,
    pub class_name: &'static str,
    pub cacheable: bool,
}

impl RelationTarget {
    pub fn of<R: Entity>() -> Self {
        Self {
            table: R::TABLE,
            class_name: R::class_name(),
            cacheable: R::CACHEABLE,
        }
    }
}

type Accessor<T> =
    Box<dyn Fn(&T, &dyn EntityStore) -> EntcacheResult<Option<CachedValue>> + Send + Sync>;

/// A single named relation of `T`.
pub struct Relation<T> {
    name: &'static str,
    kind: RelationKind,
    target: RelationTarget,
    accessor: Accessor<T>,
}

impl<T> Relation<T> {
    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn kind(&self) -> RelationKind {
        self.kind
    }

    pub fn target(&self) -> RelationTarget {
        self.target
    }

    /// Invoke the accessor and materialize its result.
    ///
    /// Returns `Ok(None)` when a to-one relation has no related entity.
    pub fn load(&self, entity: &T, store: &dyn EntityStore) -> EntcacheResult<Option<CachedValue>> {
        (self.accessor)(entity, store)
    }
}

impl<T> fmt::Debug for Relation<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Relation")
            .field("name", &self.name)
            .field("kind", &self.kind)
            .field("target", &self.target)
            .finish_non_exhaustive()
    }
}

/// The relations declared on `T`, in declaration order.
pub struct Relations<T> {
    relations: Vec<Relation<T>>,
}

impl<T: Entity> Relations<T> {
    pub fn new() -> Self {
        Self {
            relations: Vec::new(),
        }
    }

    /// Declare a to-many relation.
    pub fn has_many<R, F>(mut self, name: &'static str, accessor: F) -> Self
    where
        R: Entity,
        F: Fn(&T, &dyn EntityStore) -> EntcacheResult<Vec<R>> + Send + Sync + 'static,
    {
        self.relations.push(Relation {
            name,
            kind: RelationKind::Many,
            target: RelationTarget::of::<R>(),
            accessor: Box::new(move |entity: &T, store: &dyn EntityStore| {
                let related = accessor(entity, store)?;
                CachedValue::collection(&related).map(Some)
            }),
        });
        self
    }

    /// Declare a to-one relation owned by the related side.
    pub fn has_one<R, F>(mut self, name: &'static str, accessor: F) -> Self
    where
        R: Entity,
        F: Fn(&T, &dyn EntityStore) -> EntcacheResult<Option<R>> + Send + Sync + 'static,
    {
        self.relations.push(Relation {
            name,
            kind: RelationKind::One,
            target: RelationTarget::of::<R>(),
            accessor: Box::new(move |entity: &T, store: &dyn EntityStore| {
                accessor(entity, store)?
                    .map(|related| CachedValue::entity(&related))
                    .transpose()
            }),
        });
        self
    }

    /// Declare a to-one relation through a key held by `T`.
    pub fn belongs_to<R, F>(self, name: &'static str, accessor: F) -> Self
    where
        R: Entity,
        F: Fn(&T, &dyn EntityStore) -> EntcacheResult<Option<R>> + Send + Sync + 'static,
    {
        self.has_one(name, accessor)
    }

    pub fn get(&self, name: &str) -> Option<&Relation<T>> {
        self.relations.iter().find(|relation| relation.name == name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Relation<T>> {
        self.relations.iter()
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.relations.iter().map(|relation| relation.name).collect()
    }

    pub fn len(&self) -> usize {
        self.relations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.relations.is_empty()
    }

    /// Reject names that cannot be used as key segments, and duplicates.
    ///
    /// Cacheable targets lead the reverse keys flushed on their instances,
    /// so their tables are checked too.
    pub fn validate(&self) -> EntcacheResult<()> {
        let mut seen = HashSet::new();
        for relation in &self.relations {
            validate_relation_name(relation.name)?;
            if relation.target.cacheable {
                validate_table_name(relation.target.table)?;
            }
            if !seen.insert(relation.name) {
                return Err(EntcacheError::Validation(ValidationError::DuplicateRelation {
                    table: T::TABLE.to_string(),
                    relation: relation.name.to_string(),
                }));
            }
        }
        Ok(())
    }
}

impl<T: Entity> Default for Relations<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> fmt::Debug for Relations<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.relations.iter()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{EntityId, EntityRecord, EntityStoreExt, LifecycleEvent, LifecycleHandler, RelationError};
    use serde::{Deserialize, Serialize};
    use std::collections::HashMap;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Author {
        id: EntityId,
    }

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Post {
        id: EntityId,
        author_id: Option<EntityId>,
    }

    impl Entity for Author {
        const TABLE: &'static str = "authors";
        const CACHEABLE: bool = true;

        fn entity_id(&self) -> EntityId {
            self.id.clone()
        }

        fn relations() -> Relations<Self> {
            Relations::new().has_many::<Post, _>("posts", |author: &Author, store| {
                store.filter::<Post, _>(|post| post.author_id.as_ref() == Some(&author.id))
            })
        }
    }

    impl Entity for Post {
        const TABLE: &'static str = "posts";

        fn entity_id(&self) -> EntityId {
            self.id.clone()
        }

        fn relations() -> Relations<Self> {
            Relations::new().belongs_to::<Author, _>("author", |post: &Post, store| {
                let author_id = post.author_id.as_ref().ok_or_else(|| RelationError::MissingKey {
                    table: Self::TABLE.to_string(),
                    relation: "author".to_string(),
                    field: "author_id".to_string(),
                })?;
                store.find::<Author>(author_id)
            })
        }
    }

    /// Read-only store over a fixed set of records.
    #[derive(Default)]
    struct FixedStore {
        tables: HashMap<String, Vec<EntityRecord>>,
    }

    impl FixedStore {
        fn with<E: Entity>(mut self, entity: &E) -> Self {
            let record = EntityRecord::from_entity(entity).unwrap();
            self.tables.entry(E::TABLE.to_string()).or_default().push(record);
            self
        }
    }

    impl EntityStore for FixedStore {
        fn find_record(&self, table: &str, id: &EntityId) -> EntcacheResult<Option<EntityRecord>> {
            Ok(self
                .tables
                .get(table)
                .and_then(|records| records.iter().find(|r| &r.id == id).cloned()))
        }

        fn all_records(&self, table: &str) -> EntcacheResult<Vec<EntityRecord>> {
            Ok(self.tables.get(table).cloned().unwrap_or_default())
        }

        fn on(&self, _: &str, _: LifecycleEvent, _: LifecycleHandler) -> EntcacheResult<()> {
            Ok(())
        }
    }

    fn author(id: u64) -> Author {
        Author {
            id: EntityId::from(id),
        }
    }

    fn post(id: u64, author_id: Option<u64>) -> Post {
        Post {
            id: EntityId::from(id),
            author_id: author_id.map(EntityId::from),
        }
    }

    #[test]
    fn test_targets_capture_capability() {
        let author_relations = Author::relations();
        let posts = author_relations.get("posts").unwrap();
        assert_eq!(posts.kind(), RelationKind::Many);
        assert_eq!(posts.target().table, "posts");
        assert_eq!(posts.target().class_name, "Post");
        assert!(!posts.target().cacheable);

        let post_relations = Post::relations();
        let author = post_relations.get("author").unwrap();
        assert_eq!(author.kind(), RelationKind::One);
        assert!(author.target().cacheable);
    }

    #[test]
    fn test_has_many_materializes_collection() {
        let store = FixedStore::default()
            .with(&author(1))
            .with(&post(10, Some(1)))
            .with(&post(11, Some(1)))
            .with(&post(12, Some(2)));

        let relations = Author::relations();
        let value = relations
            .get("posts")
            .unwrap()
            .load(&author(1), &store)
            .unwrap()
            .unwrap();
        let ids: Vec<_> = value.records().iter().map(|r| r.id.clone()).collect();
        assert_eq!(ids, vec![EntityId::from(10u64), EntityId::from(11u64)]);
    }

    #[test]
    fn test_belongs_to_missing_related_is_none() {
        let store = FixedStore::default();
        let relations = Post::relations();
        let value = relations
            .get("author")
            .unwrap()
            .load(&post(10, Some(99)), &store)
            .unwrap();
        assert!(value.is_none());
    }

    #[test]
    fn test_belongs_to_missing_key_fails() {
        let store = FixedStore::default();
        let relations = Post::relations();
        let err = relations
            .get("author")
            .unwrap()
            .load(&post(10, None), &store)
            .unwrap_err();
        assert!(matches!(
            err,
            EntcacheError::Relation(RelationError::MissingKey { .. })
        ));
    }

    #[test]
    fn test_validate_rejects_duplicates_and_bad_names() {
        let duplicated = Relations::<Author>::new()
            .has_many::<Post, _>("posts", |_, _| Ok(Vec::new()))
            .has_many::<Post, _>("posts", |_, _| Ok(Vec::new()));
        assert!(matches!(
            duplicated.validate(),
            Err(EntcacheError::Validation(ValidationError::DuplicateRelation { .. }))
        ));

        let bad_name =
            Relations::<Author>::new().has_many::<Post, _>("po:sts", |_, _| Ok(Vec::new()));
        assert!(bad_name.validate().is_err());

        assert!(Author::relations().validate().is_ok());
        assert_eq!(Author::relations().names(), vec!["posts"]);
    }

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct LineItem {
        id: EntityId,
    }

    impl Entity for LineItem {
        const TABLE: &'static str = "line_items";
        const CACHEABLE: bool = true;

        fn entity_id(&self) -> EntityId {
            self.id.clone()
        }
    }

    #[test]
    fn test_validate_rejects_cacheable_target_with_bad_table() {
        let relations =
            Relations::<Post>::new().has_many::<LineItem, _>("items", |_, _| Ok(Vec::new()));
        assert!(matches!(
            relations.validate(),
            Err(EntcacheError::Validation(ValidationError::InvalidKeySegment { .. }))
        ));
    }
}
