//! Entity fixtures for unit tests in this crate.
//!
//! `authors` has many `posts` and belongs to a `publishers` row; publishers
//! and drafts never opt into caching.

use entcache_core::{Entity, EntityId, EntityStoreExt, RelationError, Relations};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Author {
    pub id: EntityId,
    pub name: String,
    pub publisher_id: Option<EntityId>,
}

impl Entity for Author {
    const TABLE: &'static str = "authors";
    const CACHEABLE: bool = true;

    fn entity_id(&self) -> EntityId {
        self.id.clone()
    }

    fn relations() -> Relations<Self> {
        Relations::new()
            .has_many::<Post, _>("posts", |author: &Author, store| {
                store.filter::<Post, _>(|post| post.author_id.as_ref() == Some(&author.id))
            })
            .belongs_to::<Publisher, _>("publisher", |author: &Author, store| {
                match &author.publisher_id {
                    Some(id) => store.find::<Publisher>(id),
                    None => Ok(None),
                }
            })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Post {
    pub id: EntityId,
    pub author_id: Option<EntityId>,
    pub title: String,
}

impl Entity for Post {
    const TABLE: &'static str = "posts";
    const CACHEABLE: bool = true;

    fn entity_id(&self) -> EntityId {
        self.id.clone()
    }

    fn relations() -> Relations<Self> {
        Relations::new().belongs_to::<Author, _>("author", |post: &Post, store| {
            let author_id = post.author_id.as_ref().ok_or_else(|| RelationError::MissingKey {
                table: Post::TABLE.to_string(),
                relation: "author".to_string(),
                field: "author_id".to_string(),
            })?;
            store.find::<Author>(author_id)
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Publisher {
    pub id: EntityId,
    pub name: String,
}

impl Entity for Publisher {
    const TABLE: &'static str = "publishers";

    fn entity_id(&self) -> EntityId {
        self.id.clone()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Draft {
    pub id: EntityId,
}

impl Entity for Draft {
    const TABLE: &'static str = "drafts";

    fn entity_id(&self) -> EntityId {
        self.id.clone()
    }
}

pub fn author(id: u64) -> Author {
    Author {
        id: EntityId::from(id),
        name: format!("Author {}", id),
        publisher_id: None,
    }
}

pub fn post(id: u64, author_id: Option<u64>) -> Post {
    Post {
        id: EntityId::from(id),
        author_id: author_id.map(EntityId::from),
        title: format!("Post {}", id),
    }
}
