//! Cache key naming.
//!
//! Every piece of derived data lives under a key built from the entity
//! table, an optional id and an optional relation name:
//!
//! ```text
//! products            full-table snapshot
//! products_1          a single entity
//! products_1:reviews  a materialized relation
//! ```
//!
//! Keys are the only addressing scheme into the backend, so the format is
//! stable across process restarts. Table names never contain `_` or `:`,
//! ids and relation names never contain `:`. Under those rules
//! [`CacheKey::parse`] inverts naming, which is what rules out collisions.

use std::fmt;

use crate::{EntcacheError, EntcacheResult, EntityId, ValidationError};

/// Separator between table and entity id.
pub const ID_SEPARATOR: char = '_';

/// Separator between entity key and relation name.
pub const RELATION_SEPARATOR: char = ':';

/// A string address into the cache backend.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct CacheKey(String);

/// Decoded components of a [`CacheKey`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyParts {
    pub table: String,
    pub id: Option<String>,
    pub relation: Option<String>,
}

impl CacheKey {
    /// Key of the full-table snapshot: `<table>`.
    pub fn for_type(table: &str) -> Self {
        Self(table.to_string())
    }

    /// Key of a single entity: `<table>_<id>`.
    pub fn for_entity(table: &str, id: &EntityId) -> Self {
        Self(format!("{}{}{}", table, ID_SEPARATOR, id))
    }

    /// Key of a materialized relation: `<table>_<id>:<relation>`.
    pub fn for_relation(table: &str, id: &EntityId, relation: &str) -> Self {
        Self(format!(
            "{}{}{}{}{}",
            table, ID_SEPARATOR, id, RELATION_SEPARATOR, relation
        ))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Split a key back into its parts.
    ///
    /// The first `_` ends the table, the first `:` after it ends the id.
    pub fn parse(key: &str) -> KeyParts {
        match key.split_once(ID_SEPARATOR) {
            None => KeyParts {
                table: key.to_string(),
                id: None,
                relation: None,
            },
            Some((table, rest)) => match rest.split_once(RELATION_SEPARATOR) {
                None => KeyParts {
                    table: table.to_string(),
                    id: Some(rest.to_string()),
                    relation: None,
                },
                Some((id, relation)) => KeyParts {
                    table: table.to_string(),
                    id: Some(id.to_string()),
                    relation: Some(relation.to_string()),
                },
            },
        }
    }

    /// Decode this key.
    pub fn parts(&self) -> KeyParts {
        Self::parse(&self.0)
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for CacheKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Check that a table name can be used as the leading key segment.
pub fn validate_table_name(table: &str) -> EntcacheResult<()> {
    if table.is_empty() {
        return Err(invalid_segment(table, "table name must not be empty"));
    }
    if table.contains(ID_SEPARATOR) || table.contains(RELATION_SEPARATOR) {
        return Err(invalid_segment(
            table,
            "table name must not contain '_' or ':'",
        ));
    }
    Ok(())
}

/// Check that a relation name can be used as the trailing key segment.
pub fn validate_relation_name(relation: &str) -> EntcacheResult<()> {
    if relation.is_empty() {
        return Err(invalid_segment(relation, "relation name must not be empty"));
    }
    if relation.contains(RELATION_SEPARATOR) {
        return Err(invalid_segment(relation, "relation name must not contain ':'"));
    }
    Ok(())
}

fn invalid_segment(segment: &str, reason: &str) -> EntcacheError {
    EntcacheError::Validation(ValidationError::InvalidKeySegment {
        segment: segment.to_string(),
        reason: reason.to_string(),
    })
}
