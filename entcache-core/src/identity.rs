//! Identity types for cached entities

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::key::RELATION_SEPARATOR;
use crate::{EntcacheError, EntcacheResult, ValidationError};

/// Timestamp type using UTC timezone.
pub type Timestamp = DateTime<Utc>;

/// Identifier of an entity, unique within its table.
///
/// Stored as a string so integer, UUID and natural keys share one key
/// format. Ids never contain the relation separator `:`, which keeps
/// relation keys unambiguous.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct EntityId(String);

impl EntityId {
    /// Build an id from a string, rejecting empty ids and ids containing `:`.
    pub fn new(id: impl Into<String>) -> EntcacheResult<Self> {
        let id = id.into();
        if id.is_empty() {
            return Err(EntcacheError::Validation(ValidationError::InvalidKeySegment {
                segment: id,
                reason: "entity id must not be empty".to_string(),
            }));
        }
        if id.contains(RELATION_SEPARATOR) {
            return Err(EntcacheError::Validation(ValidationError::InvalidKeySegment {
                segment: id,
                reason: format!("entity id must not contain '{}'", RELATION_SEPARATOR),
            }));
        }
        Ok(Self(id))
    }

    /// Generate a new timestamp-sortable id (UUIDv7).
    pub fn generate() -> Self {
        Self::from(Uuid::now_v7())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<u64> for EntityId {
    fn from(id: u64) -> Self {
        Self(id.to_string())
    }
}

impl From<i64> for EntityId {
    fn from(id: i64) -> Self {
        Self(id.to_string())
    }
}

impl From<u32> for EntityId {
    fn from(id: u32) -> Self {
        Self(id.to_string())
    }
}

impl From<Uuid> for EntityId {
    fn from(id: Uuid) -> Self {
        Self(id.to_string())
    }
}

impl TryFrom<String> for EntityId {
    type Error = EntcacheError;

    fn try_from(id: String) -> Result<Self, Self::Error> {
        Self::new(id)
    }
}

impl TryFrom<&str> for EntityId {
    type Error = EntcacheError;

    fn try_from(id: &str) -> Result<Self, Self::Error> {
        Self::new(id)
    }
}

impl From<EntityId> for String {
    fn from(id: EntityId) -> Self {
        id.0
    }
}
