//! Error types for entcache operations

use crate::EntityId;
use thiserror::Error;

/// Entity store errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StorageError {
    #[error("Entity not found: {table} with id {id}")]
    NotFound { table: String, id: EntityId },

    #[error("Insert failed for {table}: {reason}")]
    InsertFailed { table: String, reason: String },

    #[error("Lookup failed for {table}: {reason}")]
    LookupFailed { table: String, reason: String },

    #[error("Storage lock poisoned")]
    LockPoisoned,
}

/// Cache backend errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CacheError {
    #[error("Cache backend {backend} failed: {reason}")]
    Backend { backend: String, reason: String },

    #[error("Serialization error: {reason}")]
    Serialization { reason: String },

    #[error("Type mismatch: expected {expected}, found {found}")]
    TypeMismatch { expected: String, found: String },

    #[error("Cache lock poisoned")]
    LockPoisoned,
}

/// Relation accessor errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RelationError {
    #[error("Relation {relation} on {table} requires {field}, which is not set")]
    MissingKey {
        table: String,
        relation: String,
        field: String,
    },

    #[error("Unknown relation {relation} on {table}")]
    Unknown { table: String, relation: String },
}

/// Validation errors raised while registering entity types.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Entity type {table} does not opt into relation caching")]
    NotCacheable { table: String },

    #[error("Invalid key segment {segment:?}: {reason}")]
    InvalidKeySegment { segment: String, reason: String },

    #[error("Relation {relation} declared twice on {table}")]
    DuplicateRelation { table: String, relation: String },
}

/// Configuration errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Invalid value for {field}: {value} - {reason}")]
    InvalidValue {
        field: String,
        value: String,
        reason: String,
    },
}

/// Master error type for all entcache errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum EntcacheError {
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Cache error: {0}")]
    Cache(#[from] CacheError),

    #[error("Relation error: {0}")]
    Relation(#[from] RelationError),

    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("Config error: {0}")]
    Config(#[from] ConfigError),
}

impl From<serde_json::Error> for EntcacheError {
    fn from(e: serde_json::Error) -> Self {
        EntcacheError::Cache(CacheError::Serialization {
            reason: e.to_string(),
        })
    }
}

/// Result type alias for entcache operations.
pub type EntcacheResult<T> = Result<T, EntcacheError>;

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_storage_error_display_not_found() {
        let err = StorageError::NotFound {
            table: "products".to_string(),
            id: EntityId::from(7u64),
        };
        let msg = format!("{}", err);
        assert!(msg.contains("Entity not found"));
        assert!(msg.contains("products"));
        assert!(msg.contains('7'));
    }

    #[test]
    fn test_relation_error_display_missing_key() {
        let err = RelationError::MissingKey {
            table: "reviews".to_string(),
            relation: "product".to_string(),
            field: "product_id".to_string(),
        };
        let msg = format!("{}", err);
        assert!(msg.contains("product_id"));
        assert!(msg.contains("reviews"));
    }

    #[test]
    fn test_validation_error_display_invalid_segment() {
        let err = ValidationError::InvalidKeySegment {
            segment: "order_items".to_string(),
            reason: "contains '_'".to_string(),
        };
        let msg = format!("{}", err);
        assert!(msg.contains("order_items"));
        assert!(msg.contains("contains '_'"));
    }

    #[test]
    fn test_serde_json_error_maps_to_serialization() {
        let err: EntcacheError = serde_json::from_str::<u32>("not json")
            .map_err(EntcacheError::from)
            .unwrap_err();
        assert!(matches!(
            err,
            EntcacheError::Cache(CacheError::Serialization { .. })
        ));
    }

    #[test]
    fn test_entcache_error_from_variants() {
        let storage = EntcacheError::from(StorageError::LockPoisoned);
        assert!(matches!(storage, EntcacheError::Storage(_)));

        let cache = EntcacheError::from(CacheError::LockPoisoned);
        assert!(matches!(cache, EntcacheError::Cache(_)));

        let relation = EntcacheError::from(RelationError::Unknown {
            table: "products".to_string(),
            relation: "nope".to_string(),
        });
        assert!(matches!(relation, EntcacheError::Relation(_)));

        let validation = EntcacheError::from(ValidationError::NotCacheable {
            table: "vendors".to_string(),
        });
        assert!(matches!(validation, EntcacheError::Validation(_)));

        let config = EntcacheError::from(ConfigError::InvalidValue {
            field: "default_ttl".to_string(),
            value: "0s".to_string(),
            reason: "must be positive".to_string(),
        });
        assert!(matches!(config, EntcacheError::Config(_)));
    }
}
