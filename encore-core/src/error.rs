//! Error types for catalog operations

use std::time::Duration;
use thiserror::Error;

/// Relational store errors.
///
/// These are fatal for the request that hit them and are never retried here.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StorageError {
    #[error("Catalog store unavailable: {reason}")]
    Unavailable { reason: String },

    #[error("Malformed {table} row: {reason}")]
    MalformedRow { table: String, reason: String },

    #[error("Insert into {table} failed: {reason}")]
    InsertFailed { table: String, reason: String },

    #[error("Storage lock poisoned")]
    LockPoisoned,
}

/// Cache backend errors.
///
/// Always recovered by falling through to the store. They exist so that
/// backends can report "unreachable" separately from "absent".
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CacheError {
    #[error("Cache backend unavailable: {reason}")]
    Unavailable { reason: String },

    #[error("Cache {operation} timed out after {elapsed:?}")]
    Timeout {
        operation: &'static str,
        elapsed: Duration,
    },

    #[error("Cache entry serialization failed: {reason}")]
    Serialization { reason: String },
}

/// Validation errors for write payloads.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Required field missing: {field}")]
    RequiredFieldMissing { field: String },

    #[error("Field {field} is {actual} characters, limit is {max}")]
    TooLong {
        field: String,
        max: usize,
        actual: usize,
    },

    #[error("Referenced {entity} {id} does not exist")]
    MissingReference { entity: String, id: String },
}

/// Master error type for catalog operations.
#[derive(Debug, Clone, Error)]
pub enum CatalogError {
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Cache error: {0}")]
    Cache(#[from] CacheError),

    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),
}

/// Result type alias for catalog operations.
pub type CatalogResult<T> = Result<T, CatalogError>;

impl From<serde_json::Error> for CacheError {
    fn from(err: serde_json::Error) -> Self {
        CacheError::Serialization {
            reason: err.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_storage_error_display() {
        let err = StorageError::MalformedRow {
            table: "songs".to_string(),
            reason: "null title".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("songs"));
        assert!(msg.contains("null title"));
    }

    #[test]
    fn test_cache_timeout_display() {
        let err = CacheError::Timeout {
            operation: "get",
            elapsed: Duration::from_millis(100),
        };
        assert!(err.to_string().contains("get"));
    }

    #[test]
    fn test_catalog_error_from_layers() {
        let err: CatalogError = StorageError::Unavailable {
            reason: "refused".to_string(),
        }
        .into();
        assert!(matches!(err, CatalogError::Storage(_)));

        let err: CatalogError = CacheError::Unavailable {
            reason: "down".to_string(),
        }
        .into();
        assert!(err.to_string().starts_with("Cache error"));
    }

    #[test]
    fn test_serde_error_maps_to_serialization() {
        let bad = serde_json::from_str::<u32>("not json");
        let err = bad.map_err(CacheError::from);
        assert!(matches!(err, Err(CacheError::Serialization { .. })));
    }
}
