//! # Storage Errors

use shared_types::IndexerError;
use thiserror::Error;

/// Failure modes of the storage engine.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StorageError {
    /// The backend is not reachable.
    #[error("storage backend not connected: {0}")]
    NotConnected(String),

    /// Insert rejected because the key already exists.
    #[error("duplicate key in {collection}: {key}")]
    Duplicate { collection: String, key: String },

    /// Concurrent writers raced on the same logical transaction.
    #[error("write conflict in {0}")]
    Conflict(String),

    /// The backend did not answer within its deadline.
    #[error("storage timeout during {0}")]
    Timeout(String),

    /// Stored bytes failed an integrity check.
    #[error("corruption detected in {collection}: {detail}")]
    Corruption { collection: String, detail: String },

    /// Record encoding or decoding failed.
    #[error("serialization failure: {0}")]
    Serialization(String),

    /// Any other backend failure.
    #[error("backend failure: {0}")]
    Backend(String),
}

impl From<bincode::Error> for StorageError {
    fn from(err: bincode::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

/// `Duplicate` maps to the domain `AlreadyExists` and is never retried.
impl From<StorageError> for IndexerError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::Duplicate { collection, key } => {
                IndexerError::AlreadyExists(format!("{collection}/{key}"))
            }
            StorageError::Timeout(op) => IndexerError::Timeout(op),
            other => IndexerError::Storage(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_duplicate_maps_to_already_exists() {
        let err: IndexerError = StorageError::Duplicate {
            collection: "contracts".into(),
            key: "oc1aa".into(),
        }
        .into();
        assert_eq!(err.code(), "ALREADY_EXISTS");
    }

    #[test]
    fn test_other_errors_map_to_storage() {
        let err: IndexerError = StorageError::NotConnected("db".into()).into();
        assert_eq!(err.code(), "STORAGE");
    }
}
