//! # Key-Value Backend Port
//!
//! The storage engine talks to persistence exclusively through this
//! trait. Batched writes are atomic: either every operation lands or
//! none does.

use crate::error::StorageError;
use crate::keys::Collection;

/// One operation of an atomic batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BatchOperation {
    Put {
        collection: Collection,
        key: Vec<u8>,
        value: Vec<u8>,
    },
    Delete {
        collection: Collection,
        key: Vec<u8>,
    },
}

impl BatchOperation {
    #[must_use]
    pub fn put(collection: Collection, key: Vec<u8>, value: Vec<u8>) -> Self {
        Self::Put {
            collection,
            key,
            value,
        }
    }

    #[must_use]
    pub fn delete(collection: Collection, key: Vec<u8>) -> Self {
        Self::Delete { collection, key }
    }
}

/// Synchronous key-value backend with atomic batches and prefix scans.
///
/// Scans return entries in ascending key order.
pub trait KeyValueBackend: Send + Sync {
    /// Read one key.
    fn get(&self, collection: Collection, key: &[u8]) -> Result<Option<Vec<u8>>, StorageError>;

    /// Write one key.
    fn put(&self, collection: Collection, key: &[u8], value: &[u8]) -> Result<(), StorageError>;

    /// Delete one key.
    fn delete(&self, collection: Collection, key: &[u8]) -> Result<(), StorageError>;

    /// Apply every operation atomically.
    fn write_batch(&self, operations: Vec<BatchOperation>) -> Result<(), StorageError>;

    /// All entries whose key starts with `prefix`, ascending.
    fn scan_prefix(
        &self,
        collection: Collection,
        prefix: &[u8],
    ) -> Result<Vec<(Vec<u8>, Vec<u8>)>, StorageError>;

    /// All entries with `start <= key < end`, ascending.
    fn scan_range(
        &self,
        collection: Collection,
        start: &[u8],
        end: &[u8],
    ) -> Result<Vec<(Vec<u8>, Vec<u8>)>, StorageError>;

    /// The entry with the greatest key in the collection.
    fn last(&self, collection: Collection) -> Result<Option<(Vec<u8>, Vec<u8>)>, StorageError>;
}
