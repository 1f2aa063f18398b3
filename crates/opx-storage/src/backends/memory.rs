//! # In-Memory Backend
//!
//! `BTreeMap`-backed implementation of [`KeyValueBackend`] used by unit
//! and integration tests. Atomicity of batches follows from holding the
//! write lock for the whole batch.

use crate::backend::{BatchOperation, KeyValueBackend};
use crate::error::StorageError;
use crate::keys::Collection;
use std::collections::{BTreeMap, HashMap};
use std::sync::RwLock;

type Table = BTreeMap<Vec<u8>, Vec<u8>>;

/// In-memory store, one ordered table per collection.
#[derive(Debug, Default)]
pub struct MemoryBackend {
    tables: RwLock<HashMap<&'static str, Table>>,
}

impl MemoryBackend {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn poisoned() -> StorageError {
        StorageError::NotConnected("memory backend lock poisoned".into())
    }
}

impl KeyValueBackend for MemoryBackend {
    fn get(&self, collection: Collection, key: &[u8]) -> Result<Option<Vec<u8>>, StorageError> {
        let tables = self.tables.read().map_err(|_| Self::poisoned())?;
        Ok(tables
            .get(collection.name())
            .and_then(|table| table.get(key).cloned()))
    }

    fn put(&self, collection: Collection, key: &[u8], value: &[u8]) -> Result<(), StorageError> {
        let mut tables = self.tables.write().map_err(|_| Self::poisoned())?;
        tables
            .entry(collection.name())
            .or_default()
            .insert(key.to_vec(), value.to_vec());
        Ok(())
    }

    fn delete(&self, collection: Collection, key: &[u8]) -> Result<(), StorageError> {
        let mut tables = self.tables.write().map_err(|_| Self::poisoned())?;
        if let Some(table) = tables.get_mut(collection.name()) {
            table.remove(key);
        }
        Ok(())
    }

    fn write_batch(&self, operations: Vec<BatchOperation>) -> Result<(), StorageError> {
        let mut tables = self.tables.write().map_err(|_| Self::poisoned())?;
        for op in operations {
            match op {
                BatchOperation::Put {
                    collection,
                    key,
                    value,
                } => {
                    tables.entry(collection.name()).or_default().insert(key, value);
                }
                BatchOperation::Delete { collection, key } => {
                    if let Some(table) = tables.get_mut(collection.name()) {
                        table.remove(&key);
                    }
                }
            }
        }
        Ok(())
    }

    fn scan_prefix(
        &self,
        collection: Collection,
        prefix: &[u8],
    ) -> Result<Vec<(Vec<u8>, Vec<u8>)>, StorageError> {
        let tables = self.tables.read().map_err(|_| Self::poisoned())?;
        let Some(table) = tables.get(collection.name()) else {
            return Ok(Vec::new());
        };
        Ok(table
            .range(prefix.to_vec()..)
            .take_while(|(key, _)| key.starts_with(prefix))
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect())
    }

    fn scan_range(
        &self,
        collection: Collection,
        start: &[u8],
        end: &[u8],
    ) -> Result<Vec<(Vec<u8>, Vec<u8>)>, StorageError> {
        let tables = self.tables.read().map_err(|_| Self::poisoned())?;
        let Some(table) = tables.get(collection.name()) else {
            return Ok(Vec::new());
        };
        Ok(table
            .range(start.to_vec()..end.to_vec())
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect())
    }

    fn last(&self, collection: Collection) -> Result<Option<(Vec<u8>, Vec<u8>)>, StorageError> {
        let tables = self.tables.read().map_err(|_| Self::poisoned())?;
        Ok(tables
            .get(collection.name())
            .and_then(|table| table.iter().next_back())
            .map(|(key, value)| (key.clone(), value.clone())))
    }
}
