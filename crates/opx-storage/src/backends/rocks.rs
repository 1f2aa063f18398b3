//! # RocksDB Backend
//!
//! Production implementation of [`KeyValueBackend`]: one column family per
//! collection, snappy compression, atomic `WriteBatch` writes.

use crate::backend::{BatchOperation, KeyValueBackend};
use crate::error::StorageError;
use crate::keys::Collection;
use rocksdb::{
    ColumnFamilyDescriptor, DBWithThreadMode, Direction, IteratorMode, MultiThreaded, Options,
    WriteBatch,
};
use std::path::Path;
use std::sync::Arc;
use tracing::info;

type Db = DBWithThreadMode<MultiThreaded>;

/// RocksDB-backed store.
pub struct RocksBackend {
    db: Arc<Db>,
}

impl RocksBackend {
    /// Open (or create) the database at `path` with every collection's
    /// column family.
    pub fn open(path: &Path) -> Result<Self, StorageError> {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.create_missing_column_families(true);

        let descriptors: Vec<ColumnFamilyDescriptor> = Collection::ALL
            .iter()
            .map(|collection| ColumnFamilyDescriptor::new(collection.name(), Options::default()))
            .collect();

        let db = Db::open_cf_descriptors(&opts, path, descriptors)
            .map_err(|err| StorageError::NotConnected(err.to_string()))?;

        info!(path = %path.display(), "storage opened");
        Ok(Self { db: Arc::new(db) })
    }

    fn cf(&self, collection: Collection) -> Result<Arc<rocksdb::BoundColumnFamily<'_>>, StorageError> {
        self.db
            .cf_handle(collection.name())
            .ok_or_else(|| StorageError::Backend(format!("missing column family {}", collection.name())))
    }
}

impl KeyValueBackend for RocksBackend {
    fn get(&self, collection: Collection, key: &[u8]) -> Result<Option<Vec<u8>>, StorageError> {
        let cf = self.cf(collection)?;
        self.db
            .get_cf(&cf, key)
            .map_err(|err| StorageError::Backend(err.to_string()))
    }

    fn put(&self, collection: Collection, key: &[u8], value: &[u8]) -> Result<(), StorageError> {
        let cf = self.cf(collection)?;
        self.db
            .put_cf(&cf, key, value)
            .map_err(|err| StorageError::Backend(err.to_string()))
    }

    fn delete(&self, collection: Collection, key: &[u8]) -> Result<(), StorageError> {
        let cf = self.cf(collection)?;
        self.db
            .delete_cf(&cf, key)
            .map_err(|err| StorageError::Backend(err.to_string()))
    }

    fn write_batch(&self, operations: Vec<BatchOperation>) -> Result<(), StorageError> {
        let mut batch = WriteBatch::default();
        for op in operations {
            match op {
                BatchOperation::Put {
                    collection,
                    key,
                    value,
                } => {
                    let cf = self.cf(collection)?;
                    batch.put_cf(&cf, key, value);
                }
                BatchOperation::Delete { collection, key } => {
                    let cf = self.cf(collection)?;
                    batch.delete_cf(&cf, key);
                }
            }
        }
        self.db
            .write(batch)
            .map_err(|err| StorageError::Backend(err.to_string()))
    }

    fn scan_prefix(
        &self,
        collection: Collection,
        prefix: &[u8],
    ) -> Result<Vec<(Vec<u8>, Vec<u8>)>, StorageError> {
        let cf = self.cf(collection)?;
        let mut entries = Vec::new();
        let iter = self
            .db
            .iterator_cf(&cf, IteratorMode::From(prefix, Direction::Forward));
        for item in iter {
            let (key, value) = item.map_err(|err| StorageError::Backend(err.to_string()))?;
            if !key.starts_with(prefix) {
                break;
            }
            entries.push((key.to_vec(), value.to_vec()));
        }
        Ok(entries)
    }

    fn scan_range(
        &self,
        collection: Collection,
        start: &[u8],
        end: &[u8],
    ) -> Result<Vec<(Vec<u8>, Vec<u8>)>, StorageError> {
        let cf = self.cf(collection)?;
        let mut entries = Vec::new();
        let iter = self
            .db
            .iterator_cf(&cf, IteratorMode::From(start, Direction::Forward));
        for item in iter {
            let (key, value) = item.map_err(|err| StorageError::Backend(err.to_string()))?;
            if key.as_ref() >= end {
                break;
            }
            entries.push((key.to_vec(), value.to_vec()));
        }
        Ok(entries)
    }

    fn last(&self, collection: Collection) -> Result<Option<(Vec<u8>, Vec<u8>)>, StorageError> {
        let cf = self.cf(collection)?;
        let mut iter = self.db.iterator_cf(&cf, IteratorMode::End);
        match iter.next() {
            Some(item) => {
                let (key, value) = item.map_err(|err| StorageError::Backend(err.to_string()))?;
                Ok(Some((key.to_vec(), value.to_vec())))
            }
            None => Ok(None),
        }
    }
}
