//! # Block Header Repository
//!
//! Headers are keyed by height; hash and checksum lookups go through
//! secondary indexes. Stored records carry a crc32 computed at write time
//! and verified on every read.

use super::{StorageEngine, WriteContext};
use crate::backend::BatchOperation;
use crate::error::StorageError;
use crate::keys::{self, height_key, Collection};
use serde::{Deserialize, Serialize};
use shared_types::{BlockHeader, Hash};
use tracing::debug;

#[derive(Debug, Serialize, Deserialize)]
struct HeaderRecord {
    header: BlockHeader,
    crc32: u32,
}

fn encode_header(header: &BlockHeader) -> Result<Vec<u8>, StorageError> {
    let body = bincode::serialize(header)?;
    let record = HeaderRecord {
        header: header.clone(),
        crc32: crc32fast::hash(&body),
    };
    Ok(bincode::serialize(&record)?)
}

fn decode_header(bytes: &[u8]) -> Result<BlockHeader, StorageError> {
    let record: HeaderRecord = bincode::deserialize(bytes)?;
    let body = bincode::serialize(&record.header)?;
    if crc32fast::hash(&body) != record.crc32 {
        return Err(StorageError::Corruption {
            collection: Collection::Blocks.name().to_string(),
            detail: format!("crc mismatch for block {}", record.header.height),
        });
    }
    Ok(record.header)
}

impl StorageEngine {
    /// Persist one header with its hash/checksum indexes.
    pub fn save_block_header(
        &self,
        header: &BlockHeader,
        ctx: Option<&mut WriteContext>,
    ) -> Result<(), StorageError> {
        let mut ops = self.header_ops(header)?;
        ops.push(self.tip_update_op(header.height)?);
        self.apply(ctx, ops)
    }

    /// Persist a batch of headers. Bulk writes are unordered; the tip is
    /// advanced to the greatest height in the batch.
    pub fn save_block_headers(
        &self,
        headers: &[BlockHeader],
        ctx: Option<&mut WriteContext>,
    ) -> Result<(), StorageError> {
        let mut ops = Vec::with_capacity(headers.len() * 3 + 1);
        for header in headers {
            ops.extend(self.header_ops(header)?);
        }
        if let Some(max) = headers.iter().map(|h| h.height).max() {
            ops.push(self.tip_update_op(max)?);
        }
        self.apply(ctx, ops)
    }

    fn header_ops(&self, header: &BlockHeader) -> Result<Vec<BatchOperation>, StorageError> {
        let encoded = encode_header(header)?;
        Ok(vec![
            BatchOperation::put(Collection::Blocks, height_key(header.height).to_vec(), encoded),
            BatchOperation::put(
                Collection::BlockByHash,
                header.hash.to_vec(),
                height_key(header.height).to_vec(),
            ),
            BatchOperation::put(
                Collection::BlockByChecksum,
                header.checksum_root.to_vec(),
                height_key(header.height).to_vec(),
            ),
        ])
    }

    fn tip_update_op(&self, candidate: u64) -> Result<BatchOperation, StorageError> {
        let tip = self.max_block_height()?.map_or(candidate, |t| t.max(candidate));
        Ok(BatchOperation::put(
            Collection::Metadata,
            keys::meta::CHAIN_TIP.to_vec(),
            tip.to_be_bytes().to_vec(),
        ))
    }

    /// Header at `height`, verifying the stored crc.
    pub fn get_block_header(&self, height: u64) -> Result<Option<BlockHeader>, StorageError> {
        match self.backend().get(Collection::Blocks, &height_key(height))? {
            Some(bytes) => Ok(Some(decode_header(&bytes)?)),
            None => Ok(None),
        }
    }

    /// The header at the chain tip.
    pub fn get_latest_block(&self) -> Result<Option<BlockHeader>, StorageError> {
        match self.max_block_height()? {
            Some(tip) => self.get_block_header(tip),
            None => Ok(None),
        }
    }

    /// Highest persisted height.
    pub fn max_block_height(&self) -> Result<Option<u64>, StorageError> {
        match self
            .backend()
            .get(Collection::Metadata, keys::meta::CHAIN_TIP)?
        {
            Some(bytes) => Ok(keys::decode_height(&bytes)),
            None => Ok(None),
        }
    }

    /// Header lookup by base-chain block hash.
    pub fn get_block_by_hash(&self, hash: &Hash) -> Result<Option<BlockHeader>, StorageError> {
        self.get_by_index(Collection::BlockByHash, hash)
    }

    /// Header lookup by checksum root. Distinct from
    /// [`Self::get_block_by_hash`]; the two indexes are separate.
    pub fn get_block_by_checksum(
        &self,
        checksum: &Hash,
    ) -> Result<Option<BlockHeader>, StorageError> {
        self.get_by_index(Collection::BlockByChecksum, checksum)
    }

    fn get_by_index(
        &self,
        index: Collection,
        key: &Hash,
    ) -> Result<Option<BlockHeader>, StorageError> {
        match self.backend().get(index, key)? {
            Some(bytes) => match keys::decode_height(&bytes) {
                Some(height) => self.get_block_header(height),
                None => Err(StorageError::Corruption {
                    collection: index.name().to_string(),
                    detail: "malformed height pointer".into(),
                }),
            },
            None => Ok(None),
        }
    }

    /// Headers with `lo <= height <= hi`, ascending.
    pub fn get_headers_in_range(
        &self,
        lo: u64,
        hi: u64,
    ) -> Result<Vec<BlockHeader>, StorageError> {
        if hi < lo {
            return Ok(Vec::new());
        }
        let end = hi
            .checked_add(1)
            .map_or_else(|| vec![0xFF; 9], |h| height_key(h).to_vec());
        let entries =
            self.backend()
                .scan_range(Collection::Blocks, &height_key(lo), &end)?;
        entries.iter().map(|(_, value)| decode_header(value)).collect()
    }

    /// Delete every header at or above `from_height`, including indexes,
    /// and rewind the tip.
    pub fn delete_block_headers_from(
        &self,
        from_height: u64,
        ctx: Option<&mut WriteContext>,
    ) -> Result<(), StorageError> {
        let entries = self
            .backend()
            .scan_prefix(Collection::Blocks, &[])?
            .into_iter()
            .filter(|(key, _)| keys::decode_height(key).is_some_and(|h| h >= from_height))
            .collect::<Vec<_>>();

        let mut ops = Vec::with_capacity(entries.len() * 3 + 1);
        for (key, value) in &entries {
            let header = decode_header(value)?;
            ops.push(BatchOperation::delete(Collection::Blocks, key.clone()));
            ops.push(BatchOperation::delete(
                Collection::BlockByHash,
                header.hash.to_vec(),
            ));
            ops.push(BatchOperation::delete(
                Collection::BlockByChecksum,
                header.checksum_root.to_vec(),
            ));
        }

        let new_tip_op = if from_height == 0 {
            BatchOperation::delete(Collection::Metadata, keys::meta::CHAIN_TIP.to_vec())
        } else {
            BatchOperation::put(
                Collection::Metadata,
                keys::meta::CHAIN_TIP.to_vec(),
                (from_height - 1).to_be_bytes().to_vec(),
            )
        };
        ops.push(new_tip_op);

        debug!(from_height, deleted = entries.len(), "block headers deleted");
        self.apply(ctx, ops)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::memory::MemoryBackend;
    use std::sync::Arc;

    fn engine() -> StorageEngine {
        StorageEngine::new(Arc::new(MemoryBackend::new()))
    }

    fn header(height: u64) -> BlockHeader {
        BlockHeader {
            height,
            hash: [height as u8; 32],
            previous_block_hash: [height.wrapping_sub(1) as u8; 32],
            previous_block_checksum: [0u8; 32],
            storage_root: [1u8; 32],
            receipt_root: [2u8; 32],
            checksum_root: [height as u8 + 100; 32],
            checksum_proofs: vec![],
            pow_preimage: None,
            time: 1_700_000_000 + height,
            median_time: 1_700_000_000,
            tx_count: 0,
        }
    }

    #[test]
    fn test_save_then_read_roundtrip() {
        let engine = engine();
        let h = header(5);
        engine.save_block_header(&h, None).unwrap();
        assert_eq!(engine.get_block_header(5).unwrap(), Some(h.clone()));
        assert_eq!(engine.get_block_by_hash(&h.hash).unwrap(), Some(h.clone()));
        assert_eq!(
            engine.get_block_by_checksum(&h.checksum_root).unwrap(),
            Some(h)
        );
        assert_eq!(engine.max_block_height().unwrap(), Some(5));
    }

    #[test]
    fn test_batch_save_sets_tip_to_max() {
        let engine = engine();
        engine
            .save_block_headers(&[header(3), header(1), header(2)], None)
            .unwrap();
        assert_eq!(engine.max_block_height().unwrap(), Some(3));
        assert_eq!(engine.get_latest_block().unwrap().unwrap().height, 3);
    }

    #[test]
    fn test_range_read_is_ordered() {
        let engine = engine();
        engine
            .save_block_headers(&[header(1), header(2), header(3), header(4)], None)
            .unwrap();
        let range = engine.get_headers_in_range(2, 3).unwrap();
        assert_eq!(
            range.iter().map(|h| h.height).collect::<Vec<_>>(),
            vec![2, 3]
        );
    }

    #[test]
    fn test_delete_from_rewinds_tip_and_indexes() {
        let engine = engine();
        engine
            .save_block_headers(&[header(1), header(2), header(3)], None)
            .unwrap();
        engine.delete_block_headers_from(2, None).unwrap();

        assert_eq!(engine.max_block_height().unwrap(), Some(1));
        assert!(engine.get_block_header(2).unwrap().is_none());
        assert!(engine.get_block_header(3).unwrap().is_none());
        assert!(engine.get_block_by_hash(&header(3).hash).unwrap().is_none());
        assert!(engine.get_block_header(1).unwrap().is_some());
    }

    #[test]
    fn test_corrupted_record_is_detected() {
        let engine = engine();
        let h = header(9);
        engine.save_block_header(&h, None).unwrap();

        // Flip a byte in the stored record.
        let key = height_key(9);
        let mut bytes = engine.backend().get(Collection::Blocks, &key).unwrap().unwrap();
        let last = bytes.len() - 20;
        bytes[last] ^= 0xFF;
        engine.backend().put(Collection::Blocks, &key, &bytes).unwrap();

        assert!(matches!(
            engine.get_block_header(9),
            Err(StorageError::Corruption { .. }) | Err(StorageError::Serialization(_))
        ));
    }
}
