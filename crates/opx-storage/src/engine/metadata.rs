//! # Metadata, Witnesses, Reorg Records

use super::{StorageEngine, WriteContext};
use crate::backend::BatchOperation;
use crate::error::StorageError;
use crate::keys::{self, Collection};
use shared_types::{BlockProcessedData, ReorgRecord};

impl StorageEngine {
    /// Persist the processed digest of a block for peer witnessing.
    pub fn save_block_witness(
        &self,
        digest: &BlockProcessedData,
        ctx: Option<&mut WriteContext>,
    ) -> Result<(), StorageError> {
        self.apply(
            ctx,
            vec![BatchOperation::put(
                Collection::Witnesses,
                keys::height_key(digest.height).to_vec(),
                bincode::serialize(digest)?,
            )],
        )
    }

    /// Witness digest for one height.
    pub fn get_block_witness(
        &self,
        height: u64,
    ) -> Result<Option<BlockProcessedData>, StorageError> {
        match self
            .backend()
            .get(Collection::Witnesses, &keys::height_key(height))?
        {
            Some(bytes) => Ok(Some(bincode::deserialize(&bytes)?)),
            None => Ok(None),
        }
    }

    /// Delete witnesses at or above `from_height`.
    pub fn delete_witnesses_from(
        &self,
        from_height: u64,
        ctx: Option<&mut WriteContext>,
    ) -> Result<(), StorageError> {
        let entries = self.backend().scan_range(
            Collection::Witnesses,
            &keys::height_key(from_height),
            &[0xFF; 9],
        )?;
        let ops = entries
            .into_iter()
            .map(|(key, _)| BatchOperation::delete(Collection::Witnesses, key))
            .collect();
        self.apply(ctx, ops)
    }

    /// Append a reorg audit record.
    pub fn record_reorg(
        &self,
        record: &ReorgRecord,
        ctx: Option<&mut WriteContext>,
    ) -> Result<(), StorageError> {
        let mut key = record.timestamp.to_be_bytes().to_vec();
        key.extend_from_slice(&record.from_block.to_be_bytes());
        self.apply(
            ctx,
            vec![BatchOperation::put(
                Collection::Reorgs,
                key,
                bincode::serialize(record)?,
            )],
        )
    }

    /// All reorg records, oldest first.
    pub fn list_reorgs(&self) -> Result<Vec<ReorgRecord>, StorageError> {
        let entries = self.backend().scan_prefix(Collection::Reorgs, &[])?;
        entries
            .iter()
            .map(|(_, bytes)| bincode::deserialize(bytes).map_err(StorageError::from))
            .collect()
    }
}
