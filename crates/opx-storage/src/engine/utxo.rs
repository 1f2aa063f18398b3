//! # UTXO Repository
//!
//! Raw unspent-output persistence: upserts, tombstoning, reorg
//! restoration, retention purge, and address-indexed reads. The ledger
//! semantics (dust threshold, spent-set derivation) live in `opx-utxo`;
//! this layer only guarantees index consistency.

use super::{StorageEngine, WriteContext};
use crate::backend::BatchOperation;
use crate::error::StorageError;
use crate::keys::{self, Collection};
use shared_types::{Address, TxId, UnspentOutput};
use tracing::debug;

impl StorageEngine {
    /// Insert or update unspent outputs with their indexes.
    pub fn upsert_unspent_outputs(
        &self,
        outputs: &[UnspentOutput],
        ctx: Option<&mut WriteContext>,
    ) -> Result<(), StorageError> {
        let mut ops = Vec::with_capacity(outputs.len() * 3);
        for output in outputs {
            ops.extend(self.unspent_put_ops(output)?);
        }
        self.apply(ctx, ops)
    }

    fn unspent_put_ops(
        &self,
        output: &UnspentOutput,
    ) -> Result<Vec<BatchOperation>, StorageError> {
        let outpoint = keys::outpoint_key(&output.tx_id, output.output_index);
        let mut ops = vec![
            BatchOperation::put(
                Collection::Utxo,
                outpoint.clone(),
                bincode::serialize(output)?,
            ),
            BatchOperation::put(
                Collection::UtxoByHeight,
                {
                    let mut key = keys::height_key(output.block_height).to_vec();
                    key.extend_from_slice(&outpoint);
                    key
                },
                Vec::new(),
            ),
        ];
        if let Some(address) = &output.address {
            ops.push(BatchOperation::put(
                Collection::UtxoByAddress,
                keys::utxo_address_key(address, &output.tx_id, output.output_index),
                output.value.to_be_bytes().to_vec(),
            ));
        }
        if let Some(spent_at) = output.deleted_at_block {
            let mut key = keys::height_key(spent_at).to_vec();
            key.extend_from_slice(&outpoint);
            ops.push(BatchOperation::put(
                Collection::UtxoTombstoneByHeight,
                key,
                Vec::new(),
            ));
        }
        Ok(ops)
    }

    /// One output by outpoint, live or tombstoned.
    pub fn get_unspent_output(
        &self,
        tx_id: &TxId,
        output_index: u32,
    ) -> Result<Option<UnspentOutput>, StorageError> {
        match self
            .backend()
            .get(Collection::Utxo, &keys::outpoint_key(tx_id, output_index))?
        {
            Some(bytes) => Ok(Some(bincode::deserialize(&bytes)?)),
            None => Ok(None),
        }
    }

    /// Tombstone spent outputs with the spending height.
    ///
    /// Outputs stay queryable for reorg restoration until the retention
    /// policy purges them.
    pub fn mark_outputs_spent(
        &self,
        outpoints: &[(TxId, u32)],
        spent_at_height: u64,
        ctx: Option<&mut WriteContext>,
    ) -> Result<(), StorageError> {
        let mut ops = Vec::with_capacity(outpoints.len() * 2);
        for (tx_id, output_index) in outpoints {
            let Some(mut output) = self.get_unspent_output(tx_id, *output_index)? else {
                continue;
            };
            output.deleted_at_block = Some(spent_at_height);
            let outpoint = keys::outpoint_key(tx_id, *output_index);
            ops.push(BatchOperation::put(
                Collection::Utxo,
                outpoint.clone(),
                bincode::serialize(&output)?,
            ));
            ops.push(BatchOperation::put(
                Collection::UtxoTombstoneByHeight,
                {
                    let mut key = keys::height_key(spent_at_height).to_vec();
                    key.extend_from_slice(&outpoint);
                    key
                },
                Vec::new(),
            ));
        }
        self.apply(ctx, ops)
    }

    /// Every output of one address, live and tombstoned.
    pub fn get_outputs_for_address(
        &self,
        address: &Address,
    ) -> Result<Vec<UnspentOutput>, StorageError> {
        let prefix = keys::utxo_address_prefix(address);
        let entries = self.backend().scan_prefix(Collection::UtxoByAddress, &prefix)?;
        let mut outputs = Vec::with_capacity(entries.len());
        for (key, _) in entries {
            let outpoint = &key[prefix.len()..];
            if let Some(bytes) = self.backend().get(Collection::Utxo, outpoint)? {
                outputs.push(bincode::deserialize(&bytes)?);
            }
        }
        Ok(outputs)
    }

    /// Reorg restoration: remove outputs created at or above `from_height`
    /// and clear tombstones set at or above it.
    pub fn delete_utxos_from(
        &self,
        from_height: u64,
        ctx: Option<&mut WriteContext>,
    ) -> Result<(), StorageError> {
        let mut ops = Vec::new();

        // Outputs created by rolled-back blocks disappear entirely.
        let created = self.backend().scan_range(
            Collection::UtxoByHeight,
            &keys::height_key(from_height),
            &[0xFF; 9],
        )?;
        for (key, _) in created {
            let outpoint = key[8..].to_vec();
            if let Some(bytes) = self.backend().get(Collection::Utxo, &outpoint)? {
                let output: UnspentOutput = bincode::deserialize(&bytes)?;
                if let Some(address) = &output.address {
                    ops.push(BatchOperation::delete(
                        Collection::UtxoByAddress,
                        keys::utxo_address_key(address, &output.tx_id, output.output_index),
                    ));
                }
                if let Some(spent_at) = output.deleted_at_block {
                    let mut tombstone_key = keys::height_key(spent_at).to_vec();
                    tombstone_key.extend_from_slice(&outpoint);
                    ops.push(BatchOperation::delete(
                        Collection::UtxoTombstoneByHeight,
                        tombstone_key,
                    ));
                }
            }
            ops.push(BatchOperation::delete(Collection::Utxo, outpoint));
            ops.push(BatchOperation::delete(Collection::UtxoByHeight, key));
        }

        // Outputs spent by rolled-back blocks become live again.
        let tombstoned = self.backend().scan_range(
            Collection::UtxoTombstoneByHeight,
            &keys::height_key(from_height),
            &[0xFF; 9],
        )?;
        for (key, _) in tombstoned {
            let outpoint = key[8..].to_vec();
            if let Some(bytes) = self.backend().get(Collection::Utxo, &outpoint)? {
                let mut output: UnspentOutput = bincode::deserialize(&bytes)?;
                // Skip outputs already deleted by the creation sweep.
                if output.block_height < from_height {
                    output.deleted_at_block = None;
                    ops.push(BatchOperation::put(
                        Collection::Utxo,
                        outpoint,
                        bincode::serialize(&output)?,
                    ));
                }
            }
            ops.push(BatchOperation::delete(Collection::UtxoTombstoneByHeight, key));
        }

        debug!(from_height, ops = ops.len(), "utxo rollback prepared");
        self.apply(ctx, ops)
    }

    /// Retention: physically delete outputs tombstoned at or below
    /// `height_limit`. Returns the number purged.
    pub fn purge_spent_older_than(
        &self,
        height_limit: u64,
        ctx: Option<&mut WriteContext>,
    ) -> Result<usize, StorageError> {
        let Some(end) = height_limit.checked_add(1) else {
            return Ok(0);
        };
        let tombstoned = self.backend().scan_range(
            Collection::UtxoTombstoneByHeight,
            &keys::height_key(0),
            &keys::height_key(end),
        )?;

        let mut ops = Vec::with_capacity(tombstoned.len() * 3);
        let mut purged = 0usize;
        for (key, _) in tombstoned {
            let outpoint = key[8..].to_vec();
            if let Some(bytes) = self.backend().get(Collection::Utxo, &outpoint)? {
                let output: UnspentOutput = bincode::deserialize(&bytes)?;
                if let Some(address) = &output.address {
                    ops.push(BatchOperation::delete(
                        Collection::UtxoByAddress,
                        keys::utxo_address_key(address, &output.tx_id, output.output_index),
                    ));
                }
                let mut height_key = keys::height_key(output.block_height).to_vec();
                height_key.extend_from_slice(&outpoint);
                ops.push(BatchOperation::delete(Collection::UtxoByHeight, height_key));
                purged += 1;
            }
            ops.push(BatchOperation::delete(Collection::Utxo, outpoint));
            ops.push(BatchOperation::delete(Collection::UtxoTombstoneByHeight, key));
        }
        self.apply(ctx, ops)?;
        Ok(purged)
    }
}
