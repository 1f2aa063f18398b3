//! # Transaction Repository
//!
//! Indexed transactions keyed by indexing hash, with a height‖index
//! secondary index for reorg deletion, plus the mempool store backing
//! pending-transaction queries.

use super::{StorageEngine, WriteContext};
use crate::backend::BatchOperation;
use crate::error::StorageError;
use crate::keys::{self, Collection};
use shared_types::{Address, Hash, MempoolTransaction, Transaction};

impl StorageEngine {
    /// Persist the transactions of one block.
    pub fn save_block_transactions(
        &self,
        transactions: &[Transaction],
        ctx: Option<&mut WriteContext>,
    ) -> Result<(), StorageError> {
        let mut ops = Vec::with_capacity(transactions.len() * 2);
        for tx in transactions {
            ops.push(BatchOperation::put(
                Collection::Transactions,
                tx.hash.to_vec(),
                bincode::serialize(tx)?,
            ));
            ops.push(BatchOperation::put(
                Collection::TxByBlock,
                keys::tx_by_block_key(tx.block_height, tx.index_in_block),
                tx.hash.to_vec(),
            ));
        }
        self.apply(ctx, ops)
    }

    /// Transaction lookup by indexing hash.
    pub fn get_transaction_by_hash(
        &self,
        hash: &Hash,
    ) -> Result<Option<Transaction>, StorageError> {
        match self.backend().get(Collection::Transactions, hash)? {
            Some(bytes) => Ok(Some(bincode::deserialize(&bytes)?)),
            None => Ok(None),
        }
    }

    /// All transactions of one block, in block order.
    pub fn get_transactions_by_height(
        &self,
        height: u64,
    ) -> Result<Vec<Transaction>, StorageError> {
        let entries = self
            .backend()
            .scan_prefix(Collection::TxByBlock, &keys::height_key(height))?;
        let mut transactions = Vec::with_capacity(entries.len());
        for (_, hash) in entries {
            if let Some(bytes) = self.backend().get(Collection::Transactions, &hash)? {
                transactions.push(bincode::deserialize(&bytes)?);
            }
        }
        Ok(transactions)
    }

    /// Delete a specific set of transactions.
    pub fn delete_transactions_by_ids(
        &self,
        hashes: &[Hash],
        ctx: Option<&mut WriteContext>,
    ) -> Result<(), StorageError> {
        let mut ops = Vec::with_capacity(hashes.len() * 2);
        for hash in hashes {
            if let Some(tx) = self.get_transaction_by_hash(hash)? {
                ops.push(BatchOperation::delete(
                    Collection::TxByBlock,
                    keys::tx_by_block_key(tx.block_height, tx.index_in_block),
                ));
            }
            ops.push(BatchOperation::delete(Collection::Transactions, hash.to_vec()));
        }
        self.apply(ctx, ops)
    }

    /// Delete every transaction at or above `from_height`.
    pub fn delete_transactions_from(
        &self,
        from_height: u64,
        ctx: Option<&mut WriteContext>,
    ) -> Result<(), StorageError> {
        let entries = self
            .backend()
            .scan_range(
                Collection::TxByBlock,
                &keys::height_key(from_height),
                &[0xFF; 13],
            )?;
        let mut ops = Vec::with_capacity(entries.len() * 2);
        for (key, hash) in entries {
            ops.push(BatchOperation::delete(Collection::TxByBlock, key));
            ops.push(BatchOperation::delete(Collection::Transactions, hash));
        }
        self.apply(ctx, ops)
    }

    // =========================================================================
    // MEMPOOL
    // =========================================================================

    /// Store a pending transaction.
    pub fn save_pending_transaction(
        &self,
        pending: &MempoolTransaction,
        ctx: Option<&mut WriteContext>,
    ) -> Result<(), StorageError> {
        self.apply(
            ctx,
            vec![BatchOperation::put(
                Collection::Mempool,
                pending.transaction.hash.to_vec(),
                bincode::serialize(pending)?,
            )],
        )
    }

    /// One pending transaction by hash.
    pub fn get_pending_transaction(
        &self,
        hash: &Hash,
    ) -> Result<Option<MempoolTransaction>, StorageError> {
        match self.backend().get(Collection::Mempool, hash)? {
            Some(bytes) => Ok(Some(bincode::deserialize(&bytes)?)),
            None => Ok(None),
        }
    }

    /// Pending transactions whose recipients intersect `addresses`,
    /// oldest first, capped at `limit`. An empty filter matches all.
    pub fn get_pending_for_addresses(
        &self,
        addresses: &[Address],
        limit: usize,
    ) -> Result<Vec<MempoolTransaction>, StorageError> {
        let entries = self.backend().scan_prefix(Collection::Mempool, &[])?;
        let mut pending = Vec::new();
        for (_, bytes) in entries {
            let tx: MempoolTransaction = bincode::deserialize(&bytes)?;
            let matches = addresses.is_empty()
                || tx.recipients.iter().any(|r| addresses.contains(r));
            if matches {
                pending.push(tx);
            }
        }
        pending.sort_by_key(|tx| tx.first_seen);
        pending.truncate(limit);
        Ok(pending)
    }

    /// Drop pending entries, typically once their transactions are indexed.
    pub fn remove_pending_transactions(
        &self,
        hashes: &[Hash],
        ctx: Option<&mut WriteContext>,
    ) -> Result<(), StorageError> {
        let ops = hashes
            .iter()
            .map(|hash| BatchOperation::delete(Collection::Mempool, hash.to_vec()))
            .collect();
        self.apply(ctx, ops)
    }
}
