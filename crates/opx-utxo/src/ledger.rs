//! # Ledger Service
//!
//! Block-level UTXO bookkeeping over the storage engine's raw UTXO
//! repository.

use crate::script::classify_script;
use opx_storage::{StorageEngine, StorageError, WriteContext};
use shared_types::{Address, Satoshis, Transaction, TransactionType, TxId, UnspentOutput};
use tracing::{debug, info};

/// Ledger configuration.
#[derive(Debug, Clone)]
pub struct UtxoConfig {
    /// Outputs below this value are not tracked.
    pub dust_threshold: Satoshis,
    /// Whether the retention sweep runs at all.
    pub purge_enabled: bool,
    /// Tombstones older than `height − purge_window` are purged.
    pub purge_window: u64,
    /// `filter_ordinals` balance queries skip outputs at or below this
    /// value (inscription postage is dust-sized).
    pub ordinal_value_ceiling: Satoshis,
}

impl Default for UtxoConfig {
    fn default() -> Self {
        Self {
            dust_threshold: 330,
            purge_enabled: false,
            purge_window: 1_000,
            ordinal_value_ceiling: 546,
        }
    }
}

/// The UTXO ledger.
#[derive(Clone)]
pub struct UtxoLedger {
    storage: StorageEngine,
    config: UtxoConfig,
}

impl UtxoLedger {
    #[must_use]
    pub fn new(storage: StorageEngine, config: UtxoConfig) -> Self {
        Self { storage, config }
    }

    /// Apply one block's transactions to the ledger.
    ///
    /// Derives the spent set from inputs and the unspent set from outputs
    /// at or above the dust threshold with a recoverable address, then
    /// upserts and tombstones through the caller's write context.
    pub fn insert_block_transactions(
        &self,
        transactions: &[Transaction],
        height: u64,
        ctx: Option<&mut WriteContext>,
    ) -> Result<(), StorageError> {
        let mut spent: Vec<(TxId, u32)> = Vec::new();
        let mut unspent: Vec<UnspentOutput> = Vec::new();

        for tx in transactions {
            if tx.kind != TransactionType::Coinbase {
                for input in &tx.inputs {
                    spent.push((input.original_tx_id, input.output_index));
                }
            }

            for (index, output) in tx.outputs.iter().enumerate() {
                if output.value < self.config.dust_threshold {
                    continue;
                }
                let address = output
                    .address
                    .clone()
                    .or_else(|| classify_script(&output.script_pub_key));
                let Some(address) = address else {
                    continue;
                };
                unspent.push(UnspentOutput {
                    tx_id: tx.id,
                    output_index: index as u32,
                    value: output.value,
                    script_pub_key: output.script_pub_key.clone(),
                    address: Some(address),
                    block_height: height,
                    deleted_at_block: None,
                });
            }
        }

        // Intra-block spends: an output created and consumed in the same
        // block is tombstoned directly, never hitting the backend live.
        spent.retain(|outpoint| {
            match unspent.iter_mut().find(|o| o.outpoint() == *outpoint) {
                Some(output) => {
                    output.deleted_at_block = Some(height);
                    false
                }
                None => true,
            }
        });

        debug!(
            height,
            spent = spent.len(),
            unspent = unspent.len(),
            "ledger block derived"
        );

        match ctx {
            Some(ctx) => {
                self.storage.upsert_unspent_outputs(&unspent, Some(&mut *ctx))?;
                self.storage.mark_outputs_spent(&spent, height, Some(ctx))?;
            }
            None => {
                self.storage.upsert_unspent_outputs(&unspent, None)?;
                self.storage.mark_outputs_spent(&spent, height, None)?;
            }
        }
        Ok(())
    }

    /// Run the retention sweep for the given tip height.
    ///
    /// No-op unless purging is enabled. Returns the number of tombstones
    /// physically removed.
    pub fn run_retention(&self, tip_height: u64) -> Result<usize, StorageError> {
        if !self.config.purge_enabled {
            return Ok(0);
        }
        let Some(limit) = tip_height.checked_sub(self.config.purge_window) else {
            return Ok(0);
        };
        let purged = self.storage.purge_spent_older_than(limit, None)?;
        if purged > 0 {
            info!(tip_height, purged, "spent outputs purged");
        }
        Ok(purged)
    }

    /// Balance of an address over its live outputs.
    ///
    /// With `filter_ordinals`, outputs at or below the ordinal value
    /// ceiling are excluded.
    pub fn balance_of(
        &self,
        address: &Address,
        filter_ordinals: bool,
    ) -> Result<Satoshis, StorageError> {
        let outputs = self.storage.get_outputs_for_address(address)?;
        Ok(outputs
            .iter()
            .filter(|o| o.is_live())
            .filter(|o| !filter_ordinals || o.value > self.config.ordinal_value_ceiling)
            .map(|o| o.value)
            .sum())
    }

    /// Live outputs of an address.
    ///
    /// With `optimize`, outputs are returned largest-first (fewest inputs
    /// to fund a spend); otherwise in (height, outpoint) order.
    pub fn unspent_of(
        &self,
        address: &Address,
        optimize: bool,
        limit: usize,
    ) -> Result<Vec<UnspentOutput>, StorageError> {
        let mut outputs: Vec<UnspentOutput> = self
            .storage
            .get_outputs_for_address(address)?
            .into_iter()
            .filter(UnspentOutput::is_live)
            .collect();

        if optimize {
            outputs.sort_by(|a, b| b.value.cmp(&a.value));
        } else {
            outputs.sort_by(|a, b| {
                (a.block_height, a.tx_id, a.output_index)
                    .cmp(&(b.block_height, b.tx_id, b.output_index))
            });
        }
        outputs.truncate(limit);
        Ok(outputs)
    }

    /// Reorg rollback: outputs created at or above `from_height` vanish,
    /// tombstones set at or above it are cleared.
    pub fn rollback_from(
        &self,
        from_height: u64,
        ctx: Option<&mut WriteContext>,
    ) -> Result<(), StorageError> {
        self.storage.delete_utxos_from(from_height, ctx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::script::p2wpkh_script;
    use opx_storage::MemoryBackend;
    use shared_types::{TransactionInput, TransactionOutput};
    use std::sync::Arc;

    fn ledger(config: UtxoConfig) -> UtxoLedger {
        UtxoLedger::new(StorageEngine::new(Arc::new(MemoryBackend::new())), config)
    }

    fn addr_script(tag: u8) -> (Address, Vec<u8>) {
        let script = p2wpkh_script(&[tag; 20]);
        (classify_script(&script).unwrap(), script)
    }

    fn funding_tx(id: u8, height: u64, value: u64, tag: u8) -> Transaction {
        let (_, script) = addr_script(tag);
        Transaction {
            id: [id; 32],
            hash: [id; 32],
            kind: TransactionType::Generic,
            inputs: vec![],
            outputs: vec![TransactionOutput {
                value,
                script_pub_key: script,
                address: None,
            }],
            block_height: height,
            index_in_block: 0,
            interaction: None,
            deployment: None,
            receipt: None,
        }
    }

    fn spending_tx(id: u8, spends: u8, height: u64, value: u64, tag: u8) -> Transaction {
        let mut tx = funding_tx(id, height, value, tag);
        tx.inputs = vec![TransactionInput {
            original_tx_id: [spends; 32],
            output_index: 0,
            script_sig: vec![],
            witness: vec![],
        }];
        tx
    }

    #[test]
    fn test_insert_tracks_unspent_above_dust() {
        let ledger = ledger(UtxoConfig::default());
        let (address, _) = addr_script(1);

        ledger
            .insert_block_transactions(
                &[funding_tx(1, 150, 5_000, 1), funding_tx(2, 150, 100, 1)],
                150,
                None,
            )
            .unwrap();

        // The 100-sat output is below dust and untracked.
        assert_eq!(ledger.balance_of(&address, false).unwrap(), 5_000);
    }

    #[test]
    fn test_spend_moves_value_and_sets_watermark() {
        let ledger = ledger(UtxoConfig::default());
        let (sender, _) = addr_script(1);
        let (recipient, _) = addr_script(2);

        ledger
            .insert_block_transactions(&[funding_tx(1, 150, 10_000, 1)], 150, None)
            .unwrap();
        ledger
            .insert_block_transactions(&[spending_tx(2, 1, 200, 9_000, 2)], 200, None)
            .unwrap();

        assert_eq!(ledger.balance_of(&sender, false).unwrap(), 0);
        assert_eq!(ledger.balance_of(&recipient, false).unwrap(), 9_000);
    }

    #[test]
    fn test_reorg_restores_spent_output() {
        let ledger = ledger(UtxoConfig::default());
        let (sender, _) = addr_script(1);

        ledger
            .insert_block_transactions(&[funding_tx(1, 150, 10_000, 1)], 150, None)
            .unwrap();
        ledger
            .insert_block_transactions(&[spending_tx(2, 1, 200, 9_000, 2)], 200, None)
            .unwrap();
        ledger.rollback_from(200, None).unwrap();

        assert_eq!(ledger.balance_of(&sender, false).unwrap(), 10_000);
        let (recipient, _) = addr_script(2);
        assert_eq!(ledger.balance_of(&recipient, false).unwrap(), 0);
    }

    #[test]
    fn test_ordinal_filter_skips_postage_sized_outputs() {
        let ledger = ledger(UtxoConfig::default());
        let (address, _) = addr_script(1);

        ledger
            .insert_block_transactions(
                &[funding_tx(1, 150, 546, 1), funding_tx(2, 150, 5_000, 1)],
                150,
                None,
            )
            .unwrap();

        assert_eq!(ledger.balance_of(&address, false).unwrap(), 5_546);
        assert_eq!(ledger.balance_of(&address, true).unwrap(), 5_000);
    }

    #[test]
    fn test_unspent_ordering_modes() {
        let ledger = ledger(UtxoConfig::default());
        let (address, _) = addr_script(1);

        ledger
            .insert_block_transactions(&[funding_tx(1, 150, 1_000, 1)], 150, None)
            .unwrap();
        ledger
            .insert_block_transactions(&[funding_tx(2, 151, 9_000, 1)], 151, None)
            .unwrap();

        let optimized = ledger.unspent_of(&address, true, 10).unwrap();
        assert_eq!(optimized[0].value, 9_000);

        let chronological = ledger.unspent_of(&address, false, 10).unwrap();
        assert_eq!(chronological[0].block_height, 150);

        assert_eq!(ledger.unspent_of(&address, false, 1).unwrap().len(), 1);
    }

    #[test]
    fn test_retention_respects_enable_switch_and_window() {
        let disabled = ledger(UtxoConfig::default());
        disabled
            .insert_block_transactions(&[funding_tx(1, 100, 5_000, 1)], 100, None)
            .unwrap();
        disabled
            .insert_block_transactions(&[spending_tx(2, 1, 110, 4_000, 2)], 110, None)
            .unwrap();
        assert_eq!(disabled.run_retention(5_000).unwrap(), 0);

        let enabled = ledger(UtxoConfig {
            purge_enabled: true,
            purge_window: 1_000,
            ..UtxoConfig::default()
        });
        enabled
            .insert_block_transactions(&[funding_tx(1, 100, 5_000, 1)], 100, None)
            .unwrap();
        enabled
            .insert_block_transactions(&[spending_tx(2, 1, 110, 4_000, 2)], 110, None)
            .unwrap();

        // Window not yet elapsed.
        assert_eq!(enabled.run_retention(1_000).unwrap(), 0);
        // Tombstone at 110 is now older than tip − window.
        assert_eq!(enabled.run_retention(1_200).unwrap(), 1);
    }
}
