//! # Reorg Rollback
//!
//! Rolls persisted state back to a fork point and dispatches the
//! blocking `Reorg` hook. A hook failure aborts the reorg and is
//! surfaced to the operator.

use opx_hooks::{DispatchError, HookDispatcher, HookEvent};
use opx_storage::{StorageEngine, StorageError, WriteContext};
use opx_utxo::UtxoLedger;
use shared_types::ReorgRecord;
use std::time::{SystemTime, UNIX_EPOCH};
use thiserror::Error;
use tracing::{info, warn};

/// Reorg failures. Both are fatal to the reorg and require operator
/// attention; storage failures leave the rollback unapplied.
#[derive(Debug, Error)]
pub enum ReorgError {
    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error("reorg hook aborted the rollback: {0}")]
    HookFailed(DispatchError),
}

/// Roll back every collection to the fork point and notify plugins.
///
/// The deletion of blocks, transactions, contracts, state slots,
/// witnesses, epochs, and the UTXO restoration land in one atomic batch.
/// The `Reorg` hook is sequential, blocking, and never dropped; the core
/// resumes indexing only after every plugin acknowledged.
pub async fn execute_reorg(
    storage: &StorageEngine,
    ledger: &UtxoLedger,
    hooks: &HookDispatcher,
    fork_point: u64,
    old_tip: u64,
    reason: &str,
) -> Result<(), ReorgError> {
    let from_height = fork_point + 1;
    info!(fork_point, old_tip, reason, "reorg rollback starting");

    let mut ctx = WriteContext::new();
    storage.delete_block_headers_from(from_height, Some(&mut ctx))?;
    storage.delete_transactions_from(from_height, Some(&mut ctx))?;
    storage.delete_contracts_from(from_height, Some(&mut ctx))?;
    storage.delete_state_from(from_height, Some(&mut ctx))?;
    storage.delete_witnesses_from(from_height, Some(&mut ctx))?;
    storage.delete_epochs_from_block(from_height, Some(&mut ctx))?;
    ledger.rollback_from(from_height, Some(&mut ctx))?;

    let record = ReorgRecord {
        from_block: from_height,
        to_block: old_tip,
        reason: reason.to_string(),
        timestamp: SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0),
    };
    storage.record_reorg(&record, Some(&mut ctx))?;
    storage.commit(ctx)?;
    info!(fork_point, "rollback committed");

    let outcome = hooks
        .dispatch(&HookEvent::Reorg {
            from_block: from_height,
            to_block: old_tip,
            reason: reason.to_string(),
        })
        .await;
    if let Err(err) = outcome {
        warn!(error = %err, "reorg hook failed; operator intervention required");
        return Err(ReorgError::HookFailed(err));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use opx_hooks::Plugin;
    use opx_storage::MemoryBackend;
    use opx_utxo::UtxoConfig;
    use shared_types::{BlockHeader, UnspentOutput};
    use std::sync::Arc;

    fn header(height: u64) -> BlockHeader {
        BlockHeader {
            height,
            hash: [height as u8; 32],
            previous_block_hash: [0u8; 32],
            previous_block_checksum: [0u8; 32],
            storage_root: [0u8; 32],
            receipt_root: [0u8; 32],
            checksum_root: [(height as u8).wrapping_add(100); 32],
            checksum_proofs: vec![],
            pow_preimage: None,
            time: 0,
            median_time: 0,
            tx_count: 0,
        }
    }

    struct ReorgWatcher {
        seen: std::sync::Mutex<Vec<(u64, u64)>>,
    }

    #[async_trait::async_trait]
    impl Plugin for ReorgWatcher {
        fn name(&self) -> &str {
            "watcher"
        }

        fn permissions(&self) -> std::collections::HashSet<String> {
            ["chain.onReorg".to_string()].into_iter().collect()
        }

        async fn handle(
            &self,
            event: &HookEvent,
        ) -> Result<Option<bool>, opx_hooks::PluginError> {
            if let HookEvent::Reorg {
                from_block,
                to_block,
                ..
            } = event
            {
                self.seen.lock().unwrap().push((*from_block, *to_block));
            }
            Ok(None)
        }
    }

    #[tokio::test]
    async fn test_rollback_restores_utxo_and_notifies() {
        let storage = StorageEngine::new(Arc::new(MemoryBackend::new()));
        let ledger = UtxoLedger::new(storage.clone(), UtxoConfig::default());
        let hooks = HookDispatcher::new(16);
        let watcher = Arc::new(ReorgWatcher {
            seen: std::sync::Mutex::new(Vec::new()),
        });
        hooks.register(watcher.clone()).await;

        for height in 198..=201 {
            storage.save_block_header(&header(height), None).unwrap();
        }
        // UTXO created at 150, spent at 200.
        storage
            .upsert_unspent_outputs(
                &[UnspentOutput {
                    tx_id: [7u8; 32],
                    output_index: 0,
                    value: 10_000,
                    script_pub_key: vec![],
                    address: None,
                    block_height: 150,
                    deleted_at_block: None,
                }],
                None,
            )
            .unwrap();
        storage.mark_outputs_spent(&[([7u8; 32], 0)], 200, None).unwrap();

        execute_reorg(&storage, &ledger, &hooks, 199, 201, "tip mismatch")
            .await
            .unwrap();

        assert_eq!(storage.max_block_height().unwrap(), Some(199));
        assert!(storage.get_block_header(200).unwrap().is_none());
        let restored = storage.get_unspent_output(&[7u8; 32], 0).unwrap().unwrap();
        assert!(restored.is_live());
        assert_eq!(*watcher.seen.lock().unwrap(), vec![(200, 201)]);
        assert_eq!(storage.list_reorgs().unwrap().len(), 1);
    }

    struct FailingPlugin;

    #[async_trait::async_trait]
    impl Plugin for FailingPlugin {
        fn name(&self) -> &str {
            "fails"
        }

        fn permissions(&self) -> std::collections::HashSet<String> {
            ["chain.onReorg".to_string()].into_iter().collect()
        }

        async fn handle(
            &self,
            _event: &HookEvent,
        ) -> Result<Option<bool>, opx_hooks::PluginError> {
            Err(opx_hooks::PluginError("refuses".into()))
        }
    }

    #[tokio::test]
    async fn test_hook_failure_aborts_reorg() {
        let storage = StorageEngine::new(Arc::new(MemoryBackend::new()));
        let ledger = UtxoLedger::new(storage.clone(), UtxoConfig::default());
        let hooks = HookDispatcher::new(16);
        hooks.register(Arc::new(FailingPlugin)).await;

        storage.save_block_header(&header(200), None).unwrap();
        let err = execute_reorg(&storage, &ledger, &hooks, 199, 200, "test")
            .await
            .unwrap_err();
        assert!(matches!(err, ReorgError::HookFailed(_)));
    }
}
