//! # Indexer Scheduler
//!
//! Drives the pipeline: observe → prefetch (overlapped, bounded by the
//! pending-block threshold) → execute in strictly increasing height
//! order → dispatch hooks. One scheduler owns the block processor; at
//! most one block at a given height is ever processed at a time.

use crate::observer::{ChainObserver, Observation, ObserverError};
use crate::reorg::{execute_reorg, ReorgError};
use crate::rpc::BitcoinRpc;
use crate::task::{IndexingTask, TaskError};
use opx_block::{BlockProcessor, CancelSignal};
use opx_hooks::{HookDispatcher, HookEvent};
use opx_storage::{StorageEngine, StorageError};
use opx_utxo::UtxoLedger;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use thiserror::Error;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Scheduler configuration.
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Maximum prefetch tasks in flight.
    pub pending_block_threshold: usize,
    /// Delay between observation rounds when up to date.
    pub poll_interval: Duration,
    /// Height indexing starts from on an empty store.
    pub start_height: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            pending_block_threshold: 10,
            poll_interval: Duration::from_secs(2),
            start_height: 1,
        }
    }
}

/// Scheduler failures.
#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Observer(#[from] ObserverError),

    #[error(transparent)]
    Reorg(#[from] ReorgError),

    /// A block failed execution and was reverted; it is re-attempted on
    /// the next tick.
    #[error("block {height} failed and was reverted")]
    BlockFailed {
        height: u64,
        #[source]
        source: TaskError,
    },

    #[error("scheduler shut down")]
    Shutdown,

    #[error("internal scheduler failure: {0}")]
    Internal(String),
}

/// The indexing scheduler.
pub struct IndexerScheduler {
    storage: StorageEngine,
    processor: BlockProcessor,
    ledger: UtxoLedger,
    hooks: Arc<HookDispatcher>,
    rpc: Arc<dyn BitcoinRpc>,
    observer: ChainObserver,
    config: SchedulerConfig,
    shutdown: CancelSignal,
    /// Last epoch number for which hooks were emitted.
    last_epoch: Mutex<Option<u64>>,
}

type PrefetchHandle = JoinHandle<(IndexingTask, Result<(), TaskError>)>;

impl IndexerScheduler {
    #[allow(clippy::too_many_arguments)]
    #[must_use]
    pub fn new(
        storage: StorageEngine,
        processor: BlockProcessor,
        ledger: UtxoLedger,
        hooks: Arc<HookDispatcher>,
        rpc: Arc<dyn BitcoinRpc>,
        observer: ChainObserver,
        config: SchedulerConfig,
    ) -> Self {
        Self {
            storage,
            processor,
            ledger,
            hooks,
            rpc,
            observer,
            config,
            shutdown: CancelSignal::new(),
            last_epoch: Mutex::new(None),
        }
    }

    /// Signal used for graceful shutdown; observed at safepoints.
    #[must_use]
    pub fn shutdown_signal(&self) -> CancelSignal {
        self.shutdown.clone()
    }

    /// Run until the shutdown signal is raised. A failed block logs and
    /// is re-attempted on the next tick; fatal errors propagate.
    pub async fn run(&self) -> Result<(), SchedulerError> {
        info!("indexer scheduler started");
        loop {
            if self.shutdown.is_cancelled() {
                info!("indexer scheduler stopping");
                return Ok(());
            }
            match self.tick().await {
                Ok(()) => {}
                Err(SchedulerError::BlockFailed { height, source }) => {
                    warn!(height, error = %source, "block reverted; retrying next tick");
                }
                Err(SchedulerError::Shutdown) => return Ok(()),
                Err(fatal) => {
                    error!(error = %fatal, "indexer fatal");
                    return Err(fatal);
                }
            }
            tokio::time::sleep(self.config.poll_interval).await;
        }
    }

    /// One scheduling round: observe, then either roll back a reorg or
    /// advance to the target height.
    pub async fn tick(&self) -> Result<(), SchedulerError> {
        match self.observer.observe().await? {
            Observation::UpToDate => Ok(()),
            Observation::Reorg {
                fork_point,
                old_tip,
                reason,
            } => {
                execute_reorg(
                    &self.storage,
                    &self.ledger,
                    &self.hooks,
                    fork_point,
                    old_tip,
                    &reason,
                )
                .await?;
                // Resume indexing from the fork on the next observation.
                Ok(())
            }
            Observation::Advance { target } => self.advance_to(target).await,
        }
    }

    /// Index every missing block up to `target`, prefetching ahead.
    async fn advance_to(&self, target: u64) -> Result<(), SchedulerError> {
        let start = self
            .storage
            .max_block_height()?
            .map_or(self.config.start_height, |tip| tip + 1);
        if start > target {
            return Ok(());
        }

        let mut queue: VecDeque<PrefetchHandle> = VecDeque::new();
        let mut next_prefetch = start;
        let mut next_process = start;

        let result = loop {
            if next_process > target {
                break Ok(());
            }
            if self.shutdown.is_cancelled() {
                break Err(SchedulerError::Shutdown);
            }

            // Keep the prefetch window full; prefetches never mutate
            // persisted state.
            while queue.len() < self.config.pending_block_threshold && next_prefetch <= target {
                let rpc = self.rpc.clone();
                let height = next_prefetch;
                queue.push_back(tokio::spawn(async move {
                    let mut task = IndexingTask::new(height);
                    let outcome = task.prefetch(rpc.as_ref()).await;
                    (task, outcome)
                }));
                next_prefetch += 1;
            }

            let Some(handle) = queue.pop_front() else {
                break Ok(());
            };
            let (mut task, prefetched) = handle
                .await
                .map_err(|err| SchedulerError::Internal(format!("prefetch join: {err}")))?;
            if let Err(err) = prefetched {
                break Err(SchedulerError::BlockFailed {
                    height: task.height(),
                    source: err,
                });
            }

            match self.execute_one(&mut task).await {
                Ok(()) => {
                    next_process += 1;
                }
                Err(err) => break Err(err),
            }
        };

        // Abandon outstanding prefetches on any early exit.
        for handle in queue {
            handle.abort();
        }
        result
    }

    async fn execute_one(&self, task: &mut IndexingTask) -> Result<(), SchedulerError> {
        let height = task.height();
        if let Some(hash) = task.block_hash() {
            self.dispatch_droppable(&HookEvent::BlockPreProcess { height, hash })
                .await;
        }

        let processed = match task.process(&self.processor) {
            Ok(processed) => processed,
            Err(TaskError::Cancelled(_)) => return Err(SchedulerError::Shutdown),
            Err(err) => {
                // The failed block may have left nothing behind (finalize
                // is atomic), but revert everything at or above it to be
                // observably consistent before the retry.
                self.rollback_failed(height)?;
                task.mark_reverted();
                return Err(SchedulerError::BlockFailed {
                    height,
                    source: err,
                });
            }
        };

        self.dispatch_droppable(&HookEvent::BlockPostProcess(processed.digest.clone()))
            .await;
        self.dispatch_droppable(&HookEvent::BlockChange(processed.digest.clone()))
            .await;
        self.emit_epoch_hooks().await?;

        task.complete()
            .map_err(|err| SchedulerError::Internal(err.to_string()))?;
        self.ledger.run_retention(height)?;
        debug!(height, "block complete");
        Ok(())
    }

    /// Epoch transitions surface as hooks once per epoch number.
    async fn emit_epoch_hooks(&self) -> Result<(), SchedulerError> {
        let Some(active) = self.storage.get_active_epoch()? else {
            return Ok(());
        };
        let mut last = self
            .last_epoch
            .lock()
            .map_err(|_| SchedulerError::Internal("epoch tracker poisoned".into()))?;
        if *last == Some(active.number) {
            return Ok(());
        }
        if let Some(previous) = *last {
            if let Some(closed) = self.storage.get_epoch_by_number(previous)? {
                if !closed.is_active() {
                    self.dispatch_droppable(&HookEvent::EpochFinalized {
                        number: closed.number,
                        end_block: closed.end_block.max(0) as u64,
                    })
                    .await;
                }
            }
        }
        self.dispatch_droppable(&HookEvent::EpochChange {
            number: active.number,
            start_block: active.start_block,
        })
        .await;
        *last = Some(active.number);
        Ok(())
    }

    async fn dispatch_droppable(&self, event: &HookEvent) {
        if let Err(err) = self.hooks.dispatch(event).await {
            warn!(error = %err, "droppable hook dispatch failed");
        }
    }

    fn rollback_failed(&self, height: u64) -> Result<(), SchedulerError> {
        let mut ctx = opx_storage::WriteContext::new();
        self.storage.delete_block_headers_from(height, Some(&mut ctx))?;
        self.storage.delete_transactions_from(height, Some(&mut ctx))?;
        self.storage.delete_contracts_from(height, Some(&mut ctx))?;
        self.storage.delete_state_from(height, Some(&mut ctx))?;
        self.storage.delete_witnesses_from(height, Some(&mut ctx))?;
        self.storage.delete_epochs_from_block(height, Some(&mut ctx))?;
        self.ledger.rollback_from(height, Some(&mut ctx))?;
        self.storage.commit(ctx)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rpc::FakeChain;
    use opx_hooks::{Plugin, PluginError};
    use opx_storage::MemoryBackend;
    use opx_utxo::UtxoConfig;
    use opx_vm::testing::InMemoryWorld;
    use shared_types::{ConsensusRegistry, RawBlock};
    use std::collections::HashSet;
    use std::sync::Mutex as StdMutex;

    struct Recorder {
        changes: StdMutex<Vec<u64>>,
        reorgs: StdMutex<Vec<(u64, u64)>>,
    }

    impl Recorder {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                changes: StdMutex::new(Vec::new()),
                reorgs: StdMutex::new(Vec::new()),
            })
        }
    }

    #[async_trait::async_trait]
    impl Plugin for Recorder {
        fn name(&self) -> &str {
            "recorder"
        }

        fn permissions(&self) -> HashSet<String> {
            ["blocks.onChange".to_string(), "chain.onReorg".to_string()]
                .into_iter()
                .collect()
        }

        async fn handle(&self, event: &HookEvent) -> Result<Option<bool>, PluginError> {
            match event {
                HookEvent::BlockChange(digest) => {
                    self.changes.lock().unwrap().push(digest.height);
                }
                HookEvent::Reorg {
                    from_block,
                    to_block,
                    ..
                } => {
                    self.reorgs.lock().unwrap().push((*from_block, *to_block));
                }
                _ => {}
            }
            Ok(None)
        }
    }

    fn chain_block(height: u64, tag: u8) -> RawBlock {
        RawBlock {
            height,
            hash: [tag; 32],
            previous_block_hash: [tag.wrapping_sub(1); 32],
            time: 1_700_000_000 + height,
            median_time: 1_700_000_000,
            transactions: vec![],
        }
    }

    async fn build_scheduler(
        chain: Arc<FakeChain>,
        recorder: Arc<Recorder>,
    ) -> IndexerScheduler {
        let storage = StorageEngine::new(Arc::new(MemoryBackend::new()));
        let ledger = UtxoLedger::new(storage.clone(), UtxoConfig::default());
        let world = InMemoryWorld::new();
        let processor = BlockProcessor::new(
            storage.clone(),
            world.runtime(),
            ledger.clone(),
            ConsensusRegistry::genesis(),
        );
        let hooks = Arc::new(HookDispatcher::new(64));
        hooks.register(recorder).await;
        let observer = ChainObserver::new(chain.clone(), storage.clone(), 10);
        IndexerScheduler::new(
            storage,
            processor,
            ledger,
            hooks,
            chain,
            observer,
            SchedulerConfig::default(),
        )
    }

    #[tokio::test]
    async fn test_advance_indexes_in_height_order() {
        let chain = Arc::new(FakeChain::new());
        for height in 1..=5 {
            chain.put_block(chain_block(height, height as u8));
        }
        let recorder = Recorder::new();
        let scheduler = build_scheduler(chain, recorder.clone()).await;

        scheduler.tick().await.unwrap();

        assert_eq!(*recorder.changes.lock().unwrap(), vec![1, 2, 3, 4, 5]);
        assert_eq!(scheduler.storage.max_block_height().unwrap(), Some(5));

        // Checksum chain invariant across the indexed range.
        for height in 2..=5 {
            let child = scheduler.storage.get_block_header(height).unwrap().unwrap();
            let parent = scheduler
                .storage
                .get_block_header(height - 1)
                .unwrap()
                .unwrap();
            assert_eq!(child.previous_block_checksum, parent.checksum_root);
        }
    }

    #[tokio::test]
    async fn test_second_tick_is_idempotent() {
        let chain = Arc::new(FakeChain::new());
        for height in 1..=3 {
            chain.put_block(chain_block(height, height as u8));
        }
        let recorder = Recorder::new();
        let scheduler = build_scheduler(chain, recorder.clone()).await;

        scheduler.tick().await.unwrap();
        scheduler.tick().await.unwrap();
        assert_eq!(*recorder.changes.lock().unwrap(), vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn test_reorg_rolls_back_then_reindexes() {
        let chain = Arc::new(FakeChain::new());
        for height in 1..=4 {
            chain.put_block(chain_block(height, height as u8));
        }
        let recorder = Recorder::new();
        let scheduler = build_scheduler(chain.clone(), recorder.clone()).await;
        scheduler.tick().await.unwrap();

        // Replace heights 3-4 and extend to 5.
        chain.fork_from(
            3,
            vec![
                chain_block(3, 0xA3),
                chain_block(4, 0xA4),
                chain_block(5, 0xA5),
            ],
        );

        // First tick detects and rolls back; second re-indexes.
        scheduler.tick().await.unwrap();
        assert_eq!(*recorder.reorgs.lock().unwrap(), vec![(3, 4)]);
        assert_eq!(scheduler.storage.max_block_height().unwrap(), Some(2));

        scheduler.tick().await.unwrap();
        assert_eq!(scheduler.storage.max_block_height().unwrap(), Some(5));
        let reindexed = scheduler.storage.get_block_header(3).unwrap().unwrap();
        assert_eq!(reindexed.hash, [0xA3; 32]);
        // The reorg event preceded the re-indexed BlockChange events.
        assert_eq!(
            *recorder.changes.lock().unwrap(),
            vec![1, 2, 3, 4, 3, 4, 5]
        );
    }

    #[tokio::test]
    async fn test_shutdown_stops_advance() {
        let chain = Arc::new(FakeChain::new());
        for height in 1..=3 {
            chain.put_block(chain_block(height, height as u8));
        }
        let recorder = Recorder::new();
        let scheduler = build_scheduler(chain, recorder).await;
        scheduler.shutdown_signal().cancel();

        let err = scheduler.tick().await.unwrap_err();
        assert!(matches!(err, SchedulerError::Shutdown));
    }
}
