//! # Subsystem Wiring
//!
//! Builds every subsystem from the configuration and runs the indexer
//! worker. Components receive their collaborators explicitly; there are
//! no globals.

use crate::config::NodeConfig;
use anyhow::{Context, Result};
use fs2::FileExt;
use opx_api::{
    ApiLimits, BalanceQueryService, BlockQueryService, EpochQueryService, StateQueryService,
    TransactionQueryService,
};
use opx_block::{BlockProcessor, CancelSignal};
use opx_hooks::HookDispatcher;
use opx_indexer::{ChainObserver, IndexerScheduler, JsonRpcClient};
use opx_storage::{RocksBackend, StorageEngine};
use opx_utxo::UtxoLedger;
use opx_vm::{ContractEvaluator, EvaluationError, EvaluatorPool, SlotSource, VmLimits, WasmRuntime};
use shared_types::{ConsensusRegistry, ContractAddress, ContractInformation, SlotValue, StoragePointer};
use std::fs::File;
use std::sync::Arc;
use tracing::info;

/// Storage-backed slot source for the read-only evaluator pool.
struct LiveSlotSource {
    storage: StorageEngine,
}

impl SlotSource for LiveSlotSource {
    fn load_slot(
        &self,
        contract: &ContractAddress,
        pointer: &StoragePointer,
    ) -> Result<Option<SlotValue>, EvaluationError> {
        let tip = self
            .storage
            .max_block_height()
            .map_err(|err| EvaluationError::Storage(err.to_string()))?
            .unwrap_or(0);
        self.storage
            .get_slot(contract, pointer, tip)
            .map_err(|err| EvaluationError::Storage(err.to_string()))
    }
}

/// Storage-backed contract source for the read-only evaluator pool.
struct LiveContractSource {
    storage: StorageEngine,
}

impl opx_vm::ContractSource for LiveContractSource {
    fn get_contract(
        &self,
        address: &ContractAddress,
        at_height: u64,
    ) -> Result<Option<ContractInformation>, EvaluationError> {
        self.storage
            .get_contract(address, Some(at_height))
            .map_err(|err| EvaluationError::Storage(err.to_string()))
    }
}

/// The API services handed to external frontends.
pub struct ApiServices {
    pub blocks: BlockQueryService,
    pub transactions: TransactionQueryService,
    pub state: StateQueryService,
    pub balances: BalanceQueryService,
    pub epochs: Arc<EpochQueryService>,
}

/// A fully wired node.
pub struct Node {
    scheduler: Arc<IndexerScheduler>,
    pub api: ApiServices,
    pub hooks: Arc<HookDispatcher>,
    // Held for the lifetime of the node; released on drop.
    _data_dir_lock: File,
}

impl Node {
    /// Build every subsystem from the configuration.
    pub fn build(config: &NodeConfig) -> Result<Self> {
        config.validate().context("configuration invalid")?;

        std::fs::create_dir_all(&config.storage.data_dir)
            .with_context(|| format!("creating {}", config.storage.data_dir.display()))?;
        let lock_path = config.storage.data_dir.join("LOCK");
        let lock_file = File::create(&lock_path)
            .with_context(|| format!("creating {}", lock_path.display()))?;
        lock_file
            .try_lock_exclusive()
            .context("data directory is locked by another process")?;

        let backend = RocksBackend::open(&config.storage.data_dir.join("db"))
            .context("opening storage")?;
        let storage = StorageEngine::new(Arc::new(backend));
        let ledger = UtxoLedger::new(storage.clone(), config.utxo.clone());
        let registry = ConsensusRegistry::genesis();

        let runtime = Arc::new(WasmRuntime::new());
        let processor = BlockProcessor::new(
            storage.clone(),
            runtime.clone(),
            ledger.clone(),
            registry.clone(),
        );

        let hooks = Arc::new(HookDispatcher::new(config.hooks.high_water_mark));
        let rpc = Arc::new(JsonRpcClient::new(config.rpc_config()));
        let observer = ChainObserver::new(rpc.clone(), storage.clone(), config.indexer.reorg_depth);
        let scheduler = Arc::new(IndexerScheduler::new(
            storage.clone(),
            processor,
            ledger.clone(),
            hooks.clone(),
            rpc,
            observer,
            config.scheduler_config(),
        ));

        let limits = registry
            .active_at(config.indexer.start_height)
            .map(VmLimits::from)
            .context("resolving consensus ruleset")?;
        let pool = Arc::new(EvaluatorPool::new(
            (0..config.indexer.view_pool_size)
                .map(|_| {
                    Arc::new(ContractEvaluator::new(
                        runtime.clone(),
                        Arc::new(LiveContractSource {
                            storage: storage.clone(),
                        }),
                        Arc::new(LiveSlotSource {
                            storage: storage.clone(),
                        }),
                        limits.clone(),
                    ))
                })
                .collect(),
        ));

        let api_limits: ApiLimits = config.api.clone();
        let api = ApiServices {
            blocks: BlockQueryService::new(storage.clone()),
            transactions: TransactionQueryService::new(storage.clone(), api_limits.clone()),
            state: StateQueryService::new(storage.clone(), pool, api_limits.clone()),
            balances: BalanceQueryService::new(ledger, api_limits),
            epochs: Arc::new(EpochQueryService::new(storage)),
        };

        info!(
            network = ?config.network,
            data_dir = %config.storage.data_dir.display(),
            "node wired"
        );
        Ok(Self {
            scheduler,
            api,
            hooks,
            _data_dir_lock: lock_file,
        })
    }

    /// The shutdown signal; raising it stops the indexer at the next
    /// safepoint.
    #[must_use]
    pub fn shutdown_signal(&self) -> CancelSignal {
        self.scheduler.shutdown_signal()
    }

    /// Run the indexing worker until shutdown.
    pub async fn run(&self) -> Result<()> {
        self.scheduler.run().await.context("indexer worker failed")
    }
}
