//! Test harness: a full node over the fake base chain, the in-memory
//! storage backend, and the scripted contract runtime.

use opx_block::BlockProcessor;
use opx_hooks::{HookDispatcher, HookEvent, Plugin, PluginError};
use opx_indexer::rpc::FakeChain;
use opx_indexer::{ChainObserver, IndexerScheduler, SchedulerConfig};
use opx_storage::{MemoryBackend, StorageEngine};
use opx_utxo::{UtxoConfig, UtxoLedger};
use opx_vm::testing::InMemoryWorld;
use shared_types::{
    ConsensusRegistry, RawBlock, Transaction, TransactionInput, TransactionOutput,
    TransactionType,
};
use std::collections::HashSet;
use std::sync::{Arc, Mutex};

/// Everything a flow test needs, wired the way the runtime wires it.
pub struct TestNode {
    pub chain: Arc<FakeChain>,
    pub storage: StorageEngine,
    pub ledger: UtxoLedger,
    pub world: InMemoryWorld,
    pub hooks: Arc<HookDispatcher>,
    pub scheduler: IndexerScheduler,
    pub events: Arc<EventLog>,
}

/// Captures the hook stream a plugin observes, in arrival order.
#[derive(Default)]
pub struct EventLog {
    entries: Mutex<Vec<String>>,
}

impl EventLog {
    pub fn entries(&self) -> Vec<String> {
        self.entries.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl Plugin for EventLog {
    fn name(&self) -> &str {
        "event-log"
    }

    fn permissions(&self) -> HashSet<String> {
        [
            "blocks.onChange".to_string(),
            "chain.onReorg".to_string(),
            "epochs.onChange".to_string(),
            "epochs.onFinalized".to_string(),
        ]
        .into_iter()
        .collect()
    }

    async fn handle(&self, event: &HookEvent) -> Result<Option<bool>, PluginError> {
        let entry = match event {
            HookEvent::BlockChange(digest) => format!("block:{}", digest.height),
            HookEvent::Reorg {
                from_block,
                to_block,
                ..
            } => format!("reorg:{from_block}-{to_block}"),
            HookEvent::EpochChange { number, .. } => format!("epoch:{number}"),
            HookEvent::EpochFinalized { number, .. } => format!("epoch-final:{number}"),
            _ => return Ok(None),
        };
        self.entries.lock().unwrap().push(entry);
        Ok(None)
    }
}

impl TestNode {
    pub async fn new() -> Self {
        let chain = Arc::new(FakeChain::new());
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
        let events = Arc::new(EventLog::default());
        hooks.register(events.clone()).await;
        let observer = ChainObserver::new(chain.clone(), storage.clone(), 20);
        let scheduler = IndexerScheduler::new(
            storage.clone(),
            processor,
            ledger.clone(),
            hooks.clone(),
            chain.clone(),
            observer,
            SchedulerConfig::default(),
        );
        Self {
            chain,
            storage,
            ledger,
            world,
            hooks,
            scheduler,
            events,
        }
    }

    /// Append an empty-ish block at `height` with the given transactions.
    pub fn push_block(&self, height: u64, transactions: Vec<Transaction>) {
        self.chain.put_block(raw_block(height, transactions));
    }
}

/// Deterministic hash for fixtures.
pub fn tag_hash(tag: u8) -> [u8; 32] {
    let mut hash = [0u8; 32];
    hash[0] = tag;
    hash
}

pub fn raw_block(height: u64, transactions: Vec<Transaction>) -> RawBlock {
    RawBlock {
        height,
        hash: {
            let mut hash = [0u8; 32];
            hash[0] = 0xB0;
            hash[8..16].copy_from_slice(&height.to_be_bytes());
            hash
        },
        previous_block_hash: [0u8; 32],
        time: 1_700_000_000 + height,
        median_time: 1_700_000_000,
        transactions,
    }
}

pub fn generic_tx(tag: u8, height: u64, outputs: Vec<TransactionOutput>) -> Transaction {
    Transaction {
        id: tag_hash(tag),
        hash: tag_hash(tag),
        kind: TransactionType::Generic,
        inputs: vec![],
        outputs,
        block_height: height,
        index_in_block: 0,
        interaction: None,
        deployment: None,
        receipt: None,
    }
}

pub fn spend_input(from_tag: u8, output_index: u32) -> TransactionInput {
    TransactionInput {
        original_tx_id: tag_hash(from_tag),
        output_index,
        script_sig: vec![],
        witness: vec![],
    }
}
