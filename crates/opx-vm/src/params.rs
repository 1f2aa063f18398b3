//! # Evaluation Inputs and Outputs

use shared_types::{
    ContractAddress, ContractEvent, ContractInformation, Gas, Hash, SlotValue, StoragePointer,
    TransactionInput, TransactionOutput, TxId,
};
use std::collections::{BTreeMap, BTreeSet};

/// Per-contract map of storage slots.
pub type SlotMap = BTreeMap<StoragePointer, SlotValue>;

/// Writes or reads grouped by contract.
pub type ContractSlots = BTreeMap<ContractAddress, SlotMap>;

/// Transaction-scoped context visible to the contract.
#[derive(Debug, Clone, Default)]
pub struct TxContext {
    /// Base-chain transaction id.
    pub tx_id: TxId,
    /// Indexing hash.
    pub tx_hash: Hash,
    /// Origin signer public key.
    pub origin: Vec<u8>,
    /// Inputs exposed to the contract, truncated to the configured maximum.
    pub inputs: Vec<TransactionInput>,
    /// Outputs exposed to the contract, truncated to the configured maximum.
    pub outputs: Vec<TransactionOutput>,
}

/// Block-scoped context visible to the contract.
#[derive(Debug, Clone, Default)]
pub struct BlockContext {
    /// Height of the executing block.
    pub height: u64,
    /// Median time past of the base chain.
    pub median_time: u64,
    /// Epoch proof-of-work preimage, when applicable.
    pub preimage: Option<Vec<u8>>,
    /// Epoch reward attached to the transaction, when applicable.
    pub reward: Option<u64>,
}

/// Declared (contract, pointer) warm-up hints.
pub type AccessList = BTreeSet<(ContractAddress, StoragePointer)>;

/// Full input of one evaluation.
#[derive(Debug, Clone)]
pub struct EvaluationParams {
    /// Target contract.
    pub contract: ContractAddress,
    /// ABI-encoded calldata.
    pub calldata: Vec<u8>,
    /// Transaction context.
    pub tx: TxContext,
    /// Block context.
    pub block: BlockContext,
    /// Gas limit for this evaluation.
    pub gas_limit: Gas,
    /// Optional cache-warming hint.
    pub access_list: Option<AccessList>,
    /// Caller-asserted slot values, served before the storage engine.
    pub preloaded_storage: ContractSlots,
}

impl EvaluationParams {
    #[must_use]
    pub fn call(contract: ContractAddress, calldata: Vec<u8>, gas_limit: Gas) -> Self {
        Self {
            contract,
            calldata,
            tx: TxContext::default(),
            block: BlockContext::default(),
            gas_limit,
            access_list: None,
            preloaded_storage: ContractSlots::new(),
        }
    }
}

/// Terminal state of one evaluation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EvaluationOutcome {
    /// Execution completed; writes are final.
    Ok,
    /// Contract-initiated revert.
    Revert(Vec<u8>),
    /// Gas limit exhausted.
    OutOfGas,
    /// Depth limit exceeded.
    DepthExceeded,
    /// Call graph revisited an address on its active stack.
    Reentrancy(ContractAddress),
}

impl EvaluationOutcome {
    #[must_use]
    pub fn is_ok(&self) -> bool {
        matches!(self, Self::Ok)
    }
}

/// Full output of one evaluation.
#[derive(Debug, Clone)]
pub struct EvaluationResult {
    /// Terminal state.
    pub outcome: EvaluationOutcome,
    /// Bytes returned by the entrypoint (empty unless `Ok`).
    pub result: Vec<u8>,
    /// Events in emission order (empty unless `Ok`).
    pub events: Vec<ContractEvent>,
    /// Storage writes by contract (empty unless `Ok`).
    pub storage_writes: ContractSlots,
    /// Every slot the evaluation read, with the value it observed.
    pub loaded_storage: ContractSlots,
    /// Contracts deployed by this evaluation (empty unless `Ok`).
    pub deployed_contracts: Vec<ContractInformation>,
    /// Gas consumed, including failed attempts' final state.
    pub gas_used: Gas,
}

impl EvaluationResult {
    /// A failed evaluation: everything discarded except gas.
    #[must_use]
    pub fn failed(outcome: EvaluationOutcome, gas_used: Gas) -> Self {
        Self {
            outcome,
            result: Vec::new(),
            events: Vec::new(),
            storage_writes: ContractSlots::new(),
            loaded_storage: ContractSlots::new(),
            deployed_contracts: Vec::new(),
            gas_used,
        }
    }
}
