//! # Core Domain Entities
//!
//! The entities that flow between subsystems.
//!
//! ## Clusters
//!
//! - **Chain**: `Block`, `BlockHeader`, `Transaction`, payloads
//! - **Contracts**: `ContractInformation`, `ContractEvent`, `TransactionReceipt`
//! - **Ledger**: `UnspentOutput`
//! - **Epochs**: `Epoch`, `EpochSubmission`
//! - **Commitments**: `ChecksumProofEntry`, `BlockProcessedData`

use crate::address::Address;
use serde::{Deserialize, Serialize};
use serde_with::{serde_as, Bytes};
use std::fmt;

// =============================================================================
// PRIMITIVES
// =============================================================================

/// A 32-byte hash (SHA-256).
pub type Hash = [u8; 32];

/// A 32-byte transaction identifier.
pub type TxId = [u8; 32];

/// A 32-byte contract storage pointer.
pub type StoragePointer = [u8; 32];

/// A 32-byte contract storage value.
pub type SlotValue = [u8; 32];

/// Value in base-chain satoshis.
pub type Satoshis = u64;

/// Abstract execution resource consumed by contract code.
pub type Gas = u64;

/// The all-zero hash, used wherever a commitment input is absent.
pub const ZERO_HASH: Hash = [0u8; 32];

/// Sentinel for an epoch whose window has not closed yet.
pub const EPOCH_OPEN_SENTINEL: i64 = -1;

// =============================================================================
// CONTRACT ADDRESS
// =============================================================================

/// Canonical contract address.
///
/// Derived deterministically from (deployer public key, salt hash, seed);
/// serves as the key for state and bytecode storage. The canonical form is
/// a lowercase hex string prefixed with `oc1`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ContractAddress(String);

impl ContractAddress {
    /// Wrap an already-canonical address string.
    pub fn new(canonical: impl Into<String>) -> Self {
        Self(canonical.into())
    }

    /// The canonical string form.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The byte form used when hashing the address into commitments.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        self.0.as_bytes()
    }
}

impl fmt::Display for ContractAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// =============================================================================
// CLUSTER A: THE CHAIN
// =============================================================================

/// Classification of an indexed transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TransactionType {
    /// Plain base-chain transaction with no second-layer payload.
    Generic,
    /// Deploys a new contract.
    Deployment,
    /// Calls an existing contract.
    Interaction,
    /// The block's coinbase.
    Coinbase,
}

/// One input of a base-chain transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionInput {
    /// Transaction that created the consumed output.
    pub original_tx_id: TxId,
    /// Index of the consumed output in that transaction.
    pub output_index: u32,
    /// Unlocking script.
    pub script_sig: Vec<u8>,
    /// Segwit witness stack.
    pub witness: Vec<Vec<u8>>,
}

/// One output of a base-chain transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionOutput {
    /// Value in satoshis.
    pub value: Satoshis,
    /// Locking script.
    pub script_pub_key: Vec<u8>,
    /// Recipient address, when the script is a recognized template.
    pub address: Option<Address>,
}

/// Second-layer payload of an `Interaction` transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InteractionPayload {
    /// Target contract.
    pub contract: ContractAddress,
    /// ABI-encoded calldata (selector + arguments).
    pub calldata: Vec<u8>,
    /// Maximum gas the sender paid for.
    pub gas_limit: Gas,
    /// Satoshis burned to purchase gas.
    pub gas_sat_fee: Satoshis,
    /// Additional priority fee bidding for earlier placement.
    pub priority_fee: Satoshis,
    /// Public key of the originating signer.
    pub from_public_key: Vec<u8>,
    /// Epoch proof-of-work preimage, when the interaction carries one.
    pub preimage: Option<Vec<u8>>,
    /// Epoch mining reward attached to the interaction, if any.
    pub reward: Option<Satoshis>,
}

/// Second-layer payload of a `Deployment` transaction.
#[serde_as]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeploymentPayload {
    /// Contract WASM bytecode.
    pub bytecode: Vec<u8>,
    /// Public key of the deployer.
    pub deployer_public_key: Vec<u8>,
    /// Hash of the deployment salt.
    #[serde_as(as = "Bytes")]
    pub salt_hash: Hash,
    /// Deployment seed.
    #[serde_as(as = "Bytes")]
    pub seed: Hash,
    /// Calldata forwarded to the constructor, if any.
    pub calldata: Vec<u8>,
    /// Gas limit for constructor execution.
    pub gas_limit: Gas,
    /// Satoshis burned to purchase gas.
    pub gas_sat_fee: Satoshis,
    /// Priority fee.
    pub priority_fee: Satoshis,
}

/// An indexed transaction.
#[serde_as]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    /// Base-chain transaction id.
    #[serde_as(as = "Bytes")]
    pub id: TxId,
    /// Indexing hash (id committed with the block context).
    #[serde_as(as = "Bytes")]
    pub hash: Hash,
    /// Transaction classification.
    pub kind: TransactionType,
    /// Ordered inputs.
    pub inputs: Vec<TransactionInput>,
    /// Ordered outputs.
    pub outputs: Vec<TransactionOutput>,
    /// Height of the containing block.
    pub block_height: u64,
    /// Position within the base-chain block.
    pub index_in_block: u32,
    /// Interaction payload, for `Interaction` transactions.
    pub interaction: Option<InteractionPayload>,
    /// Deployment payload, for `Deployment` transactions.
    pub deployment: Option<DeploymentPayload>,
    /// Execution receipt, populated once the block is processed.
    pub receipt: Option<TransactionReceipt>,
}

impl Transaction {
    /// Gas fee paid in satoshis, zero for transactions without a payload.
    #[must_use]
    pub fn gas_sat_fee(&self) -> Satoshis {
        match (&self.interaction, &self.deployment) {
            (Some(i), _) => i.gas_sat_fee,
            (_, Some(d)) => d.gas_sat_fee,
            _ => 0,
        }
    }

    /// Priority fee, zero for transactions without a payload.
    #[must_use]
    pub fn priority_fee(&self) -> Satoshis {
        match (&self.interaction, &self.deployment) {
            (Some(i), _) => i.priority_fee,
            (_, Some(d)) => d.priority_fee,
            _ => 0,
        }
    }

    /// Whether this transaction is dispatched to the contract evaluator.
    #[must_use]
    pub fn is_executable(&self) -> bool {
        matches!(
            self.kind,
            TransactionType::Interaction | TransactionType::Deployment
        )
    }
}

/// One entry of a checksum proof: the leaf index and its sibling path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChecksumProofEntry {
    /// Index of the committed input in the checksum tree.
    pub index: u32,
    /// Sibling hashes from leaf to root.
    pub siblings: Vec<Hash>,
}

/// The header of an indexed block.
///
/// Immutable once persisted with its final checksum; destroyed only by a
/// reorg covering its height.
#[serde_as]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockHeader {
    /// Block height, strictly monotonic.
    pub height: u64,
    /// Base-chain block hash.
    #[serde_as(as = "Bytes")]
    pub hash: Hash,
    /// Hash of the previous base-chain block.
    #[serde_as(as = "Bytes")]
    pub previous_block_hash: Hash,
    /// Checksum root of the block at height − 1.
    #[serde_as(as = "Bytes")]
    pub previous_block_checksum: Hash,
    /// Root of the state tree after this block.
    #[serde_as(as = "Bytes")]
    pub storage_root: Hash,
    /// Root of the receipt tree for this block.
    #[serde_as(as = "Bytes")]
    pub receipt_root: Hash,
    /// Checksum committing to this block's identity and roots.
    #[serde_as(as = "Bytes")]
    pub checksum_root: Hash,
    /// Per-input membership proofs against the checksum root.
    pub checksum_proofs: Vec<ChecksumProofEntry>,
    /// Epoch proof-of-work preimage committed by this block, if any.
    pub pow_preimage: Option<Vec<u8>>,
    /// Base-chain block time.
    pub time: u64,
    /// Median time past of the base chain at this height.
    pub median_time: u64,
    /// Number of transactions in the block.
    pub tx_count: u32,
}

/// A full indexed block: header plus its transactions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Block {
    pub header: BlockHeader,
    pub transactions: Vec<Transaction>,
}

impl Block {
    #[must_use]
    pub fn height(&self) -> u64 {
        self.header.height
    }
}

/// A prefetched base-chain block, deserialized but not yet executed.
#[serde_as]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawBlock {
    pub height: u64,
    #[serde_as(as = "Bytes")]
    pub hash: Hash,
    #[serde_as(as = "Bytes")]
    pub previous_block_hash: Hash,
    /// Base-chain block time.
    pub time: u64,
    /// Median time past at this height.
    pub median_time: u64,
    /// Decoded transactions in base-chain order; receipts are empty.
    pub transactions: Vec<Transaction>,
}

// =============================================================================
// CLUSTER B: CONTRACTS
// =============================================================================

/// Deployment record of a contract. Created at deployment, never mutated,
/// removed only by reorg.
#[serde_as]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContractInformation {
    /// Canonical contract address.
    pub address: ContractAddress,
    /// Taproot-style tweaked public key committing to the contract.
    pub tweaked_public_key: Vec<u8>,
    /// Height of the deploying block.
    pub deployed_at_height: u64,
    /// Contract WASM bytecode (decompressed form).
    pub bytecode: Vec<u8>,
    /// Public key of the deployer.
    pub deployer_public_key: Vec<u8>,
    /// Salt hash supplied at deployment.
    #[serde_as(as = "Bytes")]
    pub salt_hash: Hash,
    /// Seed supplied at deployment.
    #[serde_as(as = "Bytes")]
    pub seed: Hash,
}

/// An event emitted by contract execution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContractEvent {
    /// Emitting contract.
    pub contract: ContractAddress,
    /// Event topic.
    pub topic: String,
    /// ABI-encoded event data.
    pub data: Vec<u8>,
}

/// Outcome status of one evaluated transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReceiptStatus {
    /// Execution completed and its writes were committed.
    Success,
    /// Execution reverted; the reason bytes are contract-supplied.
    Reverted(Vec<u8>),
    /// Execution ran past its gas limit.
    OutOfGas,
}

/// Execution receipt recorded on a transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionReceipt {
    /// Outcome status.
    pub status: ReceiptStatus,
    /// Opaque bytes returned by the contract entrypoint.
    pub result: Vec<u8>,
    /// Events emitted, in emission order.
    pub events: Vec<ContractEvent>,
    /// Gas consumed.
    pub gas_used: Gas,
    /// Contracts deployed by this transaction.
    pub deployed_contracts: Vec<ContractAddress>,
}

impl TransactionReceipt {
    /// Revert reason, when the transaction did not succeed.
    #[must_use]
    pub fn revert_reason(&self) -> Option<&[u8]> {
        match &self.status {
            ReceiptStatus::Reverted(reason) => Some(reason),
            _ => None,
        }
    }
}

// =============================================================================
// CLUSTER C: LEDGER
// =============================================================================

/// An unspent (or tombstoned) transaction output.
///
/// Live while `deleted_at_block` is `None`. Spent outputs keep a watermark
/// until the retention policy purges them, so a reorg can restore them.
#[serde_as]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnspentOutput {
    /// Creating transaction.
    #[serde_as(as = "Bytes")]
    pub tx_id: TxId,
    /// Output index within the creating transaction.
    pub output_index: u32,
    /// Value in satoshis.
    pub value: Satoshis,
    /// Locking script.
    pub script_pub_key: Vec<u8>,
    /// Recipient address, when recoverable from the script.
    pub address: Option<Address>,
    /// Height of the creating block.
    pub block_height: u64,
    /// Tombstone watermark: height of the spending block.
    pub deleted_at_block: Option<u64>,
}

impl UnspentOutput {
    /// Whether the output is currently spendable.
    #[must_use]
    pub fn is_live(&self) -> bool {
        self.deleted_at_block.is_none()
    }

    /// The (txid, index) key identifying this output.
    #[must_use]
    pub fn outpoint(&self) -> (TxId, u32) {
        (self.tx_id, self.output_index)
    }
}

// =============================================================================
// CLUSTER D: EPOCHS
// =============================================================================

/// A fixed-length window of consecutive blocks with a PoW-selected proposer.
#[serde_as]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Epoch {
    /// Epoch number, monotonic.
    pub number: u64,
    /// Public key of the selected proposer.
    pub proposer_public_key: Vec<u8>,
    /// Proof-of-work solution that won the epoch.
    pub solution: Vec<u8>,
    /// Salt the solution was computed over.
    #[serde_as(as = "Bytes")]
    pub salt: Hash,
    /// Free-form proposer graffiti.
    pub graffiti: Option<Vec<u8>>,
    /// Difficulty the solution met.
    pub difficulty: u64,
    /// First block of the window.
    pub start_block: u64,
    /// Last block of the window, or [`EPOCH_OPEN_SENTINEL`] while open.
    pub end_block: i64,
    /// Hash of the epoch record.
    #[serde_as(as = "Bytes")]
    pub epoch_hash: Hash,
    /// Merkle root over the epoch's submissions.
    #[serde_as(as = "Bytes")]
    pub epoch_root: Hash,
    /// Target hash the solution had to beat.
    #[serde_as(as = "Bytes")]
    pub target_hash: Hash,
    /// Membership proofs for the winning submission.
    pub proofs: Vec<ChecksumProofEntry>,
}

impl Epoch {
    /// Whether the epoch window is still open.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.end_block == EPOCH_OPEN_SENTINEL
    }
}

/// A candidate solution submitted for an epoch.
#[serde_as]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EpochSubmission {
    /// Epoch the submission targets.
    pub epoch_number: u64,
    /// Submitter public key.
    pub submitter_public_key: Vec<u8>,
    /// Candidate solution.
    pub solution: Vec<u8>,
    /// Salt of the submission.
    #[serde_as(as = "Bytes")]
    pub salt: Hash,
    /// Optional graffiti.
    pub graffiti: Option<Vec<u8>>,
    /// Height of the block that carried the submission.
    pub block_height: u64,
}

// =============================================================================
// CLUSTER E: PROCESSING DIGESTS
// =============================================================================

/// Digest of a fully processed block, handed to hooks and peer witnessing.
#[serde_as]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockProcessedData {
    /// Block height.
    pub height: u64,
    /// Base-chain block hash.
    #[serde_as(as = "Bytes")]
    pub block_hash: Hash,
    /// Previous block hash.
    #[serde_as(as = "Bytes")]
    pub previous_block_hash: Hash,
    /// Checksum root of this block.
    #[serde_as(as = "Bytes")]
    pub checksum_root: Hash,
    /// Checksum root of the previous block.
    #[serde_as(as = "Bytes")]
    pub previous_block_checksum: Hash,
    /// State root after this block.
    #[serde_as(as = "Bytes")]
    pub storage_root: Hash,
    /// Receipt root of this block.
    #[serde_as(as = "Bytes")]
    pub receipt_root: Hash,
    /// Checksum membership proofs.
    pub checksum_proofs: Vec<ChecksumProofEntry>,
    /// Transactions in the block.
    pub tx_count: u32,
    /// Total gas consumed by the block.
    pub gas_used: Gas,
}

/// A transaction seen in the base-chain mempool but not yet indexed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MempoolTransaction {
    /// The decoded transaction.
    pub transaction: Transaction,
    /// Unix time the transaction was first observed.
    pub first_seen: u64,
    /// Recipient addresses extracted from the outputs, for address filters.
    pub recipients: Vec<Address>,
}

/// Audit record of one chain reorganization.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReorgRecord {
    /// First replaced height (fork point + 1).
    pub from_block: u64,
    /// Old tip height.
    pub to_block: u64,
    /// Human-readable cause.
    pub reason: String,
    /// Unix time the rollback ran.
    pub timestamp: u64,
}
