//! # Block Processor
//!
//! Dispatches ordered transactions to the evaluator, accumulates the
//! block change set, and finalizes everything into one atomic storage
//! commit.

use crate::cancel::CancelSignal;
use crate::error::ProcessError;
use crate::ordering::order_transactions;
use opx_merkle::{block_checksum, checksum_proofs, ChecksumInputs, ReceiptTree, StateTree};
use opx_storage::{SlotWrite, StorageEngine, WriteContext};
use opx_utxo::UtxoLedger;
use opx_vm::{
    BlockContext, ContractEvaluator, ContractRuntime, ContractSource, EvaluationError,
    EvaluationOutcome, EvaluationParams, EvaluationResult, SlotSource, TxContext, VmLimits,
};
use shared_types::{
    BlockHeader, BlockProcessedData, ConsensusRegistry, ContractAddress, ContractInformation,
    Epoch, EpochSubmission, Gas, RawBlock, ReceiptStatus, SlotValue, StoragePointer, Transaction,
    TransactionReceipt, TransactionType, ZERO_HASH, EPOCH_OPEN_SENTINEL,
};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::sync::{Arc, RwLock};
use tracing::{debug, info, warn};

/// Inputs and outputs visible to a contract are capped.
const MAX_VISIBLE_INPUTS: usize = 255;
const MAX_VISIBLE_OUTPUTS: usize = 255;

/// A fully processed block, ready to persist and announce.
#[derive(Debug, Clone)]
pub struct ProcessedBlock {
    pub header: BlockHeader,
    pub transactions: Vec<Transaction>,
    pub digest: BlockProcessedData,
}

/// Per-block state view: pending in-block writes over persisted state.
struct BlockStateView {
    storage: StorageEngine,
    snapshot_height: u64,
    overlay: RwLock<BTreeMap<(ContractAddress, StoragePointer), SlotValue>>,
}

impl SlotSource for BlockStateView {
    fn load_slot(
        &self,
        contract: &ContractAddress,
        pointer: &StoragePointer,
    ) -> Result<Option<SlotValue>, EvaluationError> {
        if let Ok(overlay) = self.overlay.read() {
            if let Some(value) = overlay.get(&(contract.clone(), *pointer)) {
                return Ok(Some(*value));
            }
        }
        self.storage
            .get_slot(contract, pointer, self.snapshot_height)
            .map_err(|err| EvaluationError::Storage(err.to_string()))
    }
}

/// Per-block contract view: in-block deployments over persisted records.
struct BlockContractView {
    storage: StorageEngine,
    pending: RwLock<Vec<ContractInformation>>,
}

impl ContractSource for BlockContractView {
    fn get_contract(
        &self,
        address: &ContractAddress,
        at_height: u64,
    ) -> Result<Option<ContractInformation>, EvaluationError> {
        if let Ok(pending) = self.pending.read() {
            if let Some(info) = pending.iter().find(|c| &c.address == address) {
                return Ok(Some(info.clone()));
            }
        }
        self.storage
            .get_contract(address, Some(at_height))
            .map_err(|err| EvaluationError::Storage(err.to_string()))
    }
}

/// The block processor. One instance per indexing worker; a given height
/// is processed by exactly one call at a time.
pub struct BlockProcessor {
    storage: StorageEngine,
    runtime: Arc<dyn ContractRuntime>,
    ledger: UtxoLedger,
    registry: ConsensusRegistry,
}

impl BlockProcessor {
    #[must_use]
    pub fn new(
        storage: StorageEngine,
        runtime: Arc<dyn ContractRuntime>,
        ledger: UtxoLedger,
        registry: ConsensusRegistry,
    ) -> Self {
        Self {
            storage,
            runtime,
            ledger,
            registry,
        }
    }

    /// Execute and finalize one block.
    ///
    /// Observes `cancel` between transaction groups and before the final
    /// storage commit.
    pub fn process_block(
        &self,
        raw: RawBlock,
        cancel: &CancelSignal,
    ) -> Result<ProcessedBlock, ProcessError> {
        let height = raw.height;
        let ruleset = self.registry.active_at(height)?.clone();

        let state_view = Arc::new(BlockStateView {
            storage: self.storage.clone(),
            snapshot_height: height,
            overlay: RwLock::new(BTreeMap::new()),
        });
        let contract_view = Arc::new(BlockContractView {
            storage: self.storage.clone(),
            pending: RwLock::new(Vec::new()),
        });
        let evaluator = ContractEvaluator::new(
            self.runtime.clone(),
            contract_view.clone(),
            state_view.clone(),
            VmLimits::from(&ruleset),
        );

        let mut transactions = raw.transactions;
        let groups = order_transactions(&transactions, ruleset.gas_penalty_factor);
        let mut state_tree = StateTree::new();
        let mut receipt_tree = ReceiptTree::new();
        let mut deployed: Vec<ContractInformation> = Vec::new();
        let mut submissions: Vec<EpochSubmission> = Vec::new();
        let mut pow_preimage: Option<Vec<u8>> = None;
        let mut gas_used_total: Gas = 0;

        for group in &groups {
            if cancel.is_cancelled() {
                return Err(ProcessError::Cancelled);
            }
            for &index in group {
                let result = self.dispatch(
                    &evaluator,
                    &transactions[index],
                    height,
                    raw.median_time,
                )?;
                gas_used_total = gas_used_total.saturating_add(result.gas_used);

                if result.outcome.is_ok() {
                    for (contract, slots) in &result.storage_writes {
                        for (pointer, value) in slots {
                            state_tree.update_value(contract, *pointer, *value)?;
                        }
                        if let Ok(mut overlay) = state_view.overlay.write() {
                            for (pointer, value) in slots {
                                overlay.insert((contract.clone(), *pointer), *value);
                            }
                        }
                    }
                    if !result.deployed_contracts.is_empty() {
                        if let Ok(mut pending) = contract_view.pending.write() {
                            pending.extend(result.deployed_contracts.iter().cloned());
                        }
                        deployed.extend(result.deployed_contracts.iter().cloned());
                    }
                }

                let tx = &mut transactions[index];
                if let Some(interaction) = &tx.interaction {
                    if let Some(preimage) = &interaction.preimage {
                        submissions.push(EpochSubmission {
                            epoch_number: height / ruleset.epoch_length,
                            submitter_public_key: interaction.from_public_key.clone(),
                            solution: preimage.clone(),
                            salt: tx.hash,
                            graffiti: None,
                            block_height: height,
                        });
                        if pow_preimage.is_none() {
                            pow_preimage = Some(preimage.clone());
                        }
                    }
                }

                let receipt = receipt_of(&result);
                let receipt_contract = tx
                    .interaction
                    .as_ref()
                    .map(|i| i.contract.clone())
                    .or_else(|| result.deployed_contracts.first().map(|c| c.address.clone()));
                if let Some(contract) = receipt_contract {
                    let encoded = bincode::serialize(&receipt)
                        .map_err(|err| ProcessError::Storage(err.into()))?;
                    receipt_tree.update_receipt(&contract, &tx.id, encoded)?;
                }
                tx.receipt = Some(receipt);
            }
        }

        if cancel.is_cancelled() {
            return Err(ProcessError::Cancelled);
        }

        self.finalize(
            height,
            raw.hash,
            raw.previous_block_hash,
            raw.time,
            raw.median_time,
            transactions,
            &mut state_tree,
            &mut receipt_tree,
            deployed,
            submissions,
            pow_preimage,
            gas_used_total,
            ruleset.epoch_length,
        )
    }

    /// Dispatch one transaction to the evaluator.
    ///
    /// Recoverable failures land on the receipt; only block-fatal errors
    /// propagate.
    fn dispatch(
        &self,
        evaluator: &ContractEvaluator,
        tx: &Transaction,
        height: u64,
        median_time: u64,
    ) -> Result<EvaluationResult, ProcessError> {
        match tx.kind {
            TransactionType::Interaction => {
                let Some(interaction) = &tx.interaction else {
                    return Ok(empty_success());
                };
                let params = EvaluationParams {
                    contract: interaction.contract.clone(),
                    calldata: interaction.calldata.clone(),
                    tx: TxContext {
                        tx_id: tx.id,
                        tx_hash: tx.hash,
                        origin: interaction.from_public_key.clone(),
                        inputs: tx.inputs.iter().take(MAX_VISIBLE_INPUTS).cloned().collect(),
                        outputs: tx.outputs.iter().take(MAX_VISIBLE_OUTPUTS).cloned().collect(),
                    },
                    block: BlockContext {
                        height,
                        median_time,
                        preimage: interaction.preimage.clone(),
                        reward: interaction.reward,
                    },
                    gas_limit: interaction.gas_limit,
                    access_list: None,
                    preloaded_storage: BTreeMap::new(),
                };
                match evaluator.execute(&params) {
                    Ok(result) => Ok(result),
                    Err(EvaluationError::MissingContract(addr)) => {
                        debug!(height, contract = %addr, "interaction with unknown contract");
                        Ok(EvaluationResult::failed(
                            EvaluationOutcome::Revert(
                                format!("missing contract: {addr}").into_bytes(),
                            ),
                            0,
                        ))
                    }
                    Err(fatal) => {
                        warn!(height, error = %fatal, "block-fatal evaluation failure");
                        Err(ProcessError::Evaluation(fatal))
                    }
                }
            }
            TransactionType::Deployment => {
                let Some(deployment) = &tx.deployment else {
                    return Ok(empty_success());
                };
                evaluator
                    .execute_deployment(deployment, height)
                    .map_err(ProcessError::Evaluation)
            }
            TransactionType::Generic | TransactionType::Coinbase => Ok(empty_success()),
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn finalize(
        &self,
        height: u64,
        hash: shared_types::Hash,
        previous_block_hash: shared_types::Hash,
        time: u64,
        median_time: u64,
        transactions: Vec<Transaction>,
        state_tree: &mut StateTree,
        receipt_tree: &mut ReceiptTree,
        deployed: Vec<ContractInformation>,
        submissions: Vec<EpochSubmission>,
        pow_preimage: Option<Vec<u8>>,
        gas_used: Gas,
        epoch_length: u64,
    ) -> Result<ProcessedBlock, ProcessError> {
        let storage_root = state_tree.root();
        let receipt_root = receipt_tree.root();
        state_tree.freeze();
        receipt_tree.freeze();

        let previous_block_checksum = match height.checked_sub(1) {
            Some(parent) => self
                .storage
                .get_block_header(parent)?
                .map_or(ZERO_HASH, |h| h.checksum_root),
            None => ZERO_HASH,
        };

        let inputs = ChecksumInputs {
            previous_block_checksum,
            block_hash: hash,
            previous_block_hash,
            storage_root,
            receipt_root,
            pow_preimage_commitment: ChecksumInputs::preimage_commitment(pow_preimage.as_deref()),
        };
        let checksum_root = block_checksum(&inputs);
        let proofs = checksum_proofs(&inputs);

        let header = BlockHeader {
            height,
            hash,
            previous_block_hash,
            previous_block_checksum,
            storage_root,
            receipt_root,
            checksum_root,
            checksum_proofs: proofs.clone(),
            pow_preimage,
            time,
            median_time,
            tx_count: transactions.len() as u32,
        };

        let digest = BlockProcessedData {
            height,
            block_hash: hash,
            previous_block_hash,
            checksum_root,
            previous_block_checksum,
            storage_root,
            receipt_root,
            checksum_proofs: proofs,
            tx_count: transactions.len() as u32,
            gas_used,
        };

        // One transactional context; all-or-nothing.
        let mut ctx = WriteContext::new();
        self.storage.save_block_header(&header, Some(&mut ctx))?;
        self.storage
            .save_block_transactions(&transactions, Some(&mut ctx))?;
        for info in &deployed {
            self.storage.insert_contract(info, Some(&mut ctx))?;
        }

        let slot_writes: Vec<SlotWrite> = state_tree
            .change_set()
            .map(|(contract, pointer, value)| SlotWrite {
                contract: contract.clone(),
                pointer: *pointer,
                value: *value,
                height,
            })
            .collect();
        self.storage.set_slot_batch(&slot_writes, Some(&mut ctx))?;

        self.ledger
            .insert_block_transactions(&transactions, height, Some(&mut ctx))?;
        self.storage.save_block_witness(&digest, Some(&mut ctx))?;

        for submission in &submissions {
            self.storage.save_epoch_submission(submission, Some(&mut ctx))?;
        }
        self.maintain_epochs(height, hash, epoch_length, &submissions, Some(&mut ctx))?;

        self.storage.commit(ctx)?;

        info!(
            height,
            tx_count = header.tx_count,
            gas_used,
            storage_root = %shared_types::encoding::to_hex(&storage_root),
            "block finalized"
        );

        Ok(ProcessedBlock {
            header,
            transactions,
            digest,
        })
    }

    /// Open and close epoch windows on block boundaries.
    fn maintain_epochs(
        &self,
        height: u64,
        block_hash: shared_types::Hash,
        epoch_length: u64,
        submissions: &[EpochSubmission],
        mut ctx: Option<&mut WriteContext>,
    ) -> Result<(), ProcessError> {
        if height % epoch_length != 0 {
            return Ok(());
        }
        let number = height / epoch_length;

        if let Some(active) = self.storage.get_active_epoch()? {
            if active.number < number {
                self.storage.update_epoch_end_block(
                    active.number,
                    height as i64 - 1,
                    ctx.as_deref_mut(),
                )?;
            }
        }

        // The winning submission (lowest solution hash) proposes the epoch.
        let winner = submissions.iter().min_by_key(|s| Sha256::digest(&s.solution));

        let mut epoch_hash = Sha256::new();
        epoch_hash.update(number.to_le_bytes());
        epoch_hash.update(block_hash);

        let epoch = Epoch {
            number,
            proposer_public_key: winner
                .map(|w| w.submitter_public_key.clone())
                .unwrap_or_default(),
            solution: winner.map(|w| w.solution.clone()).unwrap_or_default(),
            salt: winner.map_or(ZERO_HASH, |w| w.salt),
            graffiti: winner.and_then(|w| w.graffiti.clone()),
            difficulty: 0,
            start_block: height,
            end_block: EPOCH_OPEN_SENTINEL,
            epoch_hash: epoch_hash.finalize().into(),
            epoch_root: ZERO_HASH,
            target_hash: ZERO_HASH,
            proofs: Vec::new(),
        };
        self.storage.save_epoch(&epoch, ctx)?;
        Ok(())
    }
}

fn empty_success() -> EvaluationResult {
    EvaluationResult {
        outcome: EvaluationOutcome::Ok,
        result: Vec::new(),
        events: Vec::new(),
        storage_writes: BTreeMap::new(),
        loaded_storage: BTreeMap::new(),
        deployed_contracts: Vec::new(),
        gas_used: 0,
    }
}

fn receipt_of(result: &EvaluationResult) -> TransactionReceipt {
    let status = match &result.outcome {
        EvaluationOutcome::Ok => ReceiptStatus::Success,
        EvaluationOutcome::Revert(reason) => ReceiptStatus::Reverted(reason.clone()),
        EvaluationOutcome::OutOfGas => ReceiptStatus::OutOfGas,
        EvaluationOutcome::DepthExceeded => {
            ReceiptStatus::Reverted(b"call depth exceeded".to_vec())
        }
        EvaluationOutcome::Reentrancy(addr) => {
            ReceiptStatus::Reverted(format!("reentrancy: {addr}").into_bytes())
        }
    };
    TransactionReceipt {
        status,
        result: result.result.clone(),
        events: result.events.clone(),
        gas_used: result.gas_used,
        deployed_contracts: result
            .deployed_contracts
            .iter()
            .map(|c| c.address.clone())
            .collect(),
    }
}
