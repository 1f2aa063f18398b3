//! # Contract Runtime Port
//!
//! The evaluator drives contract code through this interface. The
//! production adapter is [`crate::wasm::WasmRuntime`]; tests use the
//! scripted runtime in [`crate::testing`].
//!
//! ## Attempt protocol
//!
//! Execution is attempt-based. An attempt runs against a fixed working
//! set and a table of already-resolved external call/deploy responses.
//! When the contract needs something the attempt cannot answer (a slot
//! missing from the working set, or an unresolved external call or
//! deployment), the attempt stops and reports it; the evaluator resolves
//! the need and re-executes from a fresh instance. Given a fixed
//! snapshot, every attempt is deterministic.

use crate::errors::EvaluationError;
use crate::params::SlotMap;
use shared_types::{ContractAddress, ContractEvent, Gas, Hash, StoragePointer};
use std::collections::BTreeSet;

/// Resolved result of an external contract call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallResult {
    /// Whether the callee completed without reverting.
    pub success: bool,
    /// Bytes returned by the callee (empty on failure).
    pub result: Vec<u8>,
    /// Events the callee emitted, spliced into the caller's stream at the
    /// call site (empty on failure).
    pub events: Vec<ContractEvent>,
}

/// An external call the contract needs resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallRequest {
    pub target: ContractAddress,
    pub calldata: Vec<u8>,
}

/// A nested deployment the contract needs resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeployRequest {
    pub bytecode: Vec<u8>,
    pub salt_hash: Hash,
    pub seed: Hash,
}

/// Input of one execution attempt.
#[derive(Debug)]
pub struct ExecutionInput<'a> {
    /// ABI-encoded calldata.
    pub calldata: &'a [u8],
    /// Slots loaded so far; reads outside it are discovered, not served.
    pub working_set: &'a SlotMap,
    /// Responses for external calls, in call-occurrence order.
    pub call_responses: &'a [CallResult],
    /// Responses for nested deployments, in occurrence order.
    pub deploy_responses: &'a [ContractAddress],
    /// Gas budget for this attempt.
    pub gas_budget: Gas,
    /// Byte-linear storage-write price from the active ruleset.
    pub write_cost_per_byte: Gas,
}

/// Terminal state of one attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExecStatus {
    /// The entrypoint returned.
    Done(Vec<u8>),
    /// An external call beyond the response table.
    NeedsCall(CallRequest),
    /// A deployment beyond the response table.
    NeedsDeploy(DeployRequest),
    /// Contract-initiated revert.
    Reverted(Vec<u8>),
    /// The attempt exhausted its gas budget.
    OutOfGas,
}

/// Effects of one attempt.
#[derive(Debug, Clone)]
pub struct ExecutionEffects {
    pub status: ExecStatus,
    /// Slot writes of this attempt.
    pub writes: SlotMap,
    /// Events of this attempt (child events already spliced in).
    pub events: Vec<ContractEvent>,
    /// Every slot read, with the value observed.
    pub loaded: SlotMap,
    /// Reads that missed the working set.
    pub discovered: BTreeSet<StoragePointer>,
    /// Gas consumed by this attempt.
    pub gas_used: Gas,
}

/// One instantiated contract. Instances are cheap and single-attempt;
/// the evaluator re-instantiates for every attempt to keep execution
/// deterministic.
pub trait RuntimeInstance {
    /// The working set the contract declares up front.
    fn required_slots(&mut self, calldata: &[u8]) -> Result<Vec<StoragePointer>, EvaluationError>;

    /// Run one attempt.
    fn execute(&mut self, input: &ExecutionInput<'_>) -> Result<ExecutionEffects, EvaluationError>;
}

/// Factory for runtime instances.
pub trait ContractRuntime: Send + Sync {
    /// Instantiate the contract for one attempt.
    fn instantiate(
        &self,
        contract: &ContractAddress,
        bytecode: &[u8],
    ) -> Result<Box<dyn RuntimeInstance>, EvaluationError>;
}
