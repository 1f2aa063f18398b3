//! # Contract Evaluator
//!
//! Deterministic, sandboxed, gas-metered execution of contract WASM
//! against a fixed storage snapshot.
//!
//! ## Evaluation loop
//!
//! A contract's storage footprint may be data-dependent. Execution runs
//! against an in-memory working set; reads that miss it are recorded as
//! discovered slots, and the contract is re-executed from a fresh
//! instance with the enlarged set until the set stabilizes. Given a fixed
//! snapshot the loop is deterministic and terminates.
//!
//! ## Safety rails
//!
//! - Gas: every host operation charges a fixed schedule cost; storage
//!   writes are byte-linear. Exhaustion is recoverable only at top level.
//! - Depth: call and deploy depth counters with configured maxima.
//! - Reentrancy: re-entering any address on the active call stack fails
//!   the transaction when the guard is enabled.

pub mod deploy;
pub mod errors;
pub mod evaluator;
pub mod gas;
pub mod params;
pub mod pool;
pub mod runtime;
pub mod testing;
pub mod wasm;

pub use deploy::{derive_contract_address, derive_tweaked_key};
pub use errors::EvaluationError;
pub use evaluator::{ContractEvaluator, ContractSource, SlotSource, VmLimits};
pub use gas::{costs, GasTracker};
pub use params::{
    AccessList, BlockContext, ContractSlots, EvaluationOutcome, EvaluationParams,
    EvaluationResult, SlotMap, TxContext,
};
pub use pool::EvaluatorPool;
pub use runtime::{ContractRuntime, RuntimeInstance};
pub use wasm::WasmRuntime;
