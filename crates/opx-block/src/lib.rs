//! # Block Processor
//!
//! Orders a block's transactions, dispatches them to the contract
//! evaluator, accumulates the per-block change set into the state and
//! receipt trees, and finalizes the block into one atomic storage
//! commit.
//!
//! ## Ordering
//!
//! Executable transactions are partitioned into independence groups over
//! their touched (contract, pointer) sets. Groups are ranked by
//! `sum(gas_sat_fee) * GAS_PENALTY_FACTOR − sum(priority_fee)`, lower
//! rank first, ties broken by the lexicographic compare of the group's
//! concatenated indexing hashes. Within a group, base-chain order holds.

pub mod cancel;
pub mod error;
pub mod ordering;
pub mod processor;

pub use cancel::CancelSignal;
pub use error::ProcessError;
pub use ordering::{order_transactions, TouchSet};
pub use processor::{BlockProcessor, ProcessedBlock};
