//! # Shared Types Crate
//!
//! Cross-subsystem domain entities for the OPX indexer: blocks,
//! transactions, contracts, unspent outputs, epochs, and the error
//! taxonomy every subsystem converts into.
//!
//! ## Design Principles
//!
//! - **Single Source of Truth**: all cross-subsystem types live here.
//! - **No Back-References**: entities reference each other by height,
//!   hash, or index, never by pointer. A block owns its transactions;
//!   everything else looks them up.
//! - **Read-Only Consensus Context**: consensus parameters are an
//!   immutable array of rulesets resolved by block height, passed
//!   explicitly to components at startup.

pub mod address;
pub mod consensus;
pub mod encoding;
pub mod entities;
pub mod errors;
pub mod network;

pub use address::{Address, AddressKind};
pub use consensus::{ConsensusError, ConsensusRegistry, ConsensusRuleset};
pub use entities::*;
pub use errors::IndexerError;
pub use network::Network;
