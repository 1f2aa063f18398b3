//! # UTXO Ledger
//!
//! Maintains the spent/unspent output set with reorg-safe deletion and
//! restoration.
//!
//! ## Semantics
//!
//! - Block insertion derives, per transaction, the spent set (inputs'
//!   outpoints) and the unspent set (outputs at or above the dust
//!   threshold with a recoverable address).
//! - Spending tombstones the output with a `deleted_at_block` watermark;
//!   the record stays queryable so a reorg can restore it.
//! - Retention physically purges tombstones older than the configured
//!   window; the enable flag only switches the sweep on or off.

pub mod ledger;
pub mod script;

pub use ledger::{UtxoConfig, UtxoLedger};
pub use script::classify_script;
