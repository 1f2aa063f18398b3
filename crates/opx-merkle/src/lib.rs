//! # Merkle Commitment Engine
//!
//! Builds the per-block cryptographic commitments: the state tree over
//! contract storage slots, the receipt tree over execution receipts, the
//! block checksum chaining consecutive blocks, and membership proofs for
//! light clients.
//!
//! ## Commitments
//!
//! - **StateTree**: leaves `(sha256(contract || pointer), value)`
//! - **ReceiptTree**: leaves `(sha256(contract || tx_id), receipt_bytes)`
//! - **Block checksum**: fixed 6-leaf tree over
//!   `(prev_checksum, block_hash, prev_hash, storage_root, receipt_root,
//!   pow_preimage)`
//!
//! All trees are single-writer per block; roots are recomputed lazily on
//! the first read after a write, and a frozen tree rejects further writes.

pub mod checksum;
pub mod proof;
pub mod receipt_tree;
pub mod state_tree;
pub mod tree;

pub use checksum::{block_checksum, checksum_proofs, verify_checksum_input, ChecksumInputs};
pub use proof::MerkleProof;
pub use receipt_tree::ReceiptTree;
pub use state_tree::StateTree;
pub use tree::{MerkleError, MerkleTree, EMPTY_TREE_ROOT_INPUT};
