//! # Collections and Key Encodings
//!
//! One column family per collection. Keys are fixed-width big-endian
//! encodings so lexicographic order matches numeric order.

use shared_types::{Address, ContractAddress, StoragePointer, TxId};

/// The collections the engine persists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Collection {
    /// height → block header record
    Blocks,
    /// block hash → height
    BlockByHash,
    /// checksum root → height
    BlockByChecksum,
    /// tx hash → transaction record
    Transactions,
    /// height ‖ index → tx hash
    TxByBlock,
    /// contract address → contract record
    Contracts,
    /// tweaked pubkey → contract address
    ContractByTweaked,
    /// deploy height ‖ address → ()
    ContractByHeight,
    /// txid ‖ output index → unspent output record
    Utxo,
    /// address ‖ txid ‖ index → value
    UtxoByAddress,
    /// creating height ‖ outpoint → ()
    UtxoByHeight,
    /// spending height ‖ outpoint → ()
    UtxoTombstoneByHeight,
    /// sha256(contract) ‖ pointer ‖ height → slot value
    State,
    /// height ‖ state key → ()
    StateByHeight,
    /// epoch number → epoch record
    Epochs,
    /// start block → epoch number
    EpochByBlock,
    /// epoch number ‖ submitter → submission record
    EpochSubmissions,
    /// tx hash → pending transaction record
    Mempool,
    /// rollback time ‖ from height → reorg record
    Reorgs,
    /// height → block processed digest
    Witnesses,
    /// fixed keys → chain metadata
    Metadata,
}

impl Collection {
    /// All collections, in column-family creation order.
    pub const ALL: [Collection; 21] = [
        Collection::Blocks,
        Collection::BlockByHash,
        Collection::BlockByChecksum,
        Collection::Transactions,
        Collection::TxByBlock,
        Collection::Contracts,
        Collection::ContractByTweaked,
        Collection::ContractByHeight,
        Collection::Utxo,
        Collection::UtxoByAddress,
        Collection::UtxoByHeight,
        Collection::UtxoTombstoneByHeight,
        Collection::State,
        Collection::StateByHeight,
        Collection::Epochs,
        Collection::EpochByBlock,
        Collection::EpochSubmissions,
        Collection::Mempool,
        Collection::Reorgs,
        Collection::Witnesses,
        Collection::Metadata,
    ];

    /// Column family name.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::Blocks => "blocks",
            Self::BlockByHash => "block_by_hash",
            Self::BlockByChecksum => "block_by_checksum",
            Self::Transactions => "transactions",
            Self::TxByBlock => "tx_by_block",
            Self::Contracts => "contracts",
            Self::ContractByTweaked => "contract_by_tweaked",
            Self::ContractByHeight => "contract_by_height",
            Self::Utxo => "utxo",
            Self::UtxoByAddress => "utxo_by_address",
            Self::UtxoByHeight => "utxo_by_height",
            Self::UtxoTombstoneByHeight => "utxo_tombstone_by_height",
            Self::State => "state",
            Self::StateByHeight => "state_by_height",
            Self::Epochs => "epochs",
            Self::EpochByBlock => "epoch_by_block",
            Self::EpochSubmissions => "epoch_submissions",
            Self::Mempool => "mempool",
            Self::Reorgs => "reorgs",
            Self::Witnesses => "witnesses",
            Self::Metadata => "metadata",
        }
    }
}

// =============================================================================
// KEY BUILDERS
// =============================================================================

/// Big-endian block height key.
#[must_use]
pub fn height_key(height: u64) -> [u8; 8] {
    height.to_be_bytes()
}

/// Decode a big-endian height key.
#[must_use]
pub fn decode_height(key: &[u8]) -> Option<u64> {
    let bytes: [u8; 8] = key.get(..8)?.try_into().ok()?;
    Some(u64::from_be_bytes(bytes))
}

/// height ‖ index key for per-block transaction ordering.
#[must_use]
pub fn tx_by_block_key(height: u64, index: u32) -> Vec<u8> {
    let mut key = Vec::with_capacity(12);
    key.extend_from_slice(&height.to_be_bytes());
    key.extend_from_slice(&index.to_be_bytes());
    key
}

/// txid ‖ output index outpoint key.
#[must_use]
pub fn outpoint_key(tx_id: &TxId, output_index: u32) -> Vec<u8> {
    let mut key = Vec::with_capacity(36);
    key.extend_from_slice(tx_id);
    key.extend_from_slice(&output_index.to_be_bytes());
    key
}

/// address ‖ outpoint secondary-index key.
#[must_use]
pub fn utxo_address_key(address: &Address, tx_id: &TxId, output_index: u32) -> Vec<u8> {
    let canonical = address.to_string();
    let mut key = Vec::with_capacity(canonical.len() + 1 + 36);
    key.extend_from_slice(canonical.as_bytes());
    key.push(0);
    key.extend_from_slice(&outpoint_key(tx_id, output_index));
    key
}

/// Prefix selecting every outpoint of one address.
#[must_use]
pub fn utxo_address_prefix(address: &Address) -> Vec<u8> {
    let canonical = address.to_string();
    let mut prefix = Vec::with_capacity(canonical.len() + 1);
    prefix.extend_from_slice(canonical.as_bytes());
    prefix.push(0);
    prefix
}

/// sha256(contract) ‖ pointer state-slot prefix (height-agnostic).
#[must_use]
pub fn state_slot_prefix(contract: &ContractAddress, pointer: &StoragePointer) -> Vec<u8> {
    use sha2_digest::digest_contract;
    let mut key = Vec::with_capacity(64);
    key.extend_from_slice(&digest_contract(contract));
    key.extend_from_slice(pointer);
    key
}

/// Full state-slot key including the writing height.
#[must_use]
pub fn state_slot_key(contract: &ContractAddress, pointer: &StoragePointer, height: u64) -> Vec<u8> {
    let mut key = state_slot_prefix(contract, pointer);
    key.extend_from_slice(&height.to_be_bytes());
    key
}

/// height ‖ state key index entry for reorg deletion.
#[must_use]
pub fn state_by_height_key(height: u64, slot_key: &[u8]) -> Vec<u8> {
    let mut key = Vec::with_capacity(8 + slot_key.len());
    key.extend_from_slice(&height.to_be_bytes());
    key.extend_from_slice(slot_key);
    key
}

/// epoch number ‖ submitter key.
#[must_use]
pub fn epoch_submission_key(epoch_number: u64, submitter: &[u8]) -> Vec<u8> {
    let mut key = Vec::with_capacity(8 + submitter.len());
    key.extend_from_slice(&epoch_number.to_be_bytes());
    key.extend_from_slice(submitter);
    key
}

/// Fixed metadata keys.
pub mod meta {
    /// Highest fully persisted block height.
    pub const CHAIN_TIP: &[u8] = b"chain_tip";
}

mod sha2_digest {
    use shared_types::{ContractAddress, Hash};

    /// 32-byte digest of a contract address, keeping state keys fixed-width.
    pub fn digest_contract(contract: &ContractAddress) -> Hash {
        use sha2::{Digest, Sha256};
        Sha256::digest(contract.as_bytes()).into()
    }
}

pub use sha2_digest::digest_contract;

#[cfg(test)]
mod tests {
    use super::*;
    use shared_types::AddressKind;

    #[test]
    fn test_height_keys_sort_numerically() {
        assert!(height_key(1) < height_key(2));
        assert!(height_key(255) < height_key(256));
        assert_eq!(decode_height(&height_key(77)), Some(77));
    }

    #[test]
    fn test_state_keys_share_slot_prefix() {
        let contract = ContractAddress::new("oc1aa");
        let pointer = [0xAAu8; 32];
        let k1 = state_slot_key(&contract, &pointer, 100);
        let k2 = state_slot_key(&contract, &pointer, 101);
        assert!(k1.starts_with(&state_slot_prefix(&contract, &pointer)));
        assert!(k1 < k2);
    }

    #[test]
    fn test_address_prefix_selects_address_keys() {
        let addr = Address::new(AddressKind::P2wpkh, vec![0x11; 20]);
        let key = utxo_address_key(&addr, &[1u8; 32], 0);
        assert!(key.starts_with(&utxo_address_prefix(&addr)));
    }
}
