//! # Receipt Tree
//!
//! Per-block commitment over transaction receipts, keyed by
//! `sha256(contract_address_bytes || tx_id)`.

use crate::proof::{hash_leaf, MerkleProof};
use crate::tree::{MerkleError, MerkleTree};
use sha2::{Digest, Sha256};
use shared_types::{ContractAddress, Hash, TxId};

/// Receipt commitment tree for one block.
#[derive(Debug, Clone, Default)]
pub struct ReceiptTree {
    tree: MerkleTree,
}

impl ReceiptTree {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Leaf key for a (contract, transaction) receipt.
    #[must_use]
    pub fn encode_key(contract: &ContractAddress, tx_id: &TxId) -> Hash {
        let mut hasher = Sha256::new();
        hasher.update(contract.as_bytes());
        hasher.update(tx_id);
        hasher.finalize().into()
    }

    /// Record a receipt.
    pub fn update_receipt(
        &mut self,
        contract: &ContractAddress,
        tx_id: &TxId,
        receipt: Vec<u8>,
    ) -> Result<(), MerkleError> {
        self.tree.update(Self::encode_key(contract, tx_id), receipt)
    }

    /// Receipt bytes with a membership proof.
    pub fn get_receipt_with_proof(
        &mut self,
        contract: &ContractAddress,
        tx_id: &TxId,
    ) -> Option<(Vec<u8>, Hash, MerkleProof)> {
        let key = Self::encode_key(contract, tx_id);
        let receipt = self.tree.get(&key)?.clone();
        let root = self.tree.root();
        let proof = self.tree.prove(&key)?;
        Some((receipt, root, proof))
    }

    /// The receipt root, recomputed lazily.
    pub fn root(&mut self) -> Hash {
        self.tree.root()
    }

    /// Forbid further writes.
    pub fn freeze(&mut self) {
        self.tree.freeze();
    }

    #[must_use]
    pub fn has_changed(&self) -> bool {
        self.tree.has_changed()
    }

    /// Verify a receipt proof against a root.
    #[must_use]
    pub fn verify(
        root: Hash,
        contract: &ContractAddress,
        tx_id: &TxId,
        receipt: &[u8],
        proof: &MerkleProof,
    ) -> bool {
        proof.verify(root, hash_leaf(&Self::encode_key(contract, tx_id), receipt))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tree::MerkleTree;

    #[test]
    fn test_receipt_proof_roundtrip() {
        let mut tree = ReceiptTree::new();
        let contract = ContractAddress::new("oc1feed");
        let tx_id = [4u8; 32];
        tree.update_receipt(&contract, &tx_id, vec![1, 2, 3]).unwrap();

        let (receipt, root, proof) = tree.get_receipt_with_proof(&contract, &tx_id).unwrap();
        assert_eq!(receipt, vec![1, 2, 3]);
        assert!(ReceiptTree::verify(root, &contract, &tx_id, &receipt, &proof));
        assert!(!ReceiptTree::verify(root, &contract, &tx_id, &[9], &proof));
    }

    #[test]
    fn test_empty_receipt_tree_root() {
        let mut tree = ReceiptTree::new();
        assert_eq!(tree.root(), MerkleTree::empty_root());
        assert!(!tree.has_changed());
    }
}
