//! # State Tree
//!
//! The per-block commitment over contract storage slots. Leaf keys are
//! `sha256(contract_address_bytes || pointer)`, values are the 32-byte
//! slot contents.

use crate::proof::{hash_leaf, MerkleProof};
use crate::tree::{MerkleError, MerkleTree};
use sha2::{Digest, Sha256};
use shared_types::{ContractAddress, Hash, SlotValue, StoragePointer};
use std::collections::BTreeMap;

/// State commitment tree for one block.
#[derive(Debug, Clone, Default)]
pub struct StateTree {
    tree: MerkleTree,
    /// Per-contract view of the slots in the tree, kept for proof
    /// enumeration and change-set extraction.
    by_contract: BTreeMap<ContractAddress, BTreeMap<StoragePointer, SlotValue>>,
}

impl StateTree {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Leaf key for a (contract, pointer) slot.
    #[must_use]
    pub fn encode_pointer(contract: &ContractAddress, pointer: &StoragePointer) -> Hash {
        let mut hasher = Sha256::new();
        hasher.update(contract.as_bytes());
        hasher.update(pointer);
        hasher.finalize().into()
    }

    /// Write one slot. Idempotent when the value is unchanged.
    pub fn update_value(
        &mut self,
        contract: &ContractAddress,
        pointer: StoragePointer,
        value: SlotValue,
    ) -> Result<(), MerkleError> {
        let key = Self::encode_pointer(contract, &pointer);
        self.tree.update(key, value.to_vec())?;
        self.by_contract
            .entry(contract.clone())
            .or_default()
            .insert(pointer, value);
        Ok(())
    }

    /// Write a batch of slots for one contract.
    pub fn update_values(
        &mut self,
        contract: &ContractAddress,
        values: &BTreeMap<StoragePointer, SlotValue>,
    ) -> Result<(), MerkleError> {
        for (pointer, value) in values {
            self.update_value(contract, *pointer, *value)?;
        }
        Ok(())
    }

    /// Current value of a slot, if the tree holds one.
    #[must_use]
    pub fn get_value(
        &self,
        contract: &ContractAddress,
        pointer: &StoragePointer,
    ) -> Option<SlotValue> {
        self.by_contract.get(contract)?.get(pointer).copied()
    }

    /// Value plus membership proof for a slot.
    pub fn get_value_with_proof(
        &mut self,
        contract: &ContractAddress,
        pointer: &StoragePointer,
    ) -> Option<(SlotValue, Hash, MerkleProof)> {
        let value = self.get_value(contract, pointer)?;
        let root = self.tree.root();
        let key = Self::encode_pointer(contract, pointer);
        let proof = self.tree.prove(&key)?;
        Some((value, root, proof))
    }

    /// All slots of one contract with their proofs.
    pub fn get_values_with_proofs(
        &mut self,
        contract: &ContractAddress,
    ) -> Vec<(StoragePointer, SlotValue, MerkleProof)> {
        let Some(slots) = self.by_contract.get(contract).cloned() else {
            return Vec::new();
        };
        // Root must be current before proofs are taken.
        let _ = self.tree.root();
        slots
            .into_iter()
            .filter_map(|(pointer, value)| {
                let key = Self::encode_pointer(contract, &pointer);
                self.tree.prove(&key).map(|proof| (pointer, value, proof))
            })
            .collect()
    }

    /// The state root, recomputed lazily.
    pub fn root(&mut self) -> Hash {
        self.tree.root()
    }

    /// Whether any write changed a value.
    #[must_use]
    pub fn has_changed(&self) -> bool {
        self.tree.has_changed()
    }

    /// Forbid further writes.
    pub fn freeze(&mut self) {
        self.tree.freeze();
    }

    /// Flat change-set of every slot in the tree, for storage persistence.
    pub fn change_set(
        &self,
    ) -> impl Iterator<Item = (&ContractAddress, &StoragePointer, &SlotValue)> {
        self.by_contract.iter().flat_map(|(contract, slots)| {
            slots
                .iter()
                .map(move |(pointer, value)| (contract, pointer, value))
        })
    }

    /// Verify a slot proof against a root.
    #[must_use]
    pub fn verify(
        root: Hash,
        contract: &ContractAddress,
        pointer: &StoragePointer,
        value: &SlotValue,
        proof: &MerkleProof,
    ) -> bool {
        let key = Self::encode_pointer(contract, pointer);
        proof.verify(root, hash_leaf(&key, value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tree::MerkleTree;

    fn contract(tag: &str) -> ContractAddress {
        ContractAddress::new(format!("oc1{tag}"))
    }

    fn pointer(n: u8) -> StoragePointer {
        let mut p = [0u8; 32];
        p[31] = n;
        p
    }

    #[test]
    fn test_single_slot_proof_verifies() {
        let mut tree = StateTree::new();
        let addr = contract("aa");
        let mut value = [0u8; 32];
        value[31] = 0x01;

        tree.update_value(&addr, pointer(0xAA), value).unwrap();
        let (got, root, proof) = tree.get_value_with_proof(&addr, &pointer(0xAA)).unwrap();
        assert_eq!(got, value);
        assert!(StateTree::verify(root, &addr, &pointer(0xAA), &value, &proof));
    }

    #[test]
    fn test_proof_rejects_wrong_value() {
        let mut tree = StateTree::new();
        let addr = contract("aa");
        tree.update_value(&addr, pointer(1), [1u8; 32]).unwrap();
        let (_, root, proof) = tree.get_value_with_proof(&addr, &pointer(1)).unwrap();
        assert!(!StateTree::verify(root, &addr, &pointer(1), &[2u8; 32], &proof));
    }

    #[test]
    fn test_idempotent_update_keeps_change_flag() {
        let mut tree = StateTree::new();
        let addr = contract("bb");
        assert!(!tree.has_changed());
        tree.update_value(&addr, pointer(1), [9u8; 32]).unwrap();
        assert!(tree.has_changed());
        let root = tree.root();
        tree.update_value(&addr, pointer(1), [9u8; 32]).unwrap();
        assert_eq!(tree.root(), root);
    }

    #[test]
    fn test_empty_tree_root_is_sentinel() {
        let mut tree = StateTree::new();
        assert_eq!(tree.root(), MerkleTree::empty_root());
    }

    #[test]
    fn test_per_contract_enumeration() {
        let mut tree = StateTree::new();
        let a = contract("aa");
        let b = contract("bb");
        tree.update_value(&a, pointer(1), [1u8; 32]).unwrap();
        tree.update_value(&a, pointer(2), [2u8; 32]).unwrap();
        tree.update_value(&b, pointer(3), [3u8; 32]).unwrap();

        let root = tree.root();
        let proofs = tree.get_values_with_proofs(&a);
        assert_eq!(proofs.len(), 2);
        for (ptr, value, proof) in &proofs {
            assert!(StateTree::verify(root, &a, ptr, value, proof));
        }
        assert!(tree.get_values_with_proofs(&contract("cc")).is_empty());
    }

    #[test]
    fn test_frozen_rejects_writes() {
        let mut tree = StateTree::new();
        tree.freeze();
        let err = tree.update_value(&contract("aa"), pointer(1), [0u8; 32]);
        assert!(err.is_err());
    }
}
