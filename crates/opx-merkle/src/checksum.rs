//! # Block Checksum
//!
//! The secondary integrity link chaining consecutive blocks. The checksum
//! commits to six ordered 32-byte inputs via a fixed Merkle tree:
//!
//! 0. previous block checksum
//! 1. block hash
//! 2. previous block hash
//! 3. storage root
//! 4. receipt root
//! 5. proof-of-work preimage commitment (`sha256(preimage)`)
//!
//! Absent inputs are the zero hash. Each input carries a membership proof
//! so a light client can verify any single input against the checksum
//! root without the other five.

use crate::proof::{hash_leaf, hash_pair, MerkleProof};
use sha2::{Digest, Sha256};
use shared_types::{ChecksumProofEntry, Hash, ZERO_HASH};

/// Number of committed inputs.
pub const CHECKSUM_INPUT_COUNT: usize = 6;

/// The six ordered inputs of a block checksum.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChecksumInputs {
    pub previous_block_checksum: Hash,
    pub block_hash: Hash,
    pub previous_block_hash: Hash,
    pub storage_root: Hash,
    pub receipt_root: Hash,
    /// `sha256(pow_preimage)` or zero when the block carries none.
    pub pow_preimage_commitment: Hash,
}

impl ChecksumInputs {
    /// Commit a raw preimage; `None` commits the zero hash.
    #[must_use]
    pub fn preimage_commitment(preimage: Option<&[u8]>) -> Hash {
        match preimage {
            Some(bytes) => Sha256::digest(bytes).into(),
            None => ZERO_HASH,
        }
    }

    fn ordered(&self) -> [Hash; CHECKSUM_INPUT_COUNT] {
        [
            self.previous_block_checksum,
            self.block_hash,
            self.previous_block_hash,
            self.storage_root,
            self.receipt_root,
            self.pow_preimage_commitment,
        ]
    }
}

fn leaf_hashes(inputs: &ChecksumInputs) -> Vec<Hash> {
    inputs
        .ordered()
        .iter()
        .enumerate()
        .map(|(index, value)| hash_leaf(&(index as u32).to_le_bytes(), value))
        .collect()
}

fn next_level(level: &[Hash]) -> Vec<Hash> {
    level
        .chunks(2)
        .map(|pair| {
            let left = &pair[0];
            let right = pair.get(1).unwrap_or(left);
            hash_pair(left, right)
        })
        .collect()
}

/// The checksum root over the six inputs.
#[must_use]
pub fn block_checksum(inputs: &ChecksumInputs) -> Hash {
    let mut level = leaf_hashes(inputs);
    while level.len() > 1 {
        level = next_level(&level);
    }
    level[0]
}

/// Membership proofs for all six inputs, in input order.
#[must_use]
pub fn checksum_proofs(inputs: &ChecksumInputs) -> Vec<ChecksumProofEntry> {
    let leaves = leaf_hashes(inputs);
    (0..CHECKSUM_INPUT_COUNT)
        .map(|index| {
            let mut level = leaves.clone();
            let mut position = index;
            let mut siblings = Vec::new();
            while level.len() > 1 {
                let sibling_index = if position % 2 == 0 {
                    (position + 1).min(level.len() - 1)
                } else {
                    position - 1
                };
                siblings.push(level[sibling_index]);
                level = next_level(&level);
                position /= 2;
            }
            ChecksumProofEntry {
                index: index as u32,
                siblings,
            }
        })
        .collect()
}

/// Verify one committed input against a checksum root.
#[must_use]
pub fn verify_checksum_input(
    checksum_root: Hash,
    entry: &ChecksumProofEntry,
    input_value: Hash,
) -> bool {
    let leaf = hash_leaf(&entry.index.to_le_bytes(), &input_value);
    let proof = MerkleProof {
        leaf_index: entry.index,
        siblings: entry.siblings.clone(),
    };
    proof.verify(checksum_root, leaf)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_inputs() -> ChecksumInputs {
        ChecksumInputs {
            previous_block_checksum: [1u8; 32],
            block_hash: [2u8; 32],
            previous_block_hash: [3u8; 32],
            storage_root: [4u8; 32],
            receipt_root: [5u8; 32],
            pow_preimage_commitment: ChecksumInputs::preimage_commitment(Some(b"pow")),
        }
    }

    #[test]
    fn test_checksum_is_deterministic() {
        assert_eq!(block_checksum(&sample_inputs()), block_checksum(&sample_inputs()));
    }

    #[test]
    fn test_checksum_depends_on_each_input() {
        let base = block_checksum(&sample_inputs());
        let mut altered = sample_inputs();
        altered.storage_root = [9u8; 32];
        assert_ne!(block_checksum(&altered), base);
        let mut altered = sample_inputs();
        altered.pow_preimage_commitment = ZERO_HASH;
        assert_ne!(block_checksum(&altered), base);
    }

    #[test]
    fn test_all_six_proofs_verify() {
        let inputs = sample_inputs();
        let root = block_checksum(&inputs);
        let proofs = checksum_proofs(&inputs);
        assert_eq!(proofs.len(), CHECKSUM_INPUT_COUNT);

        let ordered = [
            inputs.previous_block_checksum,
            inputs.block_hash,
            inputs.previous_block_hash,
            inputs.storage_root,
            inputs.receipt_root,
            inputs.pow_preimage_commitment,
        ];
        for (entry, value) in proofs.iter().zip(ordered) {
            assert!(verify_checksum_input(root, entry, value));
        }
    }

    #[test]
    fn test_proof_rejects_swapped_inputs() {
        let inputs = sample_inputs();
        let root = block_checksum(&inputs);
        let proofs = checksum_proofs(&inputs);
        // Block hash proof must not verify the storage root value.
        assert!(!verify_checksum_input(root, &proofs[1], inputs.storage_root));
    }

    #[test]
    fn test_zero_preimage_commitment_for_empty_block() {
        assert_eq!(ChecksumInputs::preimage_commitment(None), ZERO_HASH);
    }
}
