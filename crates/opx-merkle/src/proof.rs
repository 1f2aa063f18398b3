//! # Merkle Membership Proofs
//!
//! Ordered-pair SHA-256 proofs. A proof carries the leaf index and the
//! sibling hash at each level; the index parity at each level decides
//! whether the running hash is the left or right operand.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use shared_types::Hash;

/// A membership proof for one leaf.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MerkleProof {
    /// Index of the leaf in the sorted leaf layer.
    pub leaf_index: u32,
    /// Sibling hashes from the leaf level up to (excluding) the root.
    pub siblings: Vec<Hash>,
}

impl MerkleProof {
    /// Recompute the root implied by `leaf_hash` and this proof.
    #[must_use]
    pub fn compute_root(&self, leaf_hash: Hash) -> Hash {
        let mut current = leaf_hash;
        let mut index = self.leaf_index;

        for sibling in &self.siblings {
            let mut hasher = Sha256::new();
            if index % 2 == 0 {
                hasher.update(current);
                hasher.update(sibling);
            } else {
                hasher.update(sibling);
                hasher.update(current);
            }
            current = hasher.finalize().into();
            index /= 2;
        }
        current
    }

    /// Verify `leaf_hash` against `root`.
    #[must_use]
    pub fn verify(&self, root: Hash, leaf_hash: Hash) -> bool {
        self.compute_root(leaf_hash) == root
    }
}

/// Hash a leaf: `sha256(key || value)`.
#[must_use]
pub fn hash_leaf(key: &[u8], value: &[u8]) -> Hash {
    let mut hasher = Sha256::new();
    hasher.update(key);
    hasher.update(value);
    hasher.finalize().into()
}

/// Hash an internal node: `sha256(left || right)`.
#[must_use]
pub fn hash_pair(left: &Hash, right: &Hash) -> Hash {
    let mut hasher = Sha256::new();
    hasher.update(left);
    hasher.update(right);
    hasher.finalize().into()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_level_proof() {
        let left = hash_leaf(b"a", b"1");
        let right = hash_leaf(b"b", b"2");
        let root = hash_pair(&left, &right);

        let proof_left = MerkleProof {
            leaf_index: 0,
            siblings: vec![right],
        };
        let proof_right = MerkleProof {
            leaf_index: 1,
            siblings: vec![left],
        };

        assert!(proof_left.verify(root, left));
        assert!(proof_right.verify(root, right));
        assert!(!proof_left.verify(root, right));
    }

    #[test]
    fn test_empty_proof_is_identity() {
        let leaf = hash_leaf(b"only", b"leaf");
        let proof = MerkleProof {
            leaf_index: 0,
            siblings: vec![],
        };
        assert!(proof.verify(leaf, leaf));
    }
}
