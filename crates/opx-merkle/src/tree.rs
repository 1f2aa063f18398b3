//! # Generic Merkle Tree
//!
//! A sorted-leaf SHA-256 Merkle tree over (32-byte key, value-bytes)
//! pairs. Leaves are ordered by key, so insertion order never affects the
//! root. Roots are recomputed lazily on the first read after a write; a
//! `dirty` flag tracks whether any write actually changed a value.
//!
//! Odd layers are handled by duplicating the trailing node, the same
//! pairing rule base-chain transaction trees use.

use crate::proof::{hash_leaf, hash_pair, MerkleProof};
use rayon::prelude::*;
use sha2::{Digest, Sha256};
use shared_types::Hash;
use std::collections::BTreeMap;
use thiserror::Error;

/// Input hashed to produce the sentinel root of an empty tree.
pub const EMPTY_TREE_ROOT_INPUT: &[u8] = b"";

/// Leaf count above which leaf hashing fans out across threads.
const PARALLEL_HASH_THRESHOLD: usize = 512;

/// Errors raised by tree mutation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MerkleError {
    /// The tree was frozen and no longer accepts writes.
    #[error("tree is frozen")]
    FrozenTree,
}

/// A sorted-leaf Merkle tree.
#[derive(Debug, Clone)]
pub struct MerkleTree {
    /// Leaf key → value bytes, ordered by key.
    leaves: BTreeMap<Hash, Vec<u8>>,
    /// Root cached since the last recompute.
    cached_root: Option<Hash>,
    /// Whether any write since construction changed a value.
    dirty: bool,
    /// Frozen trees reject writes.
    frozen: bool,
}

impl Default for MerkleTree {
    fn default() -> Self {
        Self::new()
    }
}

impl MerkleTree {
    #[must_use]
    pub fn new() -> Self {
        Self {
            leaves: BTreeMap::new(),
            cached_root: None,
            dirty: false,
            frozen: false,
        }
    }

    /// The sentinel root of a tree with no leaves.
    #[must_use]
    pub fn empty_root() -> Hash {
        Sha256::digest(EMPTY_TREE_ROOT_INPUT).into()
    }

    /// Insert or update a leaf.
    ///
    /// Idempotent when the value is unchanged: the `dirty` flag and cached
    /// root are left untouched.
    pub fn update(&mut self, key: Hash, value: Vec<u8>) -> Result<(), MerkleError> {
        if self.frozen {
            return Err(MerkleError::FrozenTree);
        }
        if self.leaves.get(&key) == Some(&value) {
            return Ok(());
        }
        self.leaves.insert(key, value);
        self.dirty = true;
        self.cached_root = None;
        Ok(())
    }

    /// Value at `key`, if present.
    #[must_use]
    pub fn get(&self, key: &Hash) -> Option<&Vec<u8>> {
        self.leaves.get(key)
    }

    /// Whether any write changed a value since construction.
    #[must_use]
    pub fn has_changed(&self) -> bool {
        self.dirty
    }

    /// Number of leaves.
    #[must_use]
    pub fn len(&self) -> usize {
        self.leaves.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.leaves.is_empty()
    }

    /// Forbid further writes.
    pub fn freeze(&mut self) {
        self.frozen = true;
    }

    #[must_use]
    pub fn is_frozen(&self) -> bool {
        self.frozen
    }

    /// The Merkle root, recomputing lazily if a write invalidated it.
    pub fn root(&mut self) -> Hash {
        if let Some(root) = self.cached_root {
            return root;
        }
        let root = self.compute_root();
        self.cached_root = Some(root);
        root
    }

    /// Membership proof for `key`, or `None` when absent.
    #[must_use]
    pub fn prove(&self, key: &Hash) -> Option<MerkleProof> {
        let index = self.leaves.keys().position(|k| k == key)?;
        let mut level = self.leaf_hashes();
        let mut siblings = Vec::new();
        let mut position = index;

        while level.len() > 1 {
            let sibling_index = if position % 2 == 0 {
                // Trailing odd node pairs with itself.
                (position + 1).min(level.len() - 1)
            } else {
                position - 1
            };
            siblings.push(level[sibling_index]);
            level = Self::next_level(&level);
            position /= 2;
        }

        Some(MerkleProof {
            leaf_index: index as u32,
            siblings,
        })
    }

    /// Sorted iteration over (key, value) pairs.
    pub fn iter(&self) -> impl Iterator<Item = (&Hash, &Vec<u8>)> {
        self.leaves.iter()
    }

    fn leaf_hashes(&self) -> Vec<Hash> {
        if self.leaves.len() >= PARALLEL_HASH_THRESHOLD {
            let pairs: Vec<(&Hash, &Vec<u8>)> = self.leaves.iter().collect();
            pairs
                .par_iter()
                .map(|(key, value)| hash_leaf(key.as_slice(), value))
                .collect()
        } else {
            self.leaves
                .iter()
                .map(|(key, value)| hash_leaf(key.as_slice(), value))
                .collect()
        }
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

    fn compute_root(&self) -> Hash {
        if self.leaves.is_empty() {
            return Self::empty_root();
        }
        let mut level = self.leaf_hashes();
        while level.len() > 1 {
            level = Self::next_level(&level);
        }
        level[0]
    }
}
