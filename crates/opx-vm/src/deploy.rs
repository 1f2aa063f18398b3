//! # Deterministic Deployment Derivation
//!
//! A contract address is reproducible from (deployer key, salt hash,
//! seed); the tweaked public key commits the same inputs for the base
//! chain's Taproot-style spending path.

use sha2::{Digest, Sha256};
use shared_types::{ContractAddress, Hash};

/// Derive the canonical contract address.
#[must_use]
pub fn derive_contract_address(deployer: &[u8], salt_hash: &Hash, seed: &Hash) -> ContractAddress {
    let mut hasher = Sha256::new();
    hasher.update(b"opx-contract");
    hasher.update(deployer);
    hasher.update(salt_hash);
    hasher.update(seed);
    let digest = hasher.finalize();
    ContractAddress::new(format!("oc1{}", hex::encode(&digest[..20])))
}

/// Derive the tweaked public key committing to the contract.
#[must_use]
pub fn derive_tweaked_key(deployer: &[u8], salt_hash: &Hash, seed: &Hash) -> Vec<u8> {
    let mut hasher = Sha256::new();
    hasher.update(b"opx-tweak");
    hasher.update(deployer);
    hasher.update(salt_hash);
    hasher.update(seed);
    hasher.finalize().to_vec()
}
