//! # Address Model
//!
//! Typed recipient addresses for base-chain outputs. The canonical string
//! form is `<scheme>:<hex-payload>`; single-address API filters expand a
//! public key into every encoding via [`expand_public_key`].

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

/// The script templates the indexer recognizes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AddressKind {
    P2pkh,
    P2wpkh,
    P2shP2wpkh,
    P2tr,
    P2op,
}

impl AddressKind {
    /// Scheme prefix of the canonical string form.
    #[must_use]
    pub fn scheme(&self) -> &'static str {
        match self {
            Self::P2pkh => "p2pkh",
            Self::P2wpkh => "p2wpkh",
            Self::P2shP2wpkh => "p2sh-p2wpkh",
            Self::P2tr => "p2tr",
            Self::P2op => "p2op",
        }
    }
}

/// A typed recipient address.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Address {
    pub kind: AddressKind,
    /// Script payload: a 20-byte key hash or a 32-byte taproot key.
    pub payload: Vec<u8>,
}

impl Address {
    #[must_use]
    pub fn new(kind: AddressKind, payload: Vec<u8>) -> Self {
        Self { kind, payload }
    }

    /// Parse the canonical `<scheme>:<hex>` form.
    pub fn parse(canonical: &str) -> Option<Self> {
        let (scheme, payload_hex) = canonical.split_once(':')?;
        let kind = match scheme {
            "p2pkh" => AddressKind::P2pkh,
            "p2wpkh" => AddressKind::P2wpkh,
            "p2sh-p2wpkh" => AddressKind::P2shP2wpkh,
            "p2tr" => AddressKind::P2tr,
            "p2op" => AddressKind::P2op,
            _ => return None,
        };
        let payload = hex::decode(payload_hex).ok()?;
        Some(Self { kind, payload })
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kind.scheme(), hex::encode(&self.payload))
    }
}

/// 20-byte key hash used by the legacy and segwit-v0 templates.
#[must_use]
pub fn key_hash20(public_key: &[u8]) -> [u8; 20] {
    let digest = Sha256::digest(Sha256::digest(public_key));
    let mut out = [0u8; 20];
    out.copy_from_slice(&digest[..20]);
    out
}

/// X-only form of a public key (drops the parity byte when present).
#[must_use]
pub fn x_only(public_key: &[u8]) -> Vec<u8> {
    if public_key.len() == 33 {
        public_key[1..].to_vec()
    } else {
        public_key.to_vec()
    }
}

/// Expand a public key into every address encoding the indexer tracks.
///
/// Used by transaction queries when an address filter of length 1 is given:
/// the single entry is resolved to a public key and matched against all
/// encodings.
#[must_use]
pub fn expand_public_key(public_key: &[u8]) -> Vec<Address> {
    let hash20 = key_hash20(public_key).to_vec();
    let taproot = x_only(public_key);

    let mut script_hash = Sha256::new();
    script_hash.update([0x00, 0x14]);
    script_hash.update(&hash20);
    let p2sh_payload = script_hash.finalize()[..20].to_vec();

    let mut op_hash = Sha256::new();
    op_hash.update(b"p2op");
    op_hash.update(public_key);
    let p2op_payload = op_hash.finalize()[..20].to_vec();

    vec![
        Address::new(AddressKind::P2pkh, hash20.clone()),
        Address::new(AddressKind::P2wpkh, hash20),
        Address::new(AddressKind::P2shP2wpkh, p2sh_payload),
        Address::new(AddressKind::P2tr, taproot),
        Address::new(AddressKind::P2op, p2op_payload),
    ]
}
