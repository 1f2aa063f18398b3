//! # Script Classification
//!
//! Recognizes the locking-script templates the ledger tracks and derives
//! the typed recipient address. Unrecognized scripts yield no address;
//! such outputs are not indexed as unspent.

use shared_types::{Address, AddressKind};

/// Derive a typed address from a locking script, when it matches a
/// recognized template.
#[must_use]
pub fn classify_script(script: &[u8]) -> Option<Address> {
    match script {
        // OP_DUP OP_HASH160 <20> OP_EQUALVERIFY OP_CHECKSIG
        [0x76, 0xA9, 0x14, hash @ .., 0x88, 0xAC] if hash.len() == 20 => {
            Some(Address::new(AddressKind::P2pkh, hash.to_vec()))
        }
        // OP_0 <20>
        [0x00, 0x14, hash @ ..] if hash.len() == 20 => {
            Some(Address::new(AddressKind::P2wpkh, hash.to_vec()))
        }
        // OP_HASH160 <20> OP_EQUAL
        [0xA9, 0x14, hash @ .., 0x87] if hash.len() == 20 => {
            Some(Address::new(AddressKind::P2shP2wpkh, hash.to_vec()))
        }
        // OP_1 <32>
        [0x51, 0x20, key @ ..] if key.len() == 32 => {
            Some(Address::new(AddressKind::P2tr, key.to_vec()))
        }
        // OP_16 <32>, the second-layer contract funding template
        [0x60, 0x20, key @ ..] if key.len() == 32 => {
            Some(Address::new(AddressKind::P2op, key.to_vec()))
        }
        _ => None,
    }
}

/// Build a P2WPKH locking script for a 20-byte key hash.
#[must_use]
pub fn p2wpkh_script(key_hash: &[u8; 20]) -> Vec<u8> {
    let mut script = Vec::with_capacity(22);
    script.extend_from_slice(&[0x00, 0x14]);
    script.extend_from_slice(key_hash);
    script
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_p2wpkh_roundtrip() {
        let script = p2wpkh_script(&[0x11; 20]);
        let address = classify_script(&script).unwrap();
        assert_eq!(address.kind, AddressKind::P2wpkh);
        assert_eq!(address.payload, vec![0x11; 20]);
    }

    #[test]
    fn test_p2pkh_template() {
        let mut script = vec![0x76, 0xA9, 0x14];
        script.extend_from_slice(&[0x22; 20]);
        script.extend_from_slice(&[0x88, 0xAC]);
        assert_eq!(classify_script(&script).unwrap().kind, AddressKind::P2pkh);
    }

    #[test]
    fn test_taproot_and_p2op_templates() {
        let mut taproot = vec![0x51, 0x20];
        taproot.extend_from_slice(&[0x33; 32]);
        assert_eq!(classify_script(&taproot).unwrap().kind, AddressKind::P2tr);

        let mut p2op = vec![0x60, 0x20];
        p2op.extend_from_slice(&[0x44; 32]);
        assert_eq!(classify_script(&p2op).unwrap().kind, AddressKind::P2op);
    }

    #[test]
    fn test_unrecognized_scripts_yield_none() {
        assert!(classify_script(&[]).is_none());
        assert!(classify_script(&[0x6A, 0x01, 0x00]).is_none()); // OP_RETURN
        assert!(classify_script(&[0x00, 0x14, 0x01]).is_none()); // truncated
    }
}
