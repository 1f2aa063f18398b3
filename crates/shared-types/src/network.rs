//! # Base-Chain Network Parameters
//!
//! The Bitcoin-family networks the indexer can observe. A custom network
//! must supply its own 4-byte magic.

use serde::{Deserialize, Serialize};

/// Base-chain network selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Network {
    Mainnet,
    Testnet,
    Testnet4,
    Regtest,
    Signet,
    /// A custom network identified solely by its magic bytes.
    Custom { magic: [u8; 4] },
}

impl Network {
    /// The 4-byte network magic used in the base-chain wire protocol.
    #[must_use]
    pub fn magic(&self) -> [u8; 4] {
        match self {
            Self::Mainnet => [0xF9, 0xBE, 0xB4, 0xD9],
            Self::Testnet => [0x0B, 0x11, 0x09, 0x07],
            Self::Testnet4 => [0x1C, 0x16, 0x3F, 0x28],
            Self::Regtest => [0xFA, 0xBF, 0xB5, 0xDA],
            Self::Signet => [0x0A, 0x03, 0xCF, 0x40],
            Self::Custom { magic } => *magic,
        }
    }

    /// Default RPC port of the base-chain node for this network.
    #[must_use]
    pub fn default_rpc_port(&self) -> u16 {
        match self {
            Self::Mainnet => 8332,
            Self::Testnet => 18332,
            Self::Testnet4 => 48332,
            Self::Regtest => 18443,
            Self::Signet => 38332,
            Self::Custom { .. } => 8332,
        }
    }
}

impl Default for Network {
    fn default() -> Self {
        Self::Regtest
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_magics_are_distinct() {
        let nets = [
            Network::Mainnet,
            Network::Testnet,
            Network::Testnet4,
            Network::Regtest,
            Network::Signet,
        ];
        for (i, a) in nets.iter().enumerate() {
            for b in &nets[i + 1..] {
                assert_ne!(a.magic(), b.magic());
            }
        }
    }

    #[test]
    fn test_custom_magic_passthrough() {
        let net = Network::Custom {
            magic: [1, 2, 3, 4],
        };
        assert_eq!(net.magic(), [1, 2, 3, 4]);
    }
}
