//! # API Encoding Helpers
//!
//! Wire encodings for the collaborator-facing surface: hashes and big
//! integers are `0x`-prefixed hex; storage pointers, values, and event
//! data are base64.

use crate::entities::Hash;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;

/// Encode bytes as `0x`-prefixed lowercase hex.
#[must_use]
pub fn to_hex(bytes: &[u8]) -> String {
    format!("0x{}", hex::encode(bytes))
}

/// Decode hex with or without a leading `0x`.
pub fn from_hex(input: &str) -> Result<Vec<u8>, hex::FromHexError> {
    let stripped = input.strip_prefix("0x").unwrap_or(input);
    hex::decode(stripped)
}

/// Encode a u64 as `0x`-prefixed hex without leading zeros.
#[must_use]
pub fn u64_to_hex(value: u64) -> String {
    format!("0x{value:x}")
}

/// Encode bytes as standard base64.
#[must_use]
pub fn to_base64(bytes: &[u8]) -> String {
    BASE64.encode(bytes)
}

/// Decode standard base64.
pub fn from_base64(input: &str) -> Result<Vec<u8>, base64::DecodeError> {
    BASE64.decode(input)
}

/// Normalize and validate a 64-hex-character hash parameter.
///
/// Lowercases the input and strips a leading `0x`; rejects anything that is
/// not exactly 64 hex characters.
pub fn parse_hash_param(input: &str) -> Option<Hash> {
    let normalized = input.trim().to_ascii_lowercase();
    let stripped = normalized.strip_prefix("0x").unwrap_or(&normalized);
    if stripped.len() != 64 {
        return None;
    }
    let bytes = hex::decode(stripped).ok()?;
    let mut hash = [0u8; 32];
    hash.copy_from_slice(&bytes);
    Some(hash)
}
