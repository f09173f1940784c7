//! Ethereum-style address helpers for secp256k1 verification methods.

use super::errors::DidError;
use sha3::{Digest, Keccak256};

/// 20-byte external-chain address.
pub type EthAddress = [u8; 20];

/// Keccak256 hash function.
pub fn keccak256(data: &[u8]) -> [u8; 32] {
    let mut hasher = Keccak256::new();
    hasher.update(data);
    hasher.finalize().into()
}

/// Address of an uncompressed secp256k1 key given as `x || y` (64 bytes).
pub fn address_from_raw_pubkey(xy: &[u8]) -> Result<EthAddress, DidError> {
    if xy.len() != 64 {
        return Err(DidError::InvalidKey(format!(
            "secp256k1 public key must be 64 bytes, got {}",
            xy.len()
        )));
    }
    let hash = keccak256(xy);
    let mut address = [0u8; 20];
    address.copy_from_slice(&hash[12..]);
    Ok(address)
}

/// EIP-55 mixed-case checksum encoding, `0x` prefixed.
pub fn to_checksum_address(address: &EthAddress) -> String {
    let lower = hex::encode(address);
    let hash = keccak256(lower.as_bytes());
    let mut out = String::with_capacity(42);
    out.push_str("0x");
    for (i, c) in lower.chars().enumerate() {
        let nibble = (hash[i / 2] >> (if i % 2 == 0 { 4 } else { 0 })) & 0x0f;
        if c.is_ascii_alphabetic() && nibble >= 8 {
            out.push(c.to_ascii_uppercase());
        } else {
            out.push(c);
        }
    }
    out
}

/// Parse a `0x` address. Mixed-case input must carry a valid checksum.
pub fn parse_eth_address(s: &str) -> Result<EthAddress, DidError> {
    let body = s
        .strip_prefix("0x")
        .or_else(|| s.strip_prefix("0X"))
        .unwrap_or(s);
    let bytes = hex::decode(body)
        .map_err(|e| DidError::InvalidKey(format!("invalid address '{}': {}", s, e)))?;
    let address: EthAddress = bytes
        .try_into()
        .map_err(|_| DidError::InvalidKey(format!("address '{}' is not 20 bytes", s)))?;

    let mixed_case = body.chars().any(|c| c.is_ascii_uppercase())
        && body.chars().any(|c| c.is_ascii_lowercase());
    if mixed_case && to_checksum_address(&address)[2..] != *body {
        return Err(DidError::InvalidKey(format!("bad checksum for '{}'", s)));
    }
    Ok(address)
}
