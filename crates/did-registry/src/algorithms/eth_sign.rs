//! # Cross-Chain Signing
//!
//! secp256k1 signatures that authorise registry instructions on behalf of
//! external-chain verification methods.
//!
//! The signed payload is `instruction data || nonce (u64 LE)`, hashed as an
//! Ethereum personal message.

use crate::domain::errors::DidError;
use crate::domain::eth_address::{keccak256, EthAddress};
use crate::domain::instruction::{EthSignature, Instruction};
use k256::ecdsa::{RecoveryId, Signature, SigningKey, VerifyingKey};
use std::fmt;

const PERSONAL_MESSAGE_PREFIX: &str = "\x19Ethereum Signed Message:\n";

/// Keccak256 of `"\x19Ethereum Signed Message:\n" || len || message`.
pub fn personal_message_hash(message: &[u8]) -> [u8; 32] {
    let mut prefixed = format!("{}{}", PERSONAL_MESSAGE_PREFIX, message.len()).into_bytes();
    prefixed.extend_from_slice(message);
    keccak256(&prefixed)
}

/// Uncompressed `x || y` of a secp256k1 key.
pub fn raw_public_key(key: &VerifyingKey) -> [u8; 64] {
    let point = key.to_encoded_point(false);
    let mut raw = [0u8; 64];
    // Skip the 0x04 tag.
    raw.copy_from_slice(&point.as_bytes()[1..]);
    raw
}

/// Derive the 20-byte address of a public key.
pub fn address_from_verifying_key(key: &VerifyingKey) -> EthAddress {
    let hash = keccak256(&raw_public_key(key));
    let mut address = [0u8; 20];
    address.copy_from_slice(&hash[12..]);
    address
}

/// Recover the signer address of a personal-message signature.
pub fn recover_signer(message: &[u8], signature: &EthSignature) -> Result<EthAddress, DidError> {
    let recovery_id = parse_recovery_id(signature.recovery_id)?;
    let sig = Signature::from_slice(&signature.signature).map_err(|_| {
        DidError::SignatureVerificationFailure("malformed signature".to_string())
    })?;
    let hash = personal_message_hash(message);
    let key = VerifyingKey::recover_from_prehash(&hash, &sig, recovery_id).map_err(|_| {
        DidError::SignatureVerificationFailure("public key recovery failed".to_string())
    })?;
    Ok(address_from_verifying_key(&key))
}

/// Accepts 0/1 and the legacy 27/28 encoding.
fn parse_recovery_id(v: u8) -> Result<RecoveryId, DidError> {
    let id = match v {
        0 | 27 => 0,
        1 | 28 => 1,
        _ => {
            return Err(DidError::SignatureVerificationFailure(format!(
                "invalid recovery id {}",
                v
            )))
        }
    };
    RecoveryId::from_byte(id).ok_or_else(|| {
        DidError::SignatureVerificationFailure(format!("invalid recovery id {}", v))
    })
}

/// Off-chain secp256k1 key used to sign instructions.
#[derive(Clone)]
pub struct EthSigner {
    key: SigningKey,
}

impl EthSigner {
    pub fn new(key: SigningKey) -> Self {
        Self { key }
    }

    /// Load from a 32-byte secret scalar.
    pub fn from_slice(secret: &[u8]) -> Result<Self, DidError> {
        SigningKey::from_slice(secret)
            .map(Self::new)
            .map_err(|_| DidError::InvalidKey("invalid secp256k1 secret key".to_string()))
    }

    /// Address recovered from this key's signatures.
    pub fn address(&self) -> EthAddress {
        address_from_verifying_key(self.key.verifying_key())
    }

    /// Uncompressed public key, the key data of a full external method.
    pub fn public_key(&self) -> [u8; 64] {
        raw_public_key(self.key.verifying_key())
    }

    /// Sign `message` as a personal message.
    pub fn sign_message(&self, message: &[u8]) -> Result<EthSignature, DidError> {
        let hash = personal_message_hash(message);
        let (sig, recovery_id) = self
            .key
            .sign_prehash_recoverable(&hash)
            .map_err(|e| DidError::InvalidKey(format!("signing failed: {}", e)))?;
        let mut signature = [0u8; 64];
        signature.copy_from_slice(&sig.to_bytes());
        Ok(EthSignature {
            signature,
            recovery_id: recovery_id.to_byte(),
        })
    }

    /// Bind `instruction` to `nonce` by signing it.
    pub fn sign_instruction(&self, instruction: &mut Instruction, nonce: u64) -> Result<(), DidError> {
        if !instruction.kind.is_eth_signable() {
            return Err(DidError::NotSupported(format!(
                "{} cannot be eth-signed",
                instruction.kind.name()
            )));
        }
        instruction.eth_signature = Some(self.sign_message(&instruction.signing_message(nonce))?);
        Ok(())
    }
}

impl fmt::Debug for EthSigner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EthSigner")
            .field("address", &hex::encode(self.address()))
            .finish()
    }
}
