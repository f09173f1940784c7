//! In-Memory Ledger Adapter
//!
//! Implements `LedgerClient` by executing registry instructions against an
//! in-process account map. Every instruction is re-validated the way the
//! registry program does it: address derivation, authorisation, nonce,
//! storage size and record invariants. A transaction either applies in full
//! or leaves no trace.

use crate::algorithms::eth_sign::recover_signer;
use crate::algorithms::operation::{AllocationState, DidOperation, PlanContext};
use crate::domain::{
    check_record, decode_account, decode_legacy_record, derive_address, encode_account,
    encode_legacy_record, minimum_initial_size, total_storage_size, AddressScheme, DidError,
    DidInstruction, DidRecord, EthAddress, Instruction, LedgerError, LegacyDidRecord, Pubkey, VerificationMethodType,
    DID_PROGRAM_ID, LEGACY_DID_PROGRAM_ID, UNMAPPED_ERROR_CODE,
};
use crate::domain::eth_address::address_from_raw_pubkey;
use crate::ports::outbound::{LedgerClient, Transaction};
use async_trait::async_trait;
use parking_lot::RwLock;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, info, warn};

/// Zero padding after a legacy record, as in fixed-size legacy accounts.
const LEGACY_ACCOUNT_PADDING: usize = 64;

/// Reference ledger running the registry program in memory.
pub struct InMemoryLedger {
    accounts: RwLock<HashMap<Pubkey, Vec<u8>>>,
    program_id: Pubkey,
    legacy_program_id: Pubkey,
    submitted: AtomicU64,
}

impl InMemoryLedger {
    /// Ledger running the default registry programs.
    pub fn new() -> Self {
        Self::with_programs(DID_PROGRAM_ID, LEGACY_DID_PROGRAM_ID)
    }

    /// Ledger running the given registry programs.
    pub fn with_programs(program_id: Pubkey, legacy_program_id: Pubkey) -> Self {
        Self {
            accounts: RwLock::new(HashMap::new()),
            program_id,
            legacy_program_id,
            submitted: AtomicU64::new(0),
        }
    }

    /// Store raw account data.
    pub fn set_account(&self, address: Pubkey, data: Vec<u8>) {
        self.accounts.write().insert(address, data);
    }

    /// Raw account data.
    pub fn account(&self, address: &Pubkey) -> Option<Vec<u8>> {
        self.accounts.read().get(address).cloned()
    }

    /// Write a legacy record at its derived address, zero padded.
    pub fn insert_legacy_record(&self, record: &LegacyDidRecord) -> Result<Pubkey, DidError> {
        let (address, _) =
            derive_address(&record.authority, AddressScheme::Legacy, &self.legacy_program_id)?;
        let mut data = encode_legacy_record(record);
        data.resize(data.len() + LEGACY_ACCOUNT_PADDING, 0);
        self.set_account(address, data);
        Ok(address)
    }

    /// Decoded current-scheme record of an authority.
    pub fn record_of(&self, authority: &Pubkey) -> Result<Option<DidRecord>, DidError> {
        let (address, _) = derive_address(authority, AddressScheme::Current, &self.program_id)?;
        self.account(&address)
            .map(|data| decode_account(&data))
            .transpose()
    }

    /// Number of transactions applied so far.
    pub fn transaction_count(&self) -> u64 {
        self.submitted.load(Ordering::SeqCst)
    }

    fn execute(
        &self,
        accounts: &mut HashMap<Pubkey, Vec<u8>>,
        instruction: &Instruction,
        transaction: &Transaction,
    ) -> Result<(), DidError> {
        if instruction.program_id != self.program_id {
            return Err(DidError::LedgerRejected {
                code: UNMAPPED_ERROR_CODE,
                message: format!("unknown program {}", instruction.program_id),
            });
        }
        let (did_data, authority) = match (instruction.did_data(), instruction.authority()) {
            (Some(d), Some(a)) => (d, a),
            _ => return Err(DidError::MalformedRecord("missing accounts".to_string())),
        };
        let (expected, bump) = derive_address(&authority, AddressScheme::Current, &self.program_id)?;
        if expected != did_data {
            return Err(DidError::SignatureVerificationFailure(format!(
                "{} is not the record address of {}",
                did_data, authority
            )));
        }

        match &instruction.kind {
            DidInstruction::Initialize { size } => {
                if accounts.contains_key(&did_data) {
                    return Err(DidError::RecordAlreadyInitialized(did_data.to_string()));
                }
                let size = *size as usize;
                if size < minimum_initial_size() {
                    return Err(DidError::InsufficientSize {
                        required: minimum_initial_size(),
                        available: size,
                    });
                }
                let mut data = encode_account(&DidRecord::generative(&authority, bump));
                data.resize(size, 0);
                accounts.insert(did_data, data);
                Ok(())
            }
            DidInstruction::Migrate { close_legacy } => {
                if accounts.contains_key(&did_data) {
                    return Err(DidError::RecordAlreadyInitialized(did_data.to_string()));
                }
                let (legacy_address, _) =
                    derive_address(&authority, AddressScheme::Legacy, &self.legacy_program_id)?;
                if instruction.accounts.get(3).map(|a| a.pubkey) != Some(legacy_address) {
                    return Err(DidError::SignatureVerificationFailure(
                        "legacy record account does not match authority".to_string(),
                    ));
                }
                let legacy = accounts
                    .get(&legacy_address)
                    .ok_or_else(|| DidError::RecordAbsent(legacy_address.to_string()))?;
                let mut record = decode_legacy_record(legacy)?.into_record(bump);
                check_record(&record)?;
                if !transaction.is_signed_by(&authority) {
                    authorize(&mut record, instruction, transaction)?;
                }
                accounts.insert(did_data, encode_account(&record));
                if *close_legacy {
                    accounts.remove(&legacy_address);
                }
                Ok(())
            }
            kind => {
                let data = accounts
                    .get(&did_data)
                    .ok_or_else(|| DidError::RecordAbsent(did_data.to_string()))?;
                let available = data.len();
                let mut record = decode_account(data)?;
                let ctx = authorize(&mut record, instruction, transaction)?;

                match kind {
                    DidInstruction::Resize { size } => {
                        let size = *size as usize;
                        let required = total_storage_size(&record);
                        if size < required {
                            return Err(DidError::InsufficientSize {
                                required,
                                available: size,
                            });
                        }
                        let mut data = encode_account(&record);
                        data.resize(size, 0);
                        accounts.insert(did_data, data);
                    }
                    DidInstruction::Close => {
                        accounts.remove(&did_data);
                    }
                    general => {
                        let op = DidOperation::from_instruction(general).ok_or_else(|| {
                            DidError::NotSupported(general.name().to_string())
                        })?;
                        let next = op.apply(&AllocationState::new(record, available), &ctx)?.record;
                        let required = total_storage_size(&next);
                        if required > available {
                            return Err(DidError::InsufficientSize {
                                required,
                                available,
                            });
                        }
                        let mut data = encode_account(&next);
                        data.resize(available, 0);
                        accounts.insert(did_data, data);
                    }
                }
                Ok(())
            }
        }
    }
}

impl Default for InMemoryLedger {
    fn default() -> Self {
        Self::new()
    }
}

/// Check the instruction is authorised for `record`, consuming a nonce for
/// eth-signed instructions. Returns the signer context.
fn authorize(
    record: &mut DidRecord,
    instruction: &Instruction,
    transaction: &Transaction,
) -> Result<PlanContext, DidError> {
    if let Some(signature) = &instruction.eth_signature {
        let signer = recover_signer(&instruction.signing_message(record.nonce), signature)?;
        if !record
            .invocation_keys()
            .any(|m| eth_key_matches(m.method_type, &m.key_data, &signer))
        {
            return Err(DidError::SignatureVerificationFailure(format!(
                "eth signer 0x{} cannot invoke at nonce {}",
                hex::encode(signer),
                record.nonce
            )));
        }
        record.nonce += 1;
        return Ok(PlanContext {
            native_signer: None,
            eth_signer: Some(signer),
        });
    }

    let native_signer = record
        .invocation_keys()
        .filter(|m| m.method_type == VerificationMethodType::NativeEd25519)
        .filter_map(|m| Pubkey::try_from_slice(&m.key_data).ok())
        .chain(record.native_controllers.iter().copied())
        .find(|key| transaction.is_signed_by(key));
    match native_signer {
        Some(signer) => Ok(PlanContext {
            native_signer: Some(signer),
            eth_signer: None,
        }),
        None => Err(DidError::SignatureVerificationFailure(
            "no capabilityInvocation key signed the transaction".to_string(),
        )),
    }
}

fn eth_key_matches(method_type: VerificationMethodType, key_data: &[u8], signer: &EthAddress) -> bool {
    match method_type {
        VerificationMethodType::ExternalRecoverable => key_data == &signer[..],
        VerificationMethodType::ExternalFull => {
            address_from_raw_pubkey(key_data).is_ok_and(|address| address == *signer)
        }
        VerificationMethodType::NativeEd25519 => false,
    }
}

#[async_trait]
impl LedgerClient for InMemoryLedger {
    async fn get_account(&self, address: &Pubkey) -> Result<Option<Vec<u8>>, LedgerError> {
        Ok(self.account(address))
    }

    async fn submit(&self, transaction: Transaction) -> Result<String, LedgerError> {
        let mut accounts = self.accounts.write();
        let mut staged = accounts.clone();

        for (index, instruction) in transaction.instructions.iter().enumerate() {
            debug!(
                "[did] ledger executing {} ({}/{})",
                instruction.kind.name(),
                index + 1,
                transaction.instructions.len()
            );
            if let Err(e) = self.execute(&mut staged, instruction, &transaction) {
                warn!(
                    "[did] ledger rejected {} at index {}: {}",
                    instruction.kind.name(),
                    index,
                    e
                );
                return Err(e.to_ledger());
            }
        }

        *accounts = staged;
        let seq = self.submitted.fetch_add(1, Ordering::SeqCst);

        let mut hasher = Sha256::new();
        hasher.update(seq.to_le_bytes());
        for instruction in &transaction.instructions {
            hasher.update(instruction.data());
        }
        let signature = bs58::encode(hasher.finalize()).into_string();
        info!(
            "[did] ledger confirmed {} instruction(s) as {}",
            transaction.instructions.len(),
            signature
        );
        Ok(signature)
    }
}
