//! # Registry Instructions
//!
//! Typed instructions of the registry program, their wire data and the
//! message an external-chain key signs to authorise them.

use super::codec::{discriminator, RecordWriter, DISCRIMINATOR_LEN};
use super::entities::{Service, UpdateArgs, VerificationMethod};
use super::flags::VmFlags;
use super::identifier::Pubkey;
use serde::{Deserialize, Serialize};

/// Recoverable secp256k1 signature over an instruction message.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EthSignature {
    /// `r || s`
    #[serde(with = "signature_bytes")]
    pub signature: [u8; 64],
    /// Recovery id (0 or 1).
    pub recovery_id: u8,
}

mod signature_bytes {
    use serde::{de::Error, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8; 64], s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&hex::encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<[u8; 64], D::Error> {
        let encoded = String::deserialize(d)?;
        let bytes = hex::decode(encoded).map_err(D::Error::custom)?;
        bytes
            .try_into()
            .map_err(|_| D::Error::custom("signature must be 64 bytes"))
    }
}

/// Whether an instruction can carry, or already carries, an eth signature.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EthSignStatus {
    /// Instruction takes no eth signature.
    NotSupported,
    /// Signable and not yet signed.
    Unsigned,
    /// Signature already bound.
    Signed,
}

/// Program instruction with its arguments.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum DidInstruction {
    /// Allocate and write the generative record.
    Initialize {
        /// Account size in bytes.
        size: u32,
    },
    /// Reallocate the record account.
    Resize {
        /// New account size in bytes.
        size: u32,
    },
    /// Delete the record and reclaim its storage.
    Close,
    AddVerificationMethod {
        method: VerificationMethod,
    },
    RemoveVerificationMethod {
        fragment: String,
    },
    AddService {
        service: Service,
        /// Replace an existing service with the same fragment.
        allow_overwrite: bool,
    },
    RemoveService {
        fragment: String,
    },
    SetVmFlags {
        fragment: String,
        flags: VmFlags,
    },
    SetControllers {
        native: Vec<Pubkey>,
        other: Vec<String>,
    },
    /// Bulk replacement.
    Update(UpdateArgs),
    /// Create a current record from the legacy one.
    Migrate {
        /// Also close the legacy account.
        close_legacy: bool,
    },
}

impl DidInstruction {
    /// Instruction name used for the discriminator preimage.
    pub fn name(&self) -> &'static str {
        match self {
            DidInstruction::Initialize { .. } => "initialize",
            DidInstruction::Resize { .. } => "resize",
            DidInstruction::Close => "close",
            DidInstruction::AddVerificationMethod { .. } => "add_verification_method",
            DidInstruction::RemoveVerificationMethod { .. } => "remove_verification_method",
            DidInstruction::AddService { .. } => "add_service",
            DidInstruction::RemoveService { .. } => "remove_service",
            DidInstruction::SetVmFlags { .. } => "set_vm_flags",
            DidInstruction::SetControllers { .. } => "set_controllers",
            DidInstruction::Update(_) => "update",
            DidInstruction::Migrate { .. } => "migrate",
        }
    }

    /// Whether an eth signature may authorise this instruction.
    pub fn is_eth_signable(&self) -> bool {
        !matches!(
            self,
            DidInstruction::Initialize { .. } | DidInstruction::Migrate { .. }
        )
    }

    /// Discriminator followed by the encoded arguments.
    pub fn data(&self) -> Vec<u8> {
        let mut w = RecordWriter::new();
        w.write_raw(&discriminator(&format!("global:{}", self.name())));
        match self {
            DidInstruction::Initialize { size } | DidInstruction::Resize { size } => {
                w.write_u32(*size);
            }
            DidInstruction::Close => {}
            DidInstruction::AddVerificationMethod { method } => {
                w.write_method(method);
            }
            DidInstruction::RemoveVerificationMethod { fragment }
            | DidInstruction::RemoveService { fragment } => {
                w.write_str(fragment);
            }
            DidInstruction::AddService {
                service,
                allow_overwrite,
            } => {
                w.write_service(service).write_bool(*allow_overwrite);
            }
            DidInstruction::SetVmFlags { fragment, flags } => {
                w.write_str(fragment).write_u16(flags.bits());
            }
            DidInstruction::SetControllers { native, other } => {
                w.write_seq(native, |w, k| {
                    w.write_pubkey(k);
                })
                .write_seq(other, |w, c| {
                    w.write_str(c);
                });
            }
            DidInstruction::Update(args) => {
                w.write_update_args(args);
            }
            DidInstruction::Migrate { close_legacy } => {
                w.write_bool(*close_legacy);
            }
        }
        w.into_bytes()
    }
}

/// Account passed to an instruction.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountMeta {
    pub pubkey: Pubkey,
    pub is_signer: bool,
    pub is_writable: bool,
}

impl AccountMeta {
    pub fn writable(pubkey: Pubkey, is_signer: bool) -> Self {
        Self {
            pubkey,
            is_signer,
            is_writable: true,
        }
    }

    pub fn readonly(pubkey: Pubkey, is_signer: bool) -> Self {
        Self {
            pubkey,
            is_signer,
            is_writable: false,
        }
    }
}

/// Well-known accounts of a registry instruction.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct InstructionAccounts {
    /// Current-scheme record address.
    pub did_data: Pubkey,
    /// Key the instruction is executed under.
    pub authority: Pubkey,
    /// Fee and rent payer.
    pub payer: Pubkey,
    /// Legacy record address, for `migrate`.
    pub legacy_did_data: Option<Pubkey>,
}

/// An instruction ready for submission.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Instruction {
    /// Program that executes it.
    pub program_id: Pubkey,
    /// Accounts in program order: record, authority, payer, then extras.
    pub accounts: Vec<AccountMeta>,
    /// Typed arguments.
    pub kind: DidInstruction,
    /// Bound eth signature, if any.
    pub eth_signature: Option<EthSignature>,
}

impl Instruction {
    /// Build with the canonical account list for `kind`.
    pub fn new(program_id: Pubkey, accounts: InstructionAccounts, kind: DidInstruction) -> Self {
        // Eth-signed instructions may be submitted without the native authority.
        let mut metas = vec![
            AccountMeta::writable(accounts.did_data, false),
            AccountMeta::readonly(accounts.authority, false),
            AccountMeta::writable(accounts.payer, true),
        ];
        if let Some(legacy) = accounts.legacy_did_data {
            metas.push(AccountMeta::writable(legacy, false));
        }
        Self {
            program_id,
            accounts: metas,
            kind,
            eth_signature: None,
        }
    }

    /// Record account.
    pub fn did_data(&self) -> Option<Pubkey> {
        self.accounts.first().map(|a| a.pubkey)
    }

    /// Authority account.
    pub fn authority(&self) -> Option<Pubkey> {
        self.accounts.get(1).map(|a| a.pubkey)
    }

    /// Wire data.
    pub fn data(&self) -> Vec<u8> {
        self.kind.data()
    }

    pub fn eth_sign_status(&self) -> EthSignStatus {
        if !self.kind.is_eth_signable() {
            EthSignStatus::NotSupported
        } else if self.eth_signature.is_some() {
            EthSignStatus::Signed
        } else {
            EthSignStatus::Unsigned
        }
    }

    /// Bytes an external key signs to authorise this instruction at `nonce`.
    pub fn signing_message(&self, nonce: u64) -> Vec<u8> {
        let mut message = self.data();
        message.extend_from_slice(&nonce.to_le_bytes());
        message
    }

    /// Mark the authority account as a transaction signer.
    pub fn with_authority_signer(mut self) -> Self {
        if let Some(meta) = self.accounts.get_mut(1) {
            meta.is_signer = true;
        }
        self
    }
}

/// Length of the instruction discriminator.
pub const INSTRUCTION_DISCRIMINATOR_LEN: usize = DISCRIMINATOR_LEN;
