//! # Domain Errors
//!
//! Error taxonomy for the DID registry client.
//!
//! Statically determinable failures are raised before any instruction is built.
//! Ledger rejections arrive as [`LedgerError`] and are translated with
//! [`DidError::from_ledger`].

use thiserror::Error;

/// DID registry error types.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DidError {
    /// The DID string does not match `did:sol:[<cluster>:]<base58>[#<fragment>]`.
    #[error("Invalid DID: {0}")]
    InvalidDid(String),

    /// A verification method or service already uses this fragment.
    #[error("Fragment already in use: {0}")]
    FragmentAlreadyInUse(String),

    /// No verification method or service carries this fragment.
    #[error("Fragment not found: {0}")]
    FragmentNotFound(String),

    /// OwnershipProof/Protected requested through a path that may not set it.
    #[error("Guarded flag violation: {0}")]
    GuardedFlagViolation(String),

    /// The operation would leave no method holding CapabilityInvocation.
    #[error("Lockout violation: no verification method would retain CapabilityInvocation")]
    LockoutViolation,

    /// Controller is malformed or references the DID itself.
    #[error("Invalid controller: {0}")]
    InvalidController(String),

    /// No record is stored at the DID address.
    #[error("DID record absent: {0}")]
    RecordAbsent(String),

    /// A record is already stored at the DID address.
    #[error("DID record already initialized: {0}")]
    RecordAlreadyInitialized(String),

    /// Wrong signer or reused nonce.
    #[error("Signature verification failed: {0}")]
    SignatureVerificationFailure(String),

    /// Allocated storage is smaller than the record requires.
    #[error("Insufficient size: required {required}, available {available}")]
    InsufficientSize {
        /// Bytes required
        required: usize,
        /// Bytes allocated
        available: usize,
    },

    /// Stored bytes could not be decoded.
    #[error("Malformed record: {0}")]
    MalformedRecord(String),

    /// Document contains entries that cannot be mapped onto a record.
    #[error("Unsupported document: {0}")]
    UnsupportedDocument(String),

    /// Key data does not fit the declared method type.
    #[error("Invalid key: {0}")]
    InvalidKey(String),

    /// A composer slot that may only be filled once is already taken.
    #[error("Already set: {0}")]
    AlreadySet(&'static str),

    /// The instruction cannot take the requested signing path.
    #[error("Not supported: {0}")]
    NotSupported(String),

    /// Ledger rejected an instruction with a code this client does not map.
    #[error("Ledger rejected instruction: code={code} {message}")]
    LedgerRejected {
        /// Ledger error code
        code: u32,
        /// Ledger error message
        message: String,
    },

    /// Transport failure talking to the ledger.
    #[error("Network error: {0}")]
    Network(String),
}

/// Error codes reported by the ledger program.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum ProgramErrorCode {
    /// Record has not been initialized.
    RecordAbsent = 6000,
    /// Record already exists.
    RecordAlreadyInitialized = 6001,
    /// No authorised signer for the record.
    WrongAuthority = 6002,
    /// Eth signature did not recover to an authorised key or nonce mismatch.
    InvalidEthSignature = 6003,
    /// Fragment collision.
    FragmentAlreadyInUse = 6004,
    /// Unknown fragment.
    FragmentNotFound = 6005,
    /// Guarded flag transition.
    GuardedFlag = 6006,
    /// Last CapabilityInvocation removed.
    Lockout = 6007,
    /// Controller rejected.
    InvalidController = 6008,
    /// Account too small for the record.
    InsufficientSize = 6009,
    /// Account bytes could not be decoded.
    MalformedRecord = 6010,
}

impl ProgramErrorCode {
    /// Map a raw code back onto the program table.
    pub fn from_code(code: u32) -> Option<Self> {
        use ProgramErrorCode::*;
        [
            RecordAbsent,
            RecordAlreadyInitialized,
            WrongAuthority,
            InvalidEthSignature,
            FragmentAlreadyInUse,
            FragmentNotFound,
            GuardedFlag,
            Lockout,
            InvalidController,
            InsufficientSize,
            MalformedRecord,
        ]
        .into_iter()
        .find(|c| *c as u32 == code)
    }
}

/// Code for failures outside the program table.
pub const UNMAPPED_ERROR_CODE: u32 = 1;

/// Rejection reported by the ledger for a submitted instruction.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("ledger error {code}: {message}")]
pub struct LedgerError {
    /// Program error code (or transport code outside the program table).
    pub code: u32,
    /// Human readable message from the ledger.
    pub message: String,
}

impl LedgerError {
    /// Build a rejection from a program error code.
    pub fn program(code: ProgramErrorCode, message: impl Into<String>) -> Self {
        Self {
            code: code as u32,
            message: message.into(),
        }
    }
}

impl DidError {
    /// Translate a ledger rejection into the client taxonomy.
    pub fn from_ledger(err: LedgerError) -> Self {
        let LedgerError { code, message } = err;
        match ProgramErrorCode::from_code(code) {
            Some(ProgramErrorCode::RecordAbsent) => DidError::RecordAbsent(message),
            Some(ProgramErrorCode::RecordAlreadyInitialized) => {
                DidError::RecordAlreadyInitialized(message)
            }
            Some(ProgramErrorCode::WrongAuthority)
            | Some(ProgramErrorCode::InvalidEthSignature) => {
                DidError::SignatureVerificationFailure(message)
            }
            Some(ProgramErrorCode::FragmentAlreadyInUse) => DidError::FragmentAlreadyInUse(message),
            Some(ProgramErrorCode::FragmentNotFound) => DidError::FragmentNotFound(message),
            Some(ProgramErrorCode::GuardedFlag) => DidError::GuardedFlagViolation(message),
            Some(ProgramErrorCode::Lockout) => DidError::LockoutViolation,
            Some(ProgramErrorCode::InvalidController) => DidError::InvalidController(message),
            Some(ProgramErrorCode::InsufficientSize) => {
                // Ledger message carries "required <n> available <m>".
                let numbers: Vec<usize> = message
                    .split_whitespace()
                    .filter_map(|w| w.trim_matches(|c: char| !c.is_ascii_digit()).parse().ok())
                    .collect();
                match numbers.as_slice() {
                    [required, available] => DidError::InsufficientSize {
                        required: *required,
                        available: *available,
                    },
                    _ => DidError::LedgerRejected { code, message },
                }
            }
            Some(ProgramErrorCode::MalformedRecord) => DidError::MalformedRecord(message),
            None => DidError::LedgerRejected { code, message },
        }
    }

    /// The program error code the ledger reports for this failure, if any.
    pub fn program_code(&self) -> Option<ProgramErrorCode> {
        match self {
            DidError::RecordAbsent(_) => Some(ProgramErrorCode::RecordAbsent),
            DidError::RecordAlreadyInitialized(_) => Some(ProgramErrorCode::RecordAlreadyInitialized),
            DidError::SignatureVerificationFailure(_) => Some(ProgramErrorCode::InvalidEthSignature),
            DidError::FragmentAlreadyInUse(_) => Some(ProgramErrorCode::FragmentAlreadyInUse),
            DidError::FragmentNotFound(_) => Some(ProgramErrorCode::FragmentNotFound),
            DidError::GuardedFlagViolation(_) => Some(ProgramErrorCode::GuardedFlag),
            DidError::LockoutViolation => Some(ProgramErrorCode::Lockout),
            DidError::InvalidController(_) => Some(ProgramErrorCode::InvalidController),
            DidError::InsufficientSize { .. } => Some(ProgramErrorCode::InsufficientSize),
            DidError::MalformedRecord(_) => Some(ProgramErrorCode::MalformedRecord),
            _ => None,
        }
    }

    /// Express a failure the way the ledger program reports it.
    pub fn to_ledger(&self) -> LedgerError {
        let message = match self {
            DidError::RecordAbsent(m)
            | DidError::RecordAlreadyInitialized(m)
            | DidError::SignatureVerificationFailure(m)
            | DidError::FragmentAlreadyInUse(m)
            | DidError::FragmentNotFound(m)
            | DidError::GuardedFlagViolation(m)
            | DidError::InvalidController(m)
            | DidError::MalformedRecord(m) => m.clone(),
            DidError::InsufficientSize {
                required,
                available,
            } => format!("required {} available {}", required, available),
            DidError::LedgerRejected { code, message } => {
                return LedgerError {
                    code: *code,
                    message: message.clone(),
                }
            }
            other => other.to_string(),
        };
        match self.program_code() {
            Some(code) => LedgerError::program(code, message),
            None => LedgerError {
                code: UNMAPPED_ERROR_CODE,
                message,
            },
        }
    }
}

impl From<LedgerError> for DidError {
    fn from(err: LedgerError) -> Self {
        DidError::from_ledger(err)
    }
}
