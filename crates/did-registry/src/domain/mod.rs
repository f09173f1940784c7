//! # Domain Module
//!
//! Pure record logic for the DID registry: identifiers, flags, the binary
//! layout and its size accounting, document mapping and instructions.

pub mod codec;
pub mod config;
pub mod document;
pub mod entities;
pub mod errors;
pub mod eth_address;
pub mod flags;
pub mod identifier;
pub mod instruction;
pub mod invariants;
pub mod size;

pub use codec::{
    decode_account, decode_legacy_record, decode_record, encode_account, encode_legacy_record,
    encode_record, RecordReader, RecordWriter,
};
pub use config::RegistryConfig;
pub use document::{from_document, to_document, DidDocument, DocumentReference};
pub use entities::*;
pub use errors::*;
pub use eth_address::{keccak256, to_checksum_address, EthAddress};
pub use flags::{FlagTransition, VmFlag, VmFlags};
pub use identifier::*;
pub use instruction::*;
pub use invariants::*;
pub use size::*;
