//! # DID Registry Client
//!
//! Client for `did:sol` identifiers whose documents live in a single
//! on-chain account per authority key.
//!
//! **Architecture:** Hexagonal (Domain / Algorithms / Ports / Adapters / Service)
//!
//! ## Purpose
//!
//! - Parse and format `did:sol[:cluster]:<base58>` identifiers and derive
//!   their record addresses
//! - Decode stored records tolerantly (trailing padding, legacy layout)
//! - Account for storage size so composed transactions allocate enough space
//! - Compose ordered instruction lists, optionally authorised by an
//!   Ethereum key bound to the record nonce
//! - Resolve DID documents, falling back to legacy and generative records
//!
//! ## Safety Rules
//!
//! | Rule | Description |
//! |------|-------------|
//! | Ownership guard | Protected methods cannot be removed or have the guard changed |
//! | Lockout | Every mutation leaves a CapabilityInvocation key |
//! | Monotone size | Planned allocation never shrinks |
//! | Nonce binding | Eth signatures cover `data || nonce` and are not replayable |
//!
//! ## Module Structure
//!
//! ```text
//! did-registry/
//! ├── domain/          # Identifier, record, flags, codec, size, document
//! ├── algorithms/      # Operation fold, eth signing
//! ├── ports/           # DidRegistryApi, LedgerClient
//! ├── adapters/        # InMemoryLedger
//! └── service/         # DidService facade, transaction builder
//! ```

#![warn(clippy::all)]

pub mod adapters;
pub mod algorithms;
pub mod domain;
pub mod ports;
pub mod service;

// Re-exports
pub use adapters::InMemoryLedger;
pub use algorithms::{plan, recover_signer, AllocationState, DidOperation, EthSigner, PlanContext};
pub use domain::{
    decode_account, decode_legacy_record, encode_account, from_document, to_document,
    total_storage_size, AddressScheme, Cluster, DidDocument, DidError, DidIdentifier, DidRecord,
    FlagTransition, LegacyDidRecord, Pubkey, RegistryConfig, Service, UpdateArgs,
    VerificationMethod, VerificationMethodType, VmFlag, VmFlags,
};
pub use ports::{DidRegistryApi, LedgerClient, Transaction};
pub use service::{AllocationRequest, DidRegistry, DidService, DidTransactionBuilder, RecordSource};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
