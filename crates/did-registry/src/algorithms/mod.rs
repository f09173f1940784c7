//! # Algorithms Module
//!
//! Pure planning over record operations, and cross-chain signing.

pub mod eth_sign;
pub mod operation;

pub use eth_sign::{
    address_from_verifying_key, personal_message_hash, raw_public_key, recover_signer, EthSigner,
};
pub use operation::{plan, AllocationState, DidOperation, PlanContext};
