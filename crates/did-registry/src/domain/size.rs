//! # Account Size Helper
//!
//! Analytic byte sizes of every record component. These must agree exactly
//! with what [`super::codec`] writes.

use super::codec::DISCRIMINATOR_LEN;
use super::entities::{DidRecord, Service, VerificationMethod, VerificationMethodType};
use super::identifier::DEFAULT_KEY_FRAGMENT;

const LEN_PREFIX: usize = 4;
const PUBKEY_LEN: usize = 32;
const FLAGS_LEN: usize = 2;
const METHOD_TYPE_LEN: usize = 1;
/// version + bump + nonce
const HEADER_LEN: usize = 1 + 1 + 8;

/// Bytes of one verification method.
pub fn size_of_method(method: &VerificationMethod) -> usize {
    LEN_PREFIX + method.fragment.len() + FLAGS_LEN + METHOD_TYPE_LEN + LEN_PREFIX + method.key_data.len()
}

/// Bytes of the genesis method.
pub fn size_of_default_method() -> usize {
    LEN_PREFIX
        + DEFAULT_KEY_FRAGMENT.len()
        + FLAGS_LEN
        + METHOD_TYPE_LEN
        + LEN_PREFIX
        + VerificationMethodType::NativeEd25519.key_len()
}

/// Bytes of one service.
pub fn size_of_service(service: &Service) -> usize {
    LEN_PREFIX
        + service.fragment.len()
        + LEN_PREFIX
        + service.service_type.len()
        + LEN_PREFIX
        + service.service_endpoint.len()
}

/// Bytes of one native controller.
pub fn size_of_native_controller() -> usize {
    PUBKEY_LEN
}

/// Bytes of one other-method controller.
pub fn size_of_other_controller(did: &str) -> usize {
    LEN_PREFIX + did.len()
}

/// Bytes of the record body (no discriminator).
pub fn size_of_record(record: &DidRecord) -> usize {
    HEADER_LEN
        + size_of_method(&record.initial_method)
        + LEN_PREFIX
        + record.methods.iter().map(size_of_method).sum::<usize>()
        + LEN_PREFIX
        + record.services.iter().map(size_of_service).sum::<usize>()
        + LEN_PREFIX
        + size_of_native_controller() * record.native_controllers.len()
        + LEN_PREFIX
        + record
            .other_controllers
            .iter()
            .map(|c| size_of_other_controller(c))
            .sum::<usize>()
}

/// Bytes the backing account must hold for this record.
pub fn total_storage_size(record: &DidRecord) -> usize {
    DISCRIMINATOR_LEN + size_of_record(record)
}

/// Smallest allocation `initialize` accepts.
pub fn minimum_initial_size() -> usize {
    DISCRIMINATOR_LEN + HEADER_LEN + size_of_default_method() + 4 * LEN_PREFIX
}
