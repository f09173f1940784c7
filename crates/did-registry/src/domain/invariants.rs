//! # Domain Invariants
//!
//! Record rules checked client-side before instructions are built, and again
//! by the ledger adapter before state is written.

use super::codec::encode_record;
use super::entities::{DidRecord, UpdateArgs};
use super::errors::DidError;
use super::identifier::{is_generic_did, DidIdentifier, Pubkey, DID_METHOD};
use super::size::size_of_record;
use std::collections::HashSet;

/// Invariant: method fragments are unique across `[initial] + methods`.
pub fn invariant_unique_method_fragments(record: &DidRecord) -> Result<(), DidError> {
    let mut seen = HashSet::new();
    for method in record.all_methods() {
        if !seen.insert(method.fragment.as_str()) {
            return Err(DidError::FragmentAlreadyInUse(method.fragment.clone()));
        }
    }
    Ok(())
}

/// Invariant: service fragments are unique.
pub fn invariant_unique_service_fragments(record: &DidRecord) -> Result<(), DidError> {
    let mut seen = HashSet::new();
    for service in &record.services {
        if !seen.insert(service.fragment.as_str()) {
            return Err(DidError::FragmentAlreadyInUse(service.fragment.clone()));
        }
    }
    Ok(())
}

/// Invariant: at least one method keeps CapabilityInvocation.
pub fn invariant_no_lockout(record: &DidRecord) -> Result<(), DidError> {
    if record.invocation_keys().next().is_none() {
        return Err(DidError::LockoutViolation);
    }
    Ok(())
}

/// Invariant: serialized length equals the analytic size.
pub fn invariant_size_consistent(record: &DidRecord) -> Result<(), DidError> {
    let encoded = encode_record(record).len();
    let computed = size_of_record(record);
    if encoded != computed {
        return Err(DidError::MalformedRecord(format!(
            "encoded {} bytes but size helper computed {}",
            encoded, computed
        )));
    }
    Ok(())
}

/// All structural invariants of a record.
pub fn check_record(record: &DidRecord) -> Result<(), DidError> {
    for method in record.all_methods() {
        method.validate()?;
    }
    invariant_unique_method_fragments(record)?;
    invariant_unique_service_fragments(record)?;
    invariant_no_lockout(record)?;
    invariant_size_consistent(record)
}

/// Deduplicate controllers preserving first occurrence, moving `did:sol`
/// entries of `other` into the native set, and rejecting self references.
pub fn normalize_controllers(
    self_authority: &Pubkey,
    native: &[Pubkey],
    other: &[String],
) -> Result<(Vec<Pubkey>, Vec<String>), DidError> {
    let mut native_out: Vec<Pubkey> = Vec::new();
    let mut other_out: Vec<String> = Vec::new();

    let push_native = |key: Pubkey, out: &mut Vec<Pubkey>| -> Result<(), DidError> {
        if key == *self_authority {
            return Err(DidError::InvalidController(format!(
                "{} cannot control itself",
                key
            )));
        }
        if !out.contains(&key) {
            out.push(key);
        }
        Ok(())
    };

    for key in native {
        push_native(*key, &mut native_out)?;
    }

    for did in other {
        if did.starts_with(&format!("did:{}:", DID_METHOD)) {
            let parsed = DidIdentifier::parse(did)
                .map_err(|_| DidError::InvalidController(did.clone()))?;
            push_native(parsed.authority, &mut native_out)?;
            continue;
        }
        if !is_generic_did(did) || did.contains('#') {
            return Err(DidError::InvalidController(did.clone()));
        }
        if !other_out.contains(did) {
            other_out.push(did.clone());
        }
    }

    Ok((native_out, other_out))
}

/// Static checks on bulk update arguments. Lockout depends on the stored
/// genesis flags and is checked once the record is known.
pub fn invariant_update_args(args: &UpdateArgs) -> Result<(), DidError> {
    let mut seen = HashSet::new();
    for method in &args.verification_methods {
        method.validate()?;
        if !seen.insert(method.fragment.as_str()) {
            return Err(DidError::FragmentAlreadyInUse(method.fragment.clone()));
        }
    }
    let mut seen = HashSet::new();
    for service in &args.services {
        if !seen.insert(service.fragment.as_str()) {
            return Err(DidError::FragmentAlreadyInUse(service.fragment.clone()));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::entities::{Service, VerificationMethod, VerificationMethodType};
    use crate::domain::flags::{VmFlag, VmFlags};

    fn authority() -> Pubkey {
        Pubkey::new([1u8; 32])
    }

    fn record() -> DidRecord {
        DidRecord::generative(&authority(), 255)
    }

    fn method(fragment: &str, flags: VmFlags) -> VerificationMethod {
        VerificationMethod::new(
            fragment,
            VerificationMethodType::NativeEd25519,
            vec![2u8; 32],
            flags,
        )
        .unwrap()
    }

    #[test]
    fn test_duplicate_method_fragment() {
        let mut r = record();
        r.methods.push(method("default", VmFlags::NONE));
        assert_eq!(
            invariant_unique_method_fragments(&r),
            Err(DidError::FragmentAlreadyInUse("default".to_string()))
        );
    }

    #[test]
    fn test_duplicate_service_fragment() {
        let mut r = record();
        r.services.push(Service::new("s", "T", "E").unwrap());
        r.services.push(Service::new("s", "T2", "E2").unwrap());
        assert!(invariant_unique_service_fragments(&r).is_err());
    }

    #[test]
    fn test_method_and_service_may_share_fragment() {
        let mut r = record();
        r.services.push(Service::new("default", "T", "E").unwrap());
        assert!(check_record(&r).is_ok());
    }

    #[test]
    fn test_lockout() {
        let mut r = record();
        assert!(invariant_no_lockout(&r).is_ok());
        r.initial_method.flags.clear(VmFlag::CapabilityInvocation);
        assert_eq!(invariant_no_lockout(&r), Err(DidError::LockoutViolation));
        r.methods
            .push(method("backup", VmFlag::CapabilityInvocation.into()));
        assert!(invariant_no_lockout(&r).is_ok());
    }

    #[test]
    fn test_controllers_deduplicated() {
        let dup = "did:ethr:0xabc".to_string();
        let (native, other) =
            normalize_controllers(&authority(), &[], &[dup.clone(), dup.clone()]).unwrap();
        assert!(native.is_empty());
        assert_eq!(other, vec![dup]);
    }

    #[test]
    fn test_sol_controller_becomes_native() {
        let ctrl = Pubkey::new([9u8; 32]);
        let did = format!("did:sol:devnet:{}", ctrl);
        let (native, other) = normalize_controllers(&authority(), &[ctrl], &[did]).unwrap();
        assert_eq!(native, vec![ctrl]);
        assert!(other.is_empty());
    }

    #[test]
    fn test_self_controller_rejected() {
        assert!(matches!(
            normalize_controllers(&authority(), &[authority()], &[]),
            Err(DidError::InvalidController(_))
        ));
        let self_did = format!("did:sol:{}", authority());
        assert!(matches!(
            normalize_controllers(&authority(), &[], &[self_did]),
            Err(DidError::InvalidController(_))
        ));
    }

    #[test]
    fn test_malformed_controller_rejected() {
        for bad in ["not-a-did", "did:ethr:", "did:ethr:0xabc#key"] {
            assert!(matches!(
                normalize_controllers(&authority(), &[], &[bad.to_string()]),
                Err(DidError::InvalidController(_))
            ));
        }
    }

    #[test]
    fn test_update_args_duplicate_fragment() {
        let args = UpdateArgs {
            verification_methods: vec![
                method("a", VmFlag::Authentication.into()),
                method("a", VmFlag::CapabilityInvocation.into()),
            ],
            ..Default::default()
        };
        assert_eq!(
            invariant_update_args(&args),
            Err(DidError::FragmentAlreadyInUse("a".to_string()))
        );
    }
}
