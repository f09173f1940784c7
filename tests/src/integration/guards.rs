//! Ownership guard and lockout rules, enforced by both the composer and
//! the ledger.

use super::fixtures::*;
use did_registry::{DidError, DidService, VmFlag, VmFlags};

fn invoke() -> VmFlags {
    VmFlags::from_array(&[VmFlag::CapabilityInvocation])
}

#[tokio::test]
async fn test_guarded_flags_rejected_on_add() {
    let ledger = ledger();
    let svc = service_for(&ledger, new_authority());

    for guarded in [VmFlag::OwnershipProof, VmFlag::Protected] {
        let flags = VmFlags::from_array(&[VmFlag::Authentication, guarded]);
        assert!(matches!(
            svc.add_verification_method(native_method("k1", new_authority(), flags)),
            Err(DidError::GuardedFlagViolation(_))
        ));
    }
}

#[tokio::test]
async fn test_last_invocation_key_cannot_go() {
    let ledger = ledger();
    let svc = service_for(&ledger, new_authority());

    assert!(matches!(
        svc.remove_verification_method("default")
            .unwrap()
            .instructions()
            .await,
        Err(DidError::LockoutViolation)
    ));
    assert!(matches!(
        svc.set_vm_flags("default", VmFlags::from_array(&[VmFlag::Authentication]))
            .unwrap()
            .instructions()
            .await,
        Err(DidError::LockoutViolation)
    ));
    assert_eq!(ledger.transaction_count(), 0);
}

#[tokio::test]
async fn test_default_removable_once_another_key_invokes() {
    let ledger = ledger();
    let authority = new_authority();
    let svc = service_for(&ledger, authority);

    let mut builder = svc
        .add_verification_method(native_method("backup", new_authority(), invoke()))
        .unwrap();
    builder.remove_verification_method("default").unwrap();
    builder.execute().await.unwrap();

    let record = svc.get_record().await.unwrap();
    assert!(!record.initial_method.has_flag(VmFlag::CapabilityInvocation));
    assert!(record.find_method("backup").is_some());

    // The authority alone can no longer act.
    assert!(matches!(
        svc.add_service(service("late"), false).unwrap().execute().await,
        Err(DidError::SignatureVerificationFailure(_))
    ));
}

#[tokio::test]
async fn test_protected_method_survives_removal() {
    let ledger = ledger();
    let authority = new_authority();
    let key = new_authority();
    let svc = service_for(&ledger, authority);
    svc.add_verification_method(native_method("device", key, invoke()))
        .unwrap()
        .execute()
        .await
        .unwrap();

    // Only the key itself may protect its own method.
    let protected = VmFlags::from_array(&[VmFlag::CapabilityInvocation, VmFlag::Protected]);
    assert!(matches!(
        svc.set_vm_flags("device", protected)
            .unwrap()
            .instructions()
            .await,
        Err(DidError::GuardedFlagViolation(_))
    ));

    let as_device = DidService::new(ledger.clone(), identifier(authority), config()).with_authority(key);
    as_device
        .set_vm_flags("device", protected)
        .unwrap()
        .execute()
        .await
        .unwrap();
    assert!(svc
        .get_record()
        .await
        .unwrap()
        .find_method("device")
        .unwrap()
        .has_flag(VmFlag::Protected));

    assert!(matches!(
        svc.remove_verification_method("device")
            .unwrap()
            .execute()
            .await,
        Err(DidError::GuardedFlagViolation(_))
    ));
}

#[tokio::test]
async fn test_failed_transaction_leaves_no_trace() {
    let ledger = ledger();
    let authority = new_authority();
    let stranger = DidService::new(ledger.clone(), identifier(authority), config())
        .with_authority(new_authority());

    // Initialize needs no authority, the add that follows does.
    assert!(matches!(
        stranger
            .add_service(service("spam"), false)
            .unwrap()
            .execute()
            .await,
        Err(DidError::SignatureVerificationFailure(_))
    ));
    assert!(!service_for(&ledger, authority).is_initialized().await.unwrap());
    assert_eq!(ledger.transaction_count(), 0);
}

#[tokio::test]
async fn test_duplicate_fragment_rejected() {
    let ledger = ledger();
    let svc = service_for(&ledger, new_authority());
    svc.add_service(service("hub"), false)
        .unwrap()
        .execute()
        .await
        .unwrap();

    assert!(matches!(
        svc.add_service(service("hub"), false)
            .unwrap()
            .execute()
            .await,
        Err(DidError::FragmentAlreadyInUse(_))
    ));
    let replacement = did_registry::Service::new("hub", "Hub", "https://new.example").unwrap();
    svc.add_service(replacement.clone(), true)
        .unwrap()
        .execute()
        .await
        .unwrap();
    assert_eq!(
        svc.get_record().await.unwrap().find_service("hub"),
        Some(&replacement)
    );
}
