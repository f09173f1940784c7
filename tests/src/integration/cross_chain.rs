//! Eth-signed instructions: nonce sequencing and replay protection.

use super::fixtures::*;
use did_registry::domain::{DidInstruction, EthSignStatus, VerificationMethodType};
use did_registry::{
    recover_signer, DidError, LedgerClient, Transaction, VerificationMethod, VmFlag, VmFlags,
};

fn invoke() -> VmFlags {
    VmFlags::from_array(&[VmFlag::CapabilityInvocation])
}

/// Authority-created record with an eth key holding CapabilityInvocation.
async fn record_with_eth_key(
    ledger: &std::sync::Arc<did_registry::InMemoryLedger>,
    method: VerificationMethod,
) -> did_registry::Pubkey {
    let authority = new_authority();
    service_for(ledger, authority)
        .add_verification_method(method)
        .unwrap()
        .execute()
        .await
        .unwrap();
    authority
}

#[tokio::test]
async fn test_batch_consumes_consecutive_nonces() {
    let ledger = ledger();
    let signer = new_eth_signer();
    let authority = record_with_eth_key(&ledger, eth_method("eth", &signer, invoke())).await;
    let svc = eth_service_for(&ledger, authority, &signer);
    let start = svc.get_record().await.unwrap().nonce;

    let mut builder = svc.add_service(service("a"), false).unwrap();
    builder.add_service(service("b"), false).unwrap();
    builder.remove_service("a").unwrap();
    let instructions = builder.instructions().await.unwrap();
    assert!(instructions.len() >= 3);

    for (i, ix) in instructions.iter().enumerate() {
        assert_eq!(ix.eth_sign_status(), EthSignStatus::Signed);
        let signature = ix.eth_signature.as_ref().unwrap();
        let nonce = start + i as u64;
        assert_eq!(
            recover_signer(&ix.signing_message(nonce), signature).unwrap(),
            signer.address()
        );
    }

    let count = instructions.len() as u64;
    let first = instructions[0].clone();
    ledger
        .submit(Transaction::new(instructions, vec![]))
        .await
        .unwrap();
    assert_eq!(svc.get_record().await.unwrap().nonce, start + count);

    // The signature was bound to a consumed nonce.
    let replay = ledger
        .submit(Transaction::new(vec![first], vec![]))
        .await
        .unwrap_err();
    assert!(matches!(
        DidError::from_ledger(replay),
        DidError::SignatureVerificationFailure(_)
    ));

    // The next build continues from the advanced nonce.
    svc.add_service(service("c"), true)
        .unwrap()
        .execute()
        .await
        .unwrap();
    let record = svc.get_record().await.unwrap();
    assert!(record.nonce > start + count);
    assert!(record.find_service("c").is_some());
}

#[tokio::test]
async fn test_full_key_method_authorises() {
    let ledger = ledger();
    let signer = new_eth_signer();
    let method = VerificationMethod::new(
        "eth-full",
        VerificationMethodType::ExternalFull,
        signer.public_key().to_vec(),
        invoke(),
    )
    .unwrap();
    let authority = record_with_eth_key(&ledger, method).await;

    eth_service_for(&ledger, authority, &signer)
        .add_service(service("hub"), false)
        .unwrap()
        .execute()
        .await
        .unwrap();
    assert_eq!(
        service_for(&ledger, authority)
            .get_record()
            .await
            .unwrap()
            .services
            .len(),
        1
    );
}

#[tokio::test]
async fn test_unregistered_eth_key_rejected() {
    let ledger = ledger();
    let registered = new_eth_signer();
    let authority = record_with_eth_key(&ledger, eth_method("eth", &registered, invoke())).await;

    let intruder = new_eth_signer();
    assert!(matches!(
        eth_service_for(&ledger, authority, &intruder)
            .add_service(service("spam"), false)
            .unwrap()
            .execute()
            .await,
        Err(DidError::SignatureVerificationFailure(_))
    ));
    assert_eq!(
        service_for(&ledger, authority).get_record().await.unwrap().nonce,
        0
    );
}

#[tokio::test]
async fn test_eth_key_without_invocation_rejected() {
    let ledger = ledger();
    let signer = new_eth_signer();
    let flags = VmFlags::from_array(&[VmFlag::Authentication]);
    let authority = record_with_eth_key(&ledger, eth_method("eth", &signer, flags)).await;

    assert!(matches!(
        eth_service_for(&ledger, authority, &signer)
            .remove_service("none")
            .unwrap()
            .execute()
            .await,
        Err(DidError::FragmentNotFound(_))
    ));
    assert!(matches!(
        eth_service_for(&ledger, authority, &signer)
            .set_vm_flags("eth", invoke())
            .unwrap()
            .execute()
            .await,
        Err(DidError::SignatureVerificationFailure(_))
    ));
}

#[tokio::test]
async fn test_eth_signer_may_add_own_self_signed_ownership() {
    let ledger = ledger();
    let signer = new_eth_signer();
    let authority = record_with_eth_key(&ledger, eth_method("eth", &signer, invoke())).await;

    let owned = VmFlags::from_array(&[VmFlag::CapabilityInvocation, VmFlag::OwnershipProof]);
    eth_service_for(&ledger, authority, &signer)
        .set_vm_flags("eth", owned)
        .unwrap()
        .execute()
        .await
        .unwrap();
    let record = service_for(&ledger, authority).get_record().await.unwrap();
    assert!(record.find_method("eth").unwrap().has_flag(VmFlag::OwnershipProof));

    // The authority is not the eth key and cannot protect it.
    let protected = owned.with(VmFlag::Protected);
    assert!(matches!(
        service_for(&ledger, authority)
            .set_vm_flags("eth", protected)
            .unwrap()
            .execute()
            .await,
        Err(DidError::GuardedFlagViolation(_))
    ));
}

#[tokio::test]
async fn test_eth_signer_cannot_guard_default_method() {
    let ledger = ledger();
    let signer = new_eth_signer();
    let authority = record_with_eth_key(&ledger, eth_method("eth", &signer, invoke())).await;
    let svc = eth_service_for(&ledger, authority, &signer);
    let guarded = VmFlags::from_array(&[
        VmFlag::CapabilityInvocation,
        VmFlag::OwnershipProof,
        VmFlag::Protected,
    ]);

    assert!(matches!(
        svc.set_vm_flags("default", guarded).unwrap().execute().await,
        Err(DidError::GuardedFlagViolation(_))
    ));

    // Hand-built instruction goes straight to the ledger.
    let mut instruction = svc
        .set_vm_flags("eth", invoke())
        .unwrap()
        .instructions()
        .await
        .unwrap()
        .into_iter()
        .find(|ix| matches!(ix.kind, DidInstruction::SetVmFlags { .. }))
        .unwrap();
    instruction.kind = DidInstruction::SetVmFlags {
        fragment: "default".to_string(),
        flags: guarded,
    };
    instruction.eth_signature = None;
    let nonce = svc.get_record().await.unwrap().nonce;
    signer.sign_instruction(&mut instruction, nonce).unwrap();

    let err = ledger
        .submit(Transaction::new(vec![instruction], vec![]))
        .await
        .unwrap_err();
    assert!(matches!(
        DidError::from_ledger(err),
        DidError::GuardedFlagViolation(_)
    ));
    let record = svc.get_record().await.unwrap();
    assert!(!record.initial_method.has_flag(VmFlag::Protected));
    assert_eq!(record.nonce, nonce);
}
