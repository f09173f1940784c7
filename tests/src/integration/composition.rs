//! Size accounting, allocation planning and controller normalisation.

use super::fixtures::*;
use did_registry::domain::{
    minimum_initial_size, size_of_service, DidInstruction, DocumentReference,
};
use did_registry::{total_storage_size, DidError, LedgerClient, Transaction, VmFlag, VmFlags};

fn kinds(instructions: &[did_registry::domain::Instruction]) -> Vec<&'static str> {
    instructions.iter().map(|ix| ix.kind.name()).collect()
}

#[tokio::test]
async fn test_add_then_remove_service_restores_size() {
    let ledger = ledger();
    let authority = new_authority();
    let svc = service_for(&ledger, authority);
    svc.initialize(minimum_initial_size() as u32)
        .unwrap()
        .execute()
        .await
        .unwrap();
    let before = total_storage_size(&svc.get_record().await.unwrap());

    let svc1 = did_registry::Service::new("svc1", "T", "E").unwrap();
    svc.add_service(svc1.clone(), false)
        .unwrap()
        .execute()
        .await
        .unwrap();
    let grown = total_storage_size(&svc.get_record().await.unwrap());
    assert_eq!(grown, before + size_of_service(&svc1));
    let allocated = ledger.account(&svc.record_address().unwrap()).unwrap().len();
    assert!(allocated >= grown);

    // Removal never plans a resize.
    let mut builder = svc.remove_service("svc1").unwrap();
    let instructions = builder.instructions().await.unwrap();
    assert_eq!(kinds(&instructions), vec!["remove_service"]);
    ledger
        .submit(Transaction::new(instructions, vec![authority]))
        .await
        .unwrap();

    assert_eq!(total_storage_size(&svc.get_record().await.unwrap()), before);
    // Storage is not shrunk.
    assert_eq!(
        ledger.account(&svc.record_address().unwrap()).unwrap().len(),
        allocated
    );
}

#[tokio::test]
async fn test_first_write_synthesises_initialize() {
    let ledger = ledger();
    let authority = new_authority();
    let svc = service_for(&ledger, authority);

    let mut builder = svc.add_service(service("a"), false).unwrap();
    builder.add_service(service("b"), false).unwrap();
    let instructions = builder.instructions().await.unwrap();
    assert_eq!(
        kinds(&instructions),
        vec!["initialize", "add_service", "add_service"]
    );
    let DidInstruction::Initialize { size } = instructions[0].kind else {
        panic!("expected initialize first");
    };
    assert_eq!(
        size as usize,
        minimum_initial_size() + size_of_service(&service("a")) + size_of_service(&service("b"))
    );

    ledger
        .submit(Transaction::new(instructions, vec![authority]))
        .await
        .unwrap();
    assert_eq!(svc.get_record().await.unwrap().services.len(), 2);
}

#[tokio::test]
async fn test_peak_intermediate_size_is_allocated() {
    let ledger = ledger();
    let authority = new_authority();
    let svc = service_for(&ledger, authority);
    svc.initialize(minimum_initial_size() as u32)
        .unwrap()
        .execute()
        .await
        .unwrap();

    // The final record is unchanged, but the add needs room first.
    let mut builder = svc.add_service(service("tmp"), false).unwrap();
    builder.remove_service("tmp").unwrap();
    let instructions = builder.instructions().await.unwrap();
    assert_eq!(
        kinds(&instructions),
        vec!["resize", "add_service", "remove_service"]
    );
    assert_eq!(
        instructions[0].kind,
        DidInstruction::Resize {
            size: (minimum_initial_size() + size_of_service(&service("tmp"))) as u32
        }
    );
    ledger
        .submit(Transaction::new(instructions, vec![authority]))
        .await
        .unwrap();
}

#[tokio::test]
async fn test_allocation_never_shrinks_across_writes() {
    let ledger = ledger();
    let authority = new_authority();
    let svc = service_for(&ledger, authority);
    let mut sizes = Vec::new();

    for i in 0..4 {
        svc.add_service(service(&format!("svc{}", i)), false)
            .unwrap()
            .execute()
            .await
            .unwrap();
        let record = svc.get_record().await.unwrap();
        let allocated = ledger.account(&svc.record_address().unwrap()).unwrap().len();
        assert!(allocated >= total_storage_size(&record));
        sizes.push(allocated);
    }
    for i in 0..4 {
        svc.remove_service(&format!("svc{}", i))
            .unwrap()
            .execute()
            .await
            .unwrap();
        sizes.push(ledger.account(&svc.record_address().unwrap()).unwrap().len());
    }
    assert!(sizes.windows(2).all(|w| w[0] <= w[1]));
}

#[tokio::test]
async fn test_explicit_resize_too_small_without_auto_allocate() {
    let ledger = ledger();
    let authority = new_authority();
    let svc = service_for(&ledger, authority);
    svc.initialize(minimum_initial_size() as u32)
        .unwrap()
        .execute()
        .await
        .unwrap();

    let mut builder = svc.resize(minimum_initial_size() as u32).unwrap().with_auto_allocate(false);
    builder.add_service(service("big"), false).unwrap();
    assert!(matches!(
        builder.execute().await,
        Err(DidError::InsufficientSize { .. })
    ));
    // Queue was cleared by the failed build.
    assert!(builder.is_empty());
}

#[tokio::test]
async fn test_duplicate_controllers_collapse() {
    let ledger = ledger();
    let authority = new_authority();
    let svc = service_for(&ledger, authority);
    let ethr = "did:ethr:0xabc1230000000000000000000000000000000000".to_string();
    let native = new_authority();

    svc.set_controllers(vec![native, native], vec![ethr.clone(), ethr.clone()])
        .unwrap()
        .execute()
        .await
        .unwrap();

    let record = svc.get_record().await.unwrap();
    assert_eq!(record.native_controllers, vec![native]);
    assert_eq!(record.other_controllers, vec![ethr.clone()]);

    let doc = svc.resolve().await.unwrap();
    assert_eq!(doc.controller.len(), 2);
    assert_eq!(doc.controller[1], DocumentReference::Reference(ethr));
}

#[tokio::test]
async fn test_self_controller_rejected() {
    let ledger = ledger();
    let authority = new_authority();
    let svc = service_for(&ledger, authority);
    assert!(matches!(
        svc.set_controllers(vec![authority], vec![]),
        Err(DidError::InvalidController(_))
    ));
    assert!(matches!(
        svc.set_controllers(vec![], vec!["not a did".to_string()]),
        Err(DidError::InvalidController(_))
    ));
}

#[tokio::test]
async fn test_native_controller_can_act() {
    let ledger = ledger();
    let authority = new_authority();
    let controller = new_authority();
    let svc = service_for(&ledger, authority);
    svc.set_controllers(vec![controller], vec![])
        .unwrap()
        .execute()
        .await
        .unwrap();

    let as_controller = did_registry::DidService::new(ledger.clone(), identifier(authority), config())
        .with_authority(controller);
    as_controller
        .add_service(service("ctl"), false)
        .unwrap()
        .execute()
        .await
        .unwrap();
    assert!(svc.get_record().await.unwrap().find_service("ctl").is_some());
}

#[tokio::test]
async fn test_update_from_document_round_trip() {
    let ledger = ledger();
    let authority = new_authority();
    let svc = service_for(&ledger, authority);
    let mut builder = svc
        .add_verification_method(native_method(
            "signing",
            new_authority(),
            VmFlags::from_array(&[VmFlag::Authentication, VmFlag::Assertion]),
        ))
        .unwrap();
    builder.add_service(service("hub"), false).unwrap();
    builder.execute().await.unwrap();
    let before = svc.get_record().await.unwrap();

    let mut doc = svc.resolve().await.unwrap();
    doc.service.clear();
    svc.update_from_document(&doc)
        .unwrap()
        .execute()
        .await
        .unwrap();

    let after = svc.get_record().await.unwrap();
    assert!(after.services.is_empty());
    assert_eq!(after.methods, before.methods);
    assert_eq!(after.initial_method.flags, before.initial_method.flags);
}
