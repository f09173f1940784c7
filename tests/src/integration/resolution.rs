//! Resolution fallback and legacy migration.

use super::fixtures::*;
use did_registry::domain::{DocumentReference, LegacyVerificationMethod};
use did_registry::{DidError, DidService, LegacyDidRecord, RecordSource, VmFlag};

#[tokio::test]
async fn test_fresh_address_resolves_generative_document() {
    let ledger = ledger();
    let authority = new_authority();
    let svc = service_for(&ledger, authority);

    let doc = svc.resolve().await.unwrap();
    let default_id = svc.identifier().qualified("default");

    assert_eq!(doc.id, svc.identifier().to_string());
    assert_eq!(doc.verification_method.len(), 1);
    assert_eq!(doc.verification_method[0].id, default_id);
    assert_eq!(
        doc.verification_method[0].public_key_base58,
        Some(authority.to_string())
    );
    assert_eq!(
        doc.capability_invocation,
        vec![DocumentReference::Reference("#default".to_string())]
    );
    assert!(default_id.ends_with("#default"));
    assert!(doc.service.is_empty());
    assert!(doc.controller.is_empty());

    // Nothing was written.
    assert!(!svc.is_initialized().await.unwrap());
    assert!(matches!(svc.get_record().await, Err(DidError::RecordAbsent(_))));
    assert_eq!(ledger.transaction_count(), 0);
}

#[tokio::test]
async fn test_closed_record_resolves_generative_again() {
    let ledger = ledger();
    let authority = new_authority();
    let svc = service_for(&ledger, authority);

    svc.add_service(service("hub"), false)
        .unwrap()
        .execute()
        .await
        .unwrap();
    assert_eq!(
        svc.resolve_record_with_source().await.unwrap().1,
        RecordSource::Current
    );

    svc.close().unwrap().execute().await.unwrap();
    let (record, source) = svc.resolve_record_with_source().await.unwrap();
    assert_eq!(source, RecordSource::Generative);
    assert!(record.services.is_empty());
}

fn legacy_record(authority: did_registry::Pubkey) -> LegacyDidRecord {
    let delegate = new_authority();
    LegacyDidRecord {
        authority,
        version: 0,
        controllers: vec![],
        methods: vec![
            LegacyVerificationMethod {
                fragment: "default".to_string(),
                key: authority,
            },
            LegacyVerificationMethod {
                fragment: "delegate".to_string(),
                key: delegate,
            },
        ],
        authentication: vec!["default".to_string(), "delegate".to_string()],
        capability_invocation: vec!["default".to_string()],
        services: vec![service("legacy-hub")],
        ..Default::default()
    }
}

#[tokio::test]
async fn test_legacy_record_resolves_then_migrates() {
    let ledger = ledger();
    let authority = new_authority();
    let svc = service_for(&ledger, authority);
    let legacy_address = ledger.insert_legacy_record(&legacy_record(authority)).unwrap();

    let (record, source) = svc.resolve_record_with_source().await.unwrap();
    assert_eq!(source, RecordSource::Legacy);
    assert!(record.initial_method.has_flag(VmFlag::Authentication));
    assert!(record.initial_method.has_flag(VmFlag::CapabilityInvocation));
    assert_eq!(record.methods.len(), 1);
    assert_eq!(record.services.len(), 1);

    svc.migrate(true).unwrap().execute().await.unwrap();

    let migrated = svc.get_record().await.unwrap();
    assert_eq!(migrated.methods, record.methods);
    assert_eq!(migrated.services, record.services);
    assert!(ledger.account(&legacy_address).is_none());
    assert_eq!(
        svc.resolve_record_with_source().await.unwrap().1,
        RecordSource::Current
    );
}

#[tokio::test]
async fn test_migrate_keeps_legacy_when_asked() {
    let ledger = ledger();
    let authority = new_authority();
    let svc = service_for(&ledger, authority);
    let legacy_address = ledger.insert_legacy_record(&legacy_record(authority)).unwrap();

    let mut builder = svc.migrate(false).unwrap();
    builder.remove_service("legacy-hub").unwrap();
    builder.execute().await.unwrap();

    assert!(svc.get_record().await.unwrap().services.is_empty());
    assert!(ledger.account(&legacy_address).is_some());
}

#[tokio::test]
async fn test_migrate_rejects_growing_operations() {
    let ledger = ledger();
    let authority = new_authority();
    let svc = service_for(&ledger, authority);
    ledger.insert_legacy_record(&legacy_record(authority)).unwrap();

    let mut builder = svc.migrate(true).unwrap();
    assert!(matches!(
        builder.add_service(service("extra"), false),
        Err(DidError::AlreadySet(_))
    ));

    let mut builder = svc.add_service(service("extra"), false).unwrap();
    assert!(matches!(builder.migrate(true), Err(DidError::AlreadySet(_))));
}

#[tokio::test]
async fn test_migrate_twice_fails() {
    let ledger = ledger();
    let authority = new_authority();
    let svc = service_for(&ledger, authority);
    ledger.insert_legacy_record(&legacy_record(authority)).unwrap();

    svc.migrate(false).unwrap().execute().await.unwrap();
    assert!(matches!(
        svc.migrate(false).unwrap().execute().await,
        Err(DidError::RecordAlreadyInitialized(_))
    ));
}

#[tokio::test]
async fn test_legacy_foreign_default_resolves_and_migrates() {
    let ledger = ledger();
    let authority = new_authority();
    let foreign = new_authority();
    let svc = service_for(&ledger, authority);
    let legacy = LegacyDidRecord {
        authority,
        controllers: vec![authority, foreign],
        methods: vec![LegacyVerificationMethod {
            fragment: "default".to_string(),
            key: foreign,
        }],
        capability_invocation: vec!["default".to_string()],
        ..Default::default()
    };
    ledger.insert_legacy_record(&legacy).unwrap();

    let doc = svc.resolve().await.unwrap();
    let ids: Vec<String> = doc.verification_method.iter().map(|m| m.id.clone()).collect();
    assert_eq!(
        ids,
        vec![
            svc.identifier().qualified("default"),
            svc.identifier().qualified("legacy-default"),
        ]
    );
    assert_eq!(doc.controller.len(), 1);

    svc.migrate(true).unwrap().execute().await.unwrap();
    let record = svc.get_record().await.unwrap();
    assert_eq!(record.methods.len(), 1);
    assert_eq!(record.methods[0].fragment, "legacy-default");
    assert_eq!(record.native_controllers, vec![foreign]);
}

#[tokio::test]
async fn test_migrate_by_stranger_rejected() {
    let ledger = ledger();
    let authority = new_authority();
    let legacy_address = ledger.insert_legacy_record(&legacy_record(authority)).unwrap();

    let stranger = new_authority();
    let svc = DidService::new(ledger.clone(), identifier(authority), config())
        .with_authority(stranger);
    assert!(matches!(
        svc.migrate(true).unwrap().execute().await,
        Err(DidError::SignatureVerificationFailure(_))
    ));
    assert!(!svc.is_initialized().await.unwrap());
    assert!(ledger.account(&legacy_address).is_some());
}
