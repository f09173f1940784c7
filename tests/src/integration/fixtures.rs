//! Shared fixtures: keys, ledgers and services.

use did_registry::{
    Cluster, DidIdentifier, DidService, EthSigner, InMemoryLedger, Pubkey, RegistryConfig,
    Service, VerificationMethod, VerificationMethodType, VmFlags,
};
use did_telemetry::TelemetryConfig;
use std::sync::{Arc, Once};

static LOGGING: Once = Once::new();

/// Quiet by default; set `DID_LOG_LEVEL=debug` to see `[did]` events.
fn init_logging() {
    LOGGING.call_once(|| {
        let mut config = TelemetryConfig::from_env();
        if std::env::var("DID_LOG_LEVEL").is_err() {
            config.log_level = "warn".to_string();
        }
        // Another harness may already own the global subscriber.
        let _ = did_telemetry::init_telemetry(&config);
    });
}

/// Fresh ed25519 authority key.
pub fn new_authority() -> Pubkey {
    let key = ed25519_dalek::SigningKey::generate(&mut rand::rngs::OsRng);
    Pubkey::new(key.verifying_key().to_bytes())
}

/// Fresh secp256k1 signer.
pub fn new_eth_signer() -> EthSigner {
    EthSigner::new(k256::ecdsa::SigningKey::random(&mut rand::thread_rng()))
}

pub fn ledger() -> Arc<InMemoryLedger> {
    init_logging();
    Arc::new(InMemoryLedger::new())
}

pub fn config() -> RegistryConfig {
    RegistryConfig::for_cluster(Cluster::Devnet)
}

pub fn identifier(authority: Pubkey) -> DidIdentifier {
    DidIdentifier::new(authority, Cluster::Devnet)
}

/// Service signed by the DID's own authority.
pub fn service_for(ledger: &Arc<InMemoryLedger>, authority: Pubkey) -> DidService<InMemoryLedger> {
    DidService::new(ledger.clone(), identifier(authority), config()).with_authority(authority)
}

/// Service for `authority`'s DID authorised only by an eth signer.
pub fn eth_service_for(
    ledger: &Arc<InMemoryLedger>,
    authority: Pubkey,
    signer: &EthSigner,
) -> DidService<InMemoryLedger> {
    DidService::new(ledger.clone(), identifier(authority), config()).with_eth_signer(signer.clone())
}

pub fn native_method(fragment: &str, key: Pubkey, flags: VmFlags) -> VerificationMethod {
    VerificationMethod::new(
        fragment,
        VerificationMethodType::NativeEd25519,
        key.as_bytes().to_vec(),
        flags,
    )
    .unwrap()
}

/// ExternalRecoverable method keyed by the signer's address.
pub fn eth_method(fragment: &str, signer: &EthSigner, flags: VmFlags) -> VerificationMethod {
    VerificationMethod::new(
        fragment,
        VerificationMethodType::ExternalRecoverable,
        signer.address().to_vec(),
        flags,
    )
    .unwrap()
}

pub fn service(fragment: &str) -> Service {
    Service::new(fragment, "LinkedDomains", format!("https://{}.example.com", fragment)).unwrap()
}
