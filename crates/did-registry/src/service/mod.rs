//! # DID Service
//!
//! Application service layer: a facade per DID over the ledger port, and
//! the registry-wide resolver implementing `DidRegistryApi`.

mod builder;

pub use builder::{AllocationRequest, DidTransactionBuilder};

use crate::algorithms::eth_sign::EthSigner;
use crate::domain::{
    check_record, decode_account, decode_legacy_record, from_document, to_document, AddressScheme, DidDocument,
    DidError, DidIdentifier, DidRecord, Pubkey, RegistryConfig, Service, UpdateArgs,
    VerificationMethod, VmFlags,
};
use crate::ports::inbound::DidRegistryApi;
use crate::ports::outbound::LedgerClient;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, info};

/// Where a resolved record came from.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RecordSource {
    /// Stored current-scheme record.
    Current,
    /// Stored legacy record, mapped onto the current layout.
    Legacy,
    /// Never written; derived from the identifier alone.
    Generative,
}

/// Facade over one DID.
///
/// Every mutating operation returns a [`DidTransactionBuilder`] with the
/// operation queued, so further operations can be chained before
/// `execute()`.
pub struct DidService<L: LedgerClient> {
    ledger: Arc<L>,
    identifier: DidIdentifier,
    config: RegistryConfig,
    authority: Option<Pubkey>,
    payer: Option<Pubkey>,
    eth_signer: Option<EthSigner>,
}

impl<L: LedgerClient> DidService<L> {
    pub fn new(ledger: Arc<L>, identifier: DidIdentifier, config: RegistryConfig) -> Self {
        Self {
            ledger,
            identifier: identifier.without_fragment(),
            config,
            authority: None,
            payer: None,
            eth_signer: None,
        }
    }

    /// Parse `did` and build a service for it.
    pub fn for_did(ledger: Arc<L>, did: &str, config: RegistryConfig) -> Result<Self, DidError> {
        Ok(Self::new(ledger, DidIdentifier::parse(did)?, config))
    }

    pub fn with_authority(mut self, authority: Pubkey) -> Self {
        self.authority = Some(authority);
        self
    }

    pub fn with_payer(mut self, payer: Pubkey) -> Self {
        self.payer = Some(payer);
        self
    }

    pub fn with_eth_signer(mut self, signer: EthSigner) -> Self {
        self.eth_signer = Some(signer);
        self
    }

    pub fn identifier(&self) -> &DidIdentifier {
        &self.identifier
    }

    pub fn config(&self) -> &RegistryConfig {
        &self.config
    }

    /// Current-scheme record address.
    pub fn record_address(&self) -> Result<Pubkey, DidError> {
        Ok(self
            .identifier
            .record_address(AddressScheme::Current, &self.config.program_id)?
            .0)
    }

    /// Legacy-scheme record address.
    pub fn legacy_record_address(&self) -> Result<Pubkey, DidError> {
        Ok(self
            .identifier
            .record_address(AddressScheme::Legacy, &self.config.legacy_program_id)?
            .0)
    }

    /// Empty builder carrying this service's signers.
    pub fn build(&self) -> DidTransactionBuilder<L> {
        let mut builder = DidTransactionBuilder::new(
            self.ledger.clone(),
            self.identifier.clone(),
            self.config.clone(),
        );
        if let Some(authority) = self.authority {
            builder = builder.with_authority(authority);
        }
        if let Some(payer) = self.payer {
            builder = builder.with_payer(payer);
        }
        if let Some(signer) = &self.eth_signer {
            builder = builder.with_eth_signer(signer.clone());
        }
        builder
    }

    fn queue(
        &self,
        f: impl FnOnce(&mut DidTransactionBuilder<L>) -> Result<&mut DidTransactionBuilder<L>, DidError>,
    ) -> Result<DidTransactionBuilder<L>, DidError> {
        let mut builder = self.build();
        f(&mut builder)?;
        Ok(builder)
    }

    // =========================================================================
    // OPERATIONS
    // =========================================================================

    pub fn initialize(&self, size: u32) -> Result<DidTransactionBuilder<L>, DidError> {
        self.queue(|b| b.initialize(size))
    }

    pub fn resize(&self, size: u32) -> Result<DidTransactionBuilder<L>, DidError> {
        self.queue(|b| b.resize(size))
    }

    pub fn close(&self) -> Result<DidTransactionBuilder<L>, DidError> {
        self.queue(|b| b.close())
    }

    pub fn add_verification_method(
        &self,
        method: VerificationMethod,
    ) -> Result<DidTransactionBuilder<L>, DidError> {
        self.queue(|b| b.add_verification_method(method))
    }

    pub fn remove_verification_method(
        &self,
        fragment: &str,
    ) -> Result<DidTransactionBuilder<L>, DidError> {
        self.queue(|b| b.remove_verification_method(fragment))
    }

    pub fn add_service(
        &self,
        service: Service,
        allow_overwrite: bool,
    ) -> Result<DidTransactionBuilder<L>, DidError> {
        self.queue(|b| b.add_service(service, allow_overwrite))
    }

    pub fn remove_service(&self, fragment: &str) -> Result<DidTransactionBuilder<L>, DidError> {
        self.queue(|b| b.remove_service(fragment))
    }

    pub fn set_vm_flags(
        &self,
        fragment: &str,
        flags: VmFlags,
    ) -> Result<DidTransactionBuilder<L>, DidError> {
        self.queue(|b| b.set_vm_flags(fragment, flags))
    }

    pub fn set_controllers(
        &self,
        native: Vec<Pubkey>,
        other: Vec<String>,
    ) -> Result<DidTransactionBuilder<L>, DidError> {
        self.queue(|b| b.set_controllers(native, other))
    }

    pub fn update(&self, args: UpdateArgs) -> Result<DidTransactionBuilder<L>, DidError> {
        self.queue(|b| b.update(args))
    }

    /// Bulk update from an edited document.
    pub fn update_from_document(
        &self,
        document: &DidDocument,
    ) -> Result<DidTransactionBuilder<L>, DidError> {
        let subject = DidIdentifier::parse(&document.id)?;
        if subject.authority != self.identifier.authority {
            return Err(DidError::UnsupportedDocument(format!(
                "document {} does not describe {}",
                document.id, self.identifier
            )));
        }
        self.update(from_document(document)?)
    }

    /// Migrate from the legacy record, optionally closing it.
    pub fn migrate(&self, close_legacy: bool) -> Result<DidTransactionBuilder<L>, DidError> {
        self.queue(|b| b.migrate(close_legacy))
    }

    // =========================================================================
    // READS
    // =========================================================================

    /// The stored current-scheme record.
    pub async fn get_record(&self) -> Result<DidRecord, DidError> {
        let address = self.record_address()?;
        let data = self
            .fetch(&address)
            .await?
            .ok_or_else(|| DidError::RecordAbsent(self.identifier.to_string()))?;
        decode_account(&data)
    }

    /// Whether a current-scheme record is stored.
    pub async fn is_initialized(&self) -> Result<bool, DidError> {
        Ok(self.fetch(&self.record_address()?).await?.is_some())
    }

    /// Whether only a legacy record is stored.
    pub async fn is_migratable(&self) -> Result<bool, DidError> {
        if self.is_initialized().await? {
            return Ok(false);
        }
        Ok(self.fetch(&self.legacy_record_address()?).await?.is_some())
    }

    /// Record with fallback: current, then legacy, then generative.
    pub async fn resolve_record_with_source(&self) -> Result<(DidRecord, RecordSource), DidError> {
        let (address, bump) = self
            .identifier
            .record_address(AddressScheme::Current, &self.config.program_id)?;
        if let Some(data) = self.fetch(&address).await? {
            return Ok((decode_account(&data)?, RecordSource::Current));
        }
        if let Some(data) = self.fetch(&self.legacy_record_address()?).await? {
            debug!("[did] {} resolved from legacy record", self.identifier);
            let record = decode_legacy_record(&data)?.into_record(bump);
            check_record(&record)?;
            return Ok((record, RecordSource::Legacy));
        }
        debug!("[did] {} not stored, resolving generative record", self.identifier);
        Ok((
            DidRecord::generative(&self.identifier.authority, bump),
            RecordSource::Generative,
        ))
    }

    pub async fn resolve_record(&self) -> Result<DidRecord, DidError> {
        Ok(self.resolve_record_with_source().await?.0)
    }

    /// Resolve the DID document.
    pub async fn resolve(&self) -> Result<DidDocument, DidError> {
        let (record, source) = self.resolve_record_with_source().await?;
        info!("[did] resolved {} ({:?})", self.identifier, source);
        Ok(to_document(&record, &self.identifier))
    }

    async fn fetch(&self, address: &Pubkey) -> Result<Option<Vec<u8>>, DidError> {
        self.ledger
            .get_account(address)
            .await
            .map_err(|e| DidError::Network(e.to_string()))
    }
}

/// Resolver over any `did:sol` identifier.
pub struct DidRegistry<L: LedgerClient> {
    ledger: Arc<L>,
    config: RegistryConfig,
}

impl<L: LedgerClient> DidRegistry<L> {
    pub fn new(ledger: Arc<L>, config: RegistryConfig) -> Self {
        Self { ledger, config }
    }

    /// Facade for one DID.
    pub fn service(&self, did: &str) -> Result<DidService<L>, DidError> {
        DidService::for_did(self.ledger.clone(), did, self.config.clone())
    }

    /// Facade for an authority key on the configured cluster.
    pub fn service_for(&self, authority: Pubkey) -> DidService<L> {
        DidService::new(
            self.ledger.clone(),
            DidIdentifier::new(authority, self.config.cluster),
            self.config.clone(),
        )
    }
}

#[async_trait]
impl<L: LedgerClient> DidRegistryApi for DidRegistry<L> {
    async fn resolve(&self, did: &str) -> Result<DidDocument, DidError> {
        self.service(did)?.resolve().await
    }

    async fn resolve_record(&self, did: &str) -> Result<DidRecord, DidError> {
        self.service(did)?.resolve_record().await
    }

    async fn is_initialized(&self, did: &str) -> Result<bool, DidError> {
        self.service(did)?.is_initialized().await
    }
}
