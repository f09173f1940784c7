//! # Inbound Ports
//!
//! API trait defining what the registry client offers to callers.

use crate::domain::{DidDocument, DidError, DidRecord};
use async_trait::async_trait;

/// DID registry API - inbound port.
#[async_trait]
pub trait DidRegistryApi: Send + Sync {
    /// Resolve any `did:sol` identifier to its document.
    ///
    /// Falls back from the current record to the legacy record, and from
    /// there to the generative document of a never-written DID.
    async fn resolve(&self, did: &str) -> Result<DidDocument, DidError>;

    /// Same fallback as [`DidRegistryApi::resolve`], returning the record.
    async fn resolve_record(&self, did: &str) -> Result<DidRecord, DidError>;

    /// Whether a current-scheme record is stored for the DID.
    async fn is_initialized(&self, did: &str) -> Result<bool, DidError>;
}
