//! Registry client configuration from environment variables.

use super::identifier::{Cluster, Pubkey, DID_PROGRAM_ID, LEGACY_DID_PROGRAM_ID};
use std::env;

/// Configuration of a registry client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistryConfig {
    /// Cluster identifiers are rendered for
    pub cluster: Cluster,

    /// Program owning current-scheme records
    pub program_id: Pubkey,

    /// Program owning legacy-scheme records
    pub legacy_program_id: Pubkey,

    /// Whether the composer plans and injects initialize/resize instructions
    pub auto_allocate: bool,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            cluster: Cluster::Mainnet,
            program_id: DID_PROGRAM_ID,
            legacy_program_id: LEGACY_DID_PROGRAM_ID,
            auto_allocate: true,
        }
    }
}

impl RegistryConfig {
    /// Create configuration from environment variables.
    ///
    /// # Environment Variables
    ///
    /// - `DID_CLUSTER`: `mainnet-beta`, `testnet`, `devnet` or `localnet` (default: mainnet-beta)
    /// - `DID_PROGRAM_ID`: base58 program id (default: current registry program)
    /// - `DID_LEGACY_PROGRAM_ID`: base58 program id (default: legacy registry program)
    /// - `DID_AUTO_ALLOCATE`: enable automatic allocation (default: true)
    ///
    /// Unparseable values fall back to their defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Same as [`RegistryConfig::from_env`] over an arbitrary variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        Self {
            cluster: lookup("DID_CLUSTER")
                .and_then(|v| Cluster::from_segment(&v.to_lowercase()))
                .unwrap_or(defaults.cluster),

            program_id: lookup("DID_PROGRAM_ID")
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.program_id),

            legacy_program_id: lookup("DID_LEGACY_PROGRAM_ID")
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.legacy_program_id),

            auto_allocate: lookup("DID_AUTO_ALLOCATE")
                .map(|v| v.to_lowercase() != "false" && v != "0")
                .unwrap_or(defaults.auto_allocate),
        }
    }

    /// Config for a cluster with default program ids.
    pub fn for_cluster(cluster: Cluster) -> Self {
        Self {
            cluster,
            ..Self::default()
        }
    }
}
