//! # Identifier Codec
//!
//! DID grammar: `did:sol:[<cluster>:]<base58-authority>[#<fragment>]`.
//!
//! The storage address of a record is a program-derived address over a
//! per-scheme seed and the authority key. Current and legacy schemes use
//! different seeds and different program ids.

use super::errors::DidError;
use ed25519_dalek::VerifyingKey;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::str::FromStr;

/// DID method name.
pub const DID_METHOD: &str = "sol";

/// Seed for current-scheme record addresses.
pub const DID_ACCOUNT_SEED: &[u8] = b"did-account";

/// Seed for legacy-scheme record addresses.
pub const LEGACY_DID_ACCOUNT_SEED: &[u8] = b"solana-did";

/// Marker appended to every program-derived address preimage.
const PDA_MARKER: &[u8] = b"ProgramDerivedAddress";

/// Current registry program (`didso1Dpqpm4CsiCjzP766BGY89CAdD6ZBL68cRhFPc`).
pub const DID_PROGRAM_ID: Pubkey = Pubkey([
    0x09, 0x67, 0xfc, 0xa3, 0x0e, 0xcd, 0x78, 0x26, 0x98, 0xc5, 0x98, 0x0b, 0x62, 0xfb, 0xc2, 0x52,
    0x4f, 0x8d, 0x0a, 0x37, 0x6e, 0x1e, 0xa2, 0xbd, 0x40, 0xed, 0x5c, 0x2e, 0x11, 0xce, 0xc0, 0xf7,
]);

/// Legacy registry program (`idDa4XeCjVwKcprVAo812coUQbovSZ4kDGJf2sPaBnM`).
pub const LEGACY_DID_PROGRAM_ID: Pubkey = Pubkey([
    0x0a, 0xa9, 0xc3, 0x78, 0x33, 0xc8, 0xe1, 0x73, 0x54, 0x53, 0x20, 0x50, 0x89, 0xba, 0x60, 0x1c,
    0x61, 0x24, 0x51, 0xde, 0x41, 0xf1, 0xa6, 0xf9, 0x7e, 0x60, 0x38, 0x71, 0x6d, 0xe8, 0xc9, 0xb6,
]);

/// Fragment of the genesis verification method.
pub const DEFAULT_KEY_FRAGMENT: &str = "default";

/// 32-byte ledger address, displayed in base58.
#[derive(Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Pubkey(pub [u8; 32]);

impl Pubkey {
    /// Wrap raw bytes.
    pub const fn new(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Raw bytes.
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Copy from a slice that must be exactly 32 bytes.
    pub fn try_from_slice(bytes: &[u8]) -> Result<Self, DidError> {
        let arr: [u8; 32] = bytes
            .try_into()
            .map_err(|_| DidError::InvalidKey(format!("expected 32 bytes, got {}", bytes.len())))?;
        Ok(Self(arr))
    }

    /// Whether these bytes decompress to an ed25519 point.
    pub fn is_on_curve(&self) -> bool {
        VerifyingKey::from_bytes(&self.0).is_ok()
    }
}

impl fmt::Display for Pubkey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&bs58::encode(self.0).into_string())
    }
}

impl fmt::Debug for Pubkey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Pubkey({})", self)
    }
}

impl FromStr for Pubkey {
    type Err = DidError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bytes = bs58::decode(s)
            .into_vec()
            .map_err(|e| DidError::InvalidDid(format!("invalid base58 '{}': {}", s, e)))?;
        if bytes.len() != 32 {
            return Err(DidError::InvalidDid(format!(
                "address must be 32 bytes, got {}",
                bytes.len()
            )));
        }
        Pubkey::try_from_slice(&bytes)
    }
}

impl From<VerifyingKey> for Pubkey {
    fn from(key: VerifyingKey) -> Self {
        Self(key.to_bytes())
    }
}

/// Ledger cluster the DID lives on.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Cluster {
    /// Main network; omitted from formatted DIDs.
    #[default]
    Mainnet,
    /// Public test network.
    Testnet,
    /// Public development network.
    Devnet,
    /// Local validator.
    Localnet,
}

impl Cluster {
    /// Segment used in DID strings, `None` for mainnet.
    pub fn did_segment(&self) -> Option<&'static str> {
        match self {
            Cluster::Mainnet => None,
            Cluster::Testnet => Some("testnet"),
            Cluster::Devnet => Some("devnet"),
            Cluster::Localnet => Some("localnet"),
        }
    }

    /// Parse a cluster segment. `mainnet-beta` is accepted for mainnet.
    pub fn from_segment(segment: &str) -> Option<Self> {
        match segment {
            "mainnet-beta" | "mainnet" => Some(Cluster::Mainnet),
            "testnet" => Some(Cluster::Testnet),
            "devnet" => Some(Cluster::Devnet),
            "localnet" => Some(Cluster::Localnet),
            _ => None,
        }
    }
}

/// Addressing scheme for the backing record.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum AddressScheme {
    /// Current record layout.
    Current,
    /// Pre-migration record layout.
    Legacy,
}

impl AddressScheme {
    /// Domain-separation seed.
    pub fn seed(&self) -> &'static [u8] {
        match self {
            AddressScheme::Current => DID_ACCOUNT_SEED,
            AddressScheme::Legacy => LEGACY_DID_ACCOUNT_SEED,
        }
    }

    /// Program id that owns records of this scheme.
    pub fn default_program_id(&self) -> Pubkey {
        match self {
            AddressScheme::Current => DID_PROGRAM_ID,
            AddressScheme::Legacy => LEGACY_DID_PROGRAM_ID,
        }
    }
}

/// A parsed `did:sol` identifier.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DidIdentifier {
    /// Cluster segment.
    pub cluster: Cluster,
    /// Authority key the DID is named after.
    pub authority: Pubkey,
    /// Optional `#fragment`.
    pub fragment: Option<String>,
}

impl DidIdentifier {
    /// Identifier for an authority key on a cluster.
    pub fn new(authority: Pubkey, cluster: Cluster) -> Self {
        Self {
            cluster,
            authority,
            fragment: None,
        }
    }

    /// Parse a DID string. Never partially succeeds.
    pub fn parse(did: &str) -> Result<Self, DidError> {
        let (body, fragment) = match did.split_once('#') {
            Some((body, fragment)) => {
                validate_fragment(fragment)
                    .map_err(|_| DidError::InvalidDid(format!("invalid fragment in '{}'", did)))?;
                (body, Some(fragment.to_string()))
            }
            None => (did, None),
        };

        let parts: Vec<&str> = body.split(':').collect();
        let (cluster, key) = match parts.as_slice() {
            ["did", DID_METHOD, key] => (Cluster::Mainnet, *key),
            ["did", DID_METHOD, cluster, key] => {
                let cluster = Cluster::from_segment(cluster)
                    .ok_or_else(|| DidError::InvalidDid(format!("unknown cluster '{}'", cluster)))?;
                (cluster, *key)
            }
            _ => return Err(DidError::InvalidDid(did.to_string())),
        };

        let authority = key
            .parse::<Pubkey>()
            .map_err(|_| DidError::InvalidDid(did.to_string()))?;

        Ok(Self {
            cluster,
            authority,
            fragment,
        })
    }

    /// Whether a string parses as a `did:sol` identifier.
    pub fn is_valid(did: &str) -> bool {
        Self::parse(did).is_ok()
    }

    /// Format, optionally including the fragment.
    pub fn format(&self, include_fragment: bool) -> String {
        let mut out = format!("did:{}:", DID_METHOD);
        if let Some(segment) = self.cluster.did_segment() {
            out.push_str(segment);
            out.push(':');
        }
        out.push_str(&self.authority.to_string());
        if include_fragment {
            if let Some(fragment) = &self.fragment {
                out.push('#');
                out.push_str(fragment);
            }
        }
        out
    }

    /// Same identifier with a different fragment.
    pub fn with_fragment(&self, fragment: impl Into<String>) -> Self {
        Self {
            fragment: Some(fragment.into()),
            ..self.clone()
        }
    }

    /// Same identifier without a fragment.
    pub fn without_fragment(&self) -> Self {
        Self {
            fragment: None,
            ..self.clone()
        }
    }

    /// `did:sol:...#<fragment>`
    pub fn qualified(&self, fragment: &str) -> String {
        format!("{}#{}", self.format(false), fragment)
    }

    /// Storage address of this identifier's record.
    pub fn record_address(
        &self,
        scheme: AddressScheme,
        program_id: &Pubkey,
    ) -> Result<(Pubkey, u8), DidError> {
        derive_address(&self.authority, scheme, program_id)
    }
}

impl fmt::Display for DidIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.format(true))
    }
}

impl FromStr for DidIdentifier {
    type Err = DidError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

/// Check a fragment: non-empty, `[A-Za-z0-9_.-]+`.
pub fn validate_fragment(fragment: &str) -> Result<(), DidError> {
    let ok = !fragment.is_empty()
        && fragment
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.'));
    if ok {
        Ok(())
    } else {
        Err(DidError::InvalidDid(format!("invalid fragment '{}'", fragment)))
    }
}

/// Whether a string has the generic `did:<method>:<id>` shape.
pub fn is_generic_did(did: &str) -> bool {
    let mut parts = did.splitn(3, ':');
    matches!(
        (parts.next(), parts.next(), parts.next()),
        (Some("did"), Some(method), Some(id))
            if !method.is_empty()
                && method.chars().all(|c| c.is_ascii_lowercase() || c.is_ascii_digit())
                && !id.is_empty()
    )
}

/// Derive the record address for an authority under a scheme.
///
/// Walks the bump seed down from 255 and returns the first digest that is
/// off the ed25519 curve, together with the bump used.
pub fn derive_address(
    authority: &Pubkey,
    scheme: AddressScheme,
    program_id: &Pubkey,
) -> Result<(Pubkey, u8), DidError> {
    find_program_address(&[scheme.seed(), authority.as_bytes()], program_id)
}

/// Derive with an explicit bump. Fails if the result lies on the curve.
pub fn create_program_address(
    seeds: &[&[u8]],
    bump: u8,
    program_id: &Pubkey,
) -> Option<Pubkey> {
    let mut hasher = Sha256::new();
    for seed in seeds {
        hasher.update(seed);
    }
    hasher.update([bump]);
    hasher.update(program_id.as_bytes());
    hasher.update(PDA_MARKER);
    let candidate = Pubkey(hasher.finalize().into());
    if candidate.is_on_curve() {
        None
    } else {
        Some(candidate)
    }
}

fn find_program_address(seeds: &[&[u8]], program_id: &Pubkey) -> Result<(Pubkey, u8), DidError> {
    (0..=u8::MAX)
        .rev()
        .find_map(|bump| create_program_address(seeds, bump, program_id).map(|pda| (pda, bump)))
        .ok_or_else(|| DidError::InvalidDid("no viable bump seed".to_string()))
}
