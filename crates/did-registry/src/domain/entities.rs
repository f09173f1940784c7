//! # Domain Entities
//!
//! Logical state of an on-chain DID record.

use super::errors::DidError;
use super::flags::{VmFlag, VmFlags};
use super::identifier::{validate_fragment, Pubkey, DEFAULT_KEY_FRAGMENT};
use serde::{Deserialize, Serialize};

/// Current record layout version.
pub const DID_RECORD_VERSION: u8 = 0;

/// Fragment given to a legacy `default` method not keyed by the authority.
pub const LEGACY_DEFAULT_FRAGMENT: &str = "legacy-default";

/// `base`, or `base-<n>` for the first `n` not already taken.
fn unused_fragment(base: &str, taken: &[VerificationMethod]) -> String {
    let in_use = |f: &str| taken.iter().any(|m| m.fragment == f);
    if !in_use(base) {
        return base.to_string();
    }
    (1u32..)
        .map(|n| format!("{}-{}", base, n))
        .find(|f| !in_use(f))
        .unwrap_or_else(|| base.to_string())
}

/// Key material type of a verification method.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum VerificationMethodType {
    /// Ed25519 ledger-native key, 32 bytes.
    NativeEd25519 = 0,
    /// secp256k1 key known only by its 20-byte recovered address.
    ExternalRecoverable = 1,
    /// secp256k1 public key, 64 bytes (x || y).
    ExternalFull = 2,
}

impl VerificationMethodType {
    /// Expected key data length.
    pub fn key_len(&self) -> usize {
        match self {
            VerificationMethodType::NativeEd25519 => 32,
            VerificationMethodType::ExternalRecoverable => 20,
            VerificationMethodType::ExternalFull => 64,
        }
    }

    /// Type name used in rendered documents.
    pub fn document_type(&self) -> &'static str {
        match self {
            VerificationMethodType::NativeEd25519 => "Ed25519VerificationKey2018",
            VerificationMethodType::ExternalRecoverable => "EcdsaSecp256k1RecoveryMethod2020",
            VerificationMethodType::ExternalFull => "EcdsaSecp256k1VerificationKey2019",
        }
    }

    /// Reverse of [`VerificationMethodType::document_type`].
    pub fn from_document_type(name: &str) -> Option<Self> {
        match name {
            "Ed25519VerificationKey2018" => Some(VerificationMethodType::NativeEd25519),
            "EcdsaSecp256k1RecoveryMethod2020" => Some(VerificationMethodType::ExternalRecoverable),
            "EcdsaSecp256k1VerificationKey2019" => Some(VerificationMethodType::ExternalFull),
            _ => None,
        }
    }

    /// Wire tag.
    pub fn from_u8(tag: u8) -> Option<Self> {
        match tag {
            0 => Some(VerificationMethodType::NativeEd25519),
            1 => Some(VerificationMethodType::ExternalRecoverable),
            2 => Some(VerificationMethodType::ExternalFull),
            _ => None,
        }
    }
}

/// A key that may act for the DID.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct VerificationMethod {
    /// Unique across `[initial] + methods`.
    pub fragment: String,
    /// Capability flags.
    pub flags: VmFlags,
    /// Key material type.
    pub method_type: VerificationMethodType,
    /// Raw key material; length fixed by `method_type`.
    pub key_data: Vec<u8>,
}

impl VerificationMethod {
    /// Create a method, checking fragment grammar and key length.
    pub fn new(
        fragment: impl Into<String>,
        method_type: VerificationMethodType,
        key_data: Vec<u8>,
        flags: VmFlags,
    ) -> Result<Self, DidError> {
        let method = Self {
            fragment: fragment.into(),
            flags,
            method_type,
            key_data,
        };
        method.validate()?;
        Ok(method)
    }

    /// Genesis method for an authority key.
    pub fn default_for(authority: &Pubkey) -> Self {
        Self {
            fragment: DEFAULT_KEY_FRAGMENT.to_string(),
            flags: VmFlags::genesis(),
            method_type: VerificationMethodType::NativeEd25519,
            key_data: authority.as_bytes().to_vec(),
        }
    }

    /// Fragment grammar and key length.
    pub fn validate(&self) -> Result<(), DidError> {
        validate_fragment(&self.fragment)?;
        if self.key_data.len() != self.method_type.key_len() {
            return Err(DidError::InvalidKey(format!(
                "{:?} key must be {} bytes, got {}",
                self.method_type,
                self.method_type.key_len(),
                self.key_data.len()
            )));
        }
        Ok(())
    }

    pub fn has_flag(&self, flag: VmFlag) -> bool {
        self.flags.has(flag)
    }
}

/// A service endpoint.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Service {
    /// Unique across services.
    pub fragment: String,
    /// Service type.
    pub service_type: String,
    /// Endpoint URI.
    pub service_endpoint: String,
}

impl Service {
    pub fn new(
        fragment: impl Into<String>,
        service_type: impl Into<String>,
        service_endpoint: impl Into<String>,
    ) -> Result<Self, DidError> {
        let service = Self {
            fragment: fragment.into(),
            service_type: service_type.into(),
            service_endpoint: service_endpoint.into(),
        };
        validate_fragment(&service.fragment)?;
        Ok(service)
    }
}

/// Logical on-chain state of a DID.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DidRecord {
    /// Layout version.
    pub version: u8,
    /// Address derivation bump.
    pub bump: u8,
    /// Replay-protection nonce for eth-signed instructions.
    pub nonce: u64,
    /// Genesis method; never removed.
    pub initial_method: VerificationMethod,
    /// Additional methods in insertion order.
    pub methods: Vec<VerificationMethod>,
    /// Services in insertion order.
    pub services: Vec<Service>,
    /// Authorities of other records of this registry.
    pub native_controllers: Vec<Pubkey>,
    /// Controllers on other DID methods.
    pub other_controllers: Vec<String>,
}

impl DidRecord {
    /// What a never-written record for `authority` would contain.
    pub fn generative(authority: &Pubkey, bump: u8) -> Self {
        Self {
            version: DID_RECORD_VERSION,
            bump,
            nonce: 0,
            initial_method: VerificationMethod::default_for(authority),
            methods: Vec::new(),
            services: Vec::new(),
            native_controllers: Vec::new(),
            other_controllers: Vec::new(),
        }
    }

    /// Authority key of the genesis method.
    pub fn authority(&self) -> Result<Pubkey, DidError> {
        Pubkey::try_from_slice(&self.initial_method.key_data)
    }

    /// `[initial] + methods`.
    pub fn all_methods(&self) -> impl Iterator<Item = &VerificationMethod> {
        std::iter::once(&self.initial_method).chain(self.methods.iter())
    }

    pub fn find_method(&self, fragment: &str) -> Option<&VerificationMethod> {
        self.all_methods().find(|m| m.fragment == fragment)
    }

    pub fn find_method_mut(&mut self, fragment: &str) -> Option<&mut VerificationMethod> {
        if self.initial_method.fragment == fragment {
            return Some(&mut self.initial_method);
        }
        self.methods.iter_mut().find(|m| m.fragment == fragment)
    }

    pub fn find_service(&self, fragment: &str) -> Option<&Service> {
        self.services.iter().find(|s| s.fragment == fragment)
    }

    /// Methods holding CapabilityInvocation.
    pub fn invocation_keys(&self) -> impl Iterator<Item = &VerificationMethod> {
        self.all_methods()
            .filter(|m| m.has_flag(VmFlag::CapabilityInvocation))
    }
}

/// Full replacement of the mutable parts of a record.
///
/// An entry whose fragment is `default` updates the genesis method's flags;
/// every other entry becomes part of the new method list.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateArgs {
    /// Methods, optionally including `default`.
    pub verification_methods: Vec<VerificationMethod>,
    /// Services.
    pub services: Vec<Service>,
    /// Native controllers.
    pub native_controllers: Vec<Pubkey>,
    /// Other-method controllers.
    pub other_controllers: Vec<String>,
}

/// Legacy verification method: a named ed25519 key.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LegacyVerificationMethod {
    /// Fragment.
    pub fragment: String,
    /// Ed25519 key.
    pub key: Pubkey,
}

/// Pre-migration record layout.
///
/// Relationships are stored as fragment lists rather than flags.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LegacyDidRecord {
    pub authority: Pubkey,
    pub version: u8,
    pub controllers: Vec<Pubkey>,
    pub methods: Vec<LegacyVerificationMethod>,
    pub authentication: Vec<String>,
    pub assertion_method: Vec<String>,
    pub key_agreement: Vec<String>,
    pub capability_invocation: Vec<String>,
    pub capability_delegation: Vec<String>,
    pub services: Vec<Service>,
}

impl LegacyDidRecord {
    fn flags_for(&self, fragment: &str) -> VmFlags {
        let relationships = [
            (&self.authentication, VmFlag::Authentication),
            (&self.assertion_method, VmFlag::Assertion),
            (&self.key_agreement, VmFlag::KeyAgreement),
            (&self.capability_invocation, VmFlag::CapabilityInvocation),
            (&self.capability_delegation, VmFlag::CapabilityDelegation),
        ];
        relationships
            .iter()
            .filter(|(list, _)| list.iter().any(|f| f == fragment))
            .fold(VmFlags::NONE, |acc, (_, flag)| acc.with(*flag))
    }

    /// Map onto the current layout.
    ///
    /// The method keyed by the authority becomes the genesis method. If the
    /// legacy record names no such method, a genesis method is synthesised.
    /// A foreign key stored under `default` is kept as `legacy-default`;
    /// later duplicates of a fragment, self-referencing controllers and
    /// duplicate controllers or services are dropped.
    pub fn into_record(self, bump: u8) -> DidRecord {
        let mut initial = VerificationMethod::default_for(&self.authority);
        let mut methods: Vec<VerificationMethod> = Vec::new();

        for legacy in &self.methods {
            let flags = self.flags_for(&legacy.fragment);
            if legacy.fragment == DEFAULT_KEY_FRAGMENT && legacy.key == self.authority {
                initial.flags = flags.with(VmFlag::OwnershipProof);
                continue;
            }
            let fragment = if legacy.fragment == DEFAULT_KEY_FRAGMENT {
                unused_fragment(LEGACY_DEFAULT_FRAGMENT, &methods)
            } else if methods.iter().any(|m| m.fragment == legacy.fragment) {
                continue;
            } else {
                legacy.fragment.clone()
            };
            methods.push(VerificationMethod {
                fragment,
                flags,
                method_type: VerificationMethodType::NativeEd25519,
                key_data: legacy.key.as_bytes().to_vec(),
            });
        }

        let mut native_controllers: Vec<Pubkey> = Vec::new();
        for key in &self.controllers {
            if *key != self.authority && !native_controllers.contains(key) {
                native_controllers.push(*key);
            }
        }

        let mut services: Vec<Service> = Vec::new();
        for service in self.services {
            if !services.iter().any(|s| s.fragment == service.fragment) {
                services.push(service);
            }
        }

        // A legacy record whose authority lost invocation rights must not
        // migrate into a locked-out record.
        if !initial.flags.has(VmFlag::CapabilityInvocation)
            && !methods
                .iter()
                .any(|m| m.has_flag(VmFlag::CapabilityInvocation))
        {
            initial.flags.set(VmFlag::CapabilityInvocation);
        }

        DidRecord {
            version: DID_RECORD_VERSION,
            bump,
            nonce: 0,
            initial_method: initial,
            methods,
            services,
            native_controllers,
            other_controllers: Vec::new(),
        }
    }
}
