//! # Document Mapper
//!
//! Bidirectional mapping between the W3C DID Document and the compact record.
//! Relationship arrays (`authentication`, `assertionMethod`, ...) correspond
//! one-to-one with capability flags.

use super::entities::{DidRecord, Service, UpdateArgs, VerificationMethod, VerificationMethodType};
use super::errors::DidError;
use super::eth_address::{parse_eth_address, to_checksum_address};
use super::flags::{VmFlag, VmFlags};
use super::identifier::{DidIdentifier, Pubkey, DID_METHOD};
use serde::{Deserialize, Serialize};

/// JSON-LD contexts of a rendered document.
pub const DID_CONTEXT: [&str; 2] = ["https://w3id.org/did/v1.0", "https://w3id.org/sol/did/v2.0"];

/// Entry of a relationship or controller array.
///
/// Only plain string references are mapped back onto a record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DocumentReference {
    /// `did:sol:...#fragment` or `#fragment`
    Reference(String),
    /// Inline object.
    Embedded(serde_json::Value),
}

impl From<String> for DocumentReference {
    fn from(s: String) -> Self {
        DocumentReference::Reference(s)
    }
}

/// A verification method in a DID Document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentVerificationMethod {
    /// Fragment-qualified id.
    pub id: String,
    /// Key type
    #[serde(rename = "type")]
    pub type_: String,
    /// Controller DID
    pub controller: String,
    /// Native keys.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub public_key_base58: Option<String>,
    /// Recoverable external keys.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ethereum_address: Option<String>,
    /// Full external keys.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub public_key_hex: Option<String>,
}

/// A service endpoint in a DID Document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceEndpoint {
    /// Fragment-qualified id.
    pub id: String,
    /// Service type
    #[serde(rename = "type")]
    pub type_: String,
    /// Endpoint URI
    pub service_endpoint: String,
}

/// A DID Document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DidDocument {
    /// JSON-LD context
    #[serde(rename = "@context", default)]
    pub context: Vec<String>,
    /// The DID this document describes
    pub id: String,
    #[serde(default)]
    pub controller: Vec<DocumentReference>,
    #[serde(default)]
    pub verification_method: Vec<DocumentVerificationMethod>,
    #[serde(default)]
    pub authentication: Vec<DocumentReference>,
    #[serde(default)]
    pub assertion_method: Vec<DocumentReference>,
    #[serde(default)]
    pub key_agreement: Vec<DocumentReference>,
    #[serde(default)]
    pub capability_invocation: Vec<DocumentReference>,
    #[serde(default)]
    pub capability_delegation: Vec<DocumentReference>,
    #[serde(default)]
    pub service: Vec<ServiceEndpoint>,
}

impl DidDocument {
    /// Serialize as JSON.
    pub fn to_json(&self) -> Result<String, DidError> {
        serde_json::to_string_pretty(self)
            .map_err(|e| DidError::UnsupportedDocument(e.to_string()))
    }

    /// Parse from JSON.
    pub fn from_json(json: &str) -> Result<Self, DidError> {
        serde_json::from_str(json).map_err(|e| DidError::UnsupportedDocument(e.to_string()))
    }

    fn relationships(&self) -> [(&Vec<DocumentReference>, VmFlag); 5] {
        [
            (&self.authentication, VmFlag::Authentication),
            (&self.assertion_method, VmFlag::Assertion),
            (&self.key_agreement, VmFlag::KeyAgreement),
            (&self.capability_invocation, VmFlag::CapabilityInvocation),
            (&self.capability_delegation, VmFlag::CapabilityDelegation),
        ]
    }
}

// =============================================================================
// RECORD -> DOCUMENT
// =============================================================================

/// Render the document for a record.
pub fn to_document(record: &DidRecord, identifier: &DidIdentifier) -> DidDocument {
    let did = identifier.format(false);
    let mut doc = DidDocument {
        context: DID_CONTEXT.iter().map(|c| c.to_string()).collect(),
        id: did.clone(),
        controller: Vec::new(),
        verification_method: Vec::new(),
        authentication: Vec::new(),
        assertion_method: Vec::new(),
        key_agreement: Vec::new(),
        capability_invocation: Vec::new(),
        capability_delegation: Vec::new(),
        service: Vec::new(),
    };

    for method in record.all_methods() {
        if method.has_flag(VmFlag::DidDocHidden) {
            continue;
        }
        let id = identifier.qualified(&method.fragment);
        let relative = format!("#{}", method.fragment);
        let targets = [
            (VmFlag::Authentication, &mut doc.authentication),
            (VmFlag::Assertion, &mut doc.assertion_method),
            (VmFlag::KeyAgreement, &mut doc.key_agreement),
            (VmFlag::CapabilityInvocation, &mut doc.capability_invocation),
            (VmFlag::CapabilityDelegation, &mut doc.capability_delegation),
        ];
        for (flag, list) in targets {
            if method.has_flag(flag) {
                list.push(DocumentReference::Reference(relative.clone()));
            }
        }
        doc.verification_method
            .push(render_method(method, id, did.clone()));
    }

    let mut controllers: Vec<String> = record
        .native_controllers
        .iter()
        .map(|key| DidIdentifier::new(*key, identifier.cluster).format(false))
        .chain(record.other_controllers.iter().cloned())
        .collect();
    dedup_in_order(&mut controllers);
    doc.controller = controllers.into_iter().map(DocumentReference::from).collect();

    doc.service = record
        .services
        .iter()
        .map(|s| ServiceEndpoint {
            id: identifier.qualified(&s.fragment),
            type_: s.service_type.clone(),
            service_endpoint: s.service_endpoint.clone(),
        })
        .collect();

    doc
}

fn render_method(method: &VerificationMethod, id: String, controller: String) -> DocumentVerificationMethod {
    let mut out = DocumentVerificationMethod {
        id,
        type_: method.method_type.document_type().to_string(),
        controller,
        public_key_base58: None,
        ethereum_address: None,
        public_key_hex: None,
    };
    match method.method_type {
        VerificationMethodType::NativeEd25519 => {
            out.public_key_base58 = Some(bs58::encode(&method.key_data).into_string());
        }
        VerificationMethodType::ExternalRecoverable => {
            let mut address = [0u8; 20];
            // Length is enforced by the codec; a short key renders as zero padded.
            let n = method.key_data.len().min(20);
            address[..n].copy_from_slice(&method.key_data[..n]);
            out.ethereum_address = Some(to_checksum_address(&address));
        }
        VerificationMethodType::ExternalFull => {
            out.public_key_hex = Some(hex::encode(&method.key_data));
        }
    }
    out
}

fn dedup_in_order(items: &mut Vec<String>) {
    let mut seen = std::collections::HashSet::new();
    items.retain(|item| seen.insert(item.clone()));
}

// =============================================================================
// DOCUMENT -> UPDATE
// =============================================================================

/// Map a document back onto bulk update arguments.
///
/// Flags are recomputed from which relationship arrays reference each
/// method. Inline objects in any reference array are rejected.
pub fn from_document(document: &DidDocument) -> Result<UpdateArgs, DidError> {
    let subject = DidIdentifier::parse(&document.id)?;

    let mut relationship_fragments: Vec<(String, VmFlag)> = Vec::new();
    for (list, flag) in document.relationships() {
        for entry in list {
            let fragment = reference_fragment(entry, &subject)?;
            relationship_fragments.push((fragment, flag));
        }
    }

    let mut verification_methods = Vec::with_capacity(document.verification_method.len());
    for entry in &document.verification_method {
        let fragment = id_fragment(&entry.id, &subject)?;
        let flags = relationship_fragments
            .iter()
            .filter(|(f, _)| *f == fragment)
            .fold(VmFlags::NONE, |acc, (_, flag)| acc.with(*flag));
        verification_methods.push(parse_method(entry, fragment, flags)?);
    }

    for (fragment, _) in &relationship_fragments {
        if !verification_methods.iter().any(|m| m.fragment == *fragment) {
            return Err(DidError::FragmentNotFound(fragment.clone()));
        }
    }

    let mut native_controllers: Vec<Pubkey> = Vec::new();
    let mut other_controllers: Vec<String> = Vec::new();
    for entry in &document.controller {
        let did = match entry {
            DocumentReference::Reference(did) => did,
            DocumentReference::Embedded(_) => {
                return Err(DidError::UnsupportedDocument(
                    "inline controller objects are not supported".to_string(),
                ))
            }
        };
        if did.starts_with(&format!("did:{}:", DID_METHOD)) {
            let key = DidIdentifier::parse(did)
                .map_err(|_| DidError::InvalidController(did.clone()))?
                .authority;
            if !native_controllers.contains(&key) {
                native_controllers.push(key);
            }
        } else if !other_controllers.contains(did) {
            other_controllers.push(did.clone());
        }
    }

    let services = document
        .service
        .iter()
        .map(|s| {
            Ok(Service {
                fragment: id_fragment(&s.id, &subject)?,
                service_type: s.type_.clone(),
                service_endpoint: s.service_endpoint.clone(),
            })
        })
        .collect::<Result<Vec<_>, DidError>>()?;

    Ok(UpdateArgs {
        verification_methods,
        services,
        native_controllers,
        other_controllers,
    })
}

fn reference_fragment(entry: &DocumentReference, subject: &DidIdentifier) -> Result<String, DidError> {
    match entry {
        DocumentReference::Reference(reference) => id_fragment(reference, subject),
        DocumentReference::Embedded(_) => Err(DidError::UnsupportedDocument(
            "inline verification methods in relationships are not supported".to_string(),
        )),
    }
}

/// Fragment of `#frag` or `did:sol:...#frag` naming the document subject.
fn id_fragment(id: &str, subject: &DidIdentifier) -> Result<String, DidError> {
    if let Some(fragment) = id.strip_prefix('#') {
        super::identifier::validate_fragment(fragment)?;
        return Ok(fragment.to_string());
    }
    let parsed = DidIdentifier::parse(id)?;
    if parsed.authority != subject.authority {
        return Err(DidError::UnsupportedDocument(format!(
            "{} references another DID",
            id
        )));
    }
    parsed
        .fragment
        .ok_or_else(|| DidError::UnsupportedDocument(format!("{} has no fragment", id)))
}

fn parse_method(
    entry: &DocumentVerificationMethod,
    fragment: String,
    flags: VmFlags,
) -> Result<VerificationMethod, DidError> {
    let method_type = VerificationMethodType::from_document_type(&entry.type_).ok_or_else(|| {
        DidError::UnsupportedDocument(format!("unsupported method type {}", entry.type_))
    })?;
    let key_data = match method_type {
        VerificationMethodType::NativeEd25519 => {
            let encoded = entry.public_key_base58.as_deref().ok_or_else(|| {
                DidError::UnsupportedDocument(format!("{} lacks publicKeyBase58", entry.id))
            })?;
            bs58::decode(encoded)
                .into_vec()
                .map_err(|e| DidError::InvalidKey(e.to_string()))?
        }
        VerificationMethodType::ExternalRecoverable => {
            let address = entry.ethereum_address.as_deref().ok_or_else(|| {
                DidError::UnsupportedDocument(format!("{} lacks ethereumAddress", entry.id))
            })?;
            parse_eth_address(address)?.to_vec()
        }
        VerificationMethodType::ExternalFull => {
            let encoded = entry.public_key_hex.as_deref().ok_or_else(|| {
                DidError::UnsupportedDocument(format!("{} lacks publicKeyHex", entry.id))
            })?;
            hex::decode(encoded.trim_start_matches("0x"))
                .map_err(|e| DidError::InvalidKey(e.to_string()))?
        }
    };
    VerificationMethod::new(fragment, method_type, key_data, flags)
}
