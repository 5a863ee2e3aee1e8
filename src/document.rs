//! # DID Document
//!
//! The document model for `did:webvh` and the assembly rules that turn a
//! set of verification methods into a well-formed document.

use std::fmt::{self, Display, Formatter};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::core::{Kind, OneMany};
use crate::{Error, KeyPurpose, Result};

/// Contexts added to every assembled document.
pub const BASE_CONTEXT: [&str; 2] =
    ["https://www.w3.org/ns/did/v1", "https://w3id.org/security/multikey/v1"];

/// DID Document
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Document {
    /// The context of the DID document.
    #[serde(rename = "@context")]
    pub context: Vec<Kind<Value>>,

    /// The DID for a particular DID subject.
    pub id: String,

    /// The controller(s) of the DID document. Equal to `id` for
    /// self-controlled DIDs.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub controller: Option<OneMany<String>>,

    /// A set of URIs that are other identifiers for the subject of the DID.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub also_known_as: Option<Vec<String>>,

    /// How the DID subject is expected to be authenticated.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub authentication: Option<Vec<Kind<VerificationMethod>>>,

    /// How the DID subject is expected to express claims.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub assertion_method: Option<Vec<Kind<VerificationMethod>>>,

    /// How an entity can generate encryption material intended for the DID
    /// subject.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub key_agreement: Option<Vec<Kind<VerificationMethod>>>,

    /// Verification methods the subject may use to invoke a cryptographic
    /// capability.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub capability_invocation: Option<Vec<Kind<VerificationMethod>>>,

    /// Verification methods the subject may use to delegate a cryptographic
    /// capability.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub capability_delegation: Option<Vec<Kind<VerificationMethod>>>,

    /// Verification methods for the DID subject.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub verification_method: Option<Vec<VerificationMethod>>,

    /// Services expressing ways of communicating with the DID subject.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub service: Option<Vec<Service>>,
}

impl Document {
    /// True if any embedded verification method matches the given id. A
    /// bare fragment (`#key-0`) matches by suffix, anything else by full
    /// equality.
    #[must_use]
    pub fn has_verification_method(&self, id: &str) -> bool {
        let Some(methods) = &self.verification_method else {
            return false;
        };
        methods.iter().any(|vm| {
            if id.starts_with('#') { vm.id.ends_with(id) } else { vm.id == id }
        })
    }

    /// Materialize the default `#files` and `#whois` services when the
    /// document does not declare them.
    pub fn add_default_services(&mut self, base_url: &str) {
        let services = self.service.get_or_insert_with(Vec::new);
        let files_id = format!("{}#files", self.id);
        if !services.iter().any(|s| s.id == files_id) {
            services.push(Service {
                id: files_id,
                type_: "relativeRef".to_string(),
                service_endpoint: OneMany::One(Kind::String(base_url.to_string())),
            });
        }
        let whois_id = format!("{}#whois", self.id);
        if !services.iter().any(|s| s.id == whois_id) {
            services.push(Service {
                id: whois_id,
                type_: "LinkedVerifiablePresentation".to_string(),
                service_endpoint: OneMany::One(Kind::String(format!("{base_url}/whois.vp"))),
            });
        }
    }
}

/// A way of communicating with the DID subject or related entities.
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Service {
    /// A URI unique to the service.
    pub id: String,

    /// The service type.
    #[serde(rename = "type")]
    pub type_: String,

    /// One or more endpoints for the service.
    #[allow(clippy::struct_field_names)]
    pub service_endpoint: OneMany<Kind<Value>>,
}

/// A public-key descriptor embedded in a DID document.
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct VerificationMethod {
    /// A DID URL that identifies the verification method. Assigned during
    /// document assembly when left empty.
    #[serde(default)]
    pub id: String,

    /// The type of verification method.
    #[serde(rename = "type")]
    pub type_: MethodType,

    /// The DID of the controller of the verification method. Defaults to
    /// the document's DID during assembly.
    #[serde(default)]
    pub controller: String,

    /// The public key in Multikey form.
    pub public_key_multibase: String,

    /// The matching secret key in Multikey form. Only ever populated on
    /// caller-side descriptors, never in a published document.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub secret_key_multibase: Option<String>,
}

impl VerificationMethod {
    /// A descriptor for a Multikey public key.
    #[must_use]
    pub fn new(public_key_multibase: impl Into<String>) -> Self {
        Self {
            public_key_multibase: public_key_multibase.into(),
            ..Self::default()
        }
    }
}

/// Verification method types supported by this crate.
#[derive(Clone, Debug, Default, Deserialize, Serialize, Eq, PartialEq)]
pub enum MethodType {
    /// Generic multikey format.
    #[default]
    Multikey,

    /// `ED25519` verification key, version 2020.
    Ed25519VerificationKey2020,

    /// `X25519` key agreement key, version 2020.
    X25519KeyAgreementKey2020,
}

impl Display for MethodType {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::Multikey => write!(f, "Multikey"),
            Self::Ed25519VerificationKey2020 => write!(f, "Ed25519VerificationKey2020"),
            Self::X25519KeyAgreementKey2020 => write!(f, "X25519KeyAgreementKey2020"),
        }
    }
}

/// Builder of a DID document from verification methods and services.
///
/// Relationship arrays are derived from each method's purpose unless the
/// caller supplies an explicit list for that relationship.
#[derive(Clone, Debug, Default)]
pub struct DocumentBuilder {
    context: Vec<Kind<Value>>,
    controllers: Vec<String>,
    also_known_as: Option<Vec<String>>,
    methods: Vec<(VerificationMethod, KeyPurpose)>,
    authentication: Option<Vec<Kind<VerificationMethod>>>,
    assertion_method: Option<Vec<Kind<VerificationMethod>>>,
    key_agreement: Option<Vec<Kind<VerificationMethod>>>,
    services: Vec<Service>,
}

impl DocumentBuilder {
    /// Start an empty document.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from an existing document, retaining everything except derived
    /// relationship lists (which are rebuilt from the methods added).
    #[must_use]
    pub fn from(document: &Document) -> Self {
        Self {
            context: document.context.clone(),
            controllers: Vec::new(),
            also_known_as: document.also_known_as.clone(),
            methods: document
                .verification_method
                .clone()
                .unwrap_or_default()
                .into_iter()
                .map(|vm| (vm, KeyPurpose::Authentication))
                .collect(),
            authentication: document.authentication.clone(),
            assertion_method: document.assertion_method.clone(),
            key_agreement: document.key_agreement.clone(),
            services: document.service.clone().unwrap_or_default(),
        }
    }

    /// Add a verification method used for authentication (the default
    /// purpose).
    #[must_use]
    pub fn verification_method(self, vm: VerificationMethod) -> Self {
        self.verification_method_for(vm, KeyPurpose::Authentication)
    }

    /// Add a verification method with an explicit purpose.
    #[must_use]
    pub fn verification_method_for(mut self, vm: VerificationMethod, purpose: KeyPurpose) -> Self {
        self.methods.push((vm, purpose));
        self
    }

    /// Add another context in addition to the base ones.
    #[must_use]
    pub fn context(mut self, context: Kind<Value>) -> Self {
        self.context.push(context);
        self
    }

    /// Add a controller besides the DID itself.
    #[must_use]
    pub fn controller(mut self, controller: impl Into<String>) -> Self {
        self.controllers.push(controller.into());
        self
    }

    /// Add an `alsoKnownAs` identifier.
    #[must_use]
    pub fn also_known_as(mut self, aka: impl Into<String>) -> Self {
        self.also_known_as.get_or_insert_with(Vec::new).push(aka.into());
        self
    }

    /// Replace the derived `authentication` list with an explicit entry.
    /// Chain to add several.
    #[must_use]
    pub fn authentication(mut self, entry: impl Into<Kind<VerificationMethod>>) -> Self {
        self.authentication.get_or_insert_with(Vec::new).push(entry.into());
        self
    }

    /// Replace the derived `assertionMethod` list with an explicit entry.
    #[must_use]
    pub fn assertion_method(mut self, entry: impl Into<Kind<VerificationMethod>>) -> Self {
        self.assertion_method.get_or_insert_with(Vec::new).push(entry.into());
        self
    }

    /// Replace the derived `keyAgreement` list with an explicit entry.
    #[must_use]
    pub fn key_agreement(mut self, entry: impl Into<Kind<VerificationMethod>>) -> Self {
        self.key_agreement.get_or_insert_with(Vec::new).push(entry.into());
        self
    }

    /// Add a service endpoint to the document.
    #[must_use]
    pub fn service(mut self, service: Service) -> Self {
        self.services.push(service);
        self
    }

    /// Assemble the document for the given DID.
    ///
    /// # Errors
    /// Will fail if a relationship entry references a fragment with no
    /// matching verification method.
    pub fn build(self, did: &str) -> Result<Document> {
        let mut context: Vec<Kind<Value>> =
            BASE_CONTEXT.iter().map(|c| Kind::String((*c).to_string())).collect();
        for extra in self.context {
            if !context.contains(&extra) {
                context.push(extra);
            }
        }

        let mut methods = Vec::new();
        let mut derived: [Vec<Kind<VerificationMethod>>; 5] =
            [Vec::new(), Vec::new(), Vec::new(), Vec::new(), Vec::new()];
        for (mut vm, purpose) in self.methods {
            if vm.id.is_empty() {
                let key = &vm.public_key_multibase;
                let suffix = &key[key.len().saturating_sub(8)..];
                vm.id = format!("{did}#{suffix}");
            } else if vm.id.starts_with('#') {
                vm.id = format!("{did}{}", vm.id);
            }
            if vm.controller.is_empty() {
                vm.controller = did.to_string();
            }
            let slot = match purpose {
                KeyPurpose::Authentication => 0,
                KeyPurpose::AssertionMethod => 1,
                KeyPurpose::KeyAgreement => 2,
                KeyPurpose::CapabilityInvocation => 3,
                KeyPurpose::CapabilityDelegation => 4,
            };
            derived[slot].push(Kind::String(vm.id.clone()));
            methods.push(vm);
        }

        let [authentication, assertion, agreement, invocation, delegation] = derived;
        let document = Document {
            context,
            id: did.to_string(),
            controller: if self.controllers.is_empty() {
                Some(OneMany::One(did.to_string()))
            } else {
                let mut all = vec![did.to_string()];
                all.extend(self.controllers);
                Some(OneMany::Many(all))
            },
            also_known_as: self.also_known_as,
            authentication: override_or(self.authentication, authentication, did),
            assertion_method: override_or(self.assertion_method, assertion, did),
            key_agreement: override_or(self.key_agreement, agreement, did),
            capability_invocation: non_empty(invocation),
            capability_delegation: non_empty(delegation),
            verification_method: Some(methods),
            service: if self.services.is_empty() { None } else { Some(self.services) },
        };

        verify_references(&document)?;
        Ok(document)
    }
}

// Prefer an explicit relationship list over the derived one, normalizing
// bare fragments to full DID URLs.
fn override_or(
    explicit: Option<Vec<Kind<VerificationMethod>>>, derived: Vec<Kind<VerificationMethod>>,
    did: &str,
) -> Option<Vec<Kind<VerificationMethod>>> {
    match explicit {
        Some(entries) => Some(
            entries
                .into_iter()
                .map(|entry| match entry {
                    Kind::String(s) if s.starts_with('#') => Kind::String(format!("{did}{s}")),
                    other => other,
                })
                .collect(),
        ),
        None => non_empty(derived),
    }
}

fn non_empty(list: Vec<Kind<VerificationMethod>>) -> Option<Vec<Kind<VerificationMethod>>> {
    if list.is_empty() { None } else { Some(list) }
}

// Every string relationship entry that points into this document must have
// a matching verification method.
fn verify_references(document: &Document) -> Result<()> {
    let relationships = [
        &document.authentication,
        &document.assertion_method,
        &document.key_agreement,
        &document.capability_invocation,
        &document.capability_delegation,
    ];
    for list in relationships.into_iter().flatten() {
        for entry in list {
            let Kind::String(reference) = entry else {
                continue;
            };
            if reference.starts_with(&format!("{}#", document.id))
                && !document.has_verification_method(reference)
            {
                return Err(Error::Format(format!(
                    "relationship references unknown verification method: {reference}"
                )));
            }
        }
    }
    Ok(())
}
