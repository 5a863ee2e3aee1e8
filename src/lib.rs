//! # DID Web with Verifiable History
//!
//! The `did:webvh` method binds a DID to an append-only log of signed
//! entries published at a web location. This crate implements the method's
//! core: log validation and state replay, self-certifying identifier
//! derivation, hash chaining over canonical JSON, data integrity proof
//! verification with injected cryptography, key pre-rotation discipline and
//! witness quorum checking, plus the create/update/deactivate operations
//! that extend a log.
//!
//! The crate owns no key material and performs no I/O: signing,
//! verification and fetching are capabilities supplied by the host (see
//! [`provider`]).
//!
//! See: <https://identity.foundation/didwebvh/>

pub mod core;
pub mod create;
pub mod deactivate;
pub mod document;
pub mod encoding;
mod error;
pub mod log;
pub mod proof;
pub mod provider;
pub mod resolve;
pub mod update;
mod url;
pub mod version;
pub mod witness;

pub use create::{CreateBuilder, CreateResult};
pub use deactivate::{DeactivateBuilder, DeactivateResult};
pub use document::{Document, DocumentBuilder, MethodType, Service, VerificationMethod};
pub use error::Error;
pub use log::{
    DidLog, LogEntry, Parameters, Witness, WitnessEntry, WitnessWeight, attest_version,
    parse_log, parse_witness_file, serialize_log,
};
pub use proof::Proof;
pub use provider::{Fetch, Signer, Verifier};
pub use resolve::{
    ResolutionMetadata, Resolved, ResolveOptions, ValidationPolicy, resolve_did, resolve_log,
};
pub use update::{UpdateBuilder, UpdateResult};
pub use url::{QueryParams, WebvhUrl, to_did_host};
pub use version::MethodVersion;

use std::fmt::{self, Display, Formatter};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Placeholder for the self-certifying identifier (SCID) in a DID URL.
///
/// Gets replaced by the derived SCID when constructing a DID document and
/// log entry.
pub const SCID_PLACEHOLDER: &str = "{SCID}";

pub(crate) const METHOD: &str = "webvh";

/// Returns method-specific errors.
pub type Result<T> = std::result::Result<T, Error>;

/// The verification relationship key material is used for.
#[derive(Clone, Copy, Debug, Default, Deserialize, Serialize, Hash, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum KeyPurpose {
    /// The document's `authentication` relationship.
    #[default]
    Authentication,

    /// The document's `assertionMethod` relationship.
    AssertionMethod,

    /// The document's `keyAgreement` relationship.
    KeyAgreement,

    /// The document's `capabilityInvocation` relationship.
    CapabilityInvocation,

    /// The document's `capabilityDelegation` relationship.
    CapabilityDelegation,
}

impl Display for KeyPurpose {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::Authentication => write!(f, "authentication"),
            Self::AssertionMethod => write!(f, "assertionMethod"),
            Self::KeyAgreement => write!(f, "keyAgreement"),
            Self::CapabilityInvocation => write!(f, "capabilityInvocation"),
            Self::CapabilityDelegation => write!(f, "capabilityDelegation"),
        }
    }
}

impl FromStr for KeyPurpose {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "authentication" => Ok(Self::Authentication),
            "assertionMethod" => Ok(Self::AssertionMethod),
            "keyAgreement" => Ok(Self::KeyAgreement),
            "capabilityInvocation" => Ok(Self::CapabilityInvocation),
            "capabilityDelegation" => Ok(Self::CapabilityDelegation),
            _ => Err(Error::Format(format!("invalid key purpose: {s}"))),
        }
    }
}
