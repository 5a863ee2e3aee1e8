//! # Data Integrity Proof
//!
//! The embedded proof shape used by `did:webvh` log entries and witness
//! attestations, and the composition of the bytes that get signed.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{Result, encoding};

/// Proof type for every proof this crate produces or verifies.
pub const PROOF_TYPE: &str = "DataIntegrityProof";

/// An embedded W3C Data Integrity proof.
///
/// The `proof_value` field is absent on a proof configuration (the options
/// object that is hashed alongside the secured document) and required on a
/// finished proof.
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase", default)]
pub struct Proof {
    /// An optional identifier for the proof, such as a UUID URN.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    /// The proof type. Always `DataIntegrityProof` here.
    #[serde(rename = "type")]
    pub type_: String,

    /// The cryptosuite that produced the proof, e.g. `eddsa-jcs-2022`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cryptosuite: Option<String>,

    /// The reason for the proof: `authentication` or `assertionMethod`.
    pub proof_purpose: String,

    /// A DID URL identifying the key that can verify the proof.
    pub verification_method: String,

    /// The date-time the proof was created.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created: Option<DateTime<Utc>>,

    /// The multibase-encoded signature.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub proof_value: Option<String>,
}

impl Proof {
    /// This proof without its `proof_value`: the configuration that was
    /// hashed when the signature was produced.
    #[must_use]
    pub fn config(&self) -> Self {
        let mut config = self.clone();
        config.proof_value = None;
        config
    }
}

/// Compose the bytes covered by a proof's signature: the SHA-256 of the
/// canonical proof configuration followed by the SHA-256 of the canonical
/// secured document.
///
/// Both signing and verification go through this function so the two sides
/// cannot diverge.
///
/// # Errors
/// Will fail if either value cannot be canonicalized.
pub fn signing_input<T: Serialize>(document: &T, config: &Proof) -> Result<Vec<u8>> {
    let config_data = encoding::canonicalize(&config.config())?;
    let config_hash = encoding::sha256(config_data.as_bytes());

    let document_data = encoding::canonicalize(document)?;
    let document_hash = encoding::sha256(document_data.as_bytes());

    Ok([config_hash.as_slice(), document_hash.as_slice()].concat())
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn input_is_proof_hash_then_data_hash() {
        let document = json!({"versionId": "1-abc"});
        let config = Proof {
            type_: PROOF_TYPE.to_string(),
            cryptosuite: Some("eddsa-jcs-2022".to_string()),
            proof_purpose: "assertionMethod".to_string(),
            verification_method: "did:key:z6Mk#z6Mk".to_string(),
            ..Proof::default()
        };

        let input = signing_input(&document, &config).expect("should compose");
        assert_eq!(input.len(), 64);

        let config_data = encoding::canonicalize(&config).expect("should canonicalize");
        assert_eq!(&input[..32], encoding::sha256(config_data.as_bytes()).as_slice());
        let doc_data = encoding::canonicalize(&document).expect("should canonicalize");
        assert_eq!(&input[32..], encoding::sha256(doc_data.as_bytes()).as_slice());
    }

    #[test]
    fn proof_value_is_excluded_from_config() {
        let mut signed = Proof {
            type_: PROOF_TYPE.to_string(),
            proof_purpose: "assertionMethod".to_string(),
            verification_method: "did:key:z6Mk#z6Mk".to_string(),
            ..Proof::default()
        };
        let document = json!({"versionId": "1-abc"});
        let unsigned_input = signing_input(&document, &signed).expect("should compose");

        signed.proof_value = Some("z5s...".to_string());
        let signed_input = signing_input(&document, &signed).expect("should compose");
        assert_eq!(unsigned_input, signed_input);
    }
}
