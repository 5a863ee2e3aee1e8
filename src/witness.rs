//! # Witness Verification
//!
//! Witnesses are independent `did:key` principals whose attestations over a
//! version id count toward a quorum. How approvals accumulate depends on
//! the protocol revision: `did:webvh:0.5` sums declared weights while
//! `did:webvh:1.0` counts distinct witnesses.

use serde_json::json;
use tracing::debug;

use crate::log::{Witness, WitnessEntry};
use crate::proof::signing_input;
use crate::provider::{EDDSA_JCS_2022, Verifier};
use crate::version::MethodVersion;
use crate::{Error, Result, encoding};

/// Validate the shape of a witness declaration.
///
/// For any revision the list must be non-empty with unique `did:key` ids.
/// Under `did:webvh:1.0` the threshold must be between 1 and the number of
/// witnesses; under `did:webvh:0.5` every witness needs a positive weight
/// and the total weight must be able to reach the threshold.
///
/// # Errors
/// Will fail with `Witness` when any of the above does not hold.
pub fn validate_witness(witness: &Witness, version: MethodVersion) -> Result<()> {
    if witness.witnesses.is_empty() {
        return Err(Error::Witness("witness list must not be empty".into()));
    }
    for (i, w) in witness.witnesses.iter().enumerate() {
        if !w.id.starts_with("did:key:") {
            return Err(Error::Witness(format!("witness id must be a did:key: {}", w.id)));
        }
        if witness.witnesses[..i].iter().any(|other| other.id == w.id) {
            return Err(Error::Witness(format!("duplicate witness id: {}", w.id)));
        }
    }
    match version {
        MethodVersion::V1_0 => {
            if witness.threshold == 0 || witness.threshold > witness.witnesses.len() as u64 {
                return Err(Error::Witness(format!(
                    "witness threshold must be between 1 and {}",
                    witness.witnesses.len()
                )));
            }
        }
        MethodVersion::V0_5 => {
            if witness.threshold == 0 {
                return Err(Error::Witness("witness threshold must be greater than zero".into()));
            }
            let mut total = 0;
            for w in &witness.witnesses {
                let weight = w.weight.unwrap_or_default();
                if weight == 0 {
                    return Err(Error::Witness(format!(
                        "witness weight must be greater than zero: {}",
                        w.id
                    )));
                }
                total += weight;
            }
            if total < witness.threshold {
                return Err(Error::Witness(
                    "total witness weight cannot reach the threshold".into(),
                ));
            }
        }
    }
    Ok(())
}

/// Verify that the supplied proofs establish a quorum for the given version.
///
/// Only proofs for the target `version_id` are considered. Each proof must
/// use `eddsa-jcs-2022` and be tied to a declared witness; a witness is
/// counted at most once. Returns the accumulated approvals on success.
///
/// # Errors
/// Will fail with `Witness` on an unauthorized witness, an unsupported
/// cryptosuite, or when the approvals do not reach the threshold.
pub async fn verify_witness<V: Verifier>(
    version_id: &str, witness: &Witness, proofs: &[WitnessEntry], version: MethodVersion,
    verifier: &V,
) -> Result<u64> {
    let mut approvals = 0;
    let mut counted: Vec<&str> = Vec::new();

    for entry in proofs.iter().filter(|e| e.version_id == version_id) {
        for proof in &entry.proof {
            if proof.cryptosuite.as_deref() != Some(EDDSA_JCS_2022.name) {
                return Err(Error::Witness(format!(
                    "invalid witness proof cryptosuite: {}",
                    proof.cryptosuite.as_deref().unwrap_or("")
                )));
            }
            let Some(declared) = witness
                .witnesses
                .iter()
                .find(|w| proof.verification_method.starts_with(&w.id))
            else {
                return Err(Error::Witness(format!(
                    "proof is not from a declared witness: {}",
                    proof.verification_method
                )));
            };
            if counted.contains(&declared.id.as_str()) {
                continue;
            }

            let multikey = declared.id.trim_start_matches("did:key:");
            let public_key = encoding::ed25519_public_key(multikey)?;
            let Some(proof_value) = &proof.proof_value else {
                return Err(Error::Witness(format!(
                    "witness proof has no proof value: {}",
                    declared.id
                )));
            };
            let (base, signature) = encoding::from_multibase(proof_value)?;
            if base != multibase::Base::Base58Btc {
                return Err(Error::Witness("witness proof value must be base58btc".into()));
            }

            let payload = signing_input(&json!({ "versionId": version_id }), proof)?;
            let valid = verifier
                .verify(&signature, &payload, &public_key)
                .await
                .map_err(|e| Error::Crypto(format!("witness verification failed: {e}")))?;
            if valid {
                counted.push(&declared.id);
                approvals += match version {
                    MethodVersion::V1_0 => 1,
                    MethodVersion::V0_5 => declared.weight.unwrap_or(1),
                };
            }
        }
    }

    debug!(version_id, approvals, threshold = witness.threshold, "witness tally");
    if approvals < witness.threshold {
        return Err(Error::Witness(format!(
            "witness threshold not met: {approvals} of {}",
            witness.threshold
        )));
    }
    Ok(approvals)
}

#[cfg(test)]
mod tests {
    use crate::log::WitnessWeight;

    use super::*;

    fn declaration(threshold: u64) -> Witness {
        Witness {
            threshold,
            witnesses: vec![
                WitnessWeight { id: "did:key:z6MkwOne".to_string(), weight: Some(40) },
                WitnessWeight { id: "did:key:z6MkwTwo".to_string(), weight: Some(30) },
            ],
        }
    }

    #[test]
    fn valid_declarations() {
        validate_witness(&declaration(2), MethodVersion::V1_0).expect("should validate");
        validate_witness(&declaration(60), MethodVersion::V0_5).expect("should validate");
    }

    #[test]
    fn threshold_bounds() {
        assert!(validate_witness(&declaration(0), MethodVersion::V1_0).is_err());
        assert!(validate_witness(&declaration(3), MethodVersion::V1_0).is_err());
        assert!(validate_witness(&declaration(0), MethodVersion::V0_5).is_err());
        // weights sum to 70, cannot reach 80
        assert!(validate_witness(&declaration(80), MethodVersion::V0_5).is_err());
    }

    #[test]
    fn rejects_non_did_key_and_duplicates() {
        let mut witness = declaration(1);
        witness.witnesses[0].id = "did:web:example.com".to_string();
        assert!(validate_witness(&witness, MethodVersion::V1_0).is_err());

        let mut witness = declaration(1);
        let dup_id = witness.witnesses[0].id.clone();
        witness.witnesses[1].id = dup_id;
        assert!(validate_witness(&witness, MethodVersion::V1_0).is_err());
    }

    #[test]
    fn rejects_empty_list() {
        let witness = Witness { threshold: 1, witnesses: vec![] };
        assert!(validate_witness(&witness, MethodVersion::V1_0).is_err());
    }

    #[test]
    fn missing_weight_fails_under_v0_5() {
        let mut witness = declaration(1);
        witness.witnesses[0].weight = None;
        assert!(validate_witness(&witness, MethodVersion::V0_5).is_err());
        validate_witness(&witness, MethodVersion::V1_0).expect("weight is ignored under 1.0");
    }
}
