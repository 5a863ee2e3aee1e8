//! # DID Log
//!
//! The `did.jsonl` entry model: parameters, witness declarations, entry
//! hashing and the data integrity proofs that secure each entry.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use uuid::Uuid;

use crate::proof::{PROOF_TYPE, Proof, signing_input};
use crate::provider::{EDDSA_JCS_2022, Signer};
use crate::{Error, Result, encoding};

/// A `DidLog` is the ordered set of log entries for a DID.
pub type DidLog = Vec<LogEntry>;

/// An entry in the `did.jsonl` log file denoting one version of a DID
/// document.
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct LogEntry {
    /// Version number starting at 1 and incrementing by one per version, a
    /// literal dash `-`, and the entry hash.
    pub version_id: String,

    /// A UTC timestamp for the version.
    pub version_time: DateTime<Utc>,

    /// Parameter changes taking effect with this entry.
    pub parameters: Parameters,

    /// The DID document as of this version.
    pub state: crate::Document,

    /// Data integrity proofs over the entry.
    ///
    /// Required on a published entry but excluded from entry hashing, so it
    /// is skippable here to support the build-then-sign flow.
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub proof: Vec<Proof>,
}

impl LogEntry {
    /// Hash this entry: base58btc multihash of its canonical form.
    ///
    /// # Errors
    /// Will return an error if the entry fails serialization.
    pub fn hash(&self) -> Result<String> {
        encoding::derive_hash(self)
    }

    /// Verify the hash embedded in this entry's `version_id`.
    ///
    /// The hash input is the entry without proofs and with `version_id`
    /// replaced by the predecessor version (the SCID for the first entry).
    ///
    /// # Errors
    /// Will return an error if the version id has an unexpected format or
    /// the recomputed hash does not match.
    pub fn verify_hash(&self, previous_version: &str) -> Result<()> {
        let (_, stored_hash) = split_version(&self.version_id)?;
        let mut unsigned = self.clone();
        unsigned.proof = Vec::new();
        unsigned.version_id = previous_version.to_string();
        let computed = unsigned.hash()?;
        if computed != stored_hash {
            return Err(Error::Integrity(format!(
                "entry hash mismatch for {}: computed {computed}",
                self.version_id
            )));
        }
        Ok(())
    }

    /// Construct a controller's data integrity proof and add it to the
    /// entry.
    ///
    /// # Errors
    /// Will return an error if the signer fails or the entry cannot be
    /// serialized.
    pub async fn sign(&mut self, signer: &impl Signer) -> Result<()> {
        let proof = self.proof(signer).await?;
        self.proof.push(proof);
        Ok(())
    }

    /// Construct a controller's data integrity proof over this entry
    /// without attaching it.
    ///
    /// # Errors
    /// Will return an error if the signer fails or the entry cannot be
    /// serialized.
    pub async fn proof(&self, signer: &impl Signer) -> Result<Proof> {
        let mut unsigned = self.clone();
        unsigned.proof = Vec::new();
        build_proof(&unsigned, Some(self.version_time), signer).await
    }

    /// Construct a witness attestation for this entry: a proof over the
    /// object `{"versionId": <version id>}`.
    ///
    /// # Errors
    /// Will return an error if the signer fails.
    pub async fn witness_proof(&self, signer: &impl Signer) -> Result<Proof> {
        attest_version(&self.version_id, signer).await
    }
}

/// Construct a witness attestation over a version id.
///
/// # Errors
/// Will return an error if the signer fails.
pub async fn attest_version(version_id: &str, signer: &impl Signer) -> Result<Proof> {
    build_proof(&json!({ "versionId": version_id }), None, signer).await
}

async fn build_proof<T: Serialize>(
    document: &T, created: Option<DateTime<Utc>>, signer: &impl Signer,
) -> Result<Proof> {
    let verification_method = signer
        .verification_method()
        .await
        .map_err(|e| Error::Crypto(format!("signer has no verification method: {e}")))?;

    let mut proof = Proof {
        id: Some(format!("urn:uuid:{}", Uuid::new_v4())),
        type_: PROOF_TYPE.to_string(),
        cryptosuite: Some(EDDSA_JCS_2022.name.to_string()),
        verification_method,
        created: Some(created.unwrap_or_else(Utc::now)),
        proof_purpose: "assertionMethod".to_string(),
        proof_value: None,
    };

    let payload = signing_input(document, &proof)?;
    let signature =
        signer.try_sign(&payload).await.map_err(|e| Error::Crypto(format!("signing failed: {e}")))?;
    proof.proof_value = Some(encoding::to_base58(&signature));
    Ok(proof)
}

/// Split a `versionId` into its numeric prefix and hash.
///
/// # Errors
/// Will fail when the id is not `<n>-<hash>`.
pub fn split_version(version_id: &str) -> Result<(u64, &str)> {
    let Some((index, hash)) = version_id.split_once('-') else {
        return Err(Error::Format(format!("version id has an unexpected format: {version_id}")));
    };
    let index = index
        .parse::<u64>()
        .map_err(|_| Error::Format(format!("version id has a non-numeric prefix: {version_id}")))?;
    if hash.is_empty() {
        return Err(Error::Format(format!("version id has no entry hash: {version_id}")));
    }
    Ok((index, hash))
}

/// Parameters for a DID log entry.
///
/// Every key is an individual delta: an absent key carries the previous
/// value forward. `witness` and `watchers` additionally distinguish an
/// explicit `null` (clear the value) from absence (inherit).
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase", default)]
pub struct Parameters {
    /// The `did:webvh` specification revision to process the log under.
    /// Required on the first entry.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub method: Option<String>,

    /// The self-certifying identifier for the DID. Required on the first
    /// entry, prohibited afterwards.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scid: Option<String>,

    /// Multikey-format public keys authorized to sign log entries.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub update_keys: Option<Vec<String>>,

    /// Hashes of public keys that may become update keys in the next entry.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_key_hashes: Option<Vec<String>>,

    /// Whether the DID may move to a different host. Only settable on the
    /// first entry.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub portable: Option<bool>,

    /// Witness declaration for the DID, or `null` to stop requiring
    /// witness approval.
    #[serde(with = "double_option", skip_serializing_if = "Option::is_none")]
    pub witness: Option<Option<Witness>>,

    /// URLs of watchers to notify of DID updates, or `null` to clear.
    #[serde(with = "double_option", skip_serializing_if = "Option::is_none")]
    pub watchers: Option<Option<Vec<String>>>,

    /// Marks the DID deactivated. Once true the log permits no further
    /// entries.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deactivated: Option<bool>,
}

/// A witness declaration: the threshold of approvals required and the
/// witnesses that may contribute them.
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq, Eq)]
pub struct Witness {
    /// Approvals required before a version is accepted.
    pub threshold: u64,

    /// The declared witnesses.
    pub witnesses: Vec<WitnessWeight>,
}

/// A single declared witness.
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq, Eq)]
pub struct WitnessWeight {
    /// The witness's `did:key` DID.
    pub id: String,

    /// The weight the witness contributes under `did:webvh:0.5` counting.
    /// Ignored under `did:webvh:1.0`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub weight: Option<u64>,
}

/// Entry in the `did-witness.json` file.
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct WitnessEntry {
    /// Version id of the log entry the witnesses attest to.
    pub version_id: String,

    /// Witness attestations over `{"versionId": <version id>}`.
    pub proof: Vec<Proof>,
}

/// Parse the content of a `did.jsonl` file into log entries.
///
/// # Errors
/// Will return `NotFound` when the file holds no entries and `Format` for
/// an unparseable line.
pub fn parse_log(content: &str) -> Result<DidLog> {
    let mut entries = Vec::new();
    for (number, line) in content.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        let entry: LogEntry = serde_json::from_str(line)
            .map_err(|e| Error::Format(format!("invalid log entry on line {}: {e}", number + 1)))?;
        entries.push(entry);
    }
    if entries.is_empty() {
        return Err(Error::NotFound("log contains no entries".into()));
    }
    Ok(entries)
}

/// Serialize log entries to `did.jsonl` content, one entry per line with a
/// trailing newline.
///
/// # Errors
/// Will return an error if an entry fails serialization.
pub fn serialize_log(log: &[LogEntry]) -> Result<String> {
    let mut content = String::new();
    for entry in log {
        let line = serde_json::to_string(entry)
            .map_err(|e| Error::Format(format!("log entry serialization failed: {e}")))?;
        content.push_str(&line);
        content.push('\n');
    }
    Ok(content)
}

/// Parse the content of a `did-witness.json` file.
///
/// # Errors
/// Will return `Format` when the content is not an array of witness
/// entries.
pub fn parse_witness_file(content: &str) -> Result<Vec<WitnessEntry>> {
    serde_json::from_str(content)
        .map_err(|e| Error::Format(format!("invalid witness file: {e}")))
}

// Serde adapter distinguishing an absent key from an explicit `null`.
mod double_option {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<T, S>(value: &Option<Option<T>>, serializer: S) -> Result<S::Ok, S::Error>
    where
        T: Serialize,
        S: Serializer,
    {
        match value {
            Some(inner) => inner.serialize(serializer),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, T, D>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
    where
        T: Deserialize<'de>,
        D: Deserializer<'de>,
    {
        Option::<T>::deserialize(deserializer).map(Some)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry() -> LogEntry {
        LogEntry {
            version_id: "1-abc".to_string(),
            version_time: "2024-01-01T08:32:55Z".parse().expect("should parse time"),
            parameters: Parameters {
                method: Some("did:webvh:1.0".to_string()),
                scid: Some("abc".to_string()),
                update_keys: Some(vec!["z6Mk".to_string()]),
                ..Parameters::default()
            },
            state: crate::Document {
                id: "did:webvh:abc:example.com".to_string(),
                ..crate::Document::default()
            },
            proof: vec![],
        }
    }

    #[test]
    fn split_version_formats() {
        assert_eq!(split_version("3-zQmY").expect("should split"), (3, "zQmY"));
        assert!(split_version("nodash").is_err());
        assert!(split_version("x-zQmY").is_err());
        assert!(split_version("3-").is_err());
    }

    #[test]
    fn jsonl_round_trip() {
        let log = vec![entry()];
        let content = serialize_log(&log).expect("should serialize");
        assert!(content.ends_with('\n'));
        let parsed = parse_log(&content).expect("should parse");
        assert_eq!(parsed, log);
    }

    #[test]
    fn empty_log_is_not_found() {
        assert!(matches!(parse_log(""), Err(Error::NotFound(_))));
        assert!(matches!(parse_log("\n\n"), Err(Error::NotFound(_))));
    }

    #[test]
    fn bad_line_reports_position() {
        let content = format!("{}\nnot json\n", serde_json::to_string(&entry()).unwrap());
        let err = parse_log(&content).expect_err("should fail");
        let Error::Format(msg) = err else { panic!("expected format error") };
        assert!(msg.contains("line 2"), "got {msg}");
    }

    #[test]
    fn hash_excludes_proof() {
        let mut signed = entry();
        let unsigned_hash = signed.hash().expect("should hash");
        signed.proof.push(Proof::default());
        let mut stripped = signed.clone();
        stripped.proof = Vec::new();
        assert_eq!(stripped.hash().expect("should hash"), unsigned_hash);
        assert_ne!(signed.hash().expect("should hash"), unsigned_hash);
    }

    #[test]
    fn witness_null_clears_but_absent_inherits() {
        let absent: Parameters = serde_json::from_str("{}").expect("should parse");
        assert_eq!(absent.witness, None);

        let cleared: Parameters = serde_json::from_str(r#"{"witness":null}"#).expect("should parse");
        assert_eq!(cleared.witness, Some(None));

        let set: Parameters = serde_json::from_str(
            r#"{"witness":{"threshold":1,"witnesses":[{"id":"did:key:z6Mk"}]}}"#,
        )
        .expect("should parse");
        assert!(matches!(set.witness, Some(Some(_))));

        // absent keys do not serialize, explicit null does
        let serialized = serde_json::to_string(&cleared).expect("should serialize");
        assert_eq!(serialized, r#"{"witness":null}"#);
        assert_eq!(serde_json::to_string(&absent).expect("should serialize"), "{}");
    }

    #[test]
    fn verify_hash_round_trip() {
        let mut e = entry();
        let scid = "abc";
        let mut unsigned = e.clone();
        unsigned.version_id = scid.to_string();
        let hash = unsigned.hash().expect("should hash");
        e.version_id = format!("1-{hash}");
        e.verify_hash(scid).expect("should verify");

        // a tampered document breaks the hash
        e.state.id = "did:webvh:abc:evil.example".to_string();
        assert!(matches!(e.verify_hash(scid), Err(Error::Integrity(_))));
    }
}
