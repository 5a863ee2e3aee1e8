//! # Log Resolution
//!
//! Replays a DID log from genesis, enforcing the method's invariants at
//! every entry, and returns the document and metadata for the requested
//! version.

use chrono::{DateTime, Utc};
use tracing::debug;

use crate::log::{LogEntry, Witness, WitnessEntry, parse_log, parse_witness_file, split_version};
use crate::proof::{PROOF_TYPE, signing_input};
use crate::provider::{Fetch, Verifier, cryptosuite};
use crate::url::{WebvhUrl, last_segment};
use crate::version::MethodVersion;
use crate::witness::{validate_witness, verify_witness};
use crate::{Document, Error, Result, encoding};

/// Switches that short-circuit individual validation gates.
///
/// These exist so isolated unit tests can exercise one gate at a time. A
/// policy travels with the call that supplied it; concurrent resolutions
/// with different policies do not interfere.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ValidationPolicy {
    /// Do not require proof keys to be authorized update keys.
    pub skip_key_authorization: bool,

    /// Do not require rotated keys to match pre-rotation commitments.
    pub skip_next_key_validation: bool,

    /// Do not check the document id against the DID's host and SCID.
    pub skip_document_state_validation: bool,

    /// Do not recompute entry hashes.
    pub skip_hash_chain_validation: bool,

    /// Do not re-derive the SCID from the first entry.
    pub skip_scid_derivation: bool,

    /// Do not verify witness quorum on the final entry.
    pub skip_witness_verification: bool,
}

/// Selection of the log version to resolve plus the validation policy.
///
/// With no selector set, resolution returns the latest version.
#[derive(Clone, Debug, Default)]
pub struct ResolveOptions {
    /// Resolve the entry with this version number (1-based).
    pub version_number: Option<u64>,

    /// Resolve the entry with this exact version id.
    pub version_id: Option<String>,

    /// Resolve the version that was current at this time.
    pub version_time: Option<DateTime<Utc>>,

    /// Resolve the first version containing this verification method
    /// (a full id or a bare `#fragment`). Mutually exclusive with the
    /// version selectors.
    pub verification_method: Option<String>,

    /// Validation gates to bypass. Testing only.
    pub policy: ValidationPolicy,
}

impl ResolveOptions {
    const fn has_selector(&self) -> bool {
        self.version_number.is_some()
            || self.version_id.is_some()
            || self.version_time.is_some()
            || self.verification_method.is_some()
    }
}

/// Metadata accumulated while replaying a log.
///
/// A fold over the entry sequence: no field ever reflects a later entry
/// than the resolved one.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ResolutionMetadata {
    /// Version id of the resolved entry.
    pub version_id: String,

    /// Timestamp of the first log entry.
    pub created: DateTime<Utc>,

    /// Timestamp of the resolved entry.
    pub updated: DateTime<Utc>,

    /// The DID's self-certifying identifier.
    pub scid: String,

    /// Keys currently authorized to sign log entries.
    pub update_keys: Vec<String>,

    /// Active pre-rotation commitments.
    pub next_key_hashes: Vec<String>,

    /// True while `next_key_hashes` is non-empty.
    pub prerotation: bool,

    /// Whether the DID may move hosts.
    pub portable: bool,

    /// Whether the DID has been deactivated.
    pub deactivated: bool,

    /// Active witness declaration, if any.
    pub witness: Option<Witness>,

    /// Active watcher URLs, if any.
    pub watchers: Option<Vec<String>>,

    /// Hash part of the predecessor entry's version id.
    pub previous_log_entry_hash: Option<String>,

    /// The protocol revision the log is processed under.
    pub method: MethodVersion,
}

/// Outcome of a successful resolution.
#[derive(Clone, Debug)]
pub struct Resolved {
    /// The resolved DID.
    pub did: String,

    /// The DID document at the resolved version, with default services
    /// materialized.
    pub document: Document,

    /// Resolution metadata as of the resolved version.
    pub metadata: ResolutionMetadata,
}

/// Verify a DID log and resolve it into a document.
///
/// Callers read the content of a `did.jsonl` file into log entries (see
/// [`parse_log`]) and pass them here together with a [`Verifier`] for
/// signature checking.
///
/// Pass `None` for `witness_proofs` to skip witness quorum verification;
/// pass `Some` with the parsed content of the sibling `did-witness.json`
/// file to enforce it.
///
/// # Errors
/// Any violated invariant aborts resolution with the error describing it;
/// no partial result is returned.
pub async fn resolve_log<V: Verifier>(
    log: &[LogEntry], witness_proofs: Option<&[WitnessEntry]>, options: Option<&ResolveOptions>,
    verifier: &V,
) -> Result<Resolved> {
    let default_options = ResolveOptions::default();
    let opts = options.unwrap_or(&default_options);
    let policy = opts.policy;

    if opts.verification_method.is_some()
        && (opts.version_number.is_some() || opts.version_id.is_some())
    {
        return Err(Error::Policy(
            "verification method and version selectors are mutually exclusive".into(),
        ));
    }
    if log.is_empty() {
        return Err(Error::NotFound("log contains no entries".into()));
    }

    let first = &log[0];
    let Some(method) = &first.parameters.method else {
        return Err(Error::Format("method parameter is required on the first entry".into()));
    };
    let mut version: MethodVersion = method.parse()?;

    let Some(scid) = first.parameters.scid.clone() else {
        return Err(Error::Format("scid parameter is required on the first entry".into()));
    };
    let update_keys = first.parameters.update_keys.clone().unwrap_or_default();
    if update_keys.is_empty() {
        return Err(Error::Config("update keys are required on the first entry".into()));
    }

    let next_key_hashes = first.parameters.next_key_hashes.clone().unwrap_or_default();
    let mut meta = ResolutionMetadata {
        version_id: first.version_id.clone(),
        created: first.version_time,
        updated: first.version_time,
        scid: scid.clone(),
        update_keys,
        prerotation: !next_key_hashes.is_empty(),
        next_key_hashes,
        portable: first.parameters.portable.unwrap_or_default(),
        deactivated: false,
        witness: None,
        watchers: None,
        previous_log_entry_hash: None,
        method: version,
    };
    if let Some(witness) = &first.parameters.witness {
        if let Some(w) = witness {
            validate_witness(w, version)?;
        }
        meta.witness.clone_from(witness);
    }
    if let Some(watchers) = &first.parameters.watchers {
        meta.watchers.clone_from(watchers);
    }

    let mut host = last_segment(&first.state.id)?;
    // the predecessor version for the first entry's hash is the SCID
    let mut prev_version = scid.clone();
    let mut prev_time: Option<DateTime<Utc>> = None;
    let mut prev_next_key_hashes = meta.next_key_hashes.clone();

    for (i, entry) in log.iter().enumerate() {
        let (index, _) = split_version(&entry.version_id)?;
        if index != i as u64 + 1 {
            return Err(Error::Format(format!(
                "version number out of sequence: expected {}, found {index}",
                i + 1
            )));
        }
        if let Some(prev) = prev_time {
            if entry.version_time <= prev {
                return Err(Error::Policy(format!(
                    "version time must increase: {} does not follow {prev}",
                    entry.version_time
                )));
            }
        }

        if i == 0 {
            if !policy.skip_scid_derivation {
                verify_scid(entry, &scid)?;
            }
            if !policy.skip_hash_chain_validation {
                entry.verify_hash(&prev_version)?;
            }
            verify_entry_proofs(entry, &meta.update_keys, policy, verifier).await?;
        } else {
            if meta.deactivated {
                return Err(Error::Policy("log contains entries after deactivation".into()));
            }
            let params = &entry.parameters;
            if params.scid.is_some() {
                return Err(Error::Policy("scid can only be set in the first entry".into()));
            }
            if params.portable.is_some() {
                return Err(Error::Policy("portable can only be set in the first entry".into()));
            }
            if let Some(method) = &params.method {
                version = method.parse()?;
                meta.method = version;
            }

            if !policy.skip_document_state_validation {
                let new_host = last_segment(&entry.state.id)?;
                if new_host != host {
                    if !meta.portable {
                        return Err(Error::Policy(format!(
                            "portability violation: host changed from {host} to {new_host}"
                        )));
                    }
                    host = new_host;
                }
            }

            // With pre-rotation active, the entry's own (rotated) keys sign
            // it; otherwise the keys carried forward from earlier entries do.
            let prerotation_active = !prev_next_key_hashes.is_empty();
            let signing_keys = if prerotation_active {
                match &params.update_keys {
                    Some(new_keys) if !new_keys.is_empty() => new_keys.clone(),
                    _ => {
                        return Err(Error::Policy(
                            "update keys are required when pre-rotation is active".into(),
                        ));
                    }
                }
            } else {
                meta.update_keys.clone()
            };

            if !policy.skip_hash_chain_validation {
                entry.verify_hash(&prev_version)?;
            }

            if prerotation_active && !policy.skip_next_key_validation {
                for key in &signing_keys {
                    if !prev_next_key_hashes.contains(&encoding::derive_next_key_hash(key)?) {
                        return Err(Error::Policy(format!(
                            "update key was not committed by the previous entry: {key}"
                        )));
                    }
                }
            }

            verify_entry_proofs(entry, &signing_keys, policy, verifier).await?;

            // parameter transitions, in order
            if let Some(new_keys) = &params.update_keys {
                meta.update_keys.clone_from(new_keys);
            }
            if params.deactivated == Some(true) {
                meta.deactivated = true;
            }
            if let Some(hashes) = &params.next_key_hashes {
                meta.next_key_hashes.clone_from(hashes);
                meta.prerotation = !hashes.is_empty();
            }
            if let Some(witness) = &params.witness {
                if let Some(w) = witness {
                    validate_witness(w, version)?;
                }
                meta.witness.clone_from(witness);
            }
            if let Some(watchers) = &params.watchers {
                meta.watchers.clone_from(watchers);
            }

            let (_, previous_hash) = split_version(&prev_version)?;
            meta.previous_log_entry_hash = Some(previous_hash.to_string());
            meta.version_id = entry.version_id.clone();
            meta.updated = entry.version_time;
            prev_next_key_hashes.clone_from(&meta.next_key_hashes);
        }

        prev_version.clone_from(&entry.version_id);
        prev_time = Some(entry.version_time);

        // document finalization
        let did = entry.state.id.clone();
        let parsed: WebvhUrl = did.parse()?;
        if !policy.skip_document_state_validation && parsed.scid != meta.scid {
            return Err(Error::Integrity("document id does not embed the SCID".into()));
        }
        let mut document = entry.state.clone();
        document.add_default_services(&parsed.base_url()?);

        debug!(version_id = %entry.version_id, "log entry accepted");

        // selectors
        if let Some(vm) = &opts.verification_method {
            if document.has_verification_method(vm) {
                return Ok(Resolved { did, document, metadata: meta });
            }
        }
        if opts.version_number == Some(i as u64 + 1)
            || opts.version_id.as_deref() == Some(entry.version_id.as_str())
        {
            return Ok(Resolved { did, document, metadata: meta });
        }
        if let Some(time) = opts.version_time {
            if time >= entry.version_time
                && log.get(i + 1).map_or(true, |next| time < next.version_time)
            {
                return Ok(Resolved { did, document, metadata: meta });
            }
        }

        if i == log.len() - 1 {
            if opts.has_selector() {
                return Err(Error::NotFound("no log entry matches the resolution query".into()));
            }
            if let Some(witness) = &meta.witness {
                if !policy.skip_witness_verification {
                    if let Some(proofs) = witness_proofs {
                        verify_witness(&meta.version_id, witness, proofs, version, verifier)
                            .await?;
                    }
                }
            }
            return Ok(Resolved { did, document, metadata: meta });
        }
    }

    Err(Error::NotFound("no log entry matches the resolution query".into()))
}

/// Resolve a DID by fetching its published artifacts through the host's
/// [`Fetch`] capability.
///
/// Produces the same result as [`resolve_log`] over the same bytes. DID
/// query parameters (`versionId`, `versionTime`) act as selectors unless
/// the supplied options already set one.
///
/// # Errors
/// Fails with `Config` when no verifier is supplied, `NotFound` when the
/// log cannot be fetched, and otherwise as [`resolve_log`].
pub async fn resolve_did<F: Fetch, V: Verifier>(
    did: &str, fetcher: &F, verifier: Option<&V>, options: Option<&ResolveOptions>,
) -> Result<Resolved> {
    let Some(verifier) = verifier else {
        return Err(Error::Config("verifier implementation is required".into()));
    };
    let url: WebvhUrl = did.parse()?;

    let content = fetcher
        .fetch_log(&url.log_url()?)
        .await
        .map_err(|e| Error::NotFound(format!("could not fetch log: {e}")))?;
    let log = parse_log(&content)?;

    let mut opts = options.cloned().unwrap_or_default();
    if let Some(query) = &url.query {
        if opts.version_id.is_none() {
            opts.version_id.clone_from(&query.version_id);
        }
        if opts.version_time.is_none() {
            if let Some(time) = &query.version_time {
                let parsed = time
                    .parse()
                    .map_err(|e| Error::Format(format!("invalid versionTime parameter: {e}")))?;
                opts.version_time = Some(parsed);
            }
        }
    }

    // only fetch attestations when some entry declares witnesses
    let declares_witness = log.iter().any(|e| matches!(e.parameters.witness, Some(Some(_))));
    let witness_proofs = if declares_witness {
        match fetcher.fetch_witness_proofs(&url.witness_url()?).await {
            Ok(content) => parse_witness_file(&content)?,
            Err(_) => Vec::new(),
        }
    } else {
        Vec::new()
    };

    resolve_log(&log, Some(&witness_proofs), Some(&opts), verifier).await
}

// Re-derive the SCID from the first entry: serialize, substitute the SCID
// value with its placeholder, reset the version id to the placeholder and
// hash the result.
fn verify_scid(entry: &LogEntry, scid: &str) -> Result<()> {
    let mut unsigned = entry.clone();
    unsigned.proof = Vec::new();
    let serialized = serde_json::to_string(&unsigned)
        .map_err(|e| Error::Format(format!("log entry serialization failed: {e}")))?;
    let replaced = serialized.replace(scid, crate::SCID_PLACEHOLDER);
    let mut preliminary: LogEntry = serde_json::from_str(&replaced)
        .map_err(|e| Error::Format(format!("invalid preliminary log entry: {e}")))?;
    preliminary.version_id = crate::SCID_PLACEHOLDER.to_string();
    let computed = preliminary.hash()?;
    if computed != scid {
        return Err(Error::Integrity(format!(
            "SCID does not match the hash of the first log entry: computed {computed}"
        )));
    }
    Ok(())
}

// Verify every proof on a log entry against the authorized key set.
async fn verify_entry_proofs<V: Verifier>(
    entry: &LogEntry, authorized: &[String], policy: ValidationPolicy, verifier: &V,
) -> Result<()> {
    if entry.proof.is_empty() {
        return Err(Error::Authorization("log entry has no proof".into()));
    }
    let mut unsigned = entry.clone();
    unsigned.proof = Vec::new();

    for proof in &entry.proof {
        if proof.type_ != PROOF_TYPE {
            return Err(Error::Crypto(format!("unsupported proof type: {}", proof.type_)));
        }
        let Some(suite) = proof.cryptosuite.as_deref() else {
            return Err(Error::Crypto("proof has no cryptosuite".into()));
        };
        if cryptosuite(suite).is_none() {
            return Err(Error::Crypto(format!("unsupported cryptosuite: {suite}")));
        }
        if proof.proof_purpose != "authentication" && proof.proof_purpose != "assertionMethod" {
            return Err(Error::Crypto(format!(
                "unsupported proof purpose: {}",
                proof.proof_purpose
            )));
        }

        let Some(multikey) = proof.verification_method.strip_prefix("did:key:") else {
            return Err(Error::Authorization(format!(
                "proof verification method is not a did:key: {}",
                proof.verification_method
            )));
        };
        let multikey = multikey.split('#').next().unwrap_or(multikey);
        if !policy.skip_key_authorization && !authorized.iter().any(|k| k == multikey) {
            return Err(Error::Authorization(format!(
                "key is not authorized to sign this entry: {multikey}"
            )));
        }

        let public_key = encoding::ed25519_public_key(multikey)?;
        let Some(proof_value) = &proof.proof_value else {
            return Err(Error::Crypto("proof has no proof value".into()));
        };
        let (base, signature) = encoding::from_multibase(proof_value)?;
        if base != multibase::Base::Base58Btc {
            return Err(Error::Crypto("proof value must be base58btc encoded".into()));
        }

        let payload = signing_input(&unsigned, proof)?;
        let valid = verifier
            .verify(&signature, &payload, &public_key)
            .await
            .map_err(|e| Error::Crypto(format!("verifier error: {e}")))?;
        if !valid {
            return Err(Error::Crypto(format!(
                "signature verification failed for {}",
                proof.verification_method
            )));
        }
    }
    Ok(())
}
