//! Deactivate (revoke) operation for the `did:webvh` method.

use chrono::{DateTime, Duration, SubsecRound, Utc};

use crate::log::{DidLog, LogEntry, Parameters, split_version};
use crate::provider::{Signer, Verifier};
use crate::resolve::{ResolutionMetadata, resolve_log};
use crate::{Document, Error, Result, encoding};

/// Builder to deactivate a DID: one terminal log entry, or two when the
/// current entry carries pre-rotation commitments that must be nullified
/// first.
pub struct DeactivateBuilder<S> {
    log: DidLog,
    rotate: Option<(Vec<String>, Vec<String>)>,
    version_time: Option<DateTime<Utc>>,
    signer: S,
}

/// Builder does not have a signer (can't build).
pub struct WithoutSigner;

/// Builder has a signer (can build).
pub struct WithSigner<'a, S: Signer>(pub &'a S);

impl DeactivateBuilder<WithoutSigner> {
    /// Create a new `DeactivateBuilder` from the current log entries.
    ///
    /// # Errors
    /// Will fail if the log is empty.
    pub fn from(log: &[LogEntry]) -> Result<Self> {
        if log.is_empty() {
            return Err(Error::NotFound("log contains no entries".into()));
        }
        Ok(Self { log: log.to_vec(), rotate: None, version_time: None, signer: WithoutSigner })
    }

    /// Rotate the update keys for the final entries.
    ///
    /// Required when the current log entry declares pre-rotation
    /// commitments: the new update keys must hash to those commitments and
    /// their holder signs the remaining entries.
    #[must_use]
    pub fn rotate_keys(mut self, new_update_keys: &[&str], new_next_keys: &[&str]) -> Self {
        self.rotate = Some((
            new_update_keys.iter().map(ToString::to_string).collect(),
            new_next_keys.iter().map(ToString::to_string).collect(),
        ));
        self
    }

    /// Set the timestamp of the first deactivation entry (defaults to now,
    /// truncated to whole seconds).
    #[must_use]
    pub const fn version_time(mut self, version_time: DateTime<Utc>) -> Self {
        self.version_time = Some(version_time);
        self
    }

    /// Provide a signer for the deactivation entries.
    #[must_use]
    pub fn signer<S: Signer>(self, signer: &S) -> DeactivateBuilder<WithSigner<'_, S>> {
        DeactivateBuilder {
            log: self.log,
            rotate: self.rotate,
            version_time: self.version_time,
            signer: WithSigner(signer),
        }
    }
}

impl<S: Signer> DeactivateBuilder<WithSigner<'_, S>> {
    /// Build the deactivation entries.
    ///
    /// When the current entry has pre-rotation commitments, an entry
    /// nullifying them (with the rotated keys) precedes the terminal entry.
    /// The terminal entry empties the update keys and latches
    /// `deactivated`, after which the log permits no further entries.
    ///
    /// # Errors
    /// Will fail when the existing log does not resolve, the DID is
    /// already deactivated, a required rotation is missing or violates the
    /// commitments, or signing fails.
    pub async fn build(self, verifier: &impl Verifier) -> Result<DeactivateResult> {
        let current = resolve_log(&self.log, None, None, verifier).await?;
        if current.metadata.deactivated {
            return Err(Error::Policy("the DID is already deactivated".into()));
        }
        let Some(last) = self.log.last() else {
            return Err(Error::NotFound("log contains no entries".into()));
        };
        let state = last.state.clone();

        let mut version_time = self.version_time.unwrap_or_else(|| Utc::now().trunc_subsecs(0));
        if version_time <= last.version_time {
            return Err(Error::Policy(format!(
                "version time must follow the previous entry: {version_time}"
            )));
        }

        let mut log = self.log.clone();

        if current.metadata.prerotation {
            // nullify the commitments with the keys they promised
            let Some((new_update_keys, new_next_keys)) = &self.rotate else {
                return Err(Error::Policy(
                    "a key rotation is required to deactivate while pre-rotation is active".into(),
                ));
            };
            if !new_next_keys.is_empty() {
                return Err(Error::Policy(
                    "no next keys may be committed when deactivating".into(),
                ));
            }
            for key in new_update_keys {
                let hash = encoding::derive_next_key_hash(key)?;
                if !current.metadata.next_key_hashes.contains(&hash) {
                    return Err(Error::Policy(format!(
                        "new update key does not match a pre-rotation commitment: {key}"
                    )));
                }
            }

            let params = Parameters {
                update_keys: Some(new_update_keys.clone()),
                next_key_hashes: Some(vec![]),
                ..Parameters::default()
            };
            append_entry(&mut log, params, state.clone(), version_time, self.signer.0).await?;
            version_time += Duration::seconds(1);
        }

        let params = Parameters {
            update_keys: Some(vec![]),
            deactivated: Some(true),
            ..Parameters::default()
        };
        append_entry(&mut log, params, state, version_time, self.signer.0).await?;

        let resolved = resolve_log(&log, None, None, verifier).await?;
        Ok(DeactivateResult {
            did: resolved.did,
            document: resolved.document,
            metadata: resolved.metadata,
            log,
        })
    }
}

// Chain, sign and append one entry to the log.
async fn append_entry(
    log: &mut DidLog, parameters: Parameters, state: Document, version_time: DateTime<Utc>,
    signer: &impl Signer,
) -> Result<()> {
    let Some(last) = log.last() else {
        return Err(Error::NotFound("log contains no entries".into()));
    };
    let mut entry = LogEntry {
        version_id: last.version_id.clone(),
        version_time,
        parameters,
        state,
        proof: vec![],
    };
    let entry_hash = entry.hash()?;
    let (last_index, _) = split_version(&last.version_id)?;
    entry.version_id = format!("{}-{entry_hash}", last_index + 1);
    entry.sign(signer).await?;
    log.push(entry);
    Ok(())
}

/// Output of a `deactivate` operation.
#[derive(Clone, Debug)]
pub struct DeactivateResult {
    /// The `did:webvh` DID.
    pub did: String,

    /// The resolved DID document at deactivation.
    pub document: Document,

    /// Resolution metadata for the terminal version.
    pub metadata: ResolutionMetadata,

    /// The original log appended with the deactivation entries.
    pub log: DidLog,
}
