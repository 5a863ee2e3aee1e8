//! Update operation for the `did:webvh` method.

use chrono::{DateTime, SubsecRound, Utc};

use crate::log::{DidLog, LogEntry, Parameters, Witness, split_version};
use crate::provider::{Signer, Verifier};
use crate::resolve::{ResolutionMetadata, resolve_log};
use crate::url::last_segment;
use crate::witness::validate_witness;
use crate::{Document, Error, Result, encoding};

/// Builder to update a DID document and append the describing log entry.
///
/// Use this to construct an [`UpdateResult`].
pub struct UpdateBuilder<S> {
    log: DidLog,
    document: Option<Document>,
    rotate: Option<(Vec<String>, Vec<String>)>,
    witness: Option<Option<Witness>>,
    watchers: Option<Option<Vec<String>>>,
    version_time: Option<DateTime<Utc>>,
    signer: S,
}

/// Builder does not have a signer (can't build).
pub struct WithoutSigner;

/// Builder has a signer (can build).
pub struct WithSigner<'a, S: Signer>(pub &'a S);

impl UpdateBuilder<WithoutSigner> {
    /// Create a new `UpdateBuilder` from the current log entries.
    ///
    /// # Errors
    /// Will fail if the log is empty.
    pub fn from(log: &[LogEntry]) -> Result<Self> {
        if log.is_empty() {
            return Err(Error::NotFound("log contains no entries".into()));
        }
        Ok(Self {
            log: log.to_vec(),
            document: None,
            rotate: None,
            witness: None,
            watchers: None,
            version_time: None,
            signer: WithoutSigner,
        })
    }

    /// Replace the DID document. When not called, the previous document is
    /// carried forward unchanged.
    #[must_use]
    pub fn document(mut self, document: Document) -> Self {
        self.document = Some(document);
        self
    }

    /// Rotate the update keys.
    ///
    /// `new_update_keys` are the multibase-encoded public keys whose holders
    /// are authorized to sign log entries from this entry on. When the
    /// current log declares pre-rotation commitments, every new update key
    /// must hash to one of them and the new keys sign this entry.
    ///
    /// `new_next_keys` are the multibase-encoded public keys committed for
    /// the following rotation; their hashes are computed when building.
    /// Pass an empty list to stop using pre-rotation.
    #[must_use]
    pub fn rotate_keys(mut self, new_update_keys: &[&str], new_next_keys: &[&str]) -> Self {
        self.rotate = Some((
            new_update_keys.iter().map(ToString::to_string).collect(),
            new_next_keys.iter().map(ToString::to_string).collect(),
        ));
        self
    }

    /// Replace the set of witnesses for this and subsequent entries.
    #[must_use]
    pub fn witness(mut self, witness: &Witness) -> Self {
        self.witness = Some(Some(witness.clone()));
        self
    }

    /// Stop requiring witness approval from this entry on.
    #[must_use]
    pub fn remove_witness(mut self) -> Self {
        self.witness = Some(None);
        self
    }

    /// Replace the watcher URLs for this and subsequent entries.
    #[must_use]
    pub fn watchers(mut self, watchers: Vec<String>) -> Self {
        self.watchers = Some(Some(watchers));
        self
    }

    /// Clear the watcher URLs from this entry on.
    #[must_use]
    pub fn remove_watchers(mut self) -> Self {
        self.watchers = Some(None);
        self
    }

    /// Set the timestamp of the new entry (defaults to now, truncated to
    /// whole seconds). Must be later than the previous entry's timestamp.
    #[must_use]
    pub const fn version_time(mut self, version_time: DateTime<Utc>) -> Self {
        self.version_time = Some(version_time);
        self
    }

    /// Add a signer to the builder.
    #[must_use]
    pub fn signer<S: Signer>(self, signer: &S) -> UpdateBuilder<WithSigner<'_, S>> {
        UpdateBuilder {
            log: self.log,
            document: self.document,
            rotate: self.rotate,
            witness: self.witness,
            watchers: self.watchers,
            version_time: self.version_time,
            signer: WithSigner(signer),
        }
    }
}

impl<S: Signer> UpdateBuilder<WithSigner<'_, S>> {
    /// Build the new log entry.
    ///
    /// Replays the existing log first (rejecting updates to a deactivated
    /// DID), appends an entry carrying only the requested parameter deltas,
    /// signs it, and self-verifies the extended log with the supplied
    /// verifier.
    ///
    /// # Errors
    /// Will fail when the existing log does not resolve, the DID is
    /// deactivated, a rotation violates pre-rotation commitments, the new
    /// document moves a non-portable DID, or signing fails.
    pub async fn build(self, verifier: &impl Verifier) -> Result<UpdateResult> {
        let current = resolve_log(&self.log, None, None, verifier).await?;
        if current.metadata.deactivated {
            return Err(Error::Policy("cannot update a deactivated DID".into()));
        }
        let Some(last) = self.log.last() else {
            return Err(Error::NotFound("log contains no entries".into()));
        };

        let mut params = Parameters::default();
        if let Some((new_update_keys, new_next_keys)) = &self.rotate {
            if new_update_keys.is_empty() {
                return Err(Error::Config("update keys must not be empty".into()));
            }
            if current.metadata.prerotation {
                for key in new_update_keys {
                    let hash = encoding::derive_next_key_hash(key)?;
                    if !current.metadata.next_key_hashes.contains(&hash) {
                        return Err(Error::Policy(format!(
                            "new update key does not match a pre-rotation commitment: {key}"
                        )));
                    }
                }
            }
            params.update_keys = Some(new_update_keys.clone());
            let hashes = new_next_keys
                .iter()
                .map(|key| encoding::derive_next_key_hash(key))
                .collect::<Result<Vec<_>>>()?;
            params.next_key_hashes = Some(hashes);
        } else if current.metadata.prerotation {
            return Err(Error::Policy(
                "update keys must be rotated while pre-rotation is active".into(),
            ));
        }

        if let Some(witness) = &self.witness {
            if let Some(w) = witness {
                validate_witness(w, current.metadata.method)?;
            }
            params.witness.clone_from(&self.witness);
        }
        if self.watchers.is_some() {
            params.watchers.clone_from(&self.watchers);
        }

        // the move gate compares the trailing colon segment, the same value
        // the resolver checks
        let state = self.document.unwrap_or_else(|| last.state.clone());
        if last_segment(&state.id)? != last_segment(&last.state.id)? {
            if !current.metadata.portable {
                return Err(Error::Policy(
                    "the document location has changed for a non-portable DID".into(),
                ));
            }
            let moved: crate::WebvhUrl = state.id.parse()?;
            if moved.scid != current.metadata.scid {
                return Err(Error::Policy("the SCID has changed for a portable DID".into()));
            }
        }

        let version_time = self.version_time.unwrap_or_else(|| Utc::now().trunc_subsecs(0));
        if version_time <= last.version_time {
            return Err(Error::Policy(format!(
                "version time must follow the previous entry: {version_time}"
            )));
        }

        let mut entry = LogEntry {
            version_id: last.version_id.clone(),
            version_time,
            parameters: params,
            state,
            proof: vec![],
        };
        let entry_hash = entry.hash()?;
        let (last_index, _) = split_version(&last.version_id)?;
        entry.version_id = format!("{}-{entry_hash}", last_index + 1);
        entry.sign(self.signer.0).await?;

        let mut log = self.log;
        log.push(entry);
        let resolved = resolve_log(&log, None, None, verifier).await?;

        Ok(UpdateResult {
            did: resolved.did,
            document: resolved.document,
            metadata: resolved.metadata,
            log,
        })
    }
}

/// Output of an `update` operation.
#[derive(Clone, Debug)]
pub struct UpdateResult {
    /// The `did:webvh` DID.
    pub did: String,

    /// The resolved DID document after the update.
    pub document: Document,

    /// Resolution metadata for the updated version.
    pub metadata: ResolutionMetadata,

    /// The original log appended with the entry describing this update.
    pub log: DidLog,
}
