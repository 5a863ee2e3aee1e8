//! Create operation for the `did:webvh` method.

use chrono::{DateTime, SubsecRound, Utc};

use crate::document::DocumentBuilder;
use crate::log::{DidLog, LogEntry, Parameters, Witness};
use crate::provider::{Signer, Verifier};
use crate::resolve::{ResolutionMetadata, resolve_log};
use crate::url::to_did_host;
use crate::version::MethodVersion;
use crate::witness::validate_witness;
use crate::{Document, Error, METHOD, Result, SCID_PLACEHOLDER, encoding};

/// Builder to create a new `did:webvh` document and its genesis log entry.
///
/// Use this to construct a [`CreateResult`].
pub struct CreateBuilder<U, S, D> {
    url: String,
    portable: bool,
    next_keys: Vec<String>,
    witness: Option<Witness>,
    watchers: Option<Vec<String>>,
    method: MethodVersion,
    version_time: Option<DateTime<Utc>>,
    update_keys: U,
    signer: S,
    document: D,
}

/// Builder does not have update keys (can't build).
pub struct NoUpdateKeys;

/// Builder has update keys (can build).
pub struct WithUpdateKeys(Vec<String>);

/// Builder does not have a signer (can't build).
pub struct NoSigner;

/// Builder has a signer (can build).
pub struct WithSigner<'a, S: Signer>(pub &'a S);

/// Builder does not have a document (can't build).
pub struct NoDocument;

/// Builder has a document (can build).
pub struct WithDocument(DocumentBuilder);

impl CreateBuilder<NoUpdateKeys, NoSigner, NoDocument> {
    /// Start a new `create` operation for the DID published at the given
    /// HTTP URL.
    #[must_use]
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            portable: false,
            next_keys: Vec::new(),
            witness: None,
            watchers: None,
            method: MethodVersion::default(),
            version_time: None,
            update_keys: NoUpdateKeys,
            signer: NoSigner,
            document: NoDocument,
        }
    }

    /// Add a populated [`DocumentBuilder`] instance.
    #[must_use]
    pub fn document(
        self, builder: DocumentBuilder,
    ) -> CreateBuilder<NoUpdateKeys, NoSigner, WithDocument> {
        CreateBuilder {
            url: self.url,
            portable: self.portable,
            next_keys: self.next_keys,
            witness: self.witness,
            watchers: self.watchers,
            method: self.method,
            version_time: self.version_time,
            update_keys: NoUpdateKeys,
            signer: NoSigner,
            document: WithDocument(builder),
        }
    }
}

impl CreateBuilder<NoUpdateKeys, NoSigner, WithDocument> {
    /// Add update keys: the multibase-encoded public keys authorized to
    /// sign log entries for the DID.
    #[must_use]
    pub fn update_keys(
        self, update_keys: Vec<String>,
    ) -> CreateBuilder<WithUpdateKeys, NoSigner, WithDocument> {
        CreateBuilder {
            url: self.url,
            portable: self.portable,
            next_keys: self.next_keys,
            witness: self.witness,
            watchers: self.watchers,
            method: self.method,
            version_time: self.version_time,
            update_keys: WithUpdateKeys(update_keys),
            signer: NoSigner,
            document: self.document,
        }
    }
}

impl CreateBuilder<WithUpdateKeys, NoSigner, WithDocument> {
    /// Add a signer holding one of the update keys.
    #[must_use]
    pub fn signer<S: Signer>(
        self, signer: &S,
    ) -> CreateBuilder<WithUpdateKeys, WithSigner<'_, S>, WithDocument> {
        CreateBuilder {
            url: self.url,
            portable: self.portable,
            next_keys: self.next_keys,
            witness: self.witness,
            watchers: self.watchers,
            method: self.method,
            version_time: self.version_time,
            update_keys: self.update_keys,
            signer: WithSigner(signer),
            document: self.document,
        }
    }
}

impl<U, S, D> CreateBuilder<U, S, D> {
    /// Set the DID to be portable or not (defaults to not portable).
    #[must_use]
    pub const fn portable(mut self, portable: bool) -> Self {
        self.portable = portable;
        self
    }

    /// Commit to a key for the next rotation. Pass the multibase-encoded
    /// public key; its hash is computed when building.
    #[must_use]
    pub fn next_key(mut self, next_key_multi: impl Into<String>) -> Self {
        self.next_keys.push(next_key_multi.into());
        self
    }

    /// Add a set of witnesses to the create operation.
    #[must_use]
    pub fn witness(mut self, witness: &Witness) -> Self {
        self.witness = Some(witness.clone());
        self
    }

    /// Add watcher URLs to notify of DID updates.
    #[must_use]
    pub fn watchers(mut self, watchers: Vec<String>) -> Self {
        self.watchers = Some(watchers);
        self
    }

    /// Select the protocol revision (defaults to `did:webvh:1.0`).
    #[must_use]
    pub const fn method(mut self, method: MethodVersion) -> Self {
        self.method = method;
        self
    }

    /// Set the timestamp of the genesis entry (defaults to now, truncated
    /// to whole seconds).
    #[must_use]
    pub const fn version_time(mut self, version_time: DateTime<Utc>) -> Self {
        self.version_time = Some(version_time);
        self
    }
}

impl<S: Signer> CreateBuilder<WithUpdateKeys, WithSigner<'_, S>, WithDocument> {
    /// Build the genesis log entry.
    ///
    /// Derives the SCID from the placeholder form of the entry, substitutes
    /// it back in, computes the `1-<hash>` version id, signs the entry and
    /// finally resolves the one-entry log with the supplied verifier to
    /// guarantee the result is resolvable.
    ///
    /// # Errors
    /// Will fail when update keys are missing, the witness declaration is
    /// invalid, the URL cannot be converted to a DID host, or when signing
    /// or self-verification fails.
    pub async fn build(self, verifier: &impl Verifier) -> Result<CreateResult> {
        if self.update_keys.0.is_empty() {
            return Err(Error::Config("update keys must not be empty".into()));
        }
        if let Some(witness) = &self.witness {
            validate_witness(witness, self.method)?;
        }

        let host = to_did_host(&self.url)?;
        let controller = format!("did:{METHOD}:{SCID_PLACEHOLDER}:{host}");
        let document = self.document.0.build(&controller)?;

        let next_key_hashes = self
            .next_keys
            .iter()
            .map(|key| encoding::derive_next_key_hash(key))
            .collect::<Result<Vec<_>>>()?;

        // the genesis entry uses the `{SCID}` placeholder for the SCID value
        let initial_entry = LogEntry {
            version_id: SCID_PLACEHOLDER.to_string(),
            version_time: self.version_time.unwrap_or_else(|| Utc::now().trunc_subsecs(0)),
            parameters: Parameters {
                method: Some(self.method.to_string()),
                scid: Some(SCID_PLACEHOLDER.to_string()),
                update_keys: Some(self.update_keys.0),
                portable: Some(self.portable),
                next_key_hashes: if next_key_hashes.is_empty() {
                    None
                } else {
                    Some(next_key_hashes)
                },
                witness: self.witness.map(Some),
                watchers: self.watchers.map(Some),
                ..Parameters::default()
            },
            state: document,
            proof: vec![],
        };

        // hash the placeholder entry to derive the SCID, then substitute the
        // SCID into the entry's textual form
        let scid = initial_entry.hash()?;
        let initial_json = serde_json::to_string(&initial_entry)
            .map_err(|e| Error::Format(format!("log entry serialization failed: {e}")))?;
        let self_certified = initial_json.replace(SCID_PLACEHOLDER, &scid);

        let mut entry: LogEntry = serde_json::from_str(&self_certified)
            .map_err(|e| Error::Format(format!("invalid self-certified log entry: {e}")))?;
        let entry_hash = entry.hash()?;
        entry.version_id = format!("1-{entry_hash}");
        entry.sign(self.signer.0).await?;

        let resolved = resolve_log(&[entry.clone()], None, None, verifier).await?;

        Ok(CreateResult {
            did: resolved.did,
            document: resolved.document,
            metadata: resolved.metadata,
            log: vec![entry],
        })
    }
}

/// Output of a `create` operation.
#[derive(Clone, Debug)]
pub struct CreateResult {
    /// The `did:webvh` DID.
    pub did: String,

    /// The resolved DID document.
    pub document: Document,

    /// Resolution metadata for the genesis version.
    pub metadata: ResolutionMetadata,

    /// Version history log with the single genesis entry, suitable for
    /// writing to a `did.jsonl` file.
    pub log: DidLog,
}
