//! # Errors
//!
//! Every failure raised by the log engine falls into one of the categories
//! below. Resolution never returns a partial result: the first failed check
//! aborts the replay with the error that describes it.

use thiserror::Error;

/// Errors raised by log validation, resolution and mutation.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum Error {
    /// Malformed input: multibase, multihash, JSON log line, version id
    /// syntax, DID URL syntax.
    #[error("format: {0}")]
    Format(String),

    /// A recomputed hash does not match the recorded one: entry hash, hash
    /// chain, or SCID derivation.
    #[error("integrity: {0}")]
    Integrity(String),

    /// A proof was produced by a key that is not authorized for the entry.
    #[error("authorization: {0}")]
    Authorization(String),

    /// A method policy was violated: portability, pre-rotation, updates
    /// after deactivation, ambiguous resolution query.
    #[error("policy: {0}")]
    Policy(String),

    /// Signature verification failed or the cryptographic material is
    /// unusable (bad key prefix, unsupported cryptosuite).
    #[error("crypto: {0}")]
    Crypto(String),

    /// Witness quorum could not be established.
    #[error("witness: {0}")]
    Witness(String),

    /// The caller did not supply something the engine needs: a verifier
    /// implementation, update keys, a supported protocol version.
    #[error("config: {0}")]
    Config(String),

    /// The log does not exist or is empty.
    #[error("not found: {0}")]
    NotFound(String),
}

impl Error {
    /// DID resolution problem-details value for this error, for hosts that
    /// surface resolution outcomes over the wire.
    #[must_use]
    pub const fn status(&self) -> &'static str {
        match self {
            Self::NotFound(_) => "notFound",
            Self::Config(_) => "internalError",
            _ => "invalidDid",
        }
    }
}
