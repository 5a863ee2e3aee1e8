//! # Provider Traits
//!
//! The engine owns no key material and links no signature algorithm. Hosts
//! inject signing, verification and fetching as the capabilities below.

use std::future::Future;

use anyhow::Result;

/// [`Signer`] produces signatures over the canonical signing input composed
/// by the engine.
pub trait Signer: Send + Sync {
    /// Sign the message, returning the raw signature bytes.
    fn try_sign(&self, msg: &[u8]) -> impl Future<Output = Result<Vec<u8>>> + Send;

    /// The verification method a verifier should use to check this signer's
    /// signatures. A DID URL, typically `did:key:<multikey>#<multikey>`.
    ///
    /// Async and fallible because the implementer may need to access key
    /// information to construct the method reference.
    fn verification_method(&self) -> impl Future<Output = Result<String>> + Send;
}

/// [`Verifier`] checks a signature over a message with a raw public key.
///
/// Stateless: the engine extracts the key from the proof's verification
/// method and composes the message; the verifier only runs the algorithm.
pub trait Verifier: Send + Sync {
    /// Returns `Ok(true)` when the signature is valid for the message and
    /// key, `Ok(false)` when it is not, and an error only when the inputs
    /// are unusable (e.g. a malformed key).
    fn verify(
        &self, signature: &[u8], message: &[u8], public_key: &[u8],
    ) -> impl Future<Output = Result<bool>> + Send;
}

/// [`Fetch`] retrieves published DID artifacts for fetching-mode
/// resolution. Implementers decide the transport; the engine only supplies
/// URLs derived from the DID.
pub trait Fetch: Send + Sync {
    /// Fetch the raw `did.jsonl` content at the given URL.
    fn fetch_log(&self, url: &str) -> impl Future<Output = Result<String>> + Send;

    /// Fetch the raw `did-witness.json` content at the given URL.
    fn fetch_witness_proofs(&self, url: &str) -> impl Future<Output = Result<String>> + Send;
}

/// A registered cryptosuite: its name and the multicodec prefix its public
/// keys carry in Multikey form.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Cryptosuite {
    /// Cryptosuite identifier as it appears in proofs.
    pub name: &'static str,

    /// Multicodec prefix expected on the verification key.
    pub key_prefix: [u8; 2],
}

/// The `eddsa-jcs-2022` cryptosuite (Ed25519 over JCS).
pub const EDDSA_JCS_2022: Cryptosuite =
    Cryptosuite { name: "eddsa-jcs-2022", key_prefix: crate::encoding::ED25519_PUB_PREFIX };

const SUITES: &[Cryptosuite] = &[EDDSA_JCS_2022];

/// Look up a registered cryptosuite by name.
#[must_use]
pub fn cryptosuite(name: &str) -> Option<&'static Cryptosuite> {
    SUITES.iter().find(|s| s.name == name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_suite() {
        let suite = cryptosuite("eddsa-jcs-2022").expect("should find suite");
        assert_eq!(suite.key_prefix, [0xED, 0x01]);
    }

    #[test]
    fn unknown_suite() {
        assert!(cryptosuite("ecdsa-rdfc-2019").is_none());
    }
}
