//! Ed25519 keyring for exercising the log engine in tests.

#![allow(dead_code)]

use anyhow::anyhow;
use ed25519_dalek::{Signer as _, SigningKey, VerifyingKey};
use rand::rngs::OsRng;
use webvh_core::{Signer, Verifier, encoding};

/// A signing key with a pre-generated successor for rotation flows.
pub struct Keyring {
    signing_key: SigningKey,
    next_key: SigningKey,
}

impl Keyring {
    pub fn new() -> Self {
        Self {
            signing_key: SigningKey::generate(&mut OsRng),
            next_key: SigningKey::generate(&mut OsRng),
        }
    }

    /// The active public key in Multikey form.
    pub fn multibase(&self) -> String {
        encoding::multikey(self.signing_key.verifying_key().as_bytes())
    }

    /// The committed next public key in Multikey form.
    pub fn next_multibase(&self) -> String {
        encoding::multikey(self.next_key.verifying_key().as_bytes())
    }

    /// The active key as a `did:key` DID URL.
    pub fn did_key(&self) -> String {
        let multibase = self.multibase();
        format!("did:key:{multibase}#{multibase}")
    }

    /// The active secret key in Multikey form.
    pub fn secret_multibase(&self) -> String {
        encoding::secret_multikey(self.signing_key.as_bytes())
    }

    /// Reconstruct a keyring from an exported secret Multikey.
    pub fn from_secret_multibase(multikey: &str) -> anyhow::Result<Self> {
        let secret = encoding::ed25519_secret_key(multikey)?;
        let bytes: [u8; 32] =
            secret.as_slice().try_into().map_err(|_| anyhow!("invalid secret key length"))?;
        Ok(Self {
            signing_key: SigningKey::from_bytes(&bytes),
            next_key: SigningKey::generate(&mut OsRng),
        })
    }

    /// Promote the committed key to active and generate a new successor.
    pub fn rotate(self) -> Self {
        Self { signing_key: self.next_key, next_key: SigningKey::generate(&mut OsRng) }
    }
}

impl Signer for Keyring {
    async fn try_sign(&self, msg: &[u8]) -> anyhow::Result<Vec<u8>> {
        Ok(self.signing_key.sign(msg).to_bytes().to_vec())
    }

    async fn verification_method(&self) -> anyhow::Result<String> {
        Ok(self.did_key())
    }
}

/// Stateless Ed25519 verifier backing the injected capability.
pub struct Ed25519Verifier;

impl Verifier for Ed25519Verifier {
    async fn verify(
        &self, signature: &[u8], message: &[u8], public_key: &[u8],
    ) -> anyhow::Result<bool> {
        let key: [u8; 32] =
            public_key.try_into().map_err(|_| anyhow!("invalid public key length"))?;
        let verifying_key = VerifyingKey::from_bytes(&key)?;
        let signature: [u8; 64] =
            signature.try_into().map_err(|_| anyhow!("invalid signature length"))?;
        let signature = ed25519_dalek::Signature::from_bytes(&signature);
        Ok(verifying_key.verify_strict(message, &signature).is_ok())
    }
}
