//! # Canonical Encodings
//!
//! Every hash in a `did:webvh` log is taken over JCS (RFC 8785) canonical
//! JSON and framed as a multihash before multibase encoding. The helpers
//! here are the only place the crate touches those byte layouts.

use multibase::Base;
use multihash::Multihash;
use serde::Serialize;
use sha2::{Digest, Sha256};

use crate::{Error, Result};

/// Multicodec prefix for an Ed25519 public key in Multikey form.
pub const ED25519_PUB_PREFIX: [u8; 2] = [0xED, 0x01];

/// Multicodec prefix for an Ed25519 secret key in Multikey form.
pub const ED25519_SECRET_PREFIX: [u8; 2] = [0x80, 0x26];

// Multihash algorithm codes accepted when decoding. Hashes are always
// produced with SHA-2-256.
const SHA2_256: u64 = 0x12;
const SHA2_384: u64 = 0x20;
const SHA3_256: u64 = 0x16;
const SHA3_384: u64 = 0x15;

/// Serialize a value to its JCS canonical JSON form.
///
/// # Errors
/// Will fail if the value cannot be serialized to JSON.
pub fn canonicalize<T: Serialize>(value: &T) -> Result<String> {
    serde_json_canonicalizer::to_string(value)
        .map_err(|e| Error::Format(format!("canonicalization failed: {e}")))
}

/// SHA-2-256 digest.
#[must_use]
pub fn sha256(data: &[u8]) -> [u8; 32] {
    Sha256::digest(data).into()
}

/// Frame a SHA-2-256 digest as a multihash: varint algorithm code, varint
/// digest length, digest bytes.
///
/// # Errors
/// Will fail if the digest cannot be framed (wrong length).
pub fn multihash_sha256(digest: &[u8; 32]) -> Result<Vec<u8>> {
    let wrapped = Multihash::<64>::wrap(SHA2_256, digest)
        .map_err(|e| Error::Format(format!("multihash framing failed: {e}")))?;
    Ok(wrapped.to_bytes())
}

/// Decode a multihash, returning the algorithm code and digest.
///
/// Accepts SHA-2-256/384 and SHA-3-256/384. The declared digest length must
/// match the actual length (enforced by the varint framing).
///
/// # Errors
/// Will fail on truncated input, length mismatch, or an unsupported
/// algorithm code.
pub fn decode_multihash(bytes: &[u8]) -> Result<(u64, Vec<u8>)> {
    let decoded = Multihash::<64>::from_bytes(bytes)
        .map_err(|e| Error::Format(format!("invalid multihash: {e}")))?;
    let code = decoded.code();
    if !matches!(code, SHA2_256 | SHA2_384 | SHA3_256 | SHA3_384) {
        return Err(Error::Format(format!("unsupported multihash algorithm: 0x{code:02x}")));
    }
    Ok((code, decoded.digest().to_vec()))
}

/// Multibase-encode bytes with the base58btc (`z`) alphabet.
#[must_use]
pub fn to_base58(bytes: &[u8]) -> String {
    multibase::encode(Base::Base58Btc, bytes)
}

/// Multibase-encode bytes with the base64url-no-pad (`u`) alphabet.
#[must_use]
pub fn to_base64url(bytes: &[u8]) -> String {
    multibase::encode(Base::Base64Url, bytes)
}

/// Decode a multibase string. Only base58btc (`z`) and base64url-no-pad
/// (`u`) are accepted.
///
/// # Errors
/// Will fail on an unknown prefix, an unsupported base, or characters
/// outside the alphabet.
pub fn from_multibase(s: &str) -> Result<(Base, Vec<u8>)> {
    let (base, bytes) =
        multibase::decode(s).map_err(|e| Error::Format(format!("invalid multibase: {e}")))?;
    if !matches!(base, Base::Base58Btc | Base::Base64Url) {
        return Err(Error::Format(format!("unsupported multibase prefix: {}", s.chars().next().unwrap_or('?'))));
    }
    Ok((base, bytes))
}

/// Hash an arbitrary value: base58btc of the multihash of the SHA-2-256 of
/// the JCS canonical form.
///
/// # Errors
/// Will fail if the value cannot be canonicalized.
pub fn derive_hash<T: Serialize>(value: &T) -> Result<String> {
    let canonical = canonicalize(value)?;
    let digest = sha256(canonical.as_bytes());
    Ok(to_base58(&multihash_sha256(&digest)?))
}

/// Hash a public key for a pre-rotation commitment: base58btc of the
/// multihash of the SHA-2-256 of the key's UTF-8 bytes.
///
/// # Errors
/// Will fail if the digest cannot be framed.
pub fn derive_next_key_hash(key: &str) -> Result<String> {
    let digest = sha256(key.as_bytes());
    Ok(to_base58(&multihash_sha256(&digest)?))
}

/// Encode an Ed25519 public key as a Multikey: base58btc of
/// `0xED 0x01 || key`.
#[must_use]
pub fn multikey(public_key: &[u8; 32]) -> String {
    let mut bytes = Vec::with_capacity(34);
    bytes.extend_from_slice(&ED25519_PUB_PREFIX);
    bytes.extend_from_slice(public_key);
    to_base58(&bytes)
}

/// Encode an Ed25519 secret key as a Multikey: base58btc of
/// `0x80 0x26 || key`.
#[must_use]
pub fn secret_multikey(secret_key: &[u8]) -> String {
    let mut bytes = Vec::with_capacity(2 + secret_key.len());
    bytes.extend_from_slice(&ED25519_SECRET_PREFIX);
    bytes.extend_from_slice(secret_key);
    to_base58(&bytes)
}

/// Decode a secret Multikey into the raw Ed25519 secret key bytes.
///
/// # Errors
/// Will fail if the encoding is not base58btc or the multicodec prefix is
/// not `0x80 0x26`.
pub fn ed25519_secret_key(multikey: &str) -> Result<Vec<u8>> {
    let (base, bytes) = from_multibase(multikey)?;
    if base != Base::Base58Btc {
        return Err(Error::Crypto("secret key must be base58btc encoded".into()));
    }
    if bytes.len() <= 2 || bytes[..2] != ED25519_SECRET_PREFIX {
        return Err(Error::Crypto("secret key is not a multicodec Ed25519 key".into()));
    }
    Ok(bytes[2..].to_vec())
}

/// Decode a Multikey into the raw 32-byte Ed25519 public key.
///
/// # Errors
/// Will fail if the encoding is not base58btc, the decoded blob is not 34
/// bytes, or the multicodec prefix is not `0xED 0x01`.
pub fn ed25519_public_key(multikey: &str) -> Result<[u8; 32]> {
    let (base, bytes) = from_multibase(multikey)?;
    if base != Base::Base58Btc {
        return Err(Error::Crypto("public key must be base58btc encoded".into()));
    }
    if bytes.len() != 34 || bytes[..2] != ED25519_PUB_PREFIX {
        return Err(Error::Crypto("public key is not a multicodec Ed25519 key".into()));
    }
    let mut key = [0u8; 32];
    key.copy_from_slice(&bytes[2..]);
    Ok(key)
}
