// Copyright (c) Mysten Labs, Inc.
// SPDX-License-Identifier: Apache-2.0

//! Cryptographic types shared by the whole code base. The rest of the
//! workspace should only refer to these aliases and wrappers, never to the
//! underlying scheme implementations directly.

use ed25519_dalek::{Signer as _, Verifier as _};
use serde::{de, Deserialize, Deserializer, Serialize, Serializer};
use sha2::{Digest as _, Sha256};
use std::fmt;

mod service;
mod threshold;

pub use service::SignatureService;
pub use threshold::{
    combine_shares, generate_threshold_keys, signature_seed, verify_combined, verify_share,
    CombinedSignature, PublicKeySet, SecretShare, SignatureShare, ThresholdKeyPair,
};

#[cfg(test)]
#[path = "tests/crypto_tests.rs"]
mod crypto_tests;

/// Length of a content digest, in bytes.
pub const DIGEST_LENGTH: usize = 32;

#[derive(Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Digest(pub [u8; DIGEST_LENGTH]);

impl Digest {
    pub fn to_vec(&self) -> Vec<u8> {
        self.0.to_vec()
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Debug for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}",
            base64::Engine::encode(&base64::engine::general_purpose::STANDARD, self.0)
        )
    }
}

impl fmt::Display for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}",
            base64::Engine::encode(&base64::engine::general_purpose::STANDARD, self.0)
                .get(0..16)
                .unwrap_or_default()
        )
    }
}

/// Anything with a stable content digest.
pub trait Hash {
    fn digest(&self) -> Digest;
}

/// Incremental SHA-256 helper used to derive message and block digests.
#[derive(Default)]
pub struct Hasher(Sha256);

impl Hasher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn update(mut self, data: impl AsRef<[u8]>) -> Self {
        self.0.update(data.as_ref());
        self
    }

    pub fn finalize(self) -> Digest {
        Digest(self.0.finalize().into())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum CryptoError {
    #[error("invalid signature")]
    InvalidSignature,

    #[error("malformed key bytes: {0}")]
    MalformedKey(String),

    #[error("failed to combine signature shares: {0}")]
    CombineFailure(String),
}

/// ED25519 public key, used as the identity of an authority and to verify
/// the signatures it produces. Encoded as hex in configuration artifacts.
#[derive(Clone, PartialEq, Eq)]
pub struct PublicKey(ed25519_dalek::VerifyingKey);

impl PartialOrd for PublicKey {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for PublicKey {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.0.as_bytes().cmp(other.0.as_bytes())
    }
}

impl std::hash::Hash for PublicKey {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.0.as_bytes().hash(state);
    }
}

impl PublicKey {
    pub fn verify(&self, digest: &Digest, signature: &Signature) -> Result<(), CryptoError> {
        self.0
            .verify(digest.as_bytes(), &signature.0)
            .map_err(|_| CryptoError::InvalidSignature)
    }

    pub fn to_bytes(&self) -> [u8; 32] {
        self.0.to_bytes()
    }

    pub fn encode(&self) -> String {
        hex::encode(self.0.to_bytes())
    }

    pub fn decode(encoded: &str) -> Result<Self, CryptoError> {
        let bytes = hex::decode(encoded).map_err(|e| CryptoError::MalformedKey(e.to_string()))?;
        let bytes: [u8; 32] = bytes
            .try_into()
            .map_err(|_| CryptoError::MalformedKey("wrong public key length".to_string()))?;
        let key = ed25519_dalek::VerifyingKey::from_bytes(&bytes)
            .map_err(|e| CryptoError::MalformedKey(e.to_string()))?;
        Ok(Self(key))
    }
}

impl Serialize for PublicKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.encode())
    }
}

impl<'de> Deserialize<'de> for PublicKey {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        Self::decode(&encoded).map_err(de::Error::custom)
    }
}

impl fmt::Debug for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.encode().get(0..16).unwrap_or_default())
    }
}

/// ED25519 secret key. Encoded as hex in the node key file.
pub struct SecretKey(ed25519_dalek::SigningKey);

impl SecretKey {
    pub fn sign(&self, digest: &Digest) -> Signature {
        Signature(self.0.sign(digest.as_bytes()))
    }

    pub fn public(&self) -> PublicKey {
        PublicKey(self.0.verifying_key())
    }

    pub fn encode(&self) -> String {
        hex::encode(self.0.to_bytes())
    }

    pub fn decode(encoded: &str) -> Result<Self, CryptoError> {
        let bytes = hex::decode(encoded).map_err(|e| CryptoError::MalformedKey(e.to_string()))?;
        let bytes: [u8; 32] = bytes
            .try_into()
            .map_err(|_| CryptoError::MalformedKey("wrong secret key length".to_string()))?;
        Ok(Self(ed25519_dalek::SigningKey::from_bytes(&bytes)))
    }
}

impl Serialize for SecretKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.encode())
    }
}

impl<'de> Deserialize<'de> for SecretKey {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        Self::decode(&encoded).map_err(de::Error::custom)
    }
}

/// Generate a fresh ED25519 keypair from the OS entropy source.
pub fn generate_keypair() -> (PublicKey, SecretKey) {
    let signing = ed25519_dalek::SigningKey::generate(&mut rand::rngs::OsRng);
    (PublicKey(signing.verifying_key()), SecretKey(signing))
}

/// ED25519 signature over a `Digest`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Signature(ed25519_dalek::Signature);

impl Default for Signature {
    /// A zeroed placeholder that verifies against nothing; overwritten by
    /// the signature service before a message leaves the node.
    fn default() -> Self {
        Self(ed25519_dalek::Signature::from_bytes(&[0u8; 64]))
    }
}

impl Signature {
    pub fn to_bytes(&self) -> [u8; 64] {
        self.0.to_bytes()
    }

    pub fn from_bytes(bytes: &[u8; 64]) -> Self {
        Self(ed25519_dalek::Signature::from_bytes(bytes))
    }

    pub fn verify(&self, public_key: &PublicKey, digest: &Digest) -> Result<(), CryptoError> {
        public_key.verify(digest, self)
    }
}
