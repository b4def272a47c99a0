// Copyright (c) Mysten Labs, Inc.
// SPDX-License-Identifier: Apache-2.0

//! Threshold-BLS machinery backing the common coin and leader election.
//! A committee of N nodes holds one secret key share each; any T distinct
//! signature shares over the same digest combine into a unique aggregate
//! signature that verifies against the public key set.

use serde::{Deserialize, Serialize};
use threshold_crypto::SecretKeySet;

use crate::{CryptoError, Digest};

pub use threshold_crypto::{PublicKeySet, SignatureShare};

/// The aggregate produced by combining T shares. Deterministic for a given
/// (key set, digest), whoever combines it.
pub type CombinedSignature = threshold_crypto::Signature;

/// One node's slice of the committee threshold key, together with the
/// public material every node holds.
#[derive(Clone, Serialize, Deserialize)]
pub struct SecretShare {
    /// Index of this share in the key set (the node id).
    pub index: usize,
    /// Number of shares in the committee.
    pub n: usize,
    /// Shares required to combine.
    pub t: usize,
    /// The secret share itself.
    share: threshold_crypto::serde_impl::SerdeSecret<threshold_crypto::SecretKeyShare>,
    /// Commitments of the secret polynomial.
    pk_set: PublicKeySet,
}

impl SecretShare {
    pub fn new(
        index: usize,
        n: usize,
        t: usize,
        share: threshold_crypto::SecretKeyShare,
        pk_set: PublicKeySet,
    ) -> Self {
        Self {
            index,
            n,
            t,
            share: threshold_crypto::serde_impl::SerdeSecret(share),
            pk_set,
        }
    }

    pub fn sign(&self, digest: &Digest) -> SignatureShare {
        self.share.0.sign(digest.as_bytes())
    }

    pub fn pk_set(&self) -> &PublicKeySet {
        &self.pk_set
    }

    /// Encode the secret and public halves for the on-disk key file:
    /// (indexed secret share, public key set), both bincode + base64.
    pub fn encode_parts(&self) -> Result<(String, String), CryptoError> {
        let share = bincode::serialize(&(self.index, &self.share))
            .map_err(|e| CryptoError::MalformedKey(e.to_string()))?;
        let pk_set = bincode::serialize(&self.pk_set)
            .map_err(|e| CryptoError::MalformedKey(e.to_string()))?;
        let engine = &base64::engine::general_purpose::STANDARD;
        Ok((
            base64::Engine::encode(engine, share),
            base64::Engine::encode(engine, pk_set),
        ))
    }

    pub fn from_parts(
        share: &str,
        pk_set: &str,
        n: usize,
        t: usize,
    ) -> Result<Self, CryptoError> {
        let engine = &base64::engine::general_purpose::STANDARD;
        let share_bytes = base64::Engine::decode(engine, share)
            .map_err(|e| CryptoError::MalformedKey(e.to_string()))?;
        let pk_set_bytes = base64::Engine::decode(engine, pk_set)
            .map_err(|e| CryptoError::MalformedKey(e.to_string()))?;
        let (index, share): (
            usize,
            threshold_crypto::serde_impl::SerdeSecret<threshold_crypto::SecretKeyShare>,
        ) = bincode::deserialize(&share_bytes)
            .map_err(|e| CryptoError::MalformedKey(e.to_string()))?;
        let pk_set: PublicKeySet = bincode::deserialize(&pk_set_bytes)
            .map_err(|e| CryptoError::MalformedKey(e.to_string()))?;
        Ok(Self {
            index,
            n,
            t,
            share,
            pk_set,
        })
    }
}

/// Full set of threshold keys for a fresh committee, one `SecretShare` per
/// node. `t` is the number of shares required to combine (2f+1 in BFT use).
pub type ThresholdKeyPair = (Vec<SecretShare>, PublicKeySet);

pub fn generate_threshold_keys(n: usize, t: usize) -> ThresholdKeyPair {
    assert!(t >= 1 && t <= n, "threshold must be in [1, n]");
    let mut rng = rand07::rngs::OsRng;
    let sk_set = SecretKeySet::random(t - 1, &mut rng);
    let pk_set = sk_set.public_keys();
    let shares = (0..n)
        .map(|i| SecretShare::new(i, n, t, sk_set.secret_key_share(i), pk_set.clone()))
        .collect();
    (shares, pk_set)
}

/// Verify one signature share against the author's slice of the public
/// polynomial. Purely local, no committee lookup involved.
pub fn verify_share(
    pk_set: &PublicKeySet,
    index: usize,
    digest: &Digest,
    share: &SignatureShare,
) -> bool {
    pk_set
        .public_key_share(index)
        .verify(share, digest.as_bytes())
}

/// Combine shares into the aggregate signature. Callers pass exactly the
/// threshold number of verified shares, keyed by author index.
pub fn combine_shares<'a, I>(
    pk_set: &PublicKeySet,
    shares: I,
) -> Result<CombinedSignature, CryptoError>
where
    I: IntoIterator<Item = (usize, &'a SignatureShare)>,
{
    pk_set
        .combine_signatures(shares)
        .map_err(|e| CryptoError::CombineFailure(e.to_string()))
}

/// Check an aggregate signature against the committee public key.
pub fn verify_combined(pk_set: &PublicKeySet, digest: &Digest, sig: &CombinedSignature) -> bool {
    pk_set.public_key().verify(sig, digest.as_bytes())
}

/// Derive a common random seed from an aggregate signature.
pub fn signature_seed(sig: &CombinedSignature) -> u64 {
    let bytes = sig.to_bytes();
    let mut seed = [0u8; 8];
    seed.copy_from_slice(&bytes[..8]);
    u64::from_be_bytes(seed)
}
