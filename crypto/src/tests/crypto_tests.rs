// Copyright (c) Mysten Labs, Inc.
// SPDX-License-Identifier: Apache-2.0

use super::*;

fn digest_of(data: &[u8]) -> Digest {
    Hasher::new().update(data).finalize()
}

#[test]
fn verify_valid_signature() {
    let (public, secret) = generate_keypair();
    let digest = digest_of(b"Hello, world!");
    let signature = secret.sign(&digest);
    assert!(signature.verify(&public, &digest).is_ok());
}

#[test]
fn verify_invalid_signature() {
    let (public, secret) = generate_keypair();
    let digest = digest_of(b"Hello, world!");
    let signature = secret.sign(&digest);

    let other = digest_of(b"Bad message!");
    assert!(signature.verify(&public, &other).is_err());
}

#[test]
fn public_key_hex_roundtrip() {
    let (public, secret) = generate_keypair();
    let decoded = PublicKey::decode(&public.encode()).unwrap();
    assert_eq!(public, decoded);

    let secret_decoded = SecretKey::decode(&secret.encode()).unwrap();
    assert_eq!(secret_decoded.public(), public);
}

#[test]
fn signature_bytes_roundtrip() {
    let (_, secret) = generate_keypair();
    let digest = digest_of(b"roundtrip");
    let signature = secret.sign(&digest);
    let recovered = Signature::from_bytes(&signature.to_bytes());
    assert_eq!(signature, recovered);
}

#[test]
fn combine_threshold_shares() {
    let (shares, pk_set) = generate_threshold_keys(4, 3);
    let digest = digest_of(b"common coin");

    let sig_shares: Vec<_> = shares.iter().map(|s| s.sign(&digest)).collect();
    for (i, share) in sig_shares.iter().enumerate() {
        assert!(verify_share(&pk_set, i, &digest, share));
    }

    let combined = combine_shares(
        &pk_set,
        sig_shares.iter().take(3).enumerate().collect::<Vec<_>>(),
    )
    .unwrap();
    assert!(verify_combined(&pk_set, &digest, &combined));
}

#[test]
fn too_few_shares_do_not_combine() {
    let (shares, pk_set) = generate_threshold_keys(4, 3);
    let digest = digest_of(b"common coin");
    let sig_shares: Vec<_> = shares.iter().map(|s| s.sign(&digest)).collect();

    assert!(combine_shares(
        &pk_set,
        sig_shares.iter().take(2).enumerate().collect::<Vec<_>>(),
    )
    .is_err());
}

#[test]
fn seed_is_independent_of_share_subset() {
    let (shares, pk_set) = generate_threshold_keys(4, 3);
    let digest = digest_of(b"seed");
    let sig_shares: Vec<_> = shares.iter().map(|s| s.sign(&digest)).collect();

    let first = combine_shares(
        &pk_set,
        (0..3).map(|i| (i, &sig_shares[i])).collect::<Vec<_>>(),
    )
    .unwrap();
    let second = combine_shares(
        &pk_set,
        (1..4).map(|i| (i, &sig_shares[i])).collect::<Vec<_>>(),
    )
    .unwrap();

    assert_eq!(signature_seed(&first), signature_seed(&second));
    assert!(verify_combined(&pk_set, &digest, &second));
}

#[test]
fn secret_share_serde_roundtrip() {
    let (shares, pk_set) = generate_threshold_keys(4, 3);
    let digest = digest_of(b"serde");

    let bytes = bincode::serialize(&shares[2]).unwrap();
    let recovered: SecretShare = bincode::deserialize(&bytes).unwrap();

    let share = recovered.sign(&digest);
    assert!(verify_share(&pk_set, 2, &digest, &share));
}

#[tokio::test]
async fn signature_service_signs_and_shares() {
    let (public, secret) = generate_keypair();
    let (shares, pk_set) = generate_threshold_keys(4, 3);
    let service = SignatureService::new(secret, shares[0].clone());

    let digest = digest_of(b"service");
    let signature = service.request_signature(digest).await;
    assert!(signature.verify(&public, &digest).is_ok());

    let share = service.request_signature_share(digest).await;
    assert!(verify_share(&pk_set, 0, &digest, &share));
}
