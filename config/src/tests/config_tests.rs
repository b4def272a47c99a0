// Copyright (c) Mysten Labs, Inc.
// SPDX-License-Identifier: Apache-2.0

use super::*;

#[test]
fn committee_thresholds() {
    // GIVEN a local committee of 4 (f = 1).
    let (committee, _, _) = local_committee_and_keys(0, 4);

    // THEN the derived quantities follow N = 3f+1.
    assert_eq!(committee.size(), 4);
    assert_eq!(committee.quorum_threshold(), 3);
    assert_eq!(committee.validity_threshold(), 2);

    // AND with f = 0 the quorum threshold equals N.
    let (committee, _, _) = local_committee_and_keys(0, 1);
    assert_eq!(committee.quorum_threshold(), 1);
    assert_eq!(committee.validity_threshold(), 1);
}

#[test]
fn committee_lookup() {
    let (committee, keys, _) = local_committee_and_keys(9000, 4);

    assert_eq!(committee.name(2), Some(&keys[2].public));
    assert_eq!(committee.id(&keys[3].public), Some(3));
    assert_eq!(
        committee.address(1),
        Some("127.0.0.1:9001".parse().unwrap())
    );
    assert!(committee.name(7).is_none());

    let mut addresses = committee.broadcast_addresses(0);
    addresses.sort();
    assert_eq!(addresses.len(), 3);
    assert!(!addresses.contains(&"127.0.0.1:9000".parse().unwrap()));
}

#[test]
fn committee_file_roundtrip() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join(".committee.json");
    let path = path.to_str().unwrap();

    let (committee, _, _) = local_committee_and_keys(9000, 4);
    committee.export(path).unwrap();

    let imported = Committee::import(path).unwrap();
    assert_eq!(imported.size(), 4);
    for id in 0..4 {
        assert_eq!(imported.name(id), committee.name(id));
        assert_eq!(imported.address(id), committee.address(id));
    }
}

#[test]
fn key_file_roundtrip() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join(".node-key-0.json");
    let path = path.to_str().unwrap();

    let keys = KeyPair::generate();
    keys.export(path).unwrap();

    let imported = KeyPair::import(path).unwrap();
    assert_eq!(imported.public, keys.public);
    assert_eq!(imported.private.public(), keys.public);
}

#[test]
fn threshold_key_file_roundtrip() {
    let dir = tempfile::tempdir().unwrap();
    generate_threshold_key_files(4, 3, dir.path().to_str().unwrap()).unwrap();

    let digest = crypto::Hasher::new().update(b"roundtrip").finalize();
    let mut shares = Vec::new();
    let mut pk_set = None;
    for i in 0..4 {
        let path = dir.path().join(format!(".node-ts-key-{i}.json"));
        let keys = ThresholdKeys::import(path.to_str().unwrap()).unwrap();
        assert_eq!(keys.n, 4);
        assert_eq!(keys.t, 3);
        let share = keys.to_share().unwrap();
        assert_eq!(share.index, i);
        pk_set = Some(share.pk_set().clone());
        shares.push(share.sign(&digest));
    }

    let pk_set = pk_set.unwrap();
    let combined = crypto::combine_shares(
        &pk_set,
        shares.iter().take(3).enumerate().collect::<Vec<_>>(),
    )
    .unwrap();
    assert!(crypto::verify_combined(&pk_set, &digest, &combined));
}

#[test]
fn parameters_defaults_from_partial_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join(".parameters.json");
    std::fs::write(&path, r#"{"consensus": {"protocol": 1}}"#).unwrap();

    let parameters = Parameters::import(path.to_str().unwrap()).unwrap();
    assert_eq!(parameters.pool.batch_size, 200);
    assert_eq!(parameters.pool.tx_size, 16);
    assert_eq!(parameters.consensus.sync_timeout, 500);
    assert_eq!(parameters.consensus.retry_delay, 5_000);
    assert!(!parameters.consensus.ddos);
    assert_eq!(
        Protocol::try_from(parameters.consensus.protocol).unwrap(),
        Protocol::Smvba
    );
    assert!(Protocol::try_from(9).is_err());
}
