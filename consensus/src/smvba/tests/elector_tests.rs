// Copyright (c) Mysten Labs, Inc.
// SPDX-License-Identifier: Apache-2.0

use super::elector::Elector;
use super::messages::ElectShare;
use crate::error::ConsensusError;
use crate::test_utils::fixture;

#[tokio::test]
async fn leader_at_exactly_quorum_shares() {
    let fixture = fixture(4);
    let mut elector = Elector::new(fixture.committee.clone(), fixture.pk_set.clone());

    // Below the threshold: no seed.
    for node in 0..2u32 {
        let share = ElectShare::new(node, 0, 0, fixture.service(node)).await;
        assert!(elector.add_share(share).unwrap().is_none());
        assert!(elector.leader(0, 0).is_none());
    }

    // At exactly 2f+1 shares the seed is deterministic.
    let share = ElectShare::new(2, 0, 0, fixture.service(2)).await;
    let leader = elector.add_share(share).unwrap().expect("leader expected");
    assert!((leader as usize) < fixture.committee.size());
    assert_eq!(elector.leader(0, 0), Some(leader));

    // Beyond the threshold: no additional effect.
    let share = ElectShare::new(3, 0, 0, fixture.service(3)).await;
    assert!(elector.add_share(share).unwrap().is_none());
    assert_eq!(elector.leader(0, 0), Some(leader));
}

#[tokio::test]
async fn leader_is_independent_of_share_order() {
    let fixture = fixture(4);

    let mut shares = Vec::new();
    for node in 0..4u32 {
        shares.push(ElectShare::new(node, 3, 1, fixture.service(node)).await);
    }

    let mut forward = Elector::new(fixture.committee.clone(), fixture.pk_set.clone());
    let mut leader_forward = None;
    for share in shares.iter().take(3).cloned() {
        if let Some(leader) = forward.add_share(share).unwrap() {
            leader_forward = Some(leader);
        }
    }

    let mut backward = Elector::new(fixture.committee.clone(), fixture.pk_set.clone());
    let mut leader_backward = None;
    for share in shares.iter().skip(1).rev().cloned() {
        if let Some(leader) = backward.add_share(share).unwrap() {
            leader_backward = Some(leader);
        }
    }

    // Different 2f+1 subsets combine to the same seed, hence leader.
    assert_eq!(leader_forward.unwrap(), leader_backward.unwrap());
}

#[tokio::test]
async fn duplicate_share_is_rejected() {
    let fixture = fixture(4);
    let mut elector = Elector::new(fixture.committee.clone(), fixture.pk_set.clone());

    let share = ElectShare::new(1, 0, 0, fixture.service(1)).await;
    assert!(elector.add_share(share.clone()).unwrap().is_none());
    match elector.add_share(share) {
        Err(ConsensusError::OneMoreMessage { author: 1, .. }) => (),
        result => panic!("unexpected result {result:?}"),
    }
}
