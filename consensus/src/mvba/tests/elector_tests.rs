// Copyright (c) Mysten Labs, Inc.
// SPDX-License-Identifier: Apache-2.0

use super::elector::Elector;
use super::messages::ElectShare;
use crate::error::ConsensusError;
use crate::test_utils::fixture;

#[tokio::test]
async fn sequence_ready_at_quorum() {
    let fixture = fixture(4);
    let mut elector = Elector::new(fixture.committee.clone(), fixture.pk_set.clone());

    for node in 0..2u32 {
        let share = ElectShare::new(node, 0, fixture.service(node)).await;
        assert!(!elector.add_share(share).unwrap());
        assert!(elector.leader(0, 0).is_none());
    }

    let share = ElectShare::new(2, 0, fixture.service(2)).await;
    assert!(elector.add_share(share).unwrap());
    let leader = elector.leader(0, 0).unwrap();
    assert!((leader as usize) < fixture.committee.size());

    // Memoized: repeated queries agree, extra shares are no-ops.
    assert_eq!(elector.leader(0, 0), Some(leader));
    let share = ElectShare::new(3, 0, fixture.service(3)).await;
    assert!(!elector.add_share(share).unwrap());
    assert_eq!(elector.leader(0, 0), Some(leader));
}

#[tokio::test]
async fn sequence_is_a_permutation() {
    let fixture = fixture(4);
    let mut elector = Elector::new(fixture.committee.clone(), fixture.pk_set.clone());

    for node in 0..3u32 {
        let share = ElectShare::new(node, 0, fixture.service(node)).await;
        elector.add_share(share).unwrap();
    }

    // The first N rounds cover every authority exactly once.
    let mut leaders: Vec<_> = (0..4u64).map(|r| elector.leader(0, r).unwrap()).collect();
    leaders.sort_unstable();
    assert_eq!(leaders, vec![0, 1, 2, 3]);

    // The sequence wraps around beyond N rounds.
    assert_eq!(elector.leader(0, 4), elector.leader(0, 0));
}

#[tokio::test]
async fn independent_electors_agree() {
    let fixture = fixture(4);

    let mut shares = Vec::new();
    for node in 0..4u32 {
        shares.push(ElectShare::new(node, 0, fixture.service(node)).await);
    }

    let mut first = Elector::new(fixture.committee.clone(), fixture.pk_set.clone());
    for share in shares.iter().take(3).cloned() {
        first.add_share(share).unwrap();
    }

    let mut second = Elector::new(fixture.committee.clone(), fixture.pk_set.clone());
    for share in shares.iter().skip(1).cloned() {
        second.add_share(share).unwrap();
    }

    for round in 0..4u64 {
        assert_eq!(first.leader(0, round), second.leader(0, round));
    }
}

#[tokio::test]
async fn duplicate_share_is_rejected() {
    let fixture = fixture(4);
    let mut elector = Elector::new(fixture.committee.clone(), fixture.pk_set.clone());

    let share = ElectShare::new(1, 0, fixture.service(1)).await;
    elector.add_share(share.clone()).unwrap();
    match elector.add_share(share) {
        Err(ConsensusError::OneMoreMessage { author: 1, .. }) => (),
        result => panic!("unexpected result {result:?}"),
    }
}
