// Copyright (c) Mysten Labs, Inc.
// SPDX-License-Identifier: Apache-2.0

use super::aggregator::Aggregator;
use super::messages::{Done, SkipShare};
use crate::error::ConsensusError;
use crate::test_utils::fixture;

#[tokio::test]
async fn done_fires_once_at_quorum() {
    let fixture = fixture(4);
    let mut aggregator = Aggregator::new(fixture.committee.clone());

    for node in 0..2u32 {
        let done = Done::new(node, 0, fixture.service(node)).await;
        assert!(!aggregator.add_done(&done).unwrap());
    }
    let done = Done::new(2, 0, fixture.service(2)).await;
    assert!(aggregator.add_done(&done).unwrap());
    let done = Done::new(3, 0, fixture.service(3)).await;
    assert!(!aggregator.add_done(&done).unwrap());
}

#[tokio::test]
async fn done_and_skip_share_count_separately() {
    let fixture = fixture(4);
    let mut aggregator = Aggregator::new(fixture.committee.clone());

    for node in 0..3u32 {
        let done = Done::new(node, 0, fixture.service(node)).await;
        aggregator.add_done(&done).unwrap();
    }

    // Skip shares of the same epoch start from zero.
    for node in 0..2u32 {
        let share = SkipShare::new(node, 0, fixture.service(node)).await;
        assert!(!aggregator.add_skip_share(&share).unwrap());
    }
    let share = SkipShare::new(2, 0, fixture.service(2)).await;
    assert!(aggregator.add_skip_share(&share).unwrap());
}

#[tokio::test]
async fn duplicate_author_is_rejected() {
    let fixture = fixture(4);
    let mut aggregator = Aggregator::new(fixture.committee.clone());

    let done = Done::new(1, 0, fixture.service(1)).await;
    aggregator.add_done(&done).unwrap();
    match aggregator.add_done(&done) {
        Err(ConsensusError::OneMoreMessage { author: 1, .. }) => (),
        result => panic!("unexpected result {result:?}"),
    }
}
