// Copyright (c) Mysten Labs, Inc.
// SPDX-License-Identifier: Apache-2.0

use super::aggregator::{Aggregator, VoteDecision};
use super::messages::{Vote, VoteFlag};
use crate::error::ConsensusError;
use crate::test_utils::fixture;

#[tokio::test]
async fn first_yes_takes_the_fast_path() {
    let fixture = fixture(4);
    let mut aggregator = Aggregator::new(fixture.committee.clone());

    let no = Vote::new(0, 1, 0, 0, VoteFlag::No, fixture.service(0)).await;
    assert_eq!(aggregator.add_vote(&no).unwrap(), VoteDecision::None);

    let yes = Vote::new(1, 1, 0, 0, VoteFlag::Yes, fixture.service(1)).await;
    assert_eq!(aggregator.add_vote(&yes).unwrap(), VoteDecision::FastYes);

    // After the decision fired, further votes are counted but silent.
    let yes = Vote::new(2, 1, 0, 0, VoteFlag::Yes, fixture.service(2)).await;
    assert_eq!(aggregator.add_vote(&yes).unwrap(), VoteDecision::None);
}

#[tokio::test]
async fn quorum_without_yes_is_all_no() {
    let fixture = fixture(4);
    let mut aggregator = Aggregator::new(fixture.committee.clone());

    for node in 0..2u32 {
        let no = Vote::new(node, 1, 0, 0, VoteFlag::No, fixture.service(node)).await;
        assert_eq!(aggregator.add_vote(&no).unwrap(), VoteDecision::None);
    }
    let no = Vote::new(2, 1, 0, 0, VoteFlag::No, fixture.service(2)).await;
    assert_eq!(aggregator.add_vote(&no).unwrap(), VoteDecision::AllNo);

    let no = Vote::new(3, 1, 0, 0, VoteFlag::No, fixture.service(3)).await;
    assert_eq!(aggregator.add_vote(&no).unwrap(), VoteDecision::None);
}

#[tokio::test]
async fn duplicate_vote_changes_nothing() {
    let fixture = fixture(4);
    let mut aggregator = Aggregator::new(fixture.committee.clone());

    let vote = Vote::new(2, 1, 0, 0, VoteFlag::No, fixture.service(2)).await;
    assert_eq!(aggregator.add_vote(&vote).unwrap(), VoteDecision::None);
    match aggregator.add_vote(&vote) {
        Err(ConsensusError::OneMoreMessage { author: 2, .. }) => (),
        result => panic!("unexpected result {result:?}"),
    }

    // Distinct authors still drive the decision to AllNo at the quorum.
    let vote = Vote::new(0, 1, 0, 0, VoteFlag::No, fixture.service(0)).await;
    assert_eq!(aggregator.add_vote(&vote).unwrap(), VoteDecision::None);
    let vote = Vote::new(1, 1, 0, 0, VoteFlag::No, fixture.service(1)).await;
    assert_eq!(aggregator.add_vote(&vote).unwrap(), VoteDecision::AllNo);
}

#[tokio::test]
async fn rounds_aggregate_independently() {
    let fixture = fixture(4);
    let mut aggregator = Aggregator::new(fixture.committee.clone());

    let yes = Vote::new(0, 1, 0, 0, VoteFlag::Yes, fixture.service(0)).await;
    assert_eq!(aggregator.add_vote(&yes).unwrap(), VoteDecision::FastYes);

    // The same author votes again for the next external round.
    let yes = Vote::new(0, 2, 0, 1, VoteFlag::Yes, fixture.service(0)).await;
    assert_eq!(aggregator.add_vote(&yes).unwrap(), VoteDecision::FastYes);
}
