// Copyright (c) Mysten Labs, Inc.
// SPDX-License-Identifier: Apache-2.0

use super::aggregator::{Aggregator, DoneDecision, VoteDecision};
use super::messages::{Done, FinVote, Finish, Prevote, VoteFlag};
use crate::error::ConsensusError;
use crate::test_utils::fixture;
use crypto::Digest;

#[tokio::test]
async fn finish_threshold_fires_once() {
    let fixture = fixture(4);
    let mut aggregator = Aggregator::new(fixture.committee.clone());

    for node in 0..2u32 {
        let finish = Finish::new(node, Digest::default(), 0, 0, fixture.service(node)).await;
        assert!(!aggregator.add_finish(&finish).unwrap());
    }
    let finish = Finish::new(2, Digest::default(), 0, 0, fixture.service(2)).await;
    assert!(aggregator.add_finish(&finish).unwrap());

    // The fourth distinct author is beyond the threshold: no re-fire.
    let finish = Finish::new(3, Digest::default(), 0, 0, fixture.service(3)).await;
    assert!(!aggregator.add_finish(&finish).unwrap());
}

#[tokio::test]
async fn duplicate_author_is_one_more_message() {
    let fixture = fixture(4);
    let mut aggregator = Aggregator::new(fixture.committee.clone());

    let finish = Finish::new(2, Digest::default(), 0, 0, fixture.service(2)).await;
    assert!(!aggregator.add_finish(&finish).unwrap());

    // Same author, same slot: rejected, no state change.
    match aggregator.add_finish(&finish) {
        Err(ConsensusError::OneMoreMessage { author: 2, .. }) => (),
        result => panic!("unexpected result {result:?}"),
    }

    // The threshold still fires on the third distinct author.
    let finish = Finish::new(0, Digest::default(), 0, 0, fixture.service(0)).await;
    assert!(!aggregator.add_finish(&finish).unwrap());
    let finish = Finish::new(1, Digest::default(), 0, 0, fixture.service(1)).await;
    assert!(aggregator.add_finish(&finish).unwrap());
}

#[tokio::test]
async fn done_amplifies_then_readies() {
    let fixture = fixture(4);
    let mut aggregator = Aggregator::new(fixture.committee.clone());

    let done = Done::new(0, 0, 0, fixture.service(0)).await;
    assert_eq!(aggregator.add_done(&done).unwrap(), DoneDecision::None);
    let done = Done::new(1, 0, 0, fixture.service(1)).await;
    assert_eq!(aggregator.add_done(&done).unwrap(), DoneDecision::Amplify);
    let done = Done::new(2, 0, 0, fixture.service(2)).await;
    assert_eq!(aggregator.add_done(&done).unwrap(), DoneDecision::Ready);
    let done = Done::new(3, 0, 0, fixture.service(3)).await;
    assert_eq!(aggregator.add_done(&done).unwrap(), DoneDecision::None);
}

#[tokio::test]
async fn prevote_yes_fast_path() {
    let fixture = fixture(4);
    let mut aggregator = Aggregator::new(fixture.committee.clone());

    let no = Prevote::new(0, 1, 0, 0, VoteFlag::No, Digest::default(), fixture.service(0)).await;
    assert_eq!(aggregator.add_prevote(&no).unwrap(), VoteDecision::None);

    let yes = Prevote::new(1, 1, 0, 0, VoteFlag::Yes, Digest::default(), fixture.service(1)).await;
    assert_eq!(aggregator.add_prevote(&yes).unwrap(), VoteDecision::Yes);

    // The decision fired; further prevotes change nothing.
    let no = Prevote::new(2, 1, 0, 0, VoteFlag::No, Digest::default(), fixture.service(2)).await;
    assert_eq!(aggregator.add_prevote(&no).unwrap(), VoteDecision::None);
    let no = Prevote::new(3, 1, 0, 0, VoteFlag::No, Digest::default(), fixture.service(3)).await;
    assert_eq!(aggregator.add_prevote(&no).unwrap(), VoteDecision::None);
}

#[tokio::test]
async fn prevote_all_no() {
    let fixture = fixture(4);
    let mut aggregator = Aggregator::new(fixture.committee.clone());

    for node in 0..2u32 {
        let no =
            Prevote::new(node, 1, 0, 0, VoteFlag::No, Digest::default(), fixture.service(node))
                .await;
        assert_eq!(aggregator.add_prevote(&no).unwrap(), VoteDecision::None);
    }
    let no = Prevote::new(2, 1, 0, 0, VoteFlag::No, Digest::default(), fixture.service(2)).await;
    assert_eq!(aggregator.add_prevote(&no).unwrap(), VoteDecision::No);
}

#[tokio::test]
async fn finvote_classification() {
    let fixture = fixture(4);
    let lock = crypto::Hasher::new().update(b"lock").finalize();

    // All YES commits, carrying the locked hash.
    let mut aggregator = Aggregator::new(fixture.committee.clone());
    for node in 0..2u32 {
        let vote = FinVote::new(node, 1, 0, 0, VoteFlag::Yes, lock, fixture.service(node)).await;
        assert_eq!(
            aggregator.add_finvote(&vote).unwrap().0,
            VoteDecision::None
        );
    }
    let vote = FinVote::new(2, 1, 0, 0, VoteFlag::Yes, lock, fixture.service(2)).await;
    assert_eq!(
        aggregator.add_finvote(&vote).unwrap(),
        (VoteDecision::Commit, Some(lock))
    );

    // All NO restarts the round.
    let mut aggregator = Aggregator::new(fixture.committee.clone());
    for node in 0..2u32 {
        let vote =
            FinVote::new(node, 1, 0, 0, VoteFlag::No, Digest::default(), fixture.service(node))
                .await;
        assert_eq!(aggregator.add_finvote(&vote).unwrap().0, VoteDecision::None);
    }
    let vote = FinVote::new(2, 1, 0, 0, VoteFlag::No, Digest::default(), fixture.service(2)).await;
    assert_eq!(
        aggregator.add_finvote(&vote).unwrap(),
        (VoteDecision::No, None)
    );

    // A mix carries the lock hash of the YES vote.
    let mut aggregator = Aggregator::new(fixture.committee.clone());
    let vote = FinVote::new(0, 1, 0, 0, VoteFlag::No, Digest::default(), fixture.service(0)).await;
    assert_eq!(aggregator.add_finvote(&vote).unwrap().0, VoteDecision::None);
    let vote = FinVote::new(1, 1, 0, 0, VoteFlag::Yes, lock, fixture.service(1)).await;
    assert_eq!(aggregator.add_finvote(&vote).unwrap().0, VoteDecision::None);
    let vote = FinVote::new(2, 1, 0, 0, VoteFlag::No, Digest::default(), fixture.service(2)).await;
    assert_eq!(
        aggregator.add_finvote(&vote).unwrap(),
        (VoteDecision::Yes, Some(lock))
    );
}
