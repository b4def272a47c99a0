// Copyright (c) Mysten Labs, Inc.
// SPDX-License-Identifier: Apache-2.0

use super::messages::{Block, ConsensusMessage, PromotePhase, Proposal, Vote};
use super::promote::Promote;
use crate::test_utils::{fixture, Fixture};
use crate::transmitter::{NetMessage, Transmitter};
use crypto::Hash as _;
use mempool::Batch;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;

struct PromoteHarness {
    promote: Promote,
    skip: Arc<AtomicBool>,
    rx_network: mpsc::Receiver<NetMessage<ConsensusMessage>>,
    rx_loopback: mpsc::Receiver<ConsensusMessage>,
}

/// A promotion owned by node 0 for its own proposal.
fn harness(fixture: &Fixture) -> PromoteHarness {
    let (tx_loopback, rx_loopback) = mpsc::channel(100);
    let (transmitter, rx_network) = Transmitter::new(fixture.committee.clone(), tx_loopback);
    let skip = Arc::new(AtomicBool::new(false));
    let promote = Promote::new(
        0,
        fixture.committee.clone(),
        fixture.service(0).clone(),
        transmitter,
        0,
        0,
        skip.clone(),
    );
    PromoteHarness {
        promote,
        skip,
        rx_network,
        rx_loopback,
    }
}

fn block() -> Block {
    Block::new(
        0,
        Batch {
            id: 0,
            txs: vec![vec![0u8; 16]],
        },
        0,
    )
}

fn drain(harness: &mut PromoteHarness) -> Vec<ConsensusMessage> {
    let mut messages = Vec::new();
    while let Ok(NetMessage(message, _)) = harness.rx_network.try_recv() {
        messages.push(message);
    }
    while let Ok(message) = harness.rx_loopback.try_recv() {
        messages.push(message);
    }
    messages
}

#[tokio::test]
async fn phases_advance_on_vote_quorums() {
    let fixture = fixture(4);
    let mut harness = harness(&fixture);
    let block = block();
    let block_hash = block.digest();

    // Phase one latches the hash and answers with our own vote.
    let proposal = Proposal::new(0, 0, PromotePhase::One, Some(block), fixture.service(0)).await;
    harness.promote.process_proposal(proposal).await;
    assert_eq!(harness.promote.block_hash(), Some(block_hash));
    let sent = drain(&mut harness);
    assert!(
        matches!(sent.as_slice(), [ConsensusMessage::Vote(v)] if v.phase == PromotePhase::One)
    );

    // A quorum of phase-one votes releases the phase-two proposal.
    for node in 0..3u32 {
        let vote =
            Vote::new(node, 0, block_hash, 0, PromotePhase::One, fixture.service(node)).await;
        harness.promote.process_vote(vote).await;
    }
    let sent = drain(&mut harness);
    assert!(sent.iter().any(
        |m| matches!(m, ConsensusMessage::Propose(p) if p.phase == PromotePhase::Two)
    ));

    // Walking phases two and three latches key then lock.
    for phase in [PromotePhase::Two, PromotePhase::Three] {
        let proposal = Proposal::new(0, 0, phase, None, fixture.service(0)).await;
        harness.promote.process_proposal(proposal).await;
        for node in 0..3u32 {
            let vote = Vote::new(node, 0, block_hash, 0, phase, fixture.service(node)).await;
            harness.promote.process_vote(vote).await;
        }
    }
    assert!(harness.promote.is_key());
    assert!(harness.promote.is_lock());
    assert!(!harness.promote.is_commit());

    // Phase four latches commit and emits Done.
    let proposal = Proposal::new(0, 0, PromotePhase::Four, None, fixture.service(0)).await;
    harness.promote.process_proposal(proposal).await;
    for node in 0..3u32 {
        let vote =
            Vote::new(node, 0, block_hash, 0, PromotePhase::Four, fixture.service(node)).await;
        harness.promote.process_vote(vote).await;
    }
    assert!(harness.promote.is_commit());
    let sent = drain(&mut harness);
    assert!(sent.iter().any(|m| matches!(m, ConsensusMessage::Done(_))));
}

#[tokio::test]
async fn skipped_epoch_suppresses_done() {
    let fixture = fixture(4);
    let mut harness = harness(&fixture);
    let block = block();
    let block_hash = block.digest();

    let proposal = Proposal::new(0, 0, PromotePhase::One, Some(block), fixture.service(0)).await;
    harness.promote.process_proposal(proposal).await;
    let proposal = Proposal::new(0, 0, PromotePhase::Four, None, fixture.service(0)).await;
    harness.promote.process_proposal(proposal).await;
    drain(&mut harness);

    harness.skip.store(true, Ordering::SeqCst);
    for node in 0..3u32 {
        let vote =
            Vote::new(node, 0, block_hash, 0, PromotePhase::Four, fixture.service(node)).await;
        harness.promote.process_vote(vote).await;
    }
    let sent = drain(&mut harness);
    assert!(!sent.iter().any(|m| matches!(m, ConsensusMessage::Done(_))));
}

#[tokio::test]
async fn early_votes_wait_for_the_block() {
    let fixture = fixture(4);
    let mut harness = harness(&fixture);
    let block = block();
    let block_hash = block.digest();

    // Votes before the proposal are queued, not counted.
    for node in 1..3u32 {
        let vote =
            Vote::new(node, 0, block_hash, 0, PromotePhase::One, fixture.service(node)).await;
        harness.promote.process_vote(vote).await;
    }
    assert!(drain(&mut harness).is_empty());

    // The proposal replays them; with our own vote the quorum fires.
    let proposal = Proposal::new(0, 0, PromotePhase::One, Some(block), fixture.service(0)).await;
    harness.promote.process_proposal(proposal).await;
    let vote = Vote::new(0, 0, block_hash, 0, PromotePhase::One, fixture.service(0)).await;
    harness.promote.process_vote(vote).await;
    let sent = drain(&mut harness);
    assert!(sent.iter().any(
        |m| matches!(m, ConsensusMessage::Propose(p) if p.phase == PromotePhase::Two)
    ));
}
