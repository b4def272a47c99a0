// Copyright (c) Mysten Labs, Inc.
// SPDX-License-Identifier: Apache-2.0

//! One two-phase provable-broadcast instance, bound to a single
//! (epoch, round, proposer) slot. Instances are processed off the engine
//! loop, so their state sits behind a mutex; votes and phase-two
//! proposals arriving before the block are queued and replayed once the
//! block hash latches.

use config::{Committee, Epoch, NodeId, Round};
use crypto::{Digest, Hash as _, SignatureService};
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};

use super::messages::{ConsensusMessage, Finish, SpbPhase, SpbProposal, SpbVote};
use crate::transmitter::Transmitter;

pub struct Spb {
    name: NodeId,
    committee: Committee,
    signature_service: SignatureService,
    transmitter: Transmitter<ConsensusMessage>,
    epoch: Epoch,
    round: Round,
    proposer: NodeId,
    inner: Mutex<Inner>,
}

#[derive(Default)]
struct Inner {
    block_hash: Option<Digest>,
    locked: bool,
    votes: HashMap<SpbPhase, HashSet<NodeId>>,
    pending_proposals: Vec<SpbProposal>,
    pending_votes: Vec<SpbVote>,
}

enum VoteOutcome {
    Counted,
    /// The vote was the 2f+1-th of its phase.
    Quorum(SpbPhase, Digest),
}

impl Spb {
    pub fn new(
        name: NodeId,
        committee: Committee,
        signature_service: SignatureService,
        transmitter: Transmitter<ConsensusMessage>,
        epoch: Epoch,
        round: Round,
        proposer: NodeId,
    ) -> Self {
        Self {
            name,
            committee,
            signature_service,
            transmitter,
            epoch,
            round,
            proposer,
            inner: Mutex::new(Inner::default()),
        }
    }

    /// Whether the second phase reached this node: the proposal is locked
    /// and eligible for a YES prevote.
    pub fn is_locked(&self) -> bool {
        self.inner.lock().locked
    }

    pub fn block_hash(&self) -> Option<Digest> {
        self.inner.lock().block_hash
    }

    pub async fn process_proposal(&self, proposal: SpbProposal) {
        match proposal.phase {
            SpbPhase::One => {
                let Some(block) = &proposal.block else {
                    return;
                };
                if block.proposer != self.proposer {
                    return;
                }
                let block_hash = block.digest();
                let (pending_proposals, pending_votes) = {
                    let mut inner = self.inner.lock();
                    if inner.block_hash.is_some() {
                        return;
                    }
                    inner.block_hash = Some(block_hash);
                    (
                        std::mem::take(&mut inner.pending_proposals),
                        std::mem::take(&mut inner.pending_votes),
                    )
                };

                self.send_vote(SpbPhase::One, block_hash).await;

                for pending in pending_proposals {
                    self.lock_and_vote(pending.phase).await;
                }
                for vote in pending_votes {
                    self.process_vote(vote).await;
                }
            }
            SpbPhase::Two => {
                let latched = {
                    let mut inner = self.inner.lock();
                    if inner.block_hash.is_none() {
                        inner.pending_proposals.push(proposal.clone());
                        false
                    } else {
                        true
                    }
                };
                if latched {
                    self.lock_and_vote(proposal.phase).await;
                }
            }
        }
    }

    /// A phase-two proposal certifies phase-one completion: latch the lock
    /// and answer with a phase-two vote.
    async fn lock_and_vote(&self, phase: SpbPhase) {
        self.inner.lock().locked = true;
        self.send_vote(phase, Digest::default()).await;
    }

    pub async fn process_vote(&self, vote: SpbVote) {
        let outcome = {
            let mut inner = self.inner.lock();
            let Some(block_hash) = inner.block_hash else {
                inner.pending_votes.push(vote.clone());
                return;
            };
            let authors = inner.votes.entry(vote.phase).or_default();
            if !authors.insert(vote.author) {
                return;
            }
            if authors.len() == self.committee.quorum_threshold() {
                VoteOutcome::Quorum(vote.phase, block_hash)
            } else {
                VoteOutcome::Counted
            }
        };

        match outcome {
            VoteOutcome::Quorum(SpbPhase::One, _) => {
                // Phase one complete: certify it with an empty phase-two
                // proposal, broadcast wide.
                let proposal = SpbProposal::new(
                    self.name,
                    None,
                    self.epoch,
                    self.round,
                    SpbPhase::Two,
                    &self.signature_service,
                )
                .await;
                let message = ConsensusMessage::SpbPropose(proposal);
                let _ = self.transmitter.send(self.name, None, message.clone()).await;
                self.transmitter.loopback(message).await;
            }
            VoteOutcome::Quorum(SpbPhase::Two, block_hash) => {
                let finish = Finish::new(
                    self.name,
                    block_hash,
                    self.epoch,
                    self.round,
                    &self.signature_service,
                )
                .await;
                let message = ConsensusMessage::Finish(finish);
                let _ = self.transmitter.send(self.name, None, message.clone()).await;
                self.transmitter.loopback(message).await;
            }
            VoteOutcome::Counted => (),
        }
    }

    async fn send_vote(&self, phase: SpbPhase, block_hash: Digest) {
        let vote = SpbVote::new(
            self.name,
            self.proposer,
            block_hash,
            self.epoch,
            self.round,
            phase,
            &self.signature_service,
        )
        .await;
        let message = ConsensusMessage::SpbVote(vote);
        if self.name == self.proposer {
            self.transmitter.loopback(message).await;
        } else {
            let _ = self
                .transmitter
                .send(self.name, Some(self.proposer), message)
                .await;
        }
    }
}
