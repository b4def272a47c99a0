// Copyright (c) Mysten Labs, Inc.
// SPDX-License-Identifier: Apache-2.0

//! One four-phase promotion, bound to (epoch, proposer). Each phase
//! gathers a quorum of votes before the proposer certifies the next;
//! passing phases two, three and four latches the monotonic key, lock
//! and commit evidence consumed by the view change.

use config::{Committee, Epoch, NodeId};
use crypto::{Digest, Hash as _, SignatureService};
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::warn;

use super::messages::{ConsensusMessage, Done, PromotePhase, Proposal, Vote};
use crate::transmitter::Transmitter;

pub struct Promote {
    name: NodeId,
    committee: Committee,
    signature_service: SignatureService,
    transmitter: Transmitter<ConsensusMessage>,
    epoch: Epoch,
    proposer: NodeId,
    /// Raised by the engine once the epoch collected enough skips; a
    /// phase-four quorum then no longer emits Done.
    skip: Arc<AtomicBool>,
    inner: Mutex<Inner>,
}

#[derive(Default)]
struct Inner {
    block_hash: Option<Digest>,
    key: bool,
    lock: bool,
    commit: bool,
    votes: HashMap<PromotePhase, HashSet<NodeId>>,
    pending_proposals: Vec<Proposal>,
    pending_votes: Vec<Vote>,
}

enum VoteOutcome {
    Counted,
    Quorum(PromotePhase),
}

impl Promote {
    pub fn new(
        name: NodeId,
        committee: Committee,
        signature_service: SignatureService,
        transmitter: Transmitter<ConsensusMessage>,
        epoch: Epoch,
        proposer: NodeId,
        skip: Arc<AtomicBool>,
    ) -> Self {
        Self {
            name,
            committee,
            signature_service,
            transmitter,
            epoch,
            proposer,
            skip,
            inner: Mutex::new(Inner::default()),
        }
    }

    pub fn block_hash(&self) -> Option<Digest> {
        self.inner.lock().block_hash
    }

    pub fn is_key(&self) -> bool {
        self.inner.lock().key
    }

    pub fn is_lock(&self) -> bool {
        self.inner.lock().lock
    }

    pub fn is_commit(&self) -> bool {
        self.inner.lock().commit
    }

    pub async fn process_proposal(&self, proposal: Proposal) {
        match proposal.phase {
            PromotePhase::One => {
                let Some(block) = &proposal.block else {
                    return;
                };
                if proposal.author != self.proposer {
                    warn!("Promotion proposal from a node that is not its proposer");
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

                self.send_vote(PromotePhase::One, block_hash).await;

                for pending in pending_proposals {
                    self.latch_and_vote(pending.phase).await;
                }
                for vote in pending_votes {
                    self.process_vote(vote).await;
                }
            }
            phase => {
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
                    self.latch_and_vote(phase).await;
                }
            }
        }
    }

    async fn latch_and_vote(&self, phase: PromotePhase) {
        let block_hash = {
            let mut inner = self.inner.lock();
            match phase {
                PromotePhase::One => (),
                PromotePhase::Two => inner.key = true,
                PromotePhase::Three => inner.lock = true,
                PromotePhase::Four => inner.commit = true,
            }
            inner.block_hash.unwrap_or_default()
        };
        self.send_vote(phase, block_hash).await;
    }

    pub async fn process_vote(&self, vote: Vote) {
        let outcome = {
            let mut inner = self.inner.lock();
            let Some(block_hash) = inner.block_hash else {
                inner.pending_votes.push(vote.clone());
                return;
            };
            if vote.block_hash != block_hash {
                warn!("Promotion vote carries a mismatching block hash");
                return;
            }
            let authors = inner.votes.entry(vote.phase).or_default();
            if !authors.insert(vote.author) {
                return;
            }
            if authors.len() == self.committee.quorum_threshold() {
                VoteOutcome::Quorum(vote.phase)
            } else {
                VoteOutcome::Counted
            }
        };

        // Only the proposer drives its own promotion forward.
        if self.name != self.proposer {
            return;
        }
        match outcome {
            VoteOutcome::Quorum(phase) => match phase.next() {
                Some(next) => {
                    let proposal = Proposal::new(
                        self.name,
                        self.epoch,
                        next,
                        None,
                        &self.signature_service,
                    )
                    .await;
                    let message = ConsensusMessage::Propose(proposal);
                    let _ = self.transmitter.send(self.name, None, message.clone()).await;
                    self.transmitter.loopback(message).await;
                }
                None => {
                    if !self.skip.load(Ordering::SeqCst) {
                        let done = Done::new(self.name, self.epoch, &self.signature_service).await;
                        let message = ConsensusMessage::Done(done);
                        let _ = self.transmitter.send(self.name, None, message.clone()).await;
                        self.transmitter.loopback(message).await;
                    }
                }
            },
            VoteOutcome::Counted => (),
        }
    }

    async fn send_vote(&self, phase: PromotePhase, block_hash: Digest) {
        let vote = Vote::new(
            self.name,
            self.proposer,
            block_hash,
            self.epoch,
            phase,
            &self.signature_service,
        )
        .await;
        let message = ConsensusMessage::Vote(vote);
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
