// Copyright (c) Mysten Labs, Inc.
// SPDX-License-Identifier: Apache-2.0

//! (epoch, round)-keyed collection helpers; each decision fires exactly
//! once at its threshold and a repeated author is an error.

use config::{Committee, Epoch, NodeId, Round};
use std::collections::{HashMap, HashSet};

use super::messages::{Done, FinVote, Finish, Prevote, VoteFlag};
use crate::error::{ConsensusError, ConsensusResult};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DoneDecision {
    Amplify,
    Ready,
    None,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum VoteDecision {
    Yes,
    No,
    Commit,
    None,
}

pub struct Aggregator {
    committee: Committee,
    finish: HashMap<Epoch, HashMap<Round, FinishAggregator>>,
    done: HashMap<Epoch, HashMap<Round, DoneAggregator>>,
    prevote: HashMap<Epoch, HashMap<Round, PrevoteAggregator>>,
    finvote: HashMap<Epoch, HashMap<Round, FinVoteAggregator>>,
}

impl Aggregator {
    pub fn new(committee: Committee) -> Self {
        Self {
            committee,
            finish: HashMap::new(),
            done: HashMap::new(),
            prevote: HashMap::new(),
            finvote: HashMap::new(),
        }
    }

    pub fn add_finish(&mut self, finish: &Finish) -> ConsensusResult<bool> {
        self.finish
            .entry(finish.epoch)
            .or_default()
            .entry(finish.round)
            .or_default()
            .append(&self.committee, finish)
    }

    pub fn add_done(&mut self, done: &Done) -> ConsensusResult<DoneDecision> {
        self.done
            .entry(done.epoch)
            .or_default()
            .entry(done.round)
            .or_default()
            .append(&self.committee, done)
    }

    pub fn add_prevote(&mut self, prevote: &Prevote) -> ConsensusResult<VoteDecision> {
        self.prevote
            .entry(prevote.epoch)
            .or_default()
            .entry(prevote.round)
            .or_default()
            .append(&self.committee, prevote)
    }

    pub fn add_finvote(
        &mut self,
        vote: &FinVote,
    ) -> ConsensusResult<(VoteDecision, Option<crypto::Digest>)> {
        self.finvote
            .entry(vote.epoch)
            .or_default()
            .entry(vote.round)
            .or_default()
            .append(&self.committee, vote)
    }

    pub fn cleanup(&mut self, epoch: Epoch) {
        self.finish.retain(|e, _| *e >= epoch);
        self.done.retain(|e, _| *e >= epoch);
        self.prevote.retain(|e, _| *e >= epoch);
        self.finvote.retain(|e, _| *e >= epoch);
    }
}

#[derive(Default)]
struct FinishAggregator {
    authors: HashSet<NodeId>,
}

impl FinishAggregator {
    fn append(&mut self, committee: &Committee, finish: &Finish) -> ConsensusResult<bool> {
        if !self.authors.insert(finish.author) {
            return Err(ConsensusError::OneMoreMessage {
                kind: "finish",
                epoch: finish.epoch,
                round: finish.round,
                author: finish.author,
            });
        }
        Ok(self.authors.len() == committee.quorum_threshold())
    }
}

#[derive(Default)]
struct DoneAggregator {
    authors: HashSet<NodeId>,
}

impl DoneAggregator {
    fn append(&mut self, committee: &Committee, done: &Done) -> ConsensusResult<DoneDecision> {
        if !self.authors.insert(done.author) {
            return Err(ConsensusError::OneMoreMessage {
                kind: "done",
                epoch: done.epoch,
                round: done.round,
                author: done.author,
            });
        }
        if self.authors.len() == committee.validity_threshold() {
            return Ok(DoneDecision::Amplify);
        }
        if self.authors.len() == committee.quorum_threshold() {
            return Ok(DoneDecision::Ready);
        }
        Ok(DoneDecision::None)
    }
}

#[derive(Default)]
struct PrevoteAggregator {
    authors: HashSet<NodeId>,
    yes: usize,
    no: usize,
    fired: bool,
}

impl PrevoteAggregator {
    fn append(&mut self, committee: &Committee, vote: &Prevote) -> ConsensusResult<VoteDecision> {
        if !self.authors.insert(vote.author) {
            return Err(ConsensusError::OneMoreMessage {
                kind: "prevote",
                epoch: vote.epoch,
                round: vote.round,
                author: vote.author,
            });
        }
        match vote.flag {
            VoteFlag::Yes => self.yes += 1,
            VoteFlag::No => self.no += 1,
        }
        if self.fired {
            return Ok(VoteDecision::None);
        }
        if self.yes > 0 {
            self.fired = true;
            return Ok(VoteDecision::Yes);
        }
        if self.no == committee.quorum_threshold() {
            self.fired = true;
            return Ok(VoteDecision::No);
        }
        Ok(VoteDecision::None)
    }
}

#[derive(Default)]
struct FinVoteAggregator {
    authors: HashSet<NodeId>,
    yes: usize,
    no: usize,
    yes_hash: Option<crypto::Digest>,
}

impl FinVoteAggregator {
    fn append(
        &mut self,
        committee: &Committee,
        vote: &FinVote,
    ) -> ConsensusResult<(VoteDecision, Option<crypto::Digest>)> {
        if !self.authors.insert(vote.author) {
            return Err(ConsensusError::OneMoreMessage {
                kind: "fin-vote",
                epoch: vote.epoch,
                round: vote.round,
                author: vote.author,
            });
        }
        match vote.flag {
            VoteFlag::Yes => {
                self.yes += 1;
                self.yes_hash.get_or_insert(vote.block_hash);
            }
            VoteFlag::No => self.no += 1,
        }
        let threshold = committee.quorum_threshold();
        if self.yes + self.no == threshold {
            if self.yes == threshold {
                return Ok((VoteDecision::Commit, self.yes_hash));
            }
            if self.no == threshold {
                return Ok((VoteDecision::No, None));
            }
            return Ok((VoteDecision::Yes, self.yes_hash));
        }
        Ok((VoteDecision::None, None))
    }
}
