// Copyright (c) Mysten Labs, Inc.
// SPDX-License-Identifier: Apache-2.0

use config::{Committee, Epoch, NodeId, Round};
use std::collections::{HashMap, HashSet};

use super::messages::{Vote, VoteFlag};
use crate::error::{ConsensusError, ConsensusResult};

/// Input bit for the binary agreement, decided from the leader votes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum VoteDecision {
    /// First YES vote: enter the agreement biased towards the leader.
    FastYes,
    /// 2f+1 votes without a single YES.
    AllNo,
    None,
}

pub struct Aggregator {
    committee: Committee,
    votes: HashMap<Epoch, HashMap<Round, VoteAggregator>>,
}

impl Aggregator {
    pub fn new(committee: Committee) -> Self {
        Self {
            committee,
            votes: HashMap::new(),
        }
    }

    pub fn add_vote(&mut self, vote: &Vote) -> ConsensusResult<VoteDecision> {
        self.votes
            .entry(vote.epoch)
            .or_default()
            .entry(vote.round)
            .or_default()
            .append(&self.committee, vote)
    }

    pub fn cleanup(&mut self, epoch: Epoch) {
        self.votes.retain(|e, _| *e >= epoch);
    }
}

#[derive(Default)]
struct VoteAggregator {
    authors: HashSet<NodeId>,
    fired: bool,
}

impl VoteAggregator {
    fn append(&mut self, committee: &Committee, vote: &Vote) -> ConsensusResult<VoteDecision> {
        if !self.authors.insert(vote.author) {
            return Err(ConsensusError::OneMoreMessage {
                kind: "vote",
                epoch: vote.epoch,
                round: vote.round,
                author: vote.author,
            });
        }
        if !self.fired && vote.flag == VoteFlag::Yes {
            self.fired = true;
            return Ok(VoteDecision::FastYes);
        }
        if !self.fired && self.authors.len() == committee.quorum_threshold() {
            self.fired = true;
            return Ok(VoteDecision::AllNo);
        }
        Ok(VoteDecision::None)
    }
}
