// Copyright (c) Mysten Labs, Inc.
// SPDX-License-Identifier: Apache-2.0

use config::{Committee, Epoch, NodeId};
use std::collections::{HashMap, HashSet};

use super::messages::{Done, SkipShare};
use crate::error::{ConsensusError, ConsensusResult};

/// Epoch-keyed author counters for Done and SkipShare; each fires exactly
/// once at 2f+1 distinct authors.
pub struct Aggregator {
    committee: Committee,
    done: HashMap<Epoch, AuthorSet>,
    skip: HashMap<Epoch, AuthorSet>,
}

impl Aggregator {
    pub fn new(committee: Committee) -> Self {
        Self {
            committee,
            done: HashMap::new(),
            skip: HashMap::new(),
        }
    }

    pub fn add_done(&mut self, done: &Done) -> ConsensusResult<bool> {
        self.done.entry(done.epoch).or_default().append(
            &self.committee,
            "done",
            done.epoch,
            done.author,
        )
    }

    pub fn add_skip_share(&mut self, share: &SkipShare) -> ConsensusResult<bool> {
        self.skip.entry(share.epoch).or_default().append(
            &self.committee,
            "skip-share",
            share.epoch,
            share.author,
        )
    }

    pub fn cleanup(&mut self, epoch: Epoch) {
        self.done.retain(|e, _| *e >= epoch);
        self.skip.retain(|e, _| *e >= epoch);
    }
}

#[derive(Default)]
struct AuthorSet {
    authors: HashSet<NodeId>,
}

impl AuthorSet {
    fn append(
        &mut self,
        committee: &Committee,
        kind: &'static str,
        epoch: Epoch,
        author: NodeId,
    ) -> ConsensusResult<bool> {
        if !self.authors.insert(author) {
            return Err(ConsensusError::OneMoreMessage {
                kind,
                epoch,
                round: 0,
                author,
            });
        }
        Ok(self.authors.len() == committee.quorum_threshold())
    }
}
