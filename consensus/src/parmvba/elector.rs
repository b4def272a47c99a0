// Copyright (c) Mysten Labs, Inc.
// SPDX-License-Identifier: Apache-2.0

use config::{Committee, Epoch, NodeId, Round};
use crypto::{combine_shares, signature_seed, PublicKeySet, SignatureShare};
use std::collections::HashMap;
use tracing::debug;

use super::messages::ElectShare;
use crate::error::{ConsensusError, ConsensusResult};

/// Leader election per (epoch, round): 2f+1 shares combine into a seed,
/// the leader is seed mod N. Memoized; late shares are dropped silently.
pub struct Elector {
    committee: Committee,
    pk_set: PublicKeySet,
    leaders: HashMap<Epoch, HashMap<Round, NodeId>>,
    aggregators: HashMap<Epoch, HashMap<Round, ElectAggregator>>,
}

impl Elector {
    pub fn new(committee: Committee, pk_set: PublicKeySet) -> Self {
        Self {
            committee,
            pk_set,
            leaders: HashMap::new(),
            aggregators: HashMap::new(),
        }
    }

    pub fn leader(&self, epoch: Epoch, round: Round) -> Option<NodeId> {
        self.leaders.get(&epoch).and_then(|r| r.get(&round)).copied()
    }

    pub fn set_leader(&mut self, epoch: Epoch, round: Round, leader: NodeId) {
        self.leaders.entry(epoch).or_default().insert(round, leader);
    }

    pub fn add_share(&mut self, share: ElectShare) -> ConsensusResult<Option<NodeId>> {
        let (epoch, round) = (share.epoch, share.round);
        if self.leader(epoch, round).is_some() {
            return Ok(None);
        }
        let aggregator = self
            .aggregators
            .entry(epoch)
            .or_default()
            .entry(round)
            .or_default();
        let Some(seed) = aggregator.append(&self.committee, &self.pk_set, share)? else {
            return Ok(None);
        };
        let leader = (seed % self.committee.size() as u64) as NodeId;
        debug!("Epoch {} round {} seed {}", epoch, round, seed);
        self.set_leader(epoch, round, leader);
        Ok(Some(leader))
    }

    pub fn cleanup(&mut self, epoch: Epoch) {
        self.aggregators.retain(|e, _| *e >= epoch);
    }
}

#[derive(Default)]
struct ElectAggregator {
    authors: Vec<NodeId>,
    shares: Vec<SignatureShare>,
}

impl ElectAggregator {
    fn append(
        &mut self,
        committee: &Committee,
        pk_set: &PublicKeySet,
        share: ElectShare,
    ) -> ConsensusResult<Option<u64>> {
        if self.authors.contains(&share.author) {
            return Err(ConsensusError::OneMoreMessage {
                kind: "elect-share",
                epoch: share.epoch,
                round: share.round,
                author: share.author,
            });
        }
        self.authors.push(share.author);
        self.shares.push(share.share);

        if self.shares.len() == committee.quorum_threshold() {
            let combined = combine_shares(
                pk_set,
                self.authors
                    .iter()
                    .map(|a| *a as usize)
                    .zip(self.shares.iter()),
            )?;
            return Ok(Some(signature_seed(&combined)));
        }
        Ok(None)
    }
}
