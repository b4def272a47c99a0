// Copyright (c) Mysten Labs, Inc.
// SPDX-License-Identifier: Apache-2.0

use config::{Committee, Epoch, NodeId};
use crypto::{combine_shares, signature_seed, PublicKeySet, SignatureShare};
use std::collections::HashMap;
use tracing::debug;

use super::messages::ElectShare;
use crate::error::{ConsensusError, ConsensusResult};

/// One leader per epoch, drawn as seed mod N from the combined shares.
pub struct Elector {
    committee: Committee,
    pk_set: PublicKeySet,
    leaders: HashMap<Epoch, NodeId>,
    aggregators: HashMap<Epoch, ElectAggregator>,
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

    pub fn leader(&self, epoch: Epoch) -> Option<NodeId> {
        self.leaders.get(&epoch).copied()
    }

    pub fn set_leader(&mut self, epoch: Epoch, leader: NodeId) {
        self.leaders.insert(epoch, leader);
    }

    pub fn add_share(&mut self, share: ElectShare) -> ConsensusResult<Option<NodeId>> {
        let epoch = share.epoch;
        if self.leaders.contains_key(&epoch) {
            return Ok(None);
        }
        let aggregator = self.aggregators.entry(epoch).or_default();
        let Some(seed) = aggregator.append(&self.committee, &self.pk_set, share)? else {
            return Ok(None);
        };
        let leader = (seed % self.committee.size() as u64) as NodeId;
        debug!("Epoch {} seed {}", epoch, seed);
        self.set_leader(epoch, leader);
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
                round: 0,
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
