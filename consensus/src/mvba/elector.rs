// Copyright (c) Mysten Labs, Inc.
// SPDX-License-Identifier: Apache-2.0

use config::{Committee, Epoch, NodeId, Round};
use crypto::{combine_shares, signature_seed, PublicKeySet, SignatureShare};
use rand::prelude::SliceRandom;
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::collections::HashMap;
use tracing::debug;

use super::messages::ElectShare;
use crate::error::{ConsensusError, ConsensusResult};

/// Per-epoch leader election: 2f+1 shares combine into a seed that drives
/// a deterministic shuffle of the committee; the leader of external round
/// r is the r-th entry of the shuffled sequence. Shares beyond the
/// threshold are dropped silently.
pub struct Elector {
    committee: Committee,
    pk_set: PublicKeySet,
    sequences: HashMap<Epoch, Vec<NodeId>>,
    aggregators: HashMap<Epoch, ElectAggregator>,
}

impl Elector {
    pub fn new(committee: Committee, pk_set: PublicKeySet) -> Self {
        Self {
            committee,
            pk_set,
            sequences: HashMap::new(),
            aggregators: HashMap::new(),
        }
    }

    pub fn leader(&self, epoch: Epoch, round: Round) -> Option<NodeId> {
        self.sequences
            .get(&epoch)
            .map(|sequence| sequence[round as usize % sequence.len()])
    }

    /// Returns true when this share completed the election for its epoch.
    pub fn add_share(&mut self, share: ElectShare) -> ConsensusResult<bool> {
        let epoch = share.epoch;
        if self.sequences.contains_key(&epoch) {
            return Ok(false);
        }
        let aggregator = self.aggregators.entry(epoch).or_default();
        let Some(seed) = aggregator.append(&self.committee, &self.pk_set, share)? else {
            return Ok(false);
        };
        debug!("Epoch {} seed {}", epoch, seed);

        let mut sequence: Vec<NodeId> = (0..self.committee.size() as NodeId).collect();
        sequence.shuffle(&mut StdRng::seed_from_u64(seed));
        self.sequences.insert(epoch, sequence);
        Ok(true)
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
