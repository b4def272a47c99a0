// Copyright (c) Mysten Labs, Inc.
// SPDX-License-Identifier: Apache-2.0

//! One two-tag consistent-broadcast instance, bound to (epoch, proposer).
//! The data tag carries the proposer's block, the commit tag its
//! bit-vector commitment. Readies and finals arriving before the matching
//! payload wait in queues; completion of either tag is reported to the
//! engine exactly once through the feedback channel.

use config::{Committee, Epoch, NodeId};
use crypto::{Digest, Hash as _, SignatureService};
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use tokio::sync::mpsc;

use super::messages::{CbcTag, Commitment, ConsensusMessage, Final, Proposal, Ready};
use crate::transmitter::Transmitter;

/// Completion event of one (epoch, proposer, tag) broadcast.
#[derive(Debug)]
pub struct CbcFeedback {
    pub epoch: Epoch,
    pub proposer: NodeId,
    pub tag: CbcTag,
}

pub struct Cbc {
    name: NodeId,
    committee: Committee,
    signature_service: SignatureService,
    transmitter: Transmitter<ConsensusMessage>,
    epoch: Epoch,
    proposer: NodeId,
    tx_feedback: mpsc::Sender<CbcFeedback>,
    inner: Mutex<Inner>,
}

#[derive(Default)]
struct Inner {
    block_hash: Option<Digest>,
    commitment: Option<Vec<bool>>,
    readies: HashMap<CbcTag, HashSet<NodeId>>,
    finalized: HashSet<CbcTag>,
    pending_readies: Vec<Ready>,
    pending_finals: Vec<Final>,
}

impl Inner {
    fn has_payload(&self, tag: CbcTag) -> bool {
        match tag {
            CbcTag::Data => self.block_hash.is_some(),
            CbcTag::Commit => self.commitment.is_some(),
        }
    }
}

impl Cbc {
    pub fn new(
        name: NodeId,
        committee: Committee,
        signature_service: SignatureService,
        transmitter: Transmitter<ConsensusMessage>,
        epoch: Epoch,
        proposer: NodeId,
        tx_feedback: mpsc::Sender<CbcFeedback>,
    ) -> Self {
        Self {
            name,
            committee,
            signature_service,
            transmitter,
            epoch,
            proposer,
            tx_feedback,
            inner: Mutex::new(Inner::default()),
        }
    }

    pub fn block_hash(&self) -> Option<Digest> {
        self.inner.lock().block_hash
    }

    pub async fn process_proposal(&self, proposal: Proposal) {
        if proposal.author != self.proposer {
            return;
        }
        let block_hash = proposal.block.digest();
        let drained = {
            let mut inner = self.inner.lock();
            if inner.block_hash.is_some() {
                return;
            }
            inner.block_hash = Some(block_hash);
            self.take_pending(&mut inner)
        };
        self.acknowledge(CbcTag::Data).await;
        self.replay(drained).await;
    }

    pub async fn process_commitment(&self, commitment: Commitment) {
        if commitment.author != self.proposer {
            return;
        }
        let drained = {
            let mut inner = self.inner.lock();
            if inner.commitment.is_some() {
                return;
            }
            inner.commitment = Some(commitment.commitment);
            self.take_pending(&mut inner)
        };
        self.acknowledge(CbcTag::Commit).await;
        self.replay(drained).await;
    }

    pub async fn process_ready(&self, ready: Ready) {
        let quorum = {
            let mut inner = self.inner.lock();
            if !inner.has_payload(ready.tag) {
                inner.pending_readies.push(ready.clone());
                return;
            }
            let authors = inner.readies.entry(ready.tag).or_default();
            if !authors.insert(ready.author) {
                return;
            }
            authors.len() == self.committee.quorum_threshold()
        };
        if quorum {
            let message = ConsensusMessage::Final(
                Final::new(self.name, self.epoch, ready.tag, &self.signature_service).await,
            );
            let _ = self.transmitter.send(self.name, None, message.clone()).await;
            self.transmitter.loopback(message).await;
        }
    }

    pub async fn process_final(&self, message: Final) {
        let first = {
            let mut inner = self.inner.lock();
            if !inner.has_payload(message.tag) {
                inner.pending_finals.push(message.clone());
                return;
            }
            inner.finalized.insert(message.tag)
        };
        if first {
            let _ = self
                .tx_feedback
                .send(CbcFeedback {
                    epoch: self.epoch,
                    proposer: self.proposer,
                    tag: message.tag,
                })
                .await;
        }
    }

    fn take_pending(&self, inner: &mut Inner) -> (Vec<Ready>, Vec<Final>) {
        (
            std::mem::take(&mut inner.pending_readies),
            std::mem::take(&mut inner.pending_finals),
        )
    }

    async fn replay(&self, (readies, finals): (Vec<Ready>, Vec<Final>)) {
        for ready in readies {
            self.process_ready(ready).await;
        }
        for message in finals {
            self.process_final(message).await;
        }
    }

    async fn acknowledge(&self, tag: CbcTag) {
        let ready = Ready::new(
            self.name,
            self.proposer,
            self.epoch,
            tag,
            &self.signature_service,
        )
        .await;
        let message = ConsensusMessage::Ready(ready);
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
