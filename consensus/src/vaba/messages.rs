// Copyright (c) Mysten Labs, Inc.
// SPDX-License-Identifier: Apache-2.0

use config::{Committee, Epoch, NodeId};
use crypto::{
    verify_share, Digest, Hash, Hasher, PublicKeySet, Signature, SignatureService, SignatureShare,
};
use mempool::Batch;
use serde::{Deserialize, Serialize};

use crate::error::{ConsensusError, ConsensusResult};

const BLOCK_TAG: u8 = 0;
const PROPOSAL_TAG: u8 = 1;
const VOTE_TAG: u8 = 2;
const DONE_TAG: u8 = 3;
const SKIP_SHARE_TAG: u8 = 4;
const SKIP_TAG: u8 = 5;
const ELECT_TAG: u8 = 6;
const VIEW_CHANGE_TAG: u8 = 7;
const HALT_TAG: u8 = 8;

/// The four sequential phases of a promotion. Phase two yields the key
/// evidence, three the lock, four the commit.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum PromotePhase {
    One,
    Two,
    Three,
    Four,
}

impl PromotePhase {
    pub fn next(self) -> Option<Self> {
        match self {
            Self::One => Some(Self::Two),
            Self::Two => Some(Self::Three),
            Self::Three => Some(Self::Four),
            Self::Four => None,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Block {
    pub proposer: NodeId,
    pub batch: Batch,
    pub epoch: Epoch,
}

impl Block {
    pub fn new(proposer: NodeId, batch: Batch, epoch: Epoch) -> Self {
        Self {
            proposer,
            batch,
            epoch,
        }
    }

    pub fn encode(&self) -> ConsensusResult<Vec<u8>> {
        Ok(bincode::serialize(self)?)
    }

    pub fn decode(data: &[u8]) -> ConsensusResult<Self> {
        Ok(bincode::deserialize(data)?)
    }
}

impl Hash for Block {
    fn digest(&self) -> Digest {
        Hasher::new()
            .update([BLOCK_TAG])
            .update(self.proposer.to_le_bytes())
            .update(self.epoch.to_le_bytes())
            .update(self.batch.id.to_le_bytes())
            .finalize()
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Proposal {
    pub author: NodeId,
    pub epoch: Epoch,
    pub phase: PromotePhase,
    /// Present in phase one only; later phases certify the previous one.
    pub block: Option<Block>,
    pub signature: Signature,
}

impl Proposal {
    pub async fn new(
        author: NodeId,
        epoch: Epoch,
        phase: PromotePhase,
        block: Option<Block>,
        signature_service: &SignatureService,
    ) -> Self {
        let mut proposal = Self {
            author,
            epoch,
            phase,
            block,
            signature: Signature::default(),
        };
        proposal.signature = signature_service.request_signature(proposal.digest()).await;
        proposal
    }

    pub fn verify(&self, committee: &Committee) -> ConsensusResult<()> {
        verify_ed25519(
            "proposal",
            committee,
            self.author,
            self.epoch,
            &self.digest(),
            &self.signature,
        )
    }
}

impl Hash for Proposal {
    fn digest(&self) -> Digest {
        let mut hasher = Hasher::new()
            .update([PROPOSAL_TAG])
            .update(self.author.to_le_bytes())
            .update(self.epoch.to_le_bytes())
            .update([self.phase as u8]);
        if let Some(block) = &self.block {
            hasher = hasher.update(block.digest().as_bytes());
        }
        hasher.finalize()
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Vote {
    pub author: NodeId,
    pub proposer: NodeId,
    pub block_hash: Digest,
    pub epoch: Epoch,
    pub phase: PromotePhase,
    pub signature: Signature,
}

impl Vote {
    pub async fn new(
        author: NodeId,
        proposer: NodeId,
        block_hash: Digest,
        epoch: Epoch,
        phase: PromotePhase,
        signature_service: &SignatureService,
    ) -> Self {
        let mut vote = Self {
            author,
            proposer,
            block_hash,
            epoch,
            phase,
            signature: Signature::default(),
        };
        vote.signature = signature_service.request_signature(vote.digest()).await;
        vote
    }

    pub fn verify(&self, committee: &Committee) -> ConsensusResult<()> {
        verify_ed25519(
            "vote",
            committee,
            self.author,
            self.epoch,
            &self.digest(),
            &self.signature,
        )
    }
}

impl Hash for Vote {
    fn digest(&self) -> Digest {
        Hasher::new()
            .update([VOTE_TAG])
            .update(self.author.to_le_bytes())
            .update(self.proposer.to_le_bytes())
            .update(self.epoch.to_le_bytes())
            .update([self.phase as u8])
            .update(self.block_hash.as_bytes())
            .finalize()
    }
}

/// Emitted after a phase-four quorum: the author's promotion completed.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Done {
    pub author: NodeId,
    pub epoch: Epoch,
    pub signature: Signature,
}

impl Done {
    pub async fn new(author: NodeId, epoch: Epoch, signature_service: &SignatureService) -> Self {
        let mut done = Self {
            author,
            epoch,
            signature: Signature::default(),
        };
        done.signature = signature_service.request_signature(done.digest()).await;
        done
    }

    pub fn verify(&self, committee: &Committee) -> ConsensusResult<()> {
        verify_ed25519(
            "done",
            committee,
            self.author,
            self.epoch,
            &self.digest(),
            &self.signature,
        )
    }
}

impl Hash for Done {
    fn digest(&self) -> Digest {
        Hasher::new()
            .update([DONE_TAG])
            .update(self.author.to_le_bytes())
            .update(self.epoch.to_le_bytes())
            .finalize()
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SkipShare {
    pub author: NodeId,
    pub epoch: Epoch,
    pub signature: Signature,
}

impl SkipShare {
    pub async fn new(author: NodeId, epoch: Epoch, signature_service: &SignatureService) -> Self {
        let mut share = Self {
            author,
            epoch,
            signature: Signature::default(),
        };
        share.signature = signature_service.request_signature(share.digest()).await;
        share
    }

    pub fn verify(&self, committee: &Committee) -> ConsensusResult<()> {
        verify_ed25519(
            "skip-share",
            committee,
            self.author,
            self.epoch,
            &self.digest(),
            &self.signature,
        )
    }
}

impl Hash for SkipShare {
    fn digest(&self) -> Digest {
        Hasher::new()
            .update([SKIP_SHARE_TAG])
            .update(self.author.to_le_bytes())
            .update(self.epoch.to_le_bytes())
            .finalize()
    }
}

/// Enough promotions completed: stop promoting and elect.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Skip {
    pub author: NodeId,
    pub epoch: Epoch,
    pub signature: Signature,
}

impl Skip {
    pub async fn new(author: NodeId, epoch: Epoch, signature_service: &SignatureService) -> Self {
        let mut skip = Self {
            author,
            epoch,
            signature: Signature::default(),
        };
        skip.signature = signature_service.request_signature(skip.digest()).await;
        skip
    }

    pub fn verify(&self, committee: &Committee) -> ConsensusResult<()> {
        verify_ed25519(
            "skip",
            committee,
            self.author,
            self.epoch,
            &self.digest(),
            &self.signature,
        )
    }
}

impl Hash for Skip {
    fn digest(&self) -> Digest {
        Hasher::new()
            .update([SKIP_TAG])
            .update(self.author.to_le_bytes())
            .update(self.epoch.to_le_bytes())
            .finalize()
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ElectShare {
    pub author: NodeId,
    pub epoch: Epoch,
    pub share: SignatureShare,
}

impl ElectShare {
    pub async fn new(author: NodeId, epoch: Epoch, signature_service: &SignatureService) -> Self {
        let digest = Self::elect_digest(epoch);
        let share = signature_service.request_signature_share(digest).await;
        Self {
            author,
            epoch,
            share,
        }
    }

    pub fn elect_digest(epoch: Epoch) -> Digest {
        Hasher::new()
            .update([ELECT_TAG])
            .update(epoch.to_le_bytes())
            .finalize()
    }

    pub fn verify(&self, committee: &Committee, pk_set: &PublicKeySet) -> ConsensusResult<()> {
        committee
            .name(self.author)
            .ok_or(ConsensusError::UnknownAuthority(self.author))?;
        if !verify_share(pk_set, self.author as usize, &self.digest(), &self.share) {
            return Err(ConsensusError::InvalidSignature {
                kind: "elect-share",
                epoch: self.epoch,
                author: self.author,
            });
        }
        Ok(())
    }
}

impl Hash for ElectShare {
    fn digest(&self) -> Digest {
        Self::elect_digest(self.epoch)
    }
}

/// The author's view of the elected leader's promotion: how far it got
/// (key/lock/commit) and under which block hash.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ViewChange {
    pub author: NodeId,
    pub leader: NodeId,
    pub epoch: Epoch,
    pub block_hash: Option<Digest>,
    pub is_commit: bool,
    pub is_lock: bool,
    pub is_key: bool,
    pub signature: Signature,
}

impl ViewChange {
    #[allow(clippy::too_many_arguments)]
    pub async fn new(
        author: NodeId,
        leader: NodeId,
        epoch: Epoch,
        block_hash: Option<Digest>,
        is_commit: bool,
        is_lock: bool,
        is_key: bool,
        signature_service: &SignatureService,
    ) -> Self {
        let mut message = Self {
            author,
            leader,
            epoch,
            block_hash,
            is_commit,
            is_lock,
            is_key,
            signature: Signature::default(),
        };
        message.signature = signature_service.request_signature(message.digest()).await;
        message
    }

    pub fn verify(&self, committee: &Committee) -> ConsensusResult<()> {
        verify_ed25519(
            "view-change",
            committee,
            self.author,
            self.epoch,
            &self.digest(),
            &self.signature,
        )
    }
}

impl Hash for ViewChange {
    fn digest(&self) -> Digest {
        let mut hasher = Hasher::new()
            .update([VIEW_CHANGE_TAG])
            .update(self.author.to_le_bytes())
            .update(self.leader.to_le_bytes())
            .update(self.epoch.to_le_bytes())
            .update([
                self.is_commit as u8,
                self.is_lock as u8,
                self.is_key as u8,
            ]);
        if let Some(block_hash) = &self.block_hash {
            hasher = hasher.update(block_hash.as_bytes());
        }
        hasher.finalize()
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Halt {
    pub author: NodeId,
    pub leader: NodeId,
    pub epoch: Epoch,
    pub block_hash: Digest,
    pub signature: Signature,
}

impl Halt {
    pub async fn new(
        author: NodeId,
        leader: NodeId,
        block_hash: Digest,
        epoch: Epoch,
        signature_service: &SignatureService,
    ) -> Self {
        let mut halt = Self {
            author,
            leader,
            epoch,
            block_hash,
            signature: Signature::default(),
        };
        halt.signature = signature_service.request_signature(halt.digest()).await;
        halt
    }

    pub fn verify(&self, committee: &Committee) -> ConsensusResult<()> {
        verify_ed25519(
            "halt",
            committee,
            self.author,
            self.epoch,
            &self.digest(),
            &self.signature,
        )
    }
}

impl Hash for Halt {
    fn digest(&self) -> Digest {
        Hasher::new()
            .update([HALT_TAG])
            .update(self.author.to_le_bytes())
            .update(self.leader.to_le_bytes())
            .update(self.epoch.to_le_bytes())
            .update(self.block_hash.as_bytes())
            .finalize()
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub enum ConsensusMessage {
    Propose(Proposal),
    Vote(Vote),
    Done(Done),
    SkipShare(SkipShare),
    Skip(Skip),
    ElectShare(ElectShare),
    ViewChange(ViewChange),
    Halt(Halt),
}

impl ConsensusMessage {
    pub fn verify(&self, committee: &Committee, pk_set: &PublicKeySet) -> ConsensusResult<()> {
        match self {
            Self::Propose(m) => m.verify(committee),
            Self::Vote(m) => m.verify(committee),
            Self::Done(m) => m.verify(committee),
            Self::SkipShare(m) => m.verify(committee),
            Self::Skip(m) => m.verify(committee),
            Self::ElectShare(m) => m.verify(committee, pk_set),
            Self::ViewChange(m) => m.verify(committee),
            Self::Halt(m) => m.verify(committee),
        }
    }
}

fn verify_ed25519(
    kind: &'static str,
    committee: &Committee,
    author: NodeId,
    epoch: Epoch,
    digest: &Digest,
    signature: &Signature,
) -> ConsensusResult<()> {
    let name = committee
        .name(author)
        .ok_or(ConsensusError::UnknownAuthority(author))?;
    signature
        .verify(name, digest)
        .map_err(|_| ConsensusError::InvalidSignature {
            kind,
            epoch,
            author,
        })
}
