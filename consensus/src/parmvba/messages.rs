// Copyright (c) Mysten Labs, Inc.
// SPDX-License-Identifier: Apache-2.0

use config::{Committee, Epoch, NodeId, Round};
use crypto::{
    verify_share, Digest, Hash, Hasher, PublicKeySet, Signature, SignatureService, SignatureShare,
};
use mempool::Batch;
use serde::{Deserialize, Serialize};

use crate::error::{ConsensusError, ConsensusResult};

const BLOCK_TAG: u8 = 0;
const SPB_PROPOSAL_TAG: u8 = 1;
const SPB_VOTE_TAG: u8 = 2;
const FINISH_TAG: u8 = 3;
const DONE_TAG: u8 = 4;
const ELECT_TAG: u8 = 5;
const PREVOTE_TAG: u8 = 6;
const FIN_VOTE_TAG: u8 = 7;
const HALT_TAG: u8 = 8;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SpbPhase {
    One,
    Two,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum VoteFlag {
    Yes,
    No,
}

/// A block additionally carries the digests of every SPB that completed in
/// the round its epoch committed on; the committor resolves them so losing
/// proposers' payloads are not wasted.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Block {
    pub proposer: NodeId,
    pub batch: Batch,
    pub epoch: Epoch,
    pub references: Vec<Digest>,
}

impl Block {
    pub fn new(proposer: NodeId, batch: Batch, epoch: Epoch, references: Vec<Digest>) -> Self {
        Self {
            proposer,
            batch,
            epoch,
            references,
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
    /// References are carried, not identity: the digest covers
    /// (proposer, epoch, batch id) only.
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
pub struct SpbProposal {
    pub author: NodeId,
    pub block: Option<Block>,
    pub epoch: Epoch,
    pub round: Round,
    pub phase: SpbPhase,
    pub signature: Signature,
}

impl SpbProposal {
    pub async fn new(
        author: NodeId,
        block: Option<Block>,
        epoch: Epoch,
        round: Round,
        phase: SpbPhase,
        signature_service: &SignatureService,
    ) -> Self {
        let mut proposal = Self {
            author,
            block,
            epoch,
            round,
            phase,
            signature: Signature::default(),
        };
        proposal.signature = signature_service.request_signature(proposal.digest()).await;
        proposal
    }

    pub fn verify(&self, committee: &Committee) -> ConsensusResult<()> {
        verify_ed25519(
            "spb-proposal",
            committee,
            self.author,
            self.epoch,
            &self.digest(),
            &self.signature,
        )
    }
}

impl Hash for SpbProposal {
    fn digest(&self) -> Digest {
        let mut hasher = Hasher::new()
            .update([SPB_PROPOSAL_TAG])
            .update(self.author.to_le_bytes())
            .update(self.epoch.to_le_bytes())
            .update(self.round.to_le_bytes())
            .update([self.phase as u8]);
        if let Some(block) = &self.block {
            hasher = hasher.update(block.digest().as_bytes());
        }
        hasher.finalize()
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SpbVote {
    pub author: NodeId,
    pub proposer: NodeId,
    pub block_hash: Digest,
    pub epoch: Epoch,
    pub round: Round,
    pub phase: SpbPhase,
    pub signature: Signature,
}

impl SpbVote {
    pub async fn new(
        author: NodeId,
        proposer: NodeId,
        block_hash: Digest,
        epoch: Epoch,
        round: Round,
        phase: SpbPhase,
        signature_service: &SignatureService,
    ) -> Self {
        let mut vote = Self {
            author,
            proposer,
            block_hash,
            epoch,
            round,
            phase,
            signature: Signature::default(),
        };
        vote.signature = signature_service.request_signature(vote.digest()).await;
        vote
    }

    pub fn verify(&self, committee: &Committee) -> ConsensusResult<()> {
        verify_ed25519(
            "spb-vote",
            committee,
            self.author,
            self.epoch,
            &self.digest(),
            &self.signature,
        )
    }
}

impl Hash for SpbVote {
    fn digest(&self) -> Digest {
        Hasher::new()
            .update([SPB_VOTE_TAG])
            .update(self.author.to_le_bytes())
            .update(self.proposer.to_le_bytes())
            .update(self.epoch.to_le_bytes())
            .update(self.round.to_le_bytes())
            .update([self.phase as u8])
            .update(self.block_hash.as_bytes())
            .finalize()
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Finish {
    pub author: NodeId,
    pub block_hash: Digest,
    pub epoch: Epoch,
    pub round: Round,
    pub signature: Signature,
}

impl Finish {
    pub async fn new(
        author: NodeId,
        block_hash: Digest,
        epoch: Epoch,
        round: Round,
        signature_service: &SignatureService,
    ) -> Self {
        let mut finish = Self {
            author,
            block_hash,
            epoch,
            round,
            signature: Signature::default(),
        };
        finish.signature = signature_service.request_signature(finish.digest()).await;
        finish
    }

    pub fn verify(&self, committee: &Committee) -> ConsensusResult<()> {
        verify_ed25519(
            "finish",
            committee,
            self.author,
            self.epoch,
            &self.digest(),
            &self.signature,
        )
    }
}

impl Hash for Finish {
    fn digest(&self) -> Digest {
        Hasher::new()
            .update([FINISH_TAG])
            .update(self.author.to_le_bytes())
            .update(self.epoch.to_le_bytes())
            .update(self.round.to_le_bytes())
            .update(self.block_hash.as_bytes())
            .finalize()
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Done {
    pub author: NodeId,
    pub epoch: Epoch,
    pub round: Round,
    pub signature: Signature,
}

impl Done {
    pub async fn new(
        author: NodeId,
        epoch: Epoch,
        round: Round,
        signature_service: &SignatureService,
    ) -> Self {
        let mut done = Self {
            author,
            epoch,
            round,
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
            .update(self.round.to_le_bytes())
            .finalize()
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ElectShare {
    pub author: NodeId,
    pub epoch: Epoch,
    pub round: Round,
    pub share: SignatureShare,
}

impl ElectShare {
    pub async fn new(
        author: NodeId,
        epoch: Epoch,
        round: Round,
        signature_service: &SignatureService,
    ) -> Self {
        let digest = Self::elect_digest(epoch, round);
        let share = signature_service.request_signature_share(digest).await;
        Self {
            author,
            epoch,
            round,
            share,
        }
    }

    // Every share signs the same (epoch, round) digest.
    pub fn elect_digest(epoch: Epoch, round: Round) -> Digest {
        Hasher::new()
            .update([ELECT_TAG])
            .update(epoch.to_le_bytes())
            .update(round.to_le_bytes())
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
        Self::elect_digest(self.epoch, self.round)
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Prevote {
    pub author: NodeId,
    pub leader: NodeId,
    pub epoch: Epoch,
    pub round: Round,
    pub flag: VoteFlag,
    pub block_hash: Digest,
    pub signature: Signature,
}

impl Prevote {
    pub async fn new(
        author: NodeId,
        leader: NodeId,
        epoch: Epoch,
        round: Round,
        flag: VoteFlag,
        block_hash: Digest,
        signature_service: &SignatureService,
    ) -> Self {
        let mut prevote = Self {
            author,
            leader,
            epoch,
            round,
            flag,
            block_hash,
            signature: Signature::default(),
        };
        prevote.signature = signature_service.request_signature(prevote.digest()).await;
        prevote
    }

    pub fn verify(&self, committee: &Committee) -> ConsensusResult<()> {
        verify_ed25519(
            "prevote",
            committee,
            self.author,
            self.epoch,
            &self.digest(),
            &self.signature,
        )
    }
}

impl Hash for Prevote {
    fn digest(&self) -> Digest {
        Hasher::new()
            .update([PREVOTE_TAG])
            .update(self.author.to_le_bytes())
            .update(self.leader.to_le_bytes())
            .update(self.epoch.to_le_bytes())
            .update(self.round.to_le_bytes())
            .update([self.flag as u8])
            .update(self.block_hash.as_bytes())
            .finalize()
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct FinVote {
    pub author: NodeId,
    pub leader: NodeId,
    pub epoch: Epoch,
    pub round: Round,
    pub flag: VoteFlag,
    pub block_hash: Digest,
    pub signature: Signature,
}

impl FinVote {
    pub async fn new(
        author: NodeId,
        leader: NodeId,
        epoch: Epoch,
        round: Round,
        flag: VoteFlag,
        block_hash: Digest,
        signature_service: &SignatureService,
    ) -> Self {
        let mut vote = Self {
            author,
            leader,
            epoch,
            round,
            flag,
            block_hash,
            signature: Signature::default(),
        };
        vote.signature = signature_service.request_signature(vote.digest()).await;
        vote
    }

    pub fn verify(&self, committee: &Committee) -> ConsensusResult<()> {
        verify_ed25519(
            "fin-vote",
            committee,
            self.author,
            self.epoch,
            &self.digest(),
            &self.signature,
        )
    }
}

impl Hash for FinVote {
    fn digest(&self) -> Digest {
        Hasher::new()
            .update([FIN_VOTE_TAG])
            .update(self.author.to_le_bytes())
            .update(self.leader.to_le_bytes())
            .update(self.epoch.to_le_bytes())
            .update(self.round.to_le_bytes())
            .update([self.flag as u8])
            .update(self.block_hash.as_bytes())
            .finalize()
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Halt {
    pub author: NodeId,
    pub leader: NodeId,
    pub epoch: Epoch,
    pub round: Round,
    pub block_hash: Digest,
    pub signature: Signature,
}

impl Halt {
    pub async fn new(
        author: NodeId,
        leader: NodeId,
        block_hash: Digest,
        epoch: Epoch,
        round: Round,
        signature_service: &SignatureService,
    ) -> Self {
        let mut halt = Self {
            author,
            leader,
            epoch,
            round,
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
            .update(self.round.to_le_bytes())
            .update(self.block_hash.as_bytes())
            .finalize()
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub enum ConsensusMessage {
    SpbPropose(SpbProposal),
    SpbVote(SpbVote),
    Finish(Finish),
    Done(Done),
    ElectShare(ElectShare),
    Prevote(Prevote),
    FinVote(FinVote),
    Halt(Halt),
}

impl ConsensusMessage {
    pub fn verify(&self, committee: &Committee, pk_set: &PublicKeySet) -> ConsensusResult<()> {
        match self {
            Self::SpbPropose(m) => m.verify(committee),
            Self::SpbVote(m) => m.verify(committee),
            Self::Finish(m) => m.verify(committee),
            Self::Done(m) => m.verify(committee),
            Self::ElectShare(m) => m.verify(committee, pk_set),
            Self::Prevote(m) => m.verify(committee),
            Self::FinVote(m) => m.verify(committee),
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
