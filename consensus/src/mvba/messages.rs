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
const PROPOSAL_TAG: u8 = 1;
const COMMITMENT_TAG: u8 = 2;
const READY_TAG: u8 = 3;
const FINAL_TAG: u8 = 4;
const ELECT_TAG: u8 = 5;
const VOTE_TAG: u8 = 6;
const ABA_VAL_TAG: u8 = 7;
const ABA_MUX_TAG: u8 = 8;
const COIN_TAG: u8 = 9;
const ABA_HALT_TAG: u8 = 10;

/// The two consistent broadcasts every node runs per epoch: one for its
/// block, one for its commitment bit-vector.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CbcTag {
    Data,
    Commit,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum VoteFlag {
    Yes,
    No,
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

/// Data-tag CBC proposal: the author's block for this epoch.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Proposal {
    pub author: NodeId,
    pub block: Block,
    pub epoch: Epoch,
    pub signature: Signature,
}

impl Proposal {
    pub async fn new(
        author: NodeId,
        block: Block,
        epoch: Epoch,
        signature_service: &SignatureService,
    ) -> Self {
        let mut proposal = Self {
            author,
            block,
            epoch,
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
        Hasher::new()
            .update([PROPOSAL_TAG])
            .update(self.author.to_le_bytes())
            .update(self.epoch.to_le_bytes())
            .update(self.block.digest().as_bytes())
            .finalize()
    }
}

/// Commit-tag CBC proposal: a bit-vector of size N marking which peers'
/// data CBCs the author saw complete.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Commitment {
    pub author: NodeId,
    pub commitment: Vec<bool>,
    pub epoch: Epoch,
    pub signature: Signature,
}

impl Commitment {
    pub async fn new(
        author: NodeId,
        commitment: Vec<bool>,
        epoch: Epoch,
        signature_service: &SignatureService,
    ) -> Self {
        let mut message = Self {
            author,
            commitment,
            epoch,
            signature: Signature::default(),
        };
        message.signature = signature_service.request_signature(message.digest()).await;
        message
    }

    pub fn verify(&self, committee: &Committee) -> ConsensusResult<()> {
        verify_ed25519(
            "commitment",
            committee,
            self.author,
            self.epoch,
            &self.digest(),
            &self.signature,
        )
    }
}

impl Hash for Commitment {
    fn digest(&self) -> Digest {
        let mut hasher = Hasher::new()
            .update([COMMITMENT_TAG])
            .update(self.author.to_le_bytes())
            .update(self.epoch.to_le_bytes());
        for bit in &self.commitment {
            hasher = hasher.update([*bit as u8]);
        }
        hasher.finalize()
    }
}

/// Acknowledgement of a CBC payload, sent back to its proposer.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Ready {
    pub author: NodeId,
    pub proposer: NodeId,
    pub epoch: Epoch,
    pub tag: CbcTag,
    pub signature: Signature,
}

impl Ready {
    pub async fn new(
        author: NodeId,
        proposer: NodeId,
        epoch: Epoch,
        tag: CbcTag,
        signature_service: &SignatureService,
    ) -> Self {
        let mut ready = Self {
            author,
            proposer,
            epoch,
            tag,
            signature: Signature::default(),
        };
        ready.signature = signature_service.request_signature(ready.digest()).await;
        ready
    }

    pub fn verify(&self, committee: &Committee) -> ConsensusResult<()> {
        verify_ed25519(
            "ready",
            committee,
            self.author,
            self.epoch,
            &self.digest(),
            &self.signature,
        )
    }
}

impl Hash for Ready {
    fn digest(&self) -> Digest {
        Hasher::new()
            .update([READY_TAG])
            .update(self.author.to_le_bytes())
            .update(self.proposer.to_le_bytes())
            .update(self.epoch.to_le_bytes())
            .update([self.tag as u8])
            .finalize()
    }
}

/// Broadcast by a proposer whose CBC collected 2f+1 readies; receiving it
/// marks that CBC complete.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Final {
    pub author: NodeId,
    pub epoch: Epoch,
    pub tag: CbcTag,
    pub signature: Signature,
}

impl Final {
    pub async fn new(
        author: NodeId,
        epoch: Epoch,
        tag: CbcTag,
        signature_service: &SignatureService,
    ) -> Self {
        let mut message = Self {
            author,
            epoch,
            tag,
            signature: Signature::default(),
        };
        message.signature = signature_service.request_signature(message.digest()).await;
        message
    }

    pub fn verify(&self, committee: &Committee) -> ConsensusResult<()> {
        verify_ed25519(
            "final",
            committee,
            self.author,
            self.epoch,
            &self.digest(),
            &self.signature,
        )
    }
}

impl Hash for Final {
    fn digest(&self) -> Digest {
        Hasher::new()
            .update([FINAL_TAG])
            .update(self.author.to_le_bytes())
            .update(self.epoch.to_le_bytes())
            .update([self.tag as u8])
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

    // Author excluded: every share signs the same message.
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

/// YES/NO position on whether the elected leader's data CBC completed
/// locally; the aggregate decides the input bit of the binary agreement.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Vote {
    pub author: NodeId,
    pub leader: NodeId,
    pub epoch: Epoch,
    pub round: Round,
    pub flag: VoteFlag,
    pub signature: Signature,
}

impl Vote {
    pub async fn new(
        author: NodeId,
        leader: NodeId,
        epoch: Epoch,
        round: Round,
        flag: VoteFlag,
        signature_service: &SignatureService,
    ) -> Self {
        let mut vote = Self {
            author,
            leader,
            epoch,
            round,
            flag,
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
            .update(self.leader.to_le_bytes())
            .update(self.epoch.to_le_bytes())
            .update(self.round.to_le_bytes())
            .update([self.flag as u8])
            .finalize()
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AbaVal {
    pub author: NodeId,
    pub leader: NodeId,
    pub epoch: Epoch,
    pub round: Round,
    pub in_round: Round,
    pub flag: bool,
    pub signature: Signature,
}

impl AbaVal {
    pub async fn new(
        author: NodeId,
        leader: NodeId,
        epoch: Epoch,
        round: Round,
        in_round: Round,
        flag: bool,
        signature_service: &SignatureService,
    ) -> Self {
        let mut val = Self {
            author,
            leader,
            epoch,
            round,
            in_round,
            flag,
            signature: Signature::default(),
        };
        val.signature = signature_service.request_signature(val.digest()).await;
        val
    }

    pub fn verify(&self, committee: &Committee) -> ConsensusResult<()> {
        verify_ed25519(
            "aba-val",
            committee,
            self.author,
            self.epoch,
            &self.digest(),
            &self.signature,
        )
    }
}

impl Hash for AbaVal {
    fn digest(&self) -> Digest {
        Hasher::new()
            .update([ABA_VAL_TAG])
            .update(self.author.to_le_bytes())
            .update(self.leader.to_le_bytes())
            .update(self.epoch.to_le_bytes())
            .update(self.round.to_le_bytes())
            .update(self.in_round.to_le_bytes())
            .update([self.flag as u8])
            .finalize()
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AbaMux {
    pub author: NodeId,
    pub leader: NodeId,
    pub epoch: Epoch,
    pub round: Round,
    pub in_round: Round,
    pub flag: bool,
    pub signature: Signature,
}

impl AbaMux {
    pub async fn new(
        author: NodeId,
        leader: NodeId,
        epoch: Epoch,
        round: Round,
        in_round: Round,
        flag: bool,
        signature_service: &SignatureService,
    ) -> Self {
        let mut mux = Self {
            author,
            leader,
            epoch,
            round,
            in_round,
            flag,
            signature: Signature::default(),
        };
        mux.signature = signature_service.request_signature(mux.digest()).await;
        mux
    }

    pub fn verify(&self, committee: &Committee) -> ConsensusResult<()> {
        verify_ed25519(
            "aba-mux",
            committee,
            self.author,
            self.epoch,
            &self.digest(),
            &self.signature,
        )
    }
}

impl Hash for AbaMux {
    fn digest(&self) -> Digest {
        Hasher::new()
            .update([ABA_MUX_TAG])
            .update(self.author.to_le_bytes())
            .update(self.leader.to_le_bytes())
            .update(self.epoch.to_le_bytes())
            .update(self.round.to_le_bytes())
            .update(self.in_round.to_le_bytes())
            .update([self.flag as u8])
            .finalize()
    }
}

/// Threshold share of the round's common coin.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CoinShare {
    pub author: NodeId,
    pub epoch: Epoch,
    pub round: Round,
    pub in_round: Round,
    pub share: SignatureShare,
}

impl CoinShare {
    pub async fn new(
        author: NodeId,
        epoch: Epoch,
        round: Round,
        in_round: Round,
        signature_service: &SignatureService,
    ) -> Self {
        let digest = Self::coin_digest(epoch, round, in_round);
        let share = signature_service.request_signature_share(digest).await;
        Self {
            author,
            epoch,
            round,
            in_round,
            share,
        }
    }

    pub fn coin_digest(epoch: Epoch, round: Round, in_round: Round) -> Digest {
        Hasher::new()
            .update([COIN_TAG])
            .update(epoch.to_le_bytes())
            .update(round.to_le_bytes())
            .update(in_round.to_le_bytes())
            .finalize()
    }

    pub fn verify(&self, committee: &Committee, pk_set: &PublicKeySet) -> ConsensusResult<()> {
        committee
            .name(self.author)
            .ok_or(ConsensusError::UnknownAuthority(self.author))?;
        if !verify_share(pk_set, self.author as usize, &self.digest(), &self.share) {
            return Err(ConsensusError::InvalidSignature {
                kind: "coin-share",
                epoch: self.epoch,
                author: self.author,
            });
        }
        Ok(())
    }
}

impl Hash for CoinShare {
    fn digest(&self) -> Digest {
        Self::coin_digest(self.epoch, self.round, self.in_round)
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AbaHalt {
    pub author: NodeId,
    pub leader: NodeId,
    pub epoch: Epoch,
    pub round: Round,
    pub flag: bool,
    pub signature: Signature,
}

impl AbaHalt {
    pub async fn new(
        author: NodeId,
        leader: NodeId,
        epoch: Epoch,
        round: Round,
        flag: bool,
        signature_service: &SignatureService,
    ) -> Self {
        let mut halt = Self {
            author,
            leader,
            epoch,
            round,
            flag,
            signature: Signature::default(),
        };
        halt.signature = signature_service.request_signature(halt.digest()).await;
        halt
    }

    pub fn verify(&self, committee: &Committee) -> ConsensusResult<()> {
        verify_ed25519(
            "aba-halt",
            committee,
            self.author,
            self.epoch,
            &self.digest(),
            &self.signature,
        )
    }
}

impl Hash for AbaHalt {
    fn digest(&self) -> Digest {
        Hasher::new()
            .update([ABA_HALT_TAG])
            .update(self.author.to_le_bytes())
            .update(self.leader.to_le_bytes())
            .update(self.epoch.to_le_bytes())
            .update(self.round.to_le_bytes())
            .update([self.flag as u8])
            .finalize()
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub enum ConsensusMessage {
    Propose(Proposal),
    Commitment(Commitment),
    Ready(Ready),
    Final(Final),
    ElectShare(ElectShare),
    Vote(Vote),
    AbaVal(AbaVal),
    AbaMux(AbaMux),
    CoinShare(CoinShare),
    AbaHalt(AbaHalt),
}

impl ConsensusMessage {
    pub fn verify(&self, committee: &Committee, pk_set: &PublicKeySet) -> ConsensusResult<()> {
        match self {
            Self::Propose(m) => m.verify(committee),
            Self::Commitment(m) => m.verify(committee),
            Self::Ready(m) => m.verify(committee),
            Self::Final(m) => m.verify(committee),
            Self::ElectShare(m) => m.verify(committee, pk_set),
            Self::Vote(m) => m.verify(committee),
            Self::AbaVal(m) => m.verify(committee),
            Self::AbaMux(m) => m.verify(committee),
            Self::CoinShare(m) => m.verify(committee, pk_set),
            Self::AbaHalt(m) => m.verify(committee),
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
