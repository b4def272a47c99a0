// Copyright (c) Mysten Labs, Inc.
// SPDX-License-Identifier: Apache-2.0

use config::{Committee, ConsensusParameters, Epoch, NodeId, Round};
use crypto::{Digest, Hash as _, PublicKeySet, SignatureService};
use mempool::Pool;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use store::Store;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use super::aggregator::{Aggregator, DoneDecision, VoteDecision};
use super::committor::Committor;
use super::elector::Elector;
use super::messages::{
    Block, ConsensusMessage, Done, ElectShare, FinVote, Finish, Halt, Prevote, SpbPhase,
    SpbProposal, SpbVote, VoteFlag,
};
use super::spb::Spb;
use crate::error::{ConsensusError, ConsensusResult};
use crate::transmitter::Transmitter;

pub struct Core {
    name: NodeId,
    committee: Committee,
    #[allow(dead_code)]
    parameters: ConsensusParameters,
    signature_service: SignatureService,
    pk_set: PublicKeySet,
    store: Store,
    pool: Pool,
    transmitter: Transmitter<ConsensusMessage>,
    rx_inbound: mpsc::Receiver<ConsensusMessage>,
    aggregator: Aggregator,
    elector: Elector,
    committor: Committor,

    epoch: Epoch,
    spb_instances: HashMap<Epoch, HashMap<Round, HashMap<NodeId, Arc<Spb>>>>,
    finish_flags: HashMap<Epoch, HashMap<Round, HashMap<NodeId, Digest>>>,
    done_flags: HashSet<(Epoch, Round)>,
    ready_flags: HashSet<(Epoch, Round)>,
    halt_flags: HashSet<Epoch>,
    own_blocks: HashMap<Epoch, Block>,
}

impl Core {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        name: NodeId,
        committee: Committee,
        parameters: ConsensusParameters,
        signature_service: SignatureService,
        store: Store,
        pool: Pool,
        transmitter: Transmitter<ConsensusMessage>,
        rx_inbound: mpsc::Receiver<ConsensusMessage>,
        tx_notify: mpsc::Sender<()>,
    ) -> Self {
        let pk_set = signature_service.pk_set().clone();
        Self {
            name,
            aggregator: Aggregator::new(committee.clone()),
            elector: Elector::new(committee.clone(), pk_set.clone()),
            committor: Committor::new(store.clone(), tx_notify),
            committee,
            parameters,
            signature_service,
            pk_set,
            store,
            pool,
            transmitter,
            rx_inbound,
            epoch: 0,
            spb_instances: HashMap::new(),
            finish_flags: HashMap::new(),
            done_flags: HashSet::new(),
            ready_flags: HashSet::new(),
            halt_flags: HashSet::new(),
            own_blocks: HashMap::new(),
        }
    }

    fn message_filter(&self, epoch: Epoch) -> bool {
        epoch < self.epoch
    }

    async fn store_block(&mut self, block: &Block) -> ConsensusResult<()> {
        let key = block.digest().to_vec();
        let value = block.encode()?;
        self.store.write(key, value).await?;
        Ok(())
    }

    async fn read_block(&mut self, digest: &Digest) -> ConsensusResult<Option<Block>> {
        match self.store.read(digest.to_vec()).await? {
            Some(bytes) => Ok(Some(Block::decode(&bytes)?)),
            None => Ok(None),
        }
    }

    fn spb_instance(&mut self, epoch: Epoch, round: Round, proposer: NodeId) -> Arc<Spb> {
        self.spb_instances
            .entry(epoch)
            .or_default()
            .entry(round)
            .or_default()
            .entry(proposer)
            .or_insert_with(|| {
                Arc::new(Spb::new(
                    self.name,
                    self.committee.clone(),
                    self.signature_service.clone(),
                    self.transmitter.clone(),
                    epoch,
                    round,
                    proposer,
                ))
            })
            .clone()
    }

    fn finished_hash(&self, epoch: Epoch, round: Round, node: NodeId) -> Option<Digest> {
        self.finish_flags
            .get(&epoch)
            .and_then(|rounds| rounds.get(&round))
            .and_then(|nodes| nodes.get(&node))
            .copied()
    }

    /// Digests of every SPB known to have completed in (epoch, round), in
    /// node-id order; they become the references of the next epoch block.
    fn references(&self, epoch: Epoch, round: Round) -> Vec<Digest> {
        (0..self.committee.size() as NodeId)
            .filter_map(|node| self.finished_hash(epoch, round, node))
            .collect()
    }

    async fn generate_block(&mut self, epoch: Epoch, references: Vec<Digest>) -> Block {
        let batch = self.pool.get_batch().await;
        let block = Block::new(self.name, batch, epoch, references);
        if !block.batch.txs.is_empty() {
            info!(
                "Created block epoch {} node {} batch_id {}",
                block.epoch, block.proposer, block.batch.id
            );
        }
        self.own_blocks.insert(epoch, block.clone());
        block
    }

    async fn broadcast(&mut self, message: ConsensusMessage) -> ConsensusResult<()> {
        self.transmitter
            .send(self.name, None, message.clone())
            .await?;
        self.transmitter.loopback(message).await;
        Ok(())
    }

    async fn propose(&mut self, epoch: Epoch, round: Round, block: Block) -> ConsensusResult<()> {
        let proposal = SpbProposal::new(
            self.name,
            Some(block),
            epoch,
            round,
            SpbPhase::One,
            &self.signature_service,
        )
        .await;
        self.broadcast(ConsensusMessage::SpbPropose(proposal)).await
    }

    async fn handle_spb_proposal(&mut self, proposal: SpbProposal) -> ConsensusResult<()> {
        debug!(
            "Processing SpbProposal epoch {} round {} phase {:?}",
            proposal.epoch, proposal.round, proposal.phase
        );

        if proposal.phase == SpbPhase::One {
            if let Some(block) = &proposal.block {
                // A leader block arriving after its epoch halted still
                // commits (and resolves its references).
                if self.halt_flags.contains(&proposal.epoch)
                    && self.elector.leader(proposal.epoch, proposal.round) == Some(proposal.author)
                {
                    self.committor
                        .commit(proposal.epoch, Some(block.clone()))
                        .await;
                }
            }
        }

        if self.message_filter(proposal.epoch) {
            return Ok(());
        }

        if proposal.phase == SpbPhase::One {
            let Some(block) = &proposal.block else {
                warn!(
                    "Phase-one proposal without payload from node {}",
                    proposal.author
                );
                return Ok(());
            };
            if block.proposer != proposal.author {
                warn!("Proposal from node {} carries a foreign block", proposal.author);
                return Ok(());
            }
            self.store_block(block).await?;
        }

        let spb = self.spb_instance(proposal.epoch, proposal.round, proposal.author);
        tokio::spawn(async move { spb.process_proposal(proposal).await });
        Ok(())
    }

    async fn handle_spb_vote(&mut self, vote: SpbVote) -> ConsensusResult<()> {
        debug!(
            "Processing SpbVote epoch {} round {} phase {:?}",
            vote.epoch, vote.round, vote.phase
        );
        if self.message_filter(vote.epoch) {
            return Ok(());
        }
        let spb = self.spb_instance(vote.epoch, vote.round, vote.proposer);
        tokio::spawn(async move { spb.process_vote(vote).await });
        Ok(())
    }

    async fn handle_finish(&mut self, finish: Finish) -> ConsensusResult<()> {
        debug!(
            "Processing Finish epoch {} round {}",
            finish.epoch, finish.round
        );
        if self.message_filter(finish.epoch) {
            return Ok(());
        }
        self.finish_flags
            .entry(finish.epoch)
            .or_default()
            .entry(finish.round)
            .or_default()
            .insert(finish.author, finish.block_hash);
        if self.aggregator.add_finish(&finish)? {
            self.invoke_done_and_share(finish.epoch, finish.round)
                .await?;
        }
        Ok(())
    }

    async fn invoke_done_and_share(&mut self, epoch: Epoch, round: Round) -> ConsensusResult<()> {
        if !self.done_flags.insert((epoch, round)) {
            return Ok(());
        }
        debug!("Invoking Done and ElectShare epoch {} round {}", epoch, round);
        let done = Done::new(self.name, epoch, round, &self.signature_service).await;
        let share = ElectShare::new(self.name, epoch, round, &self.signature_service).await;
        self.broadcast(ConsensusMessage::Done(done)).await?;
        self.broadcast(ConsensusMessage::ElectShare(share)).await?;
        Ok(())
    }

    async fn handle_done(&mut self, done: Done) -> ConsensusResult<()> {
        debug!("Processing Done epoch {} round {}", done.epoch, done.round);
        if self.message_filter(done.epoch) {
            return Ok(());
        }
        match self.aggregator.add_done(&done)? {
            DoneDecision::Amplify => self.invoke_done_and_share(done.epoch, done.round).await,
            DoneDecision::Ready => {
                self.ready_flags.insert((done.epoch, done.round));
                self.process_leader(done.epoch, done.round).await
            }
            DoneDecision::None => Ok(()),
        }
    }

    async fn handle_elect_share(&mut self, share: ElectShare) -> ConsensusResult<()> {
        debug!(
            "Processing ElectShare epoch {} round {}",
            share.epoch, share.round
        );
        if self.message_filter(share.epoch) {
            return Ok(());
        }
        let (epoch, round) = (share.epoch, share.round);
        if self.elector.add_share(share)?.is_some() {
            self.process_leader(epoch, round).await?;
        }
        Ok(())
    }

    async fn process_leader(&mut self, epoch: Epoch, round: Round) -> ConsensusResult<()> {
        if !self.ready_flags.contains(&(epoch, round)) {
            return Ok(());
        }
        let Some(leader) = self.elector.leader(epoch, round) else {
            return Ok(());
        };

        if let Some(block_hash) = self.finished_hash(epoch, round, leader) {
            let halt = Halt::new(
                self.name,
                leader,
                block_hash,
                epoch,
                round,
                &self.signature_service,
            )
            .await;
            self.broadcast(ConsensusMessage::Halt(halt)).await?;
        } else {
            let spb = self.spb_instance(epoch, round, leader);
            let prevote = match (spb.is_locked(), spb.block_hash()) {
                (true, Some(block_hash)) => {
                    Prevote::new(
                        self.name,
                        leader,
                        epoch,
                        round,
                        VoteFlag::Yes,
                        block_hash,
                        &self.signature_service,
                    )
                    .await
                }
                _ => {
                    Prevote::new(
                        self.name,
                        leader,
                        epoch,
                        round,
                        VoteFlag::No,
                        Digest::default(),
                        &self.signature_service,
                    )
                    .await
                }
            };
            self.broadcast(ConsensusMessage::Prevote(prevote)).await?;
        }
        Ok(())
    }

    async fn handle_prevote(&mut self, prevote: Prevote) -> ConsensusResult<()> {
        debug!(
            "Processing Prevote epoch {} round {}",
            prevote.epoch, prevote.round
        );
        if self.message_filter(prevote.epoch) {
            return Ok(());
        }
        let flag = match self.aggregator.add_prevote(&prevote)? {
            VoteDecision::Yes => VoteFlag::Yes,
            VoteDecision::No => VoteFlag::No,
            _ => return Ok(()),
        };
        let vote = FinVote::new(
            self.name,
            prevote.leader,
            prevote.epoch,
            prevote.round,
            flag,
            prevote.block_hash,
            &self.signature_service,
        )
        .await;
        self.broadcast(ConsensusMessage::FinVote(vote)).await
    }

    async fn handle_finvote(&mut self, vote: FinVote) -> ConsensusResult<()> {
        debug!(
            "Processing FinVote epoch {} round {}",
            vote.epoch, vote.round
        );
        if self.message_filter(vote.epoch) {
            return Ok(());
        }
        match self.aggregator.add_finvote(&vote)? {
            (VoteDecision::Commit, lock) => {
                let block_hash = lock.unwrap_or(vote.block_hash);
                let halt = Halt::new(
                    self.name,
                    vote.leader,
                    block_hash,
                    vote.epoch,
                    vote.round,
                    &self.signature_service,
                )
                .await;
                self.broadcast(ConsensusMessage::Halt(halt)).await
            }
            (VoteDecision::Yes, lock) => self.advance_round(vote.epoch, vote.round, lock).await,
            (VoteDecision::No, _) => self.advance_round(vote.epoch, vote.round, None).await,
            _ => Ok(()),
        }
    }

    async fn advance_round(
        &mut self,
        epoch: Epoch,
        round: Round,
        lock: Option<Digest>,
    ) -> ConsensusResult<()> {
        if self.message_filter(epoch) {
            return Ok(());
        }
        let block_hash = match lock {
            Some(hash) => Some(hash),
            None => self.spb_instance(epoch, round, self.name).block_hash(),
        };
        let block = match block_hash {
            Some(hash) => self.read_block(&hash).await?,
            None => None,
        };
        let block = match block {
            Some(block) => block,
            None => self.generate_block(epoch, Vec::new()).await,
        };
        self.propose(epoch, round + 1, block).await
    }

    async fn handle_halt(&mut self, halt: Halt) -> ConsensusResult<()> {
        debug!("Processing Halt epoch {}", halt.epoch);
        if self.message_filter(halt.epoch) {
            return Ok(());
        }
        if !self.halt_flags.insert(halt.epoch) {
            return Ok(());
        }
        self.elector.set_leader(halt.epoch, halt.round, halt.leader);
        self.process_output(halt.epoch, halt.leader, halt.block_hash)
            .await?;
        let references = self.references(halt.epoch, halt.round);
        self.advance_epoch(halt.epoch + 1, references).await
    }

    async fn process_output(
        &mut self,
        epoch: Epoch,
        leader: NodeId,
        block_hash: Digest,
    ) -> ConsensusResult<()> {
        debug!("Processing output epoch {}", epoch);
        match self.read_block(&block_hash).await? {
            Some(block) => self.committor.commit(epoch, Some(block)).await,
            None => {
                warn!("Committed block missing from store, epoch {}", epoch);
                self.committor.skip(epoch).await;
            }
        }
        if let Some(own) = self.own_blocks.remove(&epoch) {
            if leader != self.name {
                self.pool.put_batch(own.batch).await;
            }
        }
        Ok(())
    }

    async fn advance_epoch(&mut self, epoch: Epoch, references: Vec<Digest>) -> ConsensusResult<()> {
        if epoch <= self.epoch {
            return Ok(());
        }
        self.epoch = epoch;
        self.cleanup(epoch);
        let block = self.generate_block(epoch, references).await;
        self.propose(epoch, 0, block).await
    }

    fn cleanup(&mut self, epoch: Epoch) {
        self.spb_instances.retain(|e, _| *e >= epoch);
        self.finish_flags.retain(|e, _| *e >= epoch);
        self.done_flags.retain(|(e, _)| *e >= epoch);
        self.ready_flags.retain(|(e, _)| *e >= epoch);
        self.own_blocks.retain(|e, _| *e >= epoch);
        self.aggregator.cleanup(epoch);
        self.elector.cleanup(epoch);
    }

    pub async fn run(&mut self) {
        let block = self.generate_block(self.epoch, Vec::new()).await;
        if let Err(e) = self.propose(self.epoch, 0, block).await {
            error!("Failed to send the first proposal: {}", e);
        }

        while let Some(message) = self.rx_inbound.recv().await {
            if let Err(e) = message.verify(&self.committee, &self.pk_set) {
                warn!("{}", e);
                continue;
            }
            let result = match message {
                ConsensusMessage::SpbPropose(proposal) => self.handle_spb_proposal(proposal).await,
                ConsensusMessage::SpbVote(vote) => self.handle_spb_vote(vote).await,
                ConsensusMessage::Finish(finish) => self.handle_finish(finish).await,
                ConsensusMessage::Done(done) => self.handle_done(done).await,
                ConsensusMessage::ElectShare(share) => self.handle_elect_share(share).await,
                ConsensusMessage::Prevote(prevote) => self.handle_prevote(prevote).await,
                ConsensusMessage::FinVote(vote) => self.handle_finvote(vote).await,
                ConsensusMessage::Halt(halt) => self.handle_halt(halt).await,
            };
            match result {
                Ok(()) => (),
                Err(e @ ConsensusError::StoreError(..)) => error!("{}", e),
                Err(e @ ConsensusError::SerializationError(..)) => error!("Store corrupted: {}", e),
                Err(e) => warn!("{}", e),
            }
        }
    }
}
