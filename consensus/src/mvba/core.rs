// Copyright (c) Mysten Labs, Inc.
// SPDX-License-Identifier: Apache-2.0

use config::{Committee, ConsensusParameters, Epoch, NodeId, Round};
use crypto::{Hash as _, PublicKeySet, SignatureService};
use mempool::Pool;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use store::Store;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use super::aba::{Aba, AbaOutput};
use super::aggregator::{Aggregator, VoteDecision};
use super::cbc::{Cbc, CbcFeedback};
use super::committor::Committor;
use super::elector::Elector;
use super::messages::{
    AbaHalt, AbaMux, AbaVal, Block, CbcTag, CoinShare, Commitment, ConsensusMessage, ElectShare,
    Final, Proposal, Ready, Vote, VoteFlag,
};
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
    tx_feedback: mpsc::Sender<CbcFeedback>,
    rx_feedback: mpsc::Receiver<CbcFeedback>,
    aggregator: Aggregator,
    elector: Elector,
    committor: Committor,

    epoch: Epoch,
    cbc_instances: HashMap<Epoch, HashMap<NodeId, Arc<Cbc>>>,
    aba_instances: HashMap<(Epoch, Round), Aba>,
    /// Peers whose data / commitment CBC completed, per epoch.
    data_done: HashMap<Epoch, HashSet<NodeId>>,
    commit_done: HashMap<Epoch, HashSet<NodeId>>,
    commitment_sent: HashSet<Epoch>,
    elect_sent: HashSet<Epoch>,
    vote_sent: HashSet<(Epoch, Round)>,
    aba_invoked: HashSet<(Epoch, Round)>,
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
        let (tx_feedback, rx_feedback) = mpsc::channel(1_000);
        Self {
            name,
            aggregator: Aggregator::new(committee.clone()),
            elector: Elector::new(committee.clone(), pk_set.clone()),
            committor: Committor::new(tx_notify),
            committee,
            parameters,
            signature_service,
            pk_set,
            store,
            pool,
            transmitter,
            rx_inbound,
            tx_feedback,
            rx_feedback,
            epoch: 0,
            cbc_instances: HashMap::new(),
            aba_instances: HashMap::new(),
            data_done: HashMap::new(),
            commit_done: HashMap::new(),
            commitment_sent: HashSet::new(),
            elect_sent: HashSet::new(),
            vote_sent: HashSet::new(),
            aba_invoked: HashSet::new(),
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

    async fn read_block(&mut self, digest: &crypto::Digest) -> ConsensusResult<Option<Block>> {
        match self.store.read(digest.to_vec()).await? {
            Some(bytes) => Ok(Some(Block::decode(&bytes)?)),
            None => Ok(None),
        }
    }

    fn cbc_instance(&mut self, epoch: Epoch, proposer: NodeId) -> Arc<Cbc> {
        if !self
            .cbc_instances
            .get(&epoch)
            .is_some_and(|peers| peers.contains_key(&proposer))
        {
            let instance = Arc::new(Cbc::new(
                self.name,
                self.committee.clone(),
                self.signature_service.clone(),
                self.transmitter.clone(),
                epoch,
                proposer,
                self.tx_feedback.clone(),
            ));
            self.cbc_instances
                .entry(epoch)
                .or_default()
                .insert(proposer, instance);
        }
        self.cbc_instances[&epoch][&proposer].clone()
    }

    /// `leader_hint` seeds an instance created by an early message; once
    /// our own election resolves, the elected leader overrides it.
    fn aba_instance(&mut self, epoch: Epoch, round: Round, leader_hint: NodeId) -> &mut Aba {
        let leader = self.elector.leader(epoch, round).unwrap_or(leader_hint);
        if !self.aba_instances.contains_key(&(epoch, round)) {
            let instance = Aba::new(
                self.name,
                self.committee.clone(),
                self.pk_set.clone(),
                self.signature_service.clone(),
                self.transmitter.clone(),
                epoch,
                round,
                leader,
            );
            self.aba_instances.insert((epoch, round), instance);
        }
        let instance = self
            .aba_instances
            .get_mut(&(epoch, round))
            .expect("aba instance was just inserted");
        instance.set_leader(leader);
        instance
    }

    async fn generate_block(&mut self, epoch: Epoch) -> Block {
        let batch = self.pool.get_batch().await;
        let block = Block::new(self.name, batch, epoch);
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

    async fn propose(&mut self, epoch: Epoch) -> ConsensusResult<()> {
        let block = self.generate_block(epoch).await;
        let proposal = Proposal::new(self.name, block, epoch, &self.signature_service).await;
        self.broadcast(ConsensusMessage::Propose(proposal)).await
    }

    async fn handle_proposal(&mut self, proposal: Proposal) -> ConsensusResult<()> {
        debug!(
            "Processing Proposal epoch {} node {}",
            proposal.epoch, proposal.author
        );

        // A leader block landing after the agreement halted still commits.
        if self.halt_flags.contains(&proposal.epoch)
            && self.committor.leader(proposal.epoch) == Some(proposal.author)
        {
            self.committor
                .commit(
                    proposal.epoch,
                    Some(proposal.author),
                    Some(proposal.block.clone()),
                )
                .await;
        }

        if self.message_filter(proposal.epoch) {
            return Ok(());
        }
        if proposal.block.proposer != proposal.author {
            warn!("Proposal from node {} carries a foreign block", proposal.author);
            return Ok(());
        }
        self.store_block(&proposal.block).await?;

        let cbc = self.cbc_instance(proposal.epoch, proposal.author);
        tokio::spawn(async move { cbc.process_proposal(proposal).await });
        Ok(())
    }

    async fn handle_commitment(&mut self, commitment: Commitment) -> ConsensusResult<()> {
        debug!(
            "Processing Commitment epoch {} node {}",
            commitment.epoch, commitment.author
        );
        if self.message_filter(commitment.epoch) {
            return Ok(());
        }
        if commitment.commitment.len() != self.committee.size() {
            warn!(
                "Commitment from node {} has wrong width",
                commitment.author
            );
            return Ok(());
        }
        let cbc = self.cbc_instance(commitment.epoch, commitment.author);
        tokio::spawn(async move { cbc.process_commitment(commitment).await });
        Ok(())
    }

    async fn handle_ready(&mut self, ready: Ready) -> ConsensusResult<()> {
        debug!(
            "Processing Ready epoch {} tag {:?} from node {}",
            ready.epoch, ready.tag, ready.author
        );
        if self.message_filter(ready.epoch) {
            return Ok(());
        }
        let cbc = self.cbc_instance(ready.epoch, ready.proposer);
        tokio::spawn(async move { cbc.process_ready(ready).await });
        Ok(())
    }

    async fn handle_final(&mut self, message: Final) -> ConsensusResult<()> {
        debug!(
            "Processing Final epoch {} tag {:?} from node {}",
            message.epoch, message.tag, message.author
        );
        if self.message_filter(message.epoch) {
            return Ok(());
        }
        let cbc = self.cbc_instance(message.epoch, message.author);
        tokio::spawn(async move { cbc.process_final(message).await });
        Ok(())
    }

    /// A CBC of this epoch completed; 2f+1 data completions release our
    /// commitment, 2f+1 commitment completions release our elect share.
    async fn handle_cbc_feedback(&mut self, feedback: CbcFeedback) -> ConsensusResult<()> {
        debug!(
            "CBC complete epoch {} node {} tag {:?}",
            feedback.epoch, feedback.proposer, feedback.tag
        );
        if self.message_filter(feedback.epoch) {
            return Ok(());
        }
        let epoch = feedback.epoch;
        match feedback.tag {
            CbcTag::Data => {
                let done = self.data_done.entry(epoch).or_default();
                done.insert(feedback.proposer);
                if done.len() == self.committee.quorum_threshold()
                    && self.commitment_sent.insert(epoch)
                {
                    let commitment = (0..self.committee.size() as NodeId)
                        .map(|node| self.data_done[&epoch].contains(&node))
                        .collect();
                    let message =
                        Commitment::new(self.name, commitment, epoch, &self.signature_service)
                            .await;
                    self.broadcast(ConsensusMessage::Commitment(message)).await?;
                }
            }
            CbcTag::Commit => {
                let done = self.commit_done.entry(epoch).or_default();
                done.insert(feedback.proposer);
                if done.len() == self.committee.quorum_threshold() && self.elect_sent.insert(epoch)
                {
                    let share = ElectShare::new(self.name, epoch, &self.signature_service).await;
                    self.broadcast(ConsensusMessage::ElectShare(share)).await?;
                }
            }
        }
        Ok(())
    }

    async fn handle_elect_share(&mut self, share: ElectShare) -> ConsensusResult<()> {
        debug!("Processing ElectShare epoch {}", share.epoch);
        if self.message_filter(share.epoch) {
            return Ok(());
        }
        let epoch = share.epoch;
        if self.elector.add_share(share)? {
            self.vote_for_leader(epoch, 0).await?;
        }
        Ok(())
    }

    /// Take a position on the leader of (epoch, round): YES when the
    /// leader's data CBC completed locally.
    async fn vote_for_leader(&mut self, epoch: Epoch, round: Round) -> ConsensusResult<()> {
        if !self.vote_sent.insert((epoch, round)) {
            return Ok(());
        }
        let Some(leader) = self.elector.leader(epoch, round) else {
            return Ok(());
        };
        let flag = if self
            .data_done
            .get(&epoch)
            .is_some_and(|done| done.contains(&leader))
        {
            VoteFlag::Yes
        } else {
            VoteFlag::No
        };
        debug!("Voting {:?} for leader {} epoch {} round {}", flag, leader, epoch, round);
        let vote = Vote::new(self.name, leader, epoch, round, flag, &self.signature_service).await;
        self.broadcast(ConsensusMessage::Vote(vote)).await
    }

    async fn handle_vote(&mut self, vote: Vote) -> ConsensusResult<()> {
        debug!("Processing Vote epoch {} round {}", vote.epoch, vote.round);
        if self.message_filter(vote.epoch) {
            return Ok(());
        }
        match self.aggregator.add_vote(&vote)? {
            VoteDecision::FastYes => self.invoke_aba(vote.epoch, vote.round, vote.leader, true).await,
            VoteDecision::AllNo => self.invoke_aba(vote.epoch, vote.round, vote.leader, false).await,
            VoteDecision::None => Ok(()),
        }
    }

    async fn invoke_aba(
        &mut self,
        epoch: Epoch,
        round: Round,
        leader: NodeId,
        input: bool,
    ) -> ConsensusResult<()> {
        if !self.aba_invoked.insert((epoch, round)) {
            return Ok(());
        }
        debug!(
            "Invoking ABA epoch {} round {} leader {} input {}",
            epoch, round, leader, input
        );
        self.aba_instance(epoch, round, leader).invoke(input).await
    }

    async fn handle_aba_val(&mut self, val: AbaVal) -> ConsensusResult<()> {
        if self.message_filter(val.epoch) {
            return Ok(());
        }
        let (epoch, round, leader) = (val.epoch, val.round, val.leader);
        self.aba_instance(epoch, round, leader).handle_val(val).await
    }

    async fn handle_aba_mux(&mut self, mux: AbaMux) -> ConsensusResult<()> {
        if self.message_filter(mux.epoch) {
            return Ok(());
        }
        let (epoch, round, leader) = (mux.epoch, mux.round, mux.leader);
        self.aba_instance(epoch, round, leader).handle_mux(mux).await
    }

    async fn handle_coin_share(&mut self, share: CoinShare) -> ConsensusResult<()> {
        if self.message_filter(share.epoch) {
            return Ok(());
        }
        let (epoch, round) = (share.epoch, share.round);
        let leader = self.elector.leader(epoch, round).unwrap_or(self.name);
        self.aba_instance(epoch, round, leader)
            .handle_coin_share(share)
            .await
    }

    async fn handle_aba_halt(&mut self, halt: AbaHalt) -> ConsensusResult<()> {
        if self.message_filter(halt.epoch) {
            return Ok(());
        }
        let (epoch, round, leader) = (halt.epoch, halt.round, halt.leader);
        let output = self
            .aba_instance(epoch, round, leader)
            .handle_halt(halt)
            .await?;
        if let Some(output) = output {
            self.process_aba_output(epoch, round, output).await?;
        }
        Ok(())
    }

    async fn process_aba_output(
        &mut self,
        epoch: Epoch,
        round: Round,
        output: AbaOutput,
    ) -> ConsensusResult<()> {
        debug!(
            "ABA output epoch {} round {} leader {} flag {}",
            epoch, round, output.leader, output.flag
        );
        if !output.flag {
            // The leader failed: re-elect with the next external round.
            return self.vote_for_leader(epoch, round + 1).await;
        }
        if !self.halt_flags.insert(epoch) {
            return Ok(());
        }
        let block_hash = self
            .cbc_instances
            .get(&epoch)
            .and_then(|peers| peers.get(&output.leader))
            .and_then(|cbc| cbc.block_hash());
        match block_hash {
            Some(hash) => match self.read_block(&hash).await? {
                Some(block) => {
                    self.committor
                        .commit(epoch, Some(output.leader), Some(block))
                        .await;
                }
                None => {
                    warn!("Committed block missing from store, epoch {}", epoch);
                    self.committor.skip(epoch, Some(output.leader)).await;
                }
            },
            None => {
                warn!("Leader block never received, epoch {}", epoch);
                self.committor.skip(epoch, Some(output.leader)).await;
            }
        }
        if let Some(own) = self.own_blocks.remove(&epoch) {
            if output.leader != self.name {
                self.pool.put_batch(own.batch).await;
            }
        }
        self.advance_epoch(epoch + 1).await
    }

    async fn advance_epoch(&mut self, epoch: Epoch) -> ConsensusResult<()> {
        if epoch <= self.epoch {
            return Ok(());
        }
        self.epoch = epoch;
        self.cleanup(epoch);
        self.propose(epoch).await
    }

    fn cleanup(&mut self, epoch: Epoch) {
        self.cbc_instances.retain(|e, _| *e >= epoch);
        self.aba_instances.retain(|(e, _), _| *e >= epoch);
        self.data_done.retain(|e, _| *e >= epoch);
        self.commit_done.retain(|e, _| *e >= epoch);
        self.commitment_sent.retain(|e| *e >= epoch);
        self.elect_sent.retain(|e| *e >= epoch);
        self.vote_sent.retain(|(e, _)| *e >= epoch);
        self.aba_invoked.retain(|(e, _)| *e >= epoch);
        self.own_blocks.retain(|e, _| *e >= epoch);
        self.aggregator.cleanup(epoch);
        self.elector.cleanup(epoch);
    }

    pub async fn run(&mut self) {
        if let Err(e) = self.propose(self.epoch).await {
            error!("Failed to send the first proposal: {}", e);
        }

        loop {
            let result = tokio::select! {
                Some(message) = self.rx_inbound.recv() => {
                    if let Err(e) = message.verify(&self.committee, &self.pk_set) {
                        warn!("{}", e);
                        continue;
                    }
                    match message {
                        ConsensusMessage::Propose(proposal) => self.handle_proposal(proposal).await,
                        ConsensusMessage::Commitment(commitment) => {
                            self.handle_commitment(commitment).await
                        }
                        ConsensusMessage::Ready(ready) => self.handle_ready(ready).await,
                        ConsensusMessage::Final(message) => self.handle_final(message).await,
                        ConsensusMessage::ElectShare(share) => self.handle_elect_share(share).await,
                        ConsensusMessage::Vote(vote) => self.handle_vote(vote).await,
                        ConsensusMessage::AbaVal(val) => self.handle_aba_val(val).await,
                        ConsensusMessage::AbaMux(mux) => self.handle_aba_mux(mux).await,
                        ConsensusMessage::CoinShare(share) => self.handle_coin_share(share).await,
                        ConsensusMessage::AbaHalt(halt) => self.handle_aba_halt(halt).await,
                    }
                },
                Some(feedback) = self.rx_feedback.recv() => {
                    self.handle_cbc_feedback(feedback).await
                },
                else => break,
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
