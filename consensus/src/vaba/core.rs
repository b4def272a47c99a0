// Copyright (c) Mysten Labs, Inc.
// SPDX-License-Identifier: Apache-2.0

use config::{Committee, ConsensusParameters, Epoch, NodeId};
use crypto::{Digest, Hash as _, PublicKeySet, SignatureService};
use mempool::{Batch, Pool};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use store::Store;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use super::aggregator::Aggregator;
use super::committor::Committor;
use super::elector::Elector;
use super::messages::{
    Block, ConsensusMessage, Done, ElectShare, Halt, PromotePhase, Proposal, Skip, SkipShare,
    ViewChange, Vote,
};
use super::promote::Promote;
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
    /// Highest epoch whose leader we saw locked; promotions of earlier
    /// epochs are no longer entered.
    lock: Epoch,
    promote_instances: HashMap<Epoch, HashMap<NodeId, Arc<Promote>>>,
    skip_flags: HashMap<Epoch, Arc<AtomicBool>>,
    elect_flags: HashSet<Epoch>,
    view_change_flags: HashSet<Epoch>,
    view_change_authors: HashMap<Epoch, HashSet<NodeId>>,
    commit_flags: HashSet<Epoch>,
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
            committor: Committor::new(tx_notify),
            committee,
            parameters,
            signature_service,
            pk_set,
            store,
            pool,
            transmitter,
            rx_inbound,
            epoch: 0,
            lock: 0,
            promote_instances: HashMap::new(),
            skip_flags: HashMap::new(),
            elect_flags: HashSet::new(),
            view_change_flags: HashSet::new(),
            view_change_authors: HashMap::new(),
            commit_flags: HashSet::new(),
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

    fn skip_flag(&mut self, epoch: Epoch) -> Arc<AtomicBool> {
        self.skip_flags
            .entry(epoch)
            .or_insert_with(|| Arc::new(AtomicBool::new(false)))
            .clone()
    }

    fn is_skip(&self, epoch: Epoch) -> bool {
        self.skip_flags
            .get(&epoch)
            .is_some_and(|flag| flag.load(Ordering::SeqCst))
    }

    fn set_skip(&mut self, epoch: Epoch) {
        self.skip_flag(epoch).store(true, Ordering::SeqCst);
    }

    fn promote_instance(&mut self, epoch: Epoch, proposer: NodeId) -> Arc<Promote> {
        let skip = self.skip_flag(epoch);
        if !self
            .promote_instances
            .get(&epoch)
            .is_some_and(|peers| peers.contains_key(&proposer))
        {
            let instance = Arc::new(Promote::new(
                self.name,
                self.committee.clone(),
                self.signature_service.clone(),
                self.transmitter.clone(),
                epoch,
                proposer,
                skip,
            ));
            self.promote_instances
                .entry(epoch)
                .or_default()
                .insert(proposer, instance);
        }
        self.promote_instances[&epoch][&proposer].clone()
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

    async fn propose(&mut self, epoch: Epoch, block: Block) -> ConsensusResult<()> {
        let proposal = Proposal::new(
            self.name,
            epoch,
            PromotePhase::One,
            Some(block),
            &self.signature_service,
        )
        .await;
        self.broadcast(ConsensusMessage::Propose(proposal)).await
    }

    async fn handle_proposal(&mut self, proposal: Proposal) -> ConsensusResult<()> {
        debug!(
            "Processing Proposal epoch {} phase {:?} node {}",
            proposal.epoch, proposal.phase, proposal.author
        );

        // The leader's phase-one block landing after the epoch committed.
        if proposal.phase == PromotePhase::One {
            if let Some(block) = &proposal.block {
                if self.commit_flags.contains(&proposal.epoch)
                    && self.elector.leader(proposal.epoch) == Some(proposal.author)
                {
                    let mut block = block.clone();
                    block.epoch = proposal.epoch;
                    self.committor.commit(block).await;
                }
            }
        }

        if self.message_filter(proposal.epoch) {
            return Ok(());
        }

        if proposal.phase == PromotePhase::One {
            let Some(block) = &proposal.block else {
                warn!(
                    "Phase-one proposal without payload from node {}",
                    proposal.author
                );
                return Ok(());
            };
            self.store_block(block).await?;
            // Promotions below the lock epoch are abandoned.
            if proposal.epoch < self.lock {
                return Ok(());
            }
        }

        let promote = self.promote_instance(proposal.epoch, proposal.author);
        tokio::spawn(async move { promote.process_proposal(proposal).await });
        Ok(())
    }

    async fn handle_vote(&mut self, vote: Vote) -> ConsensusResult<()> {
        debug!(
            "Processing Vote epoch {} phase {:?} proposer {}",
            vote.epoch, vote.phase, vote.proposer
        );
        if self.message_filter(vote.epoch) {
            return Ok(());
        }
        let promote = self.promote_instance(vote.epoch, vote.proposer);
        tokio::spawn(async move { promote.process_vote(vote).await });
        Ok(())
    }

    async fn handle_done(&mut self, done: Done) -> ConsensusResult<()> {
        debug!("Processing Done epoch {}", done.epoch);
        if self.message_filter(done.epoch) {
            return Ok(());
        }
        if self.aggregator.add_done(&done)? {
            let share = SkipShare::new(self.name, done.epoch, &self.signature_service).await;
            self.broadcast(ConsensusMessage::SkipShare(share)).await?;
        }
        Ok(())
    }

    async fn handle_skip_share(&mut self, share: SkipShare) -> ConsensusResult<()> {
        debug!("Processing SkipShare epoch {}", share.epoch);
        if self.message_filter(share.epoch) {
            return Ok(());
        }
        if self.aggregator.add_skip_share(&share)? {
            self.set_skip(share.epoch);
            let skip = Skip::new(self.name, share.epoch, &self.signature_service).await;
            self.transmitter
                .send(self.name, None, ConsensusMessage::Skip(skip))
                .await?;
            self.invoke_elect(share.epoch).await?;
        }
        Ok(())
    }

    async fn handle_skip(&mut self, skip: Skip) -> ConsensusResult<()> {
        debug!("Processing Skip epoch {}", skip.epoch);
        if self.message_filter(skip.epoch) {
            return Ok(());
        }
        if !self.is_skip(skip.epoch) {
            self.set_skip(skip.epoch);
            let amplified = Skip::new(self.name, skip.epoch, &self.signature_service).await;
            self.transmitter
                .send(self.name, None, ConsensusMessage::Skip(amplified))
                .await?;
            self.invoke_elect(skip.epoch).await?;
        }
        Ok(())
    }

    async fn invoke_elect(&mut self, epoch: Epoch) -> ConsensusResult<()> {
        if !self.elect_flags.insert(epoch) {
            return Ok(());
        }
        debug!("Invoking election epoch {}", epoch);
        let share = ElectShare::new(self.name, epoch, &self.signature_service).await;
        self.broadcast(ConsensusMessage::ElectShare(share)).await
    }

    async fn handle_elect_share(&mut self, share: ElectShare) -> ConsensusResult<()> {
        debug!("Processing ElectShare epoch {}", share.epoch);
        if self.message_filter(share.epoch) {
            return Ok(());
        }
        let epoch = share.epoch;
        if let Some(leader) = self.elector.add_share(share)? {
            self.invoke_view_change(epoch, leader).await?;
        }
        Ok(())
    }

    async fn invoke_view_change(&mut self, epoch: Epoch, leader: NodeId) -> ConsensusResult<()> {
        if !self.view_change_flags.insert(epoch) {
            return Ok(());
        }
        debug!("Invoking view change epoch {} leader {}", epoch, leader);
        let promote = self.promote_instance(epoch, leader);
        let view_change = ViewChange::new(
            self.name,
            leader,
            epoch,
            promote.block_hash(),
            promote.is_commit(),
            promote.is_lock(),
            promote.is_key(),
            &self.signature_service,
        )
        .await;
        self.broadcast(ConsensusMessage::ViewChange(view_change))
            .await
    }

    async fn handle_view_change(&mut self, view_change: ViewChange) -> ConsensusResult<()> {
        debug!("Processing ViewChange epoch {}", view_change.epoch);
        if self.message_filter(view_change.epoch) {
            return Ok(());
        }
        let epoch = view_change.epoch;
        if self.commit_flags.contains(&epoch) {
            return Ok(());
        }
        if !self
            .view_change_authors
            .entry(epoch)
            .or_default()
            .insert(view_change.author)
        {
            return Err(ConsensusError::OneMoreMessage {
                kind: "view-change",
                epoch,
                round: 0,
                author: view_change.author,
            });
        }

        if view_change.is_lock && epoch >= self.lock {
            self.lock = epoch;
        }

        // Any view change carrying commit evidence decides the epoch.
        if view_change.is_commit {
            if let Some(block_hash) = view_change.block_hash {
                if let Some(mut block) = self.read_block(&block_hash).await? {
                    block.epoch = epoch;
                    self.commit_output(epoch, view_change.leader, block).await;
                } else {
                    warn!("Committed block missing from store, epoch {}", epoch);
                    self.committor.skip(epoch).await;
                    self.return_own_batch(epoch, view_change.leader).await;
                }
                self.commit_flags.insert(epoch);
                let halt = Halt::new(
                    self.name,
                    view_change.leader,
                    block_hash,
                    epoch,
                    &self.signature_service,
                )
                .await;
                self.transmitter
                    .send(self.name, None, ConsensusMessage::Halt(halt))
                    .await?;
                self.advance_epoch(epoch + 1, None).await?;
                return Ok(());
            }
        }

        // 2f+1 view changes without commit evidence: close the epoch
        // empty and carry the leader's latest block into the next one.
        let count = self.view_change_authors[&epoch].len();
        if count == self.committee.quorum_threshold() {
            self.commit_flags.insert(epoch);
            let placeholder = Block::new(view_change.leader, Batch::default(), epoch);
            self.committor.commit(placeholder).await;
            self.return_own_batch(epoch, view_change.leader).await;
            self.advance_epoch(epoch + 1, view_change.block_hash).await?;
        }
        Ok(())
    }

    async fn handle_halt(&mut self, halt: Halt) -> ConsensusResult<()> {
        debug!("Processing Halt epoch {}", halt.epoch);
        if self.message_filter(halt.epoch) {
            return Ok(());
        }
        if self.commit_flags.contains(&halt.epoch) {
            return Ok(());
        }
        let epoch = halt.epoch;
        self.elector.set_leader(epoch, halt.leader);
        if let Some(mut block) = self.read_block(&halt.block_hash).await? {
            block.epoch = epoch;
            self.commit_output(epoch, halt.leader, block).await;
        } else {
            warn!("Committed block missing from store, epoch {}", epoch);
            self.committor.skip(epoch).await;
            self.return_own_batch(epoch, halt.leader).await;
        }
        self.commit_flags.insert(epoch);
        let amplified = Halt::new(
            self.name,
            halt.leader,
            halt.block_hash,
            epoch,
            &self.signature_service,
        )
        .await;
        self.transmitter
            .send(self.name, None, ConsensusMessage::Halt(amplified))
            .await?;
        self.advance_epoch(epoch + 1, None).await
    }

    async fn commit_output(&mut self, epoch: Epoch, leader: NodeId, block: Block) {
        self.committor.commit(block).await;
        self.return_own_batch(epoch, leader).await;
    }

    async fn return_own_batch(&mut self, epoch: Epoch, leader: NodeId) {
        if let Some(own) = self.own_blocks.remove(&epoch) {
            if leader != self.name {
                self.pool.put_batch(own.batch).await;
            }
        }
    }

    async fn advance_epoch(
        &mut self,
        epoch: Epoch,
        block_hash: Option<Digest>,
    ) -> ConsensusResult<()> {
        debug!("Advancing to epoch {}", epoch);
        if epoch <= self.epoch {
            return Ok(());
        }
        self.epoch = epoch;
        self.cleanup(epoch);
        // Re-promote the locked block when one is known, else a fresh one.
        let block = match block_hash {
            Some(hash) => self.read_block(&hash).await?,
            None => None,
        };
        let block = match block {
            Some(block) => block,
            None => self.generate_block(epoch).await,
        };
        self.propose(epoch, block).await
    }

    fn cleanup(&mut self, epoch: Epoch) {
        self.promote_instances.retain(|e, _| *e >= epoch);
        self.skip_flags.retain(|e, _| *e >= epoch);
        self.elect_flags.retain(|e| *e >= epoch);
        self.view_change_flags.retain(|e| *e >= epoch);
        self.view_change_authors.retain(|e, _| *e >= epoch);
        self.own_blocks.retain(|e, _| *e >= epoch);
        self.aggregator.cleanup(epoch);
        self.elector.cleanup(epoch);
    }

    pub async fn run(&mut self) {
        let block = self.generate_block(self.epoch).await;
        if let Err(e) = self.propose(self.epoch, block).await {
            error!("Failed to send the first proposal: {}", e);
        }

        while let Some(message) = self.rx_inbound.recv().await {
            if let Err(e) = message.verify(&self.committee, &self.pk_set) {
                warn!("{}", e);
                continue;
            }
            let result = match message {
                ConsensusMessage::Propose(proposal) => self.handle_proposal(proposal).await,
                ConsensusMessage::Vote(vote) => self.handle_vote(vote).await,
                ConsensusMessage::Done(done) => self.handle_done(done).await,
                ConsensusMessage::SkipShare(share) => self.handle_skip_share(share).await,
                ConsensusMessage::Skip(skip) => self.handle_skip(skip).await,
                ConsensusMessage::ElectShare(share) => self.handle_elect_share(share).await,
                ConsensusMessage::ViewChange(view_change) => {
                    self.handle_view_change(view_change).await
                }
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
