// Copyright (c) Mysten Labs, Inc.
// SPDX-License-Identifier: Apache-2.0

//! Gap-free committed sequence indexed by epoch. A slot whose block is
//! unavailable drains empty instead of blocking the head of the line.

use config::{Epoch, NodeId};
use std::collections::HashMap;
use tokio::sync::mpsc;
use tracing::info;

use super::messages::Block;

pub struct Committor {
    index: Epoch,
    leaders: HashMap<Epoch, NodeId>,
    pending: HashMap<Epoch, Option<Block>>,
    tx_block: mpsc::Sender<Block>,
}

impl Committor {
    pub fn new(tx_notify: mpsc::Sender<()>) -> Self {
        let (tx_block, mut rx_block): (mpsc::Sender<Block>, _) = mpsc::channel(1_000);
        tokio::spawn(async move {
            while let Some(block) = rx_block.recv().await {
                if !block.batch.txs.is_empty() {
                    info!(
                        "Committed block epoch {} node {} batch_id {}",
                        block.epoch, block.proposer, block.batch.id
                    );
                }
                if tx_notify.send(()).await.is_err() {
                    return;
                }
            }
        });
        Self {
            index: 0,
            leaders: HashMap::new(),
            pending: HashMap::new(),
            tx_block,
        }
    }

    pub fn leader(&self, epoch: Epoch) -> Option<NodeId> {
        self.leaders.get(&epoch).copied()
    }

    pub async fn commit(&mut self, epoch: Epoch, leader: Option<NodeId>, block: Option<Block>) {
        if epoch < self.index {
            return;
        }
        if let Some(leader) = leader {
            self.leaders.insert(epoch, leader);
        }
        let Some(block) = block else {
            return;
        };
        self.pending.insert(epoch, Some(block));
        self.drain().await;
    }

    pub async fn skip(&mut self, epoch: Epoch, leader: Option<NodeId>) {
        if epoch < self.index {
            return;
        }
        if let Some(leader) = leader {
            self.leaders.insert(epoch, leader);
        }
        self.pending.entry(epoch).or_insert(None);
        self.drain().await;
    }

    async fn drain(&mut self) {
        while let Some(slot) = self.pending.remove(&self.index) {
            if let Some(block) = slot {
                if self.tx_block.send(block).await.is_err() {
                    return;
                }
            }
            self.index += 1;
        }
    }
}
