// Copyright (c) Mysten Labs, Inc.
// SPDX-License-Identifier: Apache-2.0

//! Gap-free committed sequence indexed by epoch. Epochs closed without a
//! leader block drain as empty-batch blocks: the notification fires, the
//! log stays silent.

use config::Epoch;
use std::collections::HashMap;
use tokio::sync::mpsc;
use tracing::info;

use super::messages::Block;

pub struct Committor {
    index: Epoch,
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
            pending: HashMap::new(),
            tx_block,
        }
    }

    pub async fn commit(&mut self, block: Block) {
        if block.epoch < self.index {
            return;
        }
        self.pending.insert(block.epoch, Some(block));
        self.drain().await;
    }

    pub async fn skip(&mut self, epoch: Epoch) {
        if epoch < self.index {
            return;
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
