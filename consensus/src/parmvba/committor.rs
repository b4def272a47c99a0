// Copyright (c) Mysten Labs, Inc.
// SPDX-License-Identifier: Apache-2.0

//! Gap-free committed sequence with reference resolution: before a block
//! is emitted, every block it references that carries transactions and
//! has not been emitted yet is fetched from the store and emitted first.
//! Batch ids dedupe emissions across references and re-proposals.

use config::Epoch;
use std::collections::{HashMap, HashSet};
use store::Store;
use tokio::sync::mpsc;
use tracing::info;

use super::messages::Block;

pub struct Committor {
    index: Epoch,
    pending: HashMap<Epoch, Option<Block>>,
    committed_batches: HashSet<u64>,
    store: Store,
    tx_block: mpsc::Sender<Block>,
}

impl Committor {
    pub fn new(store: Store, tx_notify: mpsc::Sender<()>) -> Self {
        let (tx_block, mut rx_block): (mpsc::Sender<Block>, _) = mpsc::channel(1_000);
        tokio::spawn(async move {
            while let Some(block) = rx_block.recv().await {
                info!(
                    "Committed block epoch {} node {} batch_id {}",
                    block.epoch, block.proposer, block.batch.id
                );
                if tx_notify.send(()).await.is_err() {
                    return;
                }
            }
        });
        Self {
            index: 0,
            pending: HashMap::new(),
            committed_batches: HashSet::new(),
            store,
            tx_block,
        }
    }

    pub async fn commit(&mut self, epoch: Epoch, block: Option<Block>) {
        if epoch < self.index {
            return;
        }
        let Some(block) = block else {
            return;
        };
        self.pending.insert(epoch, Some(block));
        self.drain().await;
    }

    /// Abandon the slot of `epoch` so later epochs are not held back.
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
                self.emit(block).await;
            }
            self.index += 1;
        }
    }

    async fn emit(&mut self, block: Block) {
        // Referenced blocks first. A reference missing from the store is
        // skipped; the carrying block is delivered regardless.
        for digest in &block.references {
            let Ok(Some(bytes)) = self.store.read(digest.to_vec()).await else {
                continue;
            };
            let Ok(referenced) = Block::decode(&bytes) else {
                continue;
            };
            if referenced.batch.txs.is_empty() {
                continue;
            }
            if self.committed_batches.insert(referenced.batch.id) {
                if self.tx_block.send(referenced).await.is_err() {
                    return;
                }
            }
        }

        if !block.batch.txs.is_empty() && self.committed_batches.insert(block.batch.id) {
            let _ = self.tx_block.send(block).await;
        }
    }
}
