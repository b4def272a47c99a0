// Copyright (c) Mysten Labs, Inc.
// SPDX-License-Identifier: Apache-2.0

//! Transaction pool. Batches are opaque to consensus; in benchmark mode
//! the pool fabricates a fresh batch whenever the queue runs empty, so a
//! proposer is never blocked on client input.

use config::{NodeId, PoolParameters};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use tokio::sync::{mpsc, oneshot};
use tracing::{info, warn};

#[cfg(test)]
#[path = "tests/pool_tests.rs"]
mod pool_tests;

pub type Transaction = Vec<u8>;

/// A batch of opaque transactions. Batch ids are globally unique by
/// construction: id = node_id + N * local_counter.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Batch {
    pub id: u64,
    pub txs: Vec<Transaction>,
}

enum PoolCommand {
    Get(oneshot::Sender<Batch>),
    Put(Batch),
}

/// Clonable handle to the pool task.
#[derive(Clone)]
pub struct Pool {
    channel: mpsc::Sender<PoolCommand>,
}

impl Pool {
    pub fn new(parameters: PoolParameters, committee_size: usize, node_id: NodeId) -> Self {
        info!(
            "Transaction pool queue capacity set to {}",
            parameters.max_queue_size
        );
        info!("Transaction pool tx size set to {}", parameters.tx_size);
        info!("Transaction pool batch size set to {}", parameters.batch_size);
        info!("Transaction pool tx rate set to {}", parameters.rate);

        let (tx, rx) = mpsc::channel(1_000);
        PoolWorker {
            parameters,
            committee_size: committee_size as u64,
            node_id: node_id as u64,
            counter: 0,
            queue: VecDeque::new(),
        }
        .spawn(rx);
        Self { channel: tx }
    }

    /// Returns the next batch, fabricating one if the queue is empty.
    pub async fn get_batch(&self) -> Batch {
        let (sender, receiver) = oneshot::channel();
        self.channel
            .send(PoolCommand::Get(sender))
            .await
            .expect("failed to send command to pool");
        receiver.await.expect("failed to receive batch from pool")
    }

    /// Returns an unused batch to the pool, unchanged.
    pub async fn put_batch(&self, batch: Batch) {
        self.channel
            .send(PoolCommand::Put(batch))
            .await
            .expect("failed to send command to pool");
    }
}

struct PoolWorker {
    parameters: PoolParameters,
    committee_size: u64,
    node_id: u64,
    counter: u64,
    queue: VecDeque<Batch>,
}

impl PoolWorker {
    fn spawn(mut self, mut rx: mpsc::Receiver<PoolCommand>) {
        tokio::spawn(async move {
            while let Some(command) = rx.recv().await {
                match command {
                    PoolCommand::Get(sender) => {
                        let batch = self.queue.pop_front().unwrap_or_else(|| self.make());
                        let _ = sender.send(batch);
                    }
                    PoolCommand::Put(batch) => {
                        if self.queue.len() >= self.parameters.max_queue_size {
                            warn!("Transaction pool is full");
                            continue;
                        }
                        self.queue.push_back(batch);
                    }
                }
            }
        });
    }

    fn make(&mut self) -> Batch {
        let id = self.node_id + self.committee_size * self.counter;
        self.counter += 1;
        let txs = (0..self.parameters.batch_size)
            .map(|_| vec![0u8; self.parameters.tx_size])
            .collect();
        info!("Received Batch {}", id);
        Batch { id, txs }
    }
}
