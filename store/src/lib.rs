// Copyright (c) Mysten Labs, Inc.
// SPDX-License-Identifier: Apache-2.0

//! Content-addressed persistent map used as the block store. All
//! operations are serialized through a single worker task, which keeps a
//! stable ordering of writes; writes under an identical key are idempotent.

use std::path::Path;
use tokio::sync::{mpsc, oneshot};

#[cfg(test)]
#[path = "tests/store_tests.rs"]
mod store_tests;

pub type StoreResult<T> = Result<T, StoreError>;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("storage failure: {0}")]
    RocksDb(#[from] rocksdb::Error),

    #[error("store worker stopped")]
    WorkerStopped,
}

type Key = Vec<u8>;
type Value = Vec<u8>;

enum StoreCommand {
    Write(Key, Value, oneshot::Sender<StoreResult<()>>),
    Read(Key, oneshot::Sender<StoreResult<Option<Value>>>),
}

#[derive(Clone)]
pub struct Store {
    channel: mpsc::Sender<StoreCommand>,
}

impl Store {
    pub fn new<P: AsRef<Path>>(path: P) -> StoreResult<Self> {
        let db = rocksdb::DB::open_default(path)?;
        let (tx, mut rx) = mpsc::channel(1_000);
        tokio::spawn(async move {
            while let Some(command) = rx.recv().await {
                match command {
                    StoreCommand::Write(key, value, sender) => {
                        let response = db.put(&key, &value).map_err(StoreError::from);
                        let _ = sender.send(response);
                    }
                    StoreCommand::Read(key, sender) => {
                        let response = db.get(&key).map_err(StoreError::from);
                        let _ = sender.send(response);
                    }
                }
            }
        });
        Ok(Self { channel: tx })
    }

    pub async fn write(&self, key: Key, value: Value) -> StoreResult<()> {
        let (sender, receiver) = oneshot::channel();
        self.channel
            .send(StoreCommand::Write(key, value, sender))
            .await
            .map_err(|_| StoreError::WorkerStopped)?;
        receiver.await.map_err(|_| StoreError::WorkerStopped)?
    }

    pub async fn read(&self, key: Key) -> StoreResult<Option<Value>> {
        let (sender, receiver) = oneshot::channel();
        self.channel
            .send(StoreCommand::Read(key, sender))
            .await
            .map_err(|_| StoreError::WorkerStopped)?;
        receiver.await.map_err(|_| StoreError::WorkerStopped)?
    }
}
