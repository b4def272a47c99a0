// Copyright (c) Mysten Labs, Inc.
// SPDX-License-Identifier: Apache-2.0

use super::committor::Committor;
use super::messages::Block;
use crypto::Hash as _;
use mempool::Batch;
use std::time::Duration;
use store::Store;
use tokio::sync::mpsc;
use tokio::time::timeout;

fn block(proposer: u32, epoch: u64, id: u64, references: Vec<crypto::Digest>) -> Block {
    Block::new(
        proposer,
        Batch {
            id,
            txs: vec![vec![proposer as u8; 8]],
        },
        epoch,
        references,
    )
}

async fn store_with(blocks: &[Block]) -> (Store, tempfile::TempDir) {
    let dir = tempfile::tempdir().unwrap();
    let store = Store::new(dir.path()).unwrap();
    for block in blocks {
        store
            .write(block.digest().to_vec(), block.encode().unwrap())
            .await
            .unwrap();
    }
    (store, dir)
}

async fn count_emissions(rx: &mut mpsc::Receiver<()>) -> usize {
    let mut count = 0;
    while timeout(Duration::from_millis(200), rx.recv()).await.is_ok() {
        count += 1;
    }
    count
}

#[tokio::test]
async fn references_are_resolved_before_the_carrier() {
    // Three losing proposals of epoch 0, referenced by the leader block.
    let losers: Vec<_> = (1..4u32).map(|i| block(i, 0, i as u64, Vec::new())).collect();
    let references: Vec<_> = losers.iter().map(|b| b.digest()).collect();
    let (store, _dir) = store_with(&losers).await;

    let (tx, mut rx) = mpsc::channel(16);
    let mut committor = Committor::new(store, tx);

    let leader = block(0, 0, 0, references);
    committor.commit(0, Some(leader)).await;

    // Three referenced blocks plus the carrier.
    assert_eq!(count_emissions(&mut rx).await, 4);
}

#[tokio::test]
async fn referenced_blocks_emit_only_once() {
    let shared = block(2, 0, 42, Vec::new());
    let (store, _dir) = store_with(&[shared.clone()]).await;

    let (tx, mut rx) = mpsc::channel(16);
    let mut committor = Committor::new(store, tx);

    // Both epoch leaders reference the same block.
    let first = block(0, 0, 0, vec![shared.digest()]);
    let second = block(1, 1, 1, vec![shared.digest()]);
    committor.commit(0, Some(first)).await;
    committor.commit(1, Some(second)).await;

    // shared + first + second: the second reference walk skips the dupe.
    assert_eq!(count_emissions(&mut rx).await, 3);
}

#[tokio::test]
async fn missing_reference_is_skipped() {
    let known = block(1, 0, 7, Vec::new());
    let unknown = block(2, 0, 8, Vec::new());
    let (store, _dir) = store_with(&[known.clone()]).await;

    let (tx, mut rx) = mpsc::channel(16);
    let mut committor = Committor::new(store, tx);

    let leader = block(0, 0, 0, vec![known.digest(), unknown.digest()]);
    committor.commit(0, Some(leader)).await;

    // The carrier is delivered even though one reference is unavailable.
    assert_eq!(count_emissions(&mut rx).await, 2);
}

#[tokio::test]
async fn sequence_is_gap_free() {
    let (store, _dir) = store_with(&[]).await;
    let (tx, mut rx) = mpsc::channel(16);
    let mut committor = Committor::new(store, tx);

    committor.commit(1, Some(block(1, 1, 1, Vec::new()))).await;
    assert_eq!(count_emissions(&mut rx).await, 0);

    committor.commit(0, Some(block(0, 0, 0, Vec::new()))).await;
    assert_eq!(count_emissions(&mut rx).await, 2);
}
