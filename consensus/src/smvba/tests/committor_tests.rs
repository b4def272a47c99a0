// Copyright (c) Mysten Labs, Inc.
// SPDX-License-Identifier: Apache-2.0

use super::committor::Committor;
use super::messages::Block;
use mempool::Batch;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::timeout;

fn block(proposer: u32, epoch: u64, id: u64) -> Block {
    Block::new(
        proposer,
        Batch {
            id,
            txs: vec![vec![0u8; 8]],
        },
        epoch,
    )
}

async fn expect_notify(rx: &mut mpsc::Receiver<()>) {
    timeout(Duration::from_secs(1), rx.recv())
        .await
        .expect("expected a commit notification")
        .unwrap();
}

async fn expect_silence(rx: &mut mpsc::Receiver<()>) {
    assert!(timeout(Duration::from_millis(100), rx.recv()).await.is_err());
}

#[tokio::test]
async fn output_is_gap_free() {
    let (tx, mut rx) = mpsc::channel(16);
    let mut committor = Committor::new(tx);

    // Epoch 1 resolves before epoch 0: nothing is emitted yet.
    committor.commit(1, Some(1), Some(block(1, 1, 1))).await;
    expect_silence(&mut rx).await;

    // Epoch 0 lands: both slots drain, in order.
    committor.commit(0, Some(0), Some(block(0, 0, 0))).await;
    expect_notify(&mut rx).await;
    expect_notify(&mut rx).await;
    expect_silence(&mut rx).await;
}

#[tokio::test]
async fn same_epoch_emits_at_most_once() {
    let (tx, mut rx) = mpsc::channel(16);
    let mut committor = Committor::new(tx);

    committor.commit(0, Some(0), Some(block(0, 0, 0))).await;
    expect_notify(&mut rx).await;

    // A second commit of the same epoch is stale.
    committor.commit(0, Some(0), Some(block(0, 0, 0))).await;
    expect_silence(&mut rx).await;
}

#[tokio::test]
async fn skipped_slot_does_not_block_the_head() {
    let (tx, mut rx) = mpsc::channel(16);
    let mut committor = Committor::new(tx);

    committor.commit(1, Some(1), Some(block(1, 1, 1))).await;
    expect_silence(&mut rx).await;

    // Epoch 0's block is unavailable: the slot drains empty and epoch 1
    // is emitted.
    committor.skip(0, Some(0)).await;
    expect_notify(&mut rx).await;
    expect_silence(&mut rx).await;

    assert_eq!(committor.leader(0), Some(0));
    assert_eq!(committor.leader(1), Some(1));
}

#[tokio::test]
async fn leader_recorded_without_block() {
    let (tx, mut rx) = mpsc::channel(16);
    let mut committor = Committor::new(tx);

    // Recording a leader alone does not advance the sequence.
    committor.commit(0, Some(2), None).await;
    expect_silence(&mut rx).await;
    assert_eq!(committor.leader(0), Some(2));

    committor.commit(0, Some(2), Some(block(2, 0, 2))).await;
    expect_notify(&mut rx).await;
}
