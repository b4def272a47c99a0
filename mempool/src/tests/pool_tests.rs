// Copyright (c) Mysten Labs, Inc.
// SPDX-License-Identifier: Apache-2.0

use super::*;

fn parameters() -> PoolParameters {
    PoolParameters {
        rate: 1_000,
        tx_size: 16,
        batch_size: 2,
        max_queue_size: 10,
    }
}

#[tokio::test]
async fn fabricated_batch_shape() {
    let pool = Pool::new(parameters(), 4, 1);

    let batch = pool.get_batch().await;
    assert_eq!(batch.txs.len(), 2);
    assert!(batch.txs.iter().all(|tx| tx.len() == 16));
}

#[tokio::test]
async fn batch_ids_are_distinct_per_node() {
    // Node 1 in a committee of 4: ids are 1, 5, 9, ...
    let pool = Pool::new(parameters(), 4, 1);

    let first = pool.get_batch().await;
    let second = pool.get_batch().await;
    let third = pool.get_batch().await;
    assert_eq!(first.id, 1);
    assert_eq!(second.id, 5);
    assert_eq!(third.id, 9);
}

#[tokio::test]
async fn returned_batch_is_served_first() {
    let pool = Pool::new(parameters(), 4, 0);

    let batch = pool.get_batch().await;
    pool.put_batch(batch.clone()).await;

    // The returned batch comes back before any fresh fabrication.
    let served = pool.get_batch().await;
    assert_eq!(served, batch);
}
