// Copyright (c) Mysten Labs, Inc.
// SPDX-License-Identifier: Apache-2.0

mod common;

use common::{committee_nodes, silent_node};
use consensus::smvba::Consensus;
use std::time::Duration;
use tokio::time::timeout;

const COMMIT_TIMEOUT: Duration = Duration::from_secs(60);

#[tokio::test(flavor = "multi_thread")]
async fn four_nodes_commit_and_advance() {
    let (nodes, _dirs) = committee_nodes(7_200, 4);

    let mut receivers = Vec::new();
    for node in nodes {
        let common::TestNode {
            name,
            committee,
            parameters,
            signature_service,
            store,
            pool,
            tx_notify,
            rx_notify,
        } = node;
        receivers.push(rx_notify);
        tokio::spawn(async move {
            Consensus::spawn(
                name,
                committee,
                parameters,
                signature_service,
                store,
                pool,
                tx_notify,
            )
            .await
            .unwrap();
        });
    }

    // Every honest node emits a commit notification for epoch 0 and keeps
    // going: wait for a few epochs on each.
    for rx in receivers.iter_mut() {
        for _ in 0..3 {
            timeout(COMMIT_TIMEOUT, rx.recv())
                .await
                .expect("node did not commit in time")
                .expect("commit stream closed");
        }
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn progress_with_a_silent_node() {
    let (mut nodes, _dirs) = committee_nodes(7_250, 4);

    // Node 0 accepts connections but never participates. When the coin
    // elects it, the prevote/finvote fallback advances the round until a
    // responsive leader is picked.
    silent_node(7_250);
    nodes.remove(0);

    let mut receivers = Vec::new();
    for node in nodes {
        let common::TestNode {
            name,
            committee,
            parameters,
            signature_service,
            store,
            pool,
            tx_notify,
            rx_notify,
        } = node;
        receivers.push(rx_notify);
        tokio::spawn(async move {
            Consensus::spawn(
                name,
                committee,
                parameters,
                signature_service,
                store,
                pool,
                tx_notify,
            )
            .await
            .unwrap();
        });
    }

    for rx in receivers.iter_mut() {
        timeout(COMMIT_TIMEOUT, rx.recv())
            .await
            .expect("nodes did not commit around the silent peer")
            .expect("commit stream closed");
    }
}
