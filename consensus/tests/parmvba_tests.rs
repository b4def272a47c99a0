// Copyright (c) Mysten Labs, Inc.
// SPDX-License-Identifier: Apache-2.0

mod common;

use common::committee_nodes;
use consensus::parmvba::Consensus;
use std::time::Duration;
use tokio::time::timeout;

const COMMIT_TIMEOUT: Duration = Duration::from_secs(60);

#[tokio::test(flavor = "multi_thread")]
async fn four_nodes_commit_with_references() {
    let (nodes, _dirs) = committee_nodes(7_300, 4);

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

    // Once past epoch 0, commits include reference-resolved blocks: each
    // node delivers several blocks over a few epochs.
    for rx in receivers.iter_mut() {
        for _ in 0..4 {
            timeout(COMMIT_TIMEOUT, rx.recv())
                .await
                .expect("node did not commit in time")
                .expect("commit stream closed");
        }
    }
}
