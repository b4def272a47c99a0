// Copyright (c) Mysten Labs, Inc.
// SPDX-License-Identifier: Apache-2.0

mod common;

use common::committee_nodes;
use consensus::mvba::Consensus;
use std::time::Duration;
use tokio::time::timeout;

const COMMIT_TIMEOUT: Duration = Duration::from_secs(60);

#[tokio::test(flavor = "multi_thread")]
async fn four_nodes_commit_through_binary_agreement() {
    let (nodes, _dirs) = committee_nodes(7_500, 4);

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
        for _ in 0..2 {
            timeout(COMMIT_TIMEOUT, rx.recv())
                .await
                .expect("node did not commit in time")
                .expect("commit stream closed");
        }
    }
}
