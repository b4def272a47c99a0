// Copyright (c) Mysten Labs, Inc.
// SPDX-License-Identifier: Apache-2.0

//! Boot-time peer synchronization: the protocols are asynchronous and
//! timeout-free, but a node waits once at startup until every peer
//! accepts TCP connections before emitting its first proposal.

use config::{Committee, NodeId};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::time::sleep;
use tracing::info;

pub async fn await_peers(name: NodeId, committee: &Committee, sync_timeout: u64) {
    info!("Waiting for all nodes to be online...");
    sleep(Duration::from_millis(sync_timeout)).await;

    let handles: Vec<_> = committee
        .broadcast_addresses(name)
        .into_iter()
        .map(|address| {
            tokio::spawn(async move {
                loop {
                    match TcpStream::connect(address).await {
                        Ok(_) => break,
                        Err(_) => sleep(Duration::from_millis(10)).await,
                    }
                }
            })
        })
        .collect();
    for handle in handles {
        let _ = handle.await;
    }
    info!("All nodes are online");
}
