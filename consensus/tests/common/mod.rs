// Copyright (c) Mysten Labs, Inc.
// SPDX-License-Identifier: Apache-2.0

use config::{
    local_committee_and_keys, Committee, ConsensusParameters, NodeId, PoolParameters,
};
use crypto::SignatureService;
use mempool::Pool;
use store::Store;
use tokio::sync::mpsc;

/// Everything one in-process node needs to join a local committee.
pub struct TestNode {
    pub name: NodeId,
    pub committee: Committee,
    pub parameters: ConsensusParameters,
    pub signature_service: SignatureService,
    pub store: Store,
    pub pool: Pool,
    pub tx_notify: mpsc::Sender<()>,
    pub rx_notify: mpsc::Receiver<()>,
}

/// Build a local committee of `n` nodes listening on consecutive ports
/// starting at `base_port`. The returned TempDirs back the stores and
/// must outlive the nodes.
pub fn committee_nodes(base_port: u16, n: usize) -> (Vec<TestNode>, Vec<tempfile::TempDir>) {
    let (committee, keypairs, shares) = local_committee_and_keys(base_port, n);
    let parameters = ConsensusParameters {
        sync_timeout: 200,
        ..ConsensusParameters::default()
    };
    let pool_parameters = PoolParameters {
        batch_size: 2,
        tx_size: 16,
        ..PoolParameters::default()
    };

    let mut nodes = Vec::new();
    let mut dirs = Vec::new();
    for (i, (keys, share)) in keypairs.into_iter().zip(shares).enumerate() {
        let name = i as NodeId;
        let dir = tempfile::tempdir().unwrap();
        let store = Store::new(dir.path()).unwrap();
        dirs.push(dir);
        let (tx_notify, rx_notify) = mpsc::channel(1_000);
        nodes.push(TestNode {
            name,
            committee: committee.clone(),
            parameters: parameters.clone(),
            signature_service: SignatureService::new(keys.private, share),
            store,
            pool: Pool::new(pool_parameters.clone(), n, name),
            tx_notify,
            rx_notify,
        });
    }
    (nodes, dirs)
}

/// Accepts (and holds) connections on a crashed node's port so the peer
/// synchronizer completes, without ever speaking the protocol.
#[allow(dead_code)]
pub fn silent_node(port: u16) {
    tokio::spawn(async move {
        let listener = tokio::net::TcpListener::bind(("127.0.0.1", port))
            .await
            .unwrap();
        let mut sockets = Vec::new();
        loop {
            if let Ok((socket, _)) = listener.accept().await {
                sockets.push(socket);
            }
        }
    });
}
