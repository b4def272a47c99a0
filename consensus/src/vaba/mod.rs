// Copyright (c) Mysten Labs, Inc.
// SPDX-License-Identifier: Apache-2.0

//! VABA: every node drives its block through a four-phase promotion; once
//! 2f+1 promotions complete the committee skips to electing a leader, and
//! view changes over the leader's key/lock/commit evidence decide the
//! epoch.

mod aggregator;
mod committor;
mod core;
mod elector;
mod messages;
mod promote;

pub use messages::{
    Block, ConsensusMessage, Done, ElectShare, Halt, PromotePhase, Proposal, Skip, SkipShare,
    ViewChange, Vote,
};

#[cfg(test)]
#[path = "tests/promote_tests.rs"]
mod promote_tests;

#[cfg(test)]
#[path = "tests/aggregator_tests.rs"]
mod aggregator_tests;

use config::{Committee, ConsensusParameters, NodeId};
use crypto::SignatureService;
use mempool::Pool;
use store::Store;
use tokio::sync::mpsc;
use tracing::info;

use crate::error::ConsensusResult;
use crate::synchronizer;
use crate::transmitter::{spawn_network, Transmitter};

pub struct Consensus;

impl Consensus {
    pub async fn spawn(
        name: NodeId,
        committee: Committee,
        parameters: ConsensusParameters,
        signature_service: SignatureService,
        store: Store,
        pool: Pool,
        tx_notify: mpsc::Sender<()>,
    ) -> ConsensusResult<()> {
        info!("Consensus node id: {}", name);
        info!(
            "Consensus DDoS: {}, faults: {}",
            parameters.ddos, parameters.faults
        );
        info!("Protocol: VABA");

        let (tx_inbound, rx_inbound) = mpsc::channel(1_000);
        let (transmitter, rx_network) = Transmitter::new(committee.clone(), tx_inbound.clone());
        spawn_network(&committee, name, tx_inbound, rx_network)?;

        synchronizer::await_peers(name, &committee, parameters.sync_timeout).await;

        let mut core = core::Core::new(
            name,
            committee,
            parameters,
            signature_service,
            store,
            pool,
            transmitter,
            rx_inbound,
            tx_notify,
        );
        tokio::spawn(async move { core.run().await });
        Ok(())
    }
}
