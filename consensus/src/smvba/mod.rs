// Copyright (c) Mysten Labs, Inc.
// SPDX-License-Identifier: Apache-2.0

//! Speed-up MVBA: per round every node drives a two-phase provable
//! broadcast; a threshold coin elects the round leader after 2f+1 SPBs
//! complete, and a prevote/finvote fallback carries the leader's lock
//! into the next round when the leader cannot be finalized directly.

mod aggregator;
mod committor;
mod core;
mod elector;
mod messages;
mod spb;

pub use messages::{
    Block, ConsensusMessage, Done, ElectShare, FinVote, Finish, Halt, Prevote, SpbPhase,
    SpbProposal, SpbVote, VoteFlag,
};

#[cfg(test)]
#[path = "tests/aggregator_tests.rs"]
mod aggregator_tests;

#[cfg(test)]
#[path = "tests/committor_tests.rs"]
mod committor_tests;

#[cfg(test)]
#[path = "tests/elector_tests.rs"]
mod elector_tests;

#[cfg(test)]
#[path = "tests/messages_tests.rs"]
mod messages_tests;

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
    /// Wire the network plane, wait for the committee to come online and
    /// spawn the engine loop.
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
        info!("Protocol: SMVBA");

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
