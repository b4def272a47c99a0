// Copyright (c) Mysten Labs, Inc.
// SPDX-License-Identifier: Apache-2.0

//! ParMVBA (Mercury): the speed-up MVBA flow where every block carries
//! references to the SPBs that completed in the committed round, so the
//! payloads of losing proposers are delivered instead of discarded.

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
#[path = "tests/committor_tests.rs"]
mod committor_tests;

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
        info!("Protocol: ParMVBA");

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
