// Copyright (c) Mysten Labs, Inc.
// SPDX-License-Identifier: Apache-2.0

//! MVBA: every node consistently broadcasts its block and a commitment
//! bit-vector, a threshold coin elects a leader sequence, and a binary
//! agreement per elected leader decides whether that leader's block is
//! the epoch's output.

mod aba;
mod aggregator;
mod cbc;
mod committor;
mod core;
mod elector;
mod messages;

pub use messages::{
    AbaHalt, AbaMux, AbaVal, Block, CbcTag, CoinShare, Commitment, ConsensusMessage, ElectShare,
    Final, Proposal, Ready, Vote, VoteFlag,
};

#[cfg(test)]
#[path = "tests/aba_tests.rs"]
mod aba_tests;

#[cfg(test)]
#[path = "tests/aggregator_tests.rs"]
mod aggregator_tests;

#[cfg(test)]
#[path = "tests/elector_tests.rs"]
mod elector_tests;

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
        info!("Protocol: MVBA");

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
