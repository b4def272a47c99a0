// Copyright (c) Mysten Labs, Inc.
// SPDX-License-Identifier: Apache-2.0

//! Bidirectional message plane of an engine: outbound messages fan out to
//! unicast or broadcast addresses through the network sender, inbound and
//! self-addressed messages land on one channel so a node handles its own
//! broadcasts exactly like peer messages.

use bytes::Bytes;
use config::{Committee, NodeId};
use network::{MessageHandler, Receiver as NetworkReceiver, SimpleSender};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fmt;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use tokio::sync::mpsc;
use tracing::warn;

use crate::error::{ConsensusError, ConsensusResult};

/// Bound on messages a protocol message enum must satisfy to cross the
/// wire and the loopback channel.
pub trait ProtocolMessage:
    Serialize + DeserializeOwned + fmt::Debug + Send + Sync + 'static
{
}

impl<M> ProtocolMessage for M where
    M: Serialize + DeserializeOwned + fmt::Debug + Send + Sync + 'static
{
}

/// An outbound message with its resolved destinations.
pub struct NetMessage<M>(pub M, pub Vec<SocketAddr>);

pub struct Transmitter<M> {
    committee: Committee,
    tx_network: mpsc::Sender<NetMessage<M>>,
    tx_loopback: mpsc::Sender<M>,
}

impl<M> Clone for Transmitter<M> {
    fn clone(&self) -> Self {
        Self {
            committee: self.committee.clone(),
            tx_network: self.tx_network.clone(),
            tx_loopback: self.tx_loopback.clone(),
        }
    }
}

impl<M: ProtocolMessage> Transmitter<M> {
    /// Returns the transmitter together with the outbound stream, which the
    /// caller hands to `NetworkForwarder::spawn` (or inspects in tests).
    pub fn new(
        committee: Committee,
        tx_loopback: mpsc::Sender<M>,
    ) -> (Self, mpsc::Receiver<NetMessage<M>>) {
        let (tx_network, rx_network) = mpsc::channel(1_000);
        (
            Self {
                committee,
                tx_network,
                tx_loopback,
            },
            rx_network,
        )
    }

    /// Send `message` to `to`, or to every peer except `from` when `to` is
    /// `None`. Best-effort: delivery failures are the network layer's to
    /// log, not ours to retry.
    pub async fn send(&self, from: NodeId, to: Option<NodeId>, message: M) -> ConsensusResult<()> {
        let addresses = match to {
            None => self.committee.broadcast_addresses(from),
            Some(to) => vec![self
                .committee
                .address(to)
                .ok_or(ConsensusError::UnknownAuthority(to))?],
        };
        if self
            .tx_network
            .send(NetMessage(message, addresses))
            .await
            .is_err()
        {
            warn!("Network sender task has stopped");
        }
        Ok(())
    }

    /// Push a self-generated message onto the inbound channel so our own
    /// handlers run on it exactly as on a peer message.
    pub async fn loopback(&self, message: M) {
        if self.tx_loopback.send(message).await.is_err() {
            warn!("Engine inbound channel has been dropped");
        }
    }
}

/// Task draining the outbound stream: serialize once, then fan out.
pub struct NetworkForwarder;

impl NetworkForwarder {
    pub fn spawn<M: ProtocolMessage>(mut rx_network: mpsc::Receiver<NetMessage<M>>) {
        tokio::spawn(async move {
            let mut sender = SimpleSender::new();
            while let Some(NetMessage(message, addresses)) = rx_network.recv().await {
                let serialized = match bincode::serialize(&message) {
                    Ok(bytes) => Bytes::from(bytes),
                    Err(e) => {
                        warn!("Failed to serialize outbound message: {}", e);
                        continue;
                    }
                };
                sender.broadcast(addresses, serialized).await;
            }
        });
    }
}

/// Network receiver handler deserializing every frame into the protocol
/// message type and forwarding it to the engine's inbound channel.
pub struct InboundHandler<M> {
    tx_inbound: mpsc::Sender<M>,
}

impl<M> InboundHandler<M> {
    pub fn new(tx_inbound: mpsc::Sender<M>) -> Self {
        Self { tx_inbound }
    }
}

impl<M> Clone for InboundHandler<M> {
    fn clone(&self) -> Self {
        Self {
            tx_inbound: self.tx_inbound.clone(),
        }
    }
}

#[async_trait::async_trait]
impl<M: ProtocolMessage> MessageHandler for InboundHandler<M> {
    async fn dispatch(&self, message: Bytes) {
        match bincode::deserialize::<M>(&message) {
            Ok(message) => {
                if self.tx_inbound.send(message).await.is_err() {
                    warn!("Engine inbound channel has been dropped");
                }
            }
            Err(e) => warn!("Failed to deserialize inbound message: {}", e),
        }
    }
}

/// Spawn the full network plane of an engine: the TCP receiver feeding the
/// inbound channel and the forwarder draining the outbound stream.
pub fn spawn_network<M: ProtocolMessage>(
    committee: &Committee,
    name: NodeId,
    tx_inbound: mpsc::Sender<M>,
    rx_network: mpsc::Receiver<NetMessage<M>>,
) -> ConsensusResult<()> {
    let address = committee
        .address(name)
        .ok_or(ConsensusError::UnknownAuthority(name))?;
    let listen = SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), address.port());
    NetworkReceiver::spawn(listen, InboundHandler::new(tx_inbound));
    NetworkForwarder::spawn(rx_network);
    Ok(())
}
