// Copyright (c) Mysten Labs, Inc.
// SPDX-License-Identifier: Apache-2.0

use bytes::Bytes;
use futures::sink::SinkExt as _;
use std::collections::HashMap;
use std::net::SocketAddr;
use tokio::net::TcpStream;
use tokio::sync::mpsc::{channel, Receiver, Sender};
use tokio_util::codec::{Framed, LengthDelimitedCodec};
use tracing::{info, warn};

/// Best-effort sender: one outbound connection per destination, created on
/// first use and re-dialed on the next message after a failure. Messages
/// addressed to an unreachable peer are dropped; the protocols above
/// recover through other peers' re-broadcasts.
pub struct SimpleSender {
    /// One delivery queue per destination.
    connections: HashMap<SocketAddr, Sender<Bytes>>,
}

impl Default for SimpleSender {
    fn default() -> Self {
        Self::new()
    }
}

impl SimpleSender {
    pub fn new() -> Self {
        Self {
            connections: HashMap::new(),
        }
    }

    fn spawn_connection(address: SocketAddr) -> Sender<Bytes> {
        let (tx, rx) = channel(1_000);
        Connection::spawn(address, rx);
        tx
    }

    /// Try to deliver `data` to `address`.
    pub async fn send(&mut self, address: SocketAddr, data: Bytes) {
        let connection = self
            .connections
            .entry(address)
            .or_insert_with(|| Self::spawn_connection(address));

        // A dropped receiver means the connection task exited; respawn it.
        if connection.send(data.clone()).await.is_err() {
            let connection = Self::spawn_connection(address);
            let _ = connection.send(data).await;
            self.connections.insert(address, connection);
        }
    }

    /// Try to deliver `data` to every address.
    pub async fn broadcast(&mut self, addresses: Vec<SocketAddr>, data: Bytes) {
        for address in addresses {
            self.send(address, data.clone()).await;
        }
    }
}

struct Connection {
    address: SocketAddr,
    receiver: Receiver<Bytes>,
}

impl Connection {
    fn spawn(address: SocketAddr, receiver: Receiver<Bytes>) {
        tokio::spawn(async move {
            Self { address, receiver }.run().await;
        });
    }

    async fn run(&mut self) {
        let mut writer = None;
        while let Some(data) = self.receiver.recv().await {
            if writer.is_none() {
                match TcpStream::connect(self.address).await {
                    Ok(stream) => {
                        info!("Outgoing connection established with {}", self.address);
                        writer = Some(Framed::new(stream, LengthDelimitedCodec::new()));
                    }
                    Err(e) => {
                        warn!("Failed to connect to {}: {}", self.address, e);
                        continue;
                    }
                }
            }
            if let Some(stream) = writer.as_mut() {
                if let Err(e) = stream.send(data).await {
                    warn!("Failed to send message to {}: {}", self.address, e);
                    writer = None;
                }
            }
        }
    }
}
