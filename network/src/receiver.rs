// Copyright (c) Mysten Labs, Inc.
// SPDX-License-Identifier: Apache-2.0

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::StreamExt as _;
use std::net::SocketAddr;
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;
use tokio_util::codec::{Framed, LengthDelimitedCodec};
use tracing::{debug, info, warn};

/// Called with every inbound frame. Implementors deserialize and forward
/// to the component interested in the message.
#[async_trait]
pub trait MessageHandler: Clone + Send + Sync + 'static {
    async fn dispatch(&self, message: Bytes);
}

/// Binds a TCP address and feeds every frame of every incoming connection
/// to the provided handler.
pub struct Receiver;

impl Receiver {
    pub fn spawn<Handler: MessageHandler>(
        address: SocketAddr,
        handler: Handler,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            let listener = TcpListener::bind(&address)
                .await
                .unwrap_or_else(|e| panic!("failed to bind TCP address {address}: {e}"));
            debug!("Listening on {}", address);
            loop {
                let (socket, peer) = match listener.accept().await {
                    Ok(value) => value,
                    Err(e) => {
                        warn!("Failed to accept connection: {}", e);
                        continue;
                    }
                };
                info!("Incoming connection established with {}", peer);
                Self::spawn_runner(socket, peer, handler.clone());
            }
        })
    }

    fn spawn_runner<Handler: MessageHandler>(socket: TcpStream, peer: SocketAddr, handler: Handler) {
        tokio::spawn(async move {
            let mut reader = Framed::new(socket, LengthDelimitedCodec::new());
            while let Some(frame) = reader.next().await {
                match frame {
                    Ok(message) => handler.dispatch(message.freeze()).await,
                    Err(e) => {
                        warn!("Failed to receive from {}: {}", peer, e);
                        return;
                    }
                }
            }
            debug!("Connection closed by {}", peer);
        });
    }
}
