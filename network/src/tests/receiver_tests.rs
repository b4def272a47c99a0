// Copyright (c) Mysten Labs, Inc.
// SPDX-License-Identifier: Apache-2.0

use super::*;
use async_trait::async_trait;
use bytes::Bytes;
use futures::sink::SinkExt as _;
use std::net::SocketAddr;
use tokio::net::TcpStream;
use tokio::sync::mpsc::{channel, Sender};
use tokio_util::codec::{Framed, LengthDelimitedCodec};

#[derive(Clone)]
struct TestHandler {
    deliver: Sender<String>,
}

#[async_trait]
impl MessageHandler for TestHandler {
    async fn dispatch(&self, message: Bytes) {
        let message = String::from_utf8(message.to_vec()).unwrap();
        self.deliver.send(message).await.unwrap();
    }
}

#[tokio::test]
async fn receive() {
    // Make the network receiver.
    let address = "127.0.0.1:6300".parse::<SocketAddr>().unwrap();
    let (tx, mut rx) = channel(1);
    Receiver::spawn(address, TestHandler { deliver: tx });
    tokio::task::yield_now().await;

    // Send a message.
    let sent = "Hello, world!";
    let stream = TcpStream::connect(address).await.unwrap();
    let mut transport = Framed::new(stream, LengthDelimitedCodec::new());
    transport.send(Bytes::from(sent)).await.unwrap();

    // Ensure the message gets dispatched to the handler.
    let received = rx.recv().await.unwrap();
    assert_eq!(received, sent);
}
