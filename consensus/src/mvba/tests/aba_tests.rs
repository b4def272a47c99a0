// Copyright (c) Mysten Labs, Inc.
// SPDX-License-Identifier: Apache-2.0

use super::aba::Aba;
use super::messages::{AbaHalt, AbaMux, AbaVal, CoinShare, ConsensusMessage};
use crate::error::ConsensusError;
use crate::test_utils::{fixture, Fixture};
use crate::transmitter::{NetMessage, Transmitter};
use tokio::sync::mpsc;

struct AbaHarness {
    aba: Aba,
    rx_network: mpsc::Receiver<NetMessage<ConsensusMessage>>,
    rx_loopback: mpsc::Receiver<ConsensusMessage>,
}

fn harness(fixture: &Fixture, leader: u32) -> AbaHarness {
    let (tx_loopback, rx_loopback) = mpsc::channel(100);
    let (transmitter, rx_network) = Transmitter::new(fixture.committee.clone(), tx_loopback);
    let aba = Aba::new(
        0,
        fixture.committee.clone(),
        fixture.pk_set.clone(),
        fixture.service(0).clone(),
        transmitter,
        0,
        0,
        leader,
    );
    AbaHarness {
        aba,
        rx_network,
        rx_loopback,
    }
}

fn drain(harness: &mut AbaHarness) -> Vec<ConsensusMessage> {
    let mut messages = Vec::new();
    while let Ok(NetMessage(message, _)) = harness.rx_network.try_recv() {
        messages.push(message);
    }
    while harness.rx_loopback.try_recv().is_ok() {}
    messages
}

#[tokio::test]
async fn halt_before_any_val() {
    let fixture = fixture(4);
    let mut harness = harness(&fixture, 1);

    // A halt with no prior state: latch, amplify, report upward.
    let halt = AbaHalt::new(2, 1, 0, 0, true, fixture.service(2)).await;
    let output = harness.aba.handle_halt(halt).await.unwrap().unwrap();
    assert!(output.flag);
    assert_eq!(output.leader, 1);

    // The amplification went out.
    let rebroadcast = drain(&mut harness);
    assert!(matches!(
        rebroadcast.as_slice(),
        [ConsensusMessage::AbaHalt(_)]
    ));

    // Once halted, further halts report nothing.
    let halt = AbaHalt::new(3, 1, 0, 0, true, fixture.service(3)).await;
    assert!(harness.aba.handle_halt(halt).await.unwrap().is_none());

    // And later vals are ignored without error.
    let val = AbaVal::new(1, 1, 0, 0, 0, true, fixture.service(1)).await;
    assert!(harness.aba.handle_val(val).await.is_ok());
    assert!(drain(&mut harness).is_empty());
}

#[tokio::test]
async fn val_amplification_at_validity_threshold() {
    let fixture = fixture(4);
    let mut harness = harness(&fixture, 1);

    // One val: nothing yet.
    let val = AbaVal::new(1, 1, 0, 0, 0, true, fixture.service(1)).await;
    harness.aba.handle_val(val).await.unwrap();
    assert!(drain(&mut harness).is_empty());

    // f+1 vals for a value we never voted: we echo it.
    let val = AbaVal::new(2, 1, 0, 0, 0, true, fixture.service(2)).await;
    harness.aba.handle_val(val).await.unwrap();
    let sent = drain(&mut harness);
    assert!(matches!(sent.as_slice(), [ConsensusMessage::AbaVal(v)] if v.flag));
}

#[tokio::test]
async fn duplicate_val_is_rejected() {
    let fixture = fixture(4);
    let mut harness = harness(&fixture, 1);

    let val = AbaVal::new(1, 1, 0, 0, 0, true, fixture.service(1)).await;
    harness.aba.handle_val(val.clone()).await.unwrap();
    match harness.aba.handle_val(val).await {
        Err(ConsensusError::OneMoreMessage { author: 1, .. }) => (),
        result => panic!("unexpected result {result:?}"),
    }
}

#[tokio::test]
async fn unanimous_yes_reaches_the_coin() {
    let fixture = fixture(4);
    let mut harness = harness(&fixture, 1);

    harness.aba.invoke(true).await.unwrap();
    let sent = drain(&mut harness);
    assert!(matches!(sent.as_slice(), [ConsensusMessage::AbaVal(_)]));

    // Quorum of vals (including our own echoed back) releases our mux.
    for node in 0..3u32 {
        let val = AbaVal::new(node, 1, 0, 0, 0, true, fixture.service(node)).await;
        harness.aba.handle_val(val).await.unwrap();
    }
    let sent = drain(&mut harness);
    assert!(matches!(sent.as_slice(), [ConsensusMessage::AbaMux(_)]));

    // Quorum of muxes latches the YES flag and releases our coin share.
    for node in 0..3u32 {
        let mux = AbaMux::new(node, 1, 0, 0, 0, true, fixture.service(node)).await;
        harness.aba.handle_mux(mux).await.unwrap();
    }
    let sent = drain(&mut harness);
    assert!(matches!(sent.as_slice(), [ConsensusMessage::CoinShare(_)]));

    // Combine the coin in the test to know which way it falls.
    let digest = CoinShare::coin_digest(0, 0, 0);
    let shares: Vec<_> = (0..3usize)
        .map(|i| {
            (
                i,
                fixture.service(i as u32).clone(),
            )
        })
        .collect();
    let mut sig_shares = Vec::new();
    for (i, service) in &shares {
        sig_shares.push((*i, service.request_signature_share(digest).await));
    }
    let combined = crypto::combine_shares(
        &fixture.pk_set,
        sig_shares.iter().map(|(i, s)| (*i, s)),
    )
    .unwrap();
    let coin = combined.parity();

    // Feed 2f+1 coin shares.
    for node in 0..3u32 {
        let share = CoinShare::new(node, 0, 0, 0, fixture.service(node)).await;
        harness.aba.handle_coin_share(share).await.unwrap();
    }
    let sent = drain(&mut harness);
    if coin {
        // Single flag matching the coin: halt.
        assert!(matches!(sent.as_slice(), [ConsensusMessage::AbaHalt(h)] if h.flag));
    } else {
        // Single flag disagreeing with the coin: next round keeps YES.
        assert!(
            matches!(sent.as_slice(), [ConsensusMessage::AbaVal(v)] if v.flag && v.in_round == 1)
        );
    }
}
