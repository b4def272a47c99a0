// Copyright (c) Mysten Labs, Inc.
// SPDX-License-Identifier: Apache-2.0

use super::messages::{Block, ConsensusMessage, SpbPhase, SpbProposal};
use crate::test_utils::fixture;
use crypto::Hash as _;
use mempool::Batch;

fn batch(id: u64, payload: u8) -> Batch {
    Batch {
        id,
        txs: vec![vec![payload; 16]],
    }
}

#[test]
fn block_digest_covers_identity_not_payload() {
    let one = Block::new(0, batch(7, 1), 3);
    let two = Block::new(0, batch(7, 2), 3);
    // Same (proposer, epoch, batch id): same digest despite different txs.
    assert_eq!(one.digest(), two.digest());

    let other_proposer = Block::new(1, batch(7, 1), 3);
    let other_epoch = Block::new(0, batch(7, 1), 4);
    let other_batch = Block::new(0, batch(8, 1), 3);
    assert_ne!(one.digest(), other_proposer.digest());
    assert_ne!(one.digest(), other_epoch.digest());
    assert_ne!(one.digest(), other_batch.digest());
}

#[test]
fn block_encoding_roundtrip() {
    let block = Block::new(2, batch(11, 9), 5);
    let decoded = Block::decode(&block.encode().unwrap()).unwrap();
    assert_eq!(decoded.digest(), block.digest());
    assert_eq!(decoded.proposer, block.proposer);
    assert_eq!(decoded.epoch, block.epoch);
    assert_eq!(decoded.batch.id, block.batch.id);
}

#[tokio::test]
async fn proposal_signature_verifies() {
    let fixture = fixture(4);
    let block = Block::new(1, batch(1, 0), 0);
    let proposal = SpbProposal::new(
        1,
        Some(block),
        0,
        0,
        SpbPhase::One,
        fixture.service(1),
    )
    .await;
    assert!(proposal.verify(&fixture.committee).is_ok());

    // Tampering with a signed field invalidates the message.
    let mut tampered = proposal.clone();
    tampered.epoch = 1;
    assert!(tampered.verify(&fixture.committee).is_err());

    // So does claiming another author.
    let mut tampered = proposal;
    tampered.author = 2;
    assert!(tampered.verify(&fixture.committee).is_err());
}

#[tokio::test]
async fn wire_roundtrip() {
    let fixture = fixture(4);
    let block = Block::new(3, batch(3, 0), 2);
    let proposal = SpbProposal::new(
        3,
        Some(block),
        2,
        1,
        SpbPhase::One,
        fixture.service(3),
    )
    .await;
    let message = ConsensusMessage::SpbPropose(proposal);

    let bytes = bincode::serialize(&message).unwrap();
    let decoded: ConsensusMessage = bincode::deserialize(&bytes).unwrap();
    match decoded {
        ConsensusMessage::SpbPropose(decoded) => {
            assert!(decoded.verify(&fixture.committee).is_ok());
            assert_eq!(decoded.round, 1);
        }
        _ => panic!("wrong message kind after roundtrip"),
    }
}
