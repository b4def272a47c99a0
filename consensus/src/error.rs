// Copyright (c) Mysten Labs, Inc.
// SPDX-License-Identifier: Apache-2.0

use config::{Epoch, NodeId, Round};

pub type ConsensusResult<T> = Result<T, ConsensusError>;

#[derive(Debug, thiserror::Error)]
pub enum ConsensusError {
    #[error("{kind} message signature verification failed, epoch {epoch} node {author}")]
    InvalidSignature {
        kind: &'static str,
        epoch: Epoch,
        author: NodeId,
    },

    #[error("received one more {kind} message, epoch {epoch} round {round} node {author}")]
    OneMoreMessage {
        kind: &'static str,
        epoch: Epoch,
        round: Round,
        author: NodeId,
    },

    #[error("node {0} is not in the committee")]
    UnknownAuthority(NodeId),

    #[error(transparent)]
    StoreError(#[from] store::StoreError),

    #[error("serialization failure: {0}")]
    SerializationError(#[from] Box<bincode::ErrorKind>),

    #[error(transparent)]
    CryptoError(#[from] crypto::CryptoError),
}
