// Copyright (c) Mysten Labs, Inc.
// SPDX-License-Identifier: Apache-2.0

use tokio::sync::{mpsc, oneshot};

use crate::{Digest, PublicKeySet, SecretKey, SecretShare, Signature, SignatureShare};

enum SigningCommand {
    Sign(Digest, oneshot::Sender<Signature>),
    SignShare(Digest, oneshot::Sender<SignatureShare>),
}

/// Clonable handle to a single signing task. Serializing all signing
/// requests through one worker keeps the secret keys in one place and
/// gives a stable ordering of signatures off the hot path.
#[derive(Clone)]
pub struct SignatureService {
    channel: mpsc::Sender<SigningCommand>,
    pk_set: PublicKeySet,
    share_index: usize,
}

impl SignatureService {
    pub fn new(secret: SecretKey, share: SecretShare) -> Self {
        let pk_set = share.pk_set().clone();
        let share_index = share.index;
        let (tx, mut rx): (mpsc::Sender<SigningCommand>, _) = mpsc::channel(100);
        tokio::spawn(async move {
            while let Some(command) = rx.recv().await {
                match command {
                    SigningCommand::Sign(digest, sender) => {
                        let _ = sender.send(secret.sign(&digest));
                    }
                    SigningCommand::SignShare(digest, sender) => {
                        let _ = sender.send(share.sign(&digest));
                    }
                }
            }
        });
        Self {
            channel: tx,
            pk_set,
            share_index,
        }
    }

    pub async fn request_signature(&self, digest: Digest) -> Signature {
        let (sender, receiver) = oneshot::channel();
        if self
            .channel
            .send(SigningCommand::Sign(digest, sender))
            .await
            .is_err()
        {
            panic!("failed to send message to signature service");
        }
        receiver
            .await
            .expect("failed to receive signature from signature service")
    }

    pub async fn request_signature_share(&self, digest: Digest) -> SignatureShare {
        let (sender, receiver) = oneshot::channel();
        if self
            .channel
            .send(SigningCommand::SignShare(digest, sender))
            .await
            .is_err()
        {
            panic!("failed to send message to signature service");
        }
        receiver
            .await
            .expect("failed to receive signature share from signature service")
    }

    /// Public material of the committee threshold key.
    pub fn pk_set(&self) -> &PublicKeySet {
        &self.pk_set
    }

    /// Index of this node's share in the key set.
    pub fn share_index(&self) -> usize {
        self.share_index
    }
}
