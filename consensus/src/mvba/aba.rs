// Copyright (c) Mysten Labs, Inc.
// SPDX-License-Identifier: Apache-2.0

//! Asynchronous binary agreement on one bit per (epoch, external round):
//! "did the elected leader's data CBC complete?". Multi-round val/mux
//! exchange, then a threshold coin; termination with probability one. All
//! state mutations happen on the engine task.

use config::{Committee, Epoch, NodeId, Round};
use crypto::{combine_shares, PublicKeySet, SignatureService, SignatureShare};
use std::collections::{HashMap, HashSet};
use tracing::debug;

use super::messages::{AbaHalt, AbaMux, AbaVal, CoinShare, ConsensusMessage};
use crate::error::{ConsensusError, ConsensusResult};
use crate::transmitter::Transmitter;

/// Reported upward when the agreement halts.
#[derive(Debug, Clone, Copy)]
pub struct AbaOutput {
    pub leader: NodeId,
    pub flag: bool,
}

#[derive(Default)]
struct RoundState {
    val_authors: HashMap<bool, HashSet<NodeId>>,
    mux_authors: HashMap<bool, HashSet<NodeId>>,
    val_sent: HashSet<bool>,
    mux_sent: bool,
    yes_flag: bool,
    no_flag: bool,
    mux_final: bool,
    coin_authors: Vec<NodeId>,
    coin_shares: Vec<SignatureShare>,
    coin_done: bool,
}

impl RoundState {
    fn val_count(&self, flag: bool) -> usize {
        self.val_authors.get(&flag).map_or(0, |a| a.len())
    }

    fn mux_count(&self, flag: bool) -> usize {
        self.mux_authors.get(&flag).map_or(0, |a| a.len())
    }
}

pub struct Aba {
    name: NodeId,
    committee: Committee,
    pk_set: PublicKeySet,
    signature_service: SignatureService,
    transmitter: Transmitter<ConsensusMessage>,
    epoch: Epoch,
    round: Round,
    leader: NodeId,
    rounds: HashMap<Round, RoundState>,
    halted: bool,
}

impl Aba {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        name: NodeId,
        committee: Committee,
        pk_set: PublicKeySet,
        signature_service: SignatureService,
        transmitter: Transmitter<ConsensusMessage>,
        epoch: Epoch,
        round: Round,
        leader: NodeId,
    ) -> Self {
        Self {
            name,
            committee,
            pk_set,
            signature_service,
            transmitter,
            epoch,
            round,
            leader,
            rounds: HashMap::new(),
            halted: false,
        }
    }

    /// Pin the agreement to the locally elected leader. Messages may
    /// carry a leader hint, but only the election output is trusted.
    pub fn set_leader(&mut self, leader: NodeId) {
        self.leader = leader;
    }

    /// Enter the agreement with our input bit.
    pub async fn invoke(&mut self, input: bool) -> ConsensusResult<()> {
        self.send_val(0, input).await
    }

    pub async fn handle_val(&mut self, val: AbaVal) -> ConsensusResult<()> {
        if self.halted {
            return Ok(());
        }
        let state = self.rounds.entry(val.in_round).or_default();
        if !state.val_authors.entry(val.flag).or_default().insert(val.author) {
            return Err(ConsensusError::OneMoreMessage {
                kind: "aba-val",
                epoch: val.epoch,
                round: val.round,
                author: val.author,
            });
        }
        let count = state.val_count(val.flag);

        // f+1 vals for a value we have not voted: amplify it.
        if count == self.committee.validity_threshold()
            && !state.val_sent.contains(&val.flag)
        {
            self.send_val(val.in_round, val.flag).await?;
        }

        // 2f+1 vals: the value is admissible, feed it to the mux step.
        let state = self.rounds.entry(val.in_round).or_default();
        if state.val_count(val.flag) == self.committee.quorum_threshold() && !state.mux_sent {
            state.mux_sent = true;
            let mux = AbaMux::new(
                self.name,
                self.leader,
                self.epoch,
                self.round,
                val.in_round,
                val.flag,
                &self.signature_service,
            )
            .await;
            self.broadcast(ConsensusMessage::AbaMux(mux)).await;
        }

        self.try_coin_share(val.in_round).await
    }

    pub async fn handle_mux(&mut self, mux: AbaMux) -> ConsensusResult<()> {
        if self.halted {
            return Ok(());
        }
        let state = self.rounds.entry(mux.in_round).or_default();
        if !state.mux_authors.entry(mux.flag).or_default().insert(mux.author) {
            return Err(ConsensusError::OneMoreMessage {
                kind: "aba-mux",
                epoch: mux.epoch,
                round: mux.round,
                author: mux.author,
            });
        }
        self.try_coin_share(mux.in_round).await
    }

    /// Once 2f+1 muxes arrived, evaluate which values are supported by
    /// both 2f+1 vals and the muxes, latch the flags and release our coin
    /// share. Fires at most once per inner round.
    async fn try_coin_share(&mut self, in_round: Round) -> ConsensusResult<()> {
        let quorum = self.committee.quorum_threshold();
        let state = self.rounds.entry(in_round).or_default();
        if state.mux_final {
            return Ok(());
        }
        if state.mux_count(true) + state.mux_count(false) < quorum {
            return Ok(());
        }

        let val_yes = state.val_count(true);
        let val_no = state.val_count(false);
        let mux_yes = state.mux_count(true);
        let mux_no = state.mux_count(false);

        if val_yes >= quorum && val_no >= quorum {
            if mux_yes > 0 {
                state.yes_flag = true;
            }
            if mux_no > 0 {
                state.no_flag = true;
            }
        } else if val_yes >= quorum && mux_yes >= quorum {
            state.yes_flag = true;
        } else if val_no >= quorum && mux_no >= quorum {
            state.no_flag = true;
        }

        if !(state.yes_flag || state.no_flag) {
            return Ok(());
        }
        state.mux_final = true;

        let share = CoinShare::new(
            self.name,
            self.epoch,
            self.round,
            in_round,
            &self.signature_service,
        )
        .await;
        self.broadcast(ConsensusMessage::CoinShare(share)).await;
        Ok(())
    }

    pub async fn handle_coin_share(&mut self, share: CoinShare) -> ConsensusResult<()> {
        if self.halted {
            return Ok(());
        }
        let state = self.rounds.entry(share.in_round).or_default();
        if state.coin_authors.contains(&share.author) {
            return Err(ConsensusError::OneMoreMessage {
                kind: "coin-share",
                epoch: share.epoch,
                round: share.round,
                author: share.author,
            });
        }
        state.coin_authors.push(share.author);
        state.coin_shares.push(share.share);
        if state.coin_done || state.coin_shares.len() != self.committee.quorum_threshold() {
            return Ok(());
        }
        state.coin_done = true;

        let combined = combine_shares(
            &self.pk_set,
            state
                .coin_authors
                .iter()
                .map(|a| *a as usize)
                .zip(state.coin_shares.iter()),
        )?;
        let coin = combined.parity();
        debug!(
            "Epoch {} round {} in-round {} coin {}",
            self.epoch, self.round, share.in_round, coin
        );

        let (yes, no) = (state.yes_flag, state.no_flag);
        if yes != no {
            // Exactly one admissible value.
            let flag = yes;
            if flag == coin {
                let halt = AbaHalt::new(
                    self.name,
                    self.leader,
                    self.epoch,
                    self.round,
                    flag,
                    &self.signature_service,
                )
                .await;
                self.broadcast(ConsensusMessage::AbaHalt(halt)).await;
            } else {
                self.send_val(share.in_round + 1, flag).await?;
            }
        } else {
            // Both or neither: enter the next round with the coin value.
            self.send_val(share.in_round + 1, coin).await?;
        }
        Ok(())
    }

    /// Any halt while not halted: latch, amplify, report upward. Later
    /// messages of this agreement are ignored.
    pub async fn handle_halt(&mut self, halt: AbaHalt) -> ConsensusResult<Option<AbaOutput>> {
        if self.halted {
            return Ok(None);
        }
        self.halted = true;
        let amplified = AbaHalt::new(
            self.name,
            halt.leader,
            self.epoch,
            self.round,
            halt.flag,
            &self.signature_service,
        )
        .await;
        let message = ConsensusMessage::AbaHalt(amplified);
        let _ = self.transmitter.send(self.name, None, message).await;
        Ok(Some(AbaOutput {
            leader: halt.leader,
            flag: halt.flag,
        }))
    }

    async fn send_val(&mut self, in_round: Round, flag: bool) -> ConsensusResult<()> {
        let state = self.rounds.entry(in_round).or_default();
        if !state.val_sent.insert(flag) {
            return Ok(());
        }
        let val = AbaVal::new(
            self.name,
            self.leader,
            self.epoch,
            self.round,
            in_round,
            flag,
            &self.signature_service,
        )
        .await;
        self.broadcast(ConsensusMessage::AbaVal(val)).await;
        Ok(())
    }

    async fn broadcast(&self, message: ConsensusMessage) {
        let _ = self.transmitter.send(self.name, None, message.clone()).await;
        self.transmitter.loopback(message).await;
    }
}
