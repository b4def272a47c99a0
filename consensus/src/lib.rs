// Copyright (c) Mysten Labs, Inc.
// SPDX-License-Identifier: Apache-2.0

//! Four interchangeable asynchronous BFT consensus engines sharing one
//! transport, signature service, block store and transaction pool:
//!
//! - `mvba`: N parallel consistent broadcasts per epoch, leader election
//!   by threshold coin and binary agreement on the elected leader.
//! - `smvba`: speed-up MVBA built on two-phase provable broadcast with a
//!   prevote/finvote fallback.
//! - `parmvba`: smvba with block references resolving the proposals of
//!   the losing proposers.
//! - `vaba`: validated agreement driven by four-phase promotions.

pub mod error;
#[cfg(test)]
mod test_utils;
pub mod mvba;
pub mod parmvba;
pub mod smvba;
pub mod synchronizer;
pub mod transmitter;
pub mod vaba;

pub use error::{ConsensusError, ConsensusResult};
