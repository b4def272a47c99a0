// Copyright (c) Mysten Labs, Inc.
// SPDX-License-Identifier: Apache-2.0

//! Length-framed TCP message plane: a best-effort sender keeping one
//! outbound connection per destination, and a receiver dispatching every
//! inbound frame to a handler.

mod receiver;
mod simple_sender;

pub use receiver::{MessageHandler, Receiver};
pub use simple_sender::SimpleSender;

#[cfg(test)]
#[path = "tests/common.rs"]
mod common;

#[cfg(test)]
#[path = "tests/simple_sender_tests.rs"]
mod simple_sender_tests;

#[cfg(test)]
#[path = "tests/receiver_tests.rs"]
mod receiver_tests;
