// Copyright (c) Mysten Labs, Inc.
// SPDX-License-Identifier: Apache-2.0

use config::{local_committee_and_keys, Committee, NodeId};
use crypto::{PublicKeySet, SignatureService};

/// A committee with live signature services, one per authority.
pub struct Fixture {
    pub committee: Committee,
    pub services: Vec<SignatureService>,
    pub pk_set: PublicKeySet,
}

impl Fixture {
    pub fn service(&self, node: NodeId) -> &SignatureService {
        &self.services[node as usize]
    }
}

/// Build a fixture of `n` authorities. Ports are never bound by unit
/// tests; any base works.
pub fn fixture(n: usize) -> Fixture {
    let (committee, keypairs, shares) = local_committee_and_keys(18_000, n);
    let pk_set = shares[0].pk_set().clone();
    let services = keypairs
        .into_iter()
        .zip(shares)
        .map(|(keys, share)| SignatureService::new(keys.private, share))
        .collect();
    Fixture {
        committee,
        services,
        pk_set,
    }
}
