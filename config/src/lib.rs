// Copyright (c) Mysten Labs, Inc.
// SPDX-License-Identifier: Apache-2.0

//! Static configuration of a consensus authority: the committee, the
//! operational parameters and the JSON artifacts they are loaded from.

use crypto::{PublicKey, SecretKey, SecretShare};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::{self, OpenOptions};
use std::io::{BufWriter, Write as _};
use std::net::SocketAddr;

#[cfg(test)]
#[path = "tests/config_tests.rs"]
mod config_tests;

/// Each authority is uniquely identified by its NodeId in the committee.
/// NodeId is between 0 (inclusive) and the committee size (exclusive).
pub type NodeId = u32;

/// The outer index of the committed sequence; one block per epoch.
pub type Epoch = u64;

/// Retry index within an epoch until a leader can be finalized.
pub type Round = u64;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file '{file}': {message}")]
    ImportError { file: String, message: String },

    #[error("failed to write config file '{file}': {message}")]
    ExportError { file: String, message: String },

    #[error("malformed threshold key file: {0}")]
    MalformedThresholdKeys(String),
}

pub trait Import: DeserializeOwned {
    fn import(path: &str) -> Result<Self, ConfigError> {
        let reader = || -> Result<Self, std::io::Error> {
            let data = fs::read(path)?;
            Ok(serde_json::from_slice(data.as_slice())?)
        };
        reader().map_err(|e| ConfigError::ImportError {
            file: path.to_string(),
            message: e.to_string(),
        })
    }
}

pub trait Export: Serialize {
    fn export(&self, path: &str) -> Result<(), ConfigError> {
        let writer = || -> Result<(), std::io::Error> {
            let file = OpenOptions::new().create(true).write(true).open(path)?;
            let mut writer = BufWriter::new(file);
            let data = serde_json::to_string_pretty(self)?;
            writer.write_all(data.as_ref())?;
            writer.write_all(b"\n")?;
            Ok(())
        };
        writer().map_err(|e| ConfigError::ExportError {
            file: path.to_string(),
            message: e.to_string(),
        })
    }
}

/// Network information and identity of one authority in the committee.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Authority {
    /// The authority's ED25519 public key, used to verify its messages.
    pub name: PublicKey,
    pub node_id: NodeId,
    /// Network address the authority listens on.
    pub addr: SocketAddr,
}

/// The fixed set of authorities participating in the protocol.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Committee {
    pub authorities: BTreeMap<NodeId, Authority>,
}

impl Import for Committee {}
impl Export for Committee {}

impl Committee {
    pub fn new(authorities: BTreeMap<NodeId, Authority>) -> Self {
        Self { authorities }
    }

    /// Returns the number of authorities.
    pub fn size(&self) -> usize {
        self.authorities.len()
    }

    /// The quorum threshold 2f+1, where f = (N-1)/3.
    pub fn quorum_threshold(&self) -> usize {
        let n = self.size();
        2 * ((n - 1) / 3) + 1
    }

    /// The validity threshold f+1, where f = (N-1)/3.
    pub fn validity_threshold(&self) -> usize {
        let n = self.size();
        (n - 1) / 3 + 1
    }

    /// Public key of the given authority.
    pub fn name(&self, id: NodeId) -> Option<&PublicKey> {
        self.authorities.get(&id).map(|a| &a.name)
    }

    /// NodeId bound to the given public key.
    pub fn id(&self, name: &PublicKey) -> Option<NodeId> {
        self.authorities
            .iter()
            .find(|(_, a)| &a.name == name)
            .map(|(id, _)| *id)
    }

    /// Network address of the given authority.
    pub fn address(&self, id: NodeId) -> Option<SocketAddr> {
        self.authorities.get(&id).map(|a| a.addr)
    }

    /// Addresses of every authority except `id`.
    pub fn broadcast_addresses(&self, id: NodeId) -> Vec<SocketAddr> {
        self.authorities
            .values()
            .filter(|a| a.node_id != id)
            .map(|a| a.addr)
            .collect()
    }
}

/// Operational parameters of the transaction pool.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PoolParameters {
    /// Input rate of fabricated transactions, tx/s.
    #[serde(default = "PoolParameters::default_rate")]
    pub rate: u64,
    /// Size of a single transaction, in bytes.
    #[serde(default = "PoolParameters::default_tx_size")]
    pub tx_size: usize,
    /// Max number of transactions a batch can hold.
    #[serde(default = "PoolParameters::default_batch_size")]
    pub batch_size: usize,
    /// Capacity of the pending-transaction queue.
    #[serde(default = "PoolParameters::default_max_queue_size")]
    pub max_queue_size: usize,
}

impl PoolParameters {
    fn default_rate() -> u64 {
        1_000
    }
    fn default_tx_size() -> usize {
        16
    }
    fn default_batch_size() -> usize {
        200
    }
    fn default_max_queue_size() -> usize {
        10_000
    }
}

impl Default for PoolParameters {
    fn default() -> Self {
        Self {
            rate: Self::default_rate(),
            tx_size: Self::default_tx_size(),
            batch_size: Self::default_batch_size(),
            max_queue_size: Self::default_max_queue_size(),
        }
    }
}

/// The consensus engine selected at boot.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Protocol {
    Mvba,
    Smvba,
    Vaba,
    ParMvba,
}

impl TryFrom<u8> for Protocol {
    type Error = ConfigError;

    fn try_from(tag: u8) -> Result<Self, ConfigError> {
        match tag {
            0 => Ok(Self::Mvba),
            1 => Ok(Self::Smvba),
            2 => Ok(Self::Vaba),
            3 => Ok(Self::ParMvba),
            _ => Err(ConfigError::ImportError {
                file: "parameters".to_string(),
                message: format!("unknown protocol tag {tag}"),
            }),
        }
    }
}

/// Operational parameters of the consensus engine. All fields tolerate
/// inconsistencies among authorities without affecting safety.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ConsensusParameters {
    /// Time to wait at boot for all peers to come online, in ms.
    #[serde(default = "ConsensusParameters::default_sync_timeout")]
    pub sync_timeout: u64,
    /// Assumed one-way network delay, in ms.
    #[serde(default = "ConsensusParameters::default_network_delay")]
    pub network_delay: u64,
    /// Minimum delay between two own proposals, in ms.
    #[serde(default)]
    pub min_block_delay: u64,
    /// Simulate a DDoS adversary delaying proposals.
    #[serde(default)]
    pub ddos: bool,
    /// Number of nodes instructed to play dead.
    #[serde(default)]
    pub faults: usize,
    /// Delay before re-dialing an unreachable peer, in ms.
    #[serde(default = "ConsensusParameters::default_retry_delay")]
    pub retry_delay: u64,
    /// Engine selector: 0=MVBA, 1=SMVBA, 2=VABA, 3=ParMVBA.
    #[serde(default)]
    pub protocol: u8,
}

impl ConsensusParameters {
    fn default_sync_timeout() -> u64 {
        500
    }
    fn default_network_delay() -> u64 {
        2_000
    }
    fn default_retry_delay() -> u64 {
        5_000
    }
}

impl Default for ConsensusParameters {
    fn default() -> Self {
        Self {
            sync_timeout: Self::default_sync_timeout(),
            network_delay: Self::default_network_delay(),
            min_block_delay: 0,
            ddos: false,
            faults: 0,
            retry_delay: Self::default_retry_delay(),
            protocol: 0,
        }
    }
}

/// The on-disk parameters artifact.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Parameters {
    #[serde(default)]
    pub pool: PoolParameters,
    #[serde(default)]
    pub consensus: ConsensusParameters,
}

impl Import for Parameters {}
impl Export for Parameters {}

/// The node key file: one ED25519 keypair, hex encoded.
#[derive(Serialize, Deserialize)]
pub struct KeyPair {
    pub public: PublicKey,
    pub private: SecretKey,
}

impl Import for KeyPair {}
impl Export for KeyPair {}

impl KeyPair {
    pub fn generate() -> Self {
        let (public, private) = crypto::generate_keypair();
        Self { public, private }
    }
}

/// The threshold key file: this node's secret share plus the public
/// polynomial commitments shared by the committee.
#[derive(Serialize, Deserialize)]
pub struct ThresholdKeys {
    pub share: String,
    #[serde(rename = "pub")]
    pub pk_set: String,
    #[serde(rename = "N")]
    pub n: usize,
    #[serde(rename = "T")]
    pub t: usize,
}

impl Import for ThresholdKeys {}
impl Export for ThresholdKeys {}

impl ThresholdKeys {
    pub fn generate(n: usize, t: usize) -> Result<Vec<Self>, ConfigError> {
        let (shares, _) = crypto::generate_threshold_keys(n, t);
        shares
            .into_iter()
            .map(|share| {
                let (share, pk_set) = share
                    .encode_parts()
                    .map_err(|e| ConfigError::MalformedThresholdKeys(e.to_string()))?;
                Ok(Self {
                    share,
                    pk_set,
                    n,
                    t,
                })
            })
            .collect()
    }

    pub fn to_share(&self) -> Result<SecretShare, ConfigError> {
        SecretShare::from_parts(&self.share, &self.pk_set, self.n, self.t)
            .map_err(|e| ConfigError::MalformedThresholdKeys(e.to_string()))
    }
}

/// Generate `n` key files under `path`, named `.node-key-<i>.json`.
pub fn generate_key_files(n: usize, path: &str) -> Result<(), ConfigError> {
    for i in 0..n {
        KeyPair::generate().export(&format!("{path}/.node-key-{i}.json"))?;
    }
    Ok(())
}

/// Generate `n` threshold key files under `path`, named
/// `.node-ts-key-<i>.json`, requiring `t` shares to combine.
pub fn generate_threshold_key_files(n: usize, t: usize, path: &str) -> Result<(), ConfigError> {
    for (i, keys) in ThresholdKeys::generate(n, t)?.iter().enumerate() {
        keys.export(&format!("{path}/.node-ts-key-{i}.json"))?;
    }
    Ok(())
}

/// A local committee with freshly generated keys, for tests and local
/// deployments: node i listens on 127.0.0.1:(base_port + i).
pub fn local_committee_and_keys(
    base_port: u16,
    n: usize,
) -> (Committee, Vec<KeyPair>, Vec<SecretShare>) {
    let keypairs: Vec<_> = (0..n).map(|_| KeyPair::generate()).collect();
    let authorities = keypairs
        .iter()
        .enumerate()
        .map(|(i, pair)| {
            let id = i as NodeId;
            let addr = format!("127.0.0.1:{}", base_port + i as u16)
                .parse()
                .expect("valid socket address");
            (
                id,
                Authority {
                    name: pair.public.clone(),
                    node_id: id,
                    addr,
                },
            )
        })
        .collect();
    let committee = Committee::new(authorities);
    let t = committee.quorum_threshold();
    let (shares, _) = crypto::generate_threshold_keys(n, t);
    (committee, keypairs, shares)
}
