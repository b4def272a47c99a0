// Copyright (c) Mysten Labs, Inc.
// SPDX-License-Identifier: Apache-2.0

//! Research implementation of asynchronous BFT consensus. One process is
//! one committee member; the protocol variant is selected by the
//! parameters file.

use anyhow::{Context as _, Result};
use clap::{Parser, Subcommand};
use config::{
    Authority, Committee, Export as _, Import as _, KeyPair, NodeId, Parameters, Protocol,
    ThresholdKeys,
};
use crypto::SignatureService;
use mempool::Pool;
use std::collections::BTreeMap;
use std::fs;
use std::path::PathBuf;
use store::Store;
use tokio::sync::mpsc;
use tracing::info;

#[derive(Parser)]
#[command(author, version, about = "A research implementation of BFT consensus protocols.")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Print fresh key pairs to files.
    Keys {
        /// The directory where to print the new key pairs.
        #[arg(long)]
        path: PathBuf,
        /// The number of key pairs to generate.
        #[arg(long, default_value_t = 4)]
        nodes: usize,
    },
    /// Print fresh threshold key shares to files.
    #[command(name = "threshold_keys")]
    ThresholdKeys {
        /// The directory where to print the new threshold keys.
        #[arg(long)]
        path: PathBuf,
        /// The number of shares to generate.
        #[arg(long = "N", default_value_t = 4)]
        n: usize,
        /// The number of shares required to combine.
        #[arg(long = "T", default_value_t = 3)]
        t: usize,
    },
    /// Run a single node.
    Run {
        /// The file containing the node keys.
        #[arg(long)]
        keys: PathBuf,
        /// The file containing the node threshold keys.
        #[arg(long = "threshold_keys")]
        threshold_keys: PathBuf,
        /// The file containing committee information.
        #[arg(long)]
        committee: PathBuf,
        /// The file containing the node parameters.
        #[arg(long)]
        parameters: PathBuf,
        /// The path where to create the data store.
        #[arg(long)]
        store: PathBuf,
        /// The directory where to write logs.
        #[arg(long = "log_out")]
        log_out: Option<PathBuf>,
        /// Verbosity: 0=error, 1=warn, 2=info, 3=debug.
        #[arg(long = "log_level", default_value_t = 2)]
        log_level: u8,
        /// The id of this node.
        #[arg(long = "node_id")]
        node_id: NodeId,
    },
    /// Deploy a committee of nodes locally.
    Deploy {
        /// The number of nodes to deploy.
        #[arg(long, default_value_t = 4)]
        nodes: usize,
        /// The working directory for keys, stores and logs.
        #[arg(long, default_value = ".deploy")]
        path: PathBuf,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    match cli.command {
        Command::Keys { path, nodes } => {
            config::generate_key_files(nodes, path_str(&path)?)?;
            Ok(())
        }
        Command::ThresholdKeys { path, n, t } => {
            config::generate_threshold_key_files(n, t, path_str(&path)?)?;
            Ok(())
        }
        Command::Run {
            keys,
            threshold_keys,
            committee,
            parameters,
            store,
            log_out,
            log_level,
            node_id,
        } => run(
            keys,
            threshold_keys,
            committee,
            parameters,
            store,
            log_out,
            log_level,
            node_id,
        ),
        Command::Deploy { nodes, path } => deploy(nodes, path),
    }
}

fn path_str(path: &std::path::Path) -> Result<&str> {
    path.to_str().context("path is not valid UTF-8")
}

fn log_filter(level: u8) -> &'static str {
    match level {
        0 => "error",
        1 => "warn",
        2 => "info",
        _ => "debug",
    }
}

#[allow(clippy::too_many_arguments)]
fn run(
    keys: PathBuf,
    threshold_keys: PathBuf,
    committee: PathBuf,
    parameters: PathBuf,
    store_path: PathBuf,
    log_out: Option<PathBuf>,
    log_level: u8,
    node_id: NodeId,
) -> Result<()> {
    // Per-node log file under --log_out, stdout otherwise.
    let _guard = match log_out {
        Some(dir) => {
            let appender = tracing_appender::rolling::never(dir, format!("node-{node_id}.log"));
            let (writer, guard) = tracing_appender::non_blocking(appender);
            tracing_subscriber::fmt()
                .with_env_filter(log_filter(log_level))
                .with_writer(writer)
                .with_ansi(false)
                .init();
            Some(guard)
        }
        None => {
            tracing_subscriber::fmt()
                .with_env_filter(log_filter(log_level))
                .init();
            None
        }
    };

    let keys = KeyPair::import(path_str(&keys)?)?;
    let share = ThresholdKeys::import(path_str(&threshold_keys)?)?.to_share()?;
    let committee = Committee::import(path_str(&committee)?)?;
    let parameters = Parameters::import(path_str(&parameters)?)?;
    let protocol = Protocol::try_from(parameters.consensus.protocol)?;

    let runtime = tokio::runtime::Runtime::new()?;
    runtime.block_on(async move {
        let signature_service = SignatureService::new(keys.private, share);
        let store = Store::new(&store_path)?;
        let pool = Pool::new(parameters.pool.clone(), committee.size(), node_id);
        let (tx_notify, mut rx_notify) = mpsc::channel(1_000);

        match protocol {
            Protocol::Mvba => {
                consensus::mvba::Consensus::spawn(
                    node_id,
                    committee,
                    parameters.consensus,
                    signature_service,
                    store,
                    pool,
                    tx_notify,
                )
                .await?
            }
            Protocol::Smvba => {
                consensus::smvba::Consensus::spawn(
                    node_id,
                    committee,
                    parameters.consensus,
                    signature_service,
                    store,
                    pool,
                    tx_notify,
                )
                .await?
            }
            Protocol::Vaba => {
                consensus::vaba::Consensus::spawn(
                    node_id,
                    committee,
                    parameters.consensus,
                    signature_service,
                    store,
                    pool,
                    tx_notify,
                )
                .await?
            }
            Protocol::ParMvba => {
                consensus::parmvba::Consensus::spawn(
                    node_id,
                    committee,
                    parameters.consensus,
                    signature_service,
                    store,
                    pool,
                    tx_notify,
                )
                .await?
            }
        }
        info!("Node {} successfully booted", node_id);

        // Drain commit notifications for the process lifetime.
        while rx_notify.recv().await.is_some() {}
        Ok(())
    })
}

/// Generate a local committee under `path` and spawn one child process per
/// node.
fn deploy(nodes: usize, path: PathBuf) -> Result<()> {
    fs::create_dir_all(&path)?;
    let base = path_str(&path)?;

    let keypairs: Vec<_> = (0..nodes).map(|_| KeyPair::generate()).collect();
    let authorities: BTreeMap<NodeId, Authority> = keypairs
        .iter()
        .enumerate()
        .map(|(i, pair)| {
            let id = i as NodeId;
            (
                id,
                Authority {
                    name: pair.public.clone(),
                    node_id: id,
                    addr: format!("127.0.0.1:{}", 9_000 + i)
                        .parse()
                        .expect("valid socket address"),
                },
            )
        })
        .collect();
    let committee = Committee::new(authorities);
    committee.export(&format!("{base}/.committee.json"))?;

    for (i, pair) in keypairs.iter().enumerate() {
        pair.export(&format!("{base}/.node-key-{i}.json"))?;
    }
    config::generate_threshold_key_files(nodes, committee.quorum_threshold(), base)?;
    Parameters::default().export(&format!("{base}/.parameters.json"))?;

    let children: Vec<_> = (0..nodes)
        .map(|i| {
            std::process::Command::new(std::env::current_exe()?)
                .args([
                    "run",
                    "--keys",
                    &format!("{base}/.node-key-{i}.json"),
                    "--threshold_keys",
                    &format!("{base}/.node-ts-key-{i}.json"),
                    "--committee",
                    &format!("{base}/.committee.json"),
                    "--parameters",
                    &format!("{base}/.parameters.json"),
                    "--store",
                    &format!("{base}/db-{i}"),
                    "--log_out",
                    base,
                    "--node_id",
                    &i.to_string(),
                ])
                .spawn()
                .context("failed to spawn node process")
        })
        .collect::<Result<_>>()?;

    println!("Deployed {nodes} nodes under {base}; logs in {base}/node-*.log");
    for mut child in children {
        child.wait()?;
    }
    Ok(())
}
