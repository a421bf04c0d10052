//! # CLI Interface
//!
//! Defines the command-line argument structure for `pulsar-node` using
//! `clap` derive. Supports four subcommands: `run`, `init`, `status`,
//! and `version`.

use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};

/// PULSAR validator node.
///
/// A full validator node for the PULSAR settlement ledger. Participates
/// in consensus, validates closed ledgers, serves the HTTP status API,
/// and exposes Prometheus metrics.
#[derive(Parser, Debug)]
#[command(
    name = "pulsar-node",
    about = "PULSAR validator node",
    version,
    propagate_version = true
)]
pub struct PulsarNodeCli {
    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,
}

/// Top-level subcommands for the PULSAR node binary.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Start the validator node.
    Run(RunArgs),
    /// Initialize a new node: creates the data directory and generates
    /// a fresh validator keypair.
    Init(InitArgs),
    /// Query the status of a running node via its HTTP endpoint.
    Status(StatusArgs),
    /// Print version information and exit.
    Version,
}

/// Arguments for the `run` subcommand.
#[derive(Parser, Debug)]
pub struct RunArgs {
    /// Path to the node data directory where the store and keys live.
    ///
    /// Created on first run if it does not exist.
    #[arg(long, short = 'd', env = "PULSAR_DATA_DIR", default_value = "~/.pulsar")]
    pub data_dir: PathBuf,

    /// Listen address for the HTTP status API.
    #[arg(long, env = "PULSAR_RPC_ADDR", default_value = "127.0.0.1:9781")]
    pub rpc_addr: String,

    /// Listen address for the Prometheus metrics endpoint.
    #[arg(long, env = "PULSAR_METRICS_ADDR", default_value = "127.0.0.1:9782")]
    pub metrics_addr: String,

    /// Node-store backend: "sled" (persistent) or "memory" (ephemeral).
    #[arg(long, env = "PULSAR_BACKEND", default_value = "sled")]
    pub backend: String,

    /// Hex-encoded Ed25519 validator secret key.
    ///
    /// If not provided, the node reads the key from the data directory.
    /// **Never pass this flag in production**; use the key file instead.
    #[arg(long, env = "PULSAR_VALIDATOR_KEY")]
    pub validator_key: Option<String>,

    /// Hex-encoded master public key of a trusted validator. Repeatable;
    /// together with our own key this forms the UNL.
    #[arg(long = "trust")]
    pub trust: Vec<String>,

    /// Default log level when RUST_LOG is unset.
    #[arg(long, env = "PULSAR_LOG_LEVEL", default_value = "info")]
    pub log_level: String,

    /// Log output format: "pretty" or "json".
    #[arg(long, env = "PULSAR_LOG_FORMAT", default_value = "pretty")]
    pub log_format: String,

    /// Dev mode: ephemeral in-memory store and a generated keypair.
    #[arg(long)]
    pub dev: bool,
}

/// Arguments for the `init` subcommand.
#[derive(Parser, Debug)]
pub struct InitArgs {
    /// Path to the data directory to initialize.
    #[arg(long, short = 'd', env = "PULSAR_DATA_DIR", default_value = "~/.pulsar")]
    pub data_dir: PathBuf,

    /// Overwrite an already-initialized data directory.
    #[arg(long)]
    pub force: bool,
}

/// Arguments for the `status` subcommand.
#[derive(Parser, Debug)]
pub struct StatusArgs {
    /// HTTP endpoint of the running node.
    #[arg(long, default_value = "http://127.0.0.1:9781")]
    pub rpc_url: String,
}

/// Expands a leading `~` to the user's home directory.
///
/// Only the bare `~` prefix is handled; anything fancier should be
/// resolved by the shell before it gets to us.
pub fn resolve_data_dir(path: &Path) -> PathBuf {
    let raw = path.to_string_lossy();
    if let Some(rest) = raw.strip_prefix("~/") {
        if let Some(home) = std::env::var_os("HOME") {
            return PathBuf::from(home).join(rest);
        }
    }
    path.to_path_buf()
}
