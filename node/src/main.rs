// Copyright (c) 2026 ALAS Technology. MIT License.
// See LICENSE for details.

//! # PULSAR Validator Node
//!
//! Entry point for the `pulsar-node` binary. Parses CLI arguments,
//! initializes logging and metrics, wires the consensus core together,
//! starts the round driver, and serves the HTTP status API.
//!
//! The binary supports four subcommands:
//!
//! - `run`     — start the validator node
//! - `init`    — initialize data directory and generate keys
//! - `status`  — query a running node's status endpoint
//! - `version` — print build version information

mod api;
mod cli;
mod logging;
mod metrics;

use anyhow::{anyhow, Context, Result};
use clap::Parser;
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::signal;
use tokio::sync::{mpsc, watch};

use pulsar_protocol::consensus::clock::{Clock, WallClock};
use pulsar_protocol::consensus::driver::{
    ConsensusEvent, CoreContext, DriverConfig, RoundDriver, TxSetCache,
};
use pulsar_protocol::consensus::positions::PositionStore;
use pulsar_protocol::consensus::validations::ValidationStore;
use pulsar_protocol::crypto::keys::{PulsarKeypair, PulsarPublicKey};
use pulsar_protocol::jobs::{JobQueue, JobType};
use pulsar_protocol::ledger::apply::DeterministicApplicator;
use pulsar_protocol::network::acquire::InboundLedgers;
use pulsar_protocol::storage::history::LedgerHistory;
use pulsar_protocol::storage::node_store::{open_backend, NodeStore};
use pulsar_protocol::validators::unl::TrustedValidators;

use cli::{Commands, PulsarNodeCli};
use logging::LogFormat;
use metrics::NodeMetrics;

/// Cadence of the background maintenance job (acquirer sweep, telemetry).
const MAINTENANCE_INTERVAL_SECS: u64 = 30;

/// Worker count for the background job queue.
const JOB_QUEUE_WORKERS: usize = 4;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = PulsarNodeCli::parse();

    match cli.command {
        Commands::Run(args) => run_node(args).await,
        Commands::Init(args) => init_node(args),
        Commands::Status(args) => query_status(args).await,
        Commands::Version => {
            print_version();
            Ok(())
        }
    }
}

// ---------------------------------------------------------------------------
// run — Full validator startup sequence
// ---------------------------------------------------------------------------

/// Starts the full validator node: consensus core, status API, and
/// metrics endpoint.
///
/// Startup sequence (bottom-up, exactly the dependency order):
/// 1.  Initialize logging
/// 2.  Load or generate the validator keypair
/// 3.  Open the node store backend
/// 4.  Build the UNL from our key plus --trust entries
/// 5.  Construct the shared consensus context (clock, stores, acquirer)
/// 6.  Construct the round driver
/// 7.  Setup shutdown plumbing
/// 8.  Spawn the driver, the event pump, and the maintenance job
/// 9.  Start the API and metrics servers
/// 10. Await shutdown, then stop top-down
async fn run_node(args: cli::RunArgs) -> Result<()> {
    // --- 1. Logging ---
    let data_dir = cli::resolve_data_dir(&args.data_dir);
    let log_filter = format!(
        "pulsar_node={level},pulsar_protocol={level}",
        level = args.log_level
    );
    logging::init_logging(&log_filter, LogFormat::from_str_lossy(&args.log_format));

    tracing::info!(
        rpc_addr = %args.rpc_addr,
        metrics_addr = %args.metrics_addr,
        data_dir = %data_dir.display(),
        backend = %args.backend,
        dev = args.dev,
        "starting pulsar-node"
    );

    // --- 2. Validator keypair ---
    let keypair = if let Some(hex_key) = &args.validator_key {
        PulsarKeypair::from_hex(hex_key).map_err(|e| anyhow!("invalid --validator-key: {e}"))?
    } else if args.dev {
        let kp = PulsarKeypair::generate();
        tracing::info!(
            public_key = %kp.public_key().to_hex(),
            "generated ephemeral dev keypair"
        );
        kp
    } else {
        load_or_generate_keypair(&data_dir)?
    };
    let node_id = keypair.public_key().to_hex();

    // --- 3. Node store backend ---
    let store: Arc<dyn NodeStore> = if args.dev || args.backend == "memory" {
        open_backend("memory", None)?
    } else {
        let db_path = data_dir.join("db");
        std::fs::create_dir_all(&db_path)
            .with_context(|| format!("failed to create db directory: {}", db_path.display()))?;
        open_backend(&args.backend, Some(db_path.as_path()))?
    };
    tracing::info!(backend = store.name(), "node store opened");

    // --- 4. UNL ---
    let unl = TrustedValidators::shared();
    unl.add(keypair.public_key(), "self");
    for hex_key in &args.trust {
        let pk = PulsarPublicKey::from_hex(hex_key)
            .map_err(|e| anyhow!("invalid --trust key {hex_key}: {e}"))?;
        let label = format!("peer-{}", &hex_key[..hex_key.len().min(8)]);
        unl.add(pk, label);
    }
    tracing::info!(validators = unl.len(), quorum = unl.quorum(), "UNL configured");

    // --- 5. Consensus context ---
    let clock: Arc<dyn Clock> = Arc::new(WallClock::new());
    let history = Arc::new(LedgerHistory::new());
    let ctx = CoreContext {
        clock: Arc::clone(&clock),
        positions: Arc::new(PositionStore::new(Arc::clone(&clock), Arc::clone(&unl))),
        validations: Arc::new(ValidationStore::new(Arc::clone(&clock), Arc::clone(&unl))),
        tx_sets: Arc::new(TxSetCache::new()),
        acquirer: Arc::new(InboundLedgers::new(
            Arc::clone(&clock),
            Arc::clone(&history),
            Arc::clone(&store),
        )),
        applicator: Arc::new(DeterministicApplicator::new()),
        unl: Arc::clone(&unl),
        history: Arc::clone(&history),
        store: Arc::clone(&store),
    };

    // --- 6. Round driver ---
    let mut driver = RoundDriver::new(DriverConfig::default(), keypair.clone(), ctx.clone());

    // --- Metrics ---
    let node_metrics = Arc::new(NodeMetrics::new());

    // --- 7. Shutdown plumbing ---
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let (events_tx, mut events_rx) = mpsc::unbounded_channel::<ConsensusEvent>();

    // --- 8a. Driver task ---
    let driver_shutdown = shutdown_rx.clone();
    let driver_handle = tokio::spawn(async move {
        match driver.run(events_tx, driver_shutdown).await {
            Ok(()) => tracing::info!("round driver exited cleanly"),
            Err(e) => tracing::error!(error = %e, "round driver halted"),
        }
    });

    // --- 8b. Event pump: consensus events into metrics and (eventually)
    //          the overlay broadcast path ---
    let pump_metrics = Arc::clone(&node_metrics);
    let pump_handle = tokio::spawn(async move {
        while let Some(event) = events_rx.recv().await {
            match event {
                ConsensusEvent::Propose(proposal) => {
                    pump_metrics.proposals_sent_total.inc();
                    tracing::debug!(
                        proposer_seq = proposal.proposer_seq,
                        close_time = proposal.close_time,
                        "position broadcast"
                    );
                }
                ConsensusEvent::Validate(validation) => {
                    pump_metrics.validations_sent_total.inc();
                    tracing::debug!(seq = validation.seq, "validation broadcast");
                }
                ConsensusEvent::LedgerClosed { ledger } => {
                    tracing::debug!(
                        seq = ledger.seq(),
                        hash = %ledger.header.hash_hex(),
                        "candidate ledger closed"
                    );
                }
                ConsensusEvent::LclAdvanced { ledger } => {
                    pump_metrics.lcl_height.set(ledger.seq() as i64);
                    pump_metrics.consensus_rounds_total.inc();
                    tracing::info!(
                        seq = ledger.seq(),
                        hash = %ledger.header.hash_hex(),
                        "last closed ledger advanced"
                    );
                }
                ConsensusEvent::Acquire { hash, seq } => {
                    // The overlay forwards this as GetLedger to peers that
                    // advertised the hash.
                    tracing::info!(hash = %hex::encode(hash), seq, "requesting ledger from peers");
                }
                ConsensusEvent::RoundAbandoned { seq } => {
                    pump_metrics.rounds_abandoned_total.inc();
                    tracing::warn!(seq, "round abandoned");
                }
            }
        }
    });

    // --- 8c. Background maintenance on the job queue ---
    let jobs = JobQueue::new(JOB_QUEUE_WORKERS);
    let maint_jobs = Arc::clone(&jobs);
    let maint_acquirer = Arc::clone(&ctx.acquirer);
    let maint_metrics = Arc::clone(&node_metrics);
    let mut maint_shutdown = shutdown_rx.clone();
    let maint_handle = tokio::spawn(async move {
        let mut interval = tokio::time::interval(std::time::Duration::from_secs(
            MAINTENANCE_INTERVAL_SECS,
        ));
        loop {
            tokio::select! {
                _ = interval.tick() => {
                    let acquirer = Arc::clone(&maint_acquirer);
                    let metrics = Arc::clone(&maint_metrics);
                    maint_jobs.submit(JobType::UpdateCaches, move || {
                        acquirer.sweep();
                        let (active, timeouts) = acquirer.fetch_counts();
                        metrics.active_acquisitions.set(active as i64);
                        metrics.acquire_timeouts_total.set(timeouts as i64);
                        metrics.ledger_fetch_rate.set(acquirer.fetch_rate());
                    });
                }
                _ = maint_shutdown.changed() => break,
            }
        }
    });

    // --- 9. API and metrics servers ---
    let app_state = api::AppState {
        version: format!(
            "{} (protocol {})",
            env!("CARGO_PKG_VERSION"),
            pulsar_protocol::config::PROTOCOL_VERSION,
        ),
        network: if args.dev { "devnet".to_string() } else { "mainnet".to_string() },
        node_id: node_id.clone(),
        started_at: chrono::Utc::now(),
        history: Arc::clone(&history),
        unl: Arc::clone(&unl),
        acquirer: Arc::clone(&ctx.acquirer),
        metrics: Arc::clone(&node_metrics),
    };

    let api_router = api::create_router(app_state);
    let api_listener = tokio::net::TcpListener::bind(&args.rpc_addr)
        .await
        .with_context(|| format!("failed to bind API listener on {}", args.rpc_addr))?;
    tracing::info!("status API listening on {}", args.rpc_addr);

    let metrics_router = axum::Router::new()
        .route("/metrics", axum::routing::get(metrics::metrics_handler))
        .with_state(Arc::clone(&node_metrics));
    let metrics_listener = tokio::net::TcpListener::bind(&args.metrics_addr)
        .await
        .with_context(|| format!("failed to bind metrics listener on {}", args.metrics_addr))?;
    tracing::info!("metrics listening on {}", args.metrics_addr);

    print_startup_banner(
        &node_id,
        &args.rpc_addr,
        &args.metrics_addr,
        &data_dir.to_string_lossy(),
        store.name(),
        unl.len(),
    );

    // --- 10. Await shutdown ---
    tokio::select! {
        res = axum::serve(api_listener, api_router) => {
            if let Err(e) = res {
                tracing::error!("API server error: {}", e);
            }
        }
        res = axum::serve(metrics_listener, metrics_router) => {
            if let Err(e) = res {
                tracing::error!("metrics server error: {}", e);
            }
        }
        _ = shutdown_signal() => {
            tracing::info!("shutdown signal received, stopping top-down");
        }
    }

    // Stop top-down: driver first, then the acquirer it owns, then the
    // job queue, then the store.
    let _ = shutdown_tx.send(true);
    let _ = driver_handle.await;
    ctx.acquirer.stop();
    jobs.stop();
    jobs.join().await;
    store.close();
    pump_handle.abort();
    maint_handle.abort();

    tracing::info!("pulsar-node stopped");
    Ok(())
}

// ---------------------------------------------------------------------------
// init — Data directory initialization
// ---------------------------------------------------------------------------

/// Initializes a new node data directory and generates a validator
/// keypair.
///
/// Creates the directory structure:
/// ```text
/// {data_dir}/
///     db/     — sled node store
///     keys/   — validator keypair
/// ```
fn init_node(args: cli::InitArgs) -> Result<()> {
    logging::init_logging("pulsar_node=info", LogFormat::Pretty);

    let data_dir = cli::resolve_data_dir(&args.data_dir);
    tracing::info!(data_dir = %data_dir.display(), "initializing node");

    let keys_dir = data_dir.join("keys");
    let key_path = keys_dir.join("validator.key");
    if key_path.exists() && !args.force {
        anyhow::bail!(
            "data directory already initialized at {}. Use --force to overwrite.",
            data_dir.display()
        );
    }

    let db_dir = data_dir.join("db");
    std::fs::create_dir_all(&db_dir)
        .with_context(|| format!("failed to create db directory: {}", db_dir.display()))?;
    std::fs::create_dir_all(&keys_dir)
        .with_context(|| format!("failed to create keys directory: {}", keys_dir.display()))?;

    // Generate and persist the validator keypair, hex-encoded.
    let keypair = PulsarKeypair::generate();
    let pubkey_hex = keypair.public_key().to_hex();
    std::fs::write(&key_path, hex::encode(keypair.to_bytes()))
        .with_context(|| format!("failed to write validator key to {}", key_path.display()))?;

    // Restrict permissions on Unix.
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(&key_path, std::fs::Permissions::from_mode(0o600))?;
    }

    tracing::info!(
        public_key = %pubkey_hex,
        key_path = %key_path.display(),
        "validator keypair generated"
    );

    println!();
    println!("Node initialized successfully.");
    println!();
    println!("  Data directory : {}", data_dir.display());
    println!("  Validator key  : {}", key_path.display());
    println!("  Public key     : {}", pubkey_hex);
    println!("  DB directory   : {}", db_dir.display());
    println!();
    println!(
        "Run `pulsar-node run -d {}` to start the node.",
        data_dir.display()
    );

    Ok(())
}

// ---------------------------------------------------------------------------
// status — Query a running node
// ---------------------------------------------------------------------------

/// Queries a running node's status endpoint and prints the result.
async fn query_status(args: cli::StatusArgs) -> Result<()> {
    let body = http_get(&args.rpc_url, "/status").await?;

    // Try to pretty-print the JSON; fall back to raw output if parsing
    // fails.
    match serde_json::from_str::<serde_json::Value>(&body) {
        Ok(json) => {
            println!("Node Status");
            if let Some(version) = json.get("version").and_then(|v| v.as_str()) {
                println!("  Version      : {}", version);
            }
            if let Some(network) = json.get("network").and_then(|v| v.as_str()) {
                println!("  Network      : {}", network);
            }
            if let Some(seq) = json.get("lcl_seq").and_then(|v| v.as_u64()) {
                println!("  LCL sequence : {}", seq);
            }
            if let Some(hash) = json.get("lcl_hash").and_then(|v| v.as_str()) {
                println!("  LCL hash     : {}", hash);
            }
            if let Some(validators) = json.get("validators").and_then(|v| v.as_u64()) {
                println!("  Validators   : {}", validators);
            }
            if let Some(quorum) = json.get("quorum").and_then(|v| v.as_u64()) {
                println!("  Quorum       : {}", quorum);
            }
            if let Some(uptime) = json.get("uptime_secs").and_then(|v| v.as_i64()) {
                println!("  Uptime       : {}s", uptime);
            }
        }
        Err(_) => {
            println!("{}", body);
        }
    }

    Ok(())
}

/// Minimal HTTP GET without pulling in a client crate for one endpoint.
async fn http_get(base_url: &str, path: &str) -> Result<String> {
    let host_port = base_url
        .trim_start_matches("http://")
        .trim_end_matches('/')
        .to_string();

    let mut stream = tokio::net::TcpStream::connect(&host_port)
        .await
        .with_context(|| format!("failed to connect to {}", host_port))?;

    let request = format!(
        "GET {path} HTTP/1.1\r\nHost: {host_port}\r\nConnection: close\r\n\r\n"
    );
    stream.write_all(request.as_bytes()).await?;

    let mut response = Vec::new();
    stream.read_to_end(&mut response).await?;
    let text = String::from_utf8_lossy(&response);

    // Body begins after the blank line separating it from the headers.
    Ok(text
        .split_once("\r\n\r\n")
        .map(|(_, body)| body.to_string())
        .unwrap_or_default())
}

// ---------------------------------------------------------------------------
// version
// ---------------------------------------------------------------------------

/// Prints version information to stdout.
fn print_version() {
    println!("pulsar-node {}", env!("CARGO_PKG_VERSION"));
    println!("protocol    {}", pulsar_protocol::config::PROTOCOL_VERSION);
    if let Some(commit) = option_env!("GIT_COMMIT") {
        println!("commit      {}", commit);
    }
}

// ---------------------------------------------------------------------------
// Keypair persistence
// ---------------------------------------------------------------------------

/// Loads a validator keypair from `{data_dir}/keys/validator.key`, or
/// generates and saves a new one if the key file does not exist.
///
/// The key file is hex-encoded (64 hex characters = 32 bytes secret key).
/// File permissions are restricted to owner-only (0o600) on Unix.
fn load_or_generate_keypair(data_dir: &std::path::Path) -> Result<PulsarKeypair> {
    let keys_dir = data_dir.join("keys");
    let key_path = keys_dir.join("validator.key");

    if key_path.exists() {
        let hex_str = std::fs::read_to_string(&key_path)
            .with_context(|| format!("failed to read validator key from {}", key_path.display()))?;
        let keypair = PulsarKeypair::from_hex(hex_str.trim())
            .map_err(|e| anyhow!("invalid validator key: {}", e))?;
        tracing::info!(
            public_key = %keypair.public_key().to_hex(),
            key_path = %key_path.display(),
            "loaded validator keypair from disk"
        );
        Ok(keypair)
    } else {
        std::fs::create_dir_all(&keys_dir)
            .with_context(|| format!("failed to create keys directory: {}", keys_dir.display()))?;

        let keypair = PulsarKeypair::generate();
        std::fs::write(&key_path, hex::encode(keypair.to_bytes()))
            .with_context(|| format!("failed to write validator key to {}", key_path.display()))?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(&key_path, std::fs::Permissions::from_mode(0o600))?;
        }

        tracing::info!(
            public_key = %keypair.public_key().to_hex(),
            key_path = %key_path.display(),
            "generated and saved new validator keypair"
        );
        Ok(keypair)
    }
}

// ---------------------------------------------------------------------------
// Startup banner
// ---------------------------------------------------------------------------

/// Prints the node startup banner with configuration summary.
fn print_startup_banner(
    node_id: &str,
    rpc_addr: &str,
    metrics_addr: &str,
    data_dir: &str,
    backend: &str,
    validators: usize,
) {
    let node_id_short = if node_id.len() > 20 {
        format!("{}...", &node_id[..20])
    } else {
        node_id.to_string()
    };

    let lines = [
        format!("  Node ID:     {}", node_id_short),
        format!("  API:         http://{}", rpc_addr),
        format!("  Metrics:     http://{}/metrics", metrics_addr),
        format!("  Data:        {}", data_dir),
        format!("  Store:       {}", backend),
        format!("  Validators:  {}", validators),
    ];

    let title = format!(
        "  PULSAR \u{2014} Validator Node v{}",
        env!("CARGO_PKG_VERSION")
    );

    let max_width = lines
        .iter()
        .map(|l| l.len())
        .chain(std::iter::once(title.len()))
        .max()
        .unwrap_or(50)
        + 4;

    let border = "\u{2550}".repeat(max_width);

    println!();
    println!("\u{2554}{}\u{2557}", border);
    println!("\u{2551}  {:<width$}  \u{2551}", title.trim(), width = max_width - 4);
    println!("\u{2560}{}\u{2563}", border);
    for line in &lines {
        println!("\u{2551}  {:<width$}  \u{2551}", line.trim(), width = max_width - 4);
    }
    println!("\u{255A}{}\u{255D}", border);
    println!();
}

// ---------------------------------------------------------------------------
// Shutdown signal
// ---------------------------------------------------------------------------

/// Waits for SIGINT (Ctrl+C) or SIGTERM, whichever comes first.
///
/// On non-Unix platforms, only Ctrl+C is supported.
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
