//! `privfs-worker` - the privileged filesystem service binary.
//!
//! Runs as root, takes filesystem operations off the message broker and
//! executes each one as the requesting account.

#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

use std::io::{Read, Write};
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use privfs_bus::NatsBroker;
use privfs_config::{Config, ResolvedConfig};
use privfs_core::Verb;
use privfs_identity::current_euid;
use privfs_ops::UploadTracker;
use privfs_telemetry::{LogTarget, setup_logging};
use privfs_worker::{Dispatcher, Worker, bridge, exec_local};
use tokio::signal::unix::{SignalKind, signal};
use tracing::{info, warn};

/// Privileged filesystem worker.
#[derive(Parser)]
#[command(name = "privfs-worker")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Configuration file layered over `/etc/privfs/worker.toml`.
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Log at debug level.
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Connect to the broker and serve until SIGINT or SIGTERM
    Run,

    /// Load and validate configuration, then print it with value sources
    CheckConfig,

    /// Run one operation locally and print its reply
    Exec {
        /// Operation, e.g. `list` or `mkdir`
        verb: String,

        /// JSON request body (chunk metadata for `write-chunk`, whose data
        /// is read from stdin)
        request: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let resolved = Config::load(cli.config.as_deref()).context("failed to load configuration")?;

    match cli.command {
        Command::Run => run(&resolved.config, cli.verbose).await,
        Command::CheckConfig => check_config(&resolved),
        Command::Exec { verb, request } => {
            exec(&resolved.config, cli.verbose, &verb, &request).await
        },
    }
}

async fn run(cfg: &Config, verbose: bool) -> Result<()> {
    let _log_guard = setup_logging(&bridge::to_log_config(cfg, verbose))?;

    let euid = current_euid();
    info!(version = env!("CARGO_PKG_VERSION"), euid, "starting privfs worker");
    if euid != 0 {
        warn!(euid, "not running as root, impersonation will fail");
    }

    let broker = NatsBroker::connect(&bridge::to_nats_settings(cfg)).await?;
    let tracker = Arc::new(UploadTracker::new(cfg.uploads.stale_after()));
    let worker = Worker::start(Arc::new(broker), bridge::to_worker_options(cfg), tracker).await?;

    wait_for_shutdown().await?;
    info!("shutting down");
    worker.shutdown().await?;
    Ok(())
}

async fn wait_for_shutdown() -> Result<()> {
    let mut terminate =
        signal(SignalKind::terminate()).context("failed to install SIGTERM handler")?;
    tokio::select! {
        interrupted = tokio::signal::ctrl_c() => {
            interrupted.context("failed to listen for SIGINT")?;
        },
        _ = terminate.recv() => {},
    }
    Ok(())
}

fn check_config(resolved: &ResolvedConfig) -> Result<()> {
    print!("{}", resolved.render_toml()?);
    Ok(())
}

async fn exec(cfg: &Config, verbose: bool, verb: &str, request: &str) -> Result<()> {
    // Stdout carries the reply.
    let log_guard =
        setup_logging(&bridge::to_log_config(cfg, verbose).with_target(LogTarget::Stderr))?;

    let mut data = Vec::new();
    if verb == Verb::WriteChunk.as_str() {
        std::io::stdin()
            .read_to_end(&mut data)
            .context("failed to read chunk data from stdin")?;
    }

    let dispatcher = Dispatcher::new(Arc::new(UploadTracker::new(cfg.uploads.stale_after())));
    let outcome = exec_local(&dispatcher, verb, request, data).await;

    let mut stdout = std::io::stdout().lock();
    stdout.write_all(&outcome.stdout)?;
    stdout.flush()?;
    drop(stdout);

    // `exit` skips destructors; flush buffered log lines first.
    drop(log_guard);
    std::process::exit(outcome.status);
}
