//! Wormhole CLI
//!
//! Thin wrapper around wormhole-core for command-line usage.
//!
//! ## Usage
//!
//! ```bash
//! # Send a file; prints a code like 42-brave-fire
//! wormhole send ./report.pdf
//!
//! # Receive it on another machine
//! wormhole receive 42-brave-fire
//!
//! # Show past transfers
//! wormhole list
//! ```

mod announce;
mod output;

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use tokio::sync::mpsc::UnboundedReceiver;
use tracing::{debug, warn};
use wormhole_core::{
    CompletionOutcome, Direction, EventSink, HttpStore, MetadataStore, StatusEvent, TransferCode,
    TransferHistory, TransferRecord, TransferStatus, WormholeConfig, WormholeCore,
    DEFAULT_RECEIVE_TIMEOUT, DEFAULT_RELAY_URL,
};

/// Default metadata store endpoint
const DEFAULT_STORE_URL: &str = "http://localhost:8765/kv";

/// Wormhole - send a file with a short code
#[derive(Parser)]
#[command(name = "wormhole")]
#[command(version)]
#[command(about = "Wormhole - send a file with a short code")]
#[command(
    long_about = "Uploads a file to a relay and publishes it under a short code. The receiver types the code, downloads the file, and the relay copy is released."
)]
struct Cli {
    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Relay base URL
    #[arg(long, global = true, env = "WORMHOLE_RELAY_URL", default_value = DEFAULT_RELAY_URL)]
    relay_url: String,

    /// Bearer token for the relay
    #[arg(long, global = true, env = "WORMHOLE_TOKEN", hide_env_values = true)]
    token: Option<String>,

    /// Metadata store base URL
    #[arg(long, global = true, env = "WORMHOLE_STORE_URL", default_value = DEFAULT_STORE_URL)]
    store_url: String,

    /// Data directory (default: ~/.wormhole)
    #[arg(short, long, global = true)]
    data_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Send a file and print its code
    Send {
        /// File to send
        path: PathBuf,

        /// Stop waiting for the receiver after this many seconds
        #[arg(long)]
        max_wait: Option<u64>,

        /// Do not announce the code on the local network
        #[arg(long)]
        no_announce: bool,
    },

    /// Receive a file by code
    Receive {
        /// Code printed by the sender
        code: String,

        /// Seconds to wait for the code to appear
        #[arg(long, default_value_t = DEFAULT_RECEIVE_TIMEOUT.as_secs())]
        timeout: u64,

        /// Directory to save into (default: current directory)
        #[arg(short, long)]
        output_dir: Option<PathBuf>,
    },

    /// Show transfers made from this machine
    List,
}

fn setup_logging(verbosity: u8) {
    let filter = match verbosity {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter)),
        )
        .with_writer(std::io::stderr)
        .init();
}

/// Get the default data directory (~/.wormhole)
fn default_data_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".wormhole")
}

fn open_history(data_dir: &Path) -> Result<TransferHistory> {
    TransferHistory::open(data_dir.join("history.redb"))
        .with_context(|| format!("Cannot open transfer history in {}", data_dir.display()))
}

/// History is a convenience; failing to write it does not fail the transfer.
fn record_transfer(data_dir: &Path, record: TransferRecord) {
    match open_history(data_dir).and_then(|h| h.record(&record).map_err(Into::into)) {
        Ok(()) => debug!(code = %record.code, "Recorded transfer"),
        Err(e) => warn!(error = %e, "Could not record transfer"),
    }
}

fn build_core(cli: &Cli, config: WormholeConfig) -> Result<(WormholeCore, UnboundedReceiver<StatusEvent>)> {
    let store = HttpStore::new(&cli.store_url)
        .with_context(|| format!("Invalid store URL: {}", cli.store_url))?;
    let store: Arc<dyn MetadataStore> = Arc::new(store);
    let (events, rx) = EventSink::channel();
    let core = WormholeCore::new(store, config, events)?;
    Ok((core, rx))
}

fn base_config(cli: &Cli) -> WormholeConfig {
    let config = WormholeConfig::new(cli.relay_url.clone());
    match &cli.token {
        Some(token) => config.with_auth_token(token.clone()),
        None => config,
    }
}

async fn run_send(
    cli: &Cli,
    data_dir: &Path,
    path: &Path,
    max_wait: Option<u64>,
    no_announce: bool,
) -> Result<()> {
    let data = tokio::fs::read(path)
        .await
        .with_context(|| format!("Cannot read {}", path.display()))?;
    let filename = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .with_context(|| format!("Not a file: {}", path.display()))?;
    let mime_type = output::mime_for_path(path, &data);

    let mut config = base_config(cli);
    if let Some(secs) = max_wait {
        config = config.with_completion_timeout(Duration::from_secs(secs));
    }

    let (core, rx) = build_core(cli, config)?;
    let reporter = tokio::spawn(output::report(rx));

    let session = match core.send(data, &filename, &mime_type).await {
        Ok(session) => session,
        Err(e) => {
            // The error event carries the code; prefer its message
            drop(core);
            match reporter.await.ok().flatten() {
                Some(event) => bail!("{}", event.message),
                None => return Err(e.into()),
            }
        }
    };
    let code = session.code().clone();

    println!("Sending {} ({})", filename, output::format_size(session.descriptor().size));
    println!();
    println!("  Code: {}", code);
    println!();
    println!("On the other machine run:");
    println!("  wormhole receive {}", code);
    println!();

    record_transfer(data_dir, TransferRecord::new(&code, Direction::Sent, session.descriptor()));

    if !no_announce {
        announce::announce(&code, session.descriptor()).await;
    }

    println!("Waiting for the receiver (Ctrl+C to stop)...");
    let outcome = tokio::select! {
        outcome = session.wait() => outcome,
        _ = tokio::signal::ctrl_c() => CompletionOutcome::Cancelled,
    };

    drop(core);
    let _ = reporter.await;

    match outcome {
        CompletionOutcome::Unpinned => println!("Transfer complete. Relay copy released."),
        CompletionOutcome::CleanupFailed(reason) => println!(
            "Transfer complete. Relay cleanup failed ({}); it will expire on its own.",
            reason
        ),
        CompletionOutcome::Expired => println!("No receiver in time. Relay copy will expire on its own."),
        CompletionOutcome::ListenerFailed(reason) => {
            println!("Stopped watching for the receiver: {}", reason)
        }
        CompletionOutcome::Cancelled => println!("Stopped waiting."),
    }

    Ok(())
}

async fn run_receive(
    cli: &Cli,
    data_dir: &Path,
    code: &str,
    timeout: u64,
    output_dir: Option<PathBuf>,
) -> Result<()> {
    let code = TransferCode::parse(code)?;
    if !code.is_well_formed() {
        eprintln!("Note: '{}' does not look like a wormhole code; trying anyway.", code);
    }

    let output_dir = match output_dir {
        Some(dir) => dir,
        None => std::env::current_dir().context("Cannot determine current directory")?,
    };

    let config = base_config(cli).with_receive_timeout(Duration::from_secs(timeout));
    let (core, rx) = build_core(cli, config)?;
    let reporter = tokio::spawn(output::report(rx));

    core.receive(&code).await;
    drop(core);

    let event = reporter
        .await
        .context("Progress reporter stopped unexpectedly")?
        .with_context(|| format!("Receive for code '{}' ended without a result", code))?;

    if event.status != TransferStatus::Downloaded {
        bail!("{}", event.message);
    }

    let file = event
        .file_data
        .with_context(|| format!("Transfer '{}' finished without data", code))?;

    tokio::fs::create_dir_all(&output_dir)
        .await
        .with_context(|| format!("Cannot create {}", output_dir.display()))?;
    let target = output::unique_path(&output_dir, &output::sanitize_filename(&file.filename));
    tokio::fs::write(&target, &file.bytes)
        .await
        .with_context(|| format!("Cannot write {}", target.display()))?;

    println!(
        "Received {} ({}) -> {}",
        file.filename,
        output::format_size(file.bytes.len() as u64),
        target.display()
    );

    if let Some(descriptor) = event.metadata {
        record_transfer(data_dir, TransferRecord::new(&code, Direction::Received, &descriptor));
    }

    Ok(())
}

fn run_list(data_dir: &Path) -> Result<()> {
    let records = open_history(data_dir)?.list()?;

    if records.is_empty() {
        println!("No transfers recorded.");
        return Ok(());
    }

    for record in records {
        let when = chrono::DateTime::from_timestamp_millis(record.recorded_at)
            .map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
            .unwrap_or_else(|| record.recorded_at.to_string());
        println!(
            "{}  {:<8}  {:<20}  {:>10}  {}",
            when,
            record.direction,
            record.code,
            output::format_size(record.size),
            record.filename
        );
    }

    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            // Help and version go to stdout and are not failures
            let code = if e.use_stderr() { 1 } else { 0 };
            let _ = e.print();
            std::process::exit(code);
        }
    };

    setup_logging(cli.verbose);

    let data_dir = cli.data_dir.clone().unwrap_or_else(default_data_dir);

    match &cli.command {
        Commands::Send {
            path,
            max_wait,
            no_announce,
        } => run_send(&cli, &data_dir, path, *max_wait, *no_announce).await,
        Commands::Receive {
            code,
            timeout,
            output_dir,
        } => run_receive(&cli, &data_dir, code, *timeout, output_dir.clone()).await,
        Commands::List => run_list(&data_dir),
    }
}
