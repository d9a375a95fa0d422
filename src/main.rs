//! Command-line interface for warehouse-sync
//!
//! # Usage Examples
//!
//! ## Sync
//! ```bash
//! # All streams, in file order
//! warehouse-sync sync --config pipeline.yaml
//!
//! # Selected streams, in the order given
//! warehouse-sync sync --config pipeline.yaml --stream orders --stream customers
//! ```
//!
//! ## Bookmarks
//! ```bash
//! warehouse-sync bookmark show --config pipeline.yaml --stream orders
//!
//! # Manual reset; may move the bookmark backwards
//! warehouse-sync bookmark set --config pipeline.yaml --stream orders --value 0
//! ```
//!
//! ## Stitch
//! ```bash
//! # Trigger only; prints the job handle as JSON
//! warehouse-sync stitch trigger --config pipeline.yaml --source-id 12345
//!
//! # Wait on a job triggered earlier
//! warehouse-sync stitch wait --config pipeline.yaml --source-id 12345 \
//!   --triggered-at 2024-01-01T00:00:00Z --poll-interval 30s --timeout 2h
//!
//! # Trigger and wait
//! warehouse-sync stitch run --config pipeline.yaml --source-id 12345
//! ```

use anyhow::Context;
use bookmark::{Bookmarks, Watermark};
use clap::{Args, Parser, Subcommand};
use job_monitor::{CancellationToken, RunMonitor};
use std::path::PathBuf;
use stitch::StitchClient;
use tracing::info;
use warehouse_sync::jobs::{self, external_handle, monitor_config, stitch_monitor};
use warehouse_sync::pipeline::{describe, open_bookmark_store, run_streams};
use warehouse_sync::PipelineConfig;

#[derive(Parser)]
#[command(name = "warehouse-sync")]
#[command(about = "Incremental replication from a data warehouse into PostgreSQL and SurrealDB")]
#[command(long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run one, several or all configured streams once
    Sync {
        /// Pipeline configuration file
        #[arg(long, env = "WAREHOUSE_SYNC_CONFIG")]
        config: PathBuf,

        /// Stream to run (repeatable); all streams when omitted
        #[arg(long = "stream", value_name = "ID")]
        streams: Vec<String>,
    },

    /// Inspect or reset stream bookmarks
    Bookmark {
        #[command(subcommand)]
        command: BookmarkCommand,
    },

    /// Trigger and monitor Stitch extractions
    Stitch {
        #[command(subcommand)]
        command: StitchCommand,
    },
}

#[derive(Subcommand)]
enum BookmarkCommand {
    /// Print the stored bookmark of a stream
    Show {
        #[arg(long, env = "WAREHOUSE_SYNC_CONFIG")]
        config: PathBuf,

        #[arg(long)]
        stream: String,
    },

    /// Overwrite the bookmark of a stream, bypassing the monotonic guard
    Set {
        #[arg(long, env = "WAREHOUSE_SYNC_CONFIG")]
        config: PathBuf,

        #[arg(long)]
        stream: String,

        /// New value, in the stream's watermark kind
        #[arg(long)]
        value: String,
    },
}

#[derive(Subcommand)]
enum StitchCommand {
    /// Start an extraction and print its handle
    Trigger(StitchArgs),
    /// Fetch the status of a triggered extraction once
    Poll(StitchWaitArgs),
    /// Wait for a triggered extraction to finish
    Wait(StitchWaitArgs),
    /// Start an extraction and wait for it to finish
    Run(StitchArgs),
}

#[derive(Args)]
struct StitchArgs {
    #[arg(long, env = "WAREHOUSE_SYNC_CONFIG")]
    config: PathBuf,

    #[arg(long)]
    source_id: String,

    /// Delay between status polls, e.g. "30s" or "5m"
    #[arg(long)]
    poll_interval: Option<String>,

    /// Give up after this long, e.g. "2h"
    #[arg(long)]
    timeout: Option<String>,
}

#[derive(Args)]
struct StitchWaitArgs {
    #[command(flatten)]
    common: StitchArgs,

    /// When the job was triggered (RFC 3339); earlier extractions are ignored
    #[arg(long)]
    triggered_at: Option<String>,

    /// Job id as printed by `stitch trigger`
    #[arg(long)]
    job_id: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    if let Err(e) = run().await {
        eprintln!("Error: {e:#}");
        std::process::exit(1);
    }
    Ok(())
}

async fn run() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    warehouse_sync::install_crypto_provider();

    let cli = Cli::parse();

    match cli.command {
        Commands::Sync { config, streams } => {
            let config = PipelineConfig::from_file(&config)?;
            let cancel = setup_shutdown_handler();
            let outcomes = run_streams(&config, &streams, &cancel).await?;
            for (id, outcome) in outcomes {
                println!("{id}: {}", describe(&outcome));
            }
        }
        Commands::Bookmark { command } => run_bookmark(command).await?,
        Commands::Stitch { command } => run_stitch(command).await?,
    }

    Ok(())
}

async fn run_bookmark(command: BookmarkCommand) -> anyhow::Result<()> {
    match command {
        BookmarkCommand::Show { config, stream } => {
            let config = PipelineConfig::from_file(&config)?;
            let incremental = incremental_of(&config, &stream)?;
            let store = open_bookmark_store(&config.bookmarks).await;
            let bookmarks = Bookmarks::new(store, incremental.kind);
            match bookmarks.current(&stream).await? {
                Some(watermark) => println!("{stream}: {watermark} ({})", watermark.kind()),
                None => println!("{stream}: no bookmark"),
            }
        }
        BookmarkCommand::Set {
            config,
            stream,
            value,
        } => {
            let config = PipelineConfig::from_file(&config)?;
            let incremental = incremental_of(&config, &stream)?;
            let watermark = Watermark::parse(incremental.kind, &value)?;
            let store = open_bookmark_store(&config.bookmarks).await;
            let bookmarks = Bookmarks::new(store, incremental.kind);
            let previous = bookmarks.current(&stream).await.ok().flatten();
            bookmarks.overwrite(&stream, &watermark).await?;
            info!(
                "Bookmark for '{stream}' set to {watermark} (was {})",
                previous.map_or_else(|| "none".to_string(), |w| w.to_string())
            );
            println!("{stream}: {watermark}");
        }
    }
    Ok(())
}

fn incremental_of<'a>(
    config: &'a PipelineConfig,
    stream: &str,
) -> anyhow::Result<&'a sync_core::IncrementalConfig> {
    config
        .stream(stream)?
        .incremental
        .as_ref()
        .with_context(|| format!("Stream '{stream}' is not incremental and has no bookmark"))
}

async fn run_stitch(command: StitchCommand) -> anyhow::Result<()> {
    match command {
        StitchCommand::Trigger(args) => {
            let monitor = open_stitch(&args)?;
            let handle = jobs::trigger(&monitor, &args.source_id).await?;
            println!("{}", serde_json::to_string(&handle)?);
        }
        StitchCommand::Poll(args) => {
            let monitor = open_stitch(&args.common)?;
            let handle = external_handle(
                &args.common.source_id,
                args.job_id.as_deref(),
                args.triggered_at.as_deref(),
            )?;
            println!("{}", monitor.poll(&handle).await);
        }
        StitchCommand::Wait(args) => {
            let monitor = open_stitch(&args.common)?;
            let handle = external_handle(
                &args.common.source_id,
                args.job_id.as_deref(),
                args.triggered_at.as_deref(),
            )?;
            let cancel = setup_shutdown_handler();
            let status = jobs::wait(&monitor, &handle, &cancel).await?;
            println!("{handle}: {status}");
        }
        StitchCommand::Run(args) => {
            let monitor = open_stitch(&args)?;
            let cancel = setup_shutdown_handler();
            let handle = jobs::trigger(&monitor, &args.source_id).await?;
            let status = jobs::wait(&monitor, &handle, &cancel).await?;
            println!("{handle}: {status}");
        }
    }
    Ok(())
}

fn open_stitch(args: &StitchArgs) -> anyhow::Result<RunMonitor<StitchClient>> {
    let config = PipelineConfig::from_file(&args.config)?;
    let monitor = monitor_config(
        &config,
        args.poll_interval.as_deref(),
        args.timeout.as_deref(),
    )?;
    stitch_monitor(&config, monitor)
}

/// Cancel the returned token on Ctrl-C.
fn setup_shutdown_handler() -> CancellationToken {
    let cancel = CancellationToken::new();
    let token = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Received interrupt signal (Ctrl+C)");
            token.cancel();
        }
    });
    cancel
}
