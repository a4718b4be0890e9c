use anyhow::Result;
use clap::{Parser, Subcommand};
use colored::*;
use std::env;
use std::path::PathBuf;
use tokio_util::sync::CancellationToken;
use tracing::{info, Level};
use tracing_subscriber::{
    fmt::{self, time::ChronoUtc},
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter,
};
use tuple_reconciler::ReconcilerSettings;

mod commands;
mod snapshot;

use commands::{RunArgs, SnapshotArgs};

/// Plan or apply tuple reconciliation between snapshot files
#[derive(Parser, Debug)]
#[command(name = "tuple-sync")]
#[command(about = "Reconcile remote authorization tuples against the legacy permission source")]
struct Cli {
    /// Settings file (YAML or TOML); TUPLE_SYNC_* variables override it
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the changes a reconciliation pass would make, as JSON
    Plan(SnapshotArgs),

    /// Run a reconciliation pass against the remote snapshot
    Apply {
        #[command(flatten)]
        snapshots: SnapshotArgs,

        /// Where to write the reconciled remote snapshot
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Reconcile the configured namespaces every `interval_secs` until Ctrl+C
    Run(RunArgs),
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let settings = ReconcilerSettings::load(cli.config.as_deref())?;

    match cli.command {
        Command::Plan(args) => {
            let changes = commands::plan(&args, settings.batch_size).await?;
            println!("{}", serde_json::to_string_pretty(&changes)?);
        }
        Command::Apply { snapshots, output } => {
            let summary =
                commands::apply(&snapshots, settings.batch_size, output.as_deref()).await?;
            if summary.is_noop() {
                println!("{}", "already in sync".bright_green());
            } else {
                println!(
                    "{} {} deletes, {} writes in {} batches",
                    "reconciled:".bright_cyan(),
                    summary.deletes,
                    summary.writes,
                    summary.batches
                );
            }
        }
        Command::Run(args) => {
            let token = CancellationToken::new();
            let shutdown = token.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    info!("Received Ctrl+C, stopping reconciliation");
                    shutdown.cancel();
                }
            });

            commands::run(&args, &settings, &token).await?;
            println!("{}", "reconciled snapshots written".bright_green());
        }
    }

    Ok(())
}

fn init_tracing(verbose: bool) {
    let level = if verbose { Level::DEBUG } else { Level::INFO };

    let is_production = env::var("TUPLE_SYNC_ENV").map(|v| v == "production").unwrap_or(false);

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| format!("tuple_reconciler={},tuple_sync={}", level, level).into());

    if is_production {
        // Structured JSON logging for production
        tracing_subscriber::registry()
            .with(env_filter)
            .with(
                fmt::layer()
                    .with_target(false)
                    .with_timer(ChronoUtc::rfc_3339())
                    .with_ansi(false)
                    .with_writer(std::io::stderr)
                    .json(),
            )
            .init();
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(
                fmt::layer()
                    .with_target(true)
                    .with_timer(ChronoUtc::rfc_3339())
                    .with_writer(std::io::stderr),
            )
            .init();
    }
}
