//! streamtally - live viewer snapshot sweep

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::io::Read;
use std::path::PathBuf;
use std::sync::Arc;
use streamtally_common::logging::{init_logging, LogConfig, LogLevel};
use streamtally_ingest::config::{IngestConfig, DEFAULT_CONFIG_PATH};
use streamtally_ingest::orchestrator::SweepOrchestrator;
use streamtally_ingest::staging::{S3ObjectStore, StagingStore};
use streamtally_ingest::trigger::TriggerEvent;
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "streamtally")]
#[command(author, version, about = "Live broadcast viewer snapshots into the warehouse")]
struct Cli {
    /// Configuration file
    #[arg(short, long, env = "STREAMTALLY_CONFIG", default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run one sweep over the configured channels
    Sweep {
        /// Trigger event JSON file, or '-' for stdin. Without it a local
        /// event is synthesized.
        #[arg(short, long)]
        event: Option<String>,
    },

    /// Load and validate the configuration, then exit
    CheckConfig,

    /// Delete staged artifacts left behind by interrupted sweeps
    Prune,
}

fn read_event(source: &str) -> Result<TriggerEvent> {
    let raw = if source == "-" {
        let mut buf = String::new();
        std::io::stdin()
            .read_to_string(&mut buf)
            .context("Failed to read event from stdin")?;
        buf
    } else {
        std::fs::read_to_string(source).with_context(|| format!("Failed to read event file {}", source))?
    };
    Ok(TriggerEvent::from_json(&raw)?)
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let log_level = if cli.verbose {
        LogLevel::Debug
    } else {
        LogLevel::Info
    };
    let log_config = LogConfig::default()
        .level(log_level)
        .log_file_prefix("streamtally")
        .with_env_overrides()?;
    let _log_guard = init_logging(&log_config)?;

    let config = IngestConfig::load(&cli.config)?;

    match cli.command {
        Command::Sweep { event } => {
            let event = match event {
                Some(source) => read_event(&source)?,
                None => TriggerEvent::local(&config.channels())?,
            };

            let orchestrator = SweepOrchestrator::from_config(&config)?;
            let report = orchestrator.handle_event(&event).await?;

            info!(
                loaded = report.loaded(),
                skipped = report.skipped(),
                failed = report.failed(),
                "Sweep {} finished",
                report.sweep
            );
        },
        Command::CheckConfig => {
            info!(
                channels = config.channel_ids.len(),
                destination = %config.destination(),
                bucket = %config.bucket_name,
                "Configuration is valid"
            );
        },
        Command::Prune => {
            let store = S3ObjectStore::new(&config.staging, &config.bucket_name)?;
            let staging = StagingStore::new(Arc::new(store), &config.scratch_dir);
            let removed = staging.prune_orphans().await?;
            info!("Pruned {} orphaned artifacts", removed.len());
        },
    }

    Ok(())
}
