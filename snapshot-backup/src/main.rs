//! Snapshot Backup - Main entry point
//!
//! Runs one backup, restore or cleanup action against an environment and exits.

use anyhow::Result;
use clap::Parser;
use snapshot_backup::actions::{Action, ActionRunner, Clock};
use snapshot_backup::config::{EnvironmentConfig, Overrides};
use snapshot_backup::utils;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the YAML configuration file
    #[arg(long, value_name = "FILE", default_value = "config/elasticsearch_backup.yml")]
    config_path: PathBuf,

    /// Environment section of the configuration file (staging, production)
    #[arg(long, default_value = "staging")]
    environment: String,

    /// Action to perform: backup, restore, cleanup_index, cleanup_snapshot
    #[arg(long, default_value = "backup")]
    action: String,

    /// Restore only: YYYY.MM.DD or a range such as 2018.04.15-2018.04.20
    #[arg(long)]
    restore_date: Option<String>,

    /// cleanup_index only: indices older than this many days are deleted
    #[arg(long, default_value_t = 15)]
    retention_days: u32,

    /// cleanup_snapshot only: YYYY.MM.DD of the snapshot to delete, or `all`
    #[arg(long)]
    cleanup_snapshot_date: Option<String>,

    /// Backup only: snapshot every day from YYYY.MM.DD up to yesterday
    #[arg(long)]
    start_date: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    utils::logger::init(&args.log_level)?;

    tracing::info!(
        "Running snapshot-backup v{} with environment {}",
        env!("CARGO_PKG_VERSION"),
        args.environment
    );

    let action: Action = match args.action.parse() {
        Ok(action) => action,
        Err(message) => {
            println!("{}", message);
            return Ok(());
        }
    };

    let mut config = EnvironmentConfig::from_file(&args.config_path, &args.environment)?;

    // Only the flags relevant to the chosen action override the file.
    let overrides = match action {
        Action::Backup => Overrides {
            start_date: args.start_date,
            ..Default::default()
        },
        Action::Restore => Overrides {
            restore_date: args.restore_date,
            ..Default::default()
        },
        Action::CleanupIndex => Overrides {
            retention_days: Some(args.retention_days),
            ..Default::default()
        },
        Action::CleanupSnapshot => Overrides {
            cleanup_snapshot_date: args.cleanup_snapshot_date,
            ..Default::default()
        },
    };
    config.apply_overrides(overrides)?;

    let runner = ActionRunner::from_config(config)?;
    runner.run(action, Clock::system()).await?;

    Ok(())
}
