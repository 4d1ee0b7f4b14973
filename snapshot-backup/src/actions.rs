//! Top-level actions selected with `--action`.
//!
//! Each action loads what it needs, runs to completion and persists the
//! ledger when it changed it. Invocations must not overlap: the ledger upload
//! is last-writer-wins.

use crate::config::EnvironmentConfig;
use crate::dates::{parse_day, RestoreWindow};
use crate::gateway::SnapshotGateway;
use crate::ledger::Ledger;
use crate::orchestrator::{BackupOutcome, CleanupTarget, RestoreOutcome, SnapshotOrchestrator};
use crate::retention::IndexJanitor;
use crate::retry::RetryPolicy;
use crate::store::MetadataStore;
use crate::utils::errors::{BackupError, Result};
use chrono::{DateTime, NaiveDate, Utc};
use std::fmt;
use std::str::FromStr;
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Backup,
    Restore,
    CleanupIndex,
    CleanupSnapshot,
}

impl FromStr for Action {
    type Err = String;

    fn from_str(value: &str) -> std::result::Result<Self, String> {
        match value {
            "backup" => Ok(Action::Backup),
            "restore" => Ok(Action::Restore),
            "cleanup_index" => Ok(Action::CleanupIndex),
            "cleanup_snapshot" => Ok(Action::CleanupSnapshot),
            other => Err(format!("Invalid action specified: {}", other)),
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Action::Backup => "backup",
            Action::Restore => "restore",
            Action::CleanupIndex => "cleanup_index",
            Action::CleanupSnapshot => "cleanup_snapshot",
        };
        f.write_str(name)
    }
}

/// Wall-clock inputs, passed in so runs are reproducible in tests.
#[derive(Debug, Clone, Copy)]
pub struct Clock {
    pub today: NaiveDate,
    pub now: DateTime<Utc>,
}

impl Clock {
    pub fn system() -> Self {
        Self {
            today: chrono::Local::now().date_naive(),
            now: Utc::now(),
        }
    }
}

pub struct ActionRunner {
    config: EnvironmentConfig,
    store: MetadataStore,
    orchestrator: SnapshotOrchestrator,
    janitor: IndexJanitor,
}

impl ActionRunner {
    /// Runner backed by S3 and the configured cluster.
    pub fn from_config(config: EnvironmentConfig) -> Result<Self> {
        let store = MetadataStore::s3(&config)?;
        Self::with_store(config, store)
    }

    pub fn with_store(config: EnvironmentConfig, store: MetadataStore) -> Result<Self> {
        let retry = RetryPolicy::from(&config.snapshot_retry);
        Self::with_retry(config, store, retry)
    }

    pub fn with_retry(config: EnvironmentConfig, store: MetadataStore, retry: RetryPolicy) -> Result<Self> {
        let gateway = SnapshotGateway::new(&config)?;
        let orchestrator = SnapshotOrchestrator::new(gateway, config.backup_index.clone(), retry);
        let janitor = IndexJanitor::new(&config)?;
        Ok(Self {
            config,
            store,
            orchestrator,
            janitor,
        })
    }

    pub async fn run(&self, action: Action, clock: Clock) -> Result<()> {
        info!(%action, "Running action");
        match action {
            Action::Backup => self.backup(clock.today).await,
            Action::Restore => self.restore().await,
            Action::CleanupIndex => self.cleanup_index(clock.now).await.map(|_| ()),
            Action::CleanupSnapshot => self.cleanup_snapshot().await,
        }
    }

    /// Back up yesterday, or every day since `start_date` when configured.
    pub async fn backup(&self, today: NaiveDate) -> Result<()> {
        let mut ledger = Ledger::load(&self.store).await?;

        match &self.config.start_date {
            Some(start) => {
                let summary = self
                    .orchestrator
                    .backup_range(&mut ledger, parse_day(start)?, today)
                    .await?;
                info!(
                    days = summary.days.len(),
                    created = summary.count(BackupOutcome::SnapshotCreated),
                    existing = summary.count(BackupOutcome::SnapshotExists),
                    missing = summary.count(BackupOutcome::PartitionMissing),
                    pending = summary.count(BackupOutcome::SnapshotPending),
                    "Backup range processed"
                );
            }
            None => {
                let yesterday = crate::dates::previous_day(today);
                let outcome = self.orchestrator.backup_day(&mut ledger, yesterday).await?;
                info!(?outcome, "Backup day processed");
            }
        }

        self.persist(&mut ledger).await?;
        info!("Backup completed successfully");
        Ok(())
    }

    pub async fn restore(&self) -> Result<()> {
        let ledger = Ledger::load(&self.store).await?;
        let Some(window) = &self.config.restore_date else {
            info!("No restore date provided, nothing to restore");
            return Ok(());
        };

        let summary = self
            .orchestrator
            .restore_window(&ledger, window.parse::<RestoreWindow>()?)
            .await?;
        info!(
            window = %window,
            restored = summary.count(RestoreOutcome::Restored),
            skipped = summary.count(RestoreOutcome::NotInLedger),
            "Restore completed"
        );
        Ok(())
    }

    pub async fn cleanup_index(&self, now: DateTime<Utc>) -> Result<Vec<String>> {
        let Some(days) = self.config.backup_retention_days else {
            info!("No retention days configured, no indices deleted");
            return Ok(Vec::new());
        };
        self.janitor.delete_older_than(days, now).await
    }

    pub async fn cleanup_snapshot(&self) -> Result<()> {
        let target: CleanupTarget = self
            .config
            .cleanup_snapshot_date
            .as_deref()
            .ok_or_else(|| BackupError::Config("Snapshot cleanup date is not provided".to_string()))?
            .parse()?;

        let mut ledger = Ledger::load(&self.store).await?;
        let removed = self.orchestrator.cleanup_snapshots(&mut ledger, target).await?;
        info!(removed, "Snapshot cleanup completed");
        self.persist(&mut ledger).await
    }

    async fn persist(&self, ledger: &mut Ledger) -> Result<()> {
        if !ledger.save(&self.config, &self.store).await? {
            warn!(bucket = self.store.bucket(), "Metadata was not uploaded");
        }
        Ok(())
    }
}
