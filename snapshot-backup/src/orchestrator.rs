//! Snapshot lifecycle: backup, restore and cleanup of daily indices against
//! weekly repositories, with the ledger as the record of what exists.

use crate::dates::{format_day, parse_day, previous_day, DateRange, RestoreWindow};
use crate::gateway::{CreateOutcome, RemoteSnapshot, SnapshotGateway};
use crate::ledger::Ledger;
use crate::naming::SnapshotTarget;
use crate::retry::RetryPolicy;
use crate::utils::errors::{BackupError, Result};
use chrono::NaiveDate;
use std::str::FromStr;
use tracing::{info, warn};

/// Terminal state of backing up one day.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackupOutcome {
    /// The ledger already lists the snapshot; nothing was sent.
    SnapshotExists,
    /// The daily index does not exist; skipped.
    PartitionMissing,
    SnapshotCreated,
    /// Still running when the retry budget ran out; the ledger is unchanged.
    SnapshotPending,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RestoreOutcome {
    Restored,
    /// No snapshot recorded for the day.
    NotInLedger,
}

/// Which snapshots `cleanup_snapshot` deletes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CleanupTarget {
    All,
    Day(NaiveDate),
}

impl FromStr for CleanupTarget {
    type Err = BackupError;

    fn from_str(value: &str) -> Result<Self> {
        if value.trim() == "all" {
            Ok(CleanupTarget::All)
        } else {
            Ok(CleanupTarget::Day(parse_day(value)?))
        }
    }
}

/// Per-day results of a multi-day run.
#[derive(Debug)]
pub struct RunSummary<T> {
    pub days: Vec<(NaiveDate, T)>,
}

impl<T> Default for RunSummary<T> {
    fn default() -> Self {
        Self { days: Vec::new() }
    }
}

impl<T: PartialEq> RunSummary<T> {
    pub fn count(&self, outcome: T) -> usize {
        self.days.iter().filter(|(_, o)| *o == outcome).count()
    }
}

pub struct SnapshotOrchestrator {
    gateway: SnapshotGateway,
    index_prefix: String,
    retry: RetryPolicy,
}

impl SnapshotOrchestrator {
    pub fn new(gateway: SnapshotGateway, index_prefix: impl Into<String>, retry: RetryPolicy) -> Self {
        Self {
            gateway,
            index_prefix: index_prefix.into(),
            retry,
        }
    }

    pub fn target(&self, day: NaiveDate) -> SnapshotTarget {
        SnapshotTarget::for_day(&self.index_prefix, day)
    }

    /// Create the repository unless the ledger already tracks it.
    pub async fn ensure_repository(&self, ledger: &mut Ledger, repository: &str) -> Result<()> {
        if ledger.has_repository(repository) {
            info!(repository, "Repository already exists");
            return Ok(());
        }
        self.gateway.create_repository(repository).await?;
        ledger.register_repository(repository);
        Ok(())
    }

    /// Back up a single day's index into its weekly repository.
    pub async fn backup_day(&self, ledger: &mut Ledger, day: NaiveDate) -> Result<BackupOutcome> {
        let target = self.target(day);
        info!(day = %format_day(day), repository = %target.repository, "Creating snapshot for day");

        self.ensure_repository(ledger, &target.repository).await?;

        if ledger.contains_snapshot(&target.repository, &target.snapshot) {
            info!(snapshot = %target.snapshot, "Snapshot already exists");
            return Ok(BackupOutcome::SnapshotExists);
        }

        if !self.gateway.partition_exists(&target.partition).await {
            info!(partition = %target.partition, "Index does not exist, skipping");
            return Ok(BackupOutcome::PartitionMissing);
        }

        info!(
            snapshot = %target.snapshot,
            repository = %target.repository,
            "Creating snapshot"
        );
        self.create_with_retry(ledger, &target).await
    }

    /// Issue the creation request; on a gateway timeout, wait with backoff and
    /// re-check the remote state before trying again.
    async fn create_with_retry(&self, ledger: &mut Ledger, target: &SnapshotTarget) -> Result<BackupOutcome> {
        let mut backoff = self.retry.backoff();
        loop {
            let outcome = self
                .gateway
                .create_snapshot(&target.repository, &target.snapshot, &target.partition)
                .await?;
            if outcome == CreateOutcome::Created {
                ledger.record_snapshot(&target.repository, &target.snapshot);
                return Ok(BackupOutcome::SnapshotCreated);
            }

            loop {
                let Some(delay) = backoff.next() else {
                    warn!(
                        snapshot = %target.snapshot,
                        attempts = backoff.attempt(),
                        "Snapshot still pending, giving up for this run"
                    );
                    return Ok(BackupOutcome::SnapshotPending);
                };
                info!(
                    snapshot = %target.snapshot,
                    delay_secs = delay.as_secs(),
                    attempt = backoff.attempt(),
                    "Snapshot in progress, waiting before re-checking"
                );
                tokio::time::sleep(delay).await;

                match self
                    .gateway
                    .snapshot_state(&target.repository, &target.snapshot)
                    .await?
                {
                    RemoteSnapshot::Completed => {
                        info!(snapshot = %target.snapshot, "Snapshot completed in the background");
                        ledger.record_snapshot(&target.repository, &target.snapshot);
                        return Ok(BackupOutcome::SnapshotCreated);
                    }
                    RemoteSnapshot::InProgress => continue,
                    RemoteSnapshot::Failed => {
                        warn!(snapshot = %target.snapshot, "Snapshot failed remotely, recreating");
                        self.gateway
                            .delete_snapshot(&target.repository, &target.snapshot)
                            .await;
                        break;
                    }
                    RemoteSnapshot::Missing => break,
                }
            }
        }
    }

    /// Back up the day before every day from `start` through `today`.
    pub async fn backup_range(
        &self,
        ledger: &mut Ledger,
        start: NaiveDate,
        today: NaiveDate,
    ) -> Result<RunSummary<BackupOutcome>> {
        info!(start = %format_day(start), "Creating snapshots from start date");
        let mut summary = RunSummary::default();
        for date in DateRange::new(start, today) {
            let backup_day = previous_day(date);
            let outcome = self.backup_day(ledger, backup_day).await?;
            summary.days.push((backup_day, outcome));
        }
        Ok(summary)
    }

    /// Restore a day's index if the ledger has its snapshot.
    pub async fn restore_day(&self, ledger: &Ledger, day: NaiveDate) -> Result<RestoreOutcome> {
        let target = self.target(day);
        if !ledger.contains_snapshot(&target.repository, &target.snapshot) {
            info!(day = %format_day(day), snapshot = %target.snapshot, "No snapshot recorded, skipping");
            return Ok(RestoreOutcome::NotInLedger);
        }
        self.gateway
            .restore_snapshot(&target.repository, &target.snapshot, &target.partition)
            .await?;
        Ok(RestoreOutcome::Restored)
    }

    pub async fn restore_window(
        &self,
        ledger: &Ledger,
        window: RestoreWindow,
    ) -> Result<RunSummary<RestoreOutcome>> {
        let mut summary = RunSummary::default();
        for day in window.days() {
            let outcome = self.restore_day(ledger, day).await?;
            summary.days.push((day, outcome));
        }
        Ok(summary)
    }

    /// Delete snapshots remotely and drop them from the ledger. Remote
    /// deletion is best-effort: the ledger is updated whatever the cluster
    /// answers. Returns the number of ledger entries removed.
    pub async fn cleanup_snapshots(&self, ledger: &mut Ledger, target: CleanupTarget) -> Result<usize> {
        match target {
            CleanupTarget::All => {
                let mut removed = 0;
                for (repository, snapshots) in ledger.repositories() {
                    info!(repository, "Cleaning up repository");
                    for snapshot in snapshots {
                        self.gateway.delete_snapshot(repository, snapshot).await;
                        removed += 1;
                    }
                }
                ledger.clear();
                Ok(removed)
            }
            CleanupTarget::Day(day) => {
                let target = self.target(day);
                if !ledger.contains_snapshot(&target.repository, &target.snapshot) {
                    info!(snapshot = %target.snapshot, "Snapshot not in ledger, nothing to delete");
                    return Ok(0);
                }
                self.gateway
                    .delete_snapshot(&target.repository, &target.snapshot)
                    .await;
                ledger.remove_snapshot(&target.repository, &target.snapshot);
                Ok(1)
            }
        }
    }
}
