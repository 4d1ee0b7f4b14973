//! Client for the Elasticsearch snapshot API.
//!
//! Each method is a single HTTP call. Bookkeeping (ledger updates, retry
//! decisions) is left to the orchestrator.

use crate::config::EnvironmentConfig;
use crate::utils::errors::{BackupError, Result};
use reqwest::{Client, Response, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, info, warn};

/// Outcome of a snapshot creation request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CreateOutcome {
    Created,
    /// The gateway timed out while the cluster keeps working on the snapshot.
    Pending,
}

/// State of a snapshot as reported by the cluster.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoteSnapshot {
    Missing,
    InProgress,
    Completed,
    Failed,
}

#[derive(Debug, Serialize)]
struct SnapshotRequest<'a> {
    indices: &'a str,
    ignore_unavailable: bool,
    include_global_state: bool,
}

impl<'a> SnapshotRequest<'a> {
    fn for_partition(partition: &'a str) -> Self {
        Self {
            indices: partition,
            ignore_unavailable: true,
            include_global_state: false,
        }
    }
}

#[derive(Debug, Deserialize)]
struct SnapshotListing {
    #[serde(default)]
    snapshots: Vec<SnapshotInfo>,
}

#[derive(Debug, Deserialize)]
struct SnapshotInfo {
    snapshot: String,
    #[serde(default)]
    state: Option<String>,
}

pub struct SnapshotGateway {
    client: Client,
    base_url: String,
    bucket: String,
    region: String,
    base_path: String,
}

impl SnapshotGateway {
    pub fn new(config: &EnvironmentConfig) -> Result<Self> {
        let mut builder = Client::builder();
        if let Some(timeout) = config.http_timeout() {
            builder = builder.timeout(timeout);
        }
        Ok(Self::with_client(builder.build()?, config))
    }

    pub fn with_client(client: Client, config: &EnvironmentConfig) -> Self {
        Self {
            client,
            base_url: config.cluster_url().to_string(),
            bucket: config.bucket_name.clone(),
            region: config.region.clone(),
            base_path: config.base_path.trim_end_matches('/').to_string(),
        }
    }

    fn snapshot_url(&self, repository: &str, snapshot: &str) -> String {
        format!("{}/_snapshot/{}/{}", self.base_url, repository, snapshot)
    }

    /// Register an S3 repository stored under `<base_path>/<repository>`.
    pub async fn create_repository(&self, repository: &str) -> Result<()> {
        let url = format!("{}/_snapshot/{}", self.base_url, repository);
        let payload = json!({
            "type": "s3",
            "settings": {
                "bucket": self.bucket,
                "region": self.region,
                "base_path": format!("{}/{}", self.base_path, repository),
            }
        });

        let response = self
            .client
            .put(&url)
            .query(&[("verify", "false"), ("pretty", "")])
            .json(&payload)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(api_error("create snapshot repository", response).await);
        }
        info!(repository, "Repository created");
        Ok(())
    }

    /// Snapshot one partition and wait for completion.
    pub async fn create_snapshot(
        &self,
        repository: &str,
        snapshot: &str,
        partition: &str,
    ) -> Result<CreateOutcome> {
        let response = self
            .client
            .put(self.snapshot_url(repository, snapshot))
            .query(&[("wait_for_completion", "true"), ("pretty", "")])
            .json(&SnapshotRequest::for_partition(partition))
            .send()
            .await?;

        match response.status() {
            StatusCode::GATEWAY_TIMEOUT => {
                warn!(repository, snapshot, "Snapshot still in progress after gateway timeout");
                Ok(CreateOutcome::Pending)
            }
            StatusCode::OK => {
                info!(repository, snapshot, "Snapshot created");
                Ok(CreateOutcome::Created)
            }
            _ => Err(api_error("create snapshot", response).await),
        }
    }

    /// Ask the cluster what it knows about a snapshot.
    pub async fn snapshot_state(&self, repository: &str, snapshot: &str) -> Result<RemoteSnapshot> {
        let response = self
            .client
            .get(self.snapshot_url(repository, snapshot))
            .send()
            .await?;

        if response.status() == StatusCode::NOT_FOUND {
            return Ok(RemoteSnapshot::Missing);
        }
        if !response.status().is_success() {
            return Err(api_error("read snapshot state", response).await);
        }

        let listing: SnapshotListing = response.json().await?;
        let state = listing
            .snapshots
            .into_iter()
            .find(|info| info.snapshot == snapshot)
            .map(|info| info.state.unwrap_or_default());

        let remote = match state.as_deref() {
            None => RemoteSnapshot::Missing,
            Some("SUCCESS") => RemoteSnapshot::Completed,
            Some("IN_PROGRESS") | Some("STARTED") | Some("INIT") => RemoteSnapshot::InProgress,
            Some(_) => RemoteSnapshot::Failed,
        };
        debug!(repository, snapshot, state = ?remote, "Snapshot state");
        Ok(remote)
    }

    /// Best-effort delete. Failures are logged, never returned.
    pub async fn delete_snapshot(&self, repository: &str, snapshot: &str) {
        info!(repository, snapshot, "Deleting snapshot");
        match self
            .client
            .delete(self.snapshot_url(repository, snapshot))
            .send()
            .await
        {
            Ok(response) => {
                let status = response.status();
                let body = response.text().await.unwrap_or_default();
                if status.is_success() {
                    info!(repository, snapshot, %status, body = %body.trim(), "Snapshot deleted");
                } else {
                    warn!(repository, snapshot, %status, body = %body.trim(), "Snapshot deletion failed");
                }
            }
            Err(e) => warn!(repository, snapshot, error = %e, "Snapshot deletion request failed"),
        }
    }

    /// Restore one partition from a snapshot.
    pub async fn restore_snapshot(
        &self,
        repository: &str,
        snapshot: &str,
        partition: &str,
    ) -> Result<()> {
        let url = format!("{}/_restore", self.snapshot_url(repository, snapshot));
        let response = self
            .client
            .post(&url)
            .json(&SnapshotRequest::for_partition(partition))
            .send()
            .await?;

        if response.status() != StatusCode::OK {
            return Err(api_error("restore snapshot", response).await);
        }
        info!(repository, snapshot, partition, "Snapshot restored");
        Ok(())
    }

    /// Whether the daily index exists. Transport errors count as absent.
    pub async fn partition_exists(&self, partition: &str) -> bool {
        let url = format!("{}/{}", self.base_url, partition);
        match self.client.head(&url).send().await {
            Ok(response) if response.status() == StatusCode::OK => {
                debug!(partition, "Index exists");
                true
            }
            Ok(response) => {
                debug!(partition, status = %response.status(), "Index not found");
                false
            }
            Err(e) => {
                warn!(partition, error = %e, "Index existence check failed");
                false
            }
        }
    }
}

async fn api_error(operation: &'static str, response: Response) -> BackupError {
    let status = response.status();
    let body = response
        .text()
        .await
        .unwrap_or_else(|_| "Unknown error".to_string());
    BackupError::SnapshotApi {
        operation,
        status,
        body,
    }
}
