//! Metadata ledger: which snapshots are believed to exist in which weekly
//! repository.
//!
//! The ledger is downloaded at the start of every run, mutated in memory and
//! uploaded again when the run finishes. It is the only thing consulted when
//! deciding whether a repository or snapshot already exists.

use crate::config::EnvironmentConfig;
use crate::store::MetadataStore;
use crate::utils::errors::Result;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::info;

/// Document used when no metadata has been uploaded yet.
const TEMPLATE: &str = include_str!("../config/backup_metadata.yml.template");

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Ledger {
    /// Repository name → snapshot names in creation order
    #[serde(default, deserialize_with = "null_as_default")]
    snapshots: BTreeMap<String, Vec<String>>,

    /// Most recently created snapshot. Replaced on every creation, so it holds
    /// at most one repository.
    #[serde(default, deserialize_with = "null_as_default")]
    last_good: BTreeMap<String, String>,

    /// Environment configuration at the time of the last upload
    #[serde(default, skip_serializing_if = "Option::is_none")]
    configs: Option<serde_yaml::Value>,
}

fn null_as_default<'de, D, T>(deserializer: D) -> std::result::Result<T, D::Error>
where
    D: serde::Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

impl Ledger {
    pub fn has_repository(&self, repository: &str) -> bool {
        self.snapshots.contains_key(repository)
    }

    /// Start tracking a repository. Existing entries are kept.
    pub fn register_repository(&mut self, repository: &str) {
        self.snapshots.entry(repository.to_string()).or_default();
    }

    pub fn contains_snapshot(&self, repository: &str, snapshot: &str) -> bool {
        self.snapshots
            .get(repository)
            .is_some_and(|snapshots| snapshots.iter().any(|s| s == snapshot))
    }

    /// Record a snapshot the cluster confirmed, and make it the last good one.
    pub fn record_snapshot(&mut self, repository: &str, snapshot: &str) {
        let snapshots = self.snapshots.entry(repository.to_string()).or_default();
        if !snapshots.iter().any(|s| s == snapshot) {
            snapshots.push(snapshot.to_string());
        }
        self.last_good.clear();
        self.last_good
            .insert(repository.to_string(), snapshot.to_string());
    }

    /// Forget a snapshot. `last_good` is left as is.
    pub fn remove_snapshot(&mut self, repository: &str, snapshot: &str) -> bool {
        match self.snapshots.get_mut(repository) {
            Some(snapshots) => {
                let before = snapshots.len();
                snapshots.retain(|s| s != snapshot);
                snapshots.len() != before
            }
            None => false,
        }
    }

    /// Drop every repository and the last good snapshot.
    pub fn clear(&mut self) {
        self.snapshots.clear();
        self.last_good.clear();
    }

    pub fn repositories(&self) -> impl Iterator<Item = (&str, &[String])> {
        self.snapshots
            .iter()
            .map(|(repository, snapshots)| (repository.as_str(), snapshots.as_slice()))
    }

    pub fn snapshots_in(&self, repository: &str) -> &[String] {
        self.snapshots
            .get(repository)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    pub fn snapshot_count(&self) -> usize {
        self.snapshots.values().map(Vec::len).sum()
    }

    /// `(repository, snapshot)` of the most recent successful snapshot.
    pub fn last_good(&self) -> Option<(&str, &str)> {
        self.last_good
            .iter()
            .next()
            .map(|(repository, snapshot)| (repository.as_str(), snapshot.as_str()))
    }

    pub fn is_empty(&self) -> bool {
        self.snapshots.is_empty() && self.last_good.is_empty()
    }

    /// Parse a metadata document. An empty document yields an empty ledger.
    pub fn from_yaml(contents: &[u8]) -> Result<Self> {
        let document: serde_yaml::Value = if contents.iter().all(u8::is_ascii_whitespace) {
            serde_yaml::Value::Null
        } else {
            serde_yaml::from_slice(contents)?
        };
        if document.is_null() {
            return Ok(Ledger::default());
        }
        Ok(serde_yaml::from_value(document)?)
    }

    pub fn to_yaml(&self) -> Result<String> {
        Ok(serde_yaml::to_string(self)?)
    }

    /// Download the ledger, falling back to the bundled template when the
    /// store has no copy yet.
    pub async fn load(store: &MetadataStore) -> Result<Self> {
        let ledger = match store.fetch().await? {
            Some(contents) => Ledger::from_yaml(&contents)?,
            None => {
                info!("No metadata uploaded yet, starting from template");
                Ledger::from_yaml(TEMPLATE.as_bytes())?
            }
        };
        info!(
            bucket = store.bucket(),
            repositories = ledger.snapshots.len(),
            snapshots = ledger.snapshot_count(),
            "Metadata loaded"
        );
        Ok(ledger)
    }

    /// Embed `configs` and upload the ledger. `Ok(false)` when the store
    /// reports the upload target as not found.
    pub async fn save(&mut self, configs: &EnvironmentConfig, store: &MetadataStore) -> Result<bool> {
        self.configs = Some(serde_yaml::to_value(configs)?);
        let contents = self.to_yaml()?;
        store.upload(Bytes::from(contents)).await
    }
}
