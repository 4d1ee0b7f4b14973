//! Configuration management for the snapshot orchestrator.
//!
//! The configuration file is YAML keyed by environment name (`staging`,
//! `production`, ...). Each environment is deserialized into a typed
//! [`EnvironmentConfig`] and validated before any remote call is made.

use crate::dates::{parse_day, RestoreWindow};
use crate::orchestrator::CleanupTarget;
use crate::utils::errors::{BackupError, Result};
use serde::{Deserialize, Deserializer, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnvironmentConfig {
    /// Base URL of the Elasticsearch cluster
    pub elasticsearch_url: String,

    /// Bucket holding the snapshot repositories and the metadata document
    pub bucket_name: String,

    /// Bucket region
    pub region: String,

    /// Key prefix for repositories and the metadata document
    pub base_path: String,

    /// Daily index prefix, e.g. `logstash-`
    pub backup_index: String,

    /// First day (YYYY.MM.DD) of a catch-up backup
    #[serde(default)]
    pub start_date: Option<String>,

    /// Day or `start-end` range to restore
    #[serde(default)]
    pub restore_date: Option<String>,

    /// Indices older than this many days are deleted by `cleanup_index`
    #[serde(default, deserialize_with = "deserialize_days")]
    pub backup_retention_days: Option<u32>,

    /// Day whose snapshot `cleanup_snapshot` deletes, or `all`
    #[serde(default)]
    pub cleanup_snapshot_date: Option<String>,

    /// Per-request HTTP timeout. Unset means no timeout.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub http_timeout_secs: Option<u64>,

    /// Local directory the metadata document is staged in before upload
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scratch_dir: Option<PathBuf>,

    #[serde(default)]
    pub snapshot_retry: RetryConfig,
}

/// Backoff applied while a snapshot is still running after a gateway timeout.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Maximum number of waits before giving up on a pending snapshot
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// First wait in seconds, doubled after every attempt
    #[serde(default = "default_initial_delay_secs")]
    pub initial_delay_secs: u64,

    /// Upper bound for a single wait in seconds
    #[serde(default = "default_max_delay_secs")]
    pub max_delay_secs: u64,
}

// Default values
fn default_max_attempts() -> u32 {
    5
}

fn default_initial_delay_secs() -> u64 {
    180
}

fn default_max_delay_secs() -> u64 {
    30 * 60
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_delay_secs: default_initial_delay_secs(),
            max_delay_secs: default_max_delay_secs(),
        }
    }
}

/// Retention days may be written as a number or as a quoted string.
fn deserialize_days<'de, D>(deserializer: D) -> std::result::Result<Option<u32>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Days {
        Number(u32),
        Text(String),
    }

    match Option::<Days>::deserialize(deserializer)? {
        None => Ok(None),
        Some(Days::Number(days)) => Ok(Some(days)),
        Some(Days::Text(text)) if text.trim().is_empty() => Ok(None),
        Some(Days::Text(text)) => text
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| serde::de::Error::custom(format!("invalid retention days '{}'", text))),
    }
}

/// Values supplied on the command line; each one replaces the file's value.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub start_date: Option<String>,
    pub restore_date: Option<String>,
    pub retention_days: Option<u32>,
    pub cleanup_snapshot_date: Option<String>,
}

impl EnvironmentConfig {
    /// Load and validate one environment from a YAML configuration file.
    pub fn from_file(path: &Path, environment: &str) -> Result<Self> {
        tracing::debug!(path = %path.display(), environment, "Loading configuration");
        let content = std::fs::read_to_string(path).map_err(|e| {
            BackupError::Config(format!("Unable to read {}: {}", path.display(), e))
        })?;
        Self::from_yaml(&content, environment)
    }

    /// Parse one environment out of a YAML document.
    pub fn from_yaml(content: &str, environment: &str) -> Result<Self> {
        let document: serde_yaml::Value = serde_yaml::from_str(content)?;
        let section = document
            .get(environment)
            .filter(|section| !section.is_null())
            .cloned()
            .ok_or_else(|| {
                BackupError::Config(format!(
                    "Invalid config file or environment '{}'",
                    environment
                ))
            })?;

        let config: EnvironmentConfig = serde_yaml::from_value(section).map_err(|e| {
            BackupError::Config(format!("Environment '{}': {}", environment, e))
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Reject empty required keys and malformed optional values.
    pub fn validate(&self) -> Result<()> {
        let required = [
            ("elasticsearch_url", &self.elasticsearch_url),
            ("bucket_name", &self.bucket_name),
            ("region", &self.region),
            ("base_path", &self.base_path),
            ("backup_index", &self.backup_index),
        ];
        for (key, value) in required {
            if value.trim().is_empty() {
                return Err(BackupError::Config(format!("Missing required key '{}'", key)));
            }
        }

        reqwest::Url::parse(&self.elasticsearch_url).map_err(|e| {
            BackupError::Config(format!(
                "Invalid elasticsearch_url '{}': {}",
                self.elasticsearch_url, e
            ))
        })?;

        if let Some(start) = &self.start_date {
            parse_day(start)?;
        }
        if let Some(window) = &self.restore_date {
            window.parse::<RestoreWindow>()?;
        }
        if let Some(target) = &self.cleanup_snapshot_date {
            target.parse::<CleanupTarget>()?;
        }
        if self.snapshot_retry.initial_delay_secs > self.snapshot_retry.max_delay_secs {
            return Err(BackupError::Config(
                "snapshot_retry.initial_delay_secs exceeds max_delay_secs".to_string(),
            ));
        }

        Ok(())
    }

    /// Merge command line values and re-validate.
    pub fn apply_overrides(&mut self, overrides: Overrides) -> Result<()> {
        if let Some(start) = overrides.start_date {
            self.start_date = Some(start);
        }
        if let Some(window) = overrides.restore_date {
            self.restore_date = Some(window);
        }
        if let Some(days) = overrides.retention_days {
            self.backup_retention_days = Some(days);
        }
        if let Some(day) = overrides.cleanup_snapshot_date {
            self.cleanup_snapshot_date = Some(day);
        }
        self.validate()
    }

    /// Elasticsearch base URL without a trailing slash.
    pub fn cluster_url(&self) -> &str {
        self.elasticsearch_url.trim_end_matches('/')
    }

    pub fn http_timeout(&self) -> Option<Duration> {
        self.http_timeout_secs.map(Duration::from_secs)
    }

    pub fn scratch_dir(&self) -> PathBuf {
        self.scratch_dir.clone().unwrap_or_else(std::env::temp_dir)
    }
}
