//! Custom error types for the snapshot orchestrator.

use reqwest::StatusCode;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum BackupError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid date '{value}': expected YYYY.MM.DD")]
    InvalidDate { value: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Object store error: {0}")]
    ObjectStore(#[from] object_store::Error),

    #[error("Failed to {operation}. Status received {status}: {body}")]
    SnapshotApi {
        operation: &'static str,
        status: StatusCode,
        body: String,
    },

    #[error("Index API call '{operation}' failed with status {status}: {body}")]
    IndexApi {
        operation: &'static str,
        status: StatusCode,
        body: String,
    },
}

impl BackupError {
    pub fn invalid_date(value: impl Into<String>) -> Self {
        BackupError::InvalidDate {
            value: value.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, BackupError>;
