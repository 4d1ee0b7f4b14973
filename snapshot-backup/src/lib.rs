//! Snapshot Backup Library
//!
//! Weekly Elasticsearch snapshot orchestration: daily indices are snapshotted
//! into one S3 repository per ISO week, restored on demand and expired by age.
//! A metadata ledger kept in the bucket records what has been snapshotted.

pub mod actions;
pub mod config;
pub mod dates;
pub mod gateway;
pub mod ledger;
pub mod naming;
pub mod orchestrator;
pub mod retention;
pub mod retry;
pub mod store;
pub mod utils;

#[cfg(test)]
pub(crate) mod test_support;

// Re-export commonly used types
pub use config::EnvironmentConfig;
pub use ledger::Ledger;
pub use utils::errors::BackupError;
pub type Result<T> = std::result::Result<T, BackupError>;
