//! Utility modules for the snapshot orchestrator.

pub mod errors;
pub mod logger;

pub use errors::{BackupError, Result};
