//! Deterministic names for weekly repositories, snapshots and daily indices.

use crate::dates::format_day;
use chrono::{Datelike, Days, NaiveDate};

pub const REPOSITORY_PREFIX: &str = "elasticsearch-backup-";
pub const SNAPSHOT_PREFIX: &str = "snapshot-";

/// The Monday on or before `day`.
pub fn week_start(day: NaiveDate) -> NaiveDate {
    let offset = u64::from(day.weekday().num_days_from_monday());
    day.checked_sub_days(Days::new(offset)).unwrap_or(day)
}

/// Repository holding every snapshot taken during the ISO week of `day`.
pub fn weekly_repository(day: NaiveDate) -> String {
    format!("{}{}", REPOSITORY_PREFIX, format_day(week_start(day)))
}

/// Names involved in backing up one day.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SnapshotTarget {
    pub repository: String,
    pub snapshot: String,
    pub partition: String,
}

impl SnapshotTarget {
    pub fn for_day(index_prefix: &str, day: NaiveDate) -> Self {
        let partition = format!("{}{}", index_prefix, format_day(day));
        Self {
            repository: weekly_repository(day),
            snapshot: format!("{}{}", SNAPSHOT_PREFIX, partition),
            partition,
        }
    }
}
