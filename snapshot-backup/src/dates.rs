//! Calendar helpers: the `YYYY.MM.DD` day format and day ranges.

use crate::utils::errors::{BackupError, Result};
use chrono::{Days, NaiveDate};
use std::str::FromStr;

/// Day format used in index, snapshot and repository names.
pub const DAY_FORMAT: &str = "%Y.%m.%d";

/// Parse a `YYYY.MM.DD` day.
pub fn parse_day(value: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(value.trim(), DAY_FORMAT)
        .map_err(|_| BackupError::invalid_date(value))
}

pub fn format_day(day: NaiveDate) -> String {
    day.format(DAY_FORMAT).to_string()
}

/// The day before `day`, saturating at the earliest representable date.
pub fn previous_day(day: NaiveDate) -> NaiveDate {
    day.pred_opt().unwrap_or(day)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Direction {
    Forward,
    Backward,
}

/// Lazy sequence of days between two endpoints.
///
/// Distinct endpoints walk forward from `start` to `end` inclusive (nothing
/// when `end` precedes `start`). Equal endpoints take the backward branch,
/// which walks `start - start` days and therefore yields `start` alone.
/// The iterator is `Clone`, so a range can be replayed.
#[derive(Debug, Clone)]
pub struct DateRange {
    start: NaiveDate,
    direction: Direction,
    offset: u64,
    len: u64,
}

impl DateRange {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Self {
        if start != end {
            let span = (end - start).num_days() + 1;
            Self {
                start,
                direction: Direction::Forward,
                offset: 0,
                len: span.max(0) as u64,
            }
        } else {
            let span = (start - end).num_days() + 1;
            Self {
                start,
                direction: Direction::Backward,
                offset: 0,
                len: span.max(0) as u64,
            }
        }
    }
}

impl Iterator for DateRange {
    type Item = NaiveDate;

    fn next(&mut self) -> Option<NaiveDate> {
        while self.offset < self.len {
            let step = Days::new(self.offset);
            self.offset += 1;
            let day = match self.direction {
                Direction::Forward => self.start.checked_add_days(step),
                Direction::Backward => self.start.checked_sub_days(step),
            };
            if day.is_some() {
                return day;
            }
        }
        None
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = (self.len - self.offset) as usize;
        (0, Some(remaining))
    }
}

/// Days selected for a restore: a single day or an inclusive `start-end` range.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RestoreWindow {
    Day(NaiveDate),
    Range { start: NaiveDate, end: NaiveDate },
}

impl RestoreWindow {
    pub fn days(&self) -> DateRange {
        match *self {
            RestoreWindow::Day(day) => DateRange::new(day, day),
            RestoreWindow::Range { start, end } => DateRange::new(start, end),
        }
    }
}

impl FromStr for RestoreWindow {
    type Err = BackupError;

    fn from_str(value: &str) -> Result<Self> {
        let parts: Vec<&str> = value.split('-').collect();
        match parts.as_slice() {
            [day] => Ok(RestoreWindow::Day(parse_day(day)?)),
            [start, end] => Ok(RestoreWindow::Range {
                start: parse_day(start)?,
                end: parse_day(end)?,
            }),
            _ => Err(BackupError::invalid_date(value)),
        }
    }
}
