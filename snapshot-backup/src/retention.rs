//! Age-based deletion of daily indices.

use crate::config::EnvironmentConfig;
use crate::dates::DAY_FORMAT;
use crate::utils::errors::{BackupError, Result};
use chrono::{DateTime, Duration, NaiveDate, Utc};
use reqwest::Client;
use serde::Deserialize;
use tracing::{debug, info};

#[derive(Debug, Deserialize)]
struct CatIndex {
    index: String,
}

/// Indices named `<prefix><YYYY.MM.DD>` whose day started more than `days`
/// days before `now`. Names without a parsable date suffix are kept, and so
/// is everything when the window reaches past the earliest representable time.
pub fn expired_indices<'a>(
    names: impl IntoIterator<Item = &'a str>,
    prefix: &str,
    days: u32,
    now: DateTime<Utc>,
) -> Vec<String> {
    let Some(cutoff) = Duration::try_days(i64::from(days))
        .and_then(|window| now.checked_sub_signed(window))
    else {
        return Vec::new();
    };
    let mut expired: Vec<String> = names
        .into_iter()
        .filter(|name| {
            name.strip_prefix(prefix)
                .and_then(|suffix| NaiveDate::parse_from_str(suffix, DAY_FORMAT).ok())
                .and_then(|day| day.and_hms_opt(0, 0, 0))
                .is_some_and(|start| start.and_utc() < cutoff)
        })
        .map(str::to_string)
        .collect();
    expired.sort();
    expired
}

/// Deletes daily indices that fell out of the retention window.
pub struct IndexJanitor {
    client: Client,
    base_url: String,
    prefix: String,
}

impl IndexJanitor {
    pub fn new(config: &EnvironmentConfig) -> Result<Self> {
        let mut builder = Client::builder();
        if let Some(timeout) = config.http_timeout() {
            builder = builder.timeout(timeout);
        }
        Ok(Self {
            client: builder.build()?,
            base_url: config.cluster_url().to_string(),
            prefix: config.backup_index.clone(),
        })
    }

    async fn list_indices(&self) -> Result<Vec<String>> {
        let url = format!("{}/_cat/indices/{}*", self.base_url, self.prefix);
        let response = self
            .client
            .get(&url)
            .query(&[("format", "json"), ("h", "index")])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(BackupError::IndexApi {
                operation: "list indices",
                status,
                body,
            });
        }
        let rows: Vec<CatIndex> = response.json().await?;
        Ok(rows.into_iter().map(|row| row.index).collect())
    }

    async fn delete_index(&self, index: &str) -> Result<()> {
        let response = self
            .client
            .delete(format!("{}/{}", self.base_url, index))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(BackupError::IndexApi {
                operation: "delete index",
                status,
                body,
            });
        }
        Ok(())
    }

    /// Delete every matching index older than `days`. Returns the deleted names.
    pub async fn delete_older_than(&self, days: u32, now: DateTime<Utc>) -> Result<Vec<String>> {
        let indices = self.list_indices().await?;
        debug!(prefix = %self.prefix, count = indices.len(), "Listed indices");

        let expired = expired_indices(indices.iter().map(String::as_str), &self.prefix, days, now);
        for index in &expired {
            self.delete_index(index).await?;
            info!(index = %index, "Deleted index");
        }
        info!(deleted = expired.len(), retention_days = days, "Index cleanup completed");
        Ok(expired)
    }
}
