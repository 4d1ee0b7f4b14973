//! Object store holding the metadata document.

use crate::config::EnvironmentConfig;
use crate::utils::errors::Result;
use bytes::Bytes;
use object_store::aws::AmazonS3Builder;
use object_store::path::Path as ObjectPath;
use object_store::{ObjectStore, PutPayload};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Name of the metadata document under `base_path`.
pub const METADATA_FILE: &str = "backup_metadata.yml";

/// Location of the metadata document in a bucket plus the local scratch
/// directory it is staged in before upload.
pub struct MetadataStore {
    inner: Arc<dyn ObjectStore>,
    bucket: String,
    key: ObjectPath,
    scratch_dir: PathBuf,
}

impl MetadataStore {
    pub fn new(
        inner: Arc<dyn ObjectStore>,
        bucket: impl Into<String>,
        base_path: &str,
        scratch_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            inner,
            bucket: bucket.into(),
            key: metadata_key(base_path),
            scratch_dir: scratch_dir.into(),
        }
    }

    /// S3 store for the configured bucket. Credentials come from the usual
    /// `AWS_*` environment variables.
    pub fn s3(config: &EnvironmentConfig) -> Result<Self> {
        let s3 = AmazonS3Builder::from_env()
            .with_bucket_name(&config.bucket_name)
            .with_region(&config.region)
            .build()?;
        Ok(Self::new(
            Arc::new(s3),
            config.bucket_name.clone(),
            &config.base_path,
            config.scratch_dir(),
        ))
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    pub fn key(&self) -> &ObjectPath {
        &self.key
    }

    pub fn scratch_path(&self) -> PathBuf {
        self.scratch_dir.join(METADATA_FILE)
    }

    /// Fetch the document. `Ok(None)` when it does not exist yet.
    pub async fn fetch(&self) -> Result<Option<Bytes>> {
        debug!(bucket = %self.bucket, key = %self.key, "Downloading metadata");
        match self.inner.get(&self.key).await {
            Ok(result) => Ok(Some(result.bytes().await?)),
            Err(object_store::Error::NotFound { .. }) => {
                info!(bucket = %self.bucket, key = %self.key, "Metadata object does not exist");
                Ok(None)
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Stage `contents` in the scratch directory, then upload it.
    /// Returns `false` when the store reports the target as not found.
    pub async fn upload(&self, contents: Bytes) -> Result<bool> {
        let staged = self.scratch_path();
        write_scratch(&staged, &contents).await?;
        debug!(path = %staged.display(), "Staged metadata locally");

        match self.inner.put(&self.key, PutPayload::from(contents)).await {
            Ok(_) => {
                info!(bucket = %self.bucket, key = %self.key, "Uploaded metadata");
                Ok(true)
            }
            Err(object_store::Error::NotFound { .. }) => {
                warn!(bucket = %self.bucket, key = %self.key, "Metadata upload target not found");
                Ok(false)
            }
            Err(e) => Err(e.into()),
        }
    }
}

fn metadata_key(base_path: &str) -> ObjectPath {
    let base = base_path.trim_matches('/');
    if base.is_empty() {
        ObjectPath::from(METADATA_FILE)
    } else {
        ObjectPath::from(format!("{}/{}", base, METADATA_FILE))
    }
}

async fn write_scratch(path: &Path, contents: &[u8]) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    tokio::fs::write(path, contents).await
}
