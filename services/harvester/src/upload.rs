//! Object storage upload of retrieved tiles (MinIO/S3 compatible).

use std::path::Path as FsPath;
use std::sync::Arc;

use bytes::Bytes;
use harvest_common::{HarvestError, HarvestResult};
use object_store::{aws::AmazonS3Builder, path::Path, ObjectStore};
use serde::Deserialize;
use tracing::{debug, info, instrument};
use walkdir::WalkDir;

/// Configuration for object storage connection.
#[derive(Debug, Clone, Deserialize)]
pub struct ObjectStorageConfig {
    /// S3/MinIO endpoint URL
    pub endpoint: String,
    /// Bucket name
    pub bucket: String,
    /// Access key ID
    pub access_key_id: String,
    /// Secret access key
    pub secret_access_key: String,
    /// AWS region (use "us-east-1" for MinIO)
    pub region: String,
    /// Allow HTTP (for local MinIO)
    pub allow_http: bool,
}

impl ObjectStorageConfig {
    /// Build from `STORAGE_*` environment variables; `None` when no endpoint
    /// is configured (local-only run).
    pub fn from_env() -> HarvestResult<Option<Self>> {
        let Ok(endpoint) = std::env::var("STORAGE_ENDPOINT") else {
            return Ok(None);
        };
        let get = |key: &str| {
            std::env::var(key)
                .map_err(|_| HarvestError::Configuration(format!("{key} is not set")))
        };
        Ok(Some(Self {
            endpoint,
            bucket: get("STORAGE_BUCKET")?,
            access_key_id: get("STORAGE_ACCESS_KEY_ID")?,
            secret_access_key: get("STORAGE_SECRET_ACCESS_KEY")?,
            region: std::env::var("STORAGE_REGION").unwrap_or_else(|_| "us-east-1".to_string()),
            allow_http: std::env::var("STORAGE_ALLOW_HTTP")
                .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
                .unwrap_or(false),
        }))
    }
}

/// Upload sink for tile directories.
pub struct UploadSink {
    store: Arc<dyn ObjectStore>,
    bucket: String,
}

impl UploadSink {
    pub fn new(config: &ObjectStorageConfig) -> HarvestResult<Self> {
        let mut builder = AmazonS3Builder::new()
            .with_endpoint(&config.endpoint)
            .with_bucket_name(&config.bucket)
            .with_access_key_id(&config.access_key_id)
            .with_secret_access_key(&config.secret_access_key)
            .with_region(&config.region);

        if config.allow_http {
            builder = builder.with_allow_http(true);
        }

        let store = builder
            .build()
            .map_err(|e| HarvestError::Transfer(format!("failed to create S3 client: {e}")))?;

        Ok(Self {
            store: Arc::new(store),
            bucket: config.bucket.clone(),
        })
    }

    /// Upload every file below `local_dir` under `remote_prefix`, preserving
    /// relative paths. Returns the `s3://` URI of the uploaded prefix.
    #[instrument(skip(self, local_dir), fields(bucket = %self.bucket, prefix = %remote_prefix))]
    pub async fn upload_dir(
        &self,
        local_dir: &FsPath,
        remote_prefix: &str,
    ) -> HarvestResult<String> {
        let mut uploaded = 0usize;
        for entry in WalkDir::new(local_dir) {
            let entry = entry
                .map_err(|e| HarvestError::Transfer(format!("cannot walk {e}")))?;
            if !entry.file_type().is_file() {
                continue;
            }
            let relative = entry
                .path()
                .strip_prefix(local_dir)
                .map_err(|e| HarvestError::Transfer(format!("path outside tile dir: {e}")))?;
            let key = format!("{remote_prefix}/{}", relative.to_string_lossy());

            let data = Bytes::from(tokio::fs::read(entry.path()).await?);
            debug!(key = %key, size = data.len(), "Uploading object");
            self.store
                .put(&Path::from(key.as_str()), data.into())
                .await
                .map_err(|e| HarvestError::Transfer(format!("failed to write {key}: {e}")))?;
            uploaded += 1;
        }

        let uri = format!("s3://{}/{remote_prefix}", self.bucket);
        info!(uri = %uri, files = uploaded, "Uploaded tile directory");
        Ok(uri)
    }
}
