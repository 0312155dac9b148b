use std::io::Cursor;
use std::time::Duration;

use async_trait::async_trait;
use s3::creds::Credentials;
use s3::{Bucket, Region};
use serde::Deserialize;

use super::error::StorageError;
use super::traits::{BlobStore, BoxReader, ObjectSummary, validate_key};

/// S3-compatible bucket configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct S3StorageConfig {
    /// The region name (e.g. `eu-west-1`).
    pub region: String,

    /// Custom endpoint for S3-compatible storage (MinIO, GCS interop).
    pub endpoint: Option<String>,

    pub access_key_id: Option<String>,
    pub secret_access_key: Option<String>,

    /// Address buckets as `{endpoint}/{bucket}` instead of `{bucket}.{endpoint}`.
    #[serde(default)]
    pub path_style: bool,
}

/// A single S3 bucket.
pub struct S3BlobStore {
    name: String,
    bucket: Box<Bucket>,
}

impl S3BlobStore {
    pub fn new(name: &str, config: &S3StorageConfig) -> Result<Self, StorageError> {
        let region = match &config.endpoint {
            Some(endpoint) => Region::Custom {
                region: config.region.clone(),
                endpoint: endpoint.clone(),
            },
            None => config
                .region
                .parse::<Region>()
                .map_err(|e| StorageError::Backend(format!("invalid region: {e}")))?,
        };

        let credentials = Credentials::new(
            config.access_key_id.as_deref(),
            config.secret_access_key.as_deref(),
            None,
            None,
            None,
        )
        .map_err(|e| StorageError::Backend(format!("invalid credentials: {e}")))?;

        let mut bucket = Bucket::new(name, region, credentials)?;
        if config.path_style {
            bucket = bucket.with_path_style();
        }

        Ok(Self {
            name: name.to_string(),
            bucket,
        })
    }
}

fn ensure_success(status: u16, action: &str, key: &str) -> Result<(), StorageError> {
    match status {
        200..=299 => Ok(()),
        404 => Err(StorageError::NotFound(key.to_string())),
        other => Err(StorageError::Backend(format!(
            "{action} {key} returned HTTP {other}"
        ))),
    }
}

#[async_trait]
impl BlobStore for S3BlobStore {
    fn bucket(&self) -> &str {
        &self.name
    }

    async fn list(&self, prefix: &str) -> Result<Vec<ObjectSummary>, StorageError> {
        let pages = self.bucket.list(prefix.to_string(), None).await?;
        Ok(pages
            .into_iter()
            .flat_map(|page| page.contents)
            .map(|object| ObjectSummary {
                key: object.key,
                size: object.size,
            })
            .collect())
    }

    async fn put_stream(
        &self,
        key: &str,
        mut reader: BoxReader,
        content_type: &str,
    ) -> Result<u64, StorageError> {
        validate_key(key)?;
        let response = self
            .bucket
            .put_object_stream_with_content_type(&mut reader, key, content_type)
            .await?;
        ensure_success(response.status_code(), "PUT", key)?;
        Ok(response.uploaded_bytes() as u64)
    }

    async fn get_stream(&self, key: &str) -> Result<BoxReader, StorageError> {
        validate_key(key)?;
        let response = self.bucket.get_object(key).await?;
        ensure_success(response.status_code(), "GET", key)?;
        Ok(Box::new(Cursor::new(response.bytes().to_vec())))
    }

    async fn delete(&self, key: &str) -> Result<bool, StorageError> {
        validate_key(key)?;
        let response = self.bucket.delete_object(key).await?;
        match ensure_success(response.status_code(), "DELETE", key) {
            Ok(()) => Ok(true),
            Err(StorageError::NotFound(_)) => Ok(false),
            Err(e) => Err(e),
        }
    }

    async fn signed_url(&self, key: &str, expires_in: Duration) -> Result<String, StorageError> {
        validate_key(key)?;
        let expiry = u32::try_from(expires_in.as_secs())
            .map_err(|_| StorageError::Signing("expiry out of range".into()))?;
        self.bucket
            .presign_get(key, expiry, None)
            .await
            .map_err(|e| StorageError::Signing(e.to_string()))
    }
}
