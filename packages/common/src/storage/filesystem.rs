use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use hmac::{Hmac, Mac};
use sha2::Sha256;
use tokio::fs;
use tokio::io::{AsyncReadExt, AsyncWriteExt, BufReader};

use super::error::StorageError;
use super::traits::{BlobStore, BoxReader, ObjectSummary, validate_key};

const TMP_DIR: &str = ".tmp";

type HmacSha256 = Hmac<Sha256>;

/// Filesystem-backed bucket, used for local development and tests.
///
/// Objects live at `{root}/{bucket}/{key}`. Signed URLs point at
/// `{public_base_url}/{bucket}/{key}` and carry an expiry plus an HMAC-SHA256
/// signature keyed by `signing_secret`.
pub struct FilesystemBlobStore {
    bucket: String,
    base_path: PathBuf,
    public_base_url: String,
    signing_secret: String,
}

impl FilesystemBlobStore {
    /// Create the bucket directory (and its temp area) if needed.
    pub async fn new(
        root: PathBuf,
        bucket: &str,
        public_base_url: &str,
        signing_secret: &str,
    ) -> Result<Self, StorageError> {
        let base_path = root.join(bucket);
        fs::create_dir_all(base_path.join(TMP_DIR)).await?;
        Ok(Self {
            bucket: bucket.to_string(),
            base_path,
            public_base_url: public_base_url.trim_end_matches('/').to_string(),
            signing_secret: signing_secret.to_string(),
        })
    }

    fn object_path(&self, key: &str) -> Result<PathBuf, StorageError> {
        validate_key(key)?;
        Ok(self.base_path.join(key))
    }

    fn temp_path(&self) -> PathBuf {
        self.base_path
            .join(TMP_DIR)
            .join(uuid::Uuid::new_v4().to_string())
    }

    fn mac(&self, key: &str, expires: i64) -> Result<HmacSha256, StorageError> {
        let mut mac = HmacSha256::new_from_slice(self.signing_secret.as_bytes())
            .map_err(|e| StorageError::Signing(e.to_string()))?;
        mac.update(self.bucket.as_bytes());
        mac.update(b"\n");
        mac.update(key.as_bytes());
        mac.update(b"\n");
        mac.update(expires.to_string().as_bytes());
        Ok(mac)
    }

    /// Check a signature previously produced by [`BlobStore::signed_url`].
    ///
    /// The comparison runs in constant time.
    pub fn verify_signature(&self, key: &str, expires: i64, signature: &str) -> bool {
        if expires <= Utc::now().timestamp() {
            return false;
        }
        let Ok(expected) = hex::decode(signature) else {
            return false;
        };
        self.mac(key, expires)
            .is_ok_and(|mac| mac.verify_slice(&expected).is_ok())
    }
}

#[async_trait]
impl BlobStore for FilesystemBlobStore {
    fn bucket(&self) -> &str {
        &self.bucket
    }

    async fn list(&self, prefix: &str) -> Result<Vec<ObjectSummary>, StorageError> {
        let mut entries = fs::read_dir(&self.base_path).await?;
        let mut objects = Vec::new();

        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name().to_string_lossy().into_owned();
            if name == TMP_DIR || !name.starts_with(prefix) {
                continue;
            }
            let meta = entry.metadata().await?;
            if meta.is_file() {
                objects.push(ObjectSummary {
                    key: name,
                    size: meta.len(),
                });
            }
        }

        objects.sort_by(|a, b| a.key.cmp(&b.key));
        Ok(objects)
    }

    async fn put_stream(
        &self,
        key: &str,
        mut reader: BoxReader,
        _content_type: &str,
    ) -> Result<u64, StorageError> {
        let object_path = self.object_path(key)?;
        let temp_path = self.temp_path();
        let mut total_bytes: u64 = 0;

        let result = async {
            let mut temp_file = fs::File::create(&temp_path).await?;
            let mut buf = vec![0u8; 64 * 1024]; // 64KB read buffer
            loop {
                let n = reader.read(&mut buf).await?;
                if n == 0 {
                    break;
                }
                total_bytes += n as u64;
                temp_file.write_all(&buf[..n]).await?;
            }
            temp_file.flush().await?;
            drop(temp_file);
            fs::rename(&temp_path, &object_path).await
        }
        .await;

        if let Err(e) = result {
            let _ = fs::remove_file(&temp_path).await;
            return Err(e.into());
        }

        Ok(total_bytes)
    }

    async fn get_stream(&self, key: &str) -> Result<BoxReader, StorageError> {
        let object_path = self.object_path(key)?;
        match fs::File::open(&object_path).await {
            Ok(file) => Ok(Box::new(BufReader::new(file))),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(StorageError::NotFound(key.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn delete(&self, key: &str) -> Result<bool, StorageError> {
        let object_path = self.object_path(key)?;
        match fs::remove_file(&object_path).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    async fn signed_url(&self, key: &str, expires_in: Duration) -> Result<String, StorageError> {
        let object_path = self.object_path(key)?;
        if !fs::try_exists(&object_path).await? {
            return Err(StorageError::NotFound(key.to_string()));
        }

        let ttl = i64::try_from(expires_in.as_secs())
            .map_err(|_| StorageError::Signing("expiry out of range".into()))?;
        let expires = Utc::now().timestamp() + ttl;
        let signature = hex::encode(self.mac(key, expires)?.finalize().into_bytes());

        Ok(format!(
            "{}/{}/{}?expires={}&signature={}",
            self.public_base_url,
            self.bucket,
            key,
            expires,
            signature
        ))
    }
}
