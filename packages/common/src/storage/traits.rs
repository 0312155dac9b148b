use std::io::Cursor;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncReadExt};

use super::error::StorageError;

/// Type alias for a boxed async reader.
pub type BoxReader = Box<dyn AsyncRead + Unpin + Send>;

/// A single entry of a bucket listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectSummary {
    pub key: String,
    /// Object size in bytes.
    pub size: u64,
}

/// Key-addressed blob storage over a single bucket.
///
/// Keys are flat strings; owners are namespaced by convention with a
/// `{owner}-` prefix, which is what [`BlobStore::list`] filters on.
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Name of the underlying bucket.
    fn bucket(&self) -> &str;

    /// List every object whose key starts with `prefix`.
    async fn list(&self, prefix: &str) -> Result<Vec<ObjectSummary>, StorageError>;

    /// Store bytes under `key`.
    async fn put(&self, key: &str, data: &[u8], content_type: &str) -> Result<u64, StorageError> {
        let reader: BoxReader = Box::new(Cursor::new(data.to_vec()));
        self.put_stream(key, reader, content_type).await
    }

    /// Stream data from an async reader into `key`, returning the number of bytes written.
    ///
    /// Completes exactly once: `Ok` only after the object is fully written
    /// and visible, `Err` otherwise (no partial object is left behind).
    async fn put_stream(
        &self,
        key: &str,
        reader: BoxReader,
        content_type: &str,
    ) -> Result<u64, StorageError>;

    /// Retrieve all bytes of an object.
    async fn get(&self, key: &str) -> Result<Vec<u8>, StorageError> {
        let mut reader = self.get_stream(key).await?;
        let mut buf = Vec::new();
        reader.read_to_end(&mut buf).await?;
        Ok(buf)
    }

    /// Retrieve an object as a streaming async reader.
    async fn get_stream(&self, key: &str) -> Result<BoxReader, StorageError>;

    /// Delete an object.
    ///
    /// Returns `true` if the object was deleted, `false` if it did not exist.
    async fn delete(&self, key: &str) -> Result<bool, StorageError>;

    /// Produce a time-limited read URL for `key`.
    async fn signed_url(&self, key: &str, expires_in: Duration) -> Result<String, StorageError>;
}

/// Reject keys that cannot be stored safely on any backend.
pub fn validate_key(key: &str) -> Result<(), StorageError> {
    if key.is_empty() {
        return Err(StorageError::InvalidKey("key is empty".into()));
    }
    if key.chars().any(|c| c.is_ascii_control()) {
        return Err(StorageError::InvalidKey(
            "key contains control characters".into(),
        ));
    }
    if key.contains('/') || key.contains('\\') || key.starts_with('.') {
        return Err(StorageError::InvalidKey(format!(
            "key must be a flat name: {key}"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validate_key_accepts_owner_prefixed_names() {
        assert!(validate_key("alice-0192-notes.pdf").is_ok());
        assert!(validate_key("bob-x").is_ok());
    }

    #[test]
    fn validate_key_rejects_unsafe_names() {
        assert!(validate_key("").is_err());
        assert!(validate_key("../etc/passwd").is_err());
        assert!(validate_key("dir/file").is_err());
        assert!(validate_key(".hidden").is_err());
        assert!(validate_key("a\r\nb").is_err());
    }
}
