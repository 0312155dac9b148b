use std::time::Duration;

use common::storage::BlobStore;
use tracing::warn;

use crate::utils::keys::object_key_from_stored;

/// Turn a stored file reference into a time-limited read URL.
///
/// Never fails: when signing is not possible the stored reference is
/// returned unchanged.
pub async fn resolve_read_url(store: &dyn BlobStore, stored: &str, ttl: Duration) -> String {
    let key = object_key_from_stored(stored);
    match store.signed_url(key, ttl).await {
        Ok(url) => url,
        Err(e) => {
            warn!(key, bucket = store.bucket(), error = %e, "Could not sign read URL, returning raw key");
            stored.to_string()
        }
    }
}
