use std::sync::Arc;

use common::storage::BlobStore;
use common::storage::filesystem::FilesystemBlobStore;
use sea_orm::DatabaseConnection;

use crate::config::AppConfig;
use crate::services::relay::NotificationRelay;
use crate::services::review::ReviewService;

#[derive(Clone)]
pub struct AppState {
    pub db: DatabaseConnection,
    pub config: Arc<AppConfig>,
    pub class_store: Arc<dyn BlobStore>,
    pub material_store: Arc<dyn BlobStore>,
    /// Set when blobs live on the local filesystem and are served by this process.
    pub local_files: Option<LocalFiles>,
    pub reviews: ReviewService,
    pub relay: NotificationRelay,
}

/// Filesystem buckets whose signed URLs are served under `/files`.
#[derive(Clone)]
pub struct LocalFiles {
    pub buckets: Vec<Arc<FilesystemBlobStore>>,
}

impl LocalFiles {
    pub fn bucket(&self, name: &str) -> Option<&FilesystemBlobStore> {
        self.buckets
            .iter()
            .find(|store| store.bucket() == name)
            .map(Arc::as_ref)
    }
}
