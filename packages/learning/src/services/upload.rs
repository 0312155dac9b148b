//! Two-phase uploads: a provisional record is written before the blob, and
//! only finalized once the blob is fully stored.

use async_trait::async_trait;
use common::storage::{BlobStore, BoxReader, StorageError};
use sea_orm::DbErr;
use thiserror::Error;
use tracing::{debug, error, info, instrument, warn};

use crate::services::quota::{self, Plan, QuotaViolation, ResourceKind};
use crate::utils::keys::{PLACEHOLDER_KEY, object_key, object_key_from_stored};

#[derive(Debug, Error)]
pub enum UploadError {
    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    UnsupportedMedia(String),

    #[error("{0}")]
    QuotaExceeded(QuotaViolation),

    #[error("Storage error: {0}")]
    Storage(#[source] StorageError),

    #[error("Persistence error: {0}")]
    Persistence(#[source] DbErr),
}

/// A file received from a client, ready to be streamed to the blob store.
pub struct IncomingFile {
    pub original_name: String,
    pub content_type: String,
    /// Exact size in bytes, known up front.
    pub size: u64,
    pub reader: BoxReader,
}

/// Metadata for a record that does not exist yet.
pub trait RecordDraft: Send + Sync {
    /// Reject missing or malformed fields, naming them.
    fn validate(&self) -> Result<(), String>;
}

/// A partial update of an existing record.
pub trait RecordChanges: Send + Sync {
    fn validate(&self) -> Result<(), String>;
    fn is_empty(&self) -> bool;
}

/// Persistence operations the coordinator needs for one record type.
///
/// Each call touches a single row; no multi-row transaction is assumed.
#[async_trait]
pub trait RecordStore: Send + Sync {
    type Draft: RecordDraft;
    type Changes: RecordChanges;
    type Record: Send + Sync;

    fn storage_key(record: &Self::Record) -> &str;

    async fn insert_provisional(
        &self,
        draft: &Self::Draft,
        owner: &str,
        placeholder: &str,
    ) -> Result<Self::Record, DbErr>;

    async fn set_storage_key(
        &self,
        record: &Self::Record,
        key: &str,
    ) -> Result<Self::Record, DbErr>;

    async fn remove(&self, record: &Self::Record) -> Result<(), DbErr>;

    /// Apply `changes` and, when given, a new storage key in a single write.
    async fn apply_changes(
        &self,
        record: &Self::Record,
        changes: &Self::Changes,
        key: Option<&str>,
    ) -> Result<Self::Record, DbErr>;
}

/// Coordinates quota checks, record persistence and blob writes for one
/// resource kind.
pub struct UploadCoordinator<'a, R: RecordStore> {
    records: &'a R,
    store: &'a dyn BlobStore,
    kind: ResourceKind,
    allowed_types: &'a [String],
}

impl<'a, R: RecordStore> UploadCoordinator<'a, R> {
    pub fn new(
        records: &'a R,
        store: &'a dyn BlobStore,
        kind: ResourceKind,
        allowed_types: &'a [String],
    ) -> Self {
        Self {
            records,
            store,
            kind,
            allowed_types,
        }
    }

    fn check_media(&self, content_type: &str) -> Result<(), UploadError> {
        if self.allowed_types.is_empty()
            || self
                .allowed_types
                .iter()
                .any(|allowed| allowed.eq_ignore_ascii_case(content_type))
        {
            return Ok(());
        }
        Err(UploadError::UnsupportedMedia(format!(
            "Unsupported file type '{content_type}'. Allowed types: {}",
            self.allowed_types.join(", ")
        )))
    }

    async fn check_quota(
        &self,
        owner: &str,
        plan: Option<Plan>,
        size: u64,
    ) -> Result<(), UploadError> {
        quota::evaluate(self.store, owner, plan, size, self.kind)
            .await
            .into_result()
            .map_err(UploadError::QuotaExceeded)
    }

    /// Create a record together with its file.
    ///
    /// Nothing is written unless validation, media and quota checks pass.
    /// If the blob write fails the provisional record is removed again.
    #[instrument(skip_all, fields(owner = %owner, bucket = %self.store.bucket(), size = file.size))]
    pub async fn create_with_file(
        &self,
        draft: &R::Draft,
        file: IncomingFile,
        owner: &str,
        plan: Option<Plan>,
    ) -> Result<R::Record, UploadError> {
        draft.validate().map_err(UploadError::Validation)?;
        self.check_media(&file.content_type)?;
        self.check_quota(owner, plan, file.size).await?;

        let provisional = self
            .records
            .insert_provisional(draft, owner, PLACEHOLDER_KEY)
            .await
            .map_err(UploadError::Persistence)?;

        let key = object_key(owner, &file.original_name);
        if let Err(e) = self
            .store
            .put_stream(&key, file.reader, &file.content_type)
            .await
        {
            warn!(key = %key, error = %e, "Blob write failed, removing provisional record");
            if let Err(db_err) = self.records.remove(&provisional).await {
                error!(
                    key = %key,
                    error = %db_err,
                    "Failed to remove provisional record after blob write failure"
                );
            }
            return Err(UploadError::Storage(e));
        }

        match self.records.set_storage_key(&provisional, &key).await {
            Ok(record) => {
                info!(key = %key, "Upload finalized");
                Ok(record)
            }
            Err(e) => {
                error!(
                    key = %key,
                    bucket = self.store.bucket(),
                    error = %e,
                    "Blob stored but record could not be finalized; orphaned blob needs manual reconciliation"
                );
                Err(UploadError::Persistence(e))
            }
        }
    }

    /// Apply metadata changes and optionally swap the record's file.
    ///
    /// The previous blob is deleted only after both the new blob and the
    /// record update have been written.
    #[instrument(skip_all, fields(owner = %owner, bucket = %self.store.bucket()))]
    pub async fn update(
        &self,
        record: &R::Record,
        changes: &R::Changes,
        file: Option<IncomingFile>,
        owner: &str,
        plan: Option<Plan>,
    ) -> Result<R::Record, UploadError> {
        match file {
            Some(file) => self.replace_file(record, changes, file, owner, plan).await,
            None => {
                if changes.is_empty() {
                    return Err(UploadError::Validation(
                        "No fields to update provided".into(),
                    ));
                }
                changes.validate().map_err(UploadError::Validation)?;
                self.records
                    .apply_changes(record, changes, None)
                    .await
                    .map_err(UploadError::Persistence)
            }
        }
    }

    /// Store a new file for an existing record, then drop the old one.
    pub async fn replace_file(
        &self,
        record: &R::Record,
        changes: &R::Changes,
        file: IncomingFile,
        owner: &str,
        plan: Option<Plan>,
    ) -> Result<R::Record, UploadError> {
        changes.validate().map_err(UploadError::Validation)?;
        self.check_media(&file.content_type)?;
        self.check_quota(owner, plan, file.size).await?;

        let new_key = object_key(owner, &file.original_name);
        self.store
            .put_stream(&new_key, file.reader, &file.content_type)
            .await
            .map_err(UploadError::Storage)?;

        let updated = match self
            .records
            .apply_changes(record, changes, Some(&new_key))
            .await
        {
            Ok(updated) => updated,
            Err(e) => {
                error!(
                    key = %new_key,
                    bucket = self.store.bucket(),
                    error = %e,
                    "Replacement blob stored but record update failed; orphaned blob needs manual reconciliation"
                );
                return Err(UploadError::Persistence(e));
            }
        };

        let old_key = object_key_from_stored(R::storage_key(record));
        if old_key != PLACEHOLDER_KEY && old_key != new_key {
            match self.store.delete(old_key).await {
                Ok(true) => debug!(key = old_key, "Deleted replaced blob"),
                Ok(false) => debug!(key = old_key, "Replaced blob was already gone"),
                Err(e) => warn!(key = old_key, error = %e, "Failed to delete replaced blob"),
            }
        }

        Ok(updated)
    }
}
