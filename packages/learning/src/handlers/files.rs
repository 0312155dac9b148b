//! Download endpoint behind the signed URLs of the filesystem backend.

use axum::body::Body;
use axum::extract::{Path, Query, State};
use axum::http::{StatusCode, header};
use axum::response::Response;
use common::storage::BlobStore;
use serde::Deserialize;
use tokio_util::io::ReaderStream;
use tracing::instrument;

use crate::error::AppError;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct SignedQuery {
    pub expires: i64,
    pub signature: String,
}

/// Stream an object if its signature and expiry check out.
#[instrument(skip(state, query))]
pub async fn download(
    State(state): State<AppState>,
    Path((bucket, key)): Path<(String, String)>,
    Query(query): Query<SignedQuery>,
) -> Result<Response, AppError> {
    let store = state
        .local_files
        .as_ref()
        .and_then(|files| files.bucket(&bucket))
        .ok_or_else(|| AppError::NotFound(format!("Unknown bucket: {bucket}")))?;

    if !store.verify_signature(&key, query.expires, &query.signature) {
        return Err(AppError::PermissionDenied(
            "Invalid or expired signature".into(),
        ));
    }

    let reader = store.get_stream(&key).await?;
    let content_type = mime_guess::from_path(&key).first_or_octet_stream();

    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, content_type.as_ref())
        .header(header::CACHE_CONTROL, "private, max-age=3600")
        .body(Body::from_stream(ReaderStream::new(reader)))
        .map_err(|e| AppError::Internal(format!("Failed to build response: {e}")))
}
