use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use common::storage::StorageError;
use sea_orm::DbErr;
use serde::Serialize;

use crate::services::upload::UploadError;

/// Structured error response returned by all endpoints on failure.
#[derive(Serialize, utoipa::ToSchema)]
pub struct ErrorBody {
    /// Machine-readable error code. One of: `VALIDATION_ERROR`, `TOKEN_MISSING`,
    /// `TOKEN_INVALID`, `PERMISSION_DENIED`, `QUOTA_EXCEEDED`, `UNSUPPORTED_MEDIA`,
    /// `PAYLOAD_TOO_LARGE`, `NOT_FOUND`, `STORAGE_ERROR`, `INTERNAL_ERROR`.
    #[schema(example = "QUOTA_EXCEEDED")]
    pub code: &'static str,
    /// Human-readable error description.
    #[schema(example = "Your file exceeds the maximum file size (5 MB)")]
    pub error: String,
}

/// Application-level error type.
#[derive(Debug)]
pub enum AppError {
    Validation(String),
    TokenMissing,
    TokenInvalid,
    PermissionDenied(String),
    QuotaExceeded(String),
    UnsupportedMedia(String),
    PayloadTooLarge(String),
    NotFound(String),
    /// Blob write or read failed.
    Storage(String),
    Internal(String),
}

impl AppError {
    fn status_and_body(self) -> (StatusCode, ErrorBody) {
        let (status, code, error) = match self {
            AppError::Validation(msg) => (StatusCode::BAD_REQUEST, "VALIDATION_ERROR", msg),
            AppError::TokenMissing => (
                StatusCode::UNAUTHORIZED,
                "TOKEN_MISSING",
                "Unauthenticated: You are not logged in".into(),
            ),
            AppError::TokenInvalid => (
                StatusCode::UNAUTHORIZED,
                "TOKEN_INVALID",
                "Invalid or expired token".into(),
            ),
            AppError::PermissionDenied(msg) => (StatusCode::FORBIDDEN, "PERMISSION_DENIED", msg),
            AppError::QuotaExceeded(msg) => (StatusCode::FORBIDDEN, "QUOTA_EXCEEDED", msg),
            AppError::UnsupportedMedia(msg) => (StatusCode::BAD_REQUEST, "UNSUPPORTED_MEDIA", msg),
            AppError::PayloadTooLarge(msg) => (StatusCode::BAD_REQUEST, "PAYLOAD_TOO_LARGE", msg),
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, "NOT_FOUND", msg),
            AppError::Storage(detail) => {
                tracing::error!("Storage error: {}", detail);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "STORAGE_ERROR",
                    "Error uploading file".into(),
                )
            }
            AppError::Internal(detail) => {
                tracing::error!("Internal error: {}", detail);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "INTERNAL_ERROR",
                    "Internal Server Error".into(),
                )
            }
        };
        (status, ErrorBody { code, error })
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, body) = self.status_and_body();
        (status, Json(body)).into_response()
    }
}

impl From<DbErr> for AppError {
    fn from(err: DbErr) -> Self {
        AppError::Internal(err.to_string())
    }
}

impl From<StorageError> for AppError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::NotFound(key) => AppError::NotFound(format!("File not found: {key}")),
            StorageError::InvalidKey(msg) => AppError::Validation(msg),
            other => AppError::Storage(other.to_string()),
        }
    }
}

impl From<UploadError> for AppError {
    fn from(err: UploadError) -> Self {
        match err {
            UploadError::Validation(msg) => AppError::Validation(msg),
            UploadError::UnsupportedMedia(msg) => AppError::UnsupportedMedia(msg),
            UploadError::QuotaExceeded(violation) => AppError::QuotaExceeded(violation.to_string()),
            UploadError::Storage(e) => e.into(),
            UploadError::Persistence(e) => AppError::Internal(e.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn internal_details_are_not_exposed() {
        let (status, body) = AppError::Internal("connection refused at 10.0.0.3".into())
            .status_and_body();
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body.code, "INTERNAL_ERROR");
        assert!(!body.error.contains("10.0.0.3"));
    }

    #[test]
    fn quota_rejection_is_forbidden_with_reason() {
        let (status, body) =
            AppError::QuotaExceeded("You have exceeded your storage limit (5 GB)".into())
                .status_and_body();
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(body.code, "QUOTA_EXCEEDED");
        assert!(body.error.contains("5 GB"));
    }

    #[test]
    fn missing_object_maps_to_not_found() {
        let err: AppError = StorageError::NotFound("alice-1-a.pdf".into()).into();
        assert!(matches!(err, AppError::NotFound(_)));
    }

    #[test]
    fn upload_storage_failures_keep_their_status() {
        let err: AppError = UploadError::Storage(StorageError::InvalidKey("../x".into())).into();
        let (status, body) = err.status_and_body();
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body.code, "VALIDATION_ERROR");

        let err: AppError =
            UploadError::Storage(StorageError::NotFound("alice-1-a.pdf".into())).into();
        assert_eq!(err.status_and_body().0, StatusCode::NOT_FOUND);

        let err: AppError =
            UploadError::Storage(StorageError::Backend("bucket offline".into())).into();
        let (status, body) = err.status_and_body();
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body.code, "STORAGE_ERROR");
    }
}
