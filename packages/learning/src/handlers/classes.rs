use axum::Json;
use axum::extract::{DefaultBodyLimit, Multipart, Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use common::mq::Operation;
use common::storage::BlobStore;
use sea_orm::{ConnectionTrait, EntityTrait};
use serde::Serialize;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::entity::class;
use crate::error::{AppError, ErrorBody};
use crate::extractors::auth::AuthUser;
use crate::models::class::{ClassChanges, ClassDraft, ClassResponse};
use crate::models::multipart::read_upload_form;
use crate::models::shared::{MessageResponse, parse_id};
use crate::services::access::resolve_read_url;
use crate::services::catalog;
use crate::services::quota::{MB, ResourceKind};
use crate::services::records::ClassRecords;
use crate::services::upload::UploadCoordinator;
use crate::state::AppState;
use crate::utils::keys::{PLACEHOLDER_KEY, object_key_from_stored};

const ERROR_CLASS_NOT_FOUND: &str = "Class not found";

/// Body limit for class uploads: the configured video ceiling plus room for the form fields.
pub fn class_upload_body_limit(max_upload: u64) -> DefaultBodyLimit {
    DefaultBodyLimit::max(usize::try_from(max_upload.saturating_add(MB)).unwrap_or(usize::MAX))
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct NewClassNotice {
    course_id: String,
    class_id: Uuid,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct DeletedClassNotice {
    class_id: Uuid,
}

/// Looks up a class whose upload has been finalized.
async fn find_class<C: ConnectionTrait>(db: &C, id: Uuid) -> Result<class::Model, AppError> {
    find_class_any(db, id)
        .await
        .and_then(|model| {
            if model.file == PLACEHOLDER_KEY {
                Err(AppError::NotFound(ERROR_CLASS_NOT_FOUND.into()))
            } else {
                Ok(model)
            }
        })
}

async fn find_class_any<C: ConnectionTrait>(db: &C, id: Uuid) -> Result<class::Model, AppError> {
    class::Entity::find_by_id(id)
        .one(db)
        .await?
        .ok_or_else(|| AppError::NotFound(ERROR_CLASS_NOT_FOUND.into()))
}

async fn signed(state: &AppState, model: class::Model) -> ClassResponse {
    let url = resolve_read_url(
        state.class_store.as_ref(),
        &model.file,
        state.config.storage.signed_url_ttl(),
    )
    .await;
    ClassResponse::with_file(model, url)
}

#[utoipa::path(
    get,
    path = "/check",
    tag = "Classes",
    operation_id = "checkClasses",
    summary = "Liveness check",
    responses(
        (status = 200, description = "Service is up", body = MessageResponse),
    ),
)]
pub async fn check() -> Json<MessageResponse> {
    Json(MessageResponse {
        message: "The classes service is working properly!".into(),
    })
}

#[utoipa::path(
    get,
    path = "/{id}",
    tag = "Classes",
    operation_id = "getClass",
    summary = "Get a class by ID",
    description = "Returns the class with `file` replaced by a time-limited signed URL.",
    params(("id" = String, Path, description = "Class ID")),
    responses(
        (status = 200, description = "Class details", body = ClassResponse),
        (status = 400, description = "Invalid ID format (VALIDATION_ERROR)", body = ErrorBody),
        (status = 401, description = "Unauthorized (TOKEN_MISSING, TOKEN_INVALID)", body = ErrorBody),
        (status = 404, description = "Class not found (NOT_FOUND)", body = ErrorBody),
    ),
    security(("jwt" = [])),
)]
#[instrument(skip(state, _auth_user))]
pub async fn get_class(
    _auth_user: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<ClassResponse>, AppError> {
    let id = parse_id(&id)?;
    let model = find_class(&state.db, id).await?;
    Ok(Json(signed(&state, model).await))
}

#[utoipa::path(
    get,
    path = "/course/{course_id}",
    tag = "Classes",
    operation_id = "listCourseClasses",
    summary = "List the classes of a course",
    description = "Returns the classes of a course in lesson order, each with a signed file URL.",
    params(("course_id" = String, Path, description = "Course ID")),
    responses(
        (status = 200, description = "Classes of the course", body = Vec<ClassResponse>),
        (status = 401, description = "Unauthorized (TOKEN_MISSING, TOKEN_INVALID)", body = ErrorBody),
    ),
    security(("jwt" = [])),
)]
#[instrument(skip(state, _auth_user))]
pub async fn list_course_classes(
    _auth_user: AuthUser,
    State(state): State<AppState>,
    Path(course_id): Path<String>,
) -> Result<Json<Vec<ClassResponse>>, AppError> {
    let models = catalog::classes_of_course(&state.db, &course_id).await?;
    let mut classes = Vec::with_capacity(models.len());
    for model in models {
        classes.push(signed(&state, model).await);
    }
    Ok(Json(classes))
}

#[utoipa::path(
    post,
    path = "/course/{course_id}",
    tag = "Classes",
    operation_id = "createClass",
    summary = "Upload a class video",
    description = "Multipart form with `title`, `description`, `order` and a `file` video part. \
        The upload is checked against the caller's plan quota before anything is stored. \
        On success the courses service is notified with `notificationNewClass`.",
    params(("course_id" = String, Path, description = "Course ID")),
    request_body(content_type = "multipart/form-data", description = "Class metadata and video file"),
    responses(
        (status = 201, description = "Class created", body = ClassResponse),
        (status = 400, description = "Validation error (VALIDATION_ERROR, UNSUPPORTED_MEDIA, PAYLOAD_TOO_LARGE)", body = ErrorBody),
        (status = 401, description = "Unauthorized (TOKEN_MISSING, TOKEN_INVALID)", body = ErrorBody),
        (status = 403, description = "Quota exceeded (QUOTA_EXCEEDED)", body = ErrorBody),
        (status = 500, description = "Upload failed (STORAGE_ERROR)", body = ErrorBody),
    ),
    security(("jwt" = [])),
)]
#[instrument(skip(state, auth_user, multipart), fields(username = %auth_user.username))]
pub async fn create_class(
    auth_user: AuthUser,
    State(state): State<AppState>,
    Path(course_id): Path<String>,
    mut multipart: Multipart,
) -> Result<impl IntoResponse, AppError> {
    let mut form = read_upload_form(&mut multipart, state.config.storage.max_class_upload).await?;
    let draft = ClassDraft::from_form(&form, &course_id)?;
    let file = form
        .file
        .take()
        .ok_or_else(|| AppError::Validation("Missing required fields: file".into()))?
        .into_incoming()
        .await?;

    let records = ClassRecords::new(&state.db);
    let coordinator = UploadCoordinator::new(
        &records,
        state.class_store.as_ref(),
        ResourceKind::ClassVideo,
        &state.config.storage.class_content_types,
    );
    let model = coordinator
        .create_with_file(&draft, file, &auth_user.username, auth_user.plan)
        .await?;

    info!(class_id = %model.id, course_id = %course_id, "Class created");
    state
        .relay
        .notify(
            &state.config.services.courses,
            Operation::NotificationNewClass,
            &NewClassNotice {
                course_id,
                class_id: model.id,
            },
        )
        .await;

    Ok((StatusCode::CREATED, Json(signed(&state, model).await)))
}

#[utoipa::path(
    put,
    path = "/{id}",
    tag = "Classes",
    operation_id = "updateClass",
    summary = "Update a class",
    description = "Multipart form with any of `title`, `description`, `order` and an optional \
        replacement `file`. Only the creator may update a class. The previous video is deleted \
        only after the new one has been stored and the record updated.",
    params(("id" = String, Path, description = "Class ID")),
    request_body(content_type = "multipart/form-data", description = "Changed fields and optional replacement video"),
    responses(
        (status = 200, description = "Class updated", body = ClassResponse),
        (status = 400, description = "Validation error (VALIDATION_ERROR, UNSUPPORTED_MEDIA, PAYLOAD_TOO_LARGE)", body = ErrorBody),
        (status = 401, description = "Unauthorized (TOKEN_MISSING, TOKEN_INVALID)", body = ErrorBody),
        (status = 403, description = "Not the creator (PERMISSION_DENIED) or quota exceeded (QUOTA_EXCEEDED)", body = ErrorBody),
        (status = 404, description = "Class not found (NOT_FOUND)", body = ErrorBody),
    ),
    security(("jwt" = [])),
)]
#[instrument(skip(state, auth_user, multipart), fields(username = %auth_user.username))]
pub async fn update_class(
    auth_user: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<String>,
    mut multipart: Multipart,
) -> Result<Json<ClassResponse>, AppError> {
    let id = parse_id(&id)?;
    let existing = find_class(&state.db, id).await?;
    auth_user.require_owner(
        &existing.creator,
        "Unauthorized: You are not the creator of this class",
    )?;

    let mut form = read_upload_form(&mut multipart, state.config.storage.max_class_upload).await?;
    let changes = ClassChanges::from_form(&form)?;
    let file = match form.file.take() {
        Some(spooled) => Some(spooled.into_incoming().await?),
        None => None,
    };

    let records = ClassRecords::new(&state.db);
    let coordinator = UploadCoordinator::new(
        &records,
        state.class_store.as_ref(),
        ResourceKind::ClassVideo,
        &state.config.storage.class_content_types,
    );
    let updated = coordinator
        .update(&existing, &changes, file, &auth_user.username, auth_user.plan)
        .await?;

    Ok(Json(signed(&state, updated).await))
}

#[utoipa::path(
    delete,
    path = "/{id}",
    tag = "Classes",
    operation_id = "deleteClass",
    summary = "Delete a class",
    description = "Deletes the class and its video. Only the creator may delete a class. \
        The courses service is notified with `notificationDeleteClass`.",
    params(("id" = String, Path, description = "Class ID")),
    responses(
        (status = 204, description = "Class deleted"),
        (status = 400, description = "Invalid ID format (VALIDATION_ERROR)", body = ErrorBody),
        (status = 401, description = "Unauthorized (TOKEN_MISSING, TOKEN_INVALID)", body = ErrorBody),
        (status = 403, description = "Not the creator (PERMISSION_DENIED)", body = ErrorBody),
        (status = 404, description = "Class not found (NOT_FOUND)", body = ErrorBody),
    ),
    security(("jwt" = [])),
)]
#[instrument(skip(state, auth_user), fields(username = %auth_user.username))]
pub async fn delete_class(
    auth_user: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<StatusCode, AppError> {
    let id = parse_id(&id)?;
    let existing = find_class_any(&state.db, id).await?;
    auth_user.require_owner(
        &existing.creator,
        "Unauthorized: You are not the author of this class",
    )?;

    let key = object_key_from_stored(&existing.file);
    if key != PLACEHOLDER_KEY
        && let Err(e) = state.class_store.delete(key).await
    {
        warn!(key, error = %e, "Failed to delete class video");
    }

    class::Entity::delete_by_id(id).exec(&state.db).await?;
    info!(class_id = %id, "Class deleted");

    state
        .relay
        .notify(
            &state.config.services.courses,
            Operation::NotificationDeleteClass,
            &DeletedClassNotice { class_id: id },
        )
        .await;

    Ok(StatusCode::NO_CONTENT)
}
