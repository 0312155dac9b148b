use axum::Json;
use axum::extract::{DefaultBodyLimit, Multipart, Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use chrono::Utc;
use common::mq::{Operation, UsersRequest};
use common::storage::BlobStore;
use sea_orm::{ColumnTrait, ConnectionTrait, EntityTrait, QueryFilter, QueryOrder};
use serde::Serialize;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::entity::material;
use crate::error::{AppError, ErrorBody};
use crate::extractors::auth::AuthUser;
use crate::models::material::{
    MaterialChanges, MaterialDetailResponse, MaterialDraft, MaterialResponse,
    PurchaserListResponse, PurchaserResponse,
};
use crate::models::multipart::read_upload_form;
use crate::models::shared::{MessageResponse, parse_id};
use crate::services::access::resolve_read_url;
use crate::services::catalog;
use crate::services::quota::{MB, ResourceKind};
use crate::services::records::MaterialRecords;
use crate::services::upload::UploadCoordinator;
use crate::services::users;
use crate::state::AppState;
use crate::utils::keys::{PLACEHOLDER_KEY, object_key_from_stored};

const ERROR_MATERIAL_NOT_FOUND: &str = "Material not found";
const ERROR_NOT_AUTHOR: &str = "Unauthorized: You are not the author of this material";
const ERROR_NO_ACCESS: &str =
    "Unauthorized: You are not the author of this material or you have not purchased it";

/// Body limit for material uploads: the configured document ceiling plus room for the form fields.
pub fn material_upload_body_limit(max_upload: u64) -> DefaultBodyLimit {
    DefaultBodyLimit::max(usize::try_from(max_upload.saturating_add(MB)).unwrap_or(usize::MAX))
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct CourseMaterialNotice {
    course_id: String,
    material_id: Uuid,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct DeletedMaterialNotice {
    material_id: Uuid,
}

/// Looks up a material whose upload has been finalized.
async fn find_material<C: ConnectionTrait>(db: &C, id: Uuid) -> Result<material::Model, AppError> {
    find_material_any(db, id)
        .await
        .and_then(|model| {
            if model.file == PLACEHOLDER_KEY {
                Err(AppError::NotFound(ERROR_MATERIAL_NOT_FOUND.into()))
            } else {
                Ok(model)
            }
        })
}

async fn find_material_any<C: ConnectionTrait>(
    db: &C,
    id: Uuid,
) -> Result<material::Model, AppError> {
    material::Entity::find_by_id(id)
        .one(db)
        .await?
        .ok_or_else(|| AppError::NotFound(ERROR_MATERIAL_NOT_FOUND.into()))
}

async fn signed(state: &AppState, model: material::Model) -> MaterialResponse {
    let url = resolve_read_url(
        state.material_store.as_ref(),
        &model.file,
        state.config.storage.signed_url_ttl(),
    )
    .await;
    let mut response = MaterialResponse::from(model);
    response.file = url;
    response
}

fn coordinator<'a>(
    state: &'a AppState,
    records: &'a MaterialRecords<'a>,
) -> UploadCoordinator<'a, MaterialRecords<'a>> {
    UploadCoordinator::new(
        records,
        state.material_store.as_ref(),
        ResourceKind::MaterialDocument,
        &state.config.storage.material_content_types,
    )
}

#[utoipa::path(
    get,
    path = "/check",
    tag = "Materials",
    operation_id = "checkMaterials",
    summary = "Liveness check",
    responses(
        (status = 200, description = "Service is up", body = MessageResponse),
    ),
)]
pub async fn check() -> Json<MessageResponse> {
    Json(MessageResponse {
        message: "The materials service is working properly!".into(),
    })
}

#[utoipa::path(
    get,
    path = "/",
    tag = "Materials",
    operation_id = "listMaterials",
    summary = "List all materials",
    description = "Returns every material with its stored file reference. Purchasers are omitted.",
    responses(
        (status = 200, description = "All materials", body = Vec<MaterialResponse>),
        (status = 401, description = "Unauthorized (TOKEN_MISSING, TOKEN_INVALID)", body = ErrorBody),
    ),
    security(("jwt" = [])),
)]
#[instrument(skip(state, _auth_user))]
pub async fn list_materials(
    _auth_user: AuthUser,
    State(state): State<AppState>,
) -> Result<Json<Vec<MaterialResponse>>, AppError> {
    let models = material::Entity::find()
        .filter(material::Column::File.ne(PLACEHOLDER_KEY))
        .order_by_desc(material::Column::CreatedAt)
        .all(&state.db)
        .await?;
    Ok(Json(models.into_iter().map(MaterialResponse::from).collect()))
}

#[utoipa::path(
    get,
    path = "/me",
    tag = "Materials",
    operation_id = "listMyMaterials",
    summary = "List the caller's materials",
    description = "Returns the materials authored by the caller, each with a signed file URL.",
    responses(
        (status = 200, description = "Materials authored by the caller", body = Vec<MaterialResponse>),
        (status = 401, description = "Unauthorized (TOKEN_MISSING, TOKEN_INVALID)", body = ErrorBody),
    ),
    security(("jwt" = [])),
)]
#[instrument(skip(state, auth_user), fields(username = %auth_user.username))]
pub async fn list_my_materials(
    auth_user: AuthUser,
    State(state): State<AppState>,
) -> Result<Json<Vec<MaterialResponse>>, AppError> {
    let models = material::Entity::find()
        .filter(material::Column::Author.eq(auth_user.username.as_str()))
        .filter(material::Column::File.ne(PLACEHOLDER_KEY))
        .order_by_desc(material::Column::CreatedAt)
        .all(&state.db)
        .await?;

    let mut materials = Vec::with_capacity(models.len());
    for model in models {
        materials.push(signed(&state, model).await);
    }
    Ok(Json(materials))
}

#[utoipa::path(
    get,
    path = "/{id}",
    tag = "Materials",
    operation_id = "getMaterial",
    summary = "Get a material by ID",
    description = "Available to the author, to purchasers, and to anyone when the material is free. \
        `review` holds the cached review from the reviews service, or `null` while it is being fetched.",
    params(("id" = String, Path, description = "Material ID")),
    responses(
        (status = 200, description = "Material details", body = MaterialDetailResponse),
        (status = 400, description = "Invalid ID format (VALIDATION_ERROR)", body = ErrorBody),
        (status = 401, description = "Unauthorized (TOKEN_MISSING, TOKEN_INVALID)", body = ErrorBody),
        (status = 403, description = "Neither author nor purchaser (PERMISSION_DENIED)", body = ErrorBody),
        (status = 404, description = "Material not found (NOT_FOUND)", body = ErrorBody),
    ),
    security(("jwt" = [])),
)]
#[instrument(skip(state, auth_user), fields(username = %auth_user.username))]
pub async fn get_material(
    auth_user: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<MaterialDetailResponse>, AppError> {
    let id = parse_id(&id)?;
    let model = find_material(&state.db, id).await?;

    let allowed = model.author == auth_user.username
        || model.price == 0.0
        || catalog::is_purchaser(&state.db, id, &auth_user.username).await?;
    if !allowed {
        return Err(AppError::PermissionDenied(ERROR_NO_ACCESS.into()));
    }

    let purchasers = catalog::purchasers_of(&state.db, id).await?;
    let courses = catalog::courses_of(&state.db, id).await?;
    let review = state.reviews.get_review(&id.to_string()).await;

    let mut material = signed(&state, model).await;
    material.purchasers = Some(purchasers);
    material.courses = Some(courses);
    Ok(Json(MaterialDetailResponse { material, review }))
}

#[utoipa::path(
    get,
    path = "/{id}/users",
    tag = "Materials",
    operation_id = "listMaterialPurchasers",
    summary = "List the purchasers of a material",
    description = "Author only. Profiles come from the local copy of the users service data; \
        purchasers without a fresh copy are requested from the users service and appear \
        without profile fields until it answers.",
    params(("id" = String, Path, description = "Material ID")),
    responses(
        (status = 200, description = "Purchasers", body = PurchaserListResponse),
        (status = 400, description = "Invalid ID format (VALIDATION_ERROR)", body = ErrorBody),
        (status = 401, description = "Unauthorized (TOKEN_MISSING, TOKEN_INVALID)", body = ErrorBody),
        (status = 403, description = "Not the author (PERMISSION_DENIED)", body = ErrorBody),
        (status = 404, description = "Material not found (NOT_FOUND)", body = ErrorBody),
    ),
    security(("jwt" = [])),
)]
#[instrument(skip(state, auth_user), fields(username = %auth_user.username))]
pub async fn list_material_purchasers(
    auth_user: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<PurchaserListResponse>, AppError> {
    let id = parse_id(&id)?;
    let model = find_material(&state.db, id).await?;
    auth_user.require_owner(&model.author, ERROR_NOT_AUTHOR)?;

    let usernames = catalog::purchasers_of(&state.db, id).await?;
    let fresh = users::fresh_profiles(&state.db, &usernames, Utc::now()).await?;
    let missing = users::missing_usernames(&usernames, &fresh);
    if !missing.is_empty() {
        debug!(count = missing.len(), "Requesting stale user profiles");
        state
            .relay
            .notify(
                &state.config.services.users,
                Operation::RequestAppUsers,
                &UsersRequest { usernames: missing },
            )
            .await;
    }

    let purchasers = usernames
        .into_iter()
        .map(|username| {
            let profile = fresh.iter().find(|p| p.username == username);
            PurchaserResponse::new(username, profile)
        })
        .collect();
    Ok(Json(PurchaserListResponse { purchasers }))
}

#[utoipa::path(
    post,
    path = "/",
    tag = "Materials",
    operation_id = "createMaterial",
    summary = "Upload a material",
    description = "Multipart form with `title`, `description`, `price`, `currency` (EUR or USD), \
        `type` (book, article, presentation or exercises) and a `file` part. The upload is \
        checked against the caller's plan quota before anything is stored.",
    request_body(content_type = "multipart/form-data", description = "Material metadata and document"),
    responses(
        (status = 201, description = "Material created", body = MaterialResponse),
        (status = 400, description = "Validation error (VALIDATION_ERROR, UNSUPPORTED_MEDIA, PAYLOAD_TOO_LARGE)", body = ErrorBody),
        (status = 401, description = "Unauthorized (TOKEN_MISSING, TOKEN_INVALID)", body = ErrorBody),
        (status = 403, description = "Quota exceeded (QUOTA_EXCEEDED)", body = ErrorBody),
        (status = 500, description = "Upload failed (STORAGE_ERROR)", body = ErrorBody),
    ),
    security(("jwt" = [])),
)]
#[instrument(skip(state, auth_user, multipart), fields(username = %auth_user.username))]
pub async fn create_material(
    auth_user: AuthUser,
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<impl IntoResponse, AppError> {
    let mut form =
        read_upload_form(&mut multipart, state.config.storage.max_material_upload).await?;
    let draft = MaterialDraft::from_form(&form)?;
    let file = form
        .file
        .take()
        .ok_or_else(|| AppError::Validation("Missing required fields: file".into()))?
        .into_incoming()
        .await?;

    let records = MaterialRecords::new(&state.db);
    let model = coordinator(&state, &records)
        .create_with_file(&draft, file, &auth_user.username, auth_user.plan)
        .await?;

    info!(material_id = %model.id, "Material created");
    Ok((StatusCode::CREATED, Json(signed(&state, model).await)))
}

#[utoipa::path(
    post,
    path = "/{id}/course/{course_id}/associate",
    tag = "Materials",
    operation_id = "associateMaterial",
    summary = "Associate a material with a course",
    description = "Author only. The courses service is notified with `notificationAssociateMaterial`.",
    params(
        ("id" = String, Path, description = "Material ID"),
        ("course_id" = String, Path, description = "Course ID"),
    ),
    responses(
        (status = 204, description = "Material associated"),
        (status = 400, description = "Invalid ID format (VALIDATION_ERROR)", body = ErrorBody),
        (status = 401, description = "Unauthorized (TOKEN_MISSING, TOKEN_INVALID)", body = ErrorBody),
        (status = 403, description = "Not the author (PERMISSION_DENIED)", body = ErrorBody),
        (status = 404, description = "Material not found (NOT_FOUND)", body = ErrorBody),
    ),
    security(("jwt" = [])),
)]
#[instrument(skip(state, auth_user), fields(username = %auth_user.username))]
pub async fn associate_material(
    auth_user: AuthUser,
    State(state): State<AppState>,
    Path((id, course_id)): Path<(String, String)>,
) -> Result<StatusCode, AppError> {
    let id = parse_id(&id)?;
    let model = find_material(&state.db, id).await?;
    auth_user.require_owner(&model.author, ERROR_NOT_AUTHOR)?;

    catalog::associate_course(&state.db, id, &course_id).await?;
    state
        .relay
        .notify(
            &state.config.services.courses,
            Operation::NotificationAssociateMaterial,
            &CourseMaterialNotice {
                course_id,
                material_id: id,
            },
        )
        .await;
    Ok(StatusCode::NO_CONTENT)
}

#[utoipa::path(
    post,
    path = "/{id}/course/{course_id}/disassociate",
    tag = "Materials",
    operation_id = "disassociateMaterial",
    summary = "Remove a material from a course",
    description = "Author only. The courses service is notified with `notificationDisassociateMaterial`.",
    params(
        ("id" = String, Path, description = "Material ID"),
        ("course_id" = String, Path, description = "Course ID"),
    ),
    responses(
        (status = 204, description = "Material disassociated"),
        (status = 400, description = "Invalid ID format (VALIDATION_ERROR)", body = ErrorBody),
        (status = 401, description = "Unauthorized (TOKEN_MISSING, TOKEN_INVALID)", body = ErrorBody),
        (status = 403, description = "Not the author (PERMISSION_DENIED)", body = ErrorBody),
        (status = 404, description = "Material not found (NOT_FOUND)", body = ErrorBody),
    ),
    security(("jwt" = [])),
)]
#[instrument(skip(state, auth_user), fields(username = %auth_user.username))]
pub async fn disassociate_material(
    auth_user: AuthUser,
    State(state): State<AppState>,
    Path((id, course_id)): Path<(String, String)>,
) -> Result<StatusCode, AppError> {
    let id = parse_id(&id)?;
    let model = find_material(&state.db, id).await?;
    auth_user.require_owner(&model.author, ERROR_NOT_AUTHOR)?;

    catalog::disassociate_course(&state.db, id, &course_id).await?;
    state
        .relay
        .notify(
            &state.config.services.courses,
            Operation::NotificationDisassociateMaterial,
            &CourseMaterialNotice {
                course_id,
                material_id: id,
            },
        )
        .await;
    Ok(StatusCode::NO_CONTENT)
}

#[utoipa::path(
    put,
    path = "/{id}",
    tag = "Materials",
    operation_id = "updateMaterial",
    summary = "Update a material",
    description = "Author only. Multipart form with any of `title`, `description`, `price`, \
        `currency`, `type` and an optional replacement `file`. The previous document is deleted \
        only after the new one has been stored and the record updated.",
    params(("id" = String, Path, description = "Material ID")),
    request_body(content_type = "multipart/form-data", description = "Changed fields and optional replacement document"),
    responses(
        (status = 200, description = "Material updated", body = MaterialResponse),
        (status = 400, description = "Validation error (VALIDATION_ERROR, UNSUPPORTED_MEDIA, PAYLOAD_TOO_LARGE)", body = ErrorBody),
        (status = 401, description = "Unauthorized (TOKEN_MISSING, TOKEN_INVALID)", body = ErrorBody),
        (status = 403, description = "Not the author (PERMISSION_DENIED) or quota exceeded (QUOTA_EXCEEDED)", body = ErrorBody),
        (status = 404, description = "Material not found (NOT_FOUND)", body = ErrorBody),
    ),
    security(("jwt" = [])),
)]
#[instrument(skip(state, auth_user, multipart), fields(username = %auth_user.username))]
pub async fn update_material(
    auth_user: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<String>,
    mut multipart: Multipart,
) -> Result<Json<MaterialResponse>, AppError> {
    let id = parse_id(&id)?;
    let existing = find_material(&state.db, id).await?;
    auth_user.require_owner(&existing.author, ERROR_NOT_AUTHOR)?;

    let mut form =
        read_upload_form(&mut multipart, state.config.storage.max_material_upload).await?;
    let changes = MaterialChanges::from_form(&form)?;
    let file = match form.file.take() {
        Some(spooled) => Some(spooled.into_incoming().await?),
        None => None,
    };

    let records = MaterialRecords::new(&state.db);
    let updated = coordinator(&state, &records)
        .update(&existing, &changes, file, &auth_user.username, auth_user.plan)
        .await?;

    Ok(Json(signed(&state, updated).await))
}

#[utoipa::path(
    delete,
    path = "/{id}",
    tag = "Materials",
    operation_id = "deleteMaterial",
    summary = "Delete a material",
    description = "Author only. Deletes the document, the purchaser and course associations and \
        the record. The courses service is notified with `notificationDeleteMaterial`.",
    params(("id" = String, Path, description = "Material ID")),
    responses(
        (status = 204, description = "Material deleted"),
        (status = 400, description = "Invalid ID format (VALIDATION_ERROR)", body = ErrorBody),
        (status = 401, description = "Unauthorized (TOKEN_MISSING, TOKEN_INVALID)", body = ErrorBody),
        (status = 403, description = "Not the author (PERMISSION_DENIED)", body = ErrorBody),
        (status = 404, description = "Material not found (NOT_FOUND)", body = ErrorBody),
    ),
    security(("jwt" = [])),
)]
#[instrument(skip(state, auth_user), fields(username = %auth_user.username))]
pub async fn delete_material(
    auth_user: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<StatusCode, AppError> {
    let id = parse_id(&id)?;
    let existing = find_material_any(&state.db, id).await?;
    auth_user.require_owner(&existing.author, ERROR_NOT_AUTHOR)?;

    let key = object_key_from_stored(&existing.file);
    if key != PLACEHOLDER_KEY
        && let Err(e) = state.material_store.delete(key).await
    {
        warn!(key, error = %e, "Failed to delete material document");
    }

    catalog::delete_material(&state.db, id).await?;
    info!(material_id = %id, "Material deleted");

    state
        .relay
        .notify(
            &state.config.services.courses,
            Operation::NotificationDeleteMaterial,
            &DeletedMaterialNotice { material_id: id },
        )
        .await;

    Ok(StatusCode::NO_CONTENT)
}
