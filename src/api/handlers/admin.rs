use crate::AppState;
use crate::api::error::AppError;
use crate::entities::{upload_requests, upload_requests::UploadStatus, wallpapers};
use crate::services::migration::MigrationBatchResult;
use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

/// Batches triggered over HTTP are capped to keep the request short.
const MAX_HTTP_BATCH_SIZE: u64 = 100;

#[derive(Serialize, ToSchema)]
pub struct UploadRequestResponse {
    pub id: String,
    pub user_id: String,
    pub title: String,
    pub filename: String,
    pub content_type: String,
    pub staging_key: String,
    pub status: UploadStatus,
    pub rejection_reason: Option<String>,
    pub wallpaper_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub reviewed_at: Option<DateTime<Utc>>,
}

impl From<upload_requests::Model> for UploadRequestResponse {
    fn from(m: upload_requests::Model) -> Self {
        Self {
            id: m.id,
            user_id: m.user_id,
            title: m.title,
            filename: m.filename,
            content_type: m.content_type,
            staging_key: m.staging_key,
            status: m.status,
            rejection_reason: m.rejection_reason,
            wallpaper_id: m.wallpaper_id,
            created_at: m.created_at,
            reviewed_at: m.reviewed_at,
        }
    }
}

#[derive(Serialize, ToSchema)]
pub struct WallpaperResponse {
    pub id: String,
    pub title: String,
    pub uploader_id: Option<String>,
    pub source_url: Option<String>,
    pub r2_key: Option<String>,
    pub content_type: Option<String>,
    pub downloads: i64,
    pub created_at: DateTime<Utc>,
    pub migrated_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub migration_error: Option<String>,
}

impl From<wallpapers::Model> for WallpaperResponse {
    fn from(m: wallpapers::Model) -> Self {
        Self {
            id: m.id,
            title: m.title,
            uploader_id: m.uploader_id,
            source_url: m.source_url,
            r2_key: m.r2_key,
            content_type: m.content_type,
            downloads: m.downloads,
            created_at: m.created_at,
            migrated_at: m.migrated_at,
            migration_error: m.migration_error,
        }
    }
}

#[derive(Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct ListUploadsQuery {
    /// Defaults to `staged`
    pub status: Option<UploadStatus>,
}

#[derive(Deserialize, ToSchema, Default)]
pub struct RejectRequest {
    pub reason: Option<String>,
}

#[derive(Deserialize, ToSchema)]
pub struct MigrationBatchRequest {
    pub batch_size: Option<u64>,
}

#[derive(Deserialize, ToSchema)]
pub struct RegisterLegacyRequest {
    pub title: String,
    pub source_url: String,
}

#[utoipa::path(
    get,
    path = "/admin/uploads",
    params(ListUploadsQuery),
    responses(
        (status = 200, description = "Upload requests, oldest first", body = Vec<UploadRequestResponse>),
        (status = 403, description = "Admin role required")
    ),
    security(
        ("jwt" = [])
    ),
    tag = "admin"
)]
pub async fn list_uploads(
    State(state): State<AppState>,
    Query(query): Query<ListUploadsQuery>,
) -> Result<Json<Vec<UploadRequestResponse>>, AppError> {
    let status = query.status.unwrap_or(UploadStatus::Staged);
    let requests = state.moderation.list(Some(status)).await?;
    Ok(Json(requests.into_iter().map(Into::into).collect()))
}

#[utoipa::path(
    post,
    path = "/admin/uploads/{id}/approve",
    params(
        ("id" = String, Path, description = "Upload request id")
    ),
    responses(
        (status = 200, description = "Wallpaper published", body = WallpaperResponse),
        (status = 404, description = "Upload request not found"),
        (status = 409, description = "Upload request is not staged")
    ),
    security(
        ("jwt" = [])
    ),
    tag = "admin"
)]
pub async fn approve_upload(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<WallpaperResponse>, AppError> {
    let wallpaper = state.moderation.approve(&id).await?;
    Ok(Json(wallpaper.into()))
}

#[utoipa::path(
    post,
    path = "/admin/uploads/{id}/reject",
    params(
        ("id" = String, Path, description = "Upload request id")
    ),
    request_body = RejectRequest,
    responses(
        (status = 200, description = "Upload request rejected", body = UploadRequestResponse),
        (status = 404, description = "Upload request not found"),
        (status = 409, description = "Upload request is not staged")
    ),
    security(
        ("jwt" = [])
    ),
    tag = "admin"
)]
pub async fn reject_upload(
    State(state): State<AppState>,
    Path(id): Path<String>,
    payload: Option<Json<RejectRequest>>,
) -> Result<Json<UploadRequestResponse>, AppError> {
    let Json(payload) = payload.unwrap_or_default();
    let request = state.moderation.reject(&id, payload.reason).await?;
    Ok(Json(request.into()))
}

#[utoipa::path(
    post,
    path = "/admin/wallpapers",
    request_body = RegisterLegacyRequest,
    responses(
        (status = 201, description = "Legacy wallpaper registered for migration", body = WallpaperResponse),
        (status = 400, description = "Invalid title or source url")
    ),
    security(
        ("jwt" = [])
    ),
    tag = "admin"
)]
pub async fn register_legacy(
    State(state): State<AppState>,
    Json(payload): Json<RegisterLegacyRequest>,
) -> Result<(StatusCode, Json<WallpaperResponse>), AppError> {
    let wallpaper = state
        .wallpapers
        .register_legacy(&payload.title, &payload.source_url)
        .await?;
    Ok((StatusCode::CREATED, Json(wallpaper.into())))
}

#[utoipa::path(
    post,
    path = "/admin/migrations/batch",
    request_body = MigrationBatchRequest,
    responses(
        (status = 200, description = "Batch outcome", body = MigrationBatchResult),
        (status = 400, description = "Batch size out of range"),
        (status = 403, description = "Admin role required")
    ),
    security(
        ("jwt" = [])
    ),
    tag = "admin"
)]
pub async fn run_migration_batch(
    State(state): State<AppState>,
    Json(payload): Json<MigrationBatchRequest>,
) -> Result<Json<MigrationBatchResult>, AppError> {
    let batch_size = payload
        .batch_size
        .unwrap_or(state.config.migration.batch_size);
    if batch_size > MAX_HTTP_BATCH_SIZE {
        return Err(AppError::BadRequest(format!(
            "batch_size cannot exceed {}",
            MAX_HTTP_BATCH_SIZE
        )));
    }

    let result = state.migration.run_batch(batch_size).await?;
    Ok(Json(result))
}
