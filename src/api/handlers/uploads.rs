use crate::AppState;
use crate::api::error::AppError;
use crate::entities::upload_requests::UploadStatus;
use crate::utils::auth::Claims;
use axum::{Extension, Json, extract::State, http::StatusCode};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

#[derive(Deserialize, ToSchema)]
pub struct CreateUploadRequest {
    pub title: String,
    pub filename: String,
    pub content_type: String,
}

#[derive(Serialize, ToSchema)]
pub struct CreateUploadResponse {
    pub request_id: String,
    pub status: UploadStatus,
    pub staging_key: String,
    /// Presigned PUT; send the file body with the same `Content-Type`.
    pub upload_url: String,
    pub content_type: String,
    pub expires_at: DateTime<Utc>,
}

#[utoipa::path(
    post,
    path = "/uploads",
    request_body = CreateUploadRequest,
    responses(
        (status = 201, description = "Upload staged, PUT the file to upload_url", body = CreateUploadResponse),
        (status = 400, description = "Invalid title, filename or content type"),
        (status = 401, description = "Unauthorized")
    ),
    security(
        ("jwt" = [])
    ),
    tag = "uploads"
)]
pub async fn create_upload(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(payload): Json<CreateUploadRequest>,
) -> Result<(StatusCode, Json<CreateUploadResponse>), AppError> {
    let staged = state
        .moderation
        .create_request(
            &claims.sub,
            &payload.title,
            &payload.filename,
            &payload.content_type,
        )
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(CreateUploadResponse {
            request_id: staged.request.id,
            status: staged.request.status,
            staging_key: staged.request.staging_key,
            upload_url: staged.upload.url,
            content_type: staged.request.content_type,
            expires_at: staged.upload.expires_at,
        }),
    ))
}
