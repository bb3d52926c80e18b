use crate::AppState;
use crate::api::error::AppError;
use crate::services::wallpaper_service::DownloadLink;
use axum::{
    Json,
    extract::{Path, State},
};

#[utoipa::path(
    get,
    path = "/wallpapers/{id}/download",
    params(
        ("id" = String, Path, description = "Wallpaper id")
    ),
    responses(
        (status = 200, description = "Short-lived download link", body = DownloadLink),
        (status = 401, description = "Unauthorized"),
        (status = 404, description = "Wallpaper not found")
    ),
    security(
        ("jwt" = [])
    ),
    tag = "wallpapers"
)]
pub async fn download_wallpaper(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<DownloadLink>, AppError> {
    let link = state.wallpapers.download_link(&id).await?;
    tracing::info!("⬇️  Download link issued for {}", id);
    Ok(Json(link))
}
