use crate::api::error::AppError;
use crate::entities::{prelude::*, wallpapers};
use crate::services::signer::Presigner;
use crate::utils::validation::{download_filename, validate_title};
use chrono::{DateTime, Utc};
use sea_orm::sea_query::Expr;
use sea_orm::{ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, Set};
use serde::Serialize;
use std::sync::Arc;
use utoipa::ToSchema;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct DownloadLink {
    pub wallpaper_id: String,
    pub url: String,
    pub filename: String,
    /// `None` when the link points at the legacy host and carries no expiry.
    pub expires_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub public_url: Option<String>,
    pub migrated: bool,
}

pub struct WallpaperService {
    db: DatabaseConnection,
    presigner: Arc<Presigner>,
}

impl WallpaperService {
    pub fn new(db: DatabaseConnection, presigner: Arc<Presigner>) -> Self {
        Self { db, presigner }
    }

    /// Registers a wallpaper that still lives on the legacy host.
    pub async fn register_legacy(
        &self,
        title: &str,
        source_url: &str,
    ) -> Result<wallpapers::Model, AppError> {
        let title = validate_title(title).map_err(|e| AppError::BadRequest(e.to_string()))?;
        if !(source_url.starts_with("http://") || source_url.starts_with("https://")) {
            return Err(AppError::BadRequest(format!(
                "Invalid source url: {}",
                source_url
            )));
        }

        let model = wallpapers::ActiveModel {
            id: Set(Uuid::new_v4().to_string()),
            title: Set(title),
            uploader_id: Set(None),
            source_url: Set(Some(source_url.to_string())),
            r2_key: Set(None),
            content_type: Set(None),
            downloads: Set(0),
            created_at: Set(Utc::now()),
            migrated_at: Set(None),
            migration_attempted_at: Set(None),
            migration_error: Set(None),
        }
        .insert(&self.db)
        .await?;
        Ok(model)
    }

    /// Short-lived download link. Counts the download before handing it out.
    pub async fn download_link(&self, id: &str) -> Result<DownloadLink, AppError> {
        let wallpaper = Wallpapers::find_by_id(id)
            .one(&self.db)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Wallpaper {} not found", id)))?;

        let link = match (&wallpaper.r2_key, &wallpaper.source_url) {
            (Some(key), _) => {
                let filename = download_filename(&wallpaper.title, key);
                let signed = self.presigner.presign_download(key, &filename)?;
                DownloadLink {
                    wallpaper_id: wallpaper.id.clone(),
                    url: signed.url,
                    filename,
                    expires_at: Some(signed.expires_at),
                    public_url: self.presigner.public_url(key),
                    migrated: true,
                }
            }
            (None, Some(source_url)) => DownloadLink {
                wallpaper_id: wallpaper.id.clone(),
                url: source_url.clone(),
                filename: download_filename(
                    &wallpaper.title,
                    source_url.split(['?', '#']).next().unwrap_or_default(),
                ),
                expires_at: None,
                public_url: None,
                migrated: false,
            },
            (None, None) => {
                return Err(AppError::NotFound(format!(
                    "Wallpaper {} has no file",
                    id
                )));
            }
        };

        Wallpapers::update_many()
            .col_expr(
                wallpapers::Column::Downloads,
                Expr::col(wallpapers::Column::Downloads).add(1),
            )
            .filter(wallpapers::Column::Id.eq(wallpaper.id.as_str()))
            .exec(&self.db)
            .await?;

        Ok(link)
    }
}
