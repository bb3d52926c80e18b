use crate::api::error::AppError;
use crate::entities::upload_requests::{self, UploadStatus};
use crate::entities::{prelude::*, wallpapers};
use crate::services::signer::{Presigner, PresignedUrl};
use crate::services::storage::{StorageError, StorageService};
use crate::utils::keys::{extension_for_mime, resolve_extension, staging_key, wallpaper_key};
use crate::utils::validation::{validate_title, validate_upload_request};
use chrono::Utc;
use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder, Set,
    TransactionTrait,
};
use std::sync::Arc;
use uuid::Uuid;

/// Creator upload plus the URL the browser PUTs the file to.
#[derive(Debug, Clone)]
pub struct StagedUpload {
    pub request: upload_requests::Model,
    pub upload: PresignedUrl,
}

/// Staging flow for creator uploads: files land under `staging/` and only
/// reach the public `wallpapers/` prefix once an admin approves them.
pub struct ModerationService {
    db: DatabaseConnection,
    storage: Arc<dyn StorageService>,
    presigner: Arc<Presigner>,
}

impl ModerationService {
    pub fn new(
        db: DatabaseConnection,
        storage: Arc<dyn StorageService>,
        presigner: Arc<Presigner>,
    ) -> Self {
        Self {
            db,
            storage,
            presigner,
        }
    }

    pub async fn create_request(
        &self,
        user_id: &str,
        title: &str,
        filename: &str,
        content_type: &str,
    ) -> Result<StagedUpload, AppError> {
        let title = validate_title(title).map_err(|e| AppError::BadRequest(e.to_string()))?;
        let (filename, content_type) = validate_upload_request(filename, content_type)
            .map_err(|e| AppError::BadRequest(e.to_string()))?;

        let extension = extension_for_mime(&content_type).unwrap_or("bin");
        let now = Utc::now();
        let key = staging_key(user_id, extension, now);

        let upload = self.presigner.presign_upload(&key, &content_type)?;

        let request = upload_requests::ActiveModel {
            id: Set(Uuid::new_v4().to_string()),
            user_id: Set(user_id.to_string()),
            title: Set(title),
            filename: Set(filename),
            content_type: Set(content_type),
            staging_key: Set(key),
            status: Set(UploadStatus::Staged),
            rejection_reason: Set(None),
            wallpaper_id: Set(None),
            created_at: Set(now),
            reviewed_at: Set(None),
        }
        .insert(&self.db)
        .await?;

        tracing::info!("📝 Upload request {} staged by {}", request.id, user_id);
        Ok(StagedUpload { request, upload })
    }

    pub async fn list(
        &self,
        status: Option<UploadStatus>,
    ) -> Result<Vec<upload_requests::Model>, AppError> {
        let mut query = UploadRequests::find();
        if let Some(status) = status {
            query = query.filter(upload_requests::Column::Status.eq(status));
        }
        Ok(query
            .order_by_asc(upload_requests::Column::CreatedAt)
            .all(&self.db)
            .await?)
    }

    async fn find_staged(&self, id: &str) -> Result<upload_requests::Model, AppError> {
        let request = UploadRequests::find_by_id(id)
            .one(&self.db)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Upload request {} not found", id)))?;

        if request.status != UploadStatus::Staged {
            return Err(AppError::Conflict(format!(
                "Upload request {} is already {:?}",
                id, request.status
            )));
        }
        Ok(request)
    }

    /// Copies the staged object to its permanent key and publishes a wallpaper.
    pub async fn approve(&self, id: &str) -> Result<wallpapers::Model, AppError> {
        let request = self.find_staged(id).await?;

        let data = match self.storage.get_object(&request.staging_key).await {
            Ok(data) => data,
            Err(StorageError::NotFound(_)) => {
                return Err(AppError::Conflict(format!(
                    "File for upload request {} was never uploaded",
                    id
                )));
            }
            Err(e) => return Err(e.into()),
        };

        let extension = resolve_extension(&data, Some(&request.content_type), &request.filename);
        let now = Utc::now();
        let key = wallpaper_key(&data, &extension, now);
        self.storage
            .put_object(&key, data, &request.content_type)
            .await?;

        let txn = self.db.begin().await?;

        let wallpaper = wallpapers::ActiveModel {
            id: Set(Uuid::new_v4().to_string()),
            title: Set(request.title.clone()),
            uploader_id: Set(Some(request.user_id.clone())),
            source_url: Set(None),
            r2_key: Set(Some(key.clone())),
            content_type: Set(Some(request.content_type.clone())),
            downloads: Set(0),
            created_at: Set(now),
            migrated_at: Set(None),
            migration_attempted_at: Set(None),
            migration_error: Set(None),
        }
        .insert(&txn)
        .await?;

        // Only a request that is still staged may change state
        let marked = UploadRequests::update_many()
            .col_expr(
                upload_requests::Column::Status,
                Expr::value(UploadStatus::Approved),
            )
            .col_expr(
                upload_requests::Column::WallpaperId,
                Expr::value(wallpaper.id.clone()),
            )
            .col_expr(upload_requests::Column::ReviewedAt, Expr::value(now))
            .filter(upload_requests::Column::Id.eq(id))
            .filter(upload_requests::Column::Status.eq(UploadStatus::Staged))
            .exec(&txn)
            .await?;

        if marked.rows_affected == 0 {
            txn.rollback().await?;
            if let Err(e) = self.storage.delete_object(&key).await {
                tracing::warn!("Failed to remove unused copy {}: {}", key, e);
            }
            return Err(already_reviewed(id));
        }

        txn.commit().await?;

        if let Err(e) = self.storage.delete_object(&request.staging_key).await {
            tracing::warn!(
                "Failed to clean up staged object {}: {}",
                request.staging_key,
                e
            );
        }

        tracing::info!("✅ Upload request {} approved as {}", id, key);
        Ok(wallpaper)
    }

    /// Marks the request rejected, then drops its staged object.
    pub async fn reject(
        &self,
        id: &str,
        reason: Option<String>,
    ) -> Result<upload_requests::Model, AppError> {
        let request = self.find_staged(id).await?;
        let reason = reason.filter(|r| !r.trim().is_empty());
        let now = Utc::now();

        let marked = UploadRequests::update_many()
            .col_expr(
                upload_requests::Column::Status,
                Expr::value(UploadStatus::Rejected),
            )
            .col_expr(
                upload_requests::Column::RejectionReason,
                Expr::value(reason.clone()),
            )
            .col_expr(upload_requests::Column::ReviewedAt, Expr::value(now))
            .filter(upload_requests::Column::Id.eq(id))
            .filter(upload_requests::Column::Status.eq(UploadStatus::Staged))
            .exec(&self.db)
            .await?;

        if marked.rows_affected == 0 {
            return Err(already_reviewed(id));
        }

        if let Err(e) = self.storage.delete_object(&request.staging_key).await {
            tracing::warn!(
                "Failed to clean up staged object {}: {}",
                request.staging_key,
                e
            );
        }

        tracing::info!("🚫 Upload request {} rejected", id);
        Ok(upload_requests::Model {
            status: UploadStatus::Rejected,
            rejection_reason: reason,
            reviewed_at: Some(now),
            ..request
        })
    }
}

fn already_reviewed(id: &str) -> AppError {
    AppError::Conflict(format!("Upload request {} was already reviewed", id))
}
