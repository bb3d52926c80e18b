//! Moves legacy wallpaper files into R2, one bounded batch at a time.
//!
//! Each record walks `pending -> downloading -> uploading -> recorded`, or
//! stops in `failed` with the stage that broke. A failed record keeps a null
//! `r2_key`, gets its attempt time and error stamped, and is picked up again
//! by a later batch once untried records have had their turn.

use crate::api::error::AppError;
use crate::entities::{prelude::*, wallpapers};
use crate::services::source::SourceFetcher;
use crate::services::storage::StorageService;
use crate::utils::keys::{resolve_content_type, resolve_extension, wallpaper_key};
use chrono::Utc;
use sea_orm::sea_query::{Expr, NullOrdering, Order};
use sea_orm::{ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder, QuerySelect};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};
use utoipa::ToSchema;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct MigrationBatchResult {
    pub attempted: usize,
    pub migrated: usize,
    pub errors: Vec<String>,
}

/// Totals over successive batches.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct MigrationSummary {
    pub batches: usize,
    pub attempted: usize,
    pub migrated: usize,
    pub errors: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MigrationStage {
    Downloading,
    Uploading,
    Recording,
}

impl fmt::Display for MigrationStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            MigrationStage::Downloading => "download",
            MigrationStage::Uploading => "upload",
            MigrationStage::Recording => "record update",
        })
    }
}

#[derive(Debug, Clone)]
pub struct RecordFailure {
    pub stage: MigrationStage,
    pub reason: String,
}

impl RecordFailure {
    fn new(stage: MigrationStage, reason: impl fmt::Display) -> Self {
        Self {
            stage,
            reason: reason.to_string(),
        }
    }
}

impl fmt::Display for RecordFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} failed: {}", self.stage, self.reason)
    }
}

pub struct MigrationService {
    db: DatabaseConnection,
    source: Arc<dyn SourceFetcher>,
    storage: Arc<dyn StorageService>,
    request_timeout: Duration,
}

impl MigrationService {
    pub fn new(
        db: DatabaseConnection,
        source: Arc<dyn SourceFetcher>,
        storage: Arc<dyn StorageService>,
        request_timeout: Duration,
    ) -> Self {
        Self {
            db,
            source,
            storage,
            request_timeout,
        }
    }

    /// Migrates up to `batch_size` pending wallpapers, strictly one after another.
    ///
    /// Only the selection query can fail the batch; every per-record problem
    /// ends up in `errors` and processing moves on. Records that never failed
    /// go first, then the ones whose last failure is oldest.
    pub async fn run_batch(&self, batch_size: u64) -> Result<MigrationBatchResult, AppError> {
        let (result, _) = self.run_batch_skipping(batch_size, &HashSet::new()).await?;
        Ok(result)
    }

    async fn run_batch_skipping(
        &self,
        batch_size: u64,
        skip: &HashSet<String>,
    ) -> Result<(MigrationBatchResult, Vec<String>), AppError> {
        if batch_size == 0 {
            return Ok((MigrationBatchResult::default(), Vec::new()));
        }

        let mut query = Wallpapers::find()
            .filter(wallpapers::Column::R2Key.is_null())
            .filter(wallpapers::Column::SourceUrl.is_not_null());
        if !skip.is_empty() {
            query = query.filter(wallpapers::Column::Id.is_not_in(skip.iter().cloned()));
        }
        let pending = query
            .order_by_with_nulls(
                wallpapers::Column::MigrationAttemptedAt,
                Order::Asc,
                NullOrdering::First,
            )
            .order_by_asc(wallpapers::Column::CreatedAt)
            .order_by_asc(wallpapers::Column::Id)
            .limit(batch_size)
            .all(&self.db)
            .await?;

        let mut result = MigrationBatchResult {
            attempted: pending.len(),
            ..Default::default()
        };
        let mut failed = Vec::new();
        if pending.is_empty() {
            debug!("🚚 No wallpapers left to migrate");
            return Ok((result, failed));
        }

        info!("🚚 Migrating batch of {} wallpaper(s)", pending.len());

        for record in &pending {
            match self.migrate_record(record).await {
                Ok(key) => {
                    result.migrated += 1;
                    info!("   ✅ {} -> {}", record.id, key);
                }
                Err(failure) => {
                    let message = format!("wallpaper {}: {}", record.id, failure);
                    warn!("   ❌ {}", message);
                    self.mark_attempted(&record.id, &failure).await;
                    failed.push(record.id.clone());
                    result.errors.push(message);
                }
            }
        }

        info!(
            "📦 Batch done: {}/{} migrated, {} error(s)",
            result.migrated,
            result.attempted,
            result.errors.len()
        );
        Ok((result, failed))
    }

    /// Repeats batches with `delay` between them until nothing is left or
    /// `max_batches` is reached. A record that fails is not retried within
    /// the same run.
    pub async fn run_until_complete(
        &self,
        batch_size: u64,
        delay: Duration,
        max_batches: Option<usize>,
    ) -> Result<MigrationSummary, AppError> {
        let mut summary = MigrationSummary::default();
        let mut failed = HashSet::new();

        loop {
            if max_batches.is_some_and(|max| summary.batches >= max) {
                info!("⏹️  Reached batch limit of {}", summary.batches);
                break;
            }

            let (batch, batch_failed) = self.run_batch_skipping(batch_size, &failed).await?;
            if batch.attempted == 0 {
                break;
            }

            summary.batches += 1;
            summary.attempted += batch.attempted;
            summary.migrated += batch.migrated;
            summary.errors.extend(batch.errors);
            failed.extend(batch_failed);

            // A short batch means every candidate was just visited
            if (batch.attempted as u64) < batch_size {
                break;
            }

            tokio::time::sleep(delay).await;
        }

        if !failed.is_empty() {
            warn!("⚠️  {} wallpaper(s) left pending after failures", failed.len());
        }
        Ok(summary)
    }

    async fn mark_attempted(&self, id: &str, failure: &RecordFailure) {
        let stamped = Wallpapers::update_many()
            .col_expr(
                wallpapers::Column::MigrationAttemptedAt,
                Expr::value(Utc::now()),
            )
            .col_expr(
                wallpapers::Column::MigrationError,
                Expr::value(failure.to_string()),
            )
            .filter(wallpapers::Column::Id.eq(id))
            .filter(wallpapers::Column::R2Key.is_null())
            .exec(&self.db)
            .await;

        if let Err(e) = stamped {
            warn!("   ⚠️  Could not record failed attempt for {}: {}", id, e);
        }
    }

    async fn migrate_record(&self, record: &wallpapers::Model) -> Result<String, RecordFailure> {
        let source_url = record.source_url.as_deref().ok_or_else(|| {
            RecordFailure::new(MigrationStage::Downloading, "no source reference")
        })?;

        debug!("   ⬇️  {} downloading {}", record.id, source_url);
        let object = self
            .within(MigrationStage::Downloading, self.source.fetch(source_url))
            .await?;

        let extension = resolve_extension(&object.data, object.content_type.as_deref(), source_url);
        let content_type = resolve_content_type(&object.data, object.content_type.as_deref());
        let key = wallpaper_key(&object.data, &extension, Utc::now());

        debug!("   ⬆️  {} uploading {} bytes to {}", record.id, object.data.len(), key);
        self.within(
            MigrationStage::Uploading,
            self.storage.put_object(&key, object.data, &content_type),
        )
        .await?;

        // The null guard keeps an already recorded key from being overwritten
        let updated = Wallpapers::update_many()
            .col_expr(wallpapers::Column::R2Key, Expr::value(key.clone()))
            .col_expr(wallpapers::Column::ContentType, Expr::value(content_type))
            .col_expr(wallpapers::Column::MigratedAt, Expr::value(Utc::now()))
            .col_expr(wallpapers::Column::MigrationError, Expr::value(None::<String>))
            .filter(wallpapers::Column::Id.eq(record.id.as_str()))
            .filter(wallpapers::Column::R2Key.is_null())
            .exec(&self.db)
            .await
            .map_err(|e| RecordFailure::new(MigrationStage::Recording, e))?;

        if updated.rows_affected == 0 {
            return Err(RecordFailure::new(
                MigrationStage::Recording,
                format!("record changed concurrently, uploaded object {} is orphaned", key),
            ));
        }

        Ok(key)
    }

    async fn within<T, E, F>(&self, stage: MigrationStage, call: F) -> Result<T, RecordFailure>
    where
        F: Future<Output = Result<T, E>>,
        E: fmt::Display,
    {
        match tokio::time::timeout(self.request_timeout, call).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(e)) => Err(RecordFailure::new(stage, e)),
            Err(_) => Err(RecordFailure::new(
                stage,
                format!("timed out after {:?}", self.request_timeout),
            )),
        }
    }
}
