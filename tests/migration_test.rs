mod common;

use async_trait::async_trait;
use common::*;
use sea_orm::sea_query::Expr;
use sea_orm::{ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use wallpaper_storage::entities::{prelude::*, wallpapers};
use wallpaper_storage::services::migration::{MigrationBatchResult, MigrationService};
use wallpaper_storage::services::storage::{StorageError, StorageService};
use wallpaper_storage::services::worker::BackgroundWorker;

fn service(
    db: &sea_orm::DatabaseConnection,
    source: MockSource,
    storage: Arc<MockStorageService>,
) -> MigrationService {
    MigrationService::new(
        db.clone(),
        Arc::new(source),
        storage,
        Duration::from_secs(5),
    )
}

#[tokio::test]
async fn test_batch_of_two_gets_distinct_keys() {
    let db = setup_test_db().await;
    insert_legacy(&db, "w1", "https://legacy.test/a.jpg", minutes_ago(10)).await;
    insert_legacy(&db, "w2", "https://legacy.test/b.jpg", minutes_ago(5)).await;

    let storage = Arc::new(MockStorageService::new());
    // Identical content on purpose
    let source = MockSource::default()
        .with("https://legacy.test/a.jpg", JPEG_BYTES, Some("image/jpeg"))
        .with("https://legacy.test/b.jpg", JPEG_BYTES, Some("image/jpeg"));
    let migration = service(&db, source, storage.clone());

    let result = migration.run_batch(2).await.unwrap();
    assert_eq!(
        result,
        MigrationBatchResult {
            attempted: 2,
            migrated: 2,
            errors: vec![],
        }
    );

    let rows = Wallpapers::find().all(&db).await.unwrap();
    let keys: HashSet<String> = rows.iter().filter_map(|w| w.r2_key.clone()).collect();
    assert_eq!(keys.len(), 2);
    for row in &rows {
        let key = row.r2_key.as_deref().unwrap();
        assert!(key.starts_with("wallpapers/"));
        assert!(key.ends_with(".jpg"));
        assert_eq!(row.content_type.as_deref(), Some("image/jpeg"));
        assert!(row.migrated_at.is_some());
    }
    assert_eq!(storage.keys().len(), 2);
}

#[tokio::test]
async fn test_second_run_is_noop() {
    let db = setup_test_db().await;
    insert_legacy(&db, "w1", "https://legacy.test/1.png", minutes_ago(3)).await;
    insert_legacy(&db, "w2", "https://legacy.test/2.png", minutes_ago(2)).await;

    let storage = Arc::new(MockStorageService::new());
    let source = MockSource::default()
        .with("https://legacy.test/1.png", PNG_BYTES, None)
        .with("https://legacy.test/2.png", PNG_BYTES, None);
    let migration = service(&db, source, storage.clone());

    let first = migration.run_batch(10).await.unwrap();
    assert_eq!(first.migrated, 2);
    let keys_after_first = storage.keys();

    let second = migration.run_batch(10).await.unwrap();
    assert_eq!(second, MigrationBatchResult::default());
    assert_eq!(storage.keys(), keys_after_first);
}

#[tokio::test]
async fn test_one_failure_does_not_stop_the_batch() {
    let db = setup_test_db().await;
    for i in 1..=5 {
        insert_legacy(
            &db,
            &format!("w{}", i),
            &format!("https://legacy.test/{}.jpg", i),
            minutes_ago(10 - i),
        )
        .await;
    }

    let mut source = MockSource::default();
    for i in [1, 2, 4, 5] {
        source = source.with(
            &format!("https://legacy.test/{}.jpg", i),
            JPEG_BYTES,
            Some("image/jpeg"),
        );
    }
    let source = source.broken("https://legacy.test/3.jpg");

    let storage = Arc::new(MockStorageService::new());
    let migration = service(&db, source, storage.clone());

    let result = migration.run_batch(10).await.unwrap();
    assert_eq!(result.attempted, 5);
    assert_eq!(result.migrated, 4);
    assert_eq!(result.errors.len(), 1);
    assert!(result.errors[0].starts_with("wallpaper w3: download failed:"));
    assert!(result.errors[0].contains("500"));

    let failed = Wallpapers::find_by_id("w3").one(&db).await.unwrap().unwrap();
    assert!(failed.r2_key.is_none());
    assert!(failed.migrated_at.is_none());

    for id in ["w1", "w2", "w4", "w5"] {
        let row = Wallpapers::find_by_id(id).one(&db).await.unwrap().unwrap();
        assert!(row.r2_key.is_some(), "{} should be migrated", id);
    }
}

#[tokio::test]
async fn test_upload_failure_leaves_record_pending() {
    let db = setup_test_db().await;
    insert_legacy(&db, "w1", "https://legacy.test/1.jpg", minutes_ago(1)).await;

    let storage = Arc::new(MockStorageService::new());
    storage.fail_puts_under("wallpapers/");
    let source = MockSource::default().with("https://legacy.test/1.jpg", JPEG_BYTES, None);
    let migration = service(&db, source, storage.clone());

    let result = migration.run_batch(5).await.unwrap();
    assert_eq!(result.attempted, 1);
    assert_eq!(result.migrated, 0);
    assert_eq!(result.errors.len(), 1);
    assert!(result.errors[0].starts_with("wallpaper w1: upload failed:"));
    assert!(result.errors[0].contains("500"));

    let row = Wallpapers::find_by_id("w1").one(&db).await.unwrap().unwrap();
    assert!(row.r2_key.is_none());
    assert!(row.migrated_at.is_none());
    assert!(row.migration_attempted_at.is_some());
    assert!(row.migration_error.unwrap().starts_with("upload failed:"));
    assert!(storage.keys().is_empty());
}

/// Records a key for the row while its upload is still in flight.
struct RacingStorage {
    db: DatabaseConnection,
    inner: MockStorageService,
}

#[async_trait]
impl StorageService for RacingStorage {
    async fn put_object(
        &self,
        key: &str,
        data: Vec<u8>,
        content_type: &str,
    ) -> Result<(), StorageError> {
        self.inner.put_object(key, data, content_type).await?;
        Wallpapers::update_many()
            .col_expr(
                wallpapers::Column::R2Key,
                Expr::value("wallpapers/elsewhere.jpg"),
            )
            .filter(wallpapers::Column::Id.eq("w1"))
            .exec(&self.db)
            .await
            .unwrap();
        Ok(())
    }

    async fn get_object(&self, key: &str) -> Result<Vec<u8>, StorageError> {
        self.inner.get_object(key).await
    }

    async fn delete_object(&self, key: &str) -> Result<(), StorageError> {
        self.inner.delete_object(key).await
    }
}

#[tokio::test]
async fn test_record_changed_during_upload_reports_orphan() {
    let db = setup_test_db().await;
    insert_legacy(&db, "w1", "https://legacy.test/1.jpg", minutes_ago(1)).await;

    let storage = Arc::new(RacingStorage {
        db: db.clone(),
        inner: MockStorageService::new(),
    });
    let source = MockSource::default().with("https://legacy.test/1.jpg", JPEG_BYTES, None);
    let migration = MigrationService::new(
        db.clone(),
        Arc::new(source),
        storage.clone(),
        Duration::from_secs(5),
    );

    let result = migration.run_batch(5).await.unwrap();
    assert_eq!(result.migrated, 0);
    assert_eq!(result.errors.len(), 1);
    let uploaded = storage.inner.keys();
    assert_eq!(uploaded.len(), 1);
    assert_eq!(
        result.errors[0],
        format!(
            "wallpaper w1: record update failed: record changed concurrently, uploaded object {} is orphaned",
            uploaded[0]
        )
    );

    // The key written first is kept
    let row = Wallpapers::find_by_id("w1").one(&db).await.unwrap().unwrap();
    assert_eq!(row.r2_key.as_deref(), Some("wallpapers/elsewhere.jpg"));
}

#[tokio::test]
async fn test_failed_records_queue_behind_untried_ones() {
    let db = setup_test_db().await;
    insert_legacy(&db, "b1", "https://legacy.test/b1.jpg", minutes_ago(40)).await;
    insert_legacy(&db, "b2", "https://legacy.test/b2.jpg", minutes_ago(30)).await;
    insert_legacy(&db, "g1", "https://legacy.test/g1.jpg", minutes_ago(20)).await;
    insert_legacy(&db, "g2", "https://legacy.test/g2.jpg", minutes_ago(10)).await;

    let source = MockSource::default()
        .broken("https://legacy.test/b1.jpg")
        .broken("https://legacy.test/b2.jpg")
        .with("https://legacy.test/g1.jpg", JPEG_BYTES, None)
        .with("https://legacy.test/g2.jpg", JPEG_BYTES, None);
    let migration = service(&db, source, Arc::new(MockStorageService::new()));

    let first = migration.run_batch(2).await.unwrap();
    assert_eq!(first.attempted, 2);
    assert_eq!(first.migrated, 0);

    let second = migration.run_batch(2).await.unwrap();
    assert_eq!(second.attempted, 2);
    assert_eq!(second.migrated, 2);
    assert!(second.errors.is_empty());

    // Only the broken rows are left, and they are still retried
    let third = migration.run_batch(2).await.unwrap();
    assert_eq!(third.attempted, 2);
    assert_eq!(third.migrated, 0);

    for id in ["b1", "b2"] {
        let row = Wallpapers::find_by_id(id).one(&db).await.unwrap().unwrap();
        assert!(row.r2_key.is_none());
        assert!(row.migration_attempted_at.is_some());
        assert!(row.migration_error.unwrap().starts_with("download failed:"));
    }
}

#[tokio::test]
async fn test_run_until_complete_gets_past_broken_records() {
    let db = setup_test_db().await;
    insert_legacy(&db, "b1", "https://legacy.test/b1.jpg", minutes_ago(40)).await;
    insert_legacy(&db, "b2", "https://legacy.test/b2.jpg", minutes_ago(30)).await;
    insert_legacy(&db, "g1", "https://legacy.test/g1.jpg", minutes_ago(20)).await;
    insert_legacy(&db, "g2", "https://legacy.test/g2.jpg", minutes_ago(10)).await;

    let source = MockSource::default()
        .broken("https://legacy.test/b1.jpg")
        .broken("https://legacy.test/b2.jpg")
        .with("https://legacy.test/g1.jpg", PNG_BYTES, None)
        .with("https://legacy.test/g2.jpg", PNG_BYTES, None);
    let migration = service(&db, source, Arc::new(MockStorageService::new()));

    let summary = migration
        .run_until_complete(2, Duration::from_millis(1), None)
        .await
        .unwrap();
    assert_eq!(summary.batches, 2);
    assert_eq!(summary.attempted, 4);
    assert_eq!(summary.migrated, 2);
    assert_eq!(summary.errors.len(), 2);
    assert!(summary.errors[0].starts_with("wallpaper b1: download failed:"));
    assert!(summary.errors[1].starts_with("wallpaper b2: download failed:"));

    for id in ["g1", "g2"] {
        let row = Wallpapers::find_by_id(id).one(&db).await.unwrap().unwrap();
        assert!(row.r2_key.is_some(), "{} should be migrated", id);
        assert!(row.migration_error.is_none());
    }
}

#[tokio::test]
async fn test_oldest_records_go_first() {
    let db = setup_test_db().await;
    insert_legacy(&db, "newest", "https://legacy.test/n.jpg", minutes_ago(1)).await;
    insert_legacy(&db, "oldest", "https://legacy.test/o.jpg", minutes_ago(60)).await;

    let source = MockSource::default()
        .with("https://legacy.test/n.jpg", JPEG_BYTES, None)
        .with("https://legacy.test/o.jpg", JPEG_BYTES, None);
    let migration = service(&db, source, Arc::new(MockStorageService::new()));

    let result = migration.run_batch(1).await.unwrap();
    assert_eq!(result.migrated, 1);

    let oldest = Wallpapers::find_by_id("oldest").one(&db).await.unwrap().unwrap();
    let newest = Wallpapers::find_by_id("newest").one(&db).await.unwrap().unwrap();
    assert!(oldest.r2_key.is_some());
    assert!(newest.r2_key.is_none());
}

#[tokio::test]
async fn test_zero_batch_size_does_nothing() {
    let db = setup_test_db().await;
    insert_legacy(&db, "w1", "https://legacy.test/1.jpg", minutes_ago(1)).await;

    let source = MockSource::default().with("https://legacy.test/1.jpg", JPEG_BYTES, None);
    let storage = Arc::new(MockStorageService::new());
    let migration = service(&db, source, storage.clone());

    let result = migration.run_batch(0).await.unwrap();
    assert_eq!(result, MigrationBatchResult::default());
    assert!(storage.keys().is_empty());
}

#[tokio::test]
async fn test_hanging_source_becomes_record_error() {
    let db = setup_test_db().await;
    insert_legacy(&db, "stuck", "https://legacy.test/stuck.jpg", minutes_ago(2)).await;
    insert_legacy(&db, "fine", "https://legacy.test/fine.jpg", minutes_ago(1)).await;

    let source = MockSource::default()
        .hanging("https://legacy.test/stuck.jpg")
        .with("https://legacy.test/fine.jpg", JPEG_BYTES, None);
    let migration = MigrationService::new(
        db.clone(),
        Arc::new(source),
        Arc::new(MockStorageService::new()),
        Duration::from_millis(200),
    );

    let result = migration.run_batch(5).await.unwrap();
    assert_eq!(result.attempted, 2);
    assert_eq!(result.migrated, 1);
    assert_eq!(result.errors.len(), 1);
    assert!(result.errors[0].starts_with("wallpaper stuck: download failed: timed out"));
}

#[tokio::test]
async fn test_run_until_complete_drains_in_batches() {
    let db = setup_test_db().await;
    let mut source = MockSource::default();
    for i in 0..5 {
        let url = format!("https://legacy.test/{}.png", i);
        insert_legacy(&db, &format!("w{}", i), &url, minutes_ago(10 - i)).await;
        source = source.with(&url, PNG_BYTES, Some("image/png"));
    }
    let migration = service(&db, source, Arc::new(MockStorageService::new()));

    let summary = migration
        .run_until_complete(2, Duration::from_millis(1), None)
        .await
        .unwrap();
    assert_eq!(summary.batches, 3);
    assert_eq!(summary.attempted, 5);
    assert_eq!(summary.migrated, 5);
    assert!(summary.errors.is_empty());

    let again = migration.run_batch(2).await.unwrap();
    assert_eq!(again.attempted, 0);
}

#[tokio::test]
async fn test_run_until_complete_respects_batch_limit() {
    let db = setup_test_db().await;
    let mut source = MockSource::default();
    for i in 0..4 {
        let url = format!("https://legacy.test/{}.png", i);
        insert_legacy(&db, &format!("w{}", i), &url, minutes_ago(10 - i)).await;
        source = source.with(&url, PNG_BYTES, None);
    }
    let migration = service(&db, source, Arc::new(MockStorageService::new()));

    let summary = migration
        .run_until_complete(1, Duration::from_millis(1), Some(2))
        .await
        .unwrap();
    assert_eq!(summary.batches, 2);
    assert_eq!(summary.migrated, 2);
}

#[tokio::test]
async fn test_run_until_complete_stops_when_nothing_succeeds() {
    let db = setup_test_db().await;
    insert_legacy(&db, "gone", "https://legacy.test/gone.jpg", minutes_ago(1)).await;

    let migration = service(&db, MockSource::default(), Arc::new(MockStorageService::new()));

    let summary = migration
        .run_until_complete(5, Duration::from_millis(1), None)
        .await
        .unwrap();
    assert_eq!(summary.batches, 1);
    assert_eq!(summary.migrated, 0);
    assert_eq!(summary.errors.len(), 1);
    assert!(summary.errors[0].contains("404"));
}

#[tokio::test]
async fn test_worker_migrates_until_shutdown() {
    let db = setup_test_db().await;
    insert_legacy(&db, "w1", "https://legacy.test/1.jpg", minutes_ago(1)).await;

    let source = MockSource::default().with("https://legacy.test/1.jpg", JPEG_BYTES, None);
    let migration = Arc::new(service(&db, source, Arc::new(MockStorageService::new())));

    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
    let worker = BackgroundWorker::new(migration, 5, Duration::from_millis(20), shutdown_rx);
    let handle = tokio::spawn(worker.run());

    let mut migrated = false;
    for _ in 0..50 {
        tokio::time::sleep(Duration::from_millis(20)).await;
        let row = Wallpapers::find_by_id("w1").one(&db).await.unwrap().unwrap();
        if row.r2_key.is_some() {
            migrated = true;
            break;
        }
    }
    assert!(migrated);

    shutdown_tx.send(true).unwrap();
    tokio::time::timeout(Duration::from_secs(2), handle)
        .await
        .unwrap()
        .unwrap();
}

#[tokio::test]
async fn test_worker_finishes_running_batch_on_shutdown() {
    let db = setup_test_db().await;
    insert_legacy(&db, "w1", "https://legacy.test/1.jpg", minutes_ago(1)).await;

    let source = MockSource::default().with("https://legacy.test/1.jpg", JPEG_BYTES, None);
    let storage = Arc::new(MockStorageService::slow(Duration::from_millis(500)));
    let migration = Arc::new(service(&db, source, storage.clone()));

    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
    let worker = BackgroundWorker::new(migration, 5, Duration::from_millis(10), shutdown_rx);
    let handle = tokio::spawn(worker.run());

    // Upload is still in flight when shutdown arrives
    tokio::time::sleep(Duration::from_millis(100)).await;
    shutdown_tx.send(true).unwrap();
    tokio::time::timeout(Duration::from_secs(5), handle)
        .await
        .unwrap()
        .unwrap();

    let row = Wallpapers::find_by_id("w1").one(&db).await.unwrap().unwrap();
    assert!(row.r2_key.is_some());
    assert_eq!(storage.keys().len(), 1);
}
