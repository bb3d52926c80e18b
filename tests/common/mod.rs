#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use sea_orm::{ActiveModelTrait, Database, DatabaseConnection, Set};
use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use wallpaper_storage::entities::wallpapers;
use wallpaper_storage::infrastructure::database;
use wallpaper_storage::services::source::{SourceError, SourceFetcher, SourceObject};
use wallpaper_storage::services::signer::Operation;
use wallpaper_storage::services::storage::{StorageError, StorageService};

pub const JPEG_BYTES: &[u8] = &[0xFF, 0xD8, 0xFF, 0xE0, 0x00, 0x10, b'J', b'F', b'I', b'F', 0x00];
pub const PNG_BYTES: &[u8] = &[0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A, 0, 0, 0, 0x0D];

pub async fn setup_test_db() -> DatabaseConnection {
    let db = Database::connect("sqlite::memory:").await.unwrap();
    database::run_migrations(&db).await.unwrap();
    db
}

/// Inserts an unmigrated wallpaper pointing at `source_url`.
pub async fn insert_legacy(
    db: &DatabaseConnection,
    id: &str,
    source_url: &str,
    created_at: DateTime<Utc>,
) -> wallpapers::Model {
    wallpapers::ActiveModel {
        id: Set(id.to_string()),
        title: Set(format!("Wallpaper {}", id)),
        uploader_id: Set(None),
        source_url: Set(Some(source_url.to_string())),
        r2_key: Set(None),
        content_type: Set(None),
        downloads: Set(0),
        created_at: Set(created_at),
        migrated_at: Set(None),
        migration_attempted_at: Set(None),
        migration_error: Set(None),
    }
    .insert(db)
    .await
    .unwrap()
}

pub fn minutes_ago(n: i64) -> DateTime<Utc> {
    Utc::now() - Duration::minutes(n)
}

#[derive(Default)]
pub struct MockStorageService {
    pub files: Mutex<HashMap<String, (Vec<u8>, String)>>,
    /// Key prefixes whose PUTs answer 500.
    pub failing_puts: Mutex<Vec<String>>,
    /// Added before every call, to widen races between concurrent callers.
    pub latency: Option<std::time::Duration>,
}

impl MockStorageService {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn slow(latency: std::time::Duration) -> Self {
        Self {
            latency: Some(latency),
            ..Self::default()
        }
    }

    pub fn fail_puts_under(&self, prefix: &str) {
        self.failing_puts.lock().unwrap().push(prefix.to_string());
    }

    async fn lag(&self) {
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
    }

    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.files.lock().unwrap().keys().cloned().collect();
        keys.sort();
        keys
    }

    pub fn insert(&self, key: &str, data: &[u8], content_type: &str) {
        self.files
            .lock()
            .unwrap()
            .insert(key.to_string(), (data.to_vec(), content_type.to_string()));
    }
}

#[async_trait]
impl StorageService for MockStorageService {
    async fn put_object(
        &self,
        key: &str,
        data: Vec<u8>,
        content_type: &str,
    ) -> Result<(), StorageError> {
        self.lag().await;
        let rejected = self
            .failing_puts
            .lock()
            .unwrap()
            .iter()
            .any(|prefix| key.starts_with(prefix.as_str()));
        if rejected {
            return Err(StorageError::Status {
                operation: Operation::Put,
                key: key.to_string(),
                status: 500,
                body: "InternalError".to_string(),
            });
        }
        self.files
            .lock()
            .unwrap()
            .insert(key.to_string(), (data, content_type.to_string()));
        Ok(())
    }

    async fn get_object(&self, key: &str) -> Result<Vec<u8>, StorageError> {
        self.lag().await;
        self.files
            .lock()
            .unwrap()
            .get(key)
            .map(|(data, _)| data.clone())
            .ok_or_else(|| StorageError::NotFound(key.to_string()))
    }

    async fn delete_object(&self, key: &str) -> Result<(), StorageError> {
        self.lag().await;
        self.files.lock().unwrap().remove(key);
        Ok(())
    }
}

/// Legacy host stand-in. Unknown URLs answer 404, `hanging` URLs never answer.
#[derive(Default)]
pub struct MockSource {
    pub objects: HashMap<String, (Vec<u8>, Option<String>)>,
    pub broken: HashSet<String>,
    pub hanging: HashSet<String>,
}

impl MockSource {
    pub fn with(mut self, url: &str, data: &[u8], content_type: Option<&str>) -> Self {
        self.objects
            .insert(url.to_string(), (data.to_vec(), content_type.map(str::to_string)));
        self
    }

    pub fn broken(mut self, url: &str) -> Self {
        self.broken.insert(url.to_string());
        self
    }

    pub fn hanging(mut self, url: &str) -> Self {
        self.hanging.insert(url.to_string());
        self
    }
}

#[async_trait]
impl SourceFetcher for MockSource {
    async fn fetch(&self, url: &str) -> Result<SourceObject, SourceError> {
        if self.hanging.contains(url) {
            std::future::pending::<()>().await;
        }
        if self.broken.contains(url) {
            return Err(SourceError::Status {
                url: url.to_string(),
                status: 500,
            });
        }
        match self.objects.get(url) {
            Some((data, content_type)) => Ok(SourceObject {
                data: data.clone(),
                content_type: content_type.clone(),
            }),
            None => Err(SourceError::Status {
                url: url.to_string(),
                status: 404,
            }),
        }
    }
}
