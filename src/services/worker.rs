use crate::services::migration::MigrationService;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::time::{Duration, sleep};

/// Runs one migration batch per interval until shutdown is signalled.
pub struct BackgroundWorker {
    migration: Arc<MigrationService>,
    batch_size: u64,
    interval: Duration,
    shutdown: watch::Receiver<bool>,
}

impl BackgroundWorker {
    pub fn new(
        migration: Arc<MigrationService>,
        batch_size: u64,
        interval: Duration,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        Self {
            migration,
            batch_size,
            interval,
            shutdown,
        }
    }

    pub async fn run(mut self) {
        tracing::info!(
            "🚀 Migration worker started (batch size {}, every {:?})",
            self.batch_size,
            self.interval
        );

        loop {
            tokio::select! {
                _ = self.shutdown.changed() => {
                    tracing::info!("🛑 Migration worker shutting down");
                    break;
                }
                _ = sleep(self.interval) => {
                    self.tick().await;
                }
            }
        }
    }

    async fn tick(&self) {
        match self.migration.run_batch(self.batch_size).await {
            Ok(result) if result.attempted > 0 => {
                tracing::info!(
                    "✅ Worker batch: {}/{} migrated",
                    result.migrated,
                    result.attempted
                );
            }
            Ok(_) => {}
            Err(e) => tracing::error!("Migration batch failed: {}", e),
        }
    }
}
