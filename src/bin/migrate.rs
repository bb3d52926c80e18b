use clap::Parser;
use dotenvy::dotenv;
use std::env;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use wallpaper_storage::config::{MigrationConfig, R2Config};
use wallpaper_storage::infrastructure::{database, storage};
use wallpaper_storage::services::migration::MigrationService;
use wallpaper_storage::services::source::HttpSourceFetcher;

/// Copies legacy wallpaper files into R2 in bounded batches.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Records per batch (MIGRATION_BATCH_SIZE)
    #[arg(long)]
    batch_size: Option<u64>,

    /// Pause between batches in milliseconds (MIGRATION_DELAY_MS)
    #[arg(long)]
    delay_ms: Option<u64>,

    /// Stop after this many batches
    #[arg(long)]
    max_batches: Option<usize>,

    /// Run a single batch and exit
    #[arg(long, default_value_t = false)]
    once: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();
    let args = Args::parse();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "migrate=info,wallpaper_storage=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("🚚 Starting wallpaper migration...");

    // 1. Configuration, fatal before any record is touched
    let r2 = match R2Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            error!("❌ {}", e);
            info!("Usage: R2_ACCOUNT_ID=... R2_ACCESS_KEY_ID=... R2_SECRET_ACCESS_KEY=... R2_BUCKET_NAME=... migrate");
            std::process::exit(1);
        }
    };
    let migration_config = MigrationConfig::from_env()?;
    let batch_size = args.batch_size.unwrap_or(migration_config.batch_size);
    let delay = Duration::from_millis(args.delay_ms.unwrap_or(migration_config.delay_ms));
    let request_timeout = Duration::from_secs(migration_config.request_timeout_secs);

    if batch_size == 0 {
        warn!("Batch size is 0, nothing to do.");
        return Ok(());
    }

    // 2. Infrastructure
    let database_url =
        env::var("DATABASE_URL").unwrap_or_else(|_| "sqlite://wallpapers.db?mode=rwc".to_string());
    info!("🔌 Connecting to database...");
    let db = database::setup_database(&database_url).await?;
    let (_, storage_service) = storage::setup_storage(r2, request_timeout)?;
    let source = Arc::new(HttpSourceFetcher::new(request_timeout)?);

    let service = MigrationService::new(db, source, storage_service, request_timeout);

    // 3. Run
    if args.once {
        let result = service.run_batch(batch_size).await?;
        info!(
            "✅ Batch finished: {}/{} migrated",
            result.migrated, result.attempted
        );
        for e in &result.errors {
            warn!("   - {}", e);
        }
        println!("{}", serde_json::to_string_pretty(&result)?);
        return Ok(());
    }

    let summary = service
        .run_until_complete(batch_size, delay, args.max_batches)
        .await?;

    info!(
        "✅ Migration finished: {} batch(es), {}/{} migrated, {} error(s)",
        summary.batches,
        summary.migrated,
        summary.attempted,
        summary.errors.len()
    );
    println!("{}", serde_json::to_string_pretty(&summary)?);

    Ok(())
}
