use crate::entities::{upload_requests, wallpapers};
use sea_orm::{ConnectOptions, ConnectionTrait, Database, DatabaseConnection, DbBackend, Schema};
use std::time::Duration;
use tracing::info;

pub async fn setup_database(db_url: &str) -> anyhow::Result<DatabaseConnection> {
    info!("📂 Database: {}", db_url);

    let mut opt = ConnectOptions::new(db_url);
    opt.max_connections(20)
        .min_connections(1)
        .connect_timeout(Duration::from_secs(30))
        .acquire_timeout(Duration::from_secs(30))
        .idle_timeout(Duration::from_secs(600))
        .max_lifetime(Duration::from_secs(1800))
        .sqlx_logging(true)
        .sqlx_logging_level(log::LevelFilter::Debug);

    let db = Database::connect(opt).await?;

    info!("✅ Database connected successfully");

    run_migrations(&db).await?;

    Ok(db)
}

pub async fn run_migrations(db: &DatabaseConnection) -> anyhow::Result<()> {
    let builder = db.get_database_backend();
    let schema = Schema::new(builder);

    info!("🔄 Running auto-migrations...");

    // Order matters for foreign keys: Wallpapers -> UploadRequests
    let stmts = vec![
        (
            "wallpapers",
            schema
                .create_table_from_entity(wallpapers::Entity)
                .if_not_exists()
                .to_owned(),
        ),
        (
            "upload_requests",
            schema
                .create_table_from_entity(upload_requests::Entity)
                .if_not_exists()
                .to_owned(),
        ),
    ];

    for (name, stmt) in stmts {
        db.execute(builder.build(&stmt)).await?;
        info!("   - Table '{}' checked/created", name);
    }

    // Columns added after the first release; fails harmlessly once present
    let timestamp = match builder {
        DbBackend::Postgres => "TIMESTAMP WITH TIME ZONE",
        _ => "TEXT",
    };
    let columns = [
        format!(
            "ALTER TABLE wallpapers ADD COLUMN migration_attempted_at {}",
            timestamp
        ),
        "ALTER TABLE wallpapers ADD COLUMN migration_error TEXT".to_string(),
    ];
    for query in columns {
        let _ = db
            .execute(sea_orm::Statement::from_string(builder, query))
            .await;
    }

    let indexes = [
        "CREATE INDEX IF NOT EXISTS idx_wallpapers_r2_key ON wallpapers(r2_key)",
        "CREATE INDEX IF NOT EXISTS idx_wallpapers_created_at ON wallpapers(created_at)",
        "CREATE INDEX IF NOT EXISTS idx_wallpapers_migration_attempted_at ON wallpapers(migration_attempted_at)",
        "CREATE INDEX IF NOT EXISTS idx_upload_requests_status ON upload_requests(status)",
    ];

    for query in indexes {
        if let Err(e) = db
            .execute(sea_orm::Statement::from_string(builder, query.to_owned()))
            .await
        {
            tracing::warn!("   - Index creation warning: {} -> {}", query, e);
        }
    }

    Ok(())
}
