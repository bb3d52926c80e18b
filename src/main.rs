use clap::Parser;
use dotenvy::dotenv;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tokio::task::JoinHandle;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use wallpaper_storage::config::AppConfig;
use wallpaper_storage::infrastructure::{database, storage};
use wallpaper_storage::services::migration::MigrationService;
use wallpaper_storage::services::moderation::ModerationService;
use wallpaper_storage::services::source::HttpSourceFetcher;
use wallpaper_storage::services::wallpaper_service::WallpaperService;
use wallpaper_storage::services::worker::BackgroundWorker;
use wallpaper_storage::{AppState, create_app};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Service type to run (api, worker, all)
    #[arg(short, long, default_value = "all")]
    mode: String,

    /// Overrides BIND_ADDR
    #[arg(short, long)]
    bind: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 1. Environment & logging
    dotenv().ok();
    let args = Args::parse();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "wallpaper_storage=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("🚀 Starting wallpaper storage [Mode: {}]...", args.mode);

    // Missing credentials stop the process before anything else happens
    let config = AppConfig::from_env()?;
    info!(
        "🛡️  Upload URLs live {}s, download URLs {}s, region {}",
        config.r2.upload_expires_secs, config.r2.download_expires_secs, config.r2.region
    );

    // 2. Infrastructure
    let db = database::setup_database(&config.database_url).await?;
    let request_timeout = Duration::from_secs(config.migration.request_timeout_secs);
    let (presigner, storage_service) = storage::setup_storage(config.r2.clone(), request_timeout)?;
    let source = Arc::new(HttpSourceFetcher::new(request_timeout)?);

    let migration = Arc::new(MigrationService::new(
        db.clone(),
        source,
        storage_service.clone(),
        request_timeout,
    ));

    // 3. Shutdown channel
    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
    let mut tasks: Vec<(&str, JoinHandle<()>)> = Vec::new();

    // 4. Worker
    if args.mode == "worker" || args.mode == "all" {
        if config.migration.worker_interval_secs == 0 {
            warn!("👷 MIGRATION_WORKER_INTERVAL_SECS is 0, migration worker disabled");
        } else {
            let worker = BackgroundWorker::new(
                migration.clone(),
                config.migration.batch_size,
                Duration::from_secs(config.migration.worker_interval_secs),
                shutdown_rx.clone(),
            );
            tasks.push(("worker", tokio::spawn(worker.run())));
            info!("👷 Worker service initialized.");
        }
    }

    // 5. API
    if args.mode == "api" || args.mode == "all" {
        let state = AppState {
            db: db.clone(),
            presigner: presigner.clone(),
            storage: storage_service.clone(),
            migration: migration.clone(),
            moderation: Arc::new(ModerationService::new(
                db.clone(),
                storage_service.clone(),
                presigner.clone(),
            )),
            wallpapers: Arc::new(WallpaperService::new(db.clone(), presigner.clone())),
            config: config.clone(),
        };

        let trace_layer = TraceLayer::new_for_http()
            .make_span_with(|request: &axum::http::Request<_>| {
                let request_id = request
                    .headers()
                    .get("x-request-id")
                    .and_then(|v| v.to_str().ok())
                    .unwrap_or("unknown");
                tracing::info_span!(
                    "http_request",
                    method = %request.method(),
                    uri = %request.uri().path(),
                    request_id = %request_id,
                )
            })
            .on_request(|request: &axum::http::Request<_>, _span: &tracing::Span| {
                info!("📥 {} {}", request.method(), request.uri().path());
            })
            .on_response(
                |response: &axum::http::Response<_>,
                 latency: std::time::Duration,
                 _span: &tracing::Span| {
                    info!(
                        "📤 Finished in {:?} with status {}",
                        latency,
                        response.status()
                    );
                },
            );

        let app = create_app(state).layer(trace_layer);
        let bind = args.bind.clone().unwrap_or_else(|| config.bind_addr.clone());
        let listener = tokio::net::TcpListener::bind(&bind).await?;

        info!("✅ API Server listening on: http://{}", bind);
        info!("📖 Swagger UI documentation: http://{}/swagger-ui", bind);

        let mut server_shutdown = shutdown_rx.clone();
        let server = tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, app)
                .with_graceful_shutdown(async move {
                    let _ = server_shutdown.changed().await;
                })
                .await
            {
                error!("❌ Server runtime error: {}", e);
            }
        });
        tasks.push(("api", server));
    }

    // 6. Wait for shutdown
    shutdown_signal().await;
    let _ = shutdown_tx.send(true);

    // A running batch finishes recording its keys before the process exits
    for (name, task) in tasks {
        if let Err(e) = task.await {
            error!("❌ {} task ended abnormally: {}", name, e);
        }
    }

    info!("👋 Backend exited cleanly.");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("⌨️  Ctrl+C received, initiating graceful shutdown...");
        },
        _ = terminate => {
            info!("💤 SIGTERM received, initiating graceful shutdown...");
        },
    }
}
