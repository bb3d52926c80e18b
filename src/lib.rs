pub mod api;
pub mod config;
pub mod entities;
pub mod infrastructure;
pub mod services;
pub mod utils;

use crate::config::AppConfig;
use crate::services::migration::MigrationService;
use crate::services::moderation::ModerationService;
use crate::services::signer::Presigner;
use crate::services::storage::StorageService;
use crate::services::wallpaper_service::WallpaperService;
use axum::{
    Router,
    middleware::{from_fn, from_fn_with_state},
    routing::{get, post},
};
use sea_orm::DatabaseConnection;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use utoipa::openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme};
use utoipa::{Modify, OpenApi};
use utoipa_swagger_ui::SwaggerUi;

#[derive(OpenApi)]
#[openapi(
    paths(
        api::handlers::health::health_check,
        api::handlers::users::get_me,
        api::handlers::uploads::create_upload,
        api::handlers::wallpapers::download_wallpaper,
        api::handlers::admin::list_uploads,
        api::handlers::admin::approve_upload,
        api::handlers::admin::reject_upload,
        api::handlers::admin::register_legacy,
        api::handlers::admin::run_migration_batch,
    ),
    components(
        schemas(
            api::handlers::health::HealthResponse,
            api::handlers::users::MeResponse,
            api::handlers::uploads::CreateUploadRequest,
            api::handlers::uploads::CreateUploadResponse,
            api::handlers::admin::UploadRequestResponse,
            api::handlers::admin::WallpaperResponse,
            api::handlers::admin::RejectRequest,
            api::handlers::admin::RegisterLegacyRequest,
            api::handlers::admin::MigrationBatchRequest,
            entities::upload_requests::UploadStatus,
            services::migration::MigrationBatchResult,
            services::wallpaper_service::DownloadLink,
        )
    ),
    modifiers(&SecurityAddon),
    tags(
        (name = "system", description = "Health"),
        (name = "users", description = "Identity"),
        (name = "uploads", description = "Creator uploads"),
        (name = "wallpapers", description = "Wallpaper downloads"),
        (name = "admin", description = "Moderation and migration")
    )
)]
pub struct ApiDoc;

struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "jwt",
                SecurityScheme::Http(
                    HttpBuilder::new()
                        .scheme(HttpAuthScheme::Bearer)
                        .bearer_format("JWT")
                        .build(),
                ),
            );
        }
    }
}

#[derive(Clone)]
pub struct AppState {
    pub db: DatabaseConnection,
    pub presigner: Arc<Presigner>,
    pub storage: Arc<dyn StorageService>,
    pub migration: Arc<MigrationService>,
    pub moderation: Arc<ModerationService>,
    pub wallpapers: Arc<WallpaperService>,
    pub config: AppConfig,
}

pub fn create_app(state: AppState) -> Router {
    let admin = Router::new()
        .route("/admin/uploads", get(api::handlers::admin::list_uploads))
        .route(
            "/admin/uploads/:id/approve",
            post(api::handlers::admin::approve_upload),
        )
        .route(
            "/admin/uploads/:id/reject",
            post(api::handlers::admin::reject_upload),
        )
        .route(
            "/admin/wallpapers",
            post(api::handlers::admin::register_legacy),
        )
        .route(
            "/admin/migrations/batch",
            post(api::handlers::admin::run_migration_batch),
        )
        .layer(from_fn(api::middleware::auth::admin_middleware));

    let authenticated = Router::new()
        .route("/me", get(api::handlers::users::get_me))
        .route("/uploads", post(api::handlers::uploads::create_upload))
        .route(
            "/wallpapers/:id/download",
            get(api::handlers::wallpapers::download_wallpaper),
        )
        .merge(admin)
        .layer(from_fn_with_state(
            state.clone(),
            api::middleware::auth::auth_middleware,
        ));

    Router::new()
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .route("/health", get(api::handlers::health::health_check))
        .merge(authenticated)
        .layer(from_fn(api::middleware::request_id::request_id_middleware))
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any)
                .expose_headers(Any),
        )
        .with_state(state)
}
