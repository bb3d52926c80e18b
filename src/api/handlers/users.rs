use crate::utils::auth::Claims;
use axum::{Extension, Json};
use serde::Serialize;
use utoipa::ToSchema;

#[derive(Serialize, ToSchema)]
pub struct MeResponse {
    pub id: String,
    pub role: Option<String>,
    pub is_admin: bool,
}

#[utoipa::path(
    get,
    path = "/me",
    responses(
        (status = 200, description = "Current identity", body = MeResponse),
        (status = 401, description = "Unauthorized")
    ),
    security(
        ("jwt" = [])
    ),
    tag = "users"
)]
pub async fn get_me(Extension(claims): Extension<Claims>) -> Json<MeResponse> {
    Json(MeResponse {
        is_admin: claims.is_admin(),
        id: claims.sub,
        role: claims.role,
    })
}
