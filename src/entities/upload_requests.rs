use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize, ToSchema,
)]
#[sea_orm(rs_type = "String", db_type = "Text")]
#[serde(rename_all = "lowercase")]
pub enum UploadStatus {
    #[sea_orm(string_value = "staged")]
    Staged,
    #[sea_orm(string_value = "approved")]
    Approved,
    #[sea_orm(string_value = "rejected")]
    Rejected,
}

/// A creator upload waiting in the staging area for moderation.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "upload_requests")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,
    pub user_id: String,
    pub title: String,
    pub filename: String,
    pub content_type: String,
    pub staging_key: String,
    pub status: UploadStatus,
    pub rejection_reason: Option<String>,
    pub wallpaper_id: Option<String>,
    pub created_at: DateTimeUtc,
    pub reviewed_at: Option<DateTimeUtc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::wallpapers::Entity",
        from = "Column::WallpaperId",
        to = "super::wallpapers::Column::Id",
        on_update = "Cascade",
        on_delete = "SetNull"
    )]
    Wallpapers,
}

impl Related<super::wallpapers::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Wallpapers.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
