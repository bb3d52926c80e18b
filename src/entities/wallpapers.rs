use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// A wallpaper and, until migrated, the legacy location of its file.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "wallpapers")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,
    pub title: String,
    pub uploader_id: Option<String>,
    /// Legacy file location; migration candidates have this set and no `r2_key`.
    pub source_url: Option<String>,
    /// Destination object key. Written once, never overwritten.
    pub r2_key: Option<String>,
    pub content_type: Option<String>,
    #[sea_orm(default_value = 0)]
    pub downloads: i64,
    pub created_at: DateTimeUtc,
    pub migrated_at: Option<DateTimeUtc>,
    /// Last failed migration attempt; failed rows queue behind untried ones.
    pub migration_attempted_at: Option<DateTimeUtc>,
    pub migration_error: Option<String>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::upload_requests::Entity")]
    UploadRequests,
}

impl Related<super::upload_requests::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::UploadRequests.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
