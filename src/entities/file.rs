use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Deserialize, Serialize)]
#[sea_orm(table_name = "files")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: i64,
    pub user_id: i64,
    pub file_name: String,
    /// Absolute path under the upload root. Immutable once written.
    #[sea_orm(unique)]
    pub file_path: String,
    pub file_size: i64,
    pub file_type: FileType,
    /// Concrete format within the declared type: geojson, shp, dxf, tif, mbtiles.
    pub subtype: String,
    pub coordinate_system: Option<String>,
    pub status: String, // active, deleted
    pub upload_date: DateTime,
}

#[derive(EnumIter, DeriveActiveEnum, Clone, Debug, PartialEq, Eq, Deserialize, Serialize, utoipa::ToSchema)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::None)")]
#[serde(rename_all = "lowercase")]
pub enum FileType {
    #[sea_orm(string_value = "vector")]
    Vector,
    #[sea_orm(string_value = "raster")]
    Raster,
    #[sea_orm(string_value = "archive")]
    Archive,
    #[sea_orm(string_value = "mbtiles")]
    Mbtiles,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::user::Entity",
        from = "Column::UserId",
        to = "super::user::Column::Id"
    )]
    User,
    #[sea_orm(has_many = "super::vector_service::Entity")]
    VectorService,
    #[sea_orm(has_many = "super::ogc_service::Entity")]
    OgcService,
}

impl Related<super::user::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::User.def()
    }
}

impl Related<super::vector_service::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::VectorService.def()
    }
}

impl Related<super::ogc_service::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::OgcService.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
