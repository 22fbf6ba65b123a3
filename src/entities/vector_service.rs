use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Unified record for every tile service Martin serves, whether the source is
/// a spatial table (vector kinds) or an MBTiles artefact (raster kinds).
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Deserialize, Serialize)]
#[sea_orm(table_name = "vector_services")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: i64,
    pub file_id: i64,
    pub vector_type: VectorType,
    /// Set for spatial-table backed services.
    pub table_name: Option<String>,
    /// Set for MBTiles backed services (basename without extension).
    pub mbtiles_name: Option<String>,
    pub service_url: String,
    pub mvt_url: String,
    pub tilejson_url: String,
    pub style: Option<Json>,
    pub status: String, // active, pending, deleted
    pub user_id: i64,
    pub created_at: DateTime,
    pub updated_at: DateTime,
}

#[derive(EnumIter, DeriveActiveEnum, Clone, Debug, PartialEq, Eq, Deserialize, Serialize, utoipa::ToSchema)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::None)")]
#[serde(rename_all = "kebab-case")]
pub enum VectorType {
    #[sea_orm(string_value = "geojson")]
    #[serde(rename = "geojson")]
    Geojson,
    #[sea_orm(string_value = "shp")]
    #[serde(rename = "shp")]
    Shp,
    #[sea_orm(string_value = "dxf")]
    #[serde(rename = "dxf")]
    Dxf,
    #[sea_orm(string_value = "mbtiles-vector")]
    MbtilesVector,
    #[sea_orm(string_value = "mbtiles-raster")]
    MbtilesRaster,
    #[sea_orm(string_value = "raster-tiff-pyramid")]
    RasterTiffPyramid,
}

impl VectorType {
    /// Kinds whose service owns a spatial table in the database.
    pub fn is_table_backed(&self) -> bool {
        matches!(self, VectorType::Geojson | VectorType::Shp | VectorType::Dxf)
    }
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::file::Entity",
        from = "Column::FileId",
        to = "super::file::Column::Id"
    )]
    File,
    #[sea_orm(has_many = "super::scene_layer::Entity")]
    SceneLayer,
}

impl Related<super::file::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::File.def()
    }
}

impl Related<super::scene_layer::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::SceneLayer.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
