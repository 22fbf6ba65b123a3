use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Deserialize, Serialize)]
#[sea_orm(table_name = "ogc_services")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: i64,
    pub file_id: i64,
    pub spatial_table: String,
    pub workspace: String,
    pub layer_name: String,
    pub wms_url: String,
    pub wfs_url: String,
    pub status: String, // active, deleted
    pub user_id: i64,
    pub created_at: DateTime,
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
