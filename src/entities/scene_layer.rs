use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Ordered binding of a service into a scene. Exactly one of
/// `vector_service_id` / `ogc_service_id` is set, per `service_kind`; the
/// foreign keys cascade so deleting a service removes its bindings.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Deserialize, Serialize)]
#[sea_orm(table_name = "scene_layers")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: i64,
    pub scene_id: i64,
    pub layer_order: i32,
    pub service_kind: ServiceKind,
    pub vector_service_id: Option<i64>,
    pub ogc_service_id: Option<i64>,
    pub visible: bool,
    pub opacity: f64,
    pub style: Option<Json>,
    pub created_at: DateTime,
}

#[derive(EnumIter, DeriveActiveEnum, Clone, Copy, Debug, PartialEq, Eq, Deserialize, Serialize, utoipa::ToSchema)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::None)")]
#[serde(rename_all = "lowercase")]
pub enum ServiceKind {
    #[sea_orm(string_value = "vector")]
    Vector,
    #[sea_orm(string_value = "ogc")]
    Ogc,
}

impl Model {
    pub fn service_id(&self) -> Option<i64> {
        match self.service_kind {
            ServiceKind::Vector => self.vector_service_id,
            ServiceKind::Ogc => self.ogc_service_id,
        }
    }
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::scene::Entity",
        from = "Column::SceneId",
        to = "super::scene::Column::Id",
        on_delete = "Cascade"
    )]
    Scene,
    #[sea_orm(
        belongs_to = "super::vector_service::Entity",
        from = "Column::VectorServiceId",
        to = "super::vector_service::Column::Id",
        on_delete = "Cascade"
    )]
    VectorService,
    #[sea_orm(
        belongs_to = "super::ogc_service::Entity",
        from = "Column::OgcServiceId",
        to = "super::ogc_service::Column::Id",
        on_delete = "Cascade"
    )]
    OgcService,
}

impl Related<super::scene::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Scene.def()
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
