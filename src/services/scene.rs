use sea_orm::{
    ActiveModelTrait, ColumnTrait, EntityTrait, QueryFilter, QueryOrder, Set, TransactionTrait,
};
use serde::{Deserialize, Serialize};

use crate::db::Db;
use crate::entities::{ogc_service, scene, scene_layer, vector_service};
use crate::entities::scene_layer::ServiceKind;
use crate::entities::user::Role;
use crate::error::AppError;
use crate::middleware::auth::AuthUser;

/// One layer binding as submitted by the client. `service_id` is the decimal
/// string form of the target service's id.
#[derive(Debug, Deserialize, utoipa::ToSchema)]
pub struct LayerSpec {
    pub service_kind: ServiceKind,
    pub service_id: String,
    #[serde(default = "default_visible")]
    pub visible: bool,
    #[serde(default = "default_opacity")]
    pub opacity: f64,
    #[serde(default)]
    pub style: Option<serde_json::Value>,
}

fn default_visible() -> bool {
    true
}

fn default_opacity() -> f64 {
    1.0
}

/// A scene layer joined with its resolved service endpoints.
#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct LayerView {
    pub id: String,
    pub layer_order: i32,
    pub service_kind: ServiceKind,
    pub service_id: String,
    pub visible: bool,
    pub opacity: f64,
    pub style: Option<serde_json::Value>,
    /// Tile or WMS endpoint, depending on the kind.
    pub service_url: String,
    pub service_status: String,
}

#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct SceneView {
    pub id: String,
    pub name: String,
    pub description: Option<String>,
    pub user_id: String,
    pub layers: Vec<LayerView>,
    pub created_at: String,
    pub updated_at: String,
}

fn parse_id(raw: &str) -> Result<i64, AppError> {
    raw.parse::<i64>()
        .map_err(|_| AppError::InvalidInput(format!("'{}' is not a valid id", raw)))
}

async fn owned_scene(db: &Db, scene_id: i64, user: &AuthUser) -> Result<scene::Model, AppError> {
    let record = scene::Entity::find_by_id(scene_id)
        .one(&db.conn)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Scene {} not found", scene_id)))?;
    if record.user_id != user.id && user.role != Role::Admin {
        return Err(AppError::NotFound(format!("Scene {} not found", scene_id)));
    }
    Ok(record)
}

pub async fn create_scene(
    db: &Db,
    user: &AuthUser,
    name: &str,
    description: Option<String>,
) -> Result<scene::Model, AppError> {
    let name = name.trim();
    if name.is_empty() {
        return Err(AppError::InvalidInput("Scene name cannot be empty".to_string()));
    }

    let now = chrono::Utc::now().naive_utc();
    let user_id = user.id;
    let id = db
        .insert_with_generated_id(|id| scene::ActiveModel {
            id: Set(id),
            user_id: Set(user_id),
            name: Set(name.to_string()),
            description: Set(description),
            created_at: Set(now),
            updated_at: Set(now),
        })
        .await
        .map_err(|e| match e {
            AppError::Conflict(_) => {
                AppError::Conflict(format!("A scene named '{}' already exists", name))
            }
            other => other,
        })?;

    scene::Entity::find_by_id(id)
        .one(&db.conn)
        .await?
        .ok_or_else(|| AppError::InternalServerError("Scene row vanished".to_string()))
}

pub async fn list_scenes(db: &Db, user: &AuthUser) -> Result<Vec<scene::Model>, AppError> {
    let mut query = scene::Entity::find().order_by_asc(scene::Column::CreatedAt);
    if user.role != Role::Admin {
        query = query.filter(scene::Column::UserId.eq(user.id));
    }
    query.all(&db.conn).await.map_err(AppError::from)
}

pub async fn update_scene(
    db: &Db,
    scene_id: i64,
    user: &AuthUser,
    name: Option<String>,
    description: Option<Option<String>>,
) -> Result<scene::Model, AppError> {
    let record = owned_scene(db, scene_id, user).await?;
    let mut active: scene::ActiveModel = record.into();

    if let Some(name) = name {
        let name = name.trim().to_string();
        if name.is_empty() {
            return Err(AppError::InvalidInput("Scene name cannot be empty".to_string()));
        }
        active.name = Set(name);
    }
    if let Some(description) = description {
        active.description = Set(description);
    }
    active.updated_at = Set(chrono::Utc::now().naive_utc());

    active.update(&db.conn).await.map_err(|e| match AppError::from(e) {
        AppError::Conflict(_) => AppError::Conflict("A scene with that name already exists".to_string()),
        other => other,
    })
}

/// Deletes the scene; layer rows follow via the cascade, services stay.
pub async fn delete_scene(db: &Db, scene_id: i64, user: &AuthUser) -> Result<(), AppError> {
    let record = owned_scene(db, scene_id, user).await?;
    scene::Entity::delete_by_id(record.id)
        .exec(&db.conn)
        .await?;
    Ok(())
}

/// Replaces a scene's layer list wholesale inside one transaction. Order is
/// the position in the submitted list; every referenced service must exist
/// and be live.
pub async fn replace_layers(
    db: &Db,
    scene_id: i64,
    user: &AuthUser,
    layers: Vec<LayerSpec>,
) -> Result<SceneView, AppError> {
    let record = owned_scene(db, scene_id, user).await?;

    // Resolve everything before touching the table so a bad entry leaves the
    // scene untouched.
    let mut resolved: Vec<(LayerSpec, i64)> = Vec::with_capacity(layers.len());
    for spec in layers {
        let service_id = parse_id(&spec.service_id)?;
        match spec.service_kind {
            ServiceKind::Vector => {
                let found = vector_service::Entity::find_by_id(service_id)
                    .one(&db.conn)
                    .await?
                    .filter(|s| s.status == "active");
                if found.is_none() {
                    return Err(AppError::NotFound(format!(
                        "Vector service {} not found",
                        service_id
                    )));
                }
            }
            ServiceKind::Ogc => {
                let found = ogc_service::Entity::find_by_id(service_id)
                    .one(&db.conn)
                    .await?
                    .filter(|s| s.status == "active");
                if found.is_none() {
                    return Err(AppError::NotFound(format!(
                        "OGC service {} not found",
                        service_id
                    )));
                }
            }
        }
        if !(0.0..=1.0).contains(&spec.opacity) {
            return Err(AppError::InvalidInput(
                "Layer opacity must be between 0 and 1".to_string(),
            ));
        }
        resolved.push((spec, service_id));
    }

    let txn = db.conn.begin().await?;

    scene_layer::Entity::delete_many()
        .filter(scene_layer::Column::SceneId.eq(record.id))
        .exec(&txn)
        .await?;

    let now = chrono::Utc::now().naive_utc();
    for (order, (spec, service_id)) in resolved.into_iter().enumerate() {
        let layer = scene_layer::ActiveModel {
            id: Set(db.next_id()),
            scene_id: Set(record.id),
            layer_order: Set(order as i32),
            service_kind: Set(spec.service_kind),
            vector_service_id: Set(matches!(spec.service_kind, ServiceKind::Vector).then_some(service_id)),
            ogc_service_id: Set(matches!(spec.service_kind, ServiceKind::Ogc).then_some(service_id)),
            visible: Set(spec.visible),
            opacity: Set(spec.opacity),
            style: Set(spec.style),
            created_at: Set(now),
        };
        layer.insert(&txn).await?;
    }

    let mut touched: scene::ActiveModel = record.into();
    touched.updated_at = Set(now);
    let record = touched.update(&txn).await?;

    txn.commit().await?;

    read_scene_model(db, record).await
}

pub async fn read_scene(db: &Db, scene_id: i64, user: &AuthUser) -> Result<SceneView, AppError> {
    let record = owned_scene(db, scene_id, user).await?;
    read_scene_model(db, record).await
}

async fn read_scene_model(db: &Db, record: scene::Model) -> Result<SceneView, AppError> {
    let layers = scene_layer::Entity::find()
        .filter(scene_layer::Column::SceneId.eq(record.id))
        .order_by_asc(scene_layer::Column::LayerOrder)
        .all(&db.conn)
        .await?;

    let mut views = Vec::with_capacity(layers.len());
    for layer in layers {
        let (service_id, service_url, service_status) = match layer.service_kind {
            ServiceKind::Vector => {
                let id = layer.vector_service_id.unwrap_or_default();
                match vector_service::Entity::find_by_id(id).one(&db.conn).await? {
                    Some(s) => (id, s.mvt_url, s.status),
                    None => (id, String::new(), "deleted".to_string()),
                }
            }
            ServiceKind::Ogc => {
                let id = layer.ogc_service_id.unwrap_or_default();
                match ogc_service::Entity::find_by_id(id).one(&db.conn).await? {
                    Some(s) => (id, s.wms_url, s.status),
                    None => (id, String::new(), "deleted".to_string()),
                }
            }
        };

        views.push(LayerView {
            id: layer.id.to_string(),
            layer_order: layer.layer_order,
            service_kind: layer.service_kind,
            service_id: service_id.to_string(),
            visible: layer.visible,
            opacity: layer.opacity,
            style: layer.style,
            service_url,
            service_status,
        });
    }

    Ok(SceneView {
        id: record.id.to_string(),
        name: record.name,
        description: record.description,
        user_id: record.user_id.to_string(),
        layers: views,
        created_at: record.created_at.and_utc().to_rfc3339(),
        updated_at: record.updated_at.and_utc().to_rfc3339(),
    })
}

/// CRS lookup for one scene layer: walks layer → service → file and returns
/// the coordinate system declared at upload (default EPSG:4326).
pub async fn layer_crs(
    db: &Db,
    scene_layer_id: i64,
    user: &AuthUser,
) -> Result<String, AppError> {
    let layer = scene_layer::Entity::find_by_id(scene_layer_id)
        .one(&db.conn)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Scene layer {} not found", scene_layer_id)))?;

    // Ownership is checked through the parent scene.
    owned_scene(db, layer.scene_id, user).await?;

    let file_id = match layer.service_kind {
        ServiceKind::Vector => {
            let id = layer
                .vector_service_id
                .ok_or_else(|| AppError::InternalServerError("Layer missing service id".to_string()))?;
            vector_service::Entity::find_by_id(id)
                .one(&db.conn)
                .await?
                .map(|s| s.file_id)
        }
        ServiceKind::Ogc => {
            let id = layer
                .ogc_service_id
                .ok_or_else(|| AppError::InternalServerError("Layer missing service id".to_string()))?;
            ogc_service::Entity::find_by_id(id)
                .one(&db.conn)
                .await?
                .map(|s| s.file_id)
        }
    };

    let file_id = file_id.ok_or_else(|| {
        AppError::NotFound("Underlying service no longer exists".to_string())
    })?;

    let file = crate::entities::file::Entity::find_by_id(file_id)
        .one(&db.conn)
        .await?
        .ok_or_else(|| AppError::NotFound("Underlying file no longer exists".to_string()))?;

    Ok(file
        .coordinate_system
        .unwrap_or_else(|| "EPSG:4326".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::vector_service::VectorType;
    use sea_orm::{DatabaseBackend, MockDatabase};

    fn viewer() -> AuthUser {
        AuthUser {
            id: 10,
            username: "cartographer".to_string(),
            role: Role::User,
        }
    }

    fn scene_row(user_id: i64) -> scene::Model {
        let now = chrono::Utc::now().naive_utc();
        scene::Model {
            id: 100,
            user_id,
            name: "Basemap".to_string(),
            description: None,
            created_at: now,
            updated_at: now,
        }
    }

    fn vector_row(status: &str) -> vector_service::Model {
        let now = chrono::Utc::now().naive_utc();
        vector_service::Model {
            id: 42,
            file_id: 7,
            vector_type: VectorType::Geojson,
            table_name: Some("vector_ab12cd34".to_string()),
            mbtiles_name: None,
            service_url: "http://localhost:3000/vector_ab12cd34".to_string(),
            mvt_url: "http://localhost:3000/vector_ab12cd34/{z}/{x}/{y}".to_string(),
            tilejson_url: "http://localhost:3000/vector_ab12cd34".to_string(),
            style: None,
            status: status.to_string(),
            user_id: 10,
            created_at: now,
            updated_at: now,
        }
    }

    #[tokio::test]
    async fn replace_layers_rejects_vector_service_that_is_not_active() {
        let user = viewer();
        let conn = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([vec![scene_row(user.id)]])
            .append_query_results([vec![vector_row("pending")]])
            .into_connection();
        let db = Db::with_connection(conn);

        let layers = vec![LayerSpec {
            service_kind: ServiceKind::Vector,
            service_id: "42".to_string(),
            visible: true,
            opacity: 1.0,
            style: None,
        }];

        let err = replace_layers(&db, 100, &user, layers).await.unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }

    #[test]
    fn layer_spec_defaults() {
        let spec: LayerSpec = serde_json::from_str(
            r#"{"service_kind":"vector","service_id":"7341992446527279104"}"#,
        )
        .unwrap();
        assert_eq!(spec.service_kind, ServiceKind::Vector);
        assert!(spec.visible);
        assert_eq!(spec.opacity, 1.0);
        assert!(spec.style.is_none());
    }

    #[test]
    fn layer_spec_full_form() {
        let spec: LayerSpec = serde_json::from_str(
            r##"{"service_kind":"ogc","service_id":"42","visible":false,"opacity":0.5,"style":{"color":"#ff0000"}}"##,
        )
        .unwrap();
        assert_eq!(spec.service_kind, ServiceKind::Ogc);
        assert!(!spec.visible);
        assert_eq!(spec.opacity, 0.5);
        assert_eq!(spec.style.unwrap()["color"], "#ff0000");
    }

    #[test]
    fn layer_spec_rejects_bad_kind() {
        let parsed: Result<LayerSpec, _> =
            serde_json::from_str(r#"{"service_kind":"tile","service_id":"42"}"#);
        assert!(parsed.is_err());
    }

    #[test]
    fn ids_parse_as_decimal_strings_only() {
        assert_eq!(parse_id("7341992446527279104").unwrap(), 7341992446527279104);
        assert!(parse_id("abc").is_err());
        assert!(parse_id("").is_err());
        assert!(parse_id("0x10").is_err());
    }
}
