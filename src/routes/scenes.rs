use axum::{
    extract::{Path, State},
    Extension, Json,
};
use serde::{Deserialize, Serialize};

use crate::entities::scene;
use crate::error::AppError;
use crate::middleware::auth::AuthUser;
use crate::routes::AppState;
use crate::services::scene as scenes;
use crate::services::scene::{LayerSpec, SceneView};

#[derive(Deserialize, utoipa::ToSchema)]
pub struct CreateSceneRequest {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Deserialize, utoipa::ToSchema)]
pub struct UpdateSceneRequest {
    pub name: Option<String>,
    /// Present-but-null clears the description; absent leaves it alone.
    #[serde(default, deserialize_with = "double_option")]
    #[schema(value_type = Option<String>)]
    pub description: Option<Option<String>>,
}

fn double_option<'de, D>(deserializer: D) -> Result<Option<Option<String>>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    use serde::Deserialize;
    Option::<String>::deserialize(deserializer).map(Some)
}

#[derive(Serialize, utoipa::ToSchema)]
pub struct SceneSummary {
    pub id: String,
    pub name: String,
    pub description: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

impl From<scene::Model> for SceneSummary {
    fn from(model: scene::Model) -> Self {
        Self {
            id: model.id.to_string(),
            name: model.name,
            description: model.description,
            created_at: model.created_at.and_utc().to_rfc3339(),
            updated_at: model.updated_at.and_utc().to_rfc3339(),
        }
    }
}

#[derive(Deserialize, utoipa::ToSchema)]
pub struct ReplaceLayersRequest {
    pub layers: Vec<LayerSpec>,
}

#[derive(Serialize, utoipa::ToSchema)]
pub struct LayerCrsResponse {
    pub scene_layer_id: String,
    pub coordinate_system: String,
}

#[utoipa::path(
    get,
    path = "/scenes",
    responses(
        (status = 200, description = "Scenes owned by the caller", body = Vec<SceneSummary>)
    ),
    security(("bearer_auth" = [])),
    tag = "Scenes"
)]
pub async fn list_scenes(
    Extension(user): Extension<AuthUser>,
    State(state): State<AppState>,
) -> Result<Json<Vec<SceneSummary>>, AppError> {
    let records = scenes::list_scenes(&state.db, &user).await?;
    Ok(Json(records.into_iter().map(SceneSummary::from).collect()))
}

#[utoipa::path(
    post,
    path = "/scenes",
    request_body = CreateSceneRequest,
    responses(
        (status = 200, description = "Scene created", body = SceneSummary),
        (status = 409, description = "Name already used by the caller")
    ),
    security(("bearer_auth" = [])),
    tag = "Scenes"
)]
pub async fn create_scene(
    Extension(user): Extension<AuthUser>,
    State(state): State<AppState>,
    Json(payload): Json<CreateSceneRequest>,
) -> Result<Json<SceneSummary>, AppError> {
    let record =
        scenes::create_scene(&state.db, &user, &payload.name, payload.description).await?;
    println!(
        "Scenes | POST /scenes | user={} | scene={} | res=200",
        user.username, record.id
    );
    Ok(Json(record.into()))
}

#[utoipa::path(
    get,
    path = "/scenes/{id}",
    params(("id" = String, Path, description = "Scene id")),
    responses(
        (status = 200, description = "Scene with ordered layers", body = SceneView),
        (status = 404, description = "Scene not found")
    ),
    security(("bearer_auth" = [])),
    tag = "Scenes"
)]
pub async fn get_scene(
    Extension(user): Extension<AuthUser>,
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<SceneView>, AppError> {
    let id = super::parse_id(&id)?;
    let view = scenes::read_scene(&state.db, id, &user).await?;
    Ok(Json(view))
}

#[utoipa::path(
    patch,
    path = "/scenes/{id}",
    params(("id" = String, Path, description = "Scene id")),
    request_body = UpdateSceneRequest,
    responses(
        (status = 200, description = "Scene updated", body = SceneSummary),
        (status = 404, description = "Scene not found"),
        (status = 409, description = "Name already used by the caller")
    ),
    security(("bearer_auth" = [])),
    tag = "Scenes"
)]
pub async fn update_scene(
    Extension(user): Extension<AuthUser>,
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(payload): Json<UpdateSceneRequest>,
) -> Result<Json<SceneSummary>, AppError> {
    let id = super::parse_id(&id)?;
    let record =
        scenes::update_scene(&state.db, id, &user, payload.name, payload.description).await?;
    Ok(Json(record.into()))
}

#[utoipa::path(
    delete,
    path = "/scenes/{id}",
    params(("id" = String, Path, description = "Scene id")),
    responses(
        (status = 200, description = "Scene and its layer bindings removed"),
        (status = 404, description = "Scene not found")
    ),
    security(("bearer_auth" = [])),
    tag = "Scenes"
)]
pub async fn delete_scene(
    Extension(user): Extension<AuthUser>,
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<serde_json::Value>, AppError> {
    let id = super::parse_id(&id)?;
    scenes::delete_scene(&state.db, id, &user).await?;
    println!(
        "Scenes | DELETE /scenes/{} | user={} | res=200",
        id, user.username
    );
    Ok(Json(serde_json::json!({ "deleted": id.to_string() })))
}

#[utoipa::path(
    patch,
    path = "/scenes/{id}/layers",
    params(("id" = String, Path, description = "Scene id")),
    request_body = ReplaceLayersRequest,
    responses(
        (status = 200, description = "Layer list replaced; returns the scene", body = SceneView),
        (status = 404, description = "Scene or referenced service not found"),
        (status = 400, description = "Invalid layer entry")
    ),
    security(("bearer_auth" = [])),
    tag = "Scenes"
)]
pub async fn replace_layers(
    Extension(user): Extension<AuthUser>,
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(payload): Json<ReplaceLayersRequest>,
) -> Result<Json<SceneView>, AppError> {
    let id = super::parse_id(&id)?;
    let view = scenes::replace_layers(&state.db, id, &user, payload.layers).await?;
    println!(
        "Scenes | PATCH /scenes/{}/layers | user={} | layers={} | res=200",
        id,
        user.username,
        view.layers.len()
    );
    Ok(Json(view))
}

#[utoipa::path(
    get,
    path = "/crs/layer/{scene_layer_id}",
    params(("scene_layer_id" = String, Path, description = "Scene layer id")),
    responses(
        (status = 200, description = "Coordinate system of the underlying file", body = LayerCrsResponse),
        (status = 404, description = "Layer, service, or file not found")
    ),
    security(("bearer_auth" = [])),
    tag = "Scenes"
)]
pub async fn layer_crs(
    Extension(user): Extension<AuthUser>,
    State(state): State<AppState>,
    Path(scene_layer_id): Path<String>,
) -> Result<Json<LayerCrsResponse>, AppError> {
    let id = super::parse_id(&scene_layer_id)?;
    let coordinate_system = scenes::layer_crs(&state.db, id, &user).await?;
    Ok(Json(LayerCrsResponse {
        scene_layer_id: id.to_string(),
        coordinate_system,
    }))
}
