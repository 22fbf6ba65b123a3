use axum::{
    extract::{Path, State},
    Extension, Json,
};
use serde::{Deserialize, Serialize};

use crate::entities::vector_service::{self, VectorType};
use crate::error::AppError;
use crate::middleware::auth::AuthUser;
use crate::routes::AppState;

#[derive(Serialize, utoipa::ToSchema)]
pub struct ServiceResponse {
    pub id: String,
    pub file_id: String,
    pub vector_type: VectorType,
    pub table_name: Option<String>,
    pub mbtiles_name: Option<String>,
    pub service_url: String,
    pub mvt_url: String,
    pub tilejson_url: String,
    pub status: String,
    pub user_id: String,
    pub created_at: String,
}

impl From<vector_service::Model> for ServiceResponse {
    fn from(model: vector_service::Model) -> Self {
        Self {
            id: model.id.to_string(),
            file_id: model.file_id.to_string(),
            vector_type: model.vector_type,
            table_name: model.table_name,
            mbtiles_name: model.mbtiles_name,
            service_url: model.service_url,
            mvt_url: model.mvt_url,
            tilejson_url: model.tilejson_url,
            status: model.status,
            user_id: model.user_id.to_string(),
            created_at: model.created_at.and_utc().to_rfc3339(),
        }
    }
}

#[derive(Deserialize, utoipa::ToSchema)]
pub struct RasterPublishRequest {
    pub min_zoom: Option<u8>,
    pub max_zoom: Option<u8>,
}

#[derive(Serialize, utoipa::ToSchema)]
pub struct RasterPublishResponse {
    pub job_id: String,
    pub file_id: String,
    pub min_zoom: u8,
    pub max_zoom: u8,
}

#[derive(Serialize, utoipa::ToSchema)]
pub struct OgcServiceResponse {
    pub id: String,
    pub file_id: String,
    pub workspace: String,
    pub layer_name: String,
    pub wms_url: String,
    pub wfs_url: String,
    pub status: String,
}

impl From<crate::entities::ogc_service::Model> for OgcServiceResponse {
    fn from(model: crate::entities::ogc_service::Model) -> Self {
        Self {
            id: model.id.to_string(),
            file_id: model.file_id.to_string(),
            workspace: model.workspace,
            layer_name: model.layer_name,
            wms_url: model.wms_url,
            wfs_url: model.wfs_url,
            status: model.status,
        }
    }
}

#[utoipa::path(
    post,
    path = "/publish/vector/{file_id}",
    params(("file_id" = String, Path, description = "Uploaded file id")),
    responses(
        (status = 200, description = "Service published (status active or pending)", body = ServiceResponse),
        (status = 404, description = "File not found"),
        (status = 409, description = "Already published or publish in progress"),
        (status = 415, description = "File cannot be published as vector"),
        (status = 422, description = "Spatial payload rejected")
    ),
    security(("bearer_auth" = [])),
    tag = "Publishing"
)]
pub async fn publish_vector(
    Extension(user): Extension<AuthUser>,
    State(state): State<AppState>,
    Path(file_id): Path<String>,
) -> Result<Json<ServiceResponse>, AppError> {
    let file_id = super::parse_id(&file_id)?;
    let service = state.publisher.publish_vector(file_id, &user).await?;
    println!(
        "Publish | POST /publish/vector/{} | user={} | status={} | res=200",
        file_id, user.username, service.status
    );
    Ok(Json(service.into()))
}

#[utoipa::path(
    post,
    path = "/publish/raster/{file_id}",
    params(("file_id" = String, Path, description = "Uploaded GeoTIFF file id")),
    request_body = RasterPublishRequest,
    responses(
        (status = 200, description = "Conversion queued", body = RasterPublishResponse),
        (status = 400, description = "Invalid zoom range"),
        (status = 404, description = "File not found"),
        (status = 409, description = "Already published or publish in progress")
    ),
    security(("bearer_auth" = [])),
    tag = "Publishing"
)]
pub async fn publish_raster(
    Extension(user): Extension<AuthUser>,
    State(state): State<AppState>,
    Path(file_id): Path<String>,
    Json(payload): Json<RasterPublishRequest>,
) -> Result<Json<RasterPublishResponse>, AppError> {
    let file_id = super::parse_id(&file_id)?;
    let min_zoom = payload.min_zoom.unwrap_or(2);
    let max_zoom = payload.max_zoom.unwrap_or(12);

    let job_id = state
        .publisher
        .publish_raster(file_id, min_zoom, max_zoom, &user)
        .await?;

    println!(
        "Publish | POST /publish/raster/{} | user={} | zooms={}..{} | job={} | res=200",
        file_id, user.username, min_zoom, max_zoom, job_id
    );
    Ok(Json(RasterPublishResponse {
        job_id: job_id.to_string(),
        file_id: file_id.to_string(),
        min_zoom,
        max_zoom,
    }))
}

#[utoipa::path(
    post,
    path = "/publish/ogc/{file_id}",
    params(("file_id" = String, Path, description = "File with an ingested spatial table")),
    responses(
        (status = 200, description = "WMS/WFS layer registered", body = OgcServiceResponse),
        (status = 404, description = "File not found"),
        (status = 409, description = "Already published"),
        (status = 502, description = "OGC server rejected the request")
    ),
    security(("bearer_auth" = [])),
    tag = "Publishing"
)]
pub async fn publish_ogc(
    Extension(user): Extension<AuthUser>,
    State(state): State<AppState>,
    Path(file_id): Path<String>,
) -> Result<Json<OgcServiceResponse>, AppError> {
    let file_id = super::parse_id(&file_id)?;
    let service = state.publisher.publish_ogc(file_id, &user).await?;
    println!(
        "Publish | POST /publish/ogc/{} | user={} | res=200",
        file_id, user.username
    );
    Ok(Json(service.into()))
}
