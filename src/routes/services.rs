use axum::{
    extract::{Path, Query, State},
    Extension, Json,
};
use sea_orm::{ColumnTrait, EntityTrait, QueryFilter, QueryOrder};
use serde::Deserialize;

use crate::entities::user::Role;
use crate::entities::vector_service;
use crate::error::AppError;
use crate::middleware::auth::AuthUser;
use crate::routes::publish::ServiceResponse;
use crate::routes::AppState;

#[derive(Deserialize, utoipa::IntoParams)]
pub struct ListServicesQuery {
    /// Filter by vector type (geojson, shp, dxf, mbtiles-vector,
    /// mbtiles-raster, raster-tiff-pyramid).
    pub kind: Option<String>,
    /// Admin-only filter by owner id.
    pub user_id: Option<String>,
}

#[utoipa::path(
    get,
    path = "/services",
    params(ListServicesQuery),
    responses(
        (status = 200, description = "Active and pending services", body = Vec<ServiceResponse>)
    ),
    security(("bearer_auth" = [])),
    tag = "Services"
)]
pub async fn list_services(
    Extension(user): Extension<AuthUser>,
    State(state): State<AppState>,
    Query(query): Query<ListServicesQuery>,
) -> Result<Json<Vec<ServiceResponse>>, AppError> {
    let mut finder = vector_service::Entity::find()
        .filter(vector_service::Column::Status.ne("deleted"))
        .order_by_desc(vector_service::Column::CreatedAt);

    match user.role {
        Role::Admin => {
            if let Some(owner) = &query.user_id {
                finder = finder.filter(vector_service::Column::UserId.eq(super::parse_id(owner)?));
            }
        }
        Role::User => {
            finder = finder.filter(vector_service::Column::UserId.eq(user.id));
        }
    }
    if let Some(kind) = &query.kind {
        finder = finder.filter(vector_service::Column::VectorType.eq(kind.as_str()));
    }

    let services = finder.all(&state.db.conn).await?;
    Ok(Json(services.into_iter().map(ServiceResponse::from).collect()))
}

#[utoipa::path(
    get,
    path = "/services/{id}",
    params(("id" = String, Path, description = "Service id")),
    responses(
        (status = 200, description = "Service detail", body = ServiceResponse),
        (status = 404, description = "Service not found")
    ),
    security(("bearer_auth" = [])),
    tag = "Services"
)]
pub async fn get_service(
    Extension(user): Extension<AuthUser>,
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<ServiceResponse>, AppError> {
    let id = super::parse_id(&id)?;
    let service = vector_service::Entity::find_by_id(id)
        .one(&state.db.conn)
        .await?
        .filter(|s| s.status != "deleted")
        .filter(|s| s.user_id == user.id || user.role == Role::Admin)
        .ok_or_else(|| AppError::NotFound(format!("Service {} not found", id)))?;
    Ok(Json(service.into()))
}

#[utoipa::path(
    get,
    path = "/services/ogc",
    responses(
        (status = 200, description = "Active OGC services", body = Vec<crate::routes::publish::OgcServiceResponse>)
    ),
    security(("bearer_auth" = [])),
    tag = "Services"
)]
pub async fn list_ogc_services(
    Extension(user): Extension<AuthUser>,
    State(state): State<AppState>,
) -> Result<Json<Vec<crate::routes::publish::OgcServiceResponse>>, AppError> {
    use crate::entities::ogc_service;

    let mut finder = ogc_service::Entity::find()
        .filter(ogc_service::Column::Status.eq("active"))
        .order_by_desc(ogc_service::Column::CreatedAt);
    if user.role != Role::Admin {
        finder = finder.filter(ogc_service::Column::UserId.eq(user.id));
    }

    let services = finder.all(&state.db.conn).await?;
    Ok(Json(services.into_iter().map(Into::into).collect()))
}

#[utoipa::path(
    delete,
    path = "/services/ogc/{id}",
    params(("id" = String, Path, description = "OGC service id")),
    responses(
        (status = 200, description = "Layer deregistered and row removed"),
        (status = 404, description = "Service not found"),
        (status = 502, description = "OGC server rejected the request")
    ),
    security(("bearer_auth" = [])),
    tag = "Services"
)]
pub async fn delete_ogc_service(
    Extension(user): Extension<AuthUser>,
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<serde_json::Value>, AppError> {
    use crate::entities::ogc_service;

    let id = super::parse_id(&id)?;
    ogc_service::Entity::find_by_id(id)
        .one(&state.db.conn)
        .await?
        .filter(|s| s.user_id == user.id || user.role == Role::Admin)
        .ok_or_else(|| AppError::NotFound(format!("Service {} not found", id)))?;

    state.publisher.delete_ogc_service(id).await?;
    Ok(Json(serde_json::json!({ "deleted": id.to_string() })))
}

#[utoipa::path(
    delete,
    path = "/services/{id}",
    params(("id" = String, Path, description = "Service id")),
    responses(
        (status = 200, description = "Service and dependents removed"),
        (status = 404, description = "Service not found")
    ),
    security(("bearer_auth" = [])),
    tag = "Services"
)]
pub async fn delete_service(
    Extension(user): Extension<AuthUser>,
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<serde_json::Value>, AppError> {
    let id = super::parse_id(&id)?;

    // Ownership check before the cascade runs.
    vector_service::Entity::find_by_id(id)
        .one(&state.db.conn)
        .await?
        .filter(|s| s.user_id == user.id || user.role == Role::Admin)
        .ok_or_else(|| AppError::NotFound(format!("Service {} not found", id)))?;

    state.publisher.delete_service(id).await?;

    println!(
        "Services | DELETE /services/{} | user={} | res=200",
        id, user.username
    );
    Ok(Json(serde_json::json!({ "deleted": id.to_string() })))
}
