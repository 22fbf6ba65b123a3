use axum::{
    extract::{Path, Query, State},
    Extension, Json,
};
use serde::{Deserialize, Serialize};

use crate::entities::service_connection::{self, ConnectionKind};
use crate::error::AppError;
use crate::middleware::auth::AuthUser;
use crate::routes::AppState;
use crate::services::connections::{self, ConnectionInput};

#[derive(Serialize, utoipa::ToSchema)]
pub struct ConnectionResponse {
    pub id: String,
    pub kind: ConnectionKind,
    pub name: String,
    pub url: String,
    pub is_default: bool,
    pub last_test_time: Option<String>,
    pub last_test_status: String,
    pub created_at: String,
}

impl From<service_connection::Model> for ConnectionResponse {
    fn from(model: service_connection::Model) -> Self {
        Self {
            id: model.id.to_string(),
            kind: model.kind,
            name: model.name,
            url: model.url,
            is_default: model.is_default,
            last_test_time: model.last_test_time.map(|t| t.and_utc().to_rfc3339()),
            last_test_status: model.last_test_status,
            created_at: model.created_at.and_utc().to_rfc3339(),
        }
    }
}

#[derive(Deserialize, utoipa::IntoParams)]
pub struct ListConnectionsQuery {
    pub kind: Option<ConnectionKind>,
}

#[utoipa::path(
    get,
    path = "/connections",
    params(ListConnectionsQuery),
    responses(
        (status = 200, description = "Connections owned by the caller", body = Vec<ConnectionResponse>)
    ),
    security(("bearer_auth" = [])),
    tag = "Connections"
)]
pub async fn list_connections(
    Extension(user): Extension<AuthUser>,
    State(state): State<AppState>,
    Query(query): Query<ListConnectionsQuery>,
) -> Result<Json<Vec<ConnectionResponse>>, AppError> {
    let records = connections::list_connections(&state.db, &user, query.kind).await?;
    Ok(Json(records.into_iter().map(ConnectionResponse::from).collect()))
}

#[utoipa::path(
    post,
    path = "/connections",
    request_body = ConnectionInput,
    responses(
        (status = 200, description = "Connection registered", body = ConnectionResponse),
        (status = 400, description = "Invalid input")
    ),
    security(("bearer_auth" = [])),
    tag = "Connections"
)]
pub async fn create_connection(
    Extension(user): Extension<AuthUser>,
    State(state): State<AppState>,
    Json(payload): Json<ConnectionInput>,
) -> Result<Json<ConnectionResponse>, AppError> {
    let record = connections::create_connection(&state.db, &user, payload).await?;
    println!(
        "Connections | POST /connections | user={} | conn={} | res=200",
        user.username, record.id
    );
    Ok(Json(record.into()))
}

#[utoipa::path(
    put,
    path = "/connections/{id}",
    params(("id" = String, Path, description = "Connection id")),
    request_body = ConnectionInput,
    responses(
        (status = 200, description = "Connection updated", body = ConnectionResponse),
        (status = 404, description = "Connection not found")
    ),
    security(("bearer_auth" = [])),
    tag = "Connections"
)]
pub async fn update_connection(
    Extension(user): Extension<AuthUser>,
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(payload): Json<ConnectionInput>,
) -> Result<Json<ConnectionResponse>, AppError> {
    let id = super::parse_id(&id)?;
    let record = connections::update_connection(&state.db, id, &user, payload).await?;
    Ok(Json(record.into()))
}

#[utoipa::path(
    delete,
    path = "/connections/{id}",
    params(("id" = String, Path, description = "Connection id")),
    responses(
        (status = 200, description = "Connection removed"),
        (status = 404, description = "Connection not found")
    ),
    security(("bearer_auth" = [])),
    tag = "Connections"
)]
pub async fn delete_connection(
    Extension(user): Extension<AuthUser>,
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<serde_json::Value>, AppError> {
    let id = super::parse_id(&id)?;
    connections::delete_connection(&state.db, id, &user).await?;
    Ok(Json(serde_json::json!({ "deleted": id.to_string() })))
}

#[utoipa::path(
    post,
    path = "/connections/{id}/test",
    params(("id" = String, Path, description = "Connection id")),
    responses(
        (status = 200, description = "Probe ran; outcome stamped on the row", body = ConnectionResponse),
        (status = 404, description = "Connection not found")
    ),
    security(("bearer_auth" = [])),
    tag = "Connections"
)]
pub async fn test_connection(
    Extension(user): Extension<AuthUser>,
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<ConnectionResponse>, AppError> {
    let id = super::parse_id(&id)?;
    let record = connections::test_connection(&state.db, id, &user).await?;
    println!(
        "Connections | POST /connections/{}/test | user={} | status={} | res=200",
        id, user.username, record.last_test_status
    );
    Ok(Json(record.into()))
}
