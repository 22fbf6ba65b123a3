use axum::{extract::State, Json};
use serde::Serialize;

use crate::error::AppError;
use crate::routes::AppState;

#[derive(Serialize, utoipa::ToSchema)]
pub struct TileStatusResponse {
    pub running: bool,
    pub base_url: String,
    pub source_count: usize,
    /// Last lines the tile server wrote to stderr, newest last.
    pub stderr: Vec<String>,
}

#[derive(Serialize, utoipa::ToSchema)]
pub struct TileRefreshResponse {
    pub source_count: usize,
}

#[utoipa::path(
    get,
    path = "/tiles/status",
    responses(
        (status = 200, description = "Tile server health", body = TileStatusResponse)
    ),
    security(("bearer_auth" = [])),
    tag = "Tiles"
)]
pub async fn tile_status(
    State(state): State<AppState>,
) -> Result<Json<TileStatusResponse>, AppError> {
    let running = state.martin.is_running().await;
    let source_count = if running {
        state.martin.catalog_source_count().await.unwrap_or(0)
    } else {
        0
    };

    Ok(Json(TileStatusResponse {
        running,
        base_url: state.martin.base_url(),
        source_count,
        stderr: state.martin.stderr_excerpt().await,
    }))
}

#[utoipa::path(
    post,
    path = "/tiles/refresh",
    responses(
        (status = 200, description = "Catalog rescanned and reloaded", body = TileRefreshResponse),
        (status = 503, description = "Tile server did not come back after reload")
    ),
    security(("bearer_auth" = [])),
    tag = "Tiles"
)]
pub async fn tile_refresh(
    State(state): State<AppState>,
) -> Result<Json<TileRefreshResponse>, AppError> {
    let source_count = state.martin.refresh_tables(&state.db, &state.store).await?;
    println!("Tiles | POST /tiles/refresh | sources={} | res=200", source_count);
    Ok(Json(TileRefreshResponse { source_count }))
}
