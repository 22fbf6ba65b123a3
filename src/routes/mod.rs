mod home;
mod auth;
mod files;
pub mod publish;
mod jobs;
mod services;
mod tiles;
mod scenes;
mod connections;

use std::sync::Arc;

use axum::{
    extract::DefaultBodyLimit,
    middleware,
    routing::{delete, get, patch, post, put},
    Router,
};
use tower_http::cors::CorsLayer;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::config::get_config;
use crate::db::Db;
use crate::error::AppError;
use crate::middleware::auth::auth_middleware;
use crate::services::geoserver::GeoServerClient;
use crate::services::jobs::JobRegistry;
use crate::services::martin::MartinController;
use crate::services::publish::Publisher;
use crate::services::store::ObjectStore;

/// Shared handles every handler can reach. Cloning is cheap: everything
/// heavyweight sits behind an Arc or a pooled connection.
#[derive(Clone)]
pub struct AppState {
    pub db: Db,
    pub store: ObjectStore,
    pub martin: Arc<MartinController>,
    pub geoserver: Arc<GeoServerClient>,
    pub jobs: Arc<JobRegistry>,
    pub publisher: Arc<Publisher>,
}

/// Path ids travel as decimal strings; storage uses i64.
pub(crate) fn parse_id(raw: &str) -> Result<i64, AppError> {
    raw.parse::<i64>()
        .map_err(|_| AppError::InvalidInput(format!("'{}' is not a valid id", raw)))
}

#[derive(OpenApi)]
#[openapi(
    paths(
        home::root,
        auth::register,
        auth::login,
        auth::verify,
        files::upload_file,
        files::list_files,
        files::get_file,
        files::delete_file,
        publish::publish_vector,
        publish::publish_raster,
        publish::publish_ogc,
        jobs::get_job,
        jobs::cancel_job,
        services::list_services,
        services::get_service,
        services::delete_service,
        services::list_ogc_services,
        services::delete_ogc_service,
        tiles::tile_status,
        tiles::tile_refresh,
        scenes::list_scenes,
        scenes::create_scene,
        scenes::get_scene,
        scenes::update_scene,
        scenes::delete_scene,
        scenes::replace_layers,
        scenes::layer_crs,
        connections::list_connections,
        connections::create_connection,
        connections::update_connection,
        connections::delete_connection,
        connections::test_connection,
    ),
    components(
        schemas(
            home::RootResponse,
            auth::LoginRequest,
            auth::LoginResponse,
            auth::RegisterRequest,
            auth::VerifyResponse,
            auth::UserProfile,
            files::FileResponse,
            publish::ServiceResponse,
            publish::RasterPublishRequest,
            publish::RasterPublishResponse,
            publish::OgcServiceResponse,
            jobs::JobResponse,
            tiles::TileStatusResponse,
            tiles::TileRefreshResponse,
            scenes::CreateSceneRequest,
            scenes::UpdateSceneRequest,
            scenes::SceneSummary,
            scenes::ReplaceLayersRequest,
            scenes::LayerCrsResponse,
            connections::ConnectionResponse,
            crate::entities::user::Role,
            crate::entities::file::FileType,
            crate::entities::vector_service::VectorType,
            crate::entities::scene_layer::ServiceKind,
            crate::entities::service_connection::ConnectionKind,
            crate::services::jobs::JobState,
            crate::services::jobs::JobError,
            crate::services::scene::LayerSpec,
            crate::services::scene::LayerView,
            crate::services::scene::SceneView,
            crate::services::connections::ConnectionInput,
        )
    ),
    tags(
        (name = "General", description = "Service information"),
        (name = "Authentication", description = "Login, registration, and token verification"),
        (name = "Files", description = "Spatial file uploads"),
        (name = "Publishing", description = "Turn uploads into live tile and OGC services"),
        (name = "Jobs", description = "Progress of background conversions"),
        (name = "Services", description = "Published service management"),
        (name = "Tiles", description = "Tile server control"),
        (name = "Scenes", description = "Scenes and layer bindings"),
        (name = "Connections", description = "External service connections")
    ),
    info(
        title = "GeoLayerKit API",
        version = "0.1.0",
        description = "Web-GIS backend: spatial file ingestion, tile pyramid publishing, and scene composition",
    ),
    modifiers(&SecurityAddon)
)]
struct ApiDoc;

struct SecurityAddon;

impl utoipa::Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer_auth",
                utoipa::openapi::security::SecurityScheme::Http(
                    utoipa::openapi::security::Http::new(
                        utoipa::openapi::security::HttpAuthScheme::Bearer,
                    ),
                ),
            );
        }
    }
}

pub fn create_routes(state: AppState) -> Router {
    let swagger_router: Router = SwaggerUi::new("/swagger-ui")
        .url("/api-docs/openapi.json", ApiDoc::openapi())
        .into();

    let protected_routes = Router::new()
        .route("/auth/verify", post(auth::verify))
        .route("/files", post(files::upload_file))
        .route("/files", get(files::list_files))
        .route("/files/{id}", get(files::get_file))
        .route("/files/{id}", delete(files::delete_file))
        .route("/publish/vector/{file_id}", post(publish::publish_vector))
        .route("/publish/raster/{file_id}", post(publish::publish_raster))
        .route("/publish/ogc/{file_id}", post(publish::publish_ogc))
        .route("/jobs/{job_id}", get(jobs::get_job))
        .route("/jobs/{job_id}", delete(jobs::cancel_job))
        .route("/services", get(services::list_services))
        .route("/services/ogc", get(services::list_ogc_services))
        .route("/services/ogc/{id}", delete(services::delete_ogc_service))
        .route("/services/{id}", get(services::get_service))
        .route("/services/{id}", delete(services::delete_service))
        .route("/tiles/status", get(tiles::tile_status))
        .route("/tiles/refresh", post(tiles::tile_refresh))
        .route("/scenes", get(scenes::list_scenes))
        .route("/scenes", post(scenes::create_scene))
        .route("/scenes/{id}", get(scenes::get_scene))
        .route("/scenes/{id}", patch(scenes::update_scene))
        .route("/scenes/{id}", delete(scenes::delete_scene))
        .route("/scenes/{id}/layers", patch(scenes::replace_layers))
        .route("/crs/layer/{scene_layer_id}", get(scenes::layer_crs))
        .route("/connections", get(connections::list_connections))
        .route("/connections", post(connections::create_connection))
        .route("/connections/{id}", put(connections::update_connection))
        .route("/connections/{id}", delete(connections::delete_connection))
        .route("/connections/{id}/test", post(connections::test_connection))
        .layer(middleware::from_fn(auth_middleware));

    let app_routes = Router::new()
        .route("/", get(home::root))
        .route("/auth/register", post(auth::register))
        .route("/auth/login", post(auth::login))
        .merge(protected_routes)
        .layer(DefaultBodyLimit::max(get_config().max_upload_bytes as usize))
        .layer(CorsLayer::permissive())
        .with_state(state);

    Router::new().merge(swagger_router).merge(app_routes)
}
