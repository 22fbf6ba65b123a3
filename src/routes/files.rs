use axum::{
    extract::{Multipart, Path, Query, State},
    Extension, Json,
};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, EntityTrait, PaginatorTrait, QueryFilter, QueryOrder, Set,
};
use serde::{Deserialize, Serialize};

use crate::config::get_config;
use crate::entities::file::{self, FileType};
use crate::entities::user::Role;
use crate::error::AppError;
use crate::middleware::auth::AuthUser;
use crate::pagination::{PaginatedResponse, Pagination};
use crate::routes::AppState;

#[derive(Serialize, utoipa::ToSchema)]
pub struct FileResponse {
    pub id: String,
    pub file_name: String,
    pub file_size: i64,
    pub file_type: FileType,
    pub subtype: String,
    pub coordinate_system: Option<String>,
    pub status: String,
    pub upload_date: String,
}

impl From<file::Model> for FileResponse {
    fn from(model: file::Model) -> Self {
        Self {
            id: model.id.to_string(),
            file_name: model.file_name,
            file_size: model.file_size,
            file_type: model.file_type,
            subtype: model.subtype,
            coordinate_system: model.coordinate_system,
            status: model.status,
            upload_date: model.upload_date.and_utc().to_rfc3339(),
        }
    }
}

#[derive(Deserialize, utoipa::IntoParams)]
pub struct ListFilesQuery {
    pub page: Option<u64>,
    pub limit: Option<u64>,
    /// Filter by file type (vector, raster, archive, mbtiles).
    pub file_type: Option<String>,
}

/// Maps an upload's extension to its storage classification.
fn classify(file_name: &str) -> Result<(FileType, String, String), AppError> {
    let extension = std::path::Path::new(file_name)
        .extension()
        .and_then(std::ffi::OsStr::to_str)
        .map(|s| s.to_ascii_lowercase())
        .unwrap_or_default();

    let (file_type, subtype) = match extension.as_str() {
        "geojson" | "json" => (FileType::Vector, "geojson"),
        "zip" => (FileType::Archive, "shp"),
        "dxf" => (FileType::Vector, "dxf"),
        "tif" | "tiff" => (FileType::Raster, "tif"),
        "mbtiles" => (FileType::Mbtiles, "mbtiles"),
        _ => {
            return Err(AppError::UnsupportedFileType(format!(
                "Unsupported file extension '.{}'",
                extension
            )))
        }
    };
    Ok((file_type, subtype.to_string(), extension))
}

fn validate_crs(raw: &str) -> Result<String, AppError> {
    let raw = raw.trim();
    let code = raw.strip_prefix("EPSG:").unwrap_or(raw);
    let code: u32 = code
        .parse()
        .map_err(|_| AppError::InvalidInput(format!("Invalid coordinate system '{}'", raw)))?;
    Ok(format!("EPSG:{}", code))
}

#[utoipa::path(
    post,
    path = "/files",
    request_body(content = Vec<u8>, content_type = "multipart/form-data"),
    responses(
        (status = 200, description = "File stored", body = FileResponse),
        (status = 400, description = "Missing or empty file part"),
        (status = 413, description = "Upload exceeds the size limit"),
        (status = 415, description = "Unsupported file type")
    ),
    security(("bearer_auth" = [])),
    tag = "Files"
)]
pub async fn upload_file(
    Extension(user): Extension<AuthUser>,
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<FileResponse>, AppError> {
    let mut file_name: Option<String> = None;
    let mut data: Option<Vec<u8>> = None;
    let mut coordinate_system: Option<String> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::InvalidInput(format!("Malformed multipart body: {}", e)))?
    {
        match field.name() {
            Some("file") => {
                file_name = field.file_name().map(|s| s.to_string());
                let bytes = field
                    .bytes()
                    .await
                    .map_err(|_| AppError::PayloadTooLarge)?;
                data = Some(bytes.to_vec());
            }
            Some("coordinate_system") => {
                let raw = field
                    .text()
                    .await
                    .map_err(|e| AppError::InvalidInput(format!("Bad form field: {}", e)))?;
                if !raw.trim().is_empty() {
                    coordinate_system = Some(validate_crs(&raw)?);
                }
            }
            _ => {}
        }
    }

    let file_name =
        file_name.ok_or_else(|| AppError::InvalidInput("Missing 'file' part".to_string()))?;
    let data = data.ok_or_else(|| AppError::InvalidInput("Missing 'file' part".to_string()))?;
    if data.is_empty() {
        return Err(AppError::EmptyInput("Uploaded file is empty".to_string()));
    }
    if data.len() > get_config().max_upload_bytes {
        return Err(AppError::PayloadTooLarge);
    }

    let (file_type, subtype, extension) = classify(&file_name)?;

    let file_id = state.db.next_id();
    let stored = state.store.save(file_id, &file_type, &extension, &data).await?;

    let now = chrono::Utc::now().naive_utc();
    let record = file::ActiveModel {
        id: Set(file_id),
        user_id: Set(user.id),
        file_name: Set(file_name.clone()),
        file_path: Set(stored.path.clone()),
        file_size: Set(stored.size),
        file_type: Set(file_type),
        subtype: Set(subtype),
        coordinate_system: Set(coordinate_system),
        status: Set("active".to_string()),
        upload_date: Set(now),
    };

    let record = match record.insert(&state.db.conn).await {
        Ok(record) => record,
        Err(e) => {
            // Keep storage and DB in step.
            let _ = state.store.delete(&stored.path).await;
            return Err(AppError::from(e));
        }
    };

    println!(
        "Files | POST /files | user={} | file={} | size={} | res=200",
        user.username, file_name, stored.size
    );
    Ok(Json(record.into()))
}

#[utoipa::path(
    get,
    path = "/files",
    params(ListFilesQuery),
    responses(
        (status = 200, description = "Paginated file list", body = PaginatedResponse<FileResponse>)
    ),
    security(("bearer_auth" = [])),
    tag = "Files"
)]
pub async fn list_files(
    Extension(user): Extension<AuthUser>,
    State(state): State<AppState>,
    Query(query): Query<ListFilesQuery>,
) -> Result<Json<PaginatedResponse<FileResponse>>, AppError> {
    let pagination = Pagination {
        page: query.page,
        limit: query.limit,
    };
    let page = pagination.page();
    let limit = pagination.limit();

    let mut finder = file::Entity::find()
        .filter(file::Column::Status.eq("active"))
        .order_by_desc(file::Column::UploadDate);

    if user.role != Role::Admin {
        finder = finder.filter(file::Column::UserId.eq(user.id));
    }
    if let Some(kind) = &query.file_type {
        finder = finder.filter(file::Column::FileType.eq(kind.as_str()));
    }

    let paginator = finder.paginate(&state.db.conn, limit);
    let total_items = paginator.num_items().await?;
    let models = paginator.fetch_page(page - 1).await?;

    let data = models.into_iter().map(FileResponse::from).collect();
    Ok(Json(PaginatedResponse::new(data, total_items, page, limit)))
}

#[utoipa::path(
    get,
    path = "/files/{id}",
    params(("id" = String, Path, description = "File id")),
    responses(
        (status = 200, description = "File detail", body = FileResponse),
        (status = 404, description = "File not found")
    ),
    security(("bearer_auth" = [])),
    tag = "Files"
)]
pub async fn get_file(
    Extension(user): Extension<AuthUser>,
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<FileResponse>, AppError> {
    let id = super::parse_id(&id)?;
    let record = file::Entity::find_by_id(id)
        .one(&state.db.conn)
        .await?
        .filter(|f| f.status == "active")
        .filter(|f| f.user_id == user.id || user.role == Role::Admin)
        .ok_or_else(|| AppError::NotFound(format!("File {} not found", id)))?;
    Ok(Json(record.into()))
}

#[utoipa::path(
    delete,
    path = "/files/{id}",
    params(("id" = String, Path, description = "File id")),
    responses(
        (status = 200, description = "File soft-deleted"),
        (status = 404, description = "File not found"),
        (status = 409, description = "File still backs a published service")
    ),
    security(("bearer_auth" = [])),
    tag = "Files"
)]
pub async fn delete_file(
    Extension(user): Extension<AuthUser>,
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<serde_json::Value>, AppError> {
    let id = super::parse_id(&id)?;
    let record = file::Entity::find_by_id(id)
        .one(&state.db.conn)
        .await?
        .filter(|f| f.status == "active")
        .filter(|f| f.user_id == user.id || user.role == Role::Admin)
        .ok_or_else(|| AppError::NotFound(format!("File {} not found", id)))?;

    // A file backing a live service must be unpublished first.
    let in_use = crate::entities::vector_service::Entity::find()
        .filter(crate::entities::vector_service::Column::FileId.eq(id))
        .filter(crate::entities::vector_service::Column::Status.ne("deleted"))
        .count(&state.db.conn)
        .await?;
    if in_use > 0 {
        return Err(AppError::Conflict(format!(
            "File {} still backs {} published service(s)",
            id, in_use
        )));
    }

    let mut active: file::ActiveModel = record.into();
    active.status = Set("deleted".to_string());
    active.update(&state.db.conn).await?;

    println!("Files | DELETE /files/{} | user={} | res=200", id, user.username);
    Ok(Json(serde_json::json!({ "deleted": id.to_string() })))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classify_maps_known_extensions() {
        let (kind, subtype, ext) = classify("parcels.GeoJSON").unwrap();
        assert_eq!(kind, FileType::Vector);
        assert_eq!(subtype, "geojson");
        assert_eq!(ext, "geojson");

        let (kind, subtype, _) = classify("survey.zip").unwrap();
        assert_eq!(kind, FileType::Archive);
        assert_eq!(subtype, "shp");

        let (kind, _, _) = classify("dem.TIF").unwrap();
        assert_eq!(kind, FileType::Raster);

        let (kind, _, _) = classify("basemap.mbtiles").unwrap();
        assert_eq!(kind, FileType::Mbtiles);
    }

    #[test]
    fn classify_rejects_unknown_and_missing_extensions() {
        assert!(matches!(
            classify("notes.txt"),
            Err(AppError::UnsupportedFileType(_))
        ));
        assert!(matches!(
            classify("no_extension"),
            Err(AppError::UnsupportedFileType(_))
        ));
    }

    #[test]
    fn crs_accepts_bare_and_prefixed_codes() {
        assert_eq!(validate_crs("4326").unwrap(), "EPSG:4326");
        assert_eq!(validate_crs("EPSG:3857").unwrap(), "EPSG:3857");
        assert_eq!(validate_crs(" EPSG:2154 ").unwrap(), "EPSG:2154");
        assert!(validate_crs("WGS84").is_err());
    }
}
