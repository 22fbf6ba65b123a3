use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use sea_orm::{ActiveModelTrait, ColumnTrait, EntityTrait, QueryFilter, Set};
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::config::get_config;
use crate::db::Db;
use crate::entities::{file, vector_service, ogc_service};
use crate::entities::file::FileType;
use crate::entities::vector_service::VectorType;
use crate::error::AppError;
use crate::middleware::auth::AuthUser;
use crate::services::geoserver::GeoServerClient;
use crate::services::ingest;
use crate::services::jobs::JobRegistry;
use crate::services::martin::MartinController;
use crate::services::raster;
use crate::services::store::ObjectStore;

/// Work item for the raster conversion pool.
struct RasterJob {
    job_id: Uuid,
    file_id: i64,
    user_id: i64,
    input_path: String,
    min_zoom: u8,
    max_zoom: u8,
}

/// Coordinates upload → ingest/convert → service row → live tile source.
///
/// Publishes are serialised per file id: a second publish for a file that is
/// already in flight fails fast with `Busy`. Raster conversions run on a
/// bounded worker pool and report through the job registry.
pub struct Publisher {
    db: Db,
    store: ObjectStore,
    martin: Arc<MartinController>,
    geoserver: Arc<GeoServerClient>,
    pub jobs: Arc<JobRegistry>,
    inflight: std::sync::Mutex<HashSet<i64>>,
    raster_tx: mpsc::Sender<RasterJob>,
}

/// Releases the per-file publish slot on every exit path.
struct FileSlot {
    publisher: Arc<Publisher>,
    file_id: i64,
    armed: bool,
}

impl FileSlot {
    /// Keeps the slot held after this guard is gone. Whoever takes over the
    /// work must construct a fresh guard for the same file id.
    fn hand_off(mut self) {
        self.armed = false;
    }
}

impl Drop for FileSlot {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        if let Ok(mut inflight) = self.publisher.inflight.lock() {
            inflight.remove(&self.file_id);
        }
    }
}

impl Publisher {
    pub fn new(
        db: Db,
        store: ObjectStore,
        martin: Arc<MartinController>,
        geoserver: Arc<GeoServerClient>,
        jobs: Arc<JobRegistry>,
    ) -> Arc<Self> {
        let (raster_tx, raster_rx) = mpsc::channel::<RasterJob>(64);

        let publisher = Arc::new(Self {
            db,
            store,
            martin,
            geoserver,
            jobs,
            inflight: std::sync::Mutex::new(HashSet::new()),
            raster_tx,
        });

        publisher.clone().spawn_raster_workers(raster_rx);
        publisher
    }

    fn spawn_raster_workers(self: Arc<Self>, rx: mpsc::Receiver<RasterJob>) {
        let workers = get_config().raster_workers.max(1);
        let rx = Arc::new(tokio::sync::Mutex::new(rx));
        for n in 0..workers {
            let publisher = self.clone();
            let rx = rx.clone();
            tokio::spawn(async move {
                println!("Publish | raster worker {} started", n);
                loop {
                    let job = rx.lock().await.recv().await;
                    let Some(job) = job else { break };
                    publisher.run_raster_job(job).await;
                }
            });
        }
    }

    fn acquire_slot(self: &Arc<Self>, file_id: i64) -> Result<FileSlot, AppError> {
        let mut inflight = self
            .inflight
            .lock()
            .map_err(|_| AppError::InternalServerError("Publish lock poisoned".to_string()))?;
        if !inflight.insert(file_id) {
            return Err(AppError::Busy(format!(
                "A publish for file {} is already in progress",
                file_id
            )));
        }
        Ok(FileSlot {
            publisher: self.clone(),
            file_id,
            armed: true,
        })
    }

    async fn load_active_file(&self, file_id: i64, user: &AuthUser) -> Result<file::Model, AppError> {
        let record = file::Entity::find_by_id(file_id)
            .one(&self.db.conn)
            .await?
            .filter(|f| f.status == "active")
            .ok_or_else(|| AppError::NotFound(format!("File {} not found", file_id)))?;

        if record.user_id != user.id && user.role != crate::entities::user::Role::Admin {
            return Err(AppError::NotFound(format!("File {} not found", file_id)));
        }
        Ok(record)
    }

    async fn active_service(
        &self,
        file_id: i64,
        vector_type: &VectorType,
    ) -> Result<Option<vector_service::Model>, AppError> {
        vector_service::Entity::find()
            .filter(vector_service::Column::FileId.eq(file_id))
            .filter(vector_service::Column::VectorType.eq(vector_type.clone()))
            .filter(vector_service::Column::Status.ne("deleted"))
            .one(&self.db.conn)
            .await
            .map_err(AppError::from)
    }

    fn vector_type_for(file: &file::Model) -> Result<VectorType, AppError> {
        match file.subtype.as_str() {
            "geojson" => Ok(VectorType::Geojson),
            "shp" => Ok(VectorType::Shp),
            "dxf" => Ok(VectorType::Dxf),
            other => Err(AppError::UnsupportedFileType(format!(
                "File subtype '{}' cannot be published as a vector service",
                other
            ))),
        }
    }

    /// Synchronous vector publish: RECEIVED is behind us (the file row
    /// exists), so this walks STORED → INGESTED → REGISTERED → LIVE.
    pub async fn publish_vector(
        self: &Arc<Self>,
        file_id: i64,
        user: &AuthUser,
    ) -> Result<vector_service::Model, AppError> {
        let _slot = self.acquire_slot(file_id)?;
        let file = self.load_active_file(file_id, user).await?;

        if file.file_type == FileType::Mbtiles {
            return self.publish_mbtiles(&file, user).await;
        }

        let vector_type = Self::vector_type_for(&file)?;
        if self.active_service(file_id, &vector_type).await?.is_some() {
            return Err(AppError::AlreadyPublished(format!(
                "File {} already has an active {:?} service",
                file_id, vector_type
            )));
        }

        // STORED -> INGESTED. Ingest cleans up its own table on failure.
        let summary = ingest::ingest_file(&self.db, &file).await?;

        // INGESTED -> REGISTERED
        let source_id = MartinController::table_source_id(&summary.table_name);
        let service = match self
            .insert_service_row(&file, user, &vector_type, Some(summary.table_name.clone()), None, &source_id)
            .await
        {
            Ok(service) => service,
            Err(AppError::Conflict(_)) => {
                // Lost a race with an identical publish; the existing service
                // may own an older table, ours is ours to clean.
                let _ = ingest::drop_spatial_table(&self.db, &summary.table_name).await;
                return Err(AppError::AlreadyPublished(format!(
                    "File {} already has an active {:?} service",
                    file_id, vector_type
                )));
            }
            Err(e) => {
                let _ = ingest::drop_spatial_table(&self.db, &summary.table_name).await;
                return Err(e);
            }
        };

        // REGISTERED -> LIVE
        self.go_live(service).await
    }

    /// Direct publish of an uploaded .mbtiles artefact.
    async fn publish_mbtiles(
        self: &Arc<Self>,
        file: &file::Model,
        user: &AuthUser,
    ) -> Result<vector_service::Model, AppError> {
        let vector_type = probe_mbtiles_kind(&file.file_path).await?;
        if self.active_service(file.id, &vector_type).await?.is_some() {
            return Err(AppError::AlreadyPublished(format!(
                "File {} already has an active {:?} service",
                file.id, vector_type
            )));
        }

        let basename = self.store.adopt_mbtiles(file.id, &file.file_path).await?;
        let service = match self
            .insert_service_row(file, user, &vector_type, None, Some(basename.clone()), &basename)
            .await
        {
            Ok(service) => service,
            Err(e) => {
                let _ = tokio::fs::remove_file(self.store.mbtiles_path(&basename)).await;
                return Err(match e {
                    AppError::Conflict(_) => AppError::AlreadyPublished(format!(
                        "File {} already has an active {:?} service",
                        file.id, vector_type
                    )),
                    other => other,
                });
            }
        };

        self.go_live(service).await
    }

    /// Queues a raster pyramid build and returns its job id immediately.
    pub async fn publish_raster(
        self: &Arc<Self>,
        file_id: i64,
        min_zoom: u8,
        max_zoom: u8,
        user: &AuthUser,
    ) -> Result<Uuid, AppError> {
        raster::validate_zoom_range(min_zoom, max_zoom)?;

        // Fail fast before queueing; the slot stays held until the worker
        // finishes with the file.
        let slot = self.acquire_slot(file_id)?;
        let file = self.load_active_file(file_id, user).await?;
        if file.file_type != FileType::Raster {
            return Err(AppError::UnsupportedFileType(format!(
                "File {} is not a raster upload",
                file_id
            )));
        }
        if self
            .active_service(file_id, &VectorType::RasterTiffPyramid)
            .await?
            .is_some()
        {
            return Err(AppError::AlreadyPublished(format!(
                "File {} already has an active raster pyramid service",
                file_id
            )));
        }

        let job_id = self.jobs.create().await;
        let job = RasterJob {
            job_id,
            file_id,
            user_id: user.id,
            input_path: file.file_path.clone(),
            min_zoom,
            max_zoom,
        };

        self.raster_tx.send(job).await.map_err(|_| {
            AppError::InternalServerError("Raster worker pool is gone".to_string())
        })?;

        // The worker owns the slot now.
        slot.hand_off();
        Ok(job_id)
    }

    async fn run_raster_job(self: &Arc<Self>, job: RasterJob) {
        let _slot = FileSlot {
            publisher: self.clone(),
            file_id: job.file_id,
            armed: true,
        };

        let Some(cancel) = self.jobs.cancel_flag(job.job_id).await else {
            return; // record GC'd before the worker got to it
        };

        let jobs = self.jobs.clone();
        let job_id = job.job_id;
        let on_progress = move |percent: u8, step: &str| {
            let jobs = jobs.clone();
            let step = step.to_string();
            tokio::spawn(async move {
                jobs.update_progress(job_id, percent, &step).await;
            });
        };

        let deadline = Duration::from_secs(get_config().publish_deadline_secs);
        let outcome = tokio::time::timeout(
            deadline,
            raster::convert(
                job.file_id,
                &job.input_path,
                job.min_zoom,
                job.max_zoom,
                &self.store,
                &on_progress,
                &cancel,
            ),
        )
        .await
        .unwrap_or_else(|_| {
            Err(AppError::UpstreamFailure(
                "Raster conversion exceeded the publish deadline".to_string(),
            ))
        });

        let output = match outcome {
            Ok(output) => output,
            Err(e) => {
                eprintln!("Publish | raster job {} failed: {}", job.job_id, e);
                self.jobs.fail(job.job_id, e.code(), e.to_string()).await;
                return;
            }
        };

        // REGISTERED: record the service row, then bring Martin up to date.
        let user = AuthUser {
            id: job.user_id,
            username: String::new(),
            role: crate::entities::user::Role::User,
        };
        let file = match file::Entity::find_by_id(job.file_id).one(&self.db.conn).await {
            Ok(Some(f)) => f,
            _ => {
                self.jobs
                    .fail(job.job_id, "not_found", "File row vanished".to_string())
                    .await;
                return;
            }
        };

        let registered = self
            .insert_service_row(
                &file,
                &user,
                &VectorType::RasterTiffPyramid,
                None,
                Some(output.basename.clone()),
                &output.basename,
            )
            .await;

        let service = match registered {
            Ok(service) => service,
            Err(e) => {
                let _ = tokio::fs::remove_file(self.store.mbtiles_path(&output.basename)).await;
                self.jobs.fail(job.job_id, e.code(), e.to_string()).await;
                return;
            }
        };

        let service = match self.go_live(service).await {
            Ok(service) => service,
            Err(e) => {
                self.jobs.fail(job.job_id, e.code(), e.to_string()).await;
                return;
            }
        };

        self.jobs
            .complete(
                job.job_id,
                serde_json::json!({
                    "service_id": service.id.to_string(),
                    "mbtiles_filename": format!("{}.mbtiles", output.basename),
                    "min_zoom": output.min_zoom,
                    "max_zoom": output.max_zoom,
                    "bounds": output.bounds,
                    "tile_count": output.tile_count,
                    "tile_url": service.mvt_url,
                    "tilejson_url": service.tilejson_url,
                    "status": service.status,
                }),
            )
            .await;
    }

    async fn insert_service_row(
        &self,
        file: &file::Model,
        user: &AuthUser,
        vector_type: &VectorType,
        table_name: Option<String>,
        mbtiles_name: Option<String>,
        source_id: &str,
    ) -> Result<vector_service::Model, AppError> {
        // A user-registered default tile connection overrides the local
        // Martin endpoint in published URLs.
        let base = crate::services::connections::default_connection(
            &self.db,
            user.id,
            crate::entities::service_connection::ConnectionKind::Tile,
        )
        .await?
        .map(|c| c.url);

        let (service_url, mvt_url) = match base {
            Some(base) => (
                format!("{}/{}", base, source_id),
                format!("{}/{}/{{z}}/{{x}}/{{y}}", base, source_id),
            ),
            None => (
                self.martin.tilejson_url(source_id),
                self.martin.tile_url(source_id),
            ),
        };
        let now = chrono::Utc::now().naive_utc();

        let id = self
            .db
            .insert_with_generated_id(|id| vector_service::ActiveModel {
                id: Set(id),
                file_id: Set(file.id),
                vector_type: Set(vector_type.clone()),
                table_name: Set(table_name),
                mbtiles_name: Set(mbtiles_name),
                service_url: Set(service_url.clone()),
                mvt_url: Set(mvt_url),
                tilejson_url: Set(service_url),
                style: Set(None),
                status: Set("active".to_string()),
                user_id: Set(user.id),
                created_at: Set(now),
                updated_at: Set(now),
            })
            .await?;

        vector_service::Entity::find_by_id(id)
            .one(&self.db.conn)
            .await?
            .ok_or_else(|| AppError::InternalServerError("Service row vanished".to_string()))
    }

    /// REGISTERED -> LIVE. A failed probe downgrades the row to `pending`
    /// instead of failing the publish; the reconciler retries later.
    async fn go_live(&self, service: vector_service::Model) -> Result<vector_service::Model, AppError> {
        match self.martin.refresh_tables(&self.db, &self.store).await {
            Ok(_) => Ok(service),
            Err(AppError::TileServerUnready(msg)) | Err(AppError::UpstreamFailure(msg)) => {
                eprintln!(
                    "Publish | service {} pending, tile server unready: {}",
                    service.id, msg
                );
                let mut active: vector_service::ActiveModel = service.into();
                active.status = Set("pending".to_string());
                active.updated_at = Set(chrono::Utc::now().naive_utc());
                active.update(&self.db.conn).await.map_err(AppError::from)
            }
            Err(e) => Err(e),
        }
    }

    /// Cascade delete: the service row goes first (FK removes its scene
    /// layers), then the spatial table or MBTiles artefact, then Martin is
    /// refreshed. Idempotent: a missing service is success.
    pub async fn delete_service(self: &Arc<Self>, service_id: i64) -> Result<(), AppError> {
        let Some(service) = vector_service::Entity::find_by_id(service_id)
            .one(&self.db.conn)
            .await?
        else {
            return Ok(());
        };

        vector_service::Entity::delete_by_id(service_id)
            .exec(&self.db.conn)
            .await?;

        if let Some(table_name) = &service.table_name {
            // An OGC layer published from the same ingest serves this table
            // too; it keeps the table alive until it is deleted itself.
            match table_has_ogc_references(&self.db, table_name).await {
                Ok(true) => {
                    println!(
                        "Publish | keeping table {}: an OGC service still references it",
                        table_name
                    );
                }
                Ok(false) => {
                    if let Err(e) = ingest::drop_spatial_table(&self.db, table_name).await {
                        eprintln!("Publish | dropping {} failed: {}", table_name, e);
                    }
                }
                Err(e) => {
                    eprintln!(
                        "Publish | reference check for {} failed, table kept: {}",
                        table_name, e
                    );
                }
            }
        }
        if let Some(basename) = &service.mbtiles_name {
            let _ = tokio::fs::remove_file(self.store.mbtiles_path(basename)).await;
        }

        if let Err(e) = self.martin.refresh_tables(&self.db, &self.store).await {
            // The row is gone; a stale source in Martin is a cosmetic problem
            // the next refresh fixes.
            eprintln!("Publish | refresh after delete failed: {}", e);
        }

        println!("Publish | service {} deleted", service_id);
        Ok(())
    }

    /// Registers an ingested spatial table with the OGC server.
    pub async fn publish_ogc(
        self: &Arc<Self>,
        file_id: i64,
        user: &AuthUser,
    ) -> Result<ogc_service::Model, AppError> {
        let _slot = self.acquire_slot(file_id)?;
        let file = self.load_active_file(file_id, user).await?;

        let existing = ogc_service::Entity::find()
            .filter(ogc_service::Column::FileId.eq(file_id))
            .filter(ogc_service::Column::Status.eq("active"))
            .one(&self.db.conn)
            .await?;
        if existing.is_some() {
            return Err(AppError::AlreadyPublished(format!(
                "File {} already has an active OGC service",
                file_id
            )));
        }

        // The OGC layer serves an existing spatial table; require a prior
        // vector publish rather than ingesting twice.
        let vector_type = Self::vector_type_for(&file)?;
        let table_name = self
            .active_service(file_id, &vector_type)
            .await?
            .and_then(|s| s.table_name)
            .ok_or_else(|| {
                AppError::InvalidInput(format!(
                    "File {} has no ingested spatial table; publish it as a vector service first",
                    file_id
                ))
            })?;

        let config = get_config();
        let workspace = config.geoserver_workspace.clone();
        let datastore = format!("{}_store", workspace);

        self.geoserver.ensure_workspace(&workspace).await?;
        self.geoserver.ensure_datastore(&workspace, &datastore).await?;
        self.geoserver
            .publish_layer(&workspace, &datastore, &table_name)
            .await?;

        let now = chrono::Utc::now().naive_utc();
        let id = self
            .db
            .insert_with_generated_id(|id| ogc_service::ActiveModel {
                id: Set(id),
                file_id: Set(file_id),
                spatial_table: Set(table_name.clone()),
                workspace: Set(workspace.clone()),
                layer_name: Set(table_name.clone()),
                wms_url: Set(GeoServerClient::wms_url(&workspace)),
                wfs_url: Set(GeoServerClient::wfs_url(&workspace)),
                status: Set("active".to_string()),
                user_id: Set(user.id),
                created_at: Set(now),
            })
            .await?;

        ogc_service::Entity::find_by_id(id)
            .one(&self.db.conn)
            .await?
            .ok_or_else(|| AppError::InternalServerError("Service row vanished".to_string()))
    }

    pub async fn delete_ogc_service(self: &Arc<Self>, service_id: i64) -> Result<(), AppError> {
        let Some(service) = ogc_service::Entity::find_by_id(service_id)
            .one(&self.db.conn)
            .await?
        else {
            return Ok(());
        };

        let datastore = format!("{}_store", service.workspace);
        self.geoserver
            .delete_layer(&service.workspace, &datastore, &service.layer_name)
            .await?;

        ogc_service::Entity::delete_by_id(service_id)
            .exec(&self.db.conn)
            .await?;

        println!("Publish | ogc service {} deleted", service_id);
        Ok(())
    }

    /// Background reconciler: rows stuck in `pending` go active once the
    /// tile server answers its probe again.
    pub async fn run_reconciler(self: Arc<Self>) {
        let mut interval = tokio::time::interval(Duration::from_secs(30));
        loop {
            interval.tick().await;

            let pending = match vector_service::Entity::find()
                .filter(vector_service::Column::Status.eq("pending"))
                .all(&self.db.conn)
                .await
            {
                Ok(rows) => rows,
                Err(e) => {
                    eprintln!("Reconciler | query failed: {}", e);
                    continue;
                }
            };
            if pending.is_empty() {
                continue;
            }

            match self.martin.refresh_tables(&self.db, &self.store).await {
                Ok(_) => {
                    let count = pending.len();
                    for service in pending {
                        let mut active: vector_service::ActiveModel = service.into();
                        active.status = Set("active".to_string());
                        active.updated_at = Set(chrono::Utc::now().naive_utc());
                        if let Err(e) = active.update(&self.db.conn).await {
                            eprintln!("Reconciler | update failed: {}", e);
                        }
                    }
                    println!("Reconciler | {} pending services now live", count);
                }
                Err(e) => {
                    eprintln!("Reconciler | tile server still unready: {}", e);
                }
            }
        }
    }
}

/// True while any live OGC service still serves out of `table_name`. The
/// table is shared between a vector service and its OGC siblings, so the
/// last reference standing owns the drop.
async fn table_has_ogc_references(db: &Db, table_name: &str) -> Result<bool, AppError> {
    let found = ogc_service::Entity::find()
        .filter(ogc_service::Column::SpatialTable.eq(table_name))
        .filter(ogc_service::Column::Status.ne("deleted"))
        .one(&db.conn)
        .await?;
    Ok(found.is_some())
}

/// Reads the MBTiles metadata table to classify the artefact. `pbf` tiles
/// are vector, anything else raster.
async fn probe_mbtiles_kind(path: &str) -> Result<VectorType, AppError> {
    let path = path.to_string();
    tokio::task::spawn_blocking(move || -> Result<VectorType, AppError> {
        let conn = rusqlite::Connection::open_with_flags(
            &path,
            rusqlite::OpenFlags::SQLITE_OPEN_READ_ONLY,
        )
        .map_err(|e| AppError::InvalidInput(format!("Not a readable MBTiles file: {}", e)))?;

        let format: Option<String> = conn
            .query_row(
                "SELECT value FROM metadata WHERE name = 'format'",
                [],
                |row| row.get(0),
            )
            .ok();

        Ok(match format.as_deref() {
            Some("pbf") | Some("mvt") => VectorType::MbtilesVector,
            _ => VectorType::MbtilesRaster,
        })
    })
    .await
    .map_err(|e| AppError::InternalServerError(format!("MBTiles probe task failed: {}", e)))?
}

#[cfg(test)]
mod tests {
    use super::*;
    use sea_orm::{DatabaseBackend, MockDatabase};

    fn ogc_row(spatial_table: &str) -> ogc_service::Model {
        ogc_service::Model {
            id: 1,
            file_id: 2,
            spatial_table: spatial_table.to_string(),
            workspace: "geo".to_string(),
            layer_name: spatial_table.to_string(),
            wms_url: "http://localhost:8080/geoserver/geo/wms".to_string(),
            wfs_url: "http://localhost:8080/geoserver/geo/wfs".to_string(),
            status: "active".to_string(),
            user_id: 3,
            created_at: chrono::Utc::now().naive_utc(),
        }
    }

    #[tokio::test]
    async fn table_with_live_ogc_layer_is_still_referenced() {
        let conn = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([vec![ogc_row("vector_ab12cd34")]])
            .into_connection();
        let db = Db::with_connection(conn);

        assert!(table_has_ogc_references(&db, "vector_ab12cd34").await.unwrap());
    }

    #[tokio::test]
    async fn orphan_table_has_no_references() {
        let conn = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([Vec::<ogc_service::Model>::new()])
            .into_connection();
        let db = Db::with_connection(conn);

        assert!(!table_has_ogc_references(&db, "vector_ab12cd34").await.unwrap());
    }

    fn write_mbtiles(path: &std::path::Path, format: Option<&str>) {
        let conn = rusqlite::Connection::open(path).unwrap();
        conn.execute_batch(
            "CREATE TABLE metadata (name TEXT, value TEXT);
             CREATE TABLE tiles (zoom_level INTEGER, tile_column INTEGER, tile_row INTEGER, tile_data BLOB);",
        )
        .unwrap();
        if let Some(format) = format {
            conn.execute(
                "INSERT INTO metadata (name, value) VALUES ('format', ?1)",
                [format],
            )
            .unwrap();
        }
    }

    #[tokio::test]
    async fn mbtiles_probe_classifies_pbf_as_vector() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.mbtiles");
        write_mbtiles(&path, Some("pbf"));
        let kind = probe_mbtiles_kind(path.to_str().unwrap()).await.unwrap();
        assert_eq!(kind, VectorType::MbtilesVector);
    }

    #[tokio::test]
    async fn mbtiles_probe_defaults_to_raster() {
        let dir = tempfile::tempdir().unwrap();

        let png = dir.path().join("b.mbtiles");
        write_mbtiles(&png, Some("png"));
        assert_eq!(
            probe_mbtiles_kind(png.to_str().unwrap()).await.unwrap(),
            VectorType::MbtilesRaster
        );

        // Missing format metadata also falls back to raster.
        let bare = dir.path().join("c.mbtiles");
        write_mbtiles(&bare, None);
        assert_eq!(
            probe_mbtiles_kind(bare.to_str().unwrap()).await.unwrap(),
            VectorType::MbtilesRaster
        );
    }

    #[tokio::test]
    async fn mbtiles_probe_rejects_garbage() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("junk.mbtiles");
        tokio::fs::write(&path, b"not a sqlite file at all").await.unwrap();
        let err = probe_mbtiles_kind(path.to_str().unwrap()).await;
        // Opening may succeed lazily; classification must not panic either way.
        if let Ok(kind) = err {
            assert_eq!(kind, VectorType::MbtilesRaster);
        }
    }
}
