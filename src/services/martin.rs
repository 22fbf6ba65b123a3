use std::collections::{BTreeMap, VecDeque};
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::Mutex;

use crate::config::get_config;
use crate::db::Db;
use crate::error::AppError;
use crate::services::store::ObjectStore;

const STDERR_TAIL_LINES: usize = 50;

/// Declarative config written for the Martin child process.
#[derive(Serialize)]
struct MartinConfig {
    listen_addresses: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    postgres: Option<PostgresConfig>,
    #[serde(skip_serializing_if = "Option::is_none")]
    mbtiles: Option<MbtilesConfig>,
}

#[derive(Serialize)]
struct PostgresConfig {
    connection_string: String,
    tables: BTreeMap<String, TableSource>,
}

#[derive(Serialize)]
struct TableSource {
    schema: String,
    table: String,
    srid: i32,
    geometry_column: String,
    geometry_type: String,
}

#[derive(Serialize)]
struct MbtilesConfig {
    sources: BTreeMap<String, String>,
}

struct MartinState {
    child: Option<Child>,
    stderr_tail: Arc<std::sync::Mutex<VecDeque<String>>>,
}

/// Controls the single Martin child process. All lifecycle operations are
/// serialised by one mutex; probes carry the configured short deadline.
pub struct MartinController {
    state: Mutex<MartinState>,
    http: reqwest::Client,
}

impl MartinController {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(MartinState {
                child: None,
                stderr_tail: Arc::new(std::sync::Mutex::new(VecDeque::new())),
            }),
            http: reqwest::Client::new(),
        }
    }

    pub fn base_url(&self) -> String {
        get_config().martin_base_url.clone()
    }

    /// Tile URL template for a source id.
    pub fn tile_url(&self, source_id: &str) -> String {
        format!("{}/{}/{{z}}/{{x}}/{{y}}", self.base_url(), source_id)
    }

    /// TileJSON manifest URL for a source id.
    pub fn tilejson_url(&self, source_id: &str) -> String {
        format!("{}/{}", self.base_url(), source_id)
    }

    pub fn table_source_id(table_name: &str) -> String {
        format!("public.{}", table_name)
    }

    /// Assembles and writes the config: every registered spatial table plus
    /// every MBTiles artefact in the store become sources.
    pub async fn write_config(&self, db: &Db, store: &ObjectStore) -> Result<usize, AppError> {
        let config = get_config();

        let mut tables = BTreeMap::new();
        let rows = db
            .query_all(
                "SELECT f_table_name, f_geometry_column, srid, type FROM geometry_columns \
                 WHERE f_table_schema = 'public' AND f_table_name LIKE 'vector_%'",
                vec![],
            )
            .await?;
        for row in rows {
            let table: String = row.try_get("", "f_table_name").map_err(AppError::DatabaseError)?;
            let geometry_column: String = row
                .try_get("", "f_geometry_column")
                .map_err(AppError::DatabaseError)?;
            let srid: i32 = row.try_get("", "srid").map_err(AppError::DatabaseError)?;
            let geometry_type: String =
                row.try_get("", "type").map_err(AppError::DatabaseError)?;

            tables.insert(
                Self::table_source_id(&table),
                TableSource {
                    schema: "public".to_string(),
                    table,
                    srid,
                    geometry_column,
                    geometry_type,
                },
            );
        }

        let mbtiles = scan_mbtiles_sources(store.mbtiles_root()).await?;

        let source_count = tables.len() + mbtiles.len();
        let doc = MartinConfig {
            listen_addresses: config.martin_listen.clone(),
            postgres: (!tables.is_empty()).then(|| PostgresConfig {
                connection_string: config.database_url.clone(),
                tables,
            }),
            mbtiles: (!mbtiles.is_empty()).then(|| MbtilesConfig { sources: mbtiles }),
        };

        let yaml = serde_yaml::to_string(&doc)
            .map_err(|e| AppError::InternalServerError(format!("Config serialise failed: {}", e)))?;
        tokio::fs::write(&config.martin_config_path, yaml).await?;

        println!(
            "Martin | config written | {} sources -> {}",
            source_count, config.martin_config_path
        );
        Ok(source_count)
    }

    /// Idempotent start: a running, responsive child is left alone.
    pub async fn start(&self) -> Result<(), AppError> {
        let mut state = self.state.lock().await;
        if self.child_alive(&mut state) && self.probe().await {
            return Ok(());
        }
        self.spawn_locked(&mut state).await
    }

    pub async fn stop(&self) -> Result<(), AppError> {
        let mut state = self.state.lock().await;
        if let Some(mut child) = state.child.take() {
            let _ = child.kill().await;
        }
        Ok(())
    }

    pub async fn restart(&self) -> Result<(), AppError> {
        let mut state = self.state.lock().await;
        if let Some(mut child) = state.child.take() {
            let _ = child.kill().await;
        }
        self.spawn_locked(&mut state).await
    }

    /// Liveness: configured port bound AND the catalog endpoint answering
    /// within the probe deadline.
    pub async fn is_running(&self) -> bool {
        self.port_bound().await && self.probe().await
    }

    /// Rescan + reload. Success requires config written, child reloaded (or
    /// restarted), and a post-reload probe.
    pub async fn refresh_tables(&self, db: &Db, store: &ObjectStore) -> Result<usize, AppError> {
        let source_count = self.write_config(db, store).await?;
        self.reload().await?;
        if !self.probe().await {
            return Err(AppError::TileServerUnready(
                "Tile server did not answer the catalog probe after reload".to_string(),
            ));
        }
        Ok(source_count)
    }

    /// Hot reload where the OS supports signalling; stop+start elsewhere.
    /// Reload trouble degrades to restart before giving up.
    pub async fn reload(&self) -> Result<(), AppError> {
        let mut state = self.state.lock().await;

        #[cfg(unix)]
        {
            if self.child_alive(&mut state) {
                if let Some(pid) = state.child.as_ref().and_then(|c| c.id()) {
                    let sent = Command::new("kill")
                        .arg("-HUP")
                        .arg(pid.to_string())
                        .status()
                        .await
                        .map(|s| s.success())
                        .unwrap_or(false);
                    if sent {
                        return Ok(());
                    }
                    eprintln!("Martin | SIGHUP failed, falling back to restart");
                }
            }
        }

        if let Some(mut child) = state.child.take() {
            let _ = child.kill().await;
        }
        self.spawn_locked(&mut state).await
    }

    pub async fn stderr_excerpt(&self) -> Vec<String> {
        let state = self.state.lock().await;
        let tail = state.stderr_tail.lock().map(|t| t.iter().cloned().collect());
        tail.unwrap_or_default()
    }

    fn child_alive(&self, state: &mut MartinState) -> bool {
        match state.child.as_mut() {
            Some(child) => match child.try_wait() {
                Ok(None) => true,
                _ => {
                    state.child = None;
                    false
                }
            },
            None => false,
        }
    }

    async fn spawn_locked(&self, state: &mut MartinState) -> Result<(), AppError> {
        let config = get_config();

        let mut child = Command::new(&config.martin_executable)
            .arg("--config")
            .arg(&config.martin_config_path)
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| {
                AppError::UpstreamFailure(format!("Failed to spawn tile server: {}", e))
            })?;

        // Keep the last lines of stderr for start-failure diagnostics.
        if let Some(stderr) = child.stderr.take() {
            let tail = state.stderr_tail.clone();
            tokio::spawn(async move {
                let mut lines = BufReader::new(stderr).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    if let Ok(mut tail) = tail.lock() {
                        if tail.len() >= STDERR_TAIL_LINES {
                            tail.pop_front();
                        }
                        tail.push_back(line);
                    }
                }
            });
        }

        state.child = Some(child);

        // Give the child a moment, then verify it actually serves.
        let deadline = Duration::from_secs(config.probe_deadline_secs);
        let started = tokio::time::timeout(deadline, async {
            loop {
                if self.probe().await {
                    return true;
                }
                tokio::time::sleep(Duration::from_millis(250)).await;
            }
        })
        .await
        .unwrap_or(false);

        if !started {
            let excerpt = {
                let tail = state.stderr_tail.lock().map(|t| t.iter().cloned().collect::<Vec<_>>());
                tail.unwrap_or_default().join(" | ")
            };
            return Err(AppError::UpstreamFailure(format!(
                "Tile server failed to come up: {}",
                excerpt
            )));
        }

        println!("Martin | started on {}", config.martin_listen);
        Ok(())
    }

    async fn port_bound(&self) -> bool {
        let config = get_config();
        let port = config
            .martin_listen
            .rsplit(':')
            .next()
            .unwrap_or("3010")
            .to_string();
        let addr = format!("localhost:{}", port);
        tokio::time::timeout(
            Duration::from_secs(1),
            tokio::net::TcpStream::connect(addr),
        )
        .await
        .map(|r| r.is_ok())
        .unwrap_or(false)
    }

    /// Number of sources the running server actually advertises.
    pub async fn catalog_source_count(&self) -> Option<usize> {
        let config = get_config();
        let url = format!("{}/catalog", config.martin_base_url);
        let deadline = Duration::from_secs(config.probe_deadline_secs);

        let resp = self.http.get(&url).timeout(deadline).send().await.ok()?;
        if !resp.status().is_success() {
            return None;
        }
        let catalog: serde_json::Value = resp.json().await.ok()?;
        let tiles = catalog.get("tiles")?.as_object()?;
        Some(tiles.len())
    }

    /// HTTP probe of the catalog endpoint; never blocks past the deadline.
    pub async fn probe(&self) -> bool {
        let config = get_config();
        let url = format!("{}/catalog", config.martin_base_url);
        let deadline = Duration::from_secs(config.probe_deadline_secs);

        match self.http.get(&url).timeout(deadline).send().await {
            Ok(resp) => resp.status().is_success(),
            Err(_) => false,
        }
    }
}

/// Lists completed MBTiles artefacts under `root` as source-id -> path. Only
/// `.mbtiles` files count; the raster pipeline packs into a `.part` name and
/// renames on completion, so in-flight conversions are never listed.
async fn scan_mbtiles_sources(
    root: &std::path::Path,
) -> Result<BTreeMap<String, String>, AppError> {
    let mut sources = BTreeMap::new();
    let mut entries = tokio::fs::read_dir(root).await?;
    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        if path.extension().map(|e| e == "mbtiles").unwrap_or(false) {
            if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                sources.insert(stem.to_string(), path.to_string_lossy().into_owned());
            }
        }
    }
    Ok(sources)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn source_ids_and_urls() {
        assert_eq!(
            MartinController::table_source_id("vector_1a2b3c4d"),
            "public.vector_1a2b3c4d"
        );
    }

    #[tokio::test]
    async fn scan_skips_in_flight_part_files() {
        let dir = tempfile::tempdir().unwrap();
        tokio::fs::write(dir.path().join("raster_1.mbtiles"), b"done")
            .await
            .unwrap();
        tokio::fs::write(dir.path().join("raster_2.part"), b"half written")
            .await
            .unwrap();
        tokio::fs::write(dir.path().join("notes.txt"), b"unrelated")
            .await
            .unwrap();

        let sources = scan_mbtiles_sources(dir.path()).await.unwrap();
        assert_eq!(sources.len(), 1);
        assert!(sources.contains_key("raster_1"));
    }

    #[test]
    fn config_yaml_shape() {
        let mut tables = BTreeMap::new();
        tables.insert(
            "public.vector_ab".to_string(),
            TableSource {
                schema: "public".to_string(),
                table: "vector_ab".to_string(),
                srid: 4326,
                geometry_column: "geom".to_string(),
                geometry_type: "GEOMETRY".to_string(),
            },
        );
        let mut sources = BTreeMap::new();
        sources.insert("raster_9".to_string(), "/data/raster_9.mbtiles".to_string());

        let doc = MartinConfig {
            listen_addresses: "0.0.0.0:3010".to_string(),
            postgres: Some(PostgresConfig {
                connection_string: "postgresql://x".to_string(),
                tables,
            }),
            mbtiles: Some(MbtilesConfig { sources }),
        };

        let yaml = serde_yaml::to_string(&doc).unwrap();
        assert!(yaml.contains("0.0.0.0:3010"));
        assert!(yaml.contains("public.vector_ab"));
        assert!(yaml.contains("geometry_column: geom"));
        assert!(yaml.contains("/data/raster_9.mbtiles"));
    }

    #[test]
    fn empty_sections_are_omitted() {
        let doc = MartinConfig {
            listen_addresses: "0.0.0.0:3010".to_string(),
            postgres: None,
            mbtiles: None,
        };
        let yaml = serde_yaml::to_string(&doc).unwrap();
        assert!(!yaml.contains("postgres"));
        assert!(!yaml.contains("mbtiles"));
    }
}
