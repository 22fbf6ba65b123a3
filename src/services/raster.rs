use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};

use serde_json::Value;
use tokio::process::Command;

use crate::error::AppError;
use crate::services::store::ObjectStore;

pub const MIN_ZOOM_FLOOR: u8 = 0;
pub const MAX_ZOOM_CEILING: u8 = 25;

/// Progress sink: percent plus a short step label.
pub type ProgressFn<'a> = &'a (dyn Fn(u8, &str) + Send + Sync);

pub struct RasterOutput {
    pub basename: String,
    pub min_zoom: u8,
    pub max_zoom: u8,
    pub bounds: [f64; 4],
    pub tile_count: u64,
}

pub fn validate_zoom_range(min_zoom: u8, max_zoom: u8) -> Result<(), AppError> {
    if max_zoom < 1 || max_zoom > MAX_ZOOM_CEILING {
        return Err(AppError::InvalidInput(format!(
            "max_zoom must be in 1-{}, got {}",
            MAX_ZOOM_CEILING, max_zoom
        )));
    }
    if min_zoom > max_zoom.saturating_sub(1) {
        return Err(AppError::InvalidInput(format!(
            "min_zoom must be in 0-{}, got {}",
            max_zoom - 1,
            min_zoom
        )));
    }
    Ok(())
}

struct ScratchDir(PathBuf);

impl ScratchDir {
    fn create(file_id: i64) -> Result<Self, AppError> {
        let path = std::env::temp_dir().join(format!(
            "raster_pyramid_{}_{}",
            file_id,
            uuid::Uuid::new_v4()
        ));
        std::fs::create_dir_all(&path)?;
        Ok(Self(path))
    }
}

impl Drop for ScratchDir {
    fn drop(&mut self) {
        let _ = std::fs::remove_dir_all(&self.0);
    }
}

/// Converts a GeoTIFF into an MBTiles pyramid over `[min_zoom, max_zoom]`.
///
/// External tooling does the heavy lifting: gdalinfo probes the raster,
/// gdalwarp reprojects to web mercator, gdal2tiles renders one zoom level at
/// a time so cancellation is observed between levels. The tile tree is then
/// packed into a single MBTiles file under the configured MBTiles root.
///
/// On cancellation the running child is killed, partial outputs are removed,
/// and the caller gets `Cancelled`.
pub async fn convert(
    file_id: i64,
    input_path: &str,
    min_zoom: u8,
    max_zoom: u8,
    store: &ObjectStore,
    on_progress: ProgressFn<'_>,
    cancel: &AtomicBool,
) -> Result<RasterOutput, AppError> {
    validate_zoom_range(min_zoom, max_zoom)?;

    let scratch = ScratchDir::create(file_id)?;
    let basename = format!("raster_{}", file_id);
    let mbtiles_path = store.mbtiles_path(&basename);
    // Pack under a holding name first; the tile server config scan only picks
    // up `.mbtiles` files, so a half-written pyramid never becomes a source.
    let part_path = mbtiles_path.with_extension("part");

    let result = run_pipeline(
        input_path,
        min_zoom,
        max_zoom,
        &scratch.0,
        &part_path,
        on_progress,
        cancel,
    )
    .await;

    match result {
        Ok((bounds, tile_count)) => {
            tokio::fs::rename(&part_path, &mbtiles_path).await?;
            Ok(RasterOutput {
                basename,
                min_zoom,
                max_zoom,
                bounds,
                tile_count,
            })
        }
        Err(e) => {
            // Never leave a partial pyramid behind.
            let _ = tokio::fs::remove_file(&part_path).await;
            Err(e)
        }
    }
}

async fn run_pipeline(
    input_path: &str,
    min_zoom: u8,
    max_zoom: u8,
    scratch: &Path,
    mbtiles_path: &Path,
    on_progress: ProgressFn<'_>,
    cancel: &AtomicBool,
) -> Result<([f64; 4], u64), AppError> {
    on_progress(2, "probing");
    let info = probe(input_path, cancel).await?;

    on_progress(8, "reprojecting");
    let warped = scratch.join("warped.tif");
    run_cancellable(
        Command::new("gdalwarp")
            .arg("-t_srs")
            .arg("EPSG:3857")
            .arg("-r")
            .arg("bilinear")
            .arg("-of")
            .arg("GTiff")
            .arg(input_path)
            .arg(&warped),
        "gdalwarp",
        cancel,
    )
    .await?;

    // Bounds come from the warped raster so they reflect what gets tiled.
    let bounds = probe(warped.to_str().unwrap_or(input_path), cancel)
        .await
        .map(|i| i.wgs84_bounds)
        .unwrap_or(info.wgs84_bounds);

    let tiles_dir = scratch.join("tiles");
    let levels = (max_zoom - min_zoom + 1) as u32;
    for (i, zoom) in (min_zoom..=max_zoom).enumerate() {
        if cancel.load(Ordering::SeqCst) {
            return Err(AppError::Cancelled);
        }
        // 15..=80 spread across pyramid levels.
        let percent = 15 + ((i as u32) * 65 / levels) as u8;
        on_progress(percent, &format!("tiling z={}", zoom));

        run_cancellable(
            Command::new("gdal2tiles.py")
                .arg("--xyz")
                .arg("-w")
                .arg("none")
                .arg("-z")
                .arg(format!("{}-{}", zoom, zoom))
                .arg(&warped)
                .arg(&tiles_dir),
            "gdal2tiles",
            cancel,
        )
        .await?;
    }

    if cancel.load(Ordering::SeqCst) {
        return Err(AppError::Cancelled);
    }

    on_progress(82, "writing mbtiles");
    let tile_count = write_mbtiles(
        tiles_dir.clone(),
        mbtiles_path.to_path_buf(),
        min_zoom,
        max_zoom,
        bounds,
    )
    .await?;

    if tile_count == 0 {
        return Err(AppError::EmptyInput(
            "Raster produced no tiles in the requested zoom range".to_string(),
        ));
    }

    on_progress(95, "registering");
    Ok((bounds, tile_count))
}

struct RasterInfo {
    wgs84_bounds: [f64; 4],
}

/// `gdalinfo -json`: validates the input is a readable raster and yields the
/// WGS84 extent.
async fn probe(input_path: &str, cancel: &AtomicBool) -> Result<RasterInfo, AppError> {
    let stdout = run_cancellable(
        Command::new("gdalinfo").arg("-json").arg(input_path),
        "gdalinfo",
        cancel,
    )
    .await?;

    let doc: Value = serde_json::from_slice(&stdout)
        .map_err(|e| AppError::UpstreamFailure(format!("gdalinfo output unreadable: {}", e)))?;

    let bounds = parse_wgs84_extent(&doc).ok_or_else(|| {
        AppError::InvalidInput("Raster has no georeferencing (wgs84Extent missing)".to_string())
    })?;

    Ok(RasterInfo {
        wgs84_bounds: bounds,
    })
}

/// The wgs84Extent member is a GeoJSON polygon ring around the raster.
fn parse_wgs84_extent(doc: &Value) -> Option<[f64; 4]> {
    let ring = doc
        .get("wgs84Extent")?
        .get("coordinates")?
        .as_array()?
        .first()?
        .as_array()?;

    let mut bounds = crate::models::geo::Bounds::empty();
    for pair in ring {
        let pair = pair.as_array()?;
        bounds.extend(pair.first()?.as_f64()?, pair.get(1)?.as_f64()?);
    }
    if bounds.is_empty() {
        None
    } else {
        Some(bounds.to_array())
    }
}

/// Runs a child process, killing it promptly if the cancel flag flips.
async fn run_cancellable(
    cmd: &mut Command,
    tool: &str,
    cancel: &AtomicBool,
) -> Result<Vec<u8>, AppError> {
    let mut child = cmd
        .stdout(std::process::Stdio::piped())
        .stderr(std::process::Stdio::piped())
        .spawn()
        .map_err(|e| AppError::UpstreamFailure(format!("Failed to spawn {}: {}", tool, e)))?;

    loop {
        if cancel.load(Ordering::SeqCst) {
            let _ = child.kill().await;
            return Err(AppError::Cancelled);
        }
        match child.try_wait() {
            Ok(Some(_)) => break,
            Ok(None) => tokio::time::sleep(std::time::Duration::from_millis(200)).await,
            Err(e) => {
                return Err(AppError::UpstreamFailure(format!(
                    "{} wait failed: {}",
                    tool, e
                )))
            }
        }
    }

    let output = child
        .wait_with_output()
        .await
        .map_err(|e| AppError::UpstreamFailure(format!("{} output failed: {}", tool, e)))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        let excerpt: String = stderr.lines().rev().take(5).collect::<Vec<_>>().join(" | ");
        return Err(AppError::UpstreamFailure(format!(
            "{} failed: {}",
            tool, excerpt
        )));
    }

    Ok(output.stdout)
}

/// Packs a gdal2tiles XYZ directory tree into one MBTiles file. MBTiles rows
/// use TMS tile rows, so y is flipped per zoom level.
async fn write_mbtiles(
    tiles_dir: PathBuf,
    mbtiles_path: PathBuf,
    min_zoom: u8,
    max_zoom: u8,
    bounds: [f64; 4],
) -> Result<u64, AppError> {
    tokio::task::spawn_blocking(move || -> Result<u64, AppError> {
        let conn = rusqlite::Connection::open(&mbtiles_path)
            .map_err(|e| AppError::UpstreamFailure(format!("MBTiles open failed: {}", e)))?;

        conn.execute_batch(
            "PRAGMA journal_mode = OFF;
             CREATE TABLE IF NOT EXISTS metadata (name TEXT, value TEXT);
             CREATE TABLE IF NOT EXISTS tiles (
                 zoom_level INTEGER, tile_column INTEGER, tile_row INTEGER, tile_data BLOB);
             CREATE UNIQUE INDEX IF NOT EXISTS tile_index
                 ON tiles (zoom_level, tile_column, tile_row);",
        )
        .map_err(|e| AppError::UpstreamFailure(format!("MBTiles schema failed: {}", e)))?;

        let metadata = [
            ("name", mbtiles_path.file_stem().and_then(|s| s.to_str()).unwrap_or("raster").to_string()),
            ("format", "png".to_string()),
            ("type", "overlay".to_string()),
            ("minzoom", min_zoom.to_string()),
            ("maxzoom", max_zoom.to_string()),
            (
                "bounds",
                format!("{},{},{},{}", bounds[0], bounds[1], bounds[2], bounds[3]),
            ),
        ];
        for (name, value) in metadata {
            conn.execute(
                "INSERT INTO metadata (name, value) VALUES (?1, ?2)",
                rusqlite::params![name, value],
            )
            .map_err(|e| AppError::UpstreamFailure(format!("MBTiles metadata failed: {}", e)))?;
        }

        let mut count: u64 = 0;
        for zoom in min_zoom..=max_zoom {
            let zoom_dir = tiles_dir.join(zoom.to_string());
            if !zoom_dir.is_dir() {
                continue;
            }
            let flip_max = (1u32 << zoom) - 1;

            for x_entry in std::fs::read_dir(&zoom_dir)? {
                let x_dir = x_entry?.path();
                let Some(x) = x_dir
                    .file_name()
                    .and_then(|n| n.to_str())
                    .and_then(|n| n.parse::<u32>().ok())
                else {
                    continue;
                };

                for y_entry in std::fs::read_dir(&x_dir)? {
                    let tile_path = y_entry?.path();
                    let Some(y) = tile_path
                        .file_stem()
                        .and_then(|n| n.to_str())
                        .and_then(|n| n.parse::<u32>().ok())
                    else {
                        continue;
                    };

                    let data = std::fs::read(&tile_path)?;
                    if data.is_empty() {
                        continue;
                    }
                    conn.execute(
                        "INSERT OR REPLACE INTO tiles (zoom_level, tile_column, tile_row, tile_data) \
                         VALUES (?1, ?2, ?3, ?4)",
                        rusqlite::params![zoom, x, flip_max - y, data],
                    )
                    .map_err(|e| {
                        AppError::UpstreamFailure(format!("MBTiles tile insert failed: {}", e))
                    })?;
                    count += 1;
                }
            }
        }

        Ok(count)
    })
    .await
    .map_err(|e| AppError::InternalServerError(format!("MBTiles task failed: {}", e)))?
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zoom_range_validation() {
        assert!(validate_zoom_range(2, 6).is_ok());
        assert!(validate_zoom_range(0, 1).is_ok());
        assert!(validate_zoom_range(0, 25).is_ok());
        assert!(validate_zoom_range(0, 0).is_err());
        assert!(validate_zoom_range(0, 26).is_err());
        assert!(validate_zoom_range(6, 6).is_err());
        assert!(validate_zoom_range(7, 6).is_err());
    }

    #[test]
    fn wgs84_extent_parsing() {
        let doc: Value = serde_json::from_str(
            r#"{"wgs84Extent": {"type": "Polygon", "coordinates":
                [[[116.0, 40.0], [116.0, 39.0], [117.0, 39.0], [117.0, 40.0], [116.0, 40.0]]]}}"#,
        )
        .unwrap();
        assert_eq!(
            parse_wgs84_extent(&doc),
            Some([116.0, 39.0, 117.0, 40.0])
        );
        assert_eq!(parse_wgs84_extent(&serde_json::json!({})), None);
    }

    #[tokio::test]
    async fn mbtiles_write_packs_xyz_tree_with_tms_rows() {
        let dir = tempfile::tempdir().unwrap();
        let tiles = dir.path().join("tiles");
        // z=2, x=1, y=0 in XYZ becomes tile_row 3 in TMS.
        std::fs::create_dir_all(tiles.join("2").join("1")).unwrap();
        std::fs::write(tiles.join("2").join("1").join("0.png"), b"png-bytes").unwrap();

        let out = dir.path().join("out.mbtiles");
        let count = write_mbtiles(tiles, out.clone(), 2, 2, [0.0, 0.0, 1.0, 1.0])
            .await
            .unwrap();
        assert_eq!(count, 1);

        let conn = rusqlite::Connection::open(&out).unwrap();
        let row: (i64, i64, i64) = conn
            .query_row(
                "SELECT zoom_level, tile_column, tile_row FROM tiles",
                [],
                |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?)),
            )
            .unwrap();
        assert_eq!(row, (2, 1, 3));

        let minzoom: String = conn
            .query_row(
                "SELECT value FROM metadata WHERE name = 'minzoom'",
                [],
                |r| r.get(0),
            )
            .unwrap();
        assert_eq!(minzoom, "2");
    }
}
