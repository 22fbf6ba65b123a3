use std::path::{Path, PathBuf};

use tokio::process::Command;

use crate::error::AppError;

use super::geojson::{self, ParsedVector};

/// Scratch directory removed on drop, so extraction leftovers never outlive
/// the ingest attempt.
struct ScratchDir(PathBuf);

impl ScratchDir {
    fn create(file_id: i64) -> Result<Self, AppError> {
        let path = std::env::temp_dir().join(format!("shp_extract_{}_{}", file_id, uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&path)?;
        Ok(Self(path))
    }
}

impl Drop for ScratchDir {
    fn drop(&mut self) {
        let _ = std::fs::remove_dir_all(&self.0);
    }
}

/// Loads a zipped Shapefile: extract, locate the first .shp with its sidecar
/// files, convert to WGS84 GeoJSON through ogr2ogr, then reuse the GeoJSON
/// parse path. Null geometries are dropped there.
pub async fn parse_zip(
    file_id: i64,
    zip_path: &str,
    declared_srid: Option<i32>,
) -> Result<ParsedVector, AppError> {
    let scratch = ScratchDir::create(file_id)?;

    let shp_path = extract_archive(zip_path, &scratch.0).await?;
    let converted = convert_to_geojson(&shp_path, &scratch.0, declared_srid).await?;

    let bytes = tokio::fs::read(&converted).await?;
    let parsed = geojson::parse(&bytes).map_err(|e| match e {
        AppError::EmptyInput(_) => {
            AppError::EmptyInput("Shapefile contains no valid geometries".to_string())
        }
        other => other,
    })?;

    Ok(parsed)
}

async fn extract_archive(zip_path: &str, dest: &Path) -> Result<PathBuf, AppError> {
    let zip_path = zip_path.to_string();
    let dest = dest.to_path_buf();

    tokio::task::spawn_blocking(move || -> Result<PathBuf, AppError> {
        let file = std::fs::File::open(&zip_path)?;
        let mut archive = zip::ZipArchive::new(file)
            .map_err(|e| AppError::InvalidInput(format!("Not a valid ZIP archive: {}", e)))?;

        let mut shp_path: Option<PathBuf> = None;
        for i in 0..archive.len() {
            let mut entry = archive
                .by_index(i)
                .map_err(|e| AppError::InvalidInput(format!("Corrupt ZIP entry: {}", e)))?;
            if entry.is_dir() {
                continue;
            }

            // Flatten: sidecars (.dbf/.shx/.prj/.cpg) must land next to the .shp.
            let name = match Path::new(entry.name()).file_name() {
                Some(n) => n.to_owned(),
                None => continue,
            };
            let out_path = dest.join(&name);
            let mut out = std::fs::File::create(&out_path)?;
            std::io::copy(&mut entry, &mut out)?;

            if out_path
                .extension()
                .map(|e| e.eq_ignore_ascii_case("shp"))
                .unwrap_or(false)
                && shp_path.is_none()
            {
                shp_path = Some(out_path);
            }
        }

        shp_path.ok_or_else(|| {
            AppError::InvalidInput("ZIP archive contains no .shp file".to_string())
        })
    })
    .await
    .map_err(|e| AppError::InternalServerError(format!("Extraction task failed: {}", e)))?
}

/// ogr2ogr does the CRS work: the declared SRID overrides a missing or wrong
/// .prj, and everything is reprojected to EPSG:4326.
async fn convert_to_geojson(
    shp_path: &Path,
    scratch: &Path,
    declared_srid: Option<i32>,
) -> Result<PathBuf, AppError> {
    let out_path = scratch.join("converted.geojson");

    let mut cmd = Command::new("ogr2ogr");
    cmd.arg("-f")
        .arg("GeoJSON")
        .arg(&out_path)
        .arg(shp_path)
        .arg("-t_srs")
        .arg("EPSG:4326");
    if let Some(srid) = declared_srid {
        cmd.arg("-s_srs").arg(format!("EPSG:{}", srid));
    }

    let output = cmd
        .output()
        .await
        .map_err(|e| AppError::UpstreamFailure(format!("Failed to run ogr2ogr: {}", e)))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        let excerpt: String = stderr.lines().rev().take(5).collect::<Vec<_>>().join(" | ");
        return Err(AppError::UpstreamFailure(format!(
            "ogr2ogr failed on shapefile: {}",
            excerpt
        )));
    }

    Ok(out_path)
}
