pub mod dxf;
pub mod geojson;
pub mod shapefile;

use rand::Rng;
use sea_orm::Value;

use crate::db::Db;
use crate::entities::file;
use crate::error::AppError;
use crate::models::geo::{Bounds, IngestSummary};

use geojson::ParsedVector;

/// Ingests one uploaded vector file into a fresh spatial table and returns
/// its summary. The table is SRID 4326 with a GiST-indexed geometry column.
pub async fn ingest_file(db: &Db, file: &file::Model) -> Result<IngestSummary, AppError> {
    let declared_srid = parse_srid(file.coordinate_system.as_deref())?;

    let parsed = match file.subtype.as_str() {
        "geojson" => {
            let bytes = tokio::fs::read(&file.file_path).await?;
            geojson::parse(&bytes)?
        }
        "shp" => shapefile::parse_zip(file.id, &file.file_path, declared_srid).await?,
        "dxf" => dxf::parse_dxf(file.id, &file.file_path, declared_srid).await?,
        other => {
            return Err(AppError::UnsupportedFileType(format!(
                "No vector ingest path for subtype '{}'",
                other
            )))
        }
    };

    // The GeoJSON path may carry projected coordinates with a declared CRS;
    // the converter paths already emit 4326.
    let source_srid = match file.subtype.as_str() {
        "geojson" => declared_srid.unwrap_or(4326),
        _ => 4326,
    };

    create_spatial_table(db, parsed, source_srid).await
}

/// Accepts "EPSG:4326", "epsg:3857" or a bare numeric code.
pub fn parse_srid(declared: Option<&str>) -> Result<Option<i32>, AppError> {
    let Some(raw) = declared else {
        return Ok(None);
    };
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Ok(None);
    }

    let code = trimmed
        .strip_prefix("EPSG:")
        .or_else(|| trimmed.strip_prefix("epsg:"))
        .unwrap_or(trimmed);

    code.parse::<i32>()
        .ok()
        .filter(|srid| *srid > 0)
        .map(Some)
        .ok_or_else(|| AppError::InvalidInput(format!("Unrecognised CRS '{}'", raw)))
}

pub fn generate_table_name() -> String {
    let suffix: u32 = rand::thread_rng().gen();
    format!("vector_{:08x}", suffix)
}

/// Common ingest tail: create the table, insert every feature (reprojecting
/// from `source_srid` when it is not 4326), index the geometry column, then
/// read the authoritative count and extent back from the database.
async fn create_spatial_table(
    db: &Db,
    parsed: ParsedVector,
    source_srid: i32,
) -> Result<IngestSummary, AppError> {
    let table_name = generate_table_name();

    db.execute_unprepared(&format!(
        "CREATE TABLE {} (id BIGSERIAL PRIMARY KEY, properties JSONB NOT NULL DEFAULT '{{}}', \
         geom geometry(Geometry, 4326))",
        table_name
    ))
    .await?;

    let insert_result = insert_features(db, &table_name, &parsed, source_srid).await;
    if let Err(e) = insert_result {
        // Roll the fresh table back; the caller sees the original cause.
        let _ = drop_spatial_table(db, &table_name).await;
        return Err(e);
    }

    db.execute_unprepared(&format!(
        "CREATE INDEX idx_{}_geom ON {} USING GIST (geom)",
        table_name, table_name
    ))
    .await?;

    let stats = db
        .query_one(
            &format!(
                "SELECT COUNT(*) AS n, ST_XMin(ST_Extent(geom)) AS min_x, \
                 ST_YMin(ST_Extent(geom)) AS min_y, ST_XMax(ST_Extent(geom)) AS max_x, \
                 ST_YMax(ST_Extent(geom)) AS max_y FROM {}",
                table_name
            ),
            vec![],
        )
        .await?
        .ok_or_else(|| AppError::InternalServerError("Extent query returned no row".to_string()))?;

    let feature_count: i64 = stats.try_get("", "n").map_err(AppError::DatabaseError)?;
    let bounds = read_bounds(&stats).unwrap_or(parsed.bounds);

    Ok(IngestSummary {
        table_name,
        srid: 4326,
        feature_count,
        bounds: bounds.to_array(),
        geometry_types: parsed.geometry_types,
        property_fields: parsed.property_fields,
    })
}

fn read_bounds(row: &sea_orm::QueryResult) -> Option<Bounds> {
    let min_x: f64 = row.try_get("", "min_x").ok()?;
    let min_y: f64 = row.try_get("", "min_y").ok()?;
    let max_x: f64 = row.try_get("", "max_x").ok()?;
    let max_y: f64 = row.try_get("", "max_y").ok()?;
    Some(Bounds {
        min_x,
        min_y,
        max_x,
        max_y,
    })
}

async fn insert_features(
    db: &Db,
    table_name: &str,
    parsed: &ParsedVector,
    source_srid: i32,
) -> Result<(), AppError> {
    // Geometries arrive as GeoJSON text and are built in the database, forced
    // planar, and reprojected when the source CRS differs.
    let geom_expr = if source_srid == 4326 {
        "ST_Force2D(ST_SetSRID(ST_GeomFromGeoJSON($2), 4326))".to_string()
    } else {
        format!(
            "ST_Transform(ST_Force2D(ST_SetSRID(ST_GeomFromGeoJSON($2), {})), 4326)",
            source_srid
        )
    };
    let sql = format!(
        "INSERT INTO {} (properties, geom) VALUES ($1, {})",
        table_name, geom_expr
    );

    for feature in &parsed.features {
        let properties = serde_json::Value::Object(feature.properties.clone());
        let geometry = feature.geometry.to_string();
        db.execute(
            &sql,
            vec![Value::Json(Some(Box::new(properties))), geometry.into()],
        )
        .await?;
    }

    Ok(())
}

pub async fn drop_spatial_table(db: &Db, table_name: &str) -> Result<(), AppError> {
    if !crate::utils::is_safe_identifier(table_name) {
        return Err(AppError::InvalidInput(format!(
            "Refusing to drop suspicious table name '{}'",
            table_name
        )));
    }
    db.execute_unprepared(&format!("DROP TABLE IF EXISTS {}", table_name))
        .await
}

/// True if the spatial table exists with a geometry column registered.
pub async fn spatial_table_exists(db: &Db, table_name: &str) -> Result<bool, AppError> {
    let row = db
        .query_one(
            "SELECT COUNT(*) AS n FROM geometry_columns \
             WHERE f_table_schema = 'public' AND f_table_name = $1",
            vec![table_name.into()],
        )
        .await?;
    let count: i64 = row
        .map(|r| r.try_get("", "n"))
        .transpose()
        .map_err(AppError::DatabaseError)?
        .unwrap_or(0);
    Ok(count > 0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn table_names_are_identifier_safe() {
        for _ in 0..100 {
            let name = generate_table_name();
            assert!(crate::utils::is_safe_identifier(&name), "{}", name);
            assert_eq!(name.len(), "vector_".len() + 8);
        }
    }

    #[test]
    fn srid_parsing() {
        assert_eq!(parse_srid(None).unwrap(), None);
        assert_eq!(parse_srid(Some("")).unwrap(), None);
        assert_eq!(parse_srid(Some("EPSG:4326")).unwrap(), Some(4326));
        assert_eq!(parse_srid(Some("epsg:3857")).unwrap(), Some(3857));
        assert_eq!(parse_srid(Some("2437")).unwrap(), Some(2437));
        assert!(parse_srid(Some("WGS84-ish")).is_err());
        assert!(parse_srid(Some("EPSG:-1")).is_err());
    }
}
