use std::collections::BTreeSet;

use serde_json::{Map, Value};

use crate::error::AppError;
use crate::models::geo::Bounds;

const GEOMETRY_TYPES: [&str; 7] = [
    "Point",
    "MultiPoint",
    "LineString",
    "MultiLineString",
    "Polygon",
    "MultiPolygon",
    "GeometryCollection",
];

/// One feature ready for the spatial table: a GeoJSON geometry object plus a
/// flat property map.
pub struct ParsedFeature {
    pub geometry: Value,
    pub properties: Map<String, Value>,
}

pub struct ParsedVector {
    pub features: Vec<ParsedFeature>,
    pub geometry_types: Vec<String>,
    pub property_fields: Vec<String>,
    pub bounds: Bounds,
}

/// Parses GeoJSON bytes. Accepts a FeatureCollection, a single Feature, or a
/// bare geometry of the seven standard types. Features with null geometry are
/// dropped; zero usable features is an `EmptyInput` error.
pub fn parse(bytes: &[u8]) -> Result<ParsedVector, AppError> {
    let text = std::str::from_utf8(bytes)
        .map_err(|_| AppError::InvalidInput("GeoJSON must be UTF-8".to_string()))?;
    let root: Value = serde_json::from_str(text)
        .map_err(|e| AppError::InvalidInput(format!("Not valid JSON: {}", e)))?;

    let kind = root
        .get("type")
        .and_then(Value::as_str)
        .ok_or_else(|| AppError::InvalidInput("Missing GeoJSON 'type' member".to_string()))?;

    let mut features = Vec::new();
    match kind {
        "FeatureCollection" => {
            let raw = root
                .get("features")
                .and_then(Value::as_array)
                .ok_or_else(|| {
                    AppError::InvalidInput("FeatureCollection without 'features'".to_string())
                })?;
            for feature in raw {
                if let Some(parsed) = parse_feature(feature)? {
                    features.push(parsed);
                }
            }
        }
        "Feature" => {
            if let Some(parsed) = parse_feature(&root)? {
                features.push(parsed);
            }
        }
        t if GEOMETRY_TYPES.contains(&t) => {
            validate_geometry(&root)?;
            features.push(ParsedFeature {
                geometry: root.clone(),
                properties: Map::new(),
            });
        }
        other => {
            return Err(AppError::UnsupportedFileType(format!(
                "Unsupported GeoJSON type '{}'",
                other
            )));
        }
    }

    if features.is_empty() {
        return Err(AppError::EmptyInput(
            "GeoJSON contains no features with geometry".to_string(),
        ));
    }

    let mut geometry_types = BTreeSet::new();
    let mut property_fields = BTreeSet::new();
    let mut bounds = Bounds::empty();
    for feature in &features {
        if let Some(t) = feature.geometry.get("type").and_then(Value::as_str) {
            geometry_types.insert(t.to_string());
        }
        for key in feature.properties.keys() {
            property_fields.insert(key.clone());
        }
        extend_bounds(&feature.geometry, &mut bounds);
    }

    Ok(ParsedVector {
        features,
        geometry_types: geometry_types.into_iter().collect(),
        property_fields: property_fields.into_iter().collect(),
        bounds,
    })
}

fn parse_feature(value: &Value) -> Result<Option<ParsedFeature>, AppError> {
    if value.get("type").and_then(Value::as_str) != Some("Feature") {
        return Err(AppError::InvalidInput(
            "FeatureCollection members must be Features".to_string(),
        ));
    }

    let geometry = match value.get("geometry") {
        None | Some(Value::Null) => return Ok(None),
        Some(g) => g.clone(),
    };
    validate_geometry(&geometry)?;

    let properties = match value.get("properties") {
        None | Some(Value::Null) => Map::new(),
        Some(Value::Object(map)) => map.clone(),
        Some(_) => {
            return Err(AppError::InvalidInput(
                "Feature 'properties' must be an object or null".to_string(),
            ))
        }
    };

    Ok(Some(ParsedFeature {
        geometry,
        properties,
    }))
}

fn validate_geometry(geometry: &Value) -> Result<(), AppError> {
    let kind = geometry
        .get("type")
        .and_then(Value::as_str)
        .ok_or_else(|| AppError::InvalidInput("Geometry without 'type'".to_string()))?;

    if !GEOMETRY_TYPES.contains(&kind) {
        return Err(AppError::UnsupportedFileType(format!(
            "Unsupported geometry type '{}'",
            kind
        )));
    }

    if kind == "GeometryCollection" {
        let members = geometry
            .get("geometries")
            .and_then(Value::as_array)
            .ok_or_else(|| {
                AppError::InvalidInput("GeometryCollection without 'geometries'".to_string())
            })?;
        for member in members {
            validate_geometry(member)?;
        }
    } else if geometry.get("coordinates").is_none() {
        return Err(AppError::InvalidInput(format!(
            "{} geometry without 'coordinates'",
            kind
        )));
    }

    Ok(())
}

/// Walks the coordinate tree of a geometry. Any [x, y, ...] leaf extends the
/// bounding box.
fn extend_bounds(geometry: &Value, bounds: &mut Bounds) {
    if let Some(members) = geometry.get("geometries").and_then(Value::as_array) {
        for member in members {
            extend_bounds(member, bounds);
        }
        return;
    }
    if let Some(coords) = geometry.get("coordinates") {
        walk_coordinates(coords, bounds);
    }
}

fn walk_coordinates(value: &Value, bounds: &mut Bounds) {
    if let Some(arr) = value.as_array() {
        if arr.len() >= 2 && arr[0].is_number() && arr[1].is_number() {
            if let (Some(x), Some(y)) = (arr[0].as_f64(), arr[1].as_f64()) {
                bounds.extend(x, y);
            }
            return;
        }
        for item in arr {
            walk_coordinates(item, bounds);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_feature_collection() {
        let body = r#"{
            "type": "FeatureCollection",
            "features": [
                {"type": "Feature", "properties": {"name": "a"},
                 "geometry": {"type": "Point", "coordinates": [121.5, 31.2]}},
                {"type": "Feature", "properties": {"name": "b", "height": 3},
                 "geometry": {"type": "Point", "coordinates": [120.1, 30.3]}}
            ]
        }"#;

        let parsed = parse(body.as_bytes()).unwrap();
        assert_eq!(parsed.features.len(), 2);
        assert_eq!(parsed.geometry_types, vec!["Point"]);
        assert_eq!(parsed.property_fields, vec!["height", "name"]);
        assert_eq!(parsed.bounds.to_array(), [120.1, 30.3, 121.5, 31.2]);
    }

    #[test]
    fn accepts_single_feature_and_bare_geometry() {
        let feature = r#"{"type": "Feature", "properties": null,
            "geometry": {"type": "LineString", "coordinates": [[0,0],[1,1]]}}"#;
        assert_eq!(parse(feature.as_bytes()).unwrap().features.len(), 1);

        let geometry = r#"{"type": "Polygon",
            "coordinates": [[[0,0],[0,1],[1,1],[0,0]]]}"#;
        let parsed = parse(geometry.as_bytes()).unwrap();
        assert_eq!(parsed.geometry_types, vec!["Polygon"]);
    }

    #[test]
    fn null_geometries_are_dropped() {
        let body = r#"{
            "type": "FeatureCollection",
            "features": [
                {"type": "Feature", "properties": {}, "geometry": null},
                {"type": "Feature", "properties": {},
                 "geometry": {"type": "Point", "coordinates": [1, 2]}}
            ]
        }"#;
        assert_eq!(parse(body.as_bytes()).unwrap().features.len(), 1);
    }

    #[test]
    fn empty_collection_is_empty_input() {
        let body = r#"{"type": "FeatureCollection", "features": []}"#;
        assert!(matches!(
            parse(body.as_bytes()),
            Err(AppError::EmptyInput(_))
        ));
    }

    #[test]
    fn garbage_is_invalid_input() {
        assert!(matches!(
            parse(b"not json at all"),
            Err(AppError::InvalidInput(_))
        ));
        assert!(matches!(
            parse(&[0xff, 0xfe, 0x00]),
            Err(AppError::InvalidInput(_))
        ));
    }

    #[test]
    fn unknown_type_is_unsupported() {
        let body = r#"{"type": "TopoJSON", "objects": {}}"#;
        assert!(matches!(
            parse(body.as_bytes()),
            Err(AppError::UnsupportedFileType(_))
        ));
    }

    #[test]
    fn geometry_collection_bounds_cover_members() {
        let body = r#"{"type": "GeometryCollection", "geometries": [
            {"type": "Point", "coordinates": [10, 10]},
            {"type": "Point", "coordinates": [-5, 20]}
        ]}"#;
        let parsed = parse(body.as_bytes()).unwrap();
        assert_eq!(parsed.bounds.to_array(), [-5.0, 10.0, 10.0, 20.0]);
    }
}
