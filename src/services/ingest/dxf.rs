use std::path::PathBuf;

use serde_json::{Map, Value};
use tokio::process::Command;

use crate::error::AppError;

use super::geojson::{self, ParsedVector};

/// Converts a DXF drawing into planar features. Exactly five attributes are
/// promised per feature: layer, linetype, color, handle, text. Everything
/// else the drawing carries (hatches, materials, block transforms) is not
/// preserved.
pub async fn parse_dxf(
    file_id: i64,
    dxf_path: &str,
    declared_srid: Option<i32>,
) -> Result<ParsedVector, AppError> {
    let out_path = std::env::temp_dir().join(format!(
        "dxf_convert_{}_{}.geojson",
        file_id,
        uuid::Uuid::new_v4()
    ));

    let result = convert(dxf_path, &out_path, declared_srid).await;
    let _ = tokio::fs::remove_file(&out_path).await;
    let mut parsed = result?;

    for feature in &mut parsed.features {
        feature.properties = cad_attributes(&feature.properties);
    }
    parsed.property_fields = vec![
        "color".to_string(),
        "handle".to_string(),
        "layer".to_string(),
        "linetype".to_string(),
        "text".to_string(),
    ];

    Ok(parsed)
}

async fn convert(
    dxf_path: &str,
    out_path: &PathBuf,
    declared_srid: Option<i32>,
) -> Result<ParsedVector, AppError> {
    let mut cmd = Command::new("ogr2ogr");
    cmd.arg("-f")
        .arg("GeoJSON")
        .arg(out_path)
        .arg(dxf_path)
        // CAD entities commonly carry Z; the spatial table is planar.
        .arg("-dim")
        .arg("XY")
        .arg("-t_srs")
        .arg("EPSG:4326");
    // DXF has no CRS of its own; without a declared one the coordinates are
    // taken as already geographic.
    cmd.arg("-s_srs")
        .arg(format!("EPSG:{}", declared_srid.unwrap_or(4326)));

    let output = cmd
        .output()
        .await
        .map_err(|e| AppError::UpstreamFailure(format!("Failed to run ogr2ogr: {}", e)))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        let excerpt: String = stderr.lines().rev().take(5).collect::<Vec<_>>().join(" | ");
        return Err(AppError::UpstreamFailure(format!(
            "ogr2ogr failed on DXF: {}",
            excerpt
        )));
    }

    let bytes = tokio::fs::read(out_path).await?;
    geojson::parse(&bytes).map_err(|e| match e {
        AppError::EmptyInput(_) => {
            AppError::EmptyInput("DXF contains no drawable entities".to_string())
        }
        other => other,
    })
}

/// Maps the OGR DXF fields onto the five contract attributes. Missing values
/// become null, never absent keys, so the property schema is stable.
fn cad_attributes(raw: &Map<String, Value>) -> Map<String, Value> {
    let mut out = Map::new();
    out.insert("layer".to_string(), raw.get("Layer").cloned().unwrap_or(Value::Null));
    out.insert(
        "linetype".to_string(),
        raw.get("Linetype").cloned().unwrap_or(Value::Null),
    );
    out.insert(
        "handle".to_string(),
        raw.get("EntityHandle").cloned().unwrap_or(Value::Null),
    );
    out.insert("text".to_string(), raw.get("Text").cloned().unwrap_or(Value::Null));

    let color = raw
        .get("OGR_STYLE")
        .and_then(Value::as_str)
        .and_then(style_color)
        .map(Value::String)
        .unwrap_or(Value::Null);
    out.insert("color".to_string(), color);

    out
}

/// Pulls the pen/brush colour out of an OGR style string, e.g.
/// `PEN(c:#ff0000,w:1px)` or `BRUSH(fc:#00ff00)`.
fn style_color(style: &str) -> Option<String> {
    let idx = style.find("c:#")?;
    let hex: String = style[idx + 2..]
        .chars()
        .take_while(|c| *c == '#' || c.is_ascii_hexdigit())
        .collect();
    if hex.len() >= 7 {
        Some(hex[..7].to_string())
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw(entries: &[(&str, &str)]) -> Map<String, Value> {
        entries
            .iter()
            .map(|(k, v)| (k.to_string(), Value::String(v.to_string())))
            .collect()
    }

    #[test]
    fn maps_the_five_contract_attributes() {
        let props = cad_attributes(&raw(&[
            ("Layer", "WALLS"),
            ("Linetype", "DASHED"),
            ("EntityHandle", "1A3F"),
            ("Text", "Room 101"),
            ("OGR_STYLE", "PEN(c:#ff00aa,w:2px)"),
            ("SubClasses", "AcDbEntity:AcDbLine"),
        ]));

        assert_eq!(props.len(), 5);
        assert_eq!(props["layer"], "WALLS");
        assert_eq!(props["linetype"], "DASHED");
        assert_eq!(props["handle"], "1A3F");
        assert_eq!(props["text"], "Room 101");
        assert_eq!(props["color"], "#ff00aa");
        assert!(props.get("SubClasses").is_none());
    }

    #[test]
    fn missing_attributes_become_null() {
        let props = cad_attributes(&raw(&[("Layer", "0")]));
        assert_eq!(props["layer"], "0");
        assert_eq!(props["linetype"], Value::Null);
        assert_eq!(props["color"], Value::Null);
        assert_eq!(props["text"], Value::Null);
    }

    #[test]
    fn style_color_parsing() {
        assert_eq!(style_color("PEN(c:#ff0000)"), Some("#ff0000".to_string()));
        assert_eq!(
            style_color("BRUSH(fc:#00ff00);PEN(c:#0000ff,w:1px)"),
            Some("#00ff00".to_string())
        );
        assert_eq!(style_color("PEN(w:1px)"), None);
        assert_eq!(style_color("PEN(c:#ff)"), None);
    }
}
