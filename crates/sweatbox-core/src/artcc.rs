//! ARTCC boundaries and the lookup that decides which center an airport sits in.
//!
//! Boundaries come from a GeoJSON feature collection. Each feature has a
//! `properties.id` such as `ZAB` and a `Polygon` or `MultiPolygon` geometry in
//! `[lon, lat]` order. Only the exterior ring of each polygon is used.

use crate::error::{GenerationError, Parsed, Result, Warning};
use crate::geojson::coordinate;
use crate::spatial::GeoPoint;
use serde_json::Value;
use std::path::Path;

/// Used when no boundary contains the airport.
pub const DEFAULT_ARTCC: &str = "ZAB";
pub const BOUNDARIES_FILE: &str = "artcc_boundaries.geojson";

#[derive(Debug, Clone, PartialEq)]
pub struct ArtccBoundary {
    pub id: String,
    /// Exterior rings.
    pub polygons: Vec<Vec<GeoPoint>>,
}

impl ArtccBoundary {
    pub fn contains(&self, point: GeoPoint) -> bool {
        self.polygons.iter().any(|ring| ring_contains(ring, point))
    }
}

/// Ray casting on lat/lon treated as planar coordinates.
fn ring_contains(ring: &[GeoPoint], point: GeoPoint) -> bool {
    let n = ring.len();
    if n < 3 {
        return false;
    }
    let mut inside = false;
    let mut j = n - 1;
    for i in 0..n {
        let (yi, xi) = (ring[i].lat, ring[i].lon);
        let (yj, xj) = (ring[j].lat, ring[j].lon);
        if ((yi > point.lat) != (yj > point.lat)) && (point.lon < (xj - xi) * (point.lat - yi) / (yj - yi) + xi) {
            inside = !inside;
        }
        j = i;
    }
    inside
}

/// First boundary containing `point`.
pub fn locate(boundaries: &[ArtccBoundary], point: GeoPoint) -> Option<&ArtccBoundary> {
    boundaries.iter().find(|boundary| boundary.contains(point))
}

pub fn load_boundaries(path: &Path) -> Result<Parsed<Vec<ArtccBoundary>>> {
    let text = std::fs::read_to_string(path).map_err(|err| GenerationError::io(path, err))?;
    parse_boundaries(&path.display().to_string(), &text)
}

pub fn parse_boundaries(origin: &str, text: &str) -> Result<Parsed<Vec<ArtccBoundary>>> {
    let document: Value = serde_json::from_str(text)
        .map_err(|err| GenerationError::parse(origin, err.line(), err.to_string()))?;
    let features = document
        .get("features")
        .and_then(Value::as_array)
        .ok_or_else(|| GenerationError::parse(origin, 1, "missing 'features' array"))?;

    let mut boundaries = Vec::new();
    let mut warnings = Vec::new();
    for (index, feature) in features.iter().enumerate() {
        match parse_feature(feature) {
            Ok(boundary) => boundaries.push(boundary),
            Err(message) => warnings.push(Warning::new(origin, format!("feature {index}: {message}"))),
        }
    }
    tracing::debug!("{}: {} ARTCC boundaries", origin, boundaries.len());
    Ok(Parsed { value: boundaries, warnings })
}

fn parse_feature(feature: &Value) -> std::result::Result<ArtccBoundary, String> {
    let id = feature
        .get("properties")
        .and_then(|p| p.get("id"))
        .and_then(Value::as_str)
        .map(|id| id.trim().to_ascii_uppercase())
        .filter(|id| !id.is_empty())
        .ok_or("boundary without an id")?;
    let geometry = feature.get("geometry").unwrap_or(&Value::Null);
    let coordinates = geometry.get("coordinates").unwrap_or(&Value::Null);
    let polygons: Vec<&Value> = match geometry.get("type").and_then(Value::as_str) {
        Some("Polygon") => vec![coordinates],
        Some("MultiPolygon") => coordinates.as_array().map(|p| p.iter().collect()).unwrap_or_default(),
        other => return Err(format!("{id}: unsupported geometry {other:?}")),
    };
    let rings: Vec<Vec<GeoPoint>> = polygons
        .into_iter()
        .filter_map(exterior_ring)
        .collect();
    if rings.is_empty() {
        return Err(format!("{id}: no usable polygon"));
    }
    Ok(ArtccBoundary { id, polygons: rings })
}

fn exterior_ring(polygon: &Value) -> Option<Vec<GeoPoint>> {
    let ring = polygon.as_array()?.first()?.as_array()?;
    let points: Vec<GeoPoint> = ring.iter().map(coordinate).collect::<Option<_>>()?;
    (points.len() >= 3).then_some(points)
}


#[cfg(test)]
mod tests {
    use super::fixtures::BOUNDARIES;
    use super::*;

    #[test]
    fn test_locate_by_reference_point() {
        let boundaries = parse_boundaries("artcc", BOUNDARIES).unwrap().value;
        assert_eq!(boundaries.len(), 2);
        let phx = GeoPoint::new(33.4343, -112.0116);
        let lax = GeoPoint::new(33.9425, -118.4081);
        assert_eq!(locate(&boundaries, phx).map(|b| b.id.as_str()), Some("ZAB"));
        assert_eq!(locate(&boundaries, lax).map(|b| b.id.as_str()), Some("ZLA"));
        assert!(locate(&boundaries, GeoPoint::new(40.64, -73.78)).is_none());
    }

    #[test]
    fn test_concave_ring() {
        // U shape open to the north
        let ring = vec![
            GeoPoint::new(0.0, 0.0),
            GeoPoint::new(0.0, 3.0),
            GeoPoint::new(3.0, 3.0),
            GeoPoint::new(3.0, 2.0),
            GeoPoint::new(1.0, 2.0),
            GeoPoint::new(1.0, 1.0),
            GeoPoint::new(3.0, 1.0),
            GeoPoint::new(3.0, 0.0),
        ];
        let boundary = ArtccBoundary { id: "ZZZ".into(), polygons: vec![ring] };
        assert!(boundary.contains(GeoPoint::new(0.5, 1.5)));
        assert!(boundary.contains(GeoPoint::new(2.0, 0.5)));
        assert!(!boundary.contains(GeoPoint::new(2.0, 1.5)));
    }

    #[test]
    fn test_bad_features_become_warnings() {
        let text = r#"{"features": [
            {"properties": {}, "geometry": {"type": "Polygon", "coordinates": [[[0,0],[1,0],[1,1]]]}},
            {"properties": {"id": "ZDV"}, "geometry": {"type": "Point", "coordinates": [0, 0]}},
            {"properties": {"id": "ZLC"}, "geometry": {"type": "Polygon", "coordinates": [[[0,0],[1,0]]]}}
        ]}"#;
        let parsed = parse_boundaries("artcc", text).unwrap();
        assert!(parsed.value.is_empty());
        assert_eq!(parsed.warnings.len(), 3);
        assert!(parse_boundaries("artcc", "{}").is_err());
    }
}
