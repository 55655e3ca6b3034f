//! Airport geometry parser.
//!
//! Reads a GeoJSON feature collection where every feature carries a
//! `properties.type` of `parking` or `runway`:
//!
//! - parking: point geometry `[lon, lat]`, `name`, `heading`
//! - runway: line-string geometry, `name` like `"7L - 25R"`, optional
//!   `threshold` displacement in feet (a number for both ends, `"a/b"`,
//!   or an object keyed by end designator)
//!
//! Malformed features are skipped and reported as warnings.

use crate::airport::{normalize_runway, Airport, ParkingSpot, Runway, RunwayEnd};
use crate::error::{GenerationError, Parsed, Result, Warning};
use crate::spatial::{self, GeoPoint, FEET_PER_NM};
use serde_json::Value;
use std::collections::HashSet;
use std::path::Path;

pub fn load_airport(path: &Path, icao: &str) -> Result<Parsed<Airport>> {
    let text = std::fs::read_to_string(path).map_err(|err| GenerationError::io(path, err))?;
    parse_airport(icao, &path.display().to_string(), &text)
}

pub fn parse_airport(icao: &str, origin: &str, text: &str) -> Result<Parsed<Airport>> {
    let document: Value = serde_json::from_str(text)
        .map_err(|err| GenerationError::parse(origin, err.line(), err.to_string()))?;
    let features = document
        .get("features")
        .and_then(Value::as_array)
        .ok_or_else(|| GenerationError::parse(origin, 1, "missing 'features' array"))?;

    let mut airport = Airport::new(icao);
    let mut warnings = Vec::new();
    let mut parking_names = HashSet::new();
    let mut runway_ends = HashSet::new();

    for (index, feature) in features.iter().enumerate() {
        let properties = feature.get("properties").unwrap_or(&Value::Null);
        let kind = properties.get("type").and_then(Value::as_str).unwrap_or_default();
        let outcome = match kind {
            "parking" => parse_parking(feature, properties).and_then(|spot| {
                if parking_names.insert(spot.name.clone()) {
                    airport.parking.push(spot);
                    Ok(())
                } else {
                    Err(format!("duplicate parking spot '{}'", spot.name))
                }
            }),
            "runway" => parse_runway(feature, properties).and_then(|runway| {
                let duplicate = runway
                    .ends
                    .iter()
                    .find(|end| runway_ends.contains(&normalize_runway(&end.designator)))
                    .map(|end| end.designator.clone());
                match duplicate {
                    Some(designator) => Err(format!("duplicate runway end '{designator}'")),
                    None => {
                        for end in &runway.ends {
                            runway_ends.insert(normalize_runway(&end.designator));
                        }
                        airport.runways.push(runway);
                        Ok(())
                    }
                }
            }),
            _ => Ok(()),
        };
        if let Err(message) = outcome {
            tracing::debug!("{}: feature {} skipped: {}", origin, index, message);
            warnings.push(Warning::new(origin, format!("feature {index}: {message}")));
        }
    }

    if airport.parking.is_empty() && airport.runways.is_empty() {
        warnings.push(Warning::new(origin, "no parking spots or runways found"));
    }

    Ok(Parsed { value: airport, warnings })
}

fn parse_parking(feature: &Value, properties: &Value) -> std::result::Result<ParkingSpot, String> {
    let name = properties
        .get("name")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|n| !n.is_empty())
        .ok_or("parking feature without a name")?;
    let heading = properties
        .get("heading")
        .and_then(number)
        .ok_or_else(|| format!("parking '{name}' has no heading"))?;
    let geometry = feature.get("geometry").unwrap_or(&Value::Null);
    if geometry.get("type").and_then(Value::as_str) != Some("Point") {
        return Err(format!("parking '{name}' is not a point"));
    }
    let position = geometry
        .get("coordinates")
        .and_then(coordinate)
        .ok_or_else(|| format!("parking '{name}' has invalid coordinates"))?;

    Ok(ParkingSpot {
        name: name.to_string(),
        position,
        heading: spatial::normalize_heading(heading),
    })
}

fn parse_runway(feature: &Value, properties: &Value) -> std::result::Result<Runway, String> {
    let name = properties
        .get("name")
        .and_then(Value::as_str)
        .ok_or("runway feature without a name")?;
    let (first, second) = name
        .split_once('-')
        .map(|(a, b)| (a.trim(), b.trim()))
        .filter(|(a, b)| !a.is_empty() && !b.is_empty())
        .ok_or_else(|| format!("runway name '{name}' is not an end pair"))?;

    let geometry = feature.get("geometry").unwrap_or(&Value::Null);
    let points: Vec<GeoPoint> = geometry
        .get("coordinates")
        .and_then(Value::as_array)
        .map(|coords| coords.iter().filter_map(coordinate).collect())
        .unwrap_or_default();
    let (Some(&start), Some(&end)) = (points.first(), points.last()) else {
        return Err(format!("runway '{name}' has no coordinates"));
    };
    if points.len() < 2 || spatial::distance_nm(start, end) <= f64::EPSILON {
        return Err(format!("runway '{name}' needs two distinct endpoints"));
    }

    let (offset_first, offset_second) = threshold_offsets(properties.get("threshold"), first, second)
        .map_err(|err| format!("runway '{name}': {err}"))?;

    Ok(Runway {
        ends: [
            runway_end(first, start, end, offset_first),
            runway_end(second, end, start, offset_second),
        ],
    })
}

fn runway_end(designator: &str, from: GeoPoint, toward: GeoPoint, displaced_ft: f64) -> RunwayEnd {
    let heading = spatial::bearing(from, toward);
    RunwayEnd {
        designator: designator.to_string(),
        end_point: from,
        threshold: spatial::destination_point(from, heading, displaced_ft / FEET_PER_NM),
        heading,
        displaced_threshold_ft: displaced_ft,
    }
}

fn threshold_offsets(value: Option<&Value>, first: &str, second: &str) -> std::result::Result<(f64, f64), String> {
    let offsets = match value {
        None | Some(Value::Null) => (0.0, 0.0),
        Some(Value::Number(n)) => {
            let ft = n.as_f64().unwrap_or(0.0);
            (ft, ft)
        }
        Some(Value::String(s)) if s.trim().is_empty() => (0.0, 0.0),
        Some(Value::String(s)) => {
            let parse = |part: &str| part.trim().parse::<f64>().map_err(|_| format!("bad threshold '{s}'"));
            match s.split_once('/') {
                Some((a, b)) => (parse(a)?, parse(b)?),
                None => {
                    let ft = parse(s)?;
                    (ft, ft)
                }
            }
        }
        Some(Value::Object(map)) => (
            map.get(first).and_then(number).unwrap_or(0.0),
            map.get(second).and_then(number).unwrap_or(0.0),
        ),
        Some(other) => return Err(format!("unsupported threshold value {other}")),
    };
    if offsets.0 < 0.0 || offsets.1 < 0.0 {
        return Err("negative threshold displacement".to_string());
    }
    Ok(offsets)
}

pub(crate) fn coordinate(value: &Value) -> Option<GeoPoint> {
    let pair = value.as_array()?;
    let lon = pair.first()?.as_f64()?;
    let lat = pair.get(1)?.as_f64()?;
    let point = GeoPoint::new(lat, lon);
    (point.is_finite() && lat.abs() <= 90.0 && lon.abs() <= 180.0).then_some(point)
}

fn number(value: &Value) -> Option<f64> {
    let parsed = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    parsed.filter(|v| v.is_finite())
}
