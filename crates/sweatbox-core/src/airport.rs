//! Airport surface model: parking spots and runways.

use crate::spatial::{self, GeoPoint};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParkingSpot {
    pub name: String,
    pub position: GeoPoint,
    pub heading: f64,
}

impl ParkingSpot {
    /// Spots with "GA" anywhere in the name are general-aviation ramps.
    pub fn is_general_aviation(&self) -> bool {
        self.name.to_ascii_uppercase().contains("GA")
    }
}

/// One usable direction of a runway.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunwayEnd {
    pub designator: String,
    /// Runway end as drawn in the geometry file.
    pub end_point: GeoPoint,
    /// Landing threshold; differs from `end_point` when the threshold is displaced.
    pub threshold: GeoPoint,
    pub heading: f64,
    pub displaced_threshold_ft: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Runway {
    pub ends: [RunwayEnd; 2],
}

impl Runway {
    pub fn name(&self) -> String {
        format!("{} - {}", self.ends[0].designator, self.ends[1].designator)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Airport {
    pub icao: String,
    pub parking: Vec<ParkingSpot>,
    pub runways: Vec<Runway>,
}

impl Airport {
    pub fn new(icao: impl Into<String>) -> Self {
        Self {
            icao: icao.into(),
            ..Default::default()
        }
    }

    pub fn runway_end(&self, designator: &str) -> Option<&RunwayEnd> {
        let wanted = normalize_runway(designator);
        self.runway_ends().find(|end| normalize_runway(&end.designator) == wanted)
    }

    pub fn runway_ends(&self) -> impl Iterator<Item = &RunwayEnd> {
        self.runways.iter().flat_map(|r| r.ends.iter())
    }

    pub fn general_aviation_spots(&self) -> impl Iterator<Item = &ParkingSpot> {
        self.parking.iter().filter(|p| p.is_general_aviation())
    }

    /// Reference point: mean of runway end points, else of parking spots.
    pub fn reference_point(&self) -> Option<GeoPoint> {
        let runway_points: Vec<GeoPoint> = self.runway_ends().map(|e| e.end_point).collect();
        spatial::centroid(&runway_points).or_else(|| {
            let parking: Vec<GeoPoint> = self.parking.iter().map(|p| p.position).collect();
            spatial::centroid(&parking)
        })
    }

    /// Identifier without the `K` prefix used by US ICAO codes.
    pub fn short_id(&self) -> &str {
        short_airport_id(&self.icao)
    }
}

pub fn short_airport_id(icao: &str) -> &str {
    match icao.strip_prefix('K') {
        Some(rest) if icao.len() == 4 => rest,
        _ => icao,
    }
}

/// `"07L"`, `"RW7L"` and `"7l"` all become `"7L"`.
pub fn normalize_runway(designator: &str) -> String {
    let upper = designator.trim().to_ascii_uppercase();
    let stripped = upper.strip_prefix("RW").unwrap_or(&upper);
    let trimmed = stripped.trim_start_matches('0');
    if trimmed.is_empty() || !trimmed.starts_with(|c: char| c.is_ascii_digit()) {
        stripped.to_string()
    } else {
        trimmed.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spot(name: &str) -> ParkingSpot {
        ParkingSpot {
            name: name.into(),
            position: GeoPoint::new(33.0, -112.0),
            heading: 0.0,
        }
    }

    #[test]
    fn test_general_aviation_detection() {
        assert!(spot("GA1").is_general_aviation());
        assert!(spot("West ga ramp 3").is_general_aviation());
        assert!(!spot("A12").is_general_aviation());
    }

    #[test]
    fn test_normalize_runway() {
        assert_eq!(normalize_runway("07L"), "7L");
        assert_eq!(normalize_runway("RW25R"), "25R");
        assert_eq!(normalize_runway(" 8 "), "8");
    }

    #[test]
    fn test_short_id() {
        assert_eq!(short_airport_id("KPHX"), "PHX");
        assert_eq!(short_airport_id("PHNL"), "PHNL");
        assert_eq!(short_airport_id("KX"), "KX");
    }

    #[test]
    fn test_reference_point_falls_back_to_parking() {
        let mut airport = Airport::new("KPHX");
        airport.parking.push(spot("A1"));
        assert_eq!(airport.reference_point(), Some(GeoPoint::new(33.0, -112.0)));
        assert!(Airport::new("KXXX").reference_point().is_none());
    }
}
