//! Great-circle math for spot placement.
//!
//! All functions use a spherical Earth with a mean radius of 3440.065 NM:
//! haversine distance, initial great-circle bearing and the spherical
//! destination-point formula. Headings are true degrees in `[0, 360)`.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

pub const EARTH_RADIUS_NM: f64 = 3440.065;
pub const FEET_PER_NM: f64 = 6076.12;
pub const DEFAULT_GLIDESLOPE_DEG: f64 = 3.0;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub lat: f64,
    pub lon: f64,
}

impl GeoPoint {
    pub const fn new(lat: f64, lon: f64) -> Self {
        Self { lat, lon }
    }

    pub fn is_finite(&self) -> bool {
        self.lat.is_finite() && self.lon.is_finite()
    }
}

/// Normalize any angle in degrees to `[0, 360)`.
pub fn normalize_heading(deg: f64) -> f64 {
    let wrapped = deg.rem_euclid(360.0);
    if wrapped >= 360.0 {
        0.0
    } else {
        wrapped
    }
}

pub fn reciprocal(heading_deg: f64) -> f64 {
    normalize_heading(heading_deg + 180.0)
}

/// Initial bearing from `a` to `b`, true degrees.
pub fn bearing(a: GeoPoint, b: GeoPoint) -> f64 {
    let phi1 = a.lat.to_radians();
    let phi2 = b.lat.to_radians();
    let delta_lambda = (b.lon - a.lon).to_radians();

    let x = delta_lambda.sin() * phi2.cos();
    let y = phi1.cos() * phi2.sin() - phi1.sin() * phi2.cos() * delta_lambda.cos();

    normalize_heading(x.atan2(y).to_degrees())
}

pub fn distance_nm(a: GeoPoint, b: GeoPoint) -> f64 {
    let phi1 = a.lat.to_radians();
    let phi2 = b.lat.to_radians();
    let dphi = (b.lat - a.lat).to_radians();
    let dlambda = (b.lon - a.lon).to_radians();
    let h = (dphi / 2.0).sin().powi(2) + phi1.cos() * phi2.cos() * (dlambda / 2.0).sin().powi(2);
    2.0 * EARTH_RADIUS_NM * h.sqrt().atan2((1.0 - h).sqrt())
}

/// Point reached travelling `distance_nm` from `origin` on `bearing_deg`.
pub fn destination_point(origin: GeoPoint, bearing_deg: f64, distance_nm: f64) -> GeoPoint {
    if distance_nm.abs() <= f64::EPSILON {
        return origin;
    }

    let lat1 = origin.lat.to_radians();
    let lon1 = origin.lon.to_radians();
    let brg = bearing_deg.to_radians();
    let angular_distance = distance_nm / EARTH_RADIUS_NM;

    let sin_lat1 = lat1.sin();
    let cos_lat1 = lat1.cos();
    let sin_ad = angular_distance.sin();
    let cos_ad = angular_distance.cos();

    let sin_lat2 = sin_lat1 * cos_ad + cos_lat1 * sin_ad * brg.cos();
    let lat2 = sin_lat2.clamp(-1.0, 1.0).asin();

    let y = brg.sin() * sin_ad * cos_lat1;
    let x = cos_ad - sin_lat1 * sin_lat2;
    let mut lon2 = lon1 + y.atan2(x);
    lon2 =
        (lon2 + std::f64::consts::PI).rem_euclid(2.0 * std::f64::consts::PI) - std::f64::consts::PI;

    GeoPoint::new(lat2.to_degrees(), lon2.to_degrees())
}

/// Altitude on a constant-angle approach path at `distance_nm` from the threshold.
pub fn glideslope_altitude(field_elevation_ft: f64, distance_nm: f64, angle_deg: f64) -> f64 {
    field_elevation_ft + distance_nm * FEET_PER_NM * angle_deg.to_radians().tan()
}

/// Mean of a set of points. `None` for an empty set.
pub fn centroid(points: &[GeoPoint]) -> Option<GeoPoint> {
    if points.is_empty() {
        return None;
    }
    let n = points.len() as f64;
    let lat = points.iter().map(|p| p.lat).sum::<f64>() / n;
    let lon = points.iter().map(|p| p.lon).sum::<f64>() / n;
    Some(GeoPoint::new(lat, lon))
}

/// Fix-radial-distance reference, written `EAGUL090012`: fix, 3-digit radial, 3-digit NM.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frd {
    pub fix: String,
    pub radial_deg: u16,
    pub distance_nm: u16,
}

impl Frd {
    pub fn new(fix: impl Into<String>, radial_deg: u16, distance_nm: u16) -> Self {
        Self {
            fix: fix.into(),
            radial_deg: radial_deg % 360,
            distance_nm,
        }
    }

    /// Position of this reference given the fix's coordinates.
    pub fn resolve(&self, fix_position: GeoPoint) -> GeoPoint {
        destination_point(fix_position, f64::from(self.radial_deg), f64::from(self.distance_nm))
    }
}

impl fmt::Display for Frd {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{:03}{:03}", self.fix, self.radial_deg, self.distance_nm)
    }
}

impl FromStr for Frd {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.len() < 8 || !s.is_ascii() {
            return Err(format!("'{s}' is not fix-radial-distance notation"));
        }
        let (fix, digits) = s.split_at(s.len() - 6);
        if !digits.bytes().all(|b| b.is_ascii_digit()) || !fix.bytes().all(|b| b.is_ascii_alphanumeric()) {
            return Err(format!("'{s}' is not fix-radial-distance notation"));
        }
        let radial: u16 = digits[..3].parse().map_err(|_| format!("bad radial in '{s}'"))?;
        let distance: u16 = digits[3..].parse().map_err(|_| format!("bad distance in '{s}'"))?;
        if radial > 360 {
            return Err(format!("radial {radial} out of range in '{s}'"));
        }
        Ok(Frd::new(fix, radial, distance))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const KPHX: GeoPoint = GeoPoint::new(33.4343, -112.0116);

    #[test]
    fn test_distance_one_degree_latitude() {
        let d = distance_nm(GeoPoint::new(0.0, 0.0), GeoPoint::new(1.0, 0.0));
        assert!((d - 60.04).abs() < 0.05, "got {d}");
    }

    #[test]
    fn test_distance_same_point() {
        assert!(distance_nm(KPHX, KPHX) < 1e-9);
    }

    #[test]
    fn test_bearing_cardinals() {
        let origin = GeoPoint::new(0.0, 0.0);
        assert!(bearing(origin, GeoPoint::new(1.0, 0.0)).abs() < 1e-9);
        assert!((bearing(origin, GeoPoint::new(0.0, 1.0)) - 90.0).abs() < 1e-9);
        assert!((bearing(origin, GeoPoint::new(-1.0, 0.0)) - 180.0).abs() < 1e-9);
        assert!((bearing(origin, GeoPoint::new(0.0, -1.0)) - 270.0).abs() < 1e-9);
    }

    #[test]
    fn test_destination_point_round_trips_distance_and_bearing() {
        let p = destination_point(KPHX, 77.0, 12.5);
        assert!((distance_nm(KPHX, p) - 12.5).abs() < 0.001);
        assert!((bearing(KPHX, p) - 77.0).abs() < 0.05);
    }

    #[test]
    fn test_destination_point_zero_distance() {
        assert_eq!(destination_point(KPHX, 123.0, 0.0), KPHX);
    }

    #[test]
    fn test_glideslope_three_degrees() {
        let alt = glideslope_altitude(1000.0, 5.0, DEFAULT_GLIDESLOPE_DEG);
        let expected = 1000.0 + 5.0 * 6076.12 * 3.0_f64.to_radians().tan();
        assert!((alt - expected).abs() < 1e-9);
        assert!((alt - 2592.2).abs() < 1.0);
    }

    #[test]
    fn test_reciprocal_wraps() {
        assert_eq!(reciprocal(70.0), 250.0);
        assert_eq!(reciprocal(250.0), 70.0);
        assert_eq!(reciprocal(180.0), 0.0);
    }

    #[test]
    fn test_centroid() {
        let c = centroid(&[GeoPoint::new(1.0, 1.0), GeoPoint::new(3.0, 5.0)]).unwrap();
        assert_eq!(c, GeoPoint::new(2.0, 3.0));
        assert!(centroid(&[]).is_none());
    }

    #[test]
    fn test_frd_parse_and_display() {
        let frd: Frd = "PINNG112010".parse().unwrap();
        assert_eq!(frd.fix, "PINNG");
        assert_eq!(frd.radial_deg, 112);
        assert_eq!(frd.distance_nm, 10);
        assert_eq!(frd.to_string(), "PINNG112010");
        assert!("PINNG".parse::<Frd>().is_err());
        assert!("PINNG11201X".parse::<Frd>().is_err());
    }

    #[test]
    fn test_frd_resolve() {
        let frd = Frd::new("TEST", 90, 10);
        let p = frd.resolve(KPHX);
        assert!((distance_nm(KPHX, p) - 10.0).abs() < 0.001);
    }
}
