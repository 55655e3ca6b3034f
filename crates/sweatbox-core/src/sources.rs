//! Capability interfaces for external data plus their local implementations.
//!
//! Remote implementations live in the `sweatbox-sources` crate. The engine
//! only depends on these traits and always has a local answer to fall back on.

use crate::error::ExternalSourceError;
use crate::flight_plan::{tables, AircraftCategory};
use crate::spatial::GeoPoint;
use std::collections::BTreeMap;

pub const DEFAULT_FIELD_ELEVATION_FT: i32 = 1000;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FlightPlanQuery {
    pub departure: String,
    pub arrival: Option<String>,
    pub airline: Option<String>,
    pub category: AircraftCategory,
}

/// A flight plan as reported by a source. Every field may be missing.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SourcedPlan {
    pub callsign: Option<String>,
    /// Type with equipment suffix, e.g. `B738/L`.
    pub aircraft_type: Option<String>,
    pub route: Option<String>,
    pub cruise_altitude_ft: Option<u32>,
    pub cruise_speed_kt: Option<u32>,
}

pub trait FlightPlanSource: Send + Sync {
    fn name(&self) -> &str;

    fn candidates(&self, query: &FlightPlanQuery) -> Result<Vec<SourcedPlan>, ExternalSourceError>;
}

pub trait ElevationSource: Send + Sync {
    fn name(&self) -> &str;

    fn field_elevation_ft(
        &self,
        icao: &str,
        reference: Option<GeoPoint>,
    ) -> Result<Option<i32>, ExternalSourceError>;
}

/// Offline flight plans derived only from the query, so equal queries give equal plans.
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalFlightPlanSource;

impl LocalFlightPlanSource {
    pub fn plan_for(&self, query: &FlightPlanQuery) -> SourcedPlan {
        let mut hash = Fnv1a::default();
        hash.write(&query.departure);
        hash.write(query.arrival.as_deref().unwrap_or_default());
        hash.write(query.airline.as_deref().unwrap_or_default());
        let h = hash.finish();

        match query.category {
            AircraftCategory::GeneralAviation => {
                let base = pick(tables::COMMON_GA_AIRCRAFT, h);
                SourcedPlan {
                    callsign: None,
                    aircraft_type: Some(format!("{base}/G")),
                    route: Some("DCT".into()),
                    cruise_altitude_ft: Some(3000 + ((h >> 8) % 51) as u32 * 100),
                    cruise_speed_kt: Some(tables::cruise_speed(base, "G")),
                }
            }
            AircraftCategory::Airline => {
                let base = pick(tables::COMMON_JETS, h);
                SourcedPlan {
                    callsign: None,
                    aircraft_type: Some(format!("{base}/L")),
                    route: Some("DCT".into()),
                    cruise_altitude_ft: Some(pick(tables::JET_CRUISE_ALTITUDES, h >> 16)),
                    cruise_speed_kt: Some(tables::cruise_speed(base, "L")),
                }
            }
        }
    }
}

impl FlightPlanSource for LocalFlightPlanSource {
    fn name(&self) -> &str {
        "local"
    }

    fn candidates(&self, query: &FlightPlanQuery) -> Result<Vec<SourcedPlan>, ExternalSourceError> {
        Ok(vec![self.plan_for(query)])
    }
}

/// Elevations known without network access: configured values, then the
/// procedure file's airport record.
#[derive(Debug, Clone, Default)]
pub struct LocalElevationSource {
    known: BTreeMap<String, i32>,
}

impl LocalElevationSource {
    pub fn new(known: BTreeMap<String, i32>) -> Self {
        Self { known }
    }

    pub fn with(mut self, icao: &str, elevation_ft: Option<i32>) -> Self {
        if let Some(ft) = elevation_ft {
            self.known.entry(icao.to_string()).or_insert(ft);
        }
        self
    }
}

impl ElevationSource for LocalElevationSource {
    fn name(&self) -> &str {
        "local"
    }

    fn field_elevation_ft(&self, icao: &str, _reference: Option<GeoPoint>) -> Result<Option<i32>, ExternalSourceError> {
        Ok(self.known.get(icao).copied())
    }
}

/// Primary source first, then local, then [`DEFAULT_FIELD_ELEVATION_FT`].
pub fn field_elevation(
    primary: Option<&dyn ElevationSource>,
    local: &LocalElevationSource,
    icao: &str,
    reference: Option<GeoPoint>,
) -> i32 {
    if let Some(source) = primary {
        match source.field_elevation_ft(icao, reference) {
            Ok(Some(ft)) => return ft,
            Ok(None) => tracing::debug!("{} has no elevation for {}", source.name(), icao),
            Err(err) => tracing::warn!("elevation lookup via {} failed for {}: {}", source.name(), icao, err),
        }
    }
    local
        .field_elevation_ft(icao, reference)
        .ok()
        .flatten()
        .unwrap_or(DEFAULT_FIELD_ELEVATION_FT)
}

fn pick<T: Copy>(items: &[T], h: u64) -> T {
    items[(h % items.len() as u64) as usize]
}

/// FNV-1a, stable across builds and platforms.
#[derive(Debug, Clone, Copy)]
struct Fnv1a(u64);

impl Default for Fnv1a {
    fn default() -> Self {
        Self(0xcbf2_9ce4_8422_2325)
    }
}

impl Fnv1a {
    fn write(&mut self, text: &str) {
        for byte in text.bytes().chain(std::iter::once(0xff)) {
            self.0 ^= u64::from(byte);
            self.0 = self.0.wrapping_mul(0x0000_0100_0000_01b3);
        }
    }

    fn finish(&self) -> u64 {
        self.0
    }
}
