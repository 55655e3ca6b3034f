//! Terminal procedure model: fixes, STAR/SID legs and altitude restrictions.

use crate::spatial::GeoPoint;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Altitude window. Either bound may be open.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AltitudeRestriction {
    pub min_ft: Option<u32>,
    pub max_ft: Option<u32>,
}

impl AltitudeRestriction {
    pub fn at(ft: u32) -> Self {
        Self { min_ft: Some(ft), max_ft: Some(ft) }
    }

    pub fn at_or_above(ft: u32) -> Self {
        Self { min_ft: Some(ft), max_ft: None }
    }

    pub fn at_or_below(ft: u32) -> Self {
        Self { min_ft: None, max_ft: Some(ft) }
    }

    /// Bounds are swapped if given out of order.
    pub fn between(a: u32, b: u32) -> Self {
        Self { min_ft: Some(a.min(b)), max_ft: Some(a.max(b)) }
    }

    pub fn contains(&self, ft: u32) -> bool {
        self.min_ft.map_or(true, |min| ft >= min) && self.max_ft.map_or(true, |max| ft <= max)
    }

    /// Intersect with `[lo, hi]`. The result never extends past the band; when the
    /// two do not overlap the band edge nearest the restriction is returned.
    pub fn narrow(&self, lo: u32, hi: u32) -> (u32, u32) {
        let new_lo = self.min_ft.map_or(lo, |min| min.max(lo));
        let new_hi = self.max_ft.map_or(hi, |max| max.min(hi));
        if new_lo <= new_hi {
            return (new_lo, new_hi);
        }
        if self.max_ft.is_some_and(|max| max < lo) {
            (lo, lo)
        } else {
            (hi, hi)
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProcedureKind {
    Arrival,
    Departure,
}

/// Which part of a procedure a leg belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Segment {
    Enroute,
    Common,
    Runway,
}

impl Segment {
    /// Flying order: STARs run enroute → common → runway, SIDs the reverse.
    fn order(self, kind: ProcedureKind) -> u8 {
        match (kind, self) {
            (ProcedureKind::Arrival, Segment::Enroute) | (ProcedureKind::Departure, Segment::Runway) => 0,
            (_, Segment::Common) => 1,
            _ => 2,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcedureLeg {
    pub transition: String,
    pub segment: Segment,
    pub fix: String,
    pub restriction: Option<AltitudeRestriction>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Procedure {
    pub name: String,
    pub kind: ProcedureKind,
    pub legs: Vec<ProcedureLeg>,
}

impl Procedure {
    pub fn new(name: impl Into<String>, kind: ProcedureKind) -> Self {
        Self { name: name.into(), kind, legs: Vec::new() }
    }

    /// Re-sort legs into flying order, keeping file order within a segment.
    pub fn order_legs(&mut self) {
        let kind = self.kind;
        self.legs.sort_by_key(|leg| leg.segment.order(kind));
    }

    /// Unique fix names in flying order.
    pub fn waypoint_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = Vec::new();
        for leg in &self.legs {
            if !names.contains(&leg.fix.as_str()) {
                names.push(&leg.fix);
            }
        }
        names
    }

    pub fn contains_fix(&self, fix: &str) -> bool {
        self.legs.iter().any(|leg| leg.fix == fix)
    }

    /// Tightest restriction published for `fix` on this procedure.
    pub fn restriction_at(&self, fix: &str) -> Option<AltitudeRestriction> {
        self.legs
            .iter()
            .filter(|leg| leg.fix == fix)
            .find_map(|leg| leg.restriction)
    }

    /// Space-separated fixes flown from `fix` to the end of the procedure.
    /// Other transitions of the segment `fix` sits on are not part of the path.
    pub fn route_from(&self, fix: &str) -> Option<String> {
        let start = self.legs.iter().position(|leg| leg.fix == fix)?;
        let origin = &self.legs[start];
        let mut names: Vec<&str> = Vec::new();
        for leg in &self.legs[start..] {
            if leg.segment == origin.segment && leg.transition != origin.transition {
                continue;
            }
            if !names.contains(&leg.fix.as_str()) {
                names.push(&leg.fix);
            }
        }
        Some(names.join(" "))
    }

    /// Filed-route form: `ENTRY.STAR` for arrivals, `SID.EXIT` for departures.
    pub fn route_string(&self) -> String {
        let names = self.waypoint_names();
        match self.kind {
            ProcedureKind::Arrival => match names.first() {
                Some(entry) => format!("{}.{}", entry, self.name),
                None => self.name.clone(),
            },
            ProcedureKind::Departure => match names.last() {
                Some(exit) => format!("{}.{}", self.name, exit),
                None => self.name.clone(),
            },
        }
    }
}

/// A fix as seen through one procedure.
#[derive(Debug, Clone, PartialEq)]
pub struct Waypoint {
    pub name: String,
    pub position: GeoPoint,
    pub restriction: Option<AltitudeRestriction>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RunwayProcedures {
    pub arrivals: BTreeMap<String, Procedure>,
    pub departures: BTreeMap<String, Procedure>,
    pub final_approach_fix_ft: Option<u32>,
}

/// Everything parsed from the procedure file for one airport, keyed by runway.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProcedureSet {
    pub airport: String,
    pub field_elevation_ft: Option<i32>,
    pub reference_point: Option<GeoPoint>,
    /// Reference points of every airport in the file, this one included.
    pub airports: BTreeMap<String, GeoPoint>,
    pub fixes: BTreeMap<String, GeoPoint>,
    pub runway_thresholds: BTreeMap<String, GeoPoint>,
    pub by_runway: BTreeMap<String, RunwayProcedures>,
}

impl ProcedureSet {
    pub fn empty(airport: impl Into<String>) -> Self {
        Self { airport: airport.into(), ..Default::default() }
    }

    pub fn fix_position(&self, name: &str) -> Option<GeoPoint> {
        self.fixes.get(name).copied()
    }

    /// Arrivals through `fix` serving any of `runways` (all runways when empty).
    /// Each procedure is reported once, first runway wins.
    pub fn arrivals_via(&self, fix: &str, runways: &[String]) -> Vec<&Procedure> {
        let mut found: Vec<&Procedure> = Vec::new();
        for (runway, procs) in &self.by_runway {
            if !runways.is_empty() && !runways.contains(runway) {
                continue;
            }
            for procedure in procs.arrivals.values() {
                if procedure.contains_fix(fix) && !found.iter().any(|p| p.name == procedure.name) {
                    found.push(procedure);
                }
            }
        }
        found
    }

    pub fn arrival(&self, name: &str, runways: &[String]) -> Option<&Procedure> {
        self.by_runway
            .iter()
            .filter(|(runway, _)| runways.is_empty() || runways.contains(runway))
            .find_map(|(_, procs)| procs.arrivals.get(name))
    }

    pub fn departures_for(&self, runway: &str) -> Vec<&Procedure> {
        self.by_runway
            .get(runway)
            .map(|procs| procs.departures.values().collect())
            .unwrap_or_default()
    }

    pub fn waypoint(&self, fix: &str, procedure: Option<&Procedure>) -> Option<Waypoint> {
        let position = self.fix_position(fix)?;
        Some(Waypoint {
            name: fix.to_string(),
            position,
            restriction: procedure.and_then(|p| p.restriction_at(fix)),
        })
    }
}
