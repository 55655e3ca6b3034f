//! Aircraft placement: parking, final approach, fixes/FRDs, runways and
//! enroute traffic between airports of a group.
//!
//! Every `place_*` call validates its request (capacity, runways, fixes,
//! bands) before creating any aircraft.

use crate::airline::{ParkingAirlineRules, Resolution};
use crate::airport::{normalize_runway, Airport, ParkingSpot, RunwayEnd};
use crate::artcc::ArtccBoundary;
use crate::error::{GenerationError, Result};
use crate::flight_plan::{FlightPlanSynthesizer, PlanRequest, SynthesizedAircraft};
use crate::models::{
    new_id, Aircraft, Difficulty, GeneratedAircraft, Kinematics, Squawk, StartingConditions, TransponderMode,
};
use crate::procedures::{Procedure, ProcedureSet};
use crate::spatial::{self, Frd, GeoPoint, DEFAULT_GLIDESLOPE_DEG};
use rand::rngs::StdRng;
use rand::seq::{IndexedRandom, SliceRandom};
use rand::Rng;
use std::collections::HashSet;
use std::str::FromStr;

pub const GA_ALTITUDE_BAND_FT: (u32, u32) = (3000, 8000);
const RESERVED_SQUAWKS: &[u16] = &[1200, 7500, 7600, 7700];
/// Octal codes 1000-7777 less the reserved ones.
pub const DISCRETE_SQUAWKS: usize = 7 * 8 * 8 * 8 - RESERVED_SQUAWKS.len();
/// Enroute spawn points are named after a fix no further away than this.
const ENROUTE_FIX_RANGE_NM: f64 = 150.0;
/// Closer than this the fix itself is the spawn point.
const ON_FIX_NM: f64 = 0.5;
/// Candidate spawn points sit at k/20 of the way between two airports.
const ENROUTE_STEPS: u32 = 20;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ParkingFilter {
    #[default]
    Any,
    AirlineOnly,
    GeneralAviationOnly,
}

impl ParkingFilter {
    fn accepts(self, spot: &ParkingSpot) -> bool {
        match self {
            ParkingFilter::Any => true,
            ParkingFilter::AirlineOnly => !spot.is_general_aviation(),
            ParkingFilter::GeneralAviationOnly => spot.is_general_aviation(),
        }
    }

    fn describe(self) -> &'static str {
        match self {
            ParkingFilter::Any => "parking spots",
            ParkingFilter::AirlineOnly => "non-GA parking spots",
            ParkingFilter::GeneralAviationOnly => "GA parking spots",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FinalApproachPlan {
    pub runways: Vec<String>,
    /// Gap between consecutive arrivals on one runway, NM.
    pub separation_nm: (f64, f64),
    pub first_distance_nm: f64,
    pub glideslope_deg: f64,
}

impl Default for FinalApproachPlan {
    fn default() -> Self {
        Self {
            runways: Vec::new(),
            separation_nm: (3.0, 6.0),
            first_distance_nm: 6.0,
            glideslope_deg: DEFAULT_GLIDESLOPE_DEG,
        }
    }
}

/// Spawn point for a fix arrival: `FIX`, `FIX.STAR`, `FIX090010` or `FIX090010.STAR`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArrivalFix {
    pub fix: String,
    pub frd: Option<Frd>,
    pub star: Option<String>,
}

impl ArrivalFix {
    /// Text written to the starting conditions.
    pub fn reference(&self) -> String {
        match &self.frd {
            Some(frd) => frd.to_string(),
            None => self.fix.clone(),
        }
    }
}

impl FromStr for ArrivalFix {
    type Err = GenerationError;

    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim().to_ascii_uppercase();
        let (point, star) = match s.split_once('.') {
            Some((point, star)) if !star.is_empty() => (point.to_string(), Some(star.to_string())),
            Some((point, _)) => (point.to_string(), None),
            None => (s.clone(), None),
        };
        if point.is_empty() {
            return Err(GenerationError::InvalidRequest(format!("empty arrival fix in '{s}'")));
        }
        let frd = point.parse::<Frd>().ok().filter(|frd| frd.fix.len() >= 2);
        let fix = frd.as_ref().map_or_else(|| point.clone(), |frd| frd.fix.clone());
        Ok(ArrivalFix { fix, frd, star })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FixArrivalPlan {
    pub fixes: Vec<ArrivalFix>,
    pub altitude_band_ft: (u32, u32),
    /// Minutes after session start; `None` leaves delays to the scenario.
    pub spawn_delay_minutes: Option<(u32, u32)>,
    /// Runways used to pick a STAR when the fix does not name one.
    pub runways: Vec<String>,
    /// How many of the arrivals are general aviation (taken from the end).
    pub general_aviation: usize,
}

impl Default for FixArrivalPlan {
    fn default() -> Self {
        Self {
            fixes: Vec::new(),
            altitude_band_ft: (7000, 18000),
            spawn_delay_minutes: Some((4, 7)),
            runways: Vec::new(),
            general_aviation: 0,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct EnroutePlan {
    /// Group airports with a known reference point.
    pub airports: Vec<(String, GeoPoint)>,
    /// Spawn points inside this boundary are used first.
    pub boundary: Option<ArtccBoundary>,
}

#[derive(Debug, Clone, PartialEq)]
struct EnrouteSpawn {
    origin: String,
    destination: String,
    fix: String,
    reference: String,
    position: GeoPoint,
    heading: f64,
}

/// Closer aircraft are slower: 140 kt inside 4 NM, +10 kt per NM beyond, 250 kt cap.
pub fn final_approach_speed_kt(distance_nm: f64) -> u32 {
    (140.0 + 10.0 * (distance_nm - 4.0).max(0.0)).min(250.0).round() as u32
}

pub struct PlacementEngine<'a> {
    airport: &'a Airport,
    procedures: &'a ProcedureSet,
    rules: ParkingAirlineRules,
    synth: FlightPlanSynthesizer,
    field_elevation_ft: f64,
    rng: StdRng,
    used_parking: HashSet<String>,
    used_squawks: HashSet<u16>,
    used_spawns: HashSet<String>,
    callsign_suffix: Option<String>,
}

impl<'a> PlacementEngine<'a> {
    pub fn new(
        airport: &'a Airport,
        procedures: &'a ProcedureSet,
        rules: ParkingAirlineRules,
        synth: FlightPlanSynthesizer,
        field_elevation_ft: f64,
        rng: StdRng,
    ) -> Self {
        Self {
            airport,
            procedures,
            rules,
            synth,
            field_elevation_ft,
            rng,
            used_parking: HashSet::new(),
            used_squawks: HashSet::new(),
            used_spawns: HashSet::new(),
            callsign_suffix: None,
        }
    }

    pub fn with_callsign_suffix(mut self, suffix: Option<String>) -> Self {
        self.callsign_suffix = suffix;
        self
    }

    pub fn rng(&mut self) -> &mut StdRng {
        &mut self.rng
    }

    pub fn synthesizer(&self) -> &FlightPlanSynthesizer {
        &self.synth
    }

    pub fn available_parking(&self, filter: ParkingFilter) -> usize {
        self.free_spots(filter).len()
    }

    pub fn check_parking_capacity(&self, filter: ParkingFilter, count: usize) -> Result<()> {
        let available = self.available_parking(filter);
        if count > available {
            return Err(GenerationError::Capacity {
                airport: self.airport.icao.clone(),
                requested: count,
                available,
                pool: filter.describe().to_string(),
            });
        }
        Ok(())
    }

    fn free_spots(&self, filter: ParkingFilter) -> Vec<&'a ParkingSpot> {
        let airport: &'a Airport = self.airport;
        airport
            .parking
            .iter()
            .filter(|spot| filter.accepts(spot) && !self.used_parking.contains(&spot.name))
            .collect()
    }

    /// Departures at distinct unused spots. `sid_runways` enables SID routes.
    pub fn place_at_parking(
        &mut self,
        count: usize,
        filter: ParkingFilter,
        sid_runways: &[String],
    ) -> Result<Vec<GeneratedAircraft>> {
        self.check_parking_capacity(filter, count)?;
        let free = self.free_spots(filter);
        let chosen: Vec<&'a ParkingSpot> = free.choose_multiple(&mut self.rng, count).copied().collect();

        let mut placed = Vec::with_capacity(count);
        for spot in chosen {
            self.used_parking.insert(spot.name.clone());
            let route_hint = self.sid_route(sid_runways);
            let request = PlanRequest {
                departure: self.airport.icao.clone(),
                route_hint,
                callsign_suffix: self.callsign_suffix.clone(),
                ..Default::default()
            };
            let synthesized = match self.rules.resolve(&spot.name, &mut self.rng) {
                Resolution::GeneralAviation => self.synth.general_aviation(&mut self.rng, request),
                Resolution::Airline { code, .. } => self.synth.airline(
                    &mut self.rng,
                    PlanRequest { airline: Some(code), ..request },
                ),
                Resolution::Unassigned => self.synth.airline(&mut self.rng, request),
            };
            tracing::debug!("{} parked at {}", synthesized.callsign, spot.name);
            let kinematics = Kinematics {
                position: spot.position,
                altitude_ft: self.field_elevation_ft,
                heading_deg: spot.heading,
                ground_speed_kt: 0.0,
            };
            let conditions = StartingConditions::Parking { parking: spot.name.clone() };
            placed.push(self.finish(synthesized, conditions, kinematics, None, Squawk::VFR));
        }
        Ok(placed)
    }

    fn sid_route(&mut self, runways: &[String]) -> Option<String> {
        let procedures: &'a ProcedureSet = self.procedures;
        let sids: Vec<&'a Procedure> = runways
            .iter()
            .flat_map(|runway| procedures.departures_for(&normalize_runway(runway)))
            .collect();
        sids.choose(&mut self.rng).map(|sid| sid.route_string())
    }

    fn runway_end(&self, designator: &str) -> Result<&'a RunwayEnd> {
        let airport: &'a Airport = self.airport;
        airport.runway_end(designator).ok_or_else(|| {
            GenerationError::InvalidRequest(format!("runway {designator} not found at {}", airport.icao))
        })
    }

    pub fn validate_final_plan(&self, plan: &FinalApproachPlan) -> Result<()> {
        let (min, max) = plan.separation_nm;
        if plan.runways.is_empty() {
            return Err(GenerationError::InvalidRequest("on-final arrivals need an active runway".into()));
        }
        if !(min.is_finite() && max.is_finite()) || min <= 0.0 || min > max {
            return Err(GenerationError::InvalidRequest(format!("bad separation band {min}-{max} NM")));
        }
        if !plan.first_distance_nm.is_finite() || plan.first_distance_nm <= 0.0 {
            return Err(GenerationError::InvalidRequest("first final distance must be positive".into()));
        }
        for runway in &plan.runways {
            self.runway_end(runway)?;
        }
        Ok(())
    }

    /// Arrivals stacked outward along each runway's final, round-robin across runways.
    pub fn place_on_final(&mut self, count: usize, plan: &FinalApproachPlan) -> Result<Vec<GeneratedAircraft>> {
        self.validate_final_plan(plan)?;
        self.check_squawk_capacity(count)?;
        let ends: Vec<&'a RunwayEnd> = plan
            .runways
            .iter()
            .map(|runway| self.runway_end(runway))
            .collect::<Result<_>>()?;
        let mut last_distance: Vec<Option<f64>> = vec![None; ends.len()];

        let mut placed = Vec::with_capacity(count);
        for i in 0..count {
            let slot = i % ends.len();
            let end = ends[slot];
            let distance = match last_distance[slot] {
                None => plan.first_distance_nm,
                Some(previous) => previous + self.separation_gap(plan.separation_nm),
            };
            last_distance[slot] = Some(distance);

            let speed = final_approach_speed_kt(distance);
            let altitude = spatial::glideslope_altitude(self.field_elevation_ft, distance, plan.glideslope_deg);
            let position = spatial::destination_point(end.threshold, spatial::reciprocal(end.heading), distance);

            let origin = self.synth.pick_airport(&mut self.rng, &self.airport.icao);
            let synthesized = self.synth.airline(
                &mut self.rng,
                PlanRequest {
                    departure: origin,
                    destination: Some(self.airport.icao.clone()),
                    callsign_suffix: self.callsign_suffix.clone(),
                    ..Default::default()
                },
            );
            let kinematics = Kinematics {
                position,
                altitude_ft: altitude.round(),
                heading_deg: end.heading,
                ground_speed_kt: f64::from(speed),
            };
            let conditions = StartingConditions::OnFinal {
                runway: end.designator.clone(),
                distance_nm: distance,
                speed,
                course_offset_deg: None,
            };
            let squawk = self.discrete_squawk()?;
            let airport_id = Some(self.airport.icao.clone());
            placed.push(self.finish(synthesized, conditions, kinematics, airport_id, squawk));
        }
        Ok(placed)
    }

    /// Random gap in tenths of a NM inside the band.
    fn separation_gap(&mut self, (min, max): (f64, f64)) -> f64 {
        let lo = (min * 10.0).ceil() as u32;
        let hi = (max * 10.0).floor() as u32;
        if lo <= hi {
            f64::from(self.rng.random_range(lo..=hi)) / 10.0
        } else {
            self.rng.random_range(min..=max)
        }
    }

    pub fn validate_fix_plan(&self, count: usize, plan: &FixArrivalPlan) -> Result<()> {
        if count == 0 {
            return Ok(());
        }
        if plan.fixes.is_empty() {
            return Err(GenerationError::InvalidRequest("fix arrivals need at least one fix".into()));
        }
        let (lo, hi) = plan.altitude_band_ft;
        if lo > hi {
            return Err(GenerationError::InvalidRequest(format!("bad altitude band {lo}-{hi} ft")));
        }
        if let Some((min, max)) = plan.spawn_delay_minutes {
            if min > max {
                return Err(GenerationError::InvalidRequest(format!("bad spawn delay band {min}-{max} min")));
            }
        }
        if plan.general_aviation > count {
            return Err(GenerationError::InvalidRequest(format!(
                "{} GA arrivals requested out of {count}",
                plan.general_aviation
            )));
        }
        for fix in &plan.fixes {
            if self.procedures.fix_position(&fix.fix).is_none() {
                return Err(GenerationError::InvalidRequest(format!(
                    "fix {} not found in procedure data for {}",
                    fix.fix, self.airport.icao
                )));
            }
            if let Some(star) = &fix.star {
                if self.procedures.arrival(star, &[]).is_none() {
                    return Err(GenerationError::InvalidRequest(format!("arrival {star} not found")));
                }
            }
        }
        Ok(())
    }

    /// Arrivals spawning at fixes or FRDs, spread round-robin over `plan.fixes`.
    pub fn place_at_fixes(&mut self, count: usize, plan: &FixArrivalPlan) -> Result<Vec<GeneratedAircraft>> {
        self.validate_fix_plan(count, plan)?;
        self.check_squawk_capacity(count)?;
        let procedures: &'a ProcedureSet = self.procedures;
        let runways: Vec<String> = plan.runways.iter().map(|r| normalize_runway(r)).collect();
        let reference = airport_reference(self.airport, procedures);

        let mut delays: Vec<u32> = match plan.spawn_delay_minutes {
            Some((min, max)) => {
                let (lo, hi) = (min.saturating_mul(60), max.saturating_mul(60));
                (0..count).map(|_| self.rng.random_range(lo..=hi)).collect()
            }
            None => vec![0; count],
        };
        delays.sort_unstable();

        let first_ga = count - plan.general_aviation;
        let mut placed = Vec::with_capacity(count);
        for (i, delay) in delays.into_iter().enumerate() {
            let target = &plan.fixes[i % plan.fixes.len()];
            let is_ga = i >= first_ga;
            let star: Option<&'a Procedure> = match &target.star {
                Some(name) => procedures.arrival(name, &runways).or_else(|| procedures.arrival(name, &[])),
                None => procedures.arrivals_via(&target.fix, &runways).first().copied(),
            };
            let waypoint = procedures
                .waypoint(&target.fix, star)
                .ok_or_else(|| GenerationError::InvalidRequest(format!("fix {} has no position", target.fix)))?;

            let band = if is_ga { GA_ALTITUDE_BAND_FT } else { plan.altitude_band_ft };
            let (lo, hi) = match waypoint.restriction {
                Some(restriction) => restriction.narrow(band.0, band.1),
                None => band,
            };
            let altitude = self.altitude_in(lo, hi);
            let speed: u32 = if is_ga {
                self.rng.random_range(100..=140)
            } else if altitude > 10_000 {
                self.rng.random_range(280..=320)
            } else {
                self.rng.random_range(220..=260)
            };

            let position = match &target.frd {
                Some(frd) => frd.resolve(waypoint.position),
                None => waypoint.position,
            };
            let heading = reference.map(|airport| spatial::normalize_heading(spatial::bearing(position, airport).round()));
            let navigation_path = star.and_then(|s| s.route_from(&target.fix));
            let route_hint = star.map(|s| format!("{}.{}", target.fix, s.name));

            let request = PlanRequest {
                destination: Some(self.airport.icao.clone()),
                route_hint,
                callsign_suffix: self.callsign_suffix.clone(),
                ..Default::default()
            };
            let synthesized = if is_ga {
                let departure = self.synth.pick_ga_airport(&mut self.rng, &self.airport.icao);
                self.synth.general_aviation(&mut self.rng, PlanRequest { departure, ..request })
            } else {
                let departure = self.synth.pick_airport(&mut self.rng, &self.airport.icao);
                self.synth.airline(&mut self.rng, PlanRequest { departure, ..request })
            };

            let kinematics = Kinematics {
                position,
                altitude_ft: f64::from(altitude),
                heading_deg: heading.unwrap_or(0.0),
                ground_speed_kt: f64::from(speed),
            };
            let conditions = StartingConditions::FixOrFrd {
                fix: target.reference(),
                altitude,
                speed,
                heading,
                mach: None,
                navigation_path,
            };
            let squawk = self.discrete_squawk()?;
            let airport_id = Some(self.airport.icao.clone());
            let mut generated = self.finish(synthesized, conditions, kinematics, airport_id, squawk);
            generated.aircraft.spawn_delay = delay;
            placed.push(generated);
        }
        Ok(placed)
    }

    /// Altitude in whole hundreds of feet inside `[lo, hi]` when possible.
    fn altitude_in(&mut self, lo: u32, hi: u32) -> u32 {
        let lo_h = lo.div_ceil(100);
        let hi_h = hi / 100;
        if lo_h <= hi_h {
            self.rng.random_range(lo_h..=hi_h) * 100
        } else {
            self.rng.random_range(lo..=hi)
        }
    }

    pub fn check_runway_capacity(&self, count: usize, runways: &[String]) -> Result<()> {
        if count > runways.len() {
            return Err(GenerationError::Capacity {
                airport: self.airport.icao.clone(),
                requested: count,
                available: runways.len(),
                pool: "active runways".into(),
            });
        }
        for runway in runways.iter().take(count) {
            self.runway_end(runway)?;
        }
        Ok(())
    }

    /// One departure lined up at the threshold of each of the first `count` runways.
    pub fn place_on_runway(&mut self, count: usize, runways: &[String]) -> Result<Vec<GeneratedAircraft>> {
        self.check_runway_capacity(count, runways)?;
        let mut placed = Vec::with_capacity(count);
        for runway in runways.iter().take(count) {
            let end = self.runway_end(runway)?;
            let route_hint = self.sid_route(std::slice::from_ref(runway));
            let synthesized = self.synth.airline(
                &mut self.rng,
                PlanRequest {
                    departure: self.airport.icao.clone(),
                    route_hint,
                    callsign_suffix: self.callsign_suffix.clone(),
                    ..Default::default()
                },
            );
            let kinematics = Kinematics {
                position: end.threshold,
                altitude_ft: self.field_elevation_ft,
                heading_deg: end.heading,
                ground_speed_kt: 0.0,
            };
            let conditions = StartingConditions::OnRunway { runway: end.designator.clone() };
            placed.push(self.finish(synthesized, conditions, kinematics, None, Squawk::VFR));
        }
        Ok(placed)
    }

    pub fn validate_enroute_plan(&self, count: usize, plan: &EnroutePlan) -> Result<()> {
        if count == 0 {
            return Ok(());
        }
        if plan.airports.len() < 2 {
            return Err(GenerationError::InvalidRequest(
                "enroute traffic needs at least two group airports with known positions".into(),
            ));
        }
        if self.procedures.fixes.is_empty() {
            return Err(GenerationError::InvalidRequest(format!(
                "enroute traffic needs fixes from the procedure file for {}",
                self.airport.icao
            )));
        }
        Ok(())
    }

    /// Overflights between group airports at cruise, spawning at an FRD off the
    /// fix nearest a point on the great circle between the two airports.
    pub fn place_enroute(&mut self, count: usize, plan: &EnroutePlan) -> Result<Vec<GeneratedAircraft>> {
        self.validate_enroute_plan(count, plan)?;
        self.check_squawk_capacity(count)?;

        let mut spawns = Vec::with_capacity(count);
        for _ in 0..count {
            match self.enroute_spawn(plan) {
                Some(spawn) => spawns.push(spawn),
                None => {
                    return Err(GenerationError::Capacity {
                        airport: self.airport.icao.clone(),
                        requested: count,
                        available: spawns.len(),
                        pool: "enroute spawn points".into(),
                    })
                }
            }
        }

        let procedures: &'a ProcedureSet = self.procedures;
        let mut placed = Vec::with_capacity(count);
        for spawn in spawns {
            let inbound = spawn.destination == self.airport.icao;
            let star: Option<&'a Procedure> = if inbound {
                procedures.arrivals_via(&spawn.fix, &[]).first().copied()
            } else {
                None
            };
            let route_hint = match star {
                Some(star) => format!("{}.{}", spawn.fix, star.name),
                None => format!("{} DCT", spawn.fix),
            };
            let synthesized = self.synth.airline(
                &mut self.rng,
                PlanRequest {
                    departure: spawn.origin.clone(),
                    destination: Some(spawn.destination.clone()),
                    route_hint: Some(route_hint),
                    callsign_suffix: self.callsign_suffix.clone(),
                    ..Default::default()
                },
            );
            let altitude = synthesized.flight_plan.cruise_altitude;
            let speed = synthesized.flight_plan.cruise_speed;
            tracing::debug!(
                "{} enroute {} → {} at {}",
                synthesized.callsign,
                spawn.origin,
                spawn.destination,
                spawn.reference
            );
            let kinematics = Kinematics {
                position: spawn.position,
                altitude_ft: f64::from(altitude),
                heading_deg: spawn.heading,
                ground_speed_kt: f64::from(speed),
            };
            let conditions = StartingConditions::FixOrFrd {
                fix: spawn.reference,
                altitude,
                speed,
                heading: Some(spawn.heading),
                mach: None,
                navigation_path: star.and_then(|s| s.route_from(&spawn.fix)),
            };
            let squawk = self.discrete_squawk()?;
            let airport_id = inbound.then(|| self.airport.icao.clone());
            placed.push(self.finish(synthesized, conditions, kinematics, airport_id, squawk));
        }
        Ok(placed)
    }

    /// Next unused spawn point, trying every ordered airport pair.
    fn enroute_spawn(&mut self, plan: &EnroutePlan) -> Option<EnrouteSpawn> {
        let mut candidates: Vec<(usize, usize, GeoPoint)> = Vec::new();
        for (o, (_, from)) in plan.airports.iter().enumerate() {
            for (d, (_, to)) in plan.airports.iter().enumerate() {
                if o == d {
                    continue;
                }
                let total = spatial::distance_nm(*from, *to);
                let course = spatial::bearing(*from, *to);
                for k in 2..=ENROUTE_STEPS - 2 {
                    let along = total * f64::from(k) / f64::from(ENROUTE_STEPS);
                    candidates.push((o, d, spatial::destination_point(*from, course, along)));
                }
            }
        }
        candidates.shuffle(&mut self.rng);
        if let Some(boundary) = &plan.boundary {
            candidates.sort_by_key(|(_, _, point)| !boundary.contains(*point));
        }

        for (o, d, point) in candidates {
            let Some((fix, fix_position, distance)) = self.nearest_fix(point) else {
                continue;
            };
            if distance > ENROUTE_FIX_RANGE_NM {
                continue;
            }
            let (reference, position) = if distance < ON_FIX_NM {
                (fix.to_string(), fix_position)
            } else {
                let radial = spatial::normalize_heading(spatial::bearing(fix_position, point).round());
                let frd = Frd::new(fix, radial as u16, distance.round() as u16);
                (frd.to_string(), frd.resolve(fix_position))
            };
            if !self.used_spawns.insert(reference.clone()) {
                continue;
            }
            let (origin, _) = &plan.airports[o];
            let (destination, target) = &plan.airports[d];
            return Some(EnrouteSpawn {
                origin: origin.clone(),
                destination: destination.clone(),
                fix: fix.to_string(),
                reference,
                position,
                heading: spatial::normalize_heading(spatial::bearing(position, *target).round()),
            });
        }
        None
    }

    fn nearest_fix(&self, point: GeoPoint) -> Option<(&'a str, GeoPoint, f64)> {
        let procedures: &'a ProcedureSet = self.procedures;
        procedures
            .fixes
            .iter()
            .map(|(name, position)| (name.as_str(), *position, spatial::distance_nm(point, *position)))
            .min_by(|a, b| a.2.total_cmp(&b.2))
    }

    pub fn check_squawk_capacity(&self, count: usize) -> Result<()> {
        let available = DISCRETE_SQUAWKS - self.used_squawks.len();
        if count > available {
            return Err(GenerationError::Capacity {
                airport: self.airport.icao.clone(),
                requested: count,
                available,
                pool: "discrete squawk codes".into(),
            });
        }
        Ok(())
    }

    /// Random octal code outside the reserved set, unique within the run.
    fn discrete_squawk(&mut self) -> Result<Squawk> {
        self.check_squawk_capacity(1)?;
        loop {
            let code = (0..4).fold(0u16, |acc, _| acc * 10 + self.rng.random_range(0..=7u16));
            if code >= 1000 && !RESERVED_SQUAWKS.contains(&code) && self.used_squawks.insert(code) {
                return Ok(Squawk(code));
            }
        }
    }

    fn finish(
        &mut self,
        synthesized: SynthesizedAircraft,
        conditions: StartingConditions,
        kinematics: Kinematics,
        airport_id: Option<String>,
        squawk: Squawk,
    ) -> GeneratedAircraft {
        let aircraft = Aircraft {
            id: new_id(&mut self.rng),
            aircraft_id: synthesized.callsign,
            aircraft_type: synthesized.aircraft_type,
            transponder_mode: TransponderMode::C,
            on_altitude_profile: conditions.is_airborne(),
            starting_conditions: conditions,
            flight_plan: Some(synthesized.flight_plan),
            preset_commands: Vec::new(),
            difficulty: Difficulty::Easy,
            spawn_delay: 0,
            airport_id,
            expected_approach: None,
        };
        GeneratedAircraft {
            aircraft,
            kinematics,
            engine: synthesized.engine,
            category: synthesized.category,
            squawk,
        }
    }
}

/// Reference point used for arrival headings.
pub fn airport_reference(airport: &Airport, procedures: &ProcedureSet) -> Option<GeoPoint> {
    airport.reference_point().or(procedures.reference_point)
}


#[cfg(test)]
mod tests {
    use super::fixtures::*;
    use super::*;
    use crate::models::StartingConditionsKind;
    use rand::SeedableRng;

    fn engine<'a>(airport: &'a Airport, procedures: &'a ProcedureSet, seed: u64) -> PlacementEngine<'a> {
        let rules = ParkingAirlineRules::new(
            vec![("A#".to_string(), vec!["AAL".to_string(), "AAL".to_string(), "SWA".to_string()])],
            vec!["DAL".to_string()],
        );
        PlacementEngine::new(
            airport,
            procedures,
            rules,
            FlightPlanSynthesizer::new(None),
            1135.0,
            StdRng::seed_from_u64(seed),
        )
    }

    #[test]
    fn test_arrival_fix_forms() {
        let plain: ArrivalFix = "eagul".parse().unwrap();
        assert_eq!((plain.fix.as_str(), plain.frd.is_none(), plain.star.is_none()), ("EAGUL", true, true));

        let with_star: ArrivalFix = "EAGUL.EAGUL6".parse().unwrap();
        assert_eq!(with_star.star.as_deref(), Some("EAGUL6"));

        let frd: ArrivalFix = "EAGUL090010.EAGUL6".parse().unwrap();
        assert_eq!(frd.fix, "EAGUL");
        assert_eq!(frd.reference(), "EAGUL090010");
        assert_eq!(frd.star.as_deref(), Some("EAGUL6"));

        assert!(".EAGUL6".parse::<ArrivalFix>().is_err());
    }

    #[test]
    fn test_parking_uses_distinct_spots_and_rules() {
        let airport = kphx_airport();
        let procedures = kphx_procedures();
        let mut engine = engine(&airport, &procedures, 7);
        let placed = engine.place_at_parking(3, ParkingFilter::AirlineOnly, &[]).unwrap();

        let mut spots: Vec<String> = placed
            .iter()
            .map(|g| match &g.aircraft.starting_conditions {
                StartingConditions::Parking { parking } => parking.clone(),
                other => panic!("unexpected {other:?}"),
            })
            .collect();
        spots.sort();
        assert_eq!(spots, vec!["A1", "A2", "A3"]);
        for g in &placed {
            assert!(g.aircraft.aircraft_id.starts_with("AAL") || g.aircraft.aircraft_id.starts_with("SWA"));
            assert_eq!(g.kinematics.ground_speed_kt, 0.0);
            assert!(!g.aircraft.on_altitude_profile);
        }
        assert_eq!(engine.available_parking(ParkingFilter::AirlineOnly), 0);
    }

    #[test]
    fn test_ga_spots_get_n_numbers() {
        let airport = kphx_airport();
        let procedures = kphx_procedures();
        let mut engine = engine(&airport, &procedures, 3);
        let placed = engine.place_at_parking(2, ParkingFilter::GeneralAviationOnly, &[]).unwrap();
        assert!(placed.iter().all(|g| g.aircraft.aircraft_id.starts_with('N')));
        assert!(placed.iter().all(|g| g.category == crate::flight_plan::AircraftCategory::GeneralAviation));
    }

    #[test]
    fn test_parking_capacity_error() {
        let airport = kphx_airport();
        let procedures = kphx_procedures();
        let mut engine = engine(&airport, &procedures, 1);
        let err = engine.place_at_parking(4, ParkingFilter::AirlineOnly, &[]).unwrap_err();
        match err {
            GenerationError::Capacity { requested, available, .. } => assert_eq!((requested, available), (4, 3)),
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(engine.available_parking(ParkingFilter::Any), 5);
    }

    #[test]
    fn test_final_approach_speed_schedule() {
        assert_eq!(final_approach_speed_kt(2.0), 140);
        assert_eq!(final_approach_speed_kt(4.0), 140);
        assert_eq!(final_approach_speed_kt(6.0), 160);
        assert_eq!(final_approach_speed_kt(30.0), 250);
    }

    #[test]
    fn test_on_final_spacing_and_geometry() {
        let airport = kphx_airport();
        let procedures = kphx_procedures();
        let mut engine = engine(&airport, &procedures, 11);
        let plan = FinalApproachPlan {
            runways: vec!["25L".into()],
            ..Default::default()
        };
        let placed = engine.place_on_final(4, &plan).unwrap();
        let threshold = airport.runway_end("25L").unwrap().threshold;

        let mut previous: Option<f64> = None;
        for g in &placed {
            let StartingConditions::OnFinal { runway, distance_nm, speed, .. } = &g.aircraft.starting_conditions else {
                panic!("not on final");
            };
            assert_eq!(runway, "25L");
            if let Some(prev) = previous {
                let gap = distance_nm - prev;
                assert!((3.0 - 1e-9..=6.0 + 1e-9).contains(&gap), "gap {gap}");
            } else {
                assert_eq!(*distance_nm, 6.0);
            }
            previous = Some(*distance_nm);

            let expected = spatial::glideslope_altitude(1135.0, *distance_nm, DEFAULT_GLIDESLOPE_DEG);
            assert!((g.kinematics.altitude_ft - expected).abs() <= 1.0);
            assert!((spatial::distance_nm(g.kinematics.position, threshold) - distance_nm).abs() < 0.05);
            assert_eq!(*speed, final_approach_speed_kt(*distance_nm));
            assert!(g.aircraft.on_altitude_profile);
            assert_eq!(g.aircraft.airport_id.as_deref(), Some("KPHX"));
            assert_eq!(g.aircraft.flight_plan.as_ref().unwrap().destination, "KPHX");
        }
    }

    #[test]
    fn test_on_final_round_robin_runways() {
        let airport = kphx_airport();
        let procedures = kphx_procedures();
        let mut engine = engine(&airport, &procedures, 5);
        let plan = FinalApproachPlan {
            runways: vec!["25L".into(), "26".into()],
            ..Default::default()
        };
        let placed = engine.place_on_final(3, &plan).unwrap();
        let runways: Vec<String> = placed
            .iter()
            .map(|g| match &g.aircraft.starting_conditions {
                StartingConditions::OnFinal { runway, .. } => runway.clone(),
                _ => String::new(),
            })
            .collect();
        assert_eq!(runways, vec!["25L", "26", "25L"]);
    }

    #[test]
    fn test_on_final_unknown_runway() {
        let airport = kphx_airport();
        let procedures = kphx_procedures();
        let mut engine = engine(&airport, &procedures, 5);
        let plan = FinalApproachPlan {
            runways: vec!["99".into()],
            ..Default::default()
        };
        assert!(matches!(engine.place_on_final(1, &plan), Err(GenerationError::InvalidRequest(_))));
    }

    #[test]
    fn test_fix_arrivals_respect_band_and_delays() {
        let airport = kphx_airport();
        let procedures = kphx_procedures();
        let mut engine = engine(&airport, &procedures, 21);
        let plan = FixArrivalPlan {
            fixes: vec!["EAGUL".parse().unwrap()],
            runways: vec!["25L".into()],
            ..Default::default()
        };
        let placed = engine.place_at_fixes(5, &plan).unwrap();
        assert_eq!(placed.len(), 5);

        let mut previous_delay = 0;
        for g in &placed {
            let StartingConditions::FixOrFrd { fix, altitude, navigation_path, heading, .. } =
                &g.aircraft.starting_conditions
            else {
                panic!("not at a fix");
            };
            assert_eq!(fix, "EAGUL");
            // EAGUL carries 12000-FL190 on the STAR
            assert!((12_000..=18_000).contains(altitude), "altitude {altitude}");
            assert_eq!(altitude % 100, 0);
            assert!(navigation_path.as_deref().unwrap_or_default().starts_with("EAGUL"));
            assert!(heading.is_some());
            assert!((240..=420).contains(&g.aircraft.spawn_delay));
            assert!(g.aircraft.spawn_delay >= previous_delay);
            previous_delay = g.aircraft.spawn_delay;
            assert!(g.squawk.is_valid() && g.squawk != Squawk::VFR);
            assert_eq!(g.aircraft.flight_plan.as_ref().unwrap().route, "EAGUL.EAGUL6");
        }
    }

    #[test]
    fn test_frd_arrival_is_offset_from_fix() {
        let airport = kphx_airport();
        let procedures = kphx_procedures();
        let mut engine = engine(&airport, &procedures, 2);
        let plan = FixArrivalPlan {
            fixes: vec!["PINNG090010".parse().unwrap()],
            spawn_delay_minutes: None,
            general_aviation: 1,
            ..Default::default()
        };
        let placed = engine.place_at_fixes(1, &plan).unwrap();
        let g = &placed[0];
        let fix = procedures.fix_position("PINNG").unwrap();
        assert!((spatial::distance_nm(fix, g.kinematics.position) - 10.0).abs() < 0.05);
        assert_eq!(g.aircraft.spawn_delay, 0);
        assert!(g.aircraft.aircraft_id.starts_with('N'));
        // PINNG is at or below 10000 on the STAR, GA band tops out at 8000
        assert!(g.kinematics.altitude_ft <= 8000.0);
    }

    #[test]
    fn test_unknown_fix_rejected_before_placement() {
        let airport = kphx_airport();
        let procedures = kphx_procedures();
        let mut engine = engine(&airport, &procedures, 2);
        let plan = FixArrivalPlan {
            fixes: vec!["NOPE".parse().unwrap()],
            ..Default::default()
        };
        assert!(matches!(engine.place_at_fixes(2, &plan), Err(GenerationError::InvalidRequest(_))));
    }

    #[test]
    fn test_on_runway_capacity() {
        let airport = kphx_airport();
        let procedures = kphx_procedures();
        let mut engine = engine(&airport, &procedures, 4);
        let runways = vec!["25L".to_string(), "26".to_string()];
        let placed = engine.place_on_runway(2, &runways).unwrap();
        assert!(placed
            .iter()
            .all(|g| g.aircraft.starting_conditions.kind() == StartingConditionsKind::OnRunway));
        assert!(matches!(
            engine.place_on_runway(3, &runways),
            Err(GenerationError::Capacity { requested: 3, available: 2, .. })
        ));
    }

    fn west_plan(procedures: &ProcedureSet) -> EnroutePlan {
        EnroutePlan {
            airports: ["KPHX", "KLAX"]
                .iter()
                .map(|icao| (icao.to_string(), procedures.airports[*icao]))
                .collect(),
            boundary: None,
        }
    }

    #[test]
    fn test_enroute_traffic_between_group_airports() {
        let airport = kphx_airport();
        let procedures = kphx_procedures();
        let boundaries = crate::artcc::parse_boundaries("artcc", crate::artcc::fixtures::BOUNDARIES)
            .unwrap()
            .value;
        let zab = crate::artcc::locate(&boundaries, procedures.airports["KPHX"]).cloned().unwrap();
        let mut engine = engine(&airport, &procedures, 31);
        let plan = EnroutePlan {
            boundary: Some(zab.clone()),
            ..west_plan(&procedures)
        };
        let placed = engine.place_enroute(3, &plan).unwrap();
        assert_eq!(placed.len(), 3);

        let mut references = HashSet::new();
        for g in &placed {
            let StartingConditions::FixOrFrd { fix, altitude, speed, heading, .. } = &g.aircraft.starting_conditions
            else {
                panic!("not enroute");
            };
            assert!(references.insert(fix.clone()), "{fix} used twice");
            let plan = g.aircraft.flight_plan.as_ref().unwrap();
            assert_ne!(plan.departure, plan.destination);
            assert!(["KPHX", "KLAX"].contains(&plan.departure.as_str()));
            assert_eq!(*altitude, plan.cruise_altitude);
            assert_eq!(*speed, plan.cruise_speed);
            let target = procedures.airports[plan.destination.as_str()];
            let expected = spatial::normalize_heading(spatial::bearing(g.kinematics.position, target).round());
            assert_eq!(*heading, Some(expected));
            assert!(zab.contains(g.kinematics.position));
            assert_eq!(g.aircraft.airport_id.is_some(), plan.destination == "KPHX");
            assert!(g.aircraft.on_altitude_profile);
            assert!(g.squawk != Squawk::VFR);
        }
    }

    #[test]
    fn test_enroute_spawn_points_run_out() {
        let airport = kphx_airport();
        let procedures = kphx_procedures();
        let mut engine = engine(&airport, &procedures, 31);
        let err = engine.place_enroute(60, &west_plan(&procedures)).unwrap_err();
        match err {
            GenerationError::Capacity { requested, available, pool, .. } => {
                assert_eq!(requested, 60);
                assert!(available > 0 && available < 60);
                assert_eq!(pool, "enroute spawn points");
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_enroute_needs_two_airports() {
        let airport = kphx_airport();
        let procedures = kphx_procedures();
        let mut engine = engine(&airport, &procedures, 31);
        let mut plan = west_plan(&procedures);
        plan.airports.truncate(1);
        assert!(matches!(engine.place_enroute(1, &plan), Err(GenerationError::InvalidRequest(_))));
        assert!(engine.place_enroute(0, &plan).unwrap().is_empty());
    }

    #[test]
    fn test_squawk_pool_exhaustion_is_capacity_error() {
        let airport = kphx_airport();
        let procedures = kphx_procedures();
        let mut engine = engine(&airport, &procedures, 8);
        let mut codes = HashSet::new();
        for _ in 0..DISCRETE_SQUAWKS {
            let squawk = engine.discrete_squawk().unwrap();
            assert!(!RESERVED_SQUAWKS.contains(&squawk.0));
            assert!(codes.insert(squawk.0));
        }
        assert!(matches!(
            engine.discrete_squawk(),
            Err(GenerationError::Capacity { requested: 1, available: 0, .. })
        ));
    }

    #[test]
    fn test_oversized_arrival_stack_rejected_up_front() {
        let airport = kphx_airport();
        let procedures = kphx_procedures();
        let mut engine = engine(&airport, &procedures, 8);
        let plan = FinalApproachPlan {
            runways: vec!["25L".into()],
            ..Default::default()
        };
        let err = engine.place_on_final(DISCRETE_SQUAWKS + 1, &plan).unwrap_err();
        assert!(matches!(err, GenerationError::Capacity { available: DISCRETE_SQUAWKS, .. }));
        assert!(engine.check_squawk_capacity(DISCRETE_SQUAWKS).is_ok());
    }

    #[test]
    fn test_same_seed_same_traffic() {
        let airport = kphx_airport();
        let procedures = kphx_procedures();
        let a = engine(&airport, &procedures, 99).place_at_parking(3, ParkingFilter::Any, &[]).unwrap();
        let b = engine(&airport, &procedures, 99).place_at_parking(3, ParkingFilter::Any, &[]).unwrap();
        let ids = |v: &[GeneratedAircraft]| v.iter().map(|g| (g.aircraft.id.clone(), g.aircraft.aircraft_id.clone())).collect::<Vec<_>>();
        assert_eq!(ids(&a), ids(&b));
    }
}
