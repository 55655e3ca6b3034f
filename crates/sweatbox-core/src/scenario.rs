//! Scenario types and the builder that turns a request into aircraft.

use crate::airline::ParkingAirlineRules;
use crate::airport::Airport;
use crate::artcc::ArtccBoundary;
use crate::config::GeneratorConfig;
use crate::error::{GenerationError, Result, Warning};
use crate::flight_plan::FlightPlanSynthesizer;
use crate::models::{Difficulty, GeneratedAircraft, StartingConditions};
use crate::placement::{
    airport_reference, ArrivalFix, EnroutePlan, FinalApproachPlan, FixArrivalPlan, ParkingFilter, PlacementEngine,
};
use crate::preset::{apply_preset_commands, PresetCommandRule};
use crate::procedures::ProcedureSet;
use crate::sources::FlightPlanSource;
use crate::spatial::DEFAULT_GLIDESLOPE_DEG;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

const TOWER_GA_SHARE: f64 = 0.15;
const DEFAULT_SESSION_MINUTES: u32 = 30;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ScenarioKind {
    /// Parking departures only.
    GroundDepartures,
    /// Parking departures plus arrivals on final.
    GroundMixed,
    /// Airline and GA departures, runway departures, arrivals on final.
    TowerMixed,
    TraconDepartures,
    /// Arrivals spawning at fixes or FRDs.
    TraconArrivals,
    TraconMixed,
    /// Center traffic: overflights between group airports plus optional
    /// departures and fix arrivals at the primary airport.
    ArtccEnroute,
}

impl ScenarioKind {
    pub const ALL: [ScenarioKind; 7] = [
        ScenarioKind::GroundDepartures,
        ScenarioKind::GroundMixed,
        ScenarioKind::TowerMixed,
        ScenarioKind::TraconDepartures,
        ScenarioKind::TraconArrivals,
        ScenarioKind::TraconMixed,
        ScenarioKind::ArtccEnroute,
    ];

    pub fn name(self) -> &'static str {
        match self {
            ScenarioKind::GroundDepartures => "ground-departures",
            ScenarioKind::GroundMixed => "ground-mixed",
            ScenarioKind::TowerMixed => "tower-mixed",
            ScenarioKind::TraconDepartures => "tracon-departures",
            ScenarioKind::TraconArrivals => "tracon-arrivals",
            ScenarioKind::TraconMixed => "tracon-mixed",
            ScenarioKind::ArtccEnroute => "artcc-enroute",
        }
    }

    pub fn has_departures(self) -> bool {
        self != ScenarioKind::TraconArrivals
    }

    pub fn has_final_arrivals(self) -> bool {
        matches!(self, ScenarioKind::GroundMixed | ScenarioKind::TowerMixed)
    }

    pub fn has_fix_arrivals(self) -> bool {
        matches!(
            self,
            ScenarioKind::TraconArrivals | ScenarioKind::TraconMixed | ScenarioKind::ArtccEnroute
        )
    }

    pub fn has_enroute(self) -> bool {
        self == ScenarioKind::ArtccEnroute
    }
}

impl fmt::Display for ScenarioKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ScenarioKind {
    type Err = GenerationError;

    fn from_str(s: &str) -> Result<Self> {
        let wanted = s.trim().to_ascii_lowercase().replace('_', "-");
        ScenarioKind::ALL
            .into_iter()
            .find(|kind| kind.name() == wanted)
            .ok_or_else(|| GenerationError::InvalidRequest(format!("unknown scenario type '{s}'")))
    }
}

/// How spawn delays are spread over aircraft that have none from a fix band.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SpawnDelayMode {
    #[default]
    None,
    /// First aircraft at 0 s, each next one a random whole number of minutes later.
    Incremental { min_minutes: u32, max_minutes: u32 },
    /// Uniform over the session, then sorted. Zero means 30 minutes.
    Total { session_minutes: u32 },
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DifficultyMix {
    pub easy: usize,
    pub medium: usize,
    pub hard: usize,
}

#[derive(Debug, Clone)]
pub struct ScenarioRequest {
    pub kind: ScenarioKind,
    pub departures: usize,
    pub arrivals: usize,
    pub parking_filter: ParkingFilter,
    pub active_runways: Vec<String>,
    pub separation_nm: (f64, f64),
    pub first_final_distance_nm: f64,
    /// `FIX`, `FIX.STAR`, `FIX090010` or `FIX090010.STAR`.
    pub arrival_fixes: Vec<String>,
    pub altitude_band_ft: (u32, u32),
    /// `None` leaves fix arrivals to `spawn_delay`.
    pub fix_delay_minutes: Option<(u32, u32)>,
    pub ga_arrivals: usize,
    pub on_runway_departures: usize,
    /// Overflights for `artcc-enroute`. Needs `airport_group`.
    pub enroute: usize,
    pub sid_routes: bool,
    pub spawn_delay: SpawnDelayMode,
    pub difficulty: Option<DifficultyMix>,
    pub presets: Vec<PresetCommandRule>,
    /// Enroute airport group supplying destinations and origins.
    pub airport_group: Option<String>,
    pub callsign_suffix: Option<String>,
    pub seed: Option<u64>,
}

impl Default for ScenarioRequest {
    fn default() -> Self {
        Self {
            kind: ScenarioKind::GroundDepartures,
            departures: 0,
            arrivals: 0,
            parking_filter: ParkingFilter::Any,
            active_runways: Vec::new(),
            separation_nm: (3.0, 6.0),
            first_final_distance_nm: 6.0,
            arrival_fixes: Vec::new(),
            altitude_band_ft: (7000, 18000),
            fix_delay_minutes: Some((4, 7)),
            ga_arrivals: 0,
            on_runway_departures: 0,
            enroute: 0,
            sid_routes: false,
            spawn_delay: SpawnDelayMode::None,
            difficulty: None,
            presets: Vec::new(),
            airport_group: None,
            callsign_suffix: None,
            seed: None,
        }
    }
}

/// Departure counts after the tower split.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct DepartureSplit {
    airline: usize,
    general_aviation: usize,
    filter: ParkingFilter,
}

#[derive(Debug, Default)]
pub struct BuiltScenario {
    pub aircraft: Vec<GeneratedAircraft>,
    pub warnings: Vec<Warning>,
    /// Flight plans that came from the local fallback.
    pub fallbacks: usize,
}

pub struct ScenarioBuilder<'a> {
    airport: &'a Airport,
    procedures: &'a ProcedureSet,
    config: &'a GeneratorConfig,
    field_elevation_ft: f64,
    flight_plans: Option<Arc<dyn FlightPlanSource>>,
    boundary: Option<ArtccBoundary>,
}

impl<'a> ScenarioBuilder<'a> {
    pub fn new(
        airport: &'a Airport,
        procedures: &'a ProcedureSet,
        config: &'a GeneratorConfig,
        field_elevation_ft: f64,
    ) -> Self {
        Self {
            airport,
            procedures,
            config,
            field_elevation_ft,
            flight_plans: None,
            boundary: None,
        }
    }

    pub fn with_flight_plans(mut self, source: Option<Arc<dyn FlightPlanSource>>) -> Self {
        self.flight_plans = source;
        self
    }

    /// Boundary of the center the scenario belongs to. Enroute spawns prefer it.
    pub fn with_artcc_boundary(mut self, boundary: Option<ArtccBoundary>) -> Self {
        self.boundary = boundary;
        self
    }

    pub fn build(&self, request: &ScenarioRequest) -> Result<BuiltScenario> {
        let rng = match request.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        };
        self.build_with(request, rng)
    }

    /// Validate every pool and plan, then place, delay, grade and annotate.
    pub fn build_with(&self, request: &ScenarioRequest, rng: StdRng) -> Result<BuiltScenario> {
        let mut warnings = Vec::new();
        let synth = self.synthesizer(request)?;
        let rules = ParkingAirlineRules::for_airport(self.config, &self.airport.icao);
        let mut engine = PlacementEngine::new(self.airport, self.procedures, rules, synth, self.field_elevation_ft, rng)
            .with_callsign_suffix(request.callsign_suffix.clone());

        let kind = request.kind;
        let split = self.departure_split(request);
        let final_plan = FinalApproachPlan {
            runways: request.active_runways.clone(),
            separation_nm: request.separation_nm,
            first_distance_nm: request.first_final_distance_nm,
            glideslope_deg: DEFAULT_GLIDESLOPE_DEG,
        };
        let fix_plan = FixArrivalPlan {
            fixes: request
                .arrival_fixes
                .iter()
                .map(|f| f.parse::<ArrivalFix>())
                .collect::<Result<_>>()?,
            altitude_band_ft: request.altitude_band_ft,
            spawn_delay_minutes: request.fix_delay_minutes,
            runways: request.active_runways.clone(),
            general_aviation: request.ga_arrivals,
        };
        let on_runway = if kind == ScenarioKind::TowerMixed { request.on_runway_departures } else { 0 };
        let final_arrivals = if kind.has_final_arrivals() { request.arrivals } else { 0 };
        let fix_arrivals = if kind.has_fix_arrivals() { request.arrivals } else { 0 };
        let enroute = if kind.has_enroute() { request.enroute } else { 0 };
        let enroute_plan = if enroute > 0 {
            self.enroute_plan(request, &mut warnings)?
        } else {
            EnroutePlan::default()
        };

        if kind.has_departures() {
            if split.general_aviation > 0 {
                engine.check_parking_capacity(ParkingFilter::GeneralAviationOnly, split.general_aviation)?;
            }
            engine.check_parking_capacity(split.filter, split.airline)?;
        }
        if on_runway > 0 {
            engine.check_runway_capacity(on_runway, &request.active_runways)?;
        }
        if final_arrivals > 0 {
            engine.validate_final_plan(&final_plan)?;
        }
        if kind.has_fix_arrivals() {
            engine.validate_fix_plan(fix_arrivals, &fix_plan)?;
        }
        engine.validate_enroute_plan(enroute, &enroute_plan)?;
        engine.check_squawk_capacity(final_arrivals + fix_arrivals + enroute)?;
        if kind == ScenarioKind::TowerMixed && split.general_aviation == 0 && request.departures > 0 {
            warnings.push(Warning::new(&self.airport.icao, "no GA parking spots, tower departures are all airline"));
        }

        let sid_runways: &[String] = if request.sid_routes { &request.active_runways } else { &[] };
        if request.sid_routes && self.procedures.by_runway.values().all(|p| p.departures.is_empty()) {
            warnings.push(Warning::new(&self.airport.icao, "SID routes requested but no departure procedures loaded"));
        }

        let mut aircraft = Vec::new();
        if kind.has_departures() {
            aircraft.extend(engine.place_at_parking(split.airline, split.filter, sid_runways)?);
            if split.general_aviation > 0 {
                aircraft.extend(engine.place_at_parking(
                    split.general_aviation,
                    ParkingFilter::GeneralAviationOnly,
                    sid_runways,
                )?);
            }
        }
        if on_runway > 0 {
            aircraft.extend(engine.place_on_runway(on_runway, &request.active_runways)?);
        }
        if enroute > 0 {
            aircraft.extend(engine.place_enroute(enroute, &enroute_plan)?);
        }
        let fix_delayed_from = aircraft.len();
        if final_arrivals > 0 {
            aircraft.extend(engine.place_on_final(final_arrivals, &final_plan)?);
        }
        if fix_arrivals > 0 {
            aircraft.extend(engine.place_at_fixes(fix_arrivals, &fix_plan)?);
        }

        let has_band_delay = |index: usize, g: &GeneratedAircraft| {
            index >= fix_delayed_from
                && request.fix_delay_minutes.is_some()
                && matches!(g.aircraft.starting_conditions, StartingConditions::FixOrFrd { .. })
        };
        let undelayed: Vec<usize> = aircraft
            .iter()
            .enumerate()
            .filter(|(i, g)| !has_band_delay(*i, g))
            .map(|(i, _)| i)
            .collect();
        apply_spawn_delays(&mut aircraft, &undelayed, request.spawn_delay, engine.rng());

        if let Some(mix) = request.difficulty {
            apply_difficulty(&mut aircraft, mix, engine.rng());
        }
        apply_preset_commands(&mut aircraft, &request.presets, engine.rng());

        tracing::info!(
            "built {} scenario for {}: {} aircraft",
            kind,
            self.airport.icao,
            aircraft.len()
        );
        Ok(BuiltScenario {
            aircraft,
            warnings,
            fallbacks: engine.synthesizer().fallbacks(),
        })
    }

    fn synthesizer(&self, request: &ScenarioRequest) -> Result<FlightPlanSynthesizer> {
        let mut synth = FlightPlanSynthesizer::new(self.flight_plans.clone())
            .with_ga_destinations(self.config.ga_destinations.clone())
            .with_fallback_airlines(self.config.default_airlines.clone());
        if let Some(name) = &request.airport_group {
            let group = self
                .config
                .airport_group(name)
                .ok_or_else(|| GenerationError::InvalidRequest(format!("unknown airport group '{name}'")))?;
            synth = synth.with_destinations(group.iter().map(|a| a.icao.clone()).collect());
        }
        Ok(synth)
    }

    /// Group airports with a known reference point. Unknown ones are left out with a warning.
    fn enroute_plan(&self, request: &ScenarioRequest, warnings: &mut Vec<Warning>) -> Result<EnroutePlan> {
        let name = request
            .airport_group
            .as_deref()
            .ok_or_else(|| GenerationError::InvalidRequest("enroute traffic needs an airport group".into()))?;
        let group = self
            .config
            .airport_group(name)
            .ok_or_else(|| GenerationError::InvalidRequest(format!("unknown airport group '{name}'")))?;
        let mut airports = Vec::with_capacity(group.len());
        for member in group {
            let known = self.procedures.airports.get(&member.icao).copied();
            let position = if member.icao == self.airport.icao {
                airport_reference(self.airport, self.procedures).or(known)
            } else {
                known
            };
            match position {
                Some(position) => airports.push((member.icao.clone(), position)),
                None => warnings.push(Warning::new(
                    name,
                    format!("no reference point for {}, left out of enroute traffic", member.icao),
                )),
            }
        }
        Ok(EnroutePlan {
            airports,
            boundary: self.boundary.clone(),
        })
    }

    fn departure_split(&self, request: &ScenarioRequest) -> DepartureSplit {
        if request.kind != ScenarioKind::TowerMixed {
            return DepartureSplit {
                airline: request.departures,
                general_aviation: 0,
                filter: request.parking_filter,
            };
        }
        let ga = tower_ga_count(request.departures, self.airport.general_aviation_spots().count());
        DepartureSplit {
            airline: request.departures - ga,
            general_aviation: ga,
            filter: ParkingFilter::AirlineOnly,
        }
    }
}

/// `min(ga_spots, max(1, floor(0.15 * departures)))`, zero without GA spots.
pub fn tower_ga_count(departures: usize, ga_spots: usize) -> usize {
    if ga_spots == 0 || departures == 0 {
        return 0;
    }
    let share = (departures as f64 * TOWER_GA_SHARE).floor() as usize;
    share.max(1).min(ga_spots).min(departures)
}

/// Spread delays over `targets` (indices into `aircraft`).
pub fn apply_spawn_delays<R: Rng + ?Sized>(
    aircraft: &mut [GeneratedAircraft],
    targets: &[usize],
    mode: SpawnDelayMode,
    rng: &mut R,
) {
    match mode {
        SpawnDelayMode::None => {}
        SpawnDelayMode::Incremental { min_minutes, max_minutes } => {
            let (lo, hi) = (min_minutes.min(max_minutes), min_minutes.max(max_minutes));
            let mut elapsed = 0u32;
            for (n, &i) in targets.iter().enumerate() {
                if n > 0 {
                    elapsed = elapsed.saturating_add(rng.random_range(lo..=hi).saturating_mul(60));
                }
                aircraft[i].aircraft.spawn_delay = elapsed;
            }
        }
        SpawnDelayMode::Total { session_minutes } => {
            let session = if session_minutes == 0 { DEFAULT_SESSION_MINUTES } else { session_minutes };
            for &i in targets {
                aircraft[i].aircraft.spawn_delay = rng.random_range(0..=session.saturating_mul(60));
            }
            aircraft.sort_by_key(|g| g.aircraft.spawn_delay);
        }
    }
}

/// Shuffle the mix and hand it out in aircraft order; leftovers stay easy.
pub fn apply_difficulty<R: Rng + ?Sized>(aircraft: &mut [GeneratedAircraft], mix: DifficultyMix, rng: &mut R) {
    let mut levels: Vec<Difficulty> = [
        (Difficulty::Easy, mix.easy),
        (Difficulty::Medium, mix.medium),
        (Difficulty::Hard, mix.hard),
    ]
    .into_iter()
    .flat_map(|(level, n)| std::iter::repeat(level).take(n))
    .collect();
    levels.shuffle(rng);
    let mut levels = levels.into_iter();
    for g in aircraft.iter_mut() {
        g.aircraft.difficulty = levels.next().unwrap_or(Difficulty::Easy);
    }
}
