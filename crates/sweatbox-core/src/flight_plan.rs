//! Flight plan model and synthesis.
//!
//! The synthesizer asks the injected [`FlightPlanSource`] first. Any error,
//! timeout or empty answer drops to [`LocalFlightPlanSource`], which never
//! fails, so callsign/type/route/altitude are always produced.

use crate::sources::{FlightPlanQuery, FlightPlanSource, LocalFlightPlanSource, SourcedPlan};
use rand::seq::IndexedRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;

const CALLSIGN_ATTEMPTS: usize = 100;
const N_NUMBER_LETTERS: &[u8] = b"ABCDEFGHJKLMNPQRSTUVWXYZ";
pub const DEFAULT_REMARKS: &str = "/V/";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AircraftCategory {
    Airline,
    GeneralAviation,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum FlightRules {
    #[default]
    #[serde(rename = "IFR")]
    Ifr,
    #[serde(rename = "VFR")]
    Vfr,
}

impl FlightRules {
    pub fn legacy_code(self) -> char {
        match self {
            FlightRules::Ifr => 'I',
            FlightRules::Vfr => 'V',
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineType {
    Jet,
    Turboprop,
    Piston,
}

impl EngineType {
    pub fn legacy_code(self) -> char {
        match self {
            EngineType::Jet => 'J',
            EngineType::Turboprop => 'T',
            EngineType::Piston => 'P',
        }
    }

    pub fn from_legacy_code(code: &str) -> Option<Self> {
        match code {
            "J" => Some(EngineType::Jet),
            "T" => Some(EngineType::Turboprop),
            "P" => Some(EngineType::Piston),
            _ => None,
        }
    }

    pub fn for_type(aircraft_type: &str) -> Self {
        let base = base_type(aircraft_type);
        if tables::TURBOPROPS.contains(&base) {
            EngineType::Turboprop
        } else if tables::COMMON_GA_AIRCRAFT.contains(&base) || tables::PISTONS.contains(&base) {
            EngineType::Piston
        } else {
            EngineType::Jet
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FlightPlan {
    pub rules: FlightRules,
    pub departure: String,
    pub destination: String,
    pub cruise_altitude: u32,
    pub cruise_speed: u32,
    pub route: String,
    pub remarks: String,
    /// Type without equipment suffix.
    pub aircraft_type: String,
}

/// `B738/L` → `B738`.
pub fn base_type(aircraft_type: &str) -> &str {
    aircraft_type.split('/').next().unwrap_or(aircraft_type).trim()
}

/// `B738/L` → `L`; `L` when no suffix is given.
pub fn equipment_suffix(aircraft_type: &str) -> &str {
    aircraft_type.split_once('/').map(|(_, s)| s.trim()).filter(|s| !s.is_empty()).unwrap_or("L")
}

/// Drop a trailing runway qualifier such as `.25L` from a route.
pub fn strip_runway_suffix(route: &str) -> String {
    let route = route.trim();
    if let Some((head, tail)) = route.rsplit_once('.') {
        let digits = tail.trim_end_matches(['L', 'R', 'C']);
        let is_runway = !digits.is_empty() && digits.len() <= 2 && digits.bytes().all(|b| b.is_ascii_digit());
        if is_runway && !head.is_empty() {
            return head.to_string();
        }
    }
    route.to_string()
}

/// Everything the engine needs to describe one aircraft's identity and plan.
#[derive(Debug, Clone, PartialEq)]
pub struct SynthesizedAircraft {
    pub callsign: String,
    /// Type with equipment suffix.
    pub aircraft_type: String,
    pub engine: EngineType,
    pub category: AircraftCategory,
    pub flight_plan: FlightPlan,
}

#[derive(Debug, Clone, Default)]
pub struct PlanRequest {
    pub departure: String,
    pub destination: Option<String>,
    pub airline: Option<String>,
    /// Used as the route when the source does not supply one.
    pub route_hint: Option<String>,
    /// Shared trailing digits for grouped callsigns.
    pub callsign_suffix: Option<String>,
}

pub struct FlightPlanSynthesizer {
    primary: Option<Arc<dyn FlightPlanSource>>,
    local: LocalFlightPlanSource,
    destinations: Vec<String>,
    ga_destinations: Vec<String>,
    fallback_airlines: Vec<String>,
    used_callsigns: HashSet<String>,
    fallbacks: usize,
}

impl FlightPlanSynthesizer {
    pub fn new(primary: Option<Arc<dyn FlightPlanSource>>) -> Self {
        Self {
            primary,
            local: LocalFlightPlanSource,
            destinations: tables::POPULAR_US_AIRPORTS.iter().map(|s| s.to_string()).collect(),
            ga_destinations: tables::LESS_COMMON_AIRPORTS.iter().map(|s| s.to_string()).collect(),
            fallback_airlines: crate::airline::BUILTIN_AIRLINES.iter().map(|s| s.to_string()).collect(),
            used_callsigns: HashSet::new(),
            fallbacks: 0,
        }
    }

    pub fn with_destinations(mut self, destinations: Vec<String>) -> Self {
        if !destinations.is_empty() {
            self.destinations = destinations;
        }
        self
    }

    pub fn with_ga_destinations(mut self, destinations: Vec<String>) -> Self {
        if !destinations.is_empty() {
            self.ga_destinations = destinations;
        }
        self
    }

    pub fn with_fallback_airlines(mut self, airlines: Vec<String>) -> Self {
        if !airlines.is_empty() {
            self.fallback_airlines = airlines;
        }
        self
    }

    /// How many plans came from the local fallback.
    pub fn fallbacks(&self) -> usize {
        self.fallbacks
    }

    /// Random airport from the airline destination table other than `exclude`.
    pub fn pick_airport<R: Rng + ?Sized>(&self, rng: &mut R, exclude: &str) -> String {
        pick_other(&self.destinations, rng, exclude)
    }

    pub fn pick_ga_airport<R: Rng + ?Sized>(&self, rng: &mut R, exclude: &str) -> String {
        pick_other(&self.ga_destinations, rng, exclude)
    }

    pub fn airline<R: Rng + ?Sized>(&mut self, rng: &mut R, request: PlanRequest) -> SynthesizedAircraft {
        let destination = request
            .destination
            .clone()
            .unwrap_or_else(|| self.pick_airport(rng, &request.departure));
        let query = FlightPlanQuery {
            departure: request.departure.clone(),
            arrival: Some(destination.clone()),
            airline: request.airline.clone(),
            category: AircraftCategory::Airline,
        };
        let candidates = self.candidates(&query);
        let matching: Vec<&SourcedPlan> = match &request.airline {
            Some(airline) => candidates
                .iter()
                .filter(|c| c.callsign.as_deref().is_some_and(|cs| cs.starts_with(airline.as_str())))
                .collect(),
            None => Vec::new(),
        };
        let chosen = if matching.is_empty() {
            candidates.choose(rng).cloned()
        } else {
            matching.choose(rng).map(|c| (*c).clone())
        };
        let plan = chosen.unwrap_or_else(|| self.local.plan_for(&query));

        let callsign = match (&request.airline, &plan.callsign) {
            (Some(airline), _) => self.airline_callsign(rng, airline, request.callsign_suffix.as_deref()),
            (None, Some(cs)) if request.callsign_suffix.is_none() && self.used_callsigns.insert(cs.clone()) => cs.clone(),
            _ => {
                let airline = self.fallback_airlines.choose(rng).cloned().unwrap_or_else(|| "AAL".into());
                self.airline_callsign(rng, &airline, request.callsign_suffix.as_deref())
            }
        };

        let aircraft_type = plan
            .aircraft_type
            .clone()
            .filter(|t| !base_type(t).is_empty())
            .map(|t| if t.contains('/') { t } else { format!("{t}/L") })
            .unwrap_or_else(|| format!("{}/L", tables::COMMON_JETS.choose(rng).copied().unwrap_or("B738")));
        let base = base_type(&aircraft_type).to_string();
        let cruise_altitude = plan
            .cruise_altitude_ft
            .unwrap_or_else(|| tables::JET_CRUISE_ALTITUDES.choose(rng).copied().unwrap_or(35000));
        let cruise_speed = plan
            .cruise_speed_kt
            .unwrap_or_else(|| tables::cruise_speed(&base, equipment_suffix(&aircraft_type)));
        let route = plan
            .route
            .as_deref()
            .map(strip_runway_suffix)
            .filter(|r| !r.is_empty() && r != "DCT")
            .or_else(|| request.route_hint.clone())
            .unwrap_or_else(|| "DCT".into());

        SynthesizedAircraft {
            callsign,
            engine: EngineType::for_type(&base),
            category: AircraftCategory::Airline,
            flight_plan: FlightPlan {
                rules: FlightRules::Ifr,
                departure: request.departure,
                destination,
                cruise_altitude,
                cruise_speed,
                route,
                remarks: DEFAULT_REMARKS.into(),
                aircraft_type: base,
            },
            aircraft_type,
        }
    }

    /// GA aircraft never consult the remote source.
    pub fn general_aviation<R: Rng + ?Sized>(&mut self, rng: &mut R, request: PlanRequest) -> SynthesizedAircraft {
        let destination = request
            .destination
            .clone()
            .unwrap_or_else(|| self.pick_ga_airport(rng, &request.departure));
        let base = tables::COMMON_GA_AIRCRAFT.choose(rng).copied().unwrap_or("C172");
        let callsign = self.n_number(rng);
        SynthesizedAircraft {
            callsign,
            aircraft_type: format!("{base}/G"),
            engine: EngineType::for_type(base),
            category: AircraftCategory::GeneralAviation,
            flight_plan: FlightPlan {
                rules: FlightRules::Ifr,
                departure: request.departure,
                destination,
                cruise_altitude: rng.random_range(30..=80) * 100,
                cruise_speed: tables::cruise_speed(base, "G"),
                route: request.route_hint.unwrap_or_else(|| "DCT".into()),
                remarks: DEFAULT_REMARKS.into(),
                aircraft_type: base.to_string(),
            },
        }
    }

    fn candidates(&mut self, query: &FlightPlanQuery) -> Vec<SourcedPlan> {
        if let Some(source) = &self.primary {
            match source.candidates(query) {
                Ok(found) if !found.is_empty() => return found,
                Ok(_) => tracing::debug!(
                    "{} returned no plans for {} → {:?}",
                    source.name(),
                    query.departure,
                    query.arrival
                ),
                Err(err) => tracing::warn!(
                    "flight plan lookup via {} failed, using local plans: {}",
                    source.name(),
                    err
                ),
            }
        }
        self.fallbacks += 1;
        vec![self.local.plan_for(query)]
    }

    fn airline_callsign<R: Rng + ?Sized>(&mut self, rng: &mut R, airline: &str, suffix: Option<&str>) -> String {
        let mut candidate = String::new();
        for _ in 0..CALLSIGN_ATTEMPTS {
            candidate = match suffix {
                Some(suffix) => format!("{airline}{}{suffix}", rng.random_range(1..=99)),
                None => format!("{airline}{}", rng.random_range(100..=9999)),
            };
            if self.used_callsigns.insert(candidate.clone()) {
                return candidate;
            }
        }
        candidate
    }

    /// `N` + 3 digits + 2 letters, never I or O.
    pub fn n_number<R: Rng + ?Sized>(&mut self, rng: &mut R) -> String {
        let mut candidate = String::new();
        for _ in 0..CALLSIGN_ATTEMPTS {
            let digits: u16 = rng.random_range(100..=999);
            let a = char::from(N_NUMBER_LETTERS[rng.random_range(0..N_NUMBER_LETTERS.len())]);
            let b = char::from(N_NUMBER_LETTERS[rng.random_range(0..N_NUMBER_LETTERS.len())]);
            candidate = format!("N{digits}{a}{b}");
            if self.used_callsigns.insert(candidate.clone()) {
                break;
            }
        }
        candidate
    }
}

fn pick_other<R: Rng + ?Sized>(pool: &[String], rng: &mut R, exclude: &str) -> String {
    let options: Vec<&String> = pool.iter().filter(|a| a.as_str() != exclude).collect();
    options
        .choose(rng)
        .map(|s| (*s).clone())
        .unwrap_or_else(|| exclude.to_string())
}

/// Static tables for the local fallback.
pub mod tables {
    pub const POPULAR_US_AIRPORTS: &[&str] = &[
        "KATL", "KLAX", "KORD", "KDFW", "KDEN", "KJFK", "KSFO", "KLAS", "KSEA", "KMCO", "KEWR", "KMIA",
        "KIAH", "KBOS", "KMSP", "KFLL", "KDTW", "KPHL", "KLGA", "KBWI", "KSLC", "KDCA", "KSAN", "KTPA",
        "KPDX", "KSTL", "KMDW", "KBNA", "KAUS", "KOAK", "KSNA", "KMSY", "KSMF", "KSAT", "KRSW", "KPBI",
        "KCMH", "KPIT", "KCLE", "KBUR", "KONT", "KABQ", "KSJC", "KBDL", "KPVD", "KMKE", "KRDU", "KCLT",
        "KPHX",
    ];

    pub const LESS_COMMON_AIRPORTS: &[&str] = &[
        "KSDL", "KDVT", "KCHD", "KGEU", "KFFZ", "KIWA", "KBXK", "KPRC", "KGYR", "KTUS", "KFLG", "KYUM",
        "KIGM", "KPGA", "KGCN", "KSEZ", "KINW", "KCGZ", "KBLH", "KIFP", "KBYS", "KSGU", "KCDC", "KLUF",
        "KFUL", "KEMT", "KVNY", "KHND", "KBVU", "KSNA",
    ];

    pub const COMMON_JETS: &[&str] = &[
        "B738", "A320", "B739", "A321", "B737", "A319", "B38M", "A20N", "B77W", "B788", "B789", "A359",
        "B763", "B752", "B753", "A21N", "B744", "A333", "A332", "B772",
    ];

    pub const COMMON_GA_AIRCRAFT: &[&str] = &["C172", "C182", "BE36", "C208", "PA32", "SR22", "C210", "P28A", "BE58"];

    pub const TURBOPROPS: &[&str] = &["DH8A", "DH8C", "DH8D", "AT43", "AT45", "AT72", "C208", "PC12", "TBM9"];

    pub const PISTONS: &[&str] = &["C206", "PA28", "SR20"];

    pub const JET_CRUISE_ALTITUDES: &[u32] = &[31000, 33000, 35000, 37000, 39000];

    const CRUISE_SPEEDS: &[(&str, u32)] = &[
        ("B738", 450), ("B739", 450), ("B38M", 453), ("B737", 450), ("A320", 447), ("A321", 447),
        ("A319", 447), ("A20N", 454), ("A21N", 454), ("B77W", 490), ("B788", 488), ("B789", 488),
        ("B78X", 488), ("A359", 488), ("A350", 488), ("A333", 470), ("A332", 470), ("B744", 490),
        ("B748", 490), ("B772", 490), ("B773", 490), ("B763", 459), ("B764", 459), ("B752", 459),
        ("B753", 459), ("CRJ2", 400), ("CRJ7", 447), ("CRJ9", 447), ("E145", 405), ("E170", 447),
        ("E175", 447), ("E190", 447), ("C56X", 513), ("GLF4", 476), ("GLF5", 488), ("GLF6", 516),
        ("F2TH", 450), ("FA7X", 488), ("DH8D", 287), ("DH8C", 287), ("DH8A", 243), ("AT43", 302),
        ("AT45", 302), ("AT72", 302), ("C208", 151), ("PC12", 260), ("TBM9", 330), ("C172", 110),
        ("C182", 145), ("C206", 145), ("C210", 168), ("PA28", 122), ("PA32", 144), ("P28A", 122),
        ("BE36", 169), ("BE58", 200), ("SR20", 155), ("SR22", 183), ("A306", 470), ("A310", 470),
        ("MD82", 430), ("MD83", 430), ("MD88", 430),
    ];

    pub const DEFAULT_CRUISE_SPEED: u32 = 450;

    /// Known type first, then the equipment suffix, then a generic jet.
    pub fn cruise_speed(base_type: &str, suffix: &str) -> u32 {
        if let Some((_, speed)) = CRUISE_SPEEDS.iter().find(|(t, _)| *t == base_type) {
            return *speed;
        }
        match suffix {
            "L" | "A" => 450,
            "H" | "S" => 470,
            "G" => 130,
            _ => DEFAULT_CRUISE_SPEED,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ExternalSourceError;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    struct Offline;

    impl FlightPlanSource for Offline {
        fn name(&self) -> &str {
            "offline"
        }

        fn candidates(&self, _: &FlightPlanQuery) -> Result<Vec<SourcedPlan>, ExternalSourceError> {
            Err(ExternalSourceError::Timeout)
        }
    }

    struct Canned(Vec<SourcedPlan>);

    impl FlightPlanSource for Canned {
        fn name(&self) -> &str {
            "canned"
        }

        fn candidates(&self, _: &FlightPlanQuery) -> Result<Vec<SourcedPlan>, ExternalSourceError> {
            Ok(self.0.clone())
        }
    }

    fn departure(airline: Option<&str>) -> PlanRequest {
        PlanRequest {
            departure: "KPHX".into(),
            airline: airline.map(str::to_string),
            ..Default::default()
        }
    }

    #[test]
    fn test_timeout_falls_back_to_local() {
        let mut rng = StdRng::seed_from_u64(7);
        let mut synth = FlightPlanSynthesizer::new(Some(Arc::new(Offline)));
        let aircraft = synth.airline(&mut rng, departure(Some("AAL")));
        assert!(aircraft.callsign.starts_with("AAL"));
        assert!(aircraft.aircraft_type.ends_with("/L"));
        assert_eq!(aircraft.flight_plan.route, "DCT");
        assert_ne!(aircraft.flight_plan.destination, "KPHX");
        assert_eq!(synth.fallbacks(), 1);
    }

    #[test]
    fn test_remote_plan_used_when_available() {
        let mut rng = StdRng::seed_from_u64(8);
        let canned = Canned(vec![SourcedPlan {
            callsign: Some("SWA1234".into()),
            aircraft_type: Some("B38M/L".into()),
            route: Some("BXK6.BXK J169 TNP.ANJLL4.25L".into()),
            cruise_altitude_ft: Some(36000),
            cruise_speed_kt: None,
        }]);
        let mut synth = FlightPlanSynthesizer::new(Some(Arc::new(canned)));
        let aircraft = synth.airline(&mut rng, departure(None));
        assert_eq!(aircraft.callsign, "SWA1234");
        assert_eq!(aircraft.flight_plan.aircraft_type, "B38M");
        assert_eq!(aircraft.flight_plan.route, "BXK6.BXK J169 TNP.ANJLL4");
        assert_eq!(aircraft.flight_plan.cruise_altitude, 36000);
        assert_eq!(aircraft.flight_plan.cruise_speed, 453);
        assert_eq!(synth.fallbacks(), 0);
    }

    #[test]
    fn test_n_number_format() {
        let mut rng = StdRng::seed_from_u64(9);
        let mut synth = FlightPlanSynthesizer::new(None);
        for _ in 0..500 {
            let cs = synth.n_number(&mut rng);
            let bytes = cs.as_bytes();
            assert_eq!(bytes.len(), 6, "{cs}");
            assert_eq!(bytes[0], b'N');
            assert!(bytes[1..4].iter().all(u8::is_ascii_digit));
            assert!(bytes[4..].iter().all(|b| b.is_ascii_uppercase() && *b != b'I' && *b != b'O'));
        }
    }

    #[test]
    fn test_general_aviation_overrides() {
        let mut rng = StdRng::seed_from_u64(10);
        let mut synth = FlightPlanSynthesizer::new(Some(Arc::new(Offline)));
        let ga = synth.general_aviation(&mut rng, departure(None));
        assert_eq!(ga.category, AircraftCategory::GeneralAviation);
        assert!(ga.aircraft_type.ends_with("/G"));
        assert!((3000..=8000).contains(&ga.flight_plan.cruise_altitude));
        assert!(tables::LESS_COMMON_AIRPORTS.contains(&ga.flight_plan.destination.as_str()));
        assert_eq!(synth.fallbacks(), 0);
    }

    #[test]
    fn test_shared_callsign_suffix() {
        let mut rng = StdRng::seed_from_u64(11);
        let mut synth = FlightPlanSynthesizer::new(None);
        let mut request = departure(Some("UAL"));
        request.callsign_suffix = Some("42".into());
        let a = synth.airline(&mut rng, request.clone());
        let b = synth.airline(&mut rng, request);
        assert!(a.callsign.ends_with("42") && b.callsign.ends_with("42"));
        assert_ne!(a.callsign, b.callsign);
    }

    #[test]
    fn test_helpers() {
        assert_eq!(base_type("B738/L"), "B738");
        assert_eq!(equipment_suffix("B738"), "L");
        assert_eq!(equipment_suffix("C172/G"), "G");
        assert_eq!(strip_runway_suffix("EAGUL6.7R"), "EAGUL6");
        assert_eq!(strip_runway_suffix("J169 BXK6.BXK"), "J169 BXK6.BXK");
        assert_eq!(EngineType::for_type("C208"), EngineType::Turboprop);
        assert_eq!(EngineType::for_type("C172"), EngineType::Piston);
        assert_eq!(EngineType::for_type("B738"), EngineType::Jet);
        assert_eq!(tables::cruise_speed("ZZZZ", "H"), 470);
    }
}
