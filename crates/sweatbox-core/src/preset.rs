//! Preset commands: templated instructions attached to matching aircraft.

use crate::flight_plan::{base_type, AircraftCategory, EngineType, FlightRules};
use crate::models::{new_id, Difficulty, GeneratedAircraft, PresetCommand, StartingConditions};
use rand::seq::IndexedRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};

const MISSING: &str = "N/A";

/// Which aircraft a rule applies to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "group", content = "value", rename_all = "snake_case")]
pub enum PresetGroup {
    All,
    Departures,
    Arrivals,
    Airline(String),
    Destination(String),
    Origin(String),
    AircraftType(String),
    /// Exact name, `B1-B11` range or `B#` prefix wildcard.
    Parking(String),
    /// Trailing version digits are ignored: `EAGUL` matches `EAGUL6`.
    Star(String),
    /// `n` aircraft drawn at random, independently per rule.
    Random(usize),
}

impl PresetGroup {
    /// General rules run first so specific ones land last in the list.
    pub fn specificity(&self) -> u8 {
        match self {
            PresetGroup::All => 0,
            PresetGroup::Departures | PresetGroup::Arrivals => 1,
            PresetGroup::Random(_) => 2,
            PresetGroup::Airline(_)
            | PresetGroup::Destination(_)
            | PresetGroup::Origin(_)
            | PresetGroup::AircraftType(_)
            | PresetGroup::Star(_) => 3,
            PresetGroup::Parking(_) => 4,
        }
    }

    pub fn matches(&self, aircraft: &GeneratedAircraft) -> bool {
        let plan = aircraft.aircraft.flight_plan.as_ref();
        match self {
            PresetGroup::All => true,
            PresetGroup::Departures => parking_of(aircraft).is_some(),
            PresetGroup::Arrivals => parking_of(aircraft).is_none(),
            PresetGroup::Airline(code) => operator(aircraft).is_some_and(|op| op.eq_ignore_ascii_case(code)),
            PresetGroup::Destination(icao) => plan.is_some_and(|p| p.destination.eq_ignore_ascii_case(icao)),
            PresetGroup::Origin(icao) => plan.is_some_and(|p| p.departure.eq_ignore_ascii_case(icao)),
            PresetGroup::AircraftType(wanted) => {
                base_type(&aircraft.aircraft.aircraft_type).eq_ignore_ascii_case(base_type(wanted))
            }
            PresetGroup::Parking(pattern) => parking_of(aircraft).is_some_and(|spot| parking_matches(spot, pattern)),
            PresetGroup::Star(name) => {
                star_of(aircraft).is_some_and(|star| procedure_family(&star) == procedure_family(name))
            }
            PresetGroup::Random(_) => false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PresetCommandRule {
    #[serde(flatten)]
    pub group: PresetGroup,
    #[serde(rename = "command")]
    pub template: String,
}

impl PresetCommandRule {
    pub fn new(group: PresetGroup, template: impl Into<String>) -> Self {
        Self {
            group,
            template: template.into(),
        }
    }
}

/// Append commands from `rules` to every matching aircraft. Rules run from
/// general to specific; rules of equal specificity keep their given order.
pub fn apply_preset_commands<R: Rng + ?Sized>(
    aircraft: &mut [GeneratedAircraft],
    rules: &[PresetCommandRule],
    rng: &mut R,
) {
    let mut ordered: Vec<&PresetCommandRule> = rules.iter().collect();
    ordered.sort_by_key(|rule| rule.group.specificity());

    for rule in ordered {
        let targets: Vec<usize> = match rule.group {
            PresetGroup::Random(count) => {
                if count == 0 || count > aircraft.len() {
                    tracing::debug!("skipping random preset rule for {count} of {} aircraft", aircraft.len());
                    continue;
                }
                let indices: Vec<usize> = (0..aircraft.len()).collect();
                indices.choose_multiple(rng, count).copied().collect()
            }
            _ => (0..aircraft.len()).filter(|&i| rule.group.matches(&aircraft[i])).collect(),
        };
        for i in targets {
            let text = substitute_variables(&rule.template, &aircraft[i]);
            aircraft[i].aircraft.preset_commands.push(PresetCommand { id: new_id(rng), text });
        }
    }
}

/// Replace `$variables` in `template`. Longer names go first so `$arrival` is
/// never read as `$arr` + `ival`.
pub fn substitute_variables(template: &str, aircraft: &GeneratedAircraft) -> String {
    let mut names: Vec<&str> = VARIABLES.iter().map(|(name, _)| *name).collect();
    names.sort_by_key(|name| std::cmp::Reverse(name.len()));

    let mut result = template.to_string();
    for name in names {
        if !result.contains(name) {
            continue;
        }
        let value = VARIABLES
            .iter()
            .find(|(n, _)| *n == name)
            .and_then(|(_, field)| field.value(aircraft))
            .filter(|v| !v.is_empty())
            .unwrap_or_else(|| MISSING.to_string());
        result = result.replace(name, &value);
    }
    result
}

#[derive(Debug, Clone, Copy)]
enum Field {
    Callsign,
    Type,
    Operator,
    Departure,
    Arrival,
    Gate,
    Runway,
    Fix,
    Star,
    Altitude,
    Speed,
    Heading,
    Route,
    CruiseAltitude,
    CruiseSpeed,
    Difficulty,
    Remarks,
    Latitude,
    Longitude,
    Mach,
    FlightRules,
    Sid,
    Registration,
    Engine,
    Approach,
}

const VARIABLES: &[(&str, Field)] = &[
    ("$aid", Field::Callsign),
    ("$type", Field::Type),
    ("$operator", Field::Operator),
    ("$departure", Field::Departure),
    ("$arrival", Field::Arrival),
    ("$gate", Field::Gate),
    ("$runway", Field::Runway),
    ("$fix", Field::Fix),
    ("$star", Field::Star),
    ("$altitude", Field::Altitude),
    ("$speed", Field::Speed),
    ("$heading", Field::Heading),
    ("$route", Field::Route),
    ("$cruise_altitude", Field::CruiseAltitude),
    ("$cruise_speed", Field::CruiseSpeed),
    ("$difficulty", Field::Difficulty),
    ("$remarks", Field::Remarks),
    ("$latitude", Field::Latitude),
    ("$longitude", Field::Longitude),
    ("$mach", Field::Mach),
    ("$flight_rules", Field::FlightRules),
    ("$sid", Field::Sid),
    ("$registration", Field::Registration),
    ("$engine", Field::Engine),
    ("$approach", Field::Approach),
    ("$callsign", Field::Callsign),
    ("$actype", Field::Type),
    ("$airline", Field::Operator),
    ("$dep", Field::Departure),
    ("$origin", Field::Departure),
    ("$arr", Field::Arrival),
    ("$dest", Field::Arrival),
    ("$destination", Field::Arrival),
    ("$lat", Field::Latitude),
    ("$lon", Field::Longitude),
    ("$alt", Field::Altitude),
    ("$spd", Field::Speed),
    ("$gs", Field::Speed),
    ("$groundspeed", Field::Speed),
    ("$hdg", Field::Heading),
    ("$cruise_alt", Field::CruiseAltitude),
    ("$cruise_spd", Field::CruiseSpeed),
    ("$rules", Field::FlightRules),
    ("$rwy", Field::Runway),
    ("$arrival_runway", Field::Runway),
    ("$parking", Field::Gate),
    ("$spot", Field::Gate),
    ("$tail", Field::Registration),
];

impl Field {
    fn value(self, g: &GeneratedAircraft) -> Option<String> {
        let plan = g.aircraft.flight_plan.as_ref();
        match self {
            Field::Callsign => Some(g.aircraft.aircraft_id.clone()),
            Field::Type => Some(g.aircraft.aircraft_type.clone()),
            Field::Operator => operator(g).map(str::to_string),
            Field::Departure => plan.map(|p| p.departure.clone()),
            Field::Arrival => plan.map(|p| p.destination.clone()),
            Field::Gate => parking_of(g).map(str::to_string),
            Field::Runway => match &g.aircraft.starting_conditions {
                StartingConditions::OnFinal { runway, .. } | StartingConditions::OnRunway { runway } => {
                    Some(runway.clone())
                }
                _ => None,
            },
            Field::Fix => match &g.aircraft.starting_conditions {
                StartingConditions::FixOrFrd { fix, .. } => Some(fix.clone()),
                _ => None,
            },
            Field::Star => star_of(g),
            Field::Altitude => Some(format!("{:.0}", g.kinematics.altitude_ft)),
            Field::Speed => Some(format!("{:.0}", g.kinematics.ground_speed_kt)),
            Field::Heading => Some(format!("{:03.0}", g.kinematics.heading_deg)),
            Field::Route => plan.map(|p| p.route.clone()),
            Field::CruiseAltitude => plan.map(|p| p.cruise_altitude.to_string()),
            Field::CruiseSpeed => plan.map(|p| p.cruise_speed.to_string()),
            Field::Difficulty => Some(
                match g.aircraft.difficulty {
                    Difficulty::Easy => "Easy",
                    Difficulty::Medium => "Medium",
                    Difficulty::Hard => "Hard",
                }
                .to_string(),
            ),
            Field::Remarks => plan.map(|p| p.remarks.clone()),
            Field::Latitude => Some(format!("{:.6}", g.kinematics.position.lat)),
            Field::Longitude => Some(format!("{:.6}", g.kinematics.position.lon)),
            Field::Mach => match &g.aircraft.starting_conditions {
                StartingConditions::FixOrFrd { mach: Some(mach), .. } => Some(format!("{mach:.2}")),
                _ => None,
            },
            Field::FlightRules => plan.map(|p| {
                match p.rules {
                    FlightRules::Ifr => "IFR",
                    FlightRules::Vfr => "VFR",
                }
                .to_string()
            }),
            Field::Sid => sid_of(g),
            Field::Registration => {
                (g.category == AircraftCategory::GeneralAviation).then(|| g.aircraft.aircraft_id.clone())
            }
            Field::Engine => Some(
                match g.engine {
                    EngineType::Jet => "Jet",
                    EngineType::Turboprop => "Turboprop",
                    EngineType::Piston => "Piston",
                }
                .to_string(),
            ),
            Field::Approach => g.aircraft.expected_approach.clone(),
        }
    }
}

fn parking_of(g: &GeneratedAircraft) -> Option<&str> {
    match &g.aircraft.starting_conditions {
        StartingConditions::Parking { parking } if !parking.is_empty() => Some(parking),
        _ => None,
    }
}

/// Airline code from the callsign's leading letters; GA has none.
fn operator(g: &GeneratedAircraft) -> Option<&str> {
    if g.category == AircraftCategory::GeneralAviation {
        return None;
    }
    let callsign = g.aircraft.aircraft_id.as_str();
    let end = callsign.find(|c: char| !c.is_ascii_alphabetic()).unwrap_or(callsign.len());
    (end > 0).then(|| &callsign[..end])
}

/// STAR named in the last dotted route element of an arrival (`EAGUL.EAGUL6`).
fn star_of(g: &GeneratedAircraft) -> Option<String> {
    if parking_of(g).is_some() {
        return None;
    }
    let route = &g.aircraft.flight_plan.as_ref()?.route;
    let last = route.split_whitespace().last()?;
    let (_, star) = last.rsplit_once('.')?;
    (!star.is_empty()).then(|| star.to_string())
}

/// SID named in the first dotted route element of a departure (`BXK6.BXK`).
fn sid_of(g: &GeneratedAircraft) -> Option<String> {
    if !matches!(
        g.aircraft.starting_conditions,
        StartingConditions::Parking { .. } | StartingConditions::OnRunway { .. }
    ) {
        return None;
    }
    let route = &g.aircraft.flight_plan.as_ref()?.route;
    let first = route.split_whitespace().find(|token| token.contains('.'))?;
    let (sid, _) = first.split_once('.')?;
    (!sid.is_empty()).then(|| sid.to_string())
}

fn procedure_family(name: &str) -> String {
    name.trim().to_ascii_uppercase().trim_end_matches(|c: char| c.is_ascii_digit()).to_string()
}

/// Exact name, `B1-B11` range (same prefix both sides) or `B#` prefix wildcard.
pub fn parking_matches(spot: &str, pattern: &str) -> bool {
    if spot.is_empty() {
        return false;
    }
    if spot == pattern {
        return true;
    }
    if let Some(prefix) = pattern.strip_suffix('#') {
        return spot.starts_with(prefix);
    }
    match (split_gate(spot), pattern.split_once('-')) {
        (Some((prefix, number)), Some((from, to))) => match (split_gate(from), split_gate(to)) {
            (Some((p1, lo)), Some((p2, hi))) => p1 == p2 && p1 == prefix && (lo..=hi).contains(&number),
            _ => false,
        },
        _ => false,
    }
}

/// `B11` → `("B", 11)`.
fn split_gate(name: &str) -> Option<(&str, u32)> {
    let digits = name.find(|c: char| c.is_ascii_digit())?;
    let (prefix, number) = name.split_at(digits);
    if prefix.is_empty() || !prefix.bytes().all(|b| b.is_ascii_alphabetic()) {
        return None;
    }
    Some((prefix, number.parse().ok()?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flight_plan::{EngineType, FlightPlan, FlightRules};
    use crate::models::{Aircraft, Kinematics, Squawk, TransponderMode};
    use crate::spatial::GeoPoint;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn generated(callsign: &str, conditions: StartingConditions, route: &str) -> GeneratedAircraft {
        GeneratedAircraft {
            aircraft: Aircraft {
                id: callsign.to_lowercase(),
                aircraft_id: callsign.into(),
                aircraft_type: "B738/L".into(),
                transponder_mode: TransponderMode::C,
                on_altitude_profile: conditions.is_airborne(),
                starting_conditions: conditions,
                flight_plan: Some(FlightPlan {
                    rules: FlightRules::Ifr,
                    departure: "KPHX".into(),
                    destination: "KLAX".into(),
                    cruise_altitude: 35000,
                    cruise_speed: 450,
                    route: route.into(),
                    remarks: "/V/".into(),
                    aircraft_type: "B738".into(),
                }),
                preset_commands: Vec::new(),
                difficulty: Difficulty::Medium,
                spawn_delay: 0,
                airport_id: None,
                expected_approach: None,
            },
            kinematics: Kinematics {
                position: GeoPoint::new(33.4, -112.0),
                altitude_ft: 11000.0,
                heading_deg: 90.0,
                ground_speed_kt: 250.0,
            },
            engine: EngineType::Jet,
            category: AircraftCategory::Airline,
            squawk: Squawk(4521),
        }
    }

    fn parked(callsign: &str, spot: &str) -> GeneratedAircraft {
        generated(callsign, StartingConditions::Parking { parking: spot.into() }, "BXK6.BXK")
    }

    fn arriving(callsign: &str) -> GeneratedAircraft {
        generated(
            callsign,
            StartingConditions::FixOrFrd {
                fix: "EAGUL".into(),
                altitude: 11000,
                speed: 250,
                heading: Some(90.0),
                mach: None,
                navigation_path: None,
            },
            "EAGUL.EAGUL6",
        )
    }

    fn texts(g: &GeneratedAircraft) -> Vec<&str> {
        g.aircraft.preset_commands.iter().map(|c| c.text.as_str()).collect()
    }

    #[test]
    fn test_longest_variable_first() {
        let g = arriving("AAL123");
        assert_eq!(substitute_variables("$arrival/$arr", &g), "KLAX/KLAX");
        assert_eq!(substitute_variables("$aid DESCEND $alt", &g), "AAL123 DESCEND 11000");
        assert_eq!(substitute_variables("$cruise_altitude $hdg", &g), "35000 090");
    }

    #[test]
    fn test_missing_values_become_na() {
        let g = arriving("AAL123");
        assert_eq!(substitute_variables("GATE $gate RWY $runway", &g), "GATE N/A RWY N/A");
        assert_eq!(substitute_variables("$star via $fix", &g), "EAGUL6 via EAGUL");
    }

    #[test]
    fn test_position_and_plan_variables() {
        let g = arriving("AAL123");
        assert_eq!(substitute_variables("$lat/$lon", &g), "33.400000/-112.000000");
        assert_eq!(substitute_variables("$latitude $longitude", &g), "33.400000 -112.000000");
        assert_eq!(substitute_variables("$origin-$dest-$destination", &g), "KPHX-KLAX-KLAX");
        assert_eq!(substitute_variables("$actype $airline $engine", &g), "B738/L AAL Jet");
        assert_eq!(substitute_variables("$gs $groundspeed $speed", &g), "250 250 250");
        assert_eq!(substitute_variables("$cruise_alt@$cruise_spd", &g), "35000@450");
        assert_eq!(substitute_variables("$rules $flight_rules", &g), "IFR IFR");
    }

    #[test]
    fn test_situational_variables_fall_back() {
        let g = arriving("AAL123");
        assert_eq!(
            substitute_variables("$mach $sid $tail $spot $arrival_runway $approach", &g),
            "N/A N/A N/A N/A N/A N/A"
        );

        let mut cruising = arriving("AAL124");
        if let StartingConditions::FixOrFrd { mach, .. } = &mut cruising.aircraft.starting_conditions {
            *mach = Some(0.78);
        }
        cruising.aircraft.expected_approach = Some("I25L".into());
        assert_eq!(substitute_variables("$mach $approach", &cruising), "0.78 I25L");

        let departure = parked("SWA9", "B3");
        assert_eq!(substitute_variables("$sid from $spot", &departure), "BXK6 from B3");

        let mut ga = parked("N172SP", "GA1");
        ga.category = AircraftCategory::GeneralAviation;
        ga.engine = EngineType::Piston;
        assert_eq!(substitute_variables("$tail $registration $airline $engine", &ga), "N172SP N172SP N/A Piston");
    }

    #[test]
    fn test_parking_patterns() {
        assert!(parking_matches("B3", "B3"));
        assert!(parking_matches("B11", "B1-B11"));
        assert!(!parking_matches("B12", "B1-B11"));
        assert!(!parking_matches("C3", "B1-C11"));
        assert!(parking_matches("B27", "B#"));
        assert!(!parking_matches("A2", "B#"));
        assert!(!parking_matches("", "#"));
    }

    #[test]
    fn test_rules_apply_general_to_specific() {
        let mut fleet = vec![parked("AAL1", "B3"), parked("SWA2", "C1"), arriving("AAL3")];
        let rules = vec![
            PresetCommandRule::new(PresetGroup::Parking("B#".into()), "PUSHBACK $gate"),
            PresetCommandRule::new(PresetGroup::Airline("aal".into()), "CONTACT $operator"),
            PresetCommandRule::new(PresetGroup::Departures, "TAXI"),
            PresetCommandRule::new(PresetGroup::All, "SQUAWK"),
            PresetCommandRule::new(PresetGroup::Star("EAGUL".into()), "DESCEND VIA $star"),
        ];
        let mut rng = StdRng::seed_from_u64(1);
        apply_preset_commands(&mut fleet, &rules, &mut rng);

        assert_eq!(texts(&fleet[0]), vec!["SQUAWK", "TAXI", "CONTACT AAL", "PUSHBACK B3"]);
        assert_eq!(texts(&fleet[1]), vec!["SQUAWK", "TAXI"]);
        assert_eq!(texts(&fleet[2]), vec!["SQUAWK", "CONTACT AAL", "DESCEND VIA EAGUL6"]);
    }

    #[test]
    fn test_random_rule_picks_exactly_n() {
        let mut fleet: Vec<_> = (0..6).map(|i| parked(&format!("AAL{i}"), &format!("A{i}"))).collect();
        let rules = vec![PresetCommandRule::new(PresetGroup::Random(2), "HOLD")];
        apply_preset_commands(&mut fleet, &rules, &mut StdRng::seed_from_u64(9));
        assert_eq!(fleet.iter().filter(|g| !g.aircraft.preset_commands.is_empty()).count(), 2);

        let too_many = vec![PresetCommandRule::new(PresetGroup::Random(7), "HOLD")];
        apply_preset_commands(&mut fleet, &too_many, &mut StdRng::seed_from_u64(9));
        assert_eq!(fleet.iter().map(|g| g.aircraft.preset_commands.len()).sum::<usize>(), 2);
    }

    #[test]
    fn test_ids_unique_and_kept_on_reapply() {
        let mut fleet = vec![parked("AAL1", "B3")];
        let rules = vec![
            PresetCommandRule::new(PresetGroup::All, "ONE"),
            PresetCommandRule::new(PresetGroup::All, "TWO"),
        ];
        let mut rng = StdRng::seed_from_u64(4);
        apply_preset_commands(&mut fleet, &rules[..1], &mut rng);
        let first_id = fleet[0].aircraft.preset_commands[0].id.clone();
        apply_preset_commands(&mut fleet, &rules[1..], &mut rng);
        let ids: Vec<&str> = fleet[0].aircraft.preset_commands.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids[0], first_id);
        assert_ne!(ids[0], ids[1]);
    }

    #[test]
    fn test_rule_json_shape() {
        let rule: PresetCommandRule =
            serde_json::from_str(r#"{"group":"parking","value":"B1-B11","command":"PUSH $gate"}"#).unwrap();
        assert_eq!(rule.group, PresetGroup::Parking("B1-B11".into()));
        let all: PresetCommandRule = serde_json::from_str(r#"{"group":"all","command":"X"}"#).unwrap();
        assert_eq!(all.group, PresetGroup::All);
        let random: PresetCommandRule = serde_json::from_str(r#"{"group":"random","value":3,"command":"X"}"#).unwrap();
        assert_eq!(random.group.specificity(), 2);
    }
}
