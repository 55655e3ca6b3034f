//! Scenario entity model, serialized in the simulator's import format.

use crate::flight_plan::{AircraftCategory, EngineType, FlightPlan};
use crate::spatial::GeoPoint;
use rand::Rng;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Where and how an aircraft enters the session. Each variant only carries
/// the fields valid for it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum StartingConditions {
    Parking {
        parking: String,
    },
    OnFinal {
        runway: String,
        #[serde(rename = "distanceFromRunway")]
        distance_nm: f64,
        speed: u32,
        #[serde(rename = "finalApproachCourseOffset", default, skip_serializing_if = "Option::is_none")]
        course_offset_deg: Option<f64>,
    },
    FixOrFrd {
        fix: String,
        altitude: u32,
        speed: u32,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        heading: Option<f64>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        mach: Option<f64>,
        #[serde(rename = "navigationPath", default, skip_serializing_if = "Option::is_none")]
        navigation_path: Option<String>,
    },
    OnRunway {
        runway: String,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartingConditionsKind {
    Parking,
    OnFinal,
    FixOrFrd,
    OnRunway,
}

impl StartingConditions {
    /// Variant with every required field empty or zero.
    pub fn empty(kind: StartingConditionsKind) -> Self {
        match kind {
            StartingConditionsKind::Parking => Self::Parking { parking: String::new() },
            StartingConditionsKind::OnFinal => Self::OnFinal {
                runway: String::new(),
                distance_nm: 0.0,
                speed: 0,
                course_offset_deg: None,
            },
            StartingConditionsKind::FixOrFrd => Self::FixOrFrd {
                fix: String::new(),
                altitude: 0,
                speed: 0,
                heading: None,
                mach: None,
                navigation_path: None,
            },
            StartingConditionsKind::OnRunway => Self::OnRunway { runway: String::new() },
        }
    }

    pub fn kind(&self) -> StartingConditionsKind {
        match self {
            Self::Parking { .. } => StartingConditionsKind::Parking,
            Self::OnFinal { .. } => StartingConditionsKind::OnFinal,
            Self::FixOrFrd { .. } => StartingConditionsKind::FixOrFrd,
            Self::OnRunway { .. } => StartingConditionsKind::OnRunway,
        }
    }

    /// Airborne starts follow the simulator's altitude profile.
    pub fn is_airborne(&self) -> bool {
        matches!(self, Self::OnFinal { .. } | Self::FixOrFrd { .. })
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Difficulty {
    #[default]
    Easy,
    Medium,
    Hard,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransponderMode {
    #[default]
    C,
    Standby,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PresetCommand {
    pub id: String,
    #[serde(rename = "command")]
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Aircraft {
    pub id: String,
    /// Callsign.
    pub aircraft_id: String,
    /// Type with equipment suffix.
    pub aircraft_type: String,
    #[serde(default)]
    pub transponder_mode: TransponderMode,
    pub starting_conditions: StartingConditions,
    #[serde(default)]
    pub on_altitude_profile: bool,
    #[serde(rename = "flightplan", default, skip_serializing_if = "Option::is_none")]
    pub flight_plan: Option<FlightPlan>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub preset_commands: Vec<PresetCommand>,
    #[serde(default)]
    pub difficulty: Difficulty,
    /// Seconds after session start.
    #[serde(default)]
    pub spawn_delay: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub airport_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expected_approach: Option<String>,
}

impl Aircraft {
    /// Change the starting-conditions variant. Fields of the old variant are
    /// dropped and the new one starts empty; same-variant switches keep data.
    pub fn switch_starting_conditions(&mut self, kind: StartingConditionsKind) {
        if self.starting_conditions.kind() == kind {
            return;
        }
        self.starting_conditions = StartingConditions::empty(kind);
        self.on_altitude_profile = self.starting_conditions.is_airborne();
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum AutoDeleteMode {
    #[default]
    None,
    OnLanding,
    Parked,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Scenario {
    pub name: String,
    pub artcc_id: String,
    pub primary_airport_id: String,
    pub aircraft: Vec<Aircraft>,
    #[serde(default)]
    pub initialization_triggers: Vec<Value>,
    #[serde(default)]
    pub aircraft_generators: Vec<Value>,
    #[serde(default)]
    pub atc: Vec<Value>,
    #[serde(default)]
    pub flight_strip_configurations: Vec<Value>,
    #[serde(default)]
    pub auto_delete_mode: AutoDeleteMode,
}

/// Squawk code stored as its four octal digits, e.g. 1200.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Squawk(pub u16);

impl Squawk {
    pub const VFR: Squawk = Squawk(1200);

    pub fn is_valid(self) -> bool {
        self.0 <= 7777 && self.0.to_string().bytes().all(|b| (b'0'..=b'7').contains(&b))
    }
}

impl Default for Squawk {
    fn default() -> Self {
        Self::VFR
    }
}

impl std::fmt::Display for Squawk {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:04}", self.0)
    }
}

/// Physical state at spawn, used by the line-oriented playback format.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Kinematics {
    pub position: GeoPoint,
    pub altitude_ft: f64,
    pub heading_deg: f64,
    pub ground_speed_kt: f64,
}

/// An aircraft as produced by the placement engine.
#[derive(Debug, Clone, PartialEq)]
pub struct GeneratedAircraft {
    pub aircraft: Aircraft,
    pub kinematics: Kinematics,
    pub engine: EngineType,
    pub category: AircraftCategory,
    pub squawk: Squawk,
}

/// Random v4-format id drawn from `rng`, so seeded runs are reproducible.
pub fn new_id<R: Rng + ?Sized>(rng: &mut R) -> String {
    let mut bytes = [0u8; 16];
    rng.fill(&mut bytes);
    uuid::Builder::from_random_bytes(bytes).into_uuid().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn aircraft(conditions: StartingConditions) -> Aircraft {
        Aircraft {
            id: "id".into(),
            aircraft_id: "AAL123".into(),
            aircraft_type: "B738/L".into(),
            transponder_mode: TransponderMode::C,
            on_altitude_profile: conditions.is_airborne(),
            starting_conditions: conditions,
            flight_plan: None,
            preset_commands: Vec::new(),
            difficulty: Difficulty::Easy,
            spawn_delay: 0,
            airport_id: None,
            expected_approach: None,
        }
    }

    #[test]
    fn test_switch_from_fix_to_parking_clears_fields() {
        let mut a = aircraft(StartingConditions::FixOrFrd {
            fix: "EAGUL".into(),
            altitude: 12000,
            speed: 280,
            heading: Some(220.0),
            mach: Some(0.78),
            navigation_path: Some("EAGUL PINNG".into()),
        });
        a.switch_starting_conditions(StartingConditionsKind::Parking);
        assert_eq!(a.starting_conditions, StartingConditions::Parking { parking: String::new() });
        assert!(!a.on_altitude_profile);

        let json = serde_json::to_value(&a.starting_conditions).unwrap();
        assert_eq!(json, serde_json::json!({"type": "Parking", "parking": ""}));
    }

    #[test]
    fn test_switch_to_on_final_initializes_empty() {
        let mut a = aircraft(StartingConditions::Parking { parking: "A1".into() });
        a.switch_starting_conditions(StartingConditionsKind::OnFinal);
        assert_eq!(a.starting_conditions, StartingConditions::empty(StartingConditionsKind::OnFinal));
        assert!(a.on_altitude_profile);
    }

    #[test]
    fn test_switch_to_same_variant_keeps_data() {
        let mut a = aircraft(StartingConditions::Parking { parking: "A1".into() });
        a.switch_starting_conditions(StartingConditionsKind::Parking);
        assert_eq!(a.starting_conditions, StartingConditions::Parking { parking: "A1".into() });
    }

    #[test]
    fn test_starting_conditions_wire_names() {
        let on_final = StartingConditions::OnFinal {
            runway: "25L".into(),
            distance_nm: 6.0,
            speed: 150,
            course_offset_deg: None,
        };
        let json = serde_json::to_value(&on_final).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"type": "OnFinal", "runway": "25L", "distanceFromRunway": 6.0, "speed": 150})
        );
    }

    #[test]
    fn test_optional_aircraft_fields_omitted() {
        let json = serde_json::to_value(aircraft(StartingConditions::OnRunway { runway: "8".into() })).unwrap();
        let obj = json.as_object().unwrap();
        assert!(!obj.contains_key("flightplan"));
        assert!(!obj.contains_key("presetCommands"));
        assert!(!obj.contains_key("airportId"));
        assert_eq!(obj["transponderMode"], "C");
        assert_eq!(obj["difficulty"], "Easy");
    }

    #[test]
    fn test_squawk() {
        assert_eq!(Squawk(1200).to_string(), "1200");
        assert_eq!(Squawk(23).to_string(), "0023");
        assert!(Squawk(7700).is_valid());
        assert!(!Squawk(1280).is_valid());
        assert!(!Squawk(17777).is_valid());
    }

    #[test]
    fn test_ids_are_seeded_and_distinct() {
        let mut a = StdRng::seed_from_u64(1);
        let mut b = StdRng::seed_from_u64(1);
        let first = new_id(&mut a);
        assert_eq!(first, new_id(&mut b));
        assert_ne!(first, new_id(&mut a));
        assert_eq!(first.len(), 36);
    }
}
