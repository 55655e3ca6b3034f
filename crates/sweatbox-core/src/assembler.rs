//! Scenario assembly and the two output formats: the structured JSON
//! document and the colon-delimited `.air` playback file.

use crate::airport::short_airport_id;
use crate::error::{GenerationError, Result};
use crate::flight_plan::{EngineType, FlightRules};
use crate::models::{AutoDeleteMode, GeneratedAircraft, Scenario, Squawk, StartingConditions, TransponderMode};
use chrono::{DateTime, TimeZone};
use std::fmt;
use std::str::FromStr;

const LEGACY_FIELDS: usize = 16;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScenarioMetadata {
    pub name: Option<String>,
    pub artcc_id: String,
    /// Full ICAO code of the primary airport.
    pub primary_airport: String,
}

impl ScenarioMetadata {
    pub fn new(artcc_id: impl Into<String>, primary_airport: impl Into<String>) -> Self {
        Self {
            name: None,
            artcc_id: artcc_id.into(),
            primary_airport: primary_airport.into(),
        }
    }

    pub fn with_name(mut self, name: Option<String>) -> Self {
        self.name = name.filter(|n| !n.trim().is_empty());
        self
    }

    pub fn scenario_name(&self) -> String {
        self.name
            .clone()
            .unwrap_or_else(|| format!("Generated Scenario - {}", self.primary_airport))
    }
}

/// `{short}_{DDHHMM}`, e.g. `PHX_181432`.
pub fn output_stem<Tz: TimeZone>(icao: &str, at: &DateTime<Tz>) -> String
where
    Tz::Offset: fmt::Display,
{
    format!("{}_{}", short_airport_id(icao), at.format("%d%H%M"))
}

/// Build the scenario document. Only values that cannot be written are rejected.
pub fn assemble(metadata: &ScenarioMetadata, aircraft: &[GeneratedAircraft]) -> Result<Scenario> {
    for g in aircraft {
        check_representable(g)?;
    }
    Ok(Scenario {
        name: metadata.scenario_name(),
        artcc_id: metadata.artcc_id.clone(),
        primary_airport_id: short_airport_id(&metadata.primary_airport).to_string(),
        aircraft: aircraft.iter().map(|g| g.aircraft.clone()).collect(),
        initialization_triggers: Vec::new(),
        aircraft_generators: Vec::new(),
        atc: Vec::new(),
        flight_strip_configurations: Vec::new(),
        auto_delete_mode: AutoDeleteMode::None,
    })
}

fn check_representable(g: &GeneratedAircraft) -> Result<()> {
    let callsign = &g.aircraft.aircraft_id;
    let fail = |what: String| Err(GenerationError::Serialization(format!("{callsign}: {what}")));
    match &g.aircraft.starting_conditions {
        StartingConditions::OnFinal { distance_nm, course_offset_deg, .. } => {
            if !distance_nm.is_finite() || *distance_nm < 0.0 {
                return fail(format!("distance from runway {distance_nm} NM"));
            }
            if course_offset_deg.is_some_and(|c| !c.is_finite()) {
                return fail("non-finite final approach course offset".into());
            }
        }
        StartingConditions::FixOrFrd { heading, mach, .. } => {
            if heading.is_some_and(|h| !h.is_finite()) || mach.is_some_and(|m| !m.is_finite() || m < 0.0) {
                return fail("non-finite heading or mach".into());
            }
        }
        StartingConditions::Parking { .. } | StartingConditions::OnRunway { .. } => {}
    }
    Ok(())
}

impl Scenario {
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self).map_err(|err| GenerationError::Serialization(err.to_string()))
    }

    pub fn from_json(text: &str) -> Result<Self> {
        serde_json::from_str(text).map_err(|err| {
            GenerationError::parse("scenario", err.line(), format!("invalid scenario document: {err}"))
        })
    }
}

/// One `.air` line, fields in playback order.
#[derive(Debug, Clone, PartialEq)]
pub struct LegacyRecord {
    pub callsign: String,
    pub aircraft_type: String,
    pub engine: EngineType,
    pub rules: FlightRules,
    pub departure: String,
    pub arrival: String,
    pub cruise_altitude: Option<u32>,
    pub route: String,
    pub remarks: String,
    pub squawk: Squawk,
    pub squawk_mode: TransponderMode,
    pub latitude: f64,
    pub longitude: f64,
    pub altitude_ft: i32,
    pub speed_kt: u32,
    pub heading_deg: u32,
}

impl LegacyRecord {
    pub fn from_generated(g: &GeneratedAircraft) -> Result<Self> {
        check_representable(g)?;
        let callsign = g.aircraft.aircraft_id.clone();
        let k = &g.kinematics;
        if !(k.position.is_finite() && k.altitude_ft.is_finite() && k.heading_deg.is_finite() && k.ground_speed_kt.is_finite())
            || k.ground_speed_kt < 0.0
        {
            return Err(GenerationError::Serialization(format!("{callsign}: position or motion not representable")));
        }
        if !g.squawk.is_valid() {
            return Err(GenerationError::Serialization(format!("{callsign}: invalid squawk {}", g.squawk.0)));
        }
        let plan = g.aircraft.flight_plan.as_ref();
        let record = LegacyRecord {
            callsign,
            aircraft_type: g.aircraft.aircraft_type.clone(),
            engine: g.engine,
            rules: plan.map(|p| p.rules).unwrap_or_default(),
            departure: plan.map(|p| p.departure.clone()).unwrap_or_default(),
            arrival: plan.map(|p| p.destination.clone()).unwrap_or_default(),
            cruise_altitude: plan.map(|p| p.cruise_altitude).filter(|alt| *alt > 0),
            route: plan.map(|p| p.route.clone()).unwrap_or_default(),
            remarks: plan.map(|p| p.remarks.clone()).unwrap_or_default(),
            squawk: g.squawk,
            squawk_mode: g.aircraft.transponder_mode,
            latitude: k.position.lat,
            longitude: k.position.lon,
            altitude_ft: k.altitude_ft.round() as i32,
            speed_kt: k.ground_speed_kt.round() as u32,
            heading_deg: (k.heading_deg.round() as u32) % 360,
        };
        record.check_fields()?;
        Ok(record)
    }

    fn check_fields(&self) -> Result<()> {
        let text_fields = [
            &self.callsign,
            &self.aircraft_type,
            &self.departure,
            &self.arrival,
            &self.route,
            &self.remarks,
        ];
        if let Some(bad) = text_fields.iter().find(|f| f.contains(':') || f.contains('\n')) {
            return Err(GenerationError::Serialization(format!(
                "{}: field '{bad}' contains a delimiter",
                self.callsign
            )));
        }
        Ok(())
    }
}

fn mode_code(mode: TransponderMode) -> &'static str {
    match mode {
        TransponderMode::C => "N",
        TransponderMode::Standby => "S",
    }
}

impl fmt::Display for LegacyRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let cruise = self.cruise_altitude.map(|a| a.to_string()).unwrap_or_default();
        write!(
            f,
            "{}:{}:{}:{}:{}:{}:{}:{}:{}:{}:{}:{:.6}:{:.6}:{}:{}:{}",
            self.callsign,
            self.aircraft_type,
            self.engine.legacy_code(),
            self.rules.legacy_code(),
            self.departure,
            self.arrival,
            cruise,
            self.route,
            self.remarks,
            self.squawk,
            mode_code(self.squawk_mode),
            self.latitude,
            self.longitude,
            self.altitude_ft,
            self.speed_kt,
            self.heading_deg,
        )
    }
}

impl FromStr for LegacyRecord {
    type Err = String;

    fn from_str(line: &str) -> std::result::Result<Self, String> {
        let fields: Vec<&str> = line.trim_end_matches(['\r', '\n']).split(':').collect();
        if fields.len() != LEGACY_FIELDS {
            return Err(format!("expected {LEGACY_FIELDS} fields, found {}", fields.len()));
        }
        let number = |index: usize, name: &str| -> std::result::Result<f64, String> {
            fields[index].trim().parse::<f64>().map_err(|_| format!("bad {name} '{}'", fields[index]))
        };
        let engine = EngineType::from_legacy_code(fields[2]).ok_or_else(|| format!("bad engine class '{}'", fields[2]))?;
        let rules = match fields[3] {
            "I" => FlightRules::Ifr,
            "V" => FlightRules::Vfr,
            other => return Err(format!("bad flight rules '{other}'")),
        };
        let cruise_altitude = match fields[6] {
            "" => None,
            text => Some(text.parse::<u32>().map_err(|_| format!("bad cruise altitude '{text}'"))?),
        };
        let squawk = fields[9]
            .parse::<u16>()
            .ok()
            .map(Squawk)
            .filter(|s| s.is_valid())
            .ok_or_else(|| format!("bad squawk '{}'", fields[9]))?;
        let squawk_mode = match fields[10] {
            "S" => TransponderMode::Standby,
            _ => TransponderMode::C,
        };
        Ok(LegacyRecord {
            callsign: fields[0].to_string(),
            aircraft_type: fields[1].to_string(),
            engine,
            rules,
            departure: fields[4].to_string(),
            arrival: fields[5].to_string(),
            cruise_altitude,
            route: fields[7].to_string(),
            remarks: fields[8].to_string(),
            squawk,
            squawk_mode,
            latitude: number(11, "latitude")?,
            longitude: number(12, "longitude")?,
            altitude_ft: number(13, "altitude")?.round() as i32,
            speed_kt: number(14, "speed")?.round() as u32,
            heading_deg: number(15, "heading")?.round() as u32,
        })
    }
}

/// Render a complete `.air` file: `;` header lines, a blank line, one record per aircraft.
pub fn render_air(metadata: &ScenarioMetadata, aircraft: &[GeneratedAircraft]) -> Result<String> {
    let records = aircraft.iter().map(LegacyRecord::from_generated).collect::<Result<Vec<_>>>()?;
    let mut out = format!(
        "; {}\n; Generated by sweatbox generate_scenario\n; Total aircraft: {}\n\n",
        metadata.scenario_name(),
        records.len()
    );
    for record in &records {
        out.push_str(&record.to_string());
        out.push('\n');
    }
    Ok(out)
}

/// Parse an `.air` file, skipping comments and blank lines.
pub fn parse_air(origin: &str, text: &str) -> Result<Vec<LegacyRecord>> {
    text.lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty() && !line.trim_start().starts_with(';'))
        .map(|(index, line)| line.parse().map_err(|message: String| GenerationError::parse(origin, index + 1, message)))
        .collect()
}
