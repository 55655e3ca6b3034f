//! Procedure data parser for FAA CIFP (ARINC 424) files.
//!
//! Fixed-column records, one per line, Latin-1 encoded. Only the records
//! needed for scenario generation are read:
//!
//! | prefix    | subsection | record                          |
//! |-----------|------------|---------------------------------|
//! | `SUSAEA`  | col 6      | enroute waypoint                |
//! | `SUSAD`   | col 6      | VHF navaid (`' '`) / NDB (`B`)  |
//! | `SUSAP`   | col 13     | airport reference `A`, terminal waypoint `C`, SID `D`, STAR `E`, approach `F`, runway `G` |
//!
//! Records for other airports are skipped silently, except that their
//! reference points are kept for enroute traffic. Anything else is counted
//! and reported as one warning per record type.

use crate::airport::normalize_runway;
use crate::error::{GenerationError, Parsed, Result, Warning};
use crate::procedures::{AltitudeRestriction, Procedure, ProcedureKind, ProcedureLeg, ProcedureSet, Segment};
use crate::spatial::{destination_point, Frd, GeoPoint};
use std::collections::{BTreeMap, BTreeSet};
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

const MIN_RECORD_LEN: usize = 50;

pub fn load_procedures(path: &Path, airport: &str, runways: &[String]) -> Result<Parsed<ProcedureSet>> {
    let file = File::open(path).map_err(|err| GenerationError::io(path, err))?;
    parse_procedures(BufReader::new(file), &path.display().to_string(), airport, runways)
}

/// Parse a CIFP stream for `airport`. `runways` limits runway transitions to
/// the given runways; an empty slice keeps every runway.
pub fn parse_procedures<R: BufRead>(
    reader: R,
    origin: &str,
    airport: &str,
    runways: &[String],
) -> Result<Parsed<ProcedureSet>> {
    let mut parser = CifpParser::new(airport, runways);
    for (index, line) in reader.split(b'\n').enumerate() {
        let line = line.map_err(|err| GenerationError::parse(origin, index + 1, format!("unreadable input: {err}")))?;
        let line = line.strip_suffix(b"\r").unwrap_or(&line);
        parser.record(Record(line), index + 1, origin);
    }
    Ok(parser.finish(origin))
}

/// Borrowed view of one fixed-column record.
#[derive(Clone, Copy)]
struct Record<'a>(&'a [u8]);

impl Record<'_> {
    fn byte(&self, index: usize) -> u8 {
        self.0.get(index).copied().unwrap_or(b' ')
    }

    /// Latin-1 decoded, trimmed field `[start, end)`.
    fn field(&self, start: usize, end: usize) -> String {
        let end = end.min(self.0.len());
        if start >= end {
            return String::new();
        }
        self.0[start..end].iter().map(|&b| char::from(b)).collect::<String>().trim().to_string()
    }

    fn starts_with(&self, prefix: &[u8]) -> bool {
        self.0.starts_with(prefix)
    }

    fn coordinates(&self) -> Option<GeoPoint> {
        let lat = parse_coordinate(&self.field(32, 41), true)?;
        let lon = parse_coordinate(&self.field(41, 51), false)?;
        Some(GeoPoint::new(lat, lon))
    }
}

#[derive(Debug, Clone)]
struct RawLeg {
    transition: String,
    fix: String,
    restriction: Option<AltitudeRestriction>,
}

/// Fix defined only through a leg's recommended navaid, theta and rho.
#[derive(Debug, Clone)]
struct PendingFrd {
    fix: String,
    frd: Frd,
    rho_nm: f64,
    theta_deg: f64,
}

struct CifpParser {
    airport: String,
    requested: Vec<String>,
    fixes: BTreeMap<String, GeoPoint>,
    procedures: BTreeMap<(String, ProcedureKindKey), Vec<RawLeg>>,
    pending: Vec<PendingFrd>,
    runway_thresholds: BTreeMap<String, GeoPoint>,
    transition_runways: BTreeSet<String>,
    faf: BTreeMap<String, u32>,
    field_elevation_ft: Option<i32>,
    reference_point: Option<GeoPoint>,
    airports: BTreeMap<String, GeoPoint>,
    unknown: BTreeMap<String, usize>,
    warnings: Vec<Warning>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum ProcedureKindKey {
    Departure,
    Arrival,
}

impl From<ProcedureKindKey> for ProcedureKind {
    fn from(key: ProcedureKindKey) -> Self {
        match key {
            ProcedureKindKey::Departure => ProcedureKind::Departure,
            ProcedureKindKey::Arrival => ProcedureKind::Arrival,
        }
    }
}

impl CifpParser {
    fn new(airport: &str, runways: &[String]) -> Self {
        Self {
            airport: airport.to_ascii_uppercase(),
            requested: runways.iter().map(|r| normalize_runway(r)).collect(),
            fixes: BTreeMap::new(),
            procedures: BTreeMap::new(),
            pending: Vec::new(),
            runway_thresholds: BTreeMap::new(),
            transition_runways: BTreeSet::new(),
            faf: BTreeMap::new(),
            field_elevation_ft: None,
            reference_point: None,
            airports: BTreeMap::new(),
            unknown: BTreeMap::new(),
            warnings: Vec::new(),
        }
    }

    fn record(&mut self, rec: Record<'_>, line_no: usize, origin: &str) {
        if rec.0.len() < MIN_RECORD_LEN || rec.starts_with(b"HDR") {
            return;
        }
        if rec.starts_with(b"SUSAE") {
            match rec.byte(5) {
                b'A' => self.define_fix(rec, 13, 18, line_no, origin),
                other => self.skip_unknown(format!("SUSAE{}", char::from(other))),
            }
        } else if rec.starts_with(b"SUSAD") {
            match rec.byte(5) {
                b' ' | b'B' => self.define_fix(rec, 13, 17, line_no, origin),
                other => self.skip_unknown(format!("SUSAD{}", char::from(other))),
            }
        } else if rec.starts_with(b"SUSAP") {
            let ident = rec.field(6, 10);
            if rec.byte(12) == b'A' {
                if let Some(position) = rec.coordinates() {
                    self.airports.entry(ident.clone()).or_insert(position);
                }
            }
            if ident != self.airport {
                return;
            }
            match rec.byte(12) {
                b'A' => self.airport_reference(rec),
                b'C' => self.define_fix(rec, 13, 18, line_no, origin),
                b'D' => self.procedure_leg(rec, ProcedureKindKey::Departure),
                b'E' => self.procedure_leg(rec, ProcedureKindKey::Arrival),
                b'F' => self.approach_leg(rec),
                b'G' => self.runway_record(rec),
                other => self.skip_unknown(format!("SUSAP/{}", char::from(other))),
            }
        } else {
            self.skip_unknown(rec.field(0, 5));
        }
    }

    fn skip_unknown(&mut self, kind: String) {
        *self.unknown.entry(kind).or_default() += 1;
    }

    fn define_fix(&mut self, rec: Record<'_>, start: usize, end: usize, line_no: usize, origin: &str) {
        let name = rec.field(start, end);
        if name.is_empty() {
            return;
        }
        match rec.coordinates() {
            Some(position) => {
                self.fixes.entry(name).or_insert(position);
            }
            None => self
                .warnings
                .push(Warning::at_line(origin, line_no, format!("fix {name} has unreadable coordinates"))),
        }
    }

    fn airport_reference(&mut self, rec: Record<'_>) {
        self.reference_point = rec.coordinates();
        self.field_elevation_ft = rec.field(56, 61).parse().ok();
    }

    fn runway_record(&mut self, rec: Record<'_>) {
        let ident = rec.field(13, 18);
        if let Some(position) = rec.coordinates() {
            self.runway_thresholds.insert(normalize_runway(&ident), position);
        }
    }

    fn procedure_leg(&mut self, rec: Record<'_>, kind: ProcedureKindKey) {
        // Continuation records carry a different layout.
        if !matches!(rec.byte(38), b'0' | b'1') {
            return;
        }
        let name = rec.field(13, 19);
        let fix = rec.field(29, 34);
        if name.is_empty() || fix.is_empty() {
            return;
        }
        let transition = rec.field(20, 25);
        if let Some(runway) = transition.strip_prefix("RW") {
            self.transition_runways.insert(normalize_runway(runway));
        }

        let restriction = altitude_restriction(rec.byte(82), &rec.field(84, 89), &rec.field(89, 94));
        self.queue_frd(rec, &fix);
        self.procedures
            .entry((name, kind))
            .or_default()
            .push(RawLeg { transition, fix, restriction });
    }

    fn queue_frd(&mut self, rec: Record<'_>, fix: &str) {
        let navaid = rec.field(50, 54);
        let theta: Option<f64> = rec.field(62, 66).parse::<u32>().ok().map(|t| f64::from(t) / 10.0);
        let rho: Option<f64> = rec.field(66, 70).parse::<u32>().ok().map(|r| f64::from(r) / 10.0);
        if let (false, Some(theta_deg), Some(rho_nm)) = (navaid.is_empty(), theta, rho) {
            if rho_nm > 0.0 {
                self.pending.push(PendingFrd {
                    fix: fix.to_string(),
                    frd: Frd::new(navaid, theta_deg.round() as u16, rho_nm.round() as u16),
                    rho_nm,
                    theta_deg,
                });
            }
        }
    }

    fn approach_leg(&mut self, rec: Record<'_>) {
        let ident = rec.field(13, 19);
        let Some(runway) = approach_runway(&ident) else {
            return;
        };
        if !self.requested.is_empty() && !self.requested.contains(&runway) {
            return;
        }
        if rec.byte(42) != b'F' {
            return;
        }
        if let Some(altitude) = parse_altitude(&rec.field(84, 89)) {
            let entry = self.faf.entry(runway).or_insert(altitude);
            *entry = (*entry).max(altitude);
        }
    }

    fn finish(mut self, origin: &str) -> Parsed<ProcedureSet> {
        for pending in std::mem::take(&mut self.pending) {
            if self.fixes.contains_key(&pending.fix) {
                continue;
            }
            if let Some(navaid) = self.fixes.get(&pending.frd.fix).copied() {
                tracing::debug!("{} located from {}", pending.fix, pending.frd);
                let position = destination_point(navaid, pending.theta_deg, pending.rho_nm);
                self.fixes.insert(pending.fix, position);
            }
        }

        for (kind, count) in &self.unknown {
            self.warnings.push(Warning::new(
                origin,
                format!("skipped {count} unrecognized {kind} records"),
            ));
        }

        let universe: Vec<String> = if !self.requested.is_empty() {
            self.requested.clone()
        } else {
            self.runway_thresholds
                .keys()
                .chain(self.transition_runways.iter())
                .filter(|r| !r.ends_with('B'))
                .cloned()
                .collect::<BTreeSet<_>>()
                .into_iter()
                .collect()
        };

        let mut set = ProcedureSet {
            airport: self.airport.clone(),
            field_elevation_ft: self.field_elevation_ft,
            reference_point: self.reference_point,
            airports: self.airports,
            fixes: self.fixes,
            runway_thresholds: self.runway_thresholds,
            by_runway: BTreeMap::new(),
        };

        for ((name, kind), legs) in self.procedures {
            let has_runway_transitions = legs.iter().any(|leg| leg.transition.starts_with("RW"));
            let keys: Vec<&str> = if universe.is_empty() {
                vec!["ALL"]
            } else {
                universe.iter().map(String::as_str).collect()
            };
            for runway in keys {
                let served: Vec<&RawLeg> = legs
                    .iter()
                    .filter(|leg| match leg.transition.strip_prefix("RW") {
                        Some(t) => transition_serves(t, runway),
                        None => true,
                    })
                    .collect();
                if has_runway_transitions && !served.iter().any(|leg| leg.transition.starts_with("RW")) {
                    continue;
                }
                let mut procedure = Procedure::new(name.clone(), kind.into());
                procedure.legs = served
                    .into_iter()
                    .map(|leg| ProcedureLeg {
                        transition: leg.transition.clone(),
                        segment: segment_of(&leg.transition),
                        fix: leg.fix.clone(),
                        restriction: leg.restriction,
                    })
                    .collect();
                procedure.order_legs();
                let entry = set.by_runway.entry(runway.to_string()).or_default();
                match kind {
                    ProcedureKindKey::Arrival => entry.arrivals.insert(name.clone(), procedure),
                    ProcedureKindKey::Departure => entry.departures.insert(name.clone(), procedure),
                };
            }
        }

        for (runway, altitude) in self.faf {
            set.by_runway.entry(runway).or_default().final_approach_fix_ft = Some(altitude);
        }

        tracing::debug!(
            "{}: {} fixes, {} runways with procedures",
            set.airport,
            set.fixes.len(),
            set.by_runway.len()
        );
        Parsed { value: set, warnings: self.warnings }
    }
}

fn segment_of(transition: &str) -> Segment {
    if transition.starts_with("RW") {
        Segment::Runway
    } else if transition.is_empty() || transition == "ALL" {
        Segment::Common
    } else {
        Segment::Enroute
    }
}

/// `25L` serves `25L`; `25B` serves every parallel `25x`.
fn transition_serves(transition_runway: &str, runway: &str) -> bool {
    let transition_runway = normalize_runway(transition_runway);
    if let Some(number) = transition_runway.strip_suffix('B') {
        runway.trim_end_matches(['L', 'R', 'C']) == number
    } else {
        transition_runway == runway
    }
}

/// Runway of an approach ident such as `I07L`, `R25R-Z` or `L08`.
fn approach_runway(ident: &str) -> Option<String> {
    let rest = ident.get(1..)?;
    let digits: String = rest.chars().take_while(|c| c.is_ascii_digit()).collect();
    if digits.is_empty() {
        return None;
    }
    let side = rest[digits.len()..].chars().next().filter(|c| matches!(c, 'L' | 'R' | 'C'));
    let mut runway = normalize_runway(&digits);
    runway.extend(side);
    Some(runway)
}

/// `FL180` → 18000, `05000` → 5000.
pub fn parse_altitude(field: &str) -> Option<u32> {
    let field = field.trim();
    if let Some(level) = field.strip_prefix("FL") {
        return level.parse::<u32>().ok().map(|fl| fl * 100);
    }
    field.parse().ok()
}

fn altitude_restriction(description: u8, first: &str, second: &str) -> Option<AltitudeRestriction> {
    let a1 = parse_altitude(first)?;
    match description {
        b'+' => Some(AltitudeRestriction::at_or_above(a1)),
        b'-' => Some(AltitudeRestriction::at_or_below(a1)),
        b'B' => parse_altitude(second).map(|a2| AltitudeRestriction::between(a1, a2)),
        b' ' | b'@' => Some(AltitudeRestriction::at(a1)),
        _ => None,
    }
}

/// `N33453012` / `W112005998`: hemisphere, degrees, minutes, seconds in hundredths.
pub fn parse_coordinate(text: &str, is_latitude: bool) -> Option<f64> {
    let mut chars = text.chars();
    let hemisphere = chars.next()?;
    let digits = chars.as_str();
    let deg_len = if is_latitude { 2 } else { 3 };
    if digits.len() < deg_len + 4 || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let degrees: f64 = digits[..deg_len].parse().ok()?;
    let minutes: f64 = digits[deg_len..deg_len + 2].parse().ok()?;
    let seconds: f64 = digits[deg_len + 2..].parse::<f64>().ok()? / 100.0;
    let value = degrees + minutes / 60.0 + seconds / 3600.0;
    match (hemisphere, is_latitude) {
        ('N', true) | ('E', false) => Some(value),
        ('S', true) | ('W', false) => Some(-value),
        _ => None,
    }
}

#[cfg(test)]
pub(crate) mod fixtures {
    /// Build a record by placing fields at 0-based columns, padded to 132.
    pub fn record(fields: &[(usize, &str)]) -> String {
        let mut line = vec![b' '; 132];
        for (start, text) in fields {
            line[*start..*start + text.len()].copy_from_slice(text.as_bytes());
        }
        String::from_utf8(line).unwrap_or_default()
    }

    pub fn terminal_fix(airport: &str, name: &str, lat: &str, lon: &str) -> String {
        record(&[(0, "SUSAP"), (6, airport), (12, "C"), (13, name), (32, lat), (41, lon)])
    }

    pub fn enroute_fix(name: &str, lat: &str, lon: &str) -> String {
        record(&[(0, "SUSAEA"), (13, name), (32, lat), (41, lon)])
    }

    #[allow(clippy::too_many_arguments)]
    pub fn leg(
        airport: &str,
        subsection: &str,
        procedure: &str,
        transition: &str,
        seq: &str,
        fix: &str,
        alt_desc: &str,
        alt1: &str,
        alt2: &str,
    ) -> String {
        record(&[
            (0, "SUSAP"),
            (6, airport),
            (12, subsection),
            (13, procedure),
            (20, transition),
            (26, seq),
            (29, fix),
            (38, "1"),
            (82, alt_desc),
            (84, alt1),
            (89, alt2),
        ])
    }

    pub fn kphx_sample() -> String {
        [
            "HDR01FAACIFP18      001P013203241902  22-JUL-202414:55:33  U.S.A. DOT FAA".to_string(),
            record(&[(0, "SUSAP"), (6, "KPHX"), (12, "A"), (13, "PHX"), (32, "N33260371"), (41, "W112003801"), (56, "01135")]),
            enroute_fix("EAGUL", "N34034330", "W111280360"),
            terminal_fix("KPHX", "PINNG", "N33442650", "W111354630"),
            terminal_fix("KPHX", "HOTTT", "N33360000", "W111460000"),
            enroute_fix("JESSE", "N34300000", "W111000000"),
            leg("KPHX", "E", "EAGUL6", "JESSE", "010", "JESSE", "", "", ""),
            leg("KPHX", "E", "EAGUL6", "JESSE", "020", "EAGUL", "B", "FL190", "12000"),
            leg("KPHX", "E", "EAGUL6", "ALL", "030", "EAGUL", "B", "FL190", "12000"),
            leg("KPHX", "E", "EAGUL6", "ALL", "040", "PINNG", "-", "10000", ""),
            leg("KPHX", "E", "EAGUL6", "RW25L", "050", "HOTTT", "+", "07000", ""),
            leg("KPHX", "E", "EAGUL6", "RW07R", "050", "HOTTT", "", "08000", ""),
            leg("KPHX", "D", "BXK6", "RW25R", "010", "BXK", "", "", ""),
            record(&[(0, "SUSAP"), (6, "KPHX"), (12, "F"), (13, "I25L"), (29, "FATAL"), (38, "1"), (42, "F"), (84, "04000")]),
            record(&[(0, "SUSAP"), (6, "KPHX"), (12, "G"), (13, "RW25L"), (32, "N33254390"), (41, "W111595010")]),
            leg("KLAX", "E", "ANJLL4", "ALL", "010", "ANJLL", "", "", ""),
            record(&[(0, "SUSAP"), (6, "KLAX"), (12, "A"), (13, "LAX"), (32, "N33563300"), (41, "W118242900"), (56, "00128")]),
            record(&[(0, "SUSAU"), (13, "ZAB")]),
            record(&[(0, "SUSAU"), (13, "ZLA")]),
            record(&[(0, "SUSAP"), (6, "KPHX"), (12, "P"), (13, "X")]),
        ]
        .join("\n")
    }
}

#[cfg(test)]
mod tests {
    use super::fixtures::*;
    use super::*;

    fn parse(runways: &[&str]) -> Parsed<ProcedureSet> {
        let runways: Vec<String> = runways.iter().map(|r| r.to_string()).collect();
        parse_procedures(kphx_sample().as_bytes(), "KPHX_CIFP", "KPHX", &runways).unwrap()
    }

    #[test]
    fn test_parse_coordinate() {
        let lat = parse_coordinate("N33453012", true).unwrap();
        assert!((lat - (33.0 + 45.0 / 60.0 + 30.12 / 3600.0)).abs() < 1e-9);
        let lon = parse_coordinate("W112005998", false).unwrap();
        assert!(lon < -112.0 && lon > -112.02);
        assert!(parse_coordinate("X33453012", true).is_none());
        assert!(parse_coordinate("N33", true).is_none());
    }

    #[test]
    fn test_parse_altitude() {
        assert_eq!(parse_altitude("FL180"), Some(18000));
        assert_eq!(parse_altitude("05000"), Some(5000));
        assert_eq!(parse_altitude(""), None);
    }

    #[test]
    fn test_airport_reference_and_fixes() {
        let set = parse(&[]).value;
        assert_eq!(set.field_elevation_ft, Some(1135));
        assert!(set.fix_position("EAGUL").is_some());
        assert!(set.fix_position("PINNG").is_some());
        assert!(set.runway_thresholds.contains_key("25L"));
    }

    #[test]
    fn test_star_keyed_by_requested_runway() {
        let set = parse(&["25L"]).value;
        let star = &set.by_runway["25L"].arrivals["EAGUL6"];
        assert_eq!(star.waypoint_names(), vec!["JESSE", "EAGUL", "PINNG", "HOTTT"]);
        assert_eq!(
            star.restriction_at("HOTTT"),
            Some(AltitudeRestriction::at_or_above(7000))
        );
        assert_eq!(
            star.restriction_at("EAGUL"),
            Some(AltitudeRestriction::between(12000, 19000))
        );
        assert!(!set.by_runway.contains_key("7R"));
        assert!(set.by_runway["25L"].departures.is_empty());
        assert_eq!(set.by_runway["25L"].final_approach_fix_ft, Some(4000));
    }

    #[test]
    fn test_all_runways_when_none_requested() {
        let set = parse(&[]).value;
        assert!(set.by_runway["7R"].arrivals.contains_key("EAGUL6"));
        assert!(set.by_runway["25R"].departures.contains_key("BXK6"));
        assert_eq!(set.by_runway["7R"].arrivals["EAGUL6"].restriction_at("HOTTT"), Some(AltitudeRestriction::at(8000)));
    }

    #[test]
    fn test_other_airports_ignored_and_unknown_counted() {
        let parsed = parse(&[]);
        assert!(parsed.value.arrival("ANJLL4", &[]).is_none());
        assert_eq!(parsed.value.field_elevation_ft, Some(1135));
        let lax = parsed.value.airports["KLAX"];
        assert!((lax.lat - 33.9425).abs() < 1e-3 && (lax.lon + 118.4081).abs() < 1e-3);
        assert!(parsed.value.airports.contains_key("KPHX"));
        let messages: Vec<&str> = parsed.warnings.iter().map(|w| w.message.as_str()).collect();
        assert!(messages.contains(&"skipped 2 unrecognized SUSAU records"));
        assert!(messages.contains(&"skipped 1 unrecognized SUSAP/P records"));
    }

    #[test]
    fn test_leg_fix_located_from_navaid() {
        let text = [
            enroute_fix("BXK", "N33000000", "W112000000"),
            record(&[
                (0, "SUSAP"), (6, "KPHX"), (12, "E"), (13, "TEST1"), (20, "ALL"), (26, "010"),
                (29, "ZZZZZ"), (38, "1"), (50, "BXK"), (62, "0900"), (66, "0100"),
            ]),
        ]
        .join("\n");
        let set = parse_procedures(text.as_bytes(), "x", "KPHX", &[]).unwrap().value;
        let origin = set.fix_position("BXK").unwrap();
        let located = set.fix_position("ZZZZZ").unwrap();
        assert!((crate::spatial::distance_nm(origin, located) - 10.0).abs() < 0.01);
        assert!(set.by_runway["ALL"].arrivals.contains_key("TEST1"));
    }

    #[test]
    fn test_transition_serves_both_parallels() {
        assert!(transition_serves("25B", "25L"));
        assert!(transition_serves("25B", "25R"));
        assert!(!transition_serves("25B", "7L"));
        assert!(transition_serves("07L", "7L"));
    }

    #[test]
    fn test_approach_runway() {
        assert_eq!(approach_runway("I07L").as_deref(), Some("7L"));
        assert_eq!(approach_runway("R25R-Z").as_deref(), Some("25R"));
        assert_eq!(approach_runway("L08").as_deref(), Some("8"));
        assert_eq!(approach_runway("VDM"), None);
    }
}
