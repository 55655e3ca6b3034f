//! Generator configuration document.
//!
//! Loaded once at start-up, validated, then frozen behind an `Arc`. The
//! pipeline only ever sees the frozen handle.

use crate::error::{GenerationError, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::{Arc, OnceLock};

/// Trailing marker that turns a parking pattern into a prefix match.
pub const WILDCARD: char = '#';

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneratorConfig {
    /// ICAO → parking pattern → airline codes (repetition is weight).
    pub parking_airlines: BTreeMap<String, BTreeMap<String, Vec<String>>>,
    /// Pool used when no parking pattern matches. Built-in airlines when empty.
    pub default_airlines: Vec<String>,
    /// Short-hop destinations for general aviation. Built-in table when empty.
    pub ga_destinations: Vec<String>,
    /// Group name → `"ICAO:runway,runway,ICAO:runway"`.
    pub enroute_airport_groups: BTreeMap<String, String>,
    /// Known field elevations, consulted before the procedure file.
    pub field_elevations: BTreeMap<String, i32>,
    #[serde(skip)]
    groups: BTreeMap<String, Vec<GroupAirport>>,
}

/// One airport of an enroute group with the runways listed for it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupAirport {
    pub icao: String,
    pub runways: Vec<String>,
}

static GLOBAL: OnceLock<Arc<GeneratorConfig>> = OnceLock::new();

impl GeneratorConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|err| GenerationError::io(path, err))?;
        Self::from_json(&text)
    }

    pub fn from_json(text: &str) -> Result<Self> {
        let config: GeneratorConfig =
            serde_json::from_str(text).map_err(|err| GenerationError::Config(err.to_string()))?;
        config.validated()
    }

    /// Check every section and pre-parse the group table.
    pub fn validated(mut self) -> Result<Self> {
        for (airport, patterns) in &self.parking_airlines {
            check_icao(airport)?;
            for (pattern, airlines) in patterns {
                check_pattern(airport, pattern)?;
                if airlines.is_empty() {
                    return Err(GenerationError::Config(format!(
                        "{airport}: pattern '{pattern}' has an empty airline list"
                    )));
                }
                for code in airlines {
                    check_airline(code)?;
                }
            }
        }
        for code in &self.default_airlines {
            check_airline(code)?;
        }
        for icao in self.ga_destinations.iter().chain(self.field_elevations.keys()) {
            check_icao(icao)?;
        }
        self.groups = self
            .enroute_airport_groups
            .iter()
            .map(|(name, spec)| parse_airport_group(name, spec).map(|airports| (name.clone(), airports)))
            .collect::<Result<_>>()?;
        Ok(self)
    }

    pub fn freeze(self) -> Arc<Self> {
        Arc::new(self)
    }

    /// Freeze as the process-wide configuration. Only the first call succeeds.
    pub fn install(self) -> Result<Arc<Self>> {
        let frozen = self.freeze();
        GLOBAL
            .set(frozen.clone())
            .map_err(|_| GenerationError::Config("configuration already installed".into()))?;
        tracing::info!("generator configuration installed");
        Ok(frozen)
    }

    pub fn airport_group(&self, name: &str) -> Option<&[GroupAirport]> {
        self.groups.get(name).map(Vec::as_slice)
    }
}

/// Parse `"KPHX:7L,7R,KSDL:3"` into airports with their runways.
pub fn parse_airport_group(name: &str, spec: &str) -> Result<Vec<GroupAirport>> {
    let mut airports: Vec<GroupAirport> = Vec::new();
    for token in spec.split(',').map(str::trim).filter(|t| !t.is_empty()) {
        match token.split_once(':') {
            Some((icao, runway)) => {
                let icao = icao.trim().to_ascii_uppercase();
                check_icao(&icao)?;
                let runway = runway.trim();
                airports.push(GroupAirport {
                    icao,
                    runways: if runway.is_empty() { Vec::new() } else { vec![runway.to_string()] },
                });
            }
            None => match airports.last_mut() {
                Some(current) => current.runways.push(token.to_string()),
                None => {
                    return Err(GenerationError::Config(format!(
                        "group '{name}': runway '{token}' appears before any airport"
                    )))
                }
            },
        }
    }
    if airports.is_empty() {
        return Err(GenerationError::Config(format!("group '{name}' lists no airports")));
    }
    Ok(airports)
}

fn check_icao(icao: &str) -> Result<()> {
    let ok = (3..=4).contains(&icao.len())
        && icao.bytes().all(|b| b.is_ascii_uppercase() || b.is_ascii_digit());
    if ok {
        Ok(())
    } else {
        Err(GenerationError::Config(format!("'{icao}' is not an airport identifier")))
    }
}

fn check_airline(code: &str) -> Result<()> {
    let ok = (2..=4).contains(&code.len())
        && code.bytes().all(|b| b.is_ascii_uppercase() || b.is_ascii_digit());
    if ok {
        Ok(())
    } else {
        Err(GenerationError::Config(format!("'{code}' is not an airline code")))
    }
}

fn check_pattern(airport: &str, pattern: &str) -> Result<()> {
    let body = pattern.strip_suffix(WILDCARD).unwrap_or(pattern);
    if pattern.trim().is_empty() || body.contains(WILDCARD) {
        return Err(GenerationError::Config(format!(
            "{airport}: parking pattern '{pattern}' may only end with '{WILDCARD}'"
        )));
    }
    Ok(())
}
