//! Parking spot → airline resolution.
//!
//! Exact names live in a map; wildcard patterns in a list sorted by
//! descending prefix length, so the first prefix hit is the most specific.

use crate::config::{GeneratorConfig, WILDCARD};
use rand::seq::IndexedRandom;
use rand::Rng;
use std::collections::HashMap;

/// Airlines used when neither the parking rules nor the config name any.
pub const BUILTIN_AIRLINES: &[&str] = &["AAL", "DAL", "UAL", "SWA", "JBU", "ASA", "SKW", "FFT", "FDX", "UPS"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MatchSource {
    Exact,
    Wildcard(String),
    DefaultPool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    /// GA ramp: no airline, N-number callsign.
    GeneralAviation,
    Airline { code: String, source: MatchSource },
    /// No rule matched and the default pool is empty.
    Unassigned,
}

#[derive(Debug, Clone, Default)]
pub struct ParkingAirlineRules {
    exact: HashMap<String, Vec<String>>,
    prefixes: Vec<(String, Vec<String>)>,
    default_pool: Vec<String>,
}

impl ParkingAirlineRules {
    /// Rules for one airport. The default pool falls back to [`BUILTIN_AIRLINES`].
    pub fn for_airport(config: &GeneratorConfig, icao: &str) -> Self {
        let default_pool = if config.default_airlines.is_empty() {
            BUILTIN_AIRLINES.iter().map(|s| s.to_string()).collect()
        } else {
            config.default_airlines.clone()
        };
        let patterns = config.parking_airlines.get(icao).cloned().unwrap_or_default();
        Self::new(patterns, default_pool)
    }

    pub fn new(patterns: impl IntoIterator<Item = (String, Vec<String>)>, default_pool: Vec<String>) -> Self {
        let mut exact = HashMap::new();
        let mut prefixes = Vec::new();
        for (pattern, airlines) in patterns {
            match pattern.strip_suffix(WILDCARD) {
                Some(prefix) => prefixes.push((prefix.to_string(), airlines)),
                None => {
                    exact.insert(pattern, airlines);
                }
            }
        }
        prefixes.sort_by(|(a, _), (b, _)| b.len().cmp(&a.len()).then_with(|| a.cmp(b)));
        Self { exact, prefixes, default_pool }
    }

    /// Winning pool for a spot and where it came from, without drawing.
    pub fn pool_for(&self, parking: &str) -> Option<(&[String], MatchSource)> {
        if let Some(pool) = self.exact.get(parking) {
            return Some((pool, MatchSource::Exact));
        }
        if let Some((prefix, pool)) = self.prefixes.iter().find(|(prefix, _)| parking.starts_with(prefix.as_str())) {
            return Some((pool, MatchSource::Wildcard(format!("{prefix}{WILDCARD}"))));
        }
        (!self.default_pool.is_empty()).then(|| (self.default_pool.as_slice(), MatchSource::DefaultPool))
    }

    pub fn resolve<R: Rng + ?Sized>(&self, parking: &str, rng: &mut R) -> Resolution {
        if parking.to_ascii_uppercase().contains("GA") {
            return Resolution::GeneralAviation;
        }
        match self.pool_for(parking) {
            Some((pool, source)) => match pool.choose(rng) {
                Some(code) => Resolution::Airline { code: code.clone(), source },
                None => Resolution::Unassigned,
            },
            None => Resolution::Unassigned,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn rules(patterns: &[(&str, &[&str])], default_pool: &[&str]) -> ParkingAirlineRules {
        ParkingAirlineRules::new(
            patterns
                .iter()
                .map(|(p, a)| (p.to_string(), a.iter().map(|s| s.to_string()).collect())),
            default_pool.iter().map(|s| s.to_string()).collect(),
        )
    }

    #[test]
    fn test_exact_beats_wildcard_in_any_order() {
        let mut rng = StdRng::seed_from_u64(1);
        let forward = rules(&[("B#", &["SWA"]), ("B12", &["UAL"])], &[]);
        let reverse = rules(&[("B12", &["UAL"]), ("B#", &["SWA"])], &[]);
        for r in [&forward, &reverse] {
            assert_eq!(
                r.resolve("B12", &mut rng),
                Resolution::Airline { code: "UAL".into(), source: MatchSource::Exact }
            );
            assert_eq!(
                r.resolve("B13", &mut rng),
                Resolution::Airline { code: "SWA".into(), source: MatchSource::Wildcard("B#".into()) }
            );
        }
    }

    #[test]
    fn test_longest_prefix_wins() {
        let mut rng = StdRng::seed_from_u64(2);
        let r = rules(&[("B#", &["SWA"]), ("B1#", &["DAL"])], &[]);
        assert!(matches!(r.resolve("B14", &mut rng), Resolution::Airline { ref code, .. } if code == "DAL"));
        assert!(matches!(r.resolve("B24", &mut rng), Resolution::Airline { ref code, .. } if code == "SWA"));
    }

    #[test]
    fn test_no_match_falls_to_default_pool() {
        let mut rng = StdRng::seed_from_u64(3);
        let r = rules(&[("A#", &["AAL"])], &["JBU"]);
        assert_eq!(
            r.resolve("C1", &mut rng),
            Resolution::Airline { code: "JBU".into(), source: MatchSource::DefaultPool }
        );
        let empty = rules(&[], &[]);
        assert_eq!(empty.resolve("C1", &mut rng), Resolution::Unassigned);
    }

    #[test]
    fn test_ga_spots_bypass_rules() {
        let mut rng = StdRng::seed_from_u64(4);
        let r = rules(&[("GA#", &["AAL"])], &["AAL"]);
        assert_eq!(r.resolve("GA1", &mut rng), Resolution::GeneralAviation);
        assert_eq!(r.resolve("Ramp ga 2", &mut rng), Resolution::GeneralAviation);
    }

    #[test]
    fn test_repetition_weights_draws() {
        let mut rng = StdRng::seed_from_u64(42);
        let r = rules(&[("A#", &["AAL", "AAL", "DAL"])], &[]);
        let draws = 10_000;
        let aal = (0..draws)
            .filter(|_| matches!(r.resolve("A7", &mut rng), Resolution::Airline { ref code, .. } if code == "AAL"))
            .count();
        let ratio = aal as f64 / draws as f64;
        assert!((0.64..=0.70).contains(&ratio), "ratio {ratio}");
    }

    #[test]
    fn test_for_airport_uses_builtin_pool() {
        let config = GeneratorConfig::default();
        let r = ParkingAirlineRules::for_airport(&config, "KPHX");
        let mut rng = StdRng::seed_from_u64(5);
        match r.resolve("Z9", &mut rng) {
            Resolution::Airline { code, source } => {
                assert!(BUILTIN_AIRLINES.contains(&code.as_str()));
                assert_eq!(source, MatchSource::DefaultPool);
            }
            other => panic!("unexpected {other:?}"),
        }
    }
}
