//! Source settings from environment.

use std::env;
use std::time::Duration;

pub const DEFAULT_FLIGHT_PLAN_URL: &str = "https://flight-plans.csko.hu/v1/flight_plan";
pub const DEFAULT_ELEVATION_URL: &str = "https://api.open-meteo.com/v1/elevation";

#[derive(Debug, Clone, PartialEq)]
pub struct SourceSettings {
    pub flight_plan_url: String,
    pub elevation_url: String,
    pub timeout: Duration,
    /// Extra attempts after the first failure, 0 or 1.
    pub retries: u8,
    pub cache_ttl: Duration,
    pub offline: bool,
}

impl Default for SourceSettings {
    fn default() -> Self {
        Self::from_lookup(|_| None)
    }
}

impl SourceSettings {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup(var: impl Fn(&str) -> Option<String>) -> Self {
        Self {
            flight_plan_url: var("SWEATBOX_FLIGHT_PLAN_URL")
                .filter(|s| !s.trim().is_empty())
                .unwrap_or_else(|| DEFAULT_FLIGHT_PLAN_URL.to_string()),
            elevation_url: var("SWEATBOX_ELEVATION_URL")
                .filter(|s| !s.trim().is_empty())
                .unwrap_or_else(|| DEFAULT_ELEVATION_URL.to_string()),
            timeout: Duration::from_secs(
                var("SWEATBOX_SOURCE_TIMEOUT_S")
                    .and_then(|s| s.parse::<u64>().ok())
                    .unwrap_or(10)
                    .max(1),
            ),
            retries: var("SWEATBOX_SOURCE_RETRIES")
                .and_then(|s| s.parse::<u8>().ok())
                .unwrap_or(1)
                .min(1),
            cache_ttl: Duration::from_secs(
                var("SWEATBOX_CACHE_TTL_S")
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(3600),
            ),
            offline: var("SWEATBOX_OFFLINE")
                .map(|s| matches!(s.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes"))
                .unwrap_or(false),
        }
    }
}
