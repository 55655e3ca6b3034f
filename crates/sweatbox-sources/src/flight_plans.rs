//! Remote flight plan lookup by departure/arrival pair.

use crate::cache::{Lookup, TtlCache};
use crate::config::SourceSettings;
use crate::http;
use reqwest::blocking::Client;
use serde_json::Value;
use std::sync::OnceLock;
use sweatbox_core::{AircraftCategory, ExternalSourceError, FlightPlanQuery, FlightPlanSource, SourcedPlan};

const LOOKBACK_DAYS: i64 = 90;
const LIST_KEYS: &[&str] = &["most_recent", "routes", "plans", "results", "data"];

fn plan_cache() -> &'static TtlCache<Vec<SourcedPlan>> {
    static CACHE: OnceLock<TtlCache<Vec<SourcedPlan>>> = OnceLock::new();
    CACHE.get_or_init(TtlCache::default)
}

pub struct RemoteFlightPlanSource {
    client: Client,
    settings: SourceSettings,
}

impl RemoteFlightPlanSource {
    pub fn new(settings: SourceSettings) -> anyhow::Result<Self> {
        Ok(Self {
            client: http::build_client(settings.timeout)?,
            settings,
        })
    }

    fn fetch(&self, departure: &str, arrival: &str) -> Result<Vec<SourcedPlan>, ExternalSourceError> {
        let since = chrono::Utc::now().timestamp() - LOOKBACK_DAYS * 24 * 3600;
        let params = [
            ("departure", departure.to_string()),
            ("arrival", arrival.to_string()),
            ("since", since.to_string()),
        ];
        let body = http::get_json(&self.client, &self.settings.flight_plan_url, &params, self.settings.retries)?;
        decode_plans(&body)
    }
}

impl FlightPlanSource for RemoteFlightPlanSource {
    fn name(&self) -> &str {
        "flight-plan-api"
    }

    fn candidates(&self, query: &FlightPlanQuery) -> Result<Vec<SourcedPlan>, ExternalSourceError> {
        if self.settings.offline {
            return Err(ExternalSourceError::Disabled);
        }
        let arrival = match query.arrival.as_deref() {
            Some(arrival) if query.category == AircraftCategory::Airline => arrival,
            _ => return Ok(Vec::new()),
        };
        let key = format!("{}-{}", query.departure, arrival);
        let stale = match plan_cache().get(&key, self.settings.cache_ttl) {
            Lookup::Fresh(plans) => return Ok(plans),
            Lookup::Stale(plans) => Some(plans),
            Lookup::Miss => None,
        };

        match self.fetch(&query.departure, arrival) {
            Ok(plans) => {
                tracing::debug!("{} plans for {}", plans.len(), key);
                plan_cache().insert(key, plans.clone());
                Ok(plans)
            }
            Err(err) => match stale {
                Some(plans) => {
                    tracing::warn!("Flight plan fetch for {} failed, using stale cache: {}", key, err);
                    Ok(plans)
                }
                None => Err(err),
            },
        }
    }
}

/// Accepts a bare list, a wrapper object with one of the list keys, or a single plan object.
pub fn decode_plans(body: &Value) -> Result<Vec<SourcedPlan>, ExternalSourceError> {
    let items: Vec<&Value> = match body {
        Value::Array(items) => items.iter().collect(),
        Value::Object(map) => {
            let listed = LIST_KEYS
                .iter()
                .filter_map(|key| map.get(*key).and_then(Value::as_array))
                .find(|items| !items.is_empty());
            match listed {
                Some(items) => items.iter().collect(),
                None if LIST_KEYS.iter().any(|key| map.contains_key(*key)) => Vec::new(),
                None => vec![body],
            }
        }
        other => return Err(ExternalSourceError::Decode(format!("unexpected flight plan body: {other}"))),
    };
    Ok(items.into_iter().filter_map(decode_plan).collect())
}

fn decode_plan(item: &Value) -> Option<SourcedPlan> {
    let obj = item.as_object()?;
    let text = |keys: &[&str]| {
        keys.iter()
            .filter_map(|k| obj.get(*k).and_then(Value::as_str))
            .map(str::trim)
            .find(|s| !s.is_empty())
            .map(str::to_string)
    };
    let number = |keys: &[&str]| keys.iter().filter_map(|k| obj.get(*k)).find_map(parse_number);

    let aircraft_type = text(&["aircraft_type"]).map(|t| {
        if t.contains('/') {
            t
        } else {
            let qualifier = text(&["equipment_qualifier"]).unwrap_or_else(|| "L".into());
            format!("{t}/{qualifier}")
        }
    });
    let plan = SourcedPlan {
        callsign: text(&["aircraft_id"]),
        aircraft_type,
        route: text(&["route_text", "route"]),
        cruise_altitude_ft: ["assigned_altitude", "altitude", "max_altitude"]
            .iter()
            .filter_map(|k| obj.get(*k))
            .find_map(parse_altitude),
        cruise_speed_kt: number(&["cruise_speed", "cruiseSpeed", "cruise_tas"]),
    };
    (plan != SourcedPlan::default()).then_some(plan)
}

fn parse_number(value: &Value) -> Option<u32> {
    match value {
        Value::Number(n) => n.as_u64().and_then(|v| u32::try_from(v).ok()),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
    .filter(|v| *v > 0)
}

/// `35000`, `"35000"` or `"FL350"`.
fn parse_altitude(value: &Value) -> Option<u32> {
    match value {
        Value::String(s) => match s.trim().strip_prefix("FL") {
            Some(level) => level.trim().parse::<u32>().ok().map(|fl| fl * 100),
            None => s.trim().parse().ok(),
        },
        other => parse_number(other),
    }
    .filter(|ft| *ft > 0)
}
