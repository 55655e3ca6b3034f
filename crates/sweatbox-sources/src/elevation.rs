//! Field elevation from the Open-Meteo elevation API.

use crate::cache::{Lookup, TtlCache};
use crate::config::SourceSettings;
use crate::http;
use reqwest::blocking::Client;
use serde::Deserialize;
use serde_json::Value;
use std::sync::OnceLock;
use sweatbox_core::{ElevationSource, ExternalSourceError, GeoPoint};

const FEET_PER_METER: f64 = 3.28084;

#[derive(Debug, Deserialize)]
struct OpenMeteoElevationResponse {
    elevation: Option<Vec<f64>>,
}

fn elevation_cache() -> &'static TtlCache<Option<i32>> {
    static CACHE: OnceLock<TtlCache<Option<i32>>> = OnceLock::new();
    CACHE.get_or_init(TtlCache::default)
}

pub struct RemoteElevationSource {
    client: Client,
    settings: SourceSettings,
}

impl RemoteElevationSource {
    pub fn new(settings: SourceSettings) -> anyhow::Result<Self> {
        Ok(Self {
            client: http::build_client(settings.timeout)?,
            settings,
        })
    }
}

impl ElevationSource for RemoteElevationSource {
    fn name(&self) -> &str {
        "open-meteo"
    }

    fn field_elevation_ft(&self, icao: &str, reference: Option<GeoPoint>) -> Result<Option<i32>, ExternalSourceError> {
        if self.settings.offline {
            return Err(ExternalSourceError::Disabled);
        }
        let Some(point) = reference else {
            return Ok(None);
        };
        let stale = match elevation_cache().get(icao, self.settings.cache_ttl) {
            Lookup::Fresh(feet) => return Ok(feet),
            Lookup::Stale(feet) => Some(feet),
            Lookup::Miss => None,
        };

        let params = [("latitude", point.lat.to_string()), ("longitude", point.lon.to_string())];
        let fetched = http::get_json(&self.client, &self.settings.elevation_url, &params, self.settings.retries)
            .and_then(|body| decode_elevation(&body));
        match (fetched, stale) {
            (Ok(feet), _) => {
                tracing::debug!("Field elevation for {}: {:?} ft", icao, feet);
                elevation_cache().insert(icao, feet);
                Ok(feet)
            }
            (Err(err), Some(feet)) => {
                tracing::warn!("Elevation fetch for {} failed, using stale cache: {}", icao, err);
                Ok(feet)
            }
            (Err(err), None) => Err(err),
        }
    }
}

/// First elevation sample in meters, converted to whole feet.
pub fn decode_elevation(body: &Value) -> Result<Option<i32>, ExternalSourceError> {
    let response: OpenMeteoElevationResponse =
        serde_json::from_value(body.clone()).map_err(|err| ExternalSourceError::Decode(err.to_string()))?;
    Ok(response
        .elevation
        .and_then(|samples| samples.first().copied())
        .filter(|m| m.is_finite())
        .map(|m| (m * FEET_PER_METER).round() as i32))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_meters_to_feet() {
        assert_eq!(decode_elevation(&json!({"elevation": [346.0]})).unwrap(), Some(1135));
        assert_eq!(decode_elevation(&json!({"elevation": []})).unwrap(), None);
        assert_eq!(decode_elevation(&json!({})).unwrap(), None);
    }

    #[test]
    fn test_bad_body_is_decode_error() {
        let err = decode_elevation(&json!({"elevation": "high"})).unwrap_err();
        assert!(matches!(err, ExternalSourceError::Decode(_)));
    }

    #[test]
    fn test_no_reference_point_is_none() {
        let source = RemoteElevationSource::new(SourceSettings::default()).unwrap();
        assert_eq!(source.field_elevation_ft("KPHX", None), Ok(None));
    }
}
