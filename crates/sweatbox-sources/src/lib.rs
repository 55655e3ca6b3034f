//! Remote flight plan and elevation sources for the scenario generator.

pub mod cache;
pub mod config;
pub mod elevation;
pub mod flight_plans;
mod http;

pub use config::SourceSettings;
pub use elevation::RemoteElevationSource;
pub use flight_plans::RemoteFlightPlanSource;

use std::sync::Arc;
use sweatbox_core::{ElevationSource, FlightPlanSource};

pub type Sources = (Option<Arc<dyn FlightPlanSource>>, Option<Arc<dyn ElevationSource>>);

/// Build both remote sources, or none when offline or the HTTP client can't be built.
pub fn remote_sources(settings: &SourceSettings) -> Sources {
    if settings.offline {
        tracing::info!("Remote sources disabled, using local data only");
        return (None, None);
    }
    let plans = match RemoteFlightPlanSource::new(settings.clone()) {
        Ok(source) => Some(Arc::new(source) as Arc<dyn FlightPlanSource>),
        Err(err) => {
            tracing::warn!("Flight plan source unavailable: {:#}", err);
            None
        }
    };
    let elevation = match RemoteElevationSource::new(settings.clone()) {
        Ok(source) => Some(Arc::new(source) as Arc<dyn ElevationSource>),
        Err(err) => {
            tracing::warn!("Elevation source unavailable: {:#}", err);
            None
        }
    };
    (plans, elevation)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_offline_yields_no_sources() {
        let settings = SourceSettings {
            offline: true,
            ..SourceSettings::default()
        };
        let (plans, elevation) = remote_sources(&settings);
        assert!(plans.is_none() && elevation.is_none());
    }
}
