//! Planner configuration.
//!
//! Every value has a default; `from_env` overrides them from `FIELD_ROUTER_*`
//! variables.

use std::env;
use std::path::PathBuf;
use std::str::FromStr;

use tracing::warn;

use crate::haversine::DEFAULT_SPEED_KMH;
use crate::nominatim::NominatimConfig;
use crate::osrm::OsrmConfig;
use crate::traits::TrafficModel;

/// Nominatim's public usage policy allows a couple of requests per second.
pub const DEFAULT_GEOCODE_RATE_PER_SEC: u32 = 2;

#[derive(Debug, Clone)]
pub struct PlannerConfig {
    pub osrm: OsrmConfig,
    pub nominatim: NominatimConfig,
    pub geocode_rate_per_sec: u32,
    /// Speed used to turn great-circle km into minutes.
    pub average_speed_kmh: f64,
    /// Sent to providers that support traffic-aware durations.
    pub traffic_model: Option<TrafficModel>,
    /// JSON file backing the durable store; `None` keeps state in memory.
    pub state_path: Option<PathBuf>,
}

impl Default for PlannerConfig {
    fn default() -> Self {
        Self {
            osrm: OsrmConfig::default(),
            nominatim: NominatimConfig::default(),
            geocode_rate_per_sec: DEFAULT_GEOCODE_RATE_PER_SEC,
            average_speed_kmh: DEFAULT_SPEED_KMH,
            traffic_model: None,
            state_path: None,
        }
    }
}

impl PlannerConfig {
    /// Defaults overridden by whichever `FIELD_ROUTER_*` variables are set.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();

        if let Some(url) = lookup("FIELD_ROUTER_OSRM_URL") {
            config.osrm.base_url = url;
        }
        if let Some(profile) = lookup("FIELD_ROUTER_OSRM_PROFILE") {
            config.osrm.profile = profile;
        }
        if let Some(secs) = parsed(&lookup, "FIELD_ROUTER_PROVIDER_TIMEOUT_SECS") {
            config.osrm.timeout_secs = secs;
            config.nominatim.timeout_secs = secs;
        }
        if let Some(url) = lookup("FIELD_ROUTER_NOMINATIM_URL") {
            config.nominatim.base_url = url;
        }
        if let Some(agent) = lookup("FIELD_ROUTER_USER_AGENT") {
            config.nominatim.user_agent = agent;
        }
        if let Some(codes) = lookup("FIELD_ROUTER_COUNTRY_CODES") {
            config.nominatim.country_codes = Some(codes).filter(|c| !c.trim().is_empty());
        }
        if let Some(rate) = parsed(&lookup, "FIELD_ROUTER_GEOCODE_RATE") {
            config.geocode_rate_per_sec = rate;
        }
        if let Some(speed) = parsed::<f64>(&lookup, "FIELD_ROUTER_SPEED_KMH").filter(|s| *s > 0.0) {
            config.average_speed_kmh = speed;
        }
        if let Some(model) = lookup("FIELD_ROUTER_TRAFFIC_MODEL") {
            config.traffic_model = TrafficModel::parse(&model);
        }
        if let Some(path) = lookup("FIELD_ROUTER_STATE_PATH") {
            config.state_path = Some(PathBuf::from(path));
        }

        config
    }
}

fn parsed<T: FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Option<T> {
    let raw = lookup(key)?;
    match raw.trim().parse() {
        Ok(value) => Some(value),
        Err(_) => {
            warn!(key, value = %raw, "ignoring unparsable setting");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults() {
        let config = PlannerConfig::from_lookup(lookup(&[]));
        assert_eq!(config.osrm.base_url, "http://localhost:5000");
        assert_eq!(config.osrm.profile, "car");
        assert_eq!(config.geocode_rate_per_sec, 2);
        assert_eq!(config.average_speed_kmh, 40.0);
        assert!(config.state_path.is_none());
    }

    #[test]
    fn overrides() {
        let config = PlannerConfig::from_lookup(lookup(&[
            ("FIELD_ROUTER_OSRM_URL", "http://osrm:5000"),
            ("FIELD_ROUTER_PROVIDER_TIMEOUT_SECS", "3"),
            ("FIELD_ROUTER_COUNTRY_CODES", "ca"),
            ("FIELD_ROUTER_GEOCODE_RATE", "1"),
            ("FIELD_ROUTER_TRAFFIC_MODEL", "best_guess"),
            ("FIELD_ROUTER_STATE_PATH", "/tmp/router.json"),
        ]));
        assert_eq!(config.osrm.base_url, "http://osrm:5000");
        assert_eq!(config.osrm.timeout_secs, 3);
        assert_eq!(config.nominatim.timeout_secs, 3);
        assert_eq!(config.nominatim.country_codes.as_deref(), Some("ca"));
        assert_eq!(config.geocode_rate_per_sec, 1);
        assert_eq!(config.traffic_model, Some(TrafficModel::BestGuess));
        assert_eq!(config.state_path, Some(PathBuf::from("/tmp/router.json")));
    }

    #[test]
    fn unparsable_values_keep_defaults() {
        let config = PlannerConfig::from_lookup(lookup(&[
            ("FIELD_ROUTER_GEOCODE_RATE", "fast"),
            ("FIELD_ROUTER_SPEED_KMH", "-5"),
        ]));
        assert_eq!(config.geocode_rate_per_sec, 2);
        assert_eq!(config.average_speed_kmh, 40.0);
    }
}
