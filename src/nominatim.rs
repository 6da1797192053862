//! Nominatim (OpenStreetMap) HTTP adapter for geocoding.

use serde::Deserialize;

use crate::error::GeocodeError;
use crate::model::Coordinate;
use crate::traits::Geocoder;

#[derive(Debug, Clone)]
pub struct NominatimConfig {
    pub base_url: String,
    /// Nominatim's usage policy requires an identifying agent.
    pub user_agent: String,
    /// Comma-separated ISO country codes, e.g. `"ca"`.
    pub country_codes: Option<String>,
    pub timeout_secs: u64,
}

impl Default for NominatimConfig {
    fn default() -> Self {
        Self {
            base_url: "https://nominatim.openstreetmap.org".to_string(),
            user_agent: concat!("field-router/", env!("CARGO_PKG_VERSION")).to_string(),
            country_codes: None,
            timeout_secs: 10,
        }
    }
}

#[derive(Debug, Clone)]
pub struct NominatimClient {
    config: NominatimConfig,
    client: reqwest::blocking::Client,
}

impl NominatimClient {
    pub fn new(config: NominatimConfig) -> Result<Self, reqwest::Error> {
        let client = reqwest::blocking::Client::builder()
            .timeout(std::time::Duration::from_secs(config.timeout_secs))
            .user_agent(config.user_agent.clone())
            .build()?;

        Ok(Self { config, client })
    }
}

impl Geocoder for NominatimClient {
    fn geocode_text(&self, address: &str) -> Result<Coordinate, GeocodeError> {
        let url = format!("{}/search", self.config.base_url.trim_end_matches('/'));
        let mut query = vec![
            ("format", "jsonv2"),
            ("q", address),
            ("limit", "1"),
            ("addressdetails", "0"),
        ];
        if let Some(codes) = self.config.country_codes.as_deref() {
            query.push(("countrycodes", codes));
        }

        let hits = self
            .client
            .get(url)
            .header(reqwest::header::ACCEPT, "application/json")
            .query(&query)
            .send()
            .and_then(|resp| resp.error_for_status())
            .and_then(|resp| resp.json::<Vec<NominatimHit>>())?;

        first_coordinate(hits)
    }
}

fn first_coordinate(hits: Vec<NominatimHit>) -> Result<Coordinate, GeocodeError> {
    let hit = hits.into_iter().next().ok_or(GeocodeError::NoResults)?;
    match (hit.lat.parse::<f64>(), hit.lon.parse::<f64>()) {
        (Ok(lat), Ok(lon)) => Ok(Coordinate::new(lat, lon)),
        _ => Err(GeocodeError::NoResults),
    }
}

/// Nominatim encodes coordinates as strings.
#[derive(Debug, Deserialize)]
struct NominatimHit {
    lat: String,
    lon: String,
}
