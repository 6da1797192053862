//! OSRM HTTP adapter for road routes.
//!
//! Fixed-order requests go to `/route`; waypoint optimization goes to `/trip`
//! with the first and last coordinates pinned.

use serde::Deserialize;
use tracing::debug;

use crate::error::ProviderError;
use crate::model::Coordinate;
use crate::polyline::{DEFAULT_PRECISION, Polyline};
use crate::traits::{ProviderRoute, RouteRequest, RoutingProvider};

#[derive(Debug, Clone)]
pub struct OsrmConfig {
    pub base_url: String,
    pub profile: String,
    pub timeout_secs: u64,
}

impl Default for OsrmConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:5000".to_string(),
            profile: "car".to_string(),
            timeout_secs: 10,
        }
    }
}

#[derive(Debug, Clone)]
pub struct OsrmClient {
    config: OsrmConfig,
    client: reqwest::blocking::Client,
}

impl OsrmClient {
    pub fn new(config: OsrmConfig) -> Result<Self, reqwest::Error> {
        let client = reqwest::blocking::Client::builder()
            .timeout(std::time::Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self { config, client })
    }

    fn url_for(&self, request: &RouteRequest) -> String {
        let coords = coordinate_path(request);
        let base = self.config.base_url.trim_end_matches('/');
        if request.options.optimize_waypoints && !request.waypoints.is_empty() {
            format!(
                "{}/trip/v1/{}/{}?source=first&destination=last&roundtrip=false&overview=full&geometries=polyline",
                base, self.config.profile, coords
            )
        } else {
            format!(
                "{}/route/v1/{}/{}?overview=full&geometries=polyline",
                base, self.config.profile, coords
            )
        }
    }
}

impl RoutingProvider for OsrmClient {
    fn compute_route(&self, request: &RouteRequest) -> Result<ProviderRoute, ProviderError> {
        let url = self.url_for(request);
        debug!(%url, "osrm request");

        let response = self.client.get(url).send()?;
        let status = response.status();
        let body: OsrmResponse = response.json()?;
        if body.code != "Ok" {
            return Err(ProviderError::Status {
                status: body.code,
                message: body.message.unwrap_or_else(|| status.to_string()),
            });
        }

        parse_response(body, request.waypoints.len())
    }
}

/// `lng,lat;lng,lat;...` from origin through waypoints to destination.
fn coordinate_path(request: &RouteRequest) -> String {
    std::iter::once(&request.origin)
        .chain(request.waypoints.iter())
        .chain(std::iter::once(&request.destination))
        .map(|c: &Coordinate| format!("{:.6},{:.6}", c.lon, c.lat))
        .collect::<Vec<_>>()
        .join(";")
}

fn parse_response(body: OsrmResponse, interior: usize) -> Result<ProviderRoute, ProviderError> {
    let (route, waypoint_order) = if let Some(mut trips) = body.trips {
        if trips.is_empty() {
            return Err(ProviderError::Malformed("trip response without trips".into()));
        }
        let order = trip_order(body.waypoints.as_deref().unwrap_or_default(), interior)?;
        (trips.swap_remove(0), Some(order))
    } else {
        let route = body
            .routes
            .and_then(|routes| routes.into_iter().next())
            .ok_or_else(|| ProviderError::Malformed("route response without routes".into()))?;
        (route, None)
    };

    let geometry = match route.geometry.as_deref() {
        Some(encoded) => Polyline::decode(encoded, DEFAULT_PRECISION)
            .map_err(|err| ProviderError::Malformed(err.to_string()))?,
        None => Polyline::default(),
    };
    let summary = route
        .legs
        .iter()
        .map(|leg| leg.summary.trim())
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join("; ");

    Ok(ProviderRoute {
        waypoint_order,
        geometry,
        distance_meters: route.distance,
        duration_seconds: route.duration,
        summary: (!summary.is_empty()).then_some(summary),
    })
}

/// Interior permutation from OSRM's per-input `waypoint_index` (trip position).
fn trip_order(waypoints: &[OsrmWaypoint], interior: usize) -> Result<Vec<usize>, ProviderError> {
    if waypoints.len() != interior + 2 {
        return Err(ProviderError::Malformed(format!(
            "expected {} trip waypoints, got {}",
            interior + 2,
            waypoints.len()
        )));
    }
    let mut interior_positions: Vec<(usize, usize)> = waypoints[1..=interior]
        .iter()
        .enumerate()
        .map(|(input, wp)| (wp.waypoint_index, input))
        .collect();
    interior_positions.sort_unstable();
    Ok(interior_positions.into_iter().map(|(_, input)| input).collect())
}

#[derive(Debug, Deserialize)]
struct OsrmResponse {
    code: String,
    message: Option<String>,
    routes: Option<Vec<OsrmRoute>>,
    trips: Option<Vec<OsrmRoute>>,
    waypoints: Option<Vec<OsrmWaypoint>>,
}

#[derive(Debug, Deserialize)]
struct OsrmRoute {
    geometry: Option<String>,
    distance: f64,
    duration: f64,
    #[serde(default)]
    legs: Vec<OsrmLeg>,
}

#[derive(Debug, Deserialize)]
struct OsrmLeg {
    #[serde(default)]
    summary: String,
}

#[derive(Debug, Deserialize)]
struct OsrmWaypoint {
    #[serde(default)]
    waypoint_index: usize,
}
