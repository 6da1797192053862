//! Boundary traits for the collaborators the core calls out to.
//!
//! Concrete adapters (OSRM, Nominatim, the
//! JSON file store) live in their own modules; tests substitute fakes.

use serde::{Deserialize, Serialize};

use crate::error::{GeocodeError, ProviderError, StoreError};
use crate::model::Coordinate;
use crate::polyline::Polyline;

/// Resolves free text to coordinates.
pub trait Geocoder: Send + Sync {
    fn geocode_text(&self, address: &str) -> Result<Coordinate, GeocodeError>;
}

/// Computes road routes, optionally reordering interior waypoints.
pub trait RoutingProvider: Send + Sync {
    fn compute_route(&self, request: &RouteRequest) -> Result<ProviderRoute, ProviderError>;

    /// Whether the provider honours [`TrafficModel`]s.
    fn supports_traffic_model(&self) -> bool {
        false
    }
}

/// Device or browser location.
pub trait PositionSource: Send + Sync {
    /// Single-shot fix; `None` when location is unavailable.
    fn current_position(&self) -> Option<Coordinate>;
}

/// Durable string key-value persistence.
pub trait DurableStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError>;
    fn set(&self, key: &str, value: &str) -> Result<(), StoreError>;
    fn remove(&self, key: &str) -> Result<(), StoreError>;
}

/// Traffic assumption for duration estimates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TrafficModel {
    BestGuess,
    Pessimistic,
    Optimistic,
}

impl TrafficModel {
    /// Normalizes user or config text. Unknown text and `none` yield `None`.
    pub fn parse(text: &str) -> Option<Self> {
        let folded: String = text
            .trim()
            .chars()
            .filter(|c| !matches!(c, '-' | '_' | ' '))
            .flat_map(char::to_lowercase)
            .collect();
        match folded.as_str() {
            "bestguess" => Some(TrafficModel::BestGuess),
            "pessimistic" => Some(TrafficModel::Pessimistic),
            "optimistic" => Some(TrafficModel::Optimistic),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RouteRequestOptions {
    pub traffic_model: Option<TrafficModel>,
    pub optimize_waypoints: bool,
}

/// Fixed origin and destination with interior waypoints in between.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RouteRequest {
    pub origin: Coordinate,
    pub destination: Coordinate,
    pub waypoints: Vec<Coordinate>,
    pub options: RouteRequestOptions,
}

/// Raw provider answer, before validation by the quantifier.
#[derive(Debug, Clone, PartialEq)]
pub struct ProviderRoute {
    /// Permutation of `waypoints` indices; `None` when the provider kept input order.
    pub waypoint_order: Option<Vec<usize>>,
    pub geometry: Polyline,
    pub distance_meters: f64,
    pub duration_seconds: f64,
    pub summary: Option<String>,
}
