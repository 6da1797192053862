//! field-router core
//!
//! Turns free-form address lists into geocoded places, keeps an ordered
//! route over a subset of them, and proposes visiting orders from local
//! heuristics refined by a road-routing provider.

pub mod cancel;
pub mod config;
pub mod engine;
pub mod error;
pub mod geocode;
pub mod haversine;
pub mod heuristics;
pub mod membership;
pub mod model;
pub mod nominatim;
pub mod osrm;
pub mod places;
pub mod planner;
pub mod polyline;
pub mod position;
pub mod quantifier;
pub mod store;
pub mod throttle;
pub mod traits;

pub use engine::{Optimization, OptimizationEngine, RunStatus};
pub use error::{GeocodeError, PlannerError, ProviderError, StoreError};
pub use model::{Coordinate, EndPoint, Place, PlaceId, RouteOptions, RouteOptionsPatch, RouteResult, Scenario, StartPoint};
pub use places::IngestMode;
pub use planner::RoutePlanner;
