//! Test fixtures for field-router.
//!
//! Provides:
//! - Real Metro Vancouver locations (from OpenStreetMap)
//! - In-process fakes for the geocoder and routing provider

#![allow(dead_code)]

pub mod metro_vancouver_locations;

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::mpsc::{Receiver, Sender, channel};
use std::sync::{Arc, Mutex};

use field_router::error::{GeocodeError, ProviderError};
use field_router::haversine::haversine_km;
use field_router::model::Coordinate;
use field_router::planner::RoutePlanner;
use field_router::polyline::Polyline;
use field_router::store::MemoryStore;
use field_router::throttle::Throttle;
use field_router::traits::{DurableStore, Geocoder, PositionSource, ProviderRoute, RouteRequest, RoutingProvider};

pub use metro_vancouver_locations::*;

/// Geocoder answering from a fixed table; anything else has no results.
#[derive(Default)]
pub struct TableGeocoder {
    table: HashMap<String, Coordinate>,
    calls: AtomicUsize,
}

impl TableGeocoder {
    pub fn new<'a>(entries: impl IntoIterator<Item = (&'a str, Coordinate)>) -> Self {
        Self {
            table: entries
                .into_iter()
                .map(|(address, at)| (address.to_string(), at))
                .collect(),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl Geocoder for TableGeocoder {
    fn geocode_text(&self, address: &str) -> Result<Coordinate, GeocodeError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.table.get(address).copied().ok_or(GeocodeError::NoResults)
    }
}

/// Provider that walks the request in order (or reversed when optimizing)
/// and reports straight-line metrics.
pub struct StraightLineProvider {
    pub reverse_when_optimizing: bool,
    pub supports_traffic: bool,
    pub requests: Mutex<Vec<RouteRequest>>,
}

impl StraightLineProvider {
    pub fn new() -> Self {
        Self {
            reverse_when_optimizing: false,
            supports_traffic: false,
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn traffic_aware() -> Self {
        Self {
            supports_traffic: true,
            ..Self::new()
        }
    }

    pub fn reversing() -> Self {
        Self {
            reverse_when_optimizing: true,
            ..Self::new()
        }
    }
}

impl RoutingProvider for StraightLineProvider {
    fn compute_route(&self, request: &RouteRequest) -> Result<ProviderRoute, ProviderError> {
        self.requests.lock().unwrap().push(request.clone());
        let mut order: Vec<usize> = (0..request.waypoints.len()).collect();
        if request.options.optimize_waypoints && self.reverse_when_optimizing {
            order.reverse();
        }
        let mut points = vec![request.origin];
        points.extend(order.iter().map(|&i| request.waypoints[i]));
        points.push(request.destination);
        let km: f64 = points.windows(2).map(|pair| haversine_km(pair[0], pair[1])).sum();

        Ok(ProviderRoute {
            waypoint_order: request.options.optimize_waypoints.then_some(order),
            geometry: Polyline::new(points.iter().map(|p| p.as_tuple()).collect()),
            distance_meters: km * 1000.0,
            duration_seconds: km * 90.0,
            summary: Some("straight line".to_string()),
        })
    }

    fn supports_traffic_model(&self) -> bool {
        self.supports_traffic
    }
}

/// Provider that always fails with the given error.
pub struct FailingProvider(pub fn() -> ProviderError);

impl RoutingProvider for FailingProvider {
    fn compute_route(&self, _request: &RouteRequest) -> Result<ProviderRoute, ProviderError> {
        Err((self.0)())
    }
}

/// Provider that blocks every call until the test releases it.
///
/// Each call announces itself on `entered` and then waits for one message
/// on the release channel.
pub struct GatedProvider {
    inner: StraightLineProvider,
    entered: Mutex<Sender<()>>,
    release: Mutex<Receiver<()>>,
}

pub struct Gate {
    pub entered: Receiver<()>,
    pub release: Sender<()>,
}

impl GatedProvider {
    pub fn new() -> (Self, Gate) {
        let (entered_tx, entered_rx) = channel();
        let (release_tx, release_rx) = channel();
        let provider = Self {
            inner: StraightLineProvider::new(),
            entered: Mutex::new(entered_tx),
            release: Mutex::new(release_rx),
        };
        (
            provider,
            Gate {
                entered: entered_rx,
                release: release_tx,
            },
        )
    }
}

impl RoutingProvider for GatedProvider {
    fn compute_route(&self, request: &RouteRequest) -> Result<ProviderRoute, ProviderError> {
        self.entered.lock().unwrap().send(()).ok();
        self.release.lock().unwrap().recv().ok();
        self.inner.compute_route(request)
    }
}

/// Single-shot position source that answers with a fixed fix and counts polls.
pub struct FixedPosition {
    at: Option<Coordinate>,
    polls: AtomicUsize,
}

impl FixedPosition {
    pub fn new(at: Option<Coordinate>) -> Self {
        Self {
            at,
            polls: AtomicUsize::new(0),
        }
    }

    pub fn polls(&self) -> usize {
        self.polls.load(Ordering::SeqCst)
    }
}

impl PositionSource for FixedPosition {
    fn current_position(&self) -> Option<Coordinate> {
        self.polls.fetch_add(1, Ordering::SeqCst);
        self.at
    }
}

/// Planner over an in-memory store with an unthrottled table geocoder.
pub fn planner_with(geocoder: TableGeocoder) -> RoutePlanner {
    planner_on(Arc::new(MemoryStore::new()), geocoder)
}

pub fn planner_on(store: Arc<dyn DurableStore>, geocoder: TableGeocoder) -> RoutePlanner {
    RoutePlanner::open(store, Arc::new(geocoder))
        .expect("open planner")
        .with_geocode_throttle(Throttle::per_second(0))
}

pub fn planner() -> RoutePlanner {
    planner_with(TableGeocoder::new(site_addresses()))
}
