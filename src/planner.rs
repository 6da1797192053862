//! Route planner session: the operations a UI drives.
//!
//! Places, route membership and route options live behind one lock so that
//! cascading edits (removing a place drops it from the route) are atomic.
//! Network work (geocoding, routing) runs outside the lock. Every mutation is
//! written through to the durable store; when that write fails the session is
//! rolled back and the operation returns `Storage`.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use crate::cancel::GenerationCounter;
use crate::config::PlannerConfig;
use crate::engine::{OptimizationEngine, Optimization, RunStatus};
use crate::error::{PlannerError, ProviderError};
use crate::geocode::{GeocodeOutcome, GeocodingCache};
use crate::haversine::TravelEstimator;
use crate::membership::RouteMembership;
use crate::model::{Coordinate, EndPoint, Place, PlaceId, RouteOptions, RouteOptionsPatch, Scenario, StartPoint};
use crate::nominatim::NominatimClient;
use crate::osrm::OsrmClient;
use crate::places::{IngestMode, ParsedLine, PlaceStore, parse_lines};
use crate::position::PositionTracker;
use crate::quantifier::{Quantification, RouteQuantifier};
use crate::store::{JsonFileStore, MemoryStore, load_json, lock, save_json};
use crate::throttle::Throttle;
use crate::traits::{DurableStore, Geocoder, PositionSource, RouteRequest, RouteRequestOptions, RoutingProvider, TrafficModel};

const PLACES_KEY: &str = "places";
const ROUTE_KEY: &str = "route";
const OPTIONS_KEY: &str = "route_options";

/// Which part of the session a mutation touched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Saved {
    Places,
    Route,
    Options,
}

/// State shared by every planner operation.
#[derive(Debug, Clone, Default)]
pub struct Session {
    pub places: PlaceStore,
    pub route: RouteMembership,
    pub options: RouteOptions,
}

impl Session {
    /// Drops references to places that no longer exist.
    fn prune_dangling(&mut self) {
        let Session { places, route, options } = self;
        route.retain(|id| places.contains(id));
        options.skip_ids.retain(|id| places.contains(id));
        if options.must_visit_first.as_ref().is_some_and(|id| !places.contains(id)) {
            debug!("must-visit-first place removed, clearing");
            options.must_visit_first = None;
        }
        if matches!(&options.start_point, StartPoint::Place(id) if !places.contains(id)) {
            debug!("start place removed, falling back to current location");
            options.start_point = StartPoint::CurrentLocation;
        }
        if matches!(&options.end_point, EndPoint::Place(id) if !places.contains(id)) {
            debug!("end place removed, falling back to start");
            options.end_point = EndPoint::SameAsStart;
        }
    }
}

pub struct RoutePlanner {
    session: Mutex<Session>,
    store: Arc<dyn DurableStore>,
    resolver: Arc<dyn Geocoder>,
    geocoder: GeocodingCache,
    quantifier: Option<RouteQuantifier>,
    engine: OptimizationEngine,
    quantify_runs: GenerationCounter,
    position: PositionTracker,
    position_source: Option<Arc<dyn PositionSource>>,
}

impl RoutePlanner {
    /// Restores the session from `store`. No routing provider is attached;
    /// optimizations use great-circle metrics until one is.
    pub fn open(store: Arc<dyn DurableStore>, resolver: Arc<dyn Geocoder>) -> Result<Self, PlannerError> {
        let places: Vec<Place> = load_json(store.as_ref(), PLACES_KEY)?.unwrap_or_default();
        let route: RouteMembership = load_json(store.as_ref(), ROUTE_KEY)?.unwrap_or_default();
        let options: RouteOptions = load_json(store.as_ref(), OPTIONS_KEY)?.unwrap_or_default();

        let mut session = Session {
            places: PlaceStore::from_places(places),
            route,
            options,
        };
        session.prune_dangling();
        info!(
            places = session.places.len(),
            route = session.route.len(),
            "planner session restored"
        );

        Ok(Self {
            session: Mutex::new(session),
            geocoder: GeocodingCache::new(
                Arc::clone(&resolver),
                Arc::clone(&store),
                Throttle::per_second(crate::config::DEFAULT_GEOCODE_RATE_PER_SEC),
            ),
            position: PositionTracker::with_store(Arc::clone(&store)),
            store,
            resolver,
            quantifier: None,
            engine: OptimizationEngine::default(),
            quantify_runs: GenerationCounter::new(),
            position_source: None,
        })
    }

    /// Builds a planner backed by OSRM and Nominatim as configured.
    pub fn from_config(config: &PlannerConfig) -> Result<Self, PlannerError> {
        let store: Arc<dyn DurableStore> = match &config.state_path {
            Some(path) => Arc::new(JsonFileStore::open(path)?),
            None => Arc::new(MemoryStore::new()),
        };
        let geocoder = NominatimClient::new(config.nominatim.clone()).map_err(ProviderError::from)?;
        let router = OsrmClient::new(config.osrm.clone()).map_err(ProviderError::from)?;

        Ok(Self::open(store, Arc::new(geocoder))?
            .with_provider(Arc::new(router))
            .with_geocode_throttle(Throttle::per_second(config.geocode_rate_per_sec))
            .with_estimator(TravelEstimator::new(config.average_speed_kmh))
            .with_traffic_model(config.traffic_model))
    }

    pub fn with_provider(mut self, provider: Arc<dyn RoutingProvider>) -> Self {
        self.quantifier = Some(RouteQuantifier::new(provider));
        self
    }

    pub fn with_geocode_throttle(mut self, throttle: Throttle) -> Self {
        self.geocoder = GeocodingCache::new(Arc::clone(&self.resolver), Arc::clone(&self.store), throttle);
        self
    }

    pub fn with_estimator(mut self, estimator: TravelEstimator) -> Self {
        self.engine = OptimizationEngine::new(estimator).with_traffic_model(self.engine.traffic_model());
        self
    }

    /// Traffic model requested from the provider for optimization and route metrics.
    pub fn with_traffic_model(mut self, model: Option<TrafficModel>) -> Self {
        self.engine = self.engine.with_traffic_model(model);
        self
    }

    /// Single-shot location polled when an optimization needs a position.
    pub fn with_position_source(mut self, source: Arc<dyn PositionSource>) -> Self {
        self.position_source = Some(source);
        self
    }

    fn session(&self) -> MutexGuard<'_, Session> {
        lock(&self.session)
    }

    // ---- places ----

    /// Parses, geocodes and stores places; returns the ones kept.
    ///
    /// Replace mode also drops route entries for places that are gone.
    pub fn ingest_places(&self, raw_text: &str, mode: IngestMode) -> Result<Vec<Place>, PlannerError> {
        let candidates = PlaceStore::prepare(raw_text, &self.geocoder);
        let mut session = self.session();
        let before = session.clone();
        let accepted = session.places.commit(candidates, mode);
        if mode == IngestMode::Replace {
            session.prune_dangling();
            self.persist(&mut session, before, &[Saved::Places, Saved::Route, Saved::Options])?;
        } else {
            self.persist(&mut session, before, &[Saved::Places])?;
        }
        Ok(accepted)
    }

    /// Deletes a place and removes it from the route in the same step.
    pub fn remove_place(&self, id: &PlaceId) -> Result<Place, PlannerError> {
        let mut session = self.session();
        let before = session.clone();
        let removed = session.places.remove(id)?;
        session.prune_dangling();
        self.persist(&mut session, before, &[Saved::Places, Saved::Route, Saved::Options])?;
        info!(id = %id, "place removed");
        Ok(removed)
    }

    pub fn update_place(&self, place: Place) -> Result<(), PlannerError> {
        let mut session = self.session();
        let before = session.clone();
        session.places.update(place)?;
        self.persist(&mut session, before, &[Saved::Places])
    }

    pub fn toggle_visited(&self, id: &PlaceId) -> Result<bool, PlannerError> {
        let mut session = self.session();
        let before = session.clone();
        let visited = session.places.toggle_visited(id)?;
        self.persist(&mut session, before, &[Saved::Places])?;
        Ok(visited)
    }

    pub fn add_photo(&self, id: &PlaceId, photo_ref: impl Into<String>) -> Result<(), PlannerError> {
        let mut session = self.session();
        let before = session.clone();
        session.places.add_photo(id, photo_ref)?;
        self.persist(&mut session, before, &[Saved::Places])
    }

    pub fn log_visit(&self, id: &PlaceId, date: DateTime<Utc>, note: impl Into<String>) -> Result<(), PlannerError> {
        let mut session = self.session();
        let before = session.clone();
        session.places.log_visit(id, date, note)?;
        self.persist(&mut session, before, &[Saved::Places])
    }

    pub fn clear_visited(&self) -> Result<(), PlannerError> {
        let mut session = self.session();
        let before = session.clone();
        session.places.clear_visited();
        self.persist(&mut session, before, &[Saved::Places])
    }

    pub fn reorder_places(&self, ids: &[PlaceId]) -> Result<(), PlannerError> {
        let mut session = self.session();
        let before = session.clone();
        session.places.reorder(ids)?;
        self.persist(&mut session, before, &[Saved::Places])
    }

    /// Forgets the cached geocode for a place and resolves it again.
    ///
    /// The place is updated either way; `GeocodeFailure` is returned when
    /// the address still cannot be resolved.
    pub fn re_resolve(&self, id: &PlaceId) -> Result<Place, PlannerError> {
        let raw = self
            .place(id)
            .ok_or_else(|| PlannerError::NotFound(id.clone()))?
            .raw_input;

        let resolved = match parse_lines(&raw).into_iter().next() {
            Some(ParsedLine::Coordinates { at, .. }) => Some(at),
            Some(ParsedLine::Address(text)) => {
                self.geocoder.forget(&text)?;
                match self.geocoder.resolve(&text) {
                    GeocodeOutcome::Resolved { lat, lon } => Some(Coordinate::new(lat, lon)),
                    GeocodeOutcome::Failed => None,
                }
            }
            None => None,
        };

        let mut session = self.session();
        let mut place = session
            .places
            .get(id)
            .cloned()
            .ok_or_else(|| PlannerError::NotFound(id.clone()))?;
        match resolved {
            Some(at) => {
                place.lat = at.lat;
                place.lon = at.lon;
                place.geocode_failed = false;
            }
            None => {
                place.lat = 0.0;
                place.lon = 0.0;
                place.geocode_failed = true;
            }
        }
        let before = session.clone();
        session.places.update(place.clone())?;
        self.persist(&mut session, before, &[Saved::Places])?;

        if place.geocode_failed {
            return Err(PlannerError::GeocodeFailure { input: raw });
        }
        Ok(place)
    }

    pub fn place(&self, id: &PlaceId) -> Option<Place> {
        self.session().places.get(id).cloned()
    }

    pub fn places(&self) -> Vec<Place> {
        self.session().places.places().to_vec()
    }

    // ---- route ----

    /// Returns false when the place was already on the route.
    pub fn add_to_route(&self, id: &PlaceId) -> Result<bool, PlannerError> {
        let mut session = self.session();
        if !session.places.contains(id) {
            return Err(PlannerError::NotFound(id.clone()));
        }
        let before = session.clone();
        let added = session.route.add(id.clone());
        if added {
            self.persist(&mut session, before, &[Saved::Route])?;
        }
        Ok(added)
    }

    /// Returns false when the place was not on the route.
    pub fn remove_from_route(&self, id: &PlaceId) -> Result<bool, PlannerError> {
        let mut session = self.session();
        let before = session.clone();
        let removed = session.route.remove(id);
        if removed {
            self.persist(&mut session, before, &[Saved::Route])?;
        }
        Ok(removed)
    }

    pub fn reorder_route(&self, ids: &[PlaceId]) -> Result<(), PlannerError> {
        let mut session = self.session();
        let before = session.clone();
        session.route.reorder(ids)?;
        self.persist(&mut session, before, &[Saved::Route])
    }

    pub fn clear_route(&self) -> Result<(), PlannerError> {
        let mut session = self.session();
        let before = session.clone();
        session.route.clear();
        self.persist(&mut session, before, &[Saved::Route])
    }

    /// Adds every resolved place not yet on the route; returns how many were added.
    pub fn add_all_to_route(&self) -> Result<usize, PlannerError> {
        let mut session = self.session();
        let before = session.clone();
        let Session { places, route, .. } = &mut *session;
        let added = places
            .places()
            .iter()
            .filter(|place| !place.geocode_failed)
            .filter(|place| route.add(place.id.clone()))
            .count();
        if added > 0 {
            self.persist(&mut session, before, &[Saved::Route])?;
        }
        Ok(added)
    }

    pub fn route(&self) -> Vec<PlaceId> {
        self.session().route.ids().to_vec()
    }

    // ---- options ----

    /// Applies `patch`; nothing changes when the result would be invalid.
    pub fn set_route_options(&self, patch: RouteOptionsPatch) -> Result<RouteOptions, PlannerError> {
        let mut session = self.session();
        let mut options = session.options.clone();
        options.merge(patch);

        if let Some(id) = options.conflict() {
            return Err(PlannerError::ConflictingOptions(id.clone()));
        }
        let referenced = options
            .must_visit_first
            .iter()
            .chain(match &options.start_point {
                StartPoint::Place(id) => Some(id),
                StartPoint::CurrentLocation => None,
            })
            .chain(match &options.end_point {
                EndPoint::Place(id) => Some(id),
                EndPoint::CurrentLocation | EndPoint::SameAsStart => None,
            });
        for id in referenced {
            if !session.places.contains(id) {
                return Err(PlannerError::NotFound(id.clone()));
            }
        }

        let before = session.clone();
        session.options = options.clone();
        self.persist(&mut session, before, &[Saved::Options])?;
        Ok(options)
    }

    pub fn route_options(&self) -> RouteOptions {
        self.session().options.clone()
    }

    // ---- position ----

    /// Feeds a fix from a continuous position watch.
    pub fn observe_position(&self, at: Coordinate) -> bool {
        self.position.observe(at)
    }

    pub fn position(&self) -> Option<Coordinate> {
        self.position.latest()
    }

    fn current_position(&self) -> Option<Coordinate> {
        match &self.position_source {
            Some(source) => self.position.refresh(source.as_ref()),
            None => self.position.latest(),
        }
    }

    // ---- optimization ----

    /// Reorders the route for `scenario`.
    ///
    /// `position` overrides the current location. Without it the position
    /// source is polled, falling back to the last tracked fix. A run started
    /// while another is computing supersedes it; the older run returns
    /// [`Optimization::Superseded`] and leaves the route alone.
    ///
    /// An applied order stays in effect even if saving it fails; the error is
    /// still returned.
    pub fn run_optimization(&self, scenario: Scenario, position: Option<Coordinate>) -> Result<Optimization, PlannerError> {
        let position = position.or_else(|| self.current_position());
        let outcome = self
            .engine
            .run(&self.session, self.quantifier.as_ref(), scenario, position)?;
        if let Optimization::Applied(_) = outcome {
            let session = self.session();
            self.save(&session, Saved::Route)?;
        }
        Ok(outcome)
    }

    /// Runs the scenario stored in the route options.
    pub fn optimize(&self) -> Result<Optimization, PlannerError> {
        let scenario = self.session().options.scenario;
        self.run_optimization(scenario, None)
    }

    /// Abandons the optimization in flight; its result will not be applied.
    pub fn cancel_optimization(&self) {
        self.engine.cancel();
    }

    pub fn run_status(&self) -> RunStatus {
        self.engine.status()
    }

    /// Road metrics and geometry for the current route order.
    ///
    /// Skipped and unresolved stops are left out. Returns `None` when the
    /// route is empty, no provider is attached, or a later call superseded
    /// this one.
    pub fn quantify_route(&self) -> Result<Option<Quantification>, PlannerError> {
        let ticket = self.quantify_runs.issue();
        let Some(quantifier) = &self.quantifier else {
            return Ok(None);
        };

        let stops: Vec<Coordinate> = {
            let session = self.session();
            let skip: HashSet<&PlaceId> = session.options.skip_ids.iter().collect();
            session
                .route
                .ids()
                .iter()
                .filter(|id| !skip.contains(id))
                .filter_map(|id| session.places.get(id))
                .filter(|place| session.options.allow_unresolved || !place.geocode_failed)
                .map(Place::coordinate)
                .collect()
        };
        let (Some(&origin), Some(&destination)) = (stops.first(), stops.last()) else {
            return Ok(None);
        };
        let waypoints = if stops.len() > 2 {
            stops[1..stops.len() - 1].to_vec()
        } else {
            Vec::new()
        };

        let request = RouteRequest {
            origin,
            destination,
            waypoints,
            options: RouteRequestOptions {
                traffic_model: self.engine.traffic_model(),
                optimize_waypoints: false,
            },
        };
        match quantifier.quantify_if_live(request, &ticket) {
            Ok(result) => Ok(result),
            Err(err) => {
                warn!(error = %err, "route quantification failed");
                Err(err.into())
            }
        }
    }

    // ---- persistence ----

    fn save(&self, session: &Session, part: Saved) -> Result<(), PlannerError> {
        let store = self.store.as_ref();
        match part {
            Saved::Places => save_json(store, PLACES_KEY, session.places.places())?,
            Saved::Route => save_json(store, ROUTE_KEY, &session.route)?,
            Saved::Options => save_json(store, OPTIONS_KEY, &session.options)?,
        }
        Ok(())
    }

    /// Writes `parts` through. On failure the session goes back to `before`,
    /// and parts already written are rewritten from it.
    fn persist(&self, session: &mut Session, before: Session, parts: &[Saved]) -> Result<(), PlannerError> {
        for (written, part) in parts.iter().enumerate() {
            if let Err(err) = self.save(session, *part) {
                warn!(error = %err, part = ?part, "write-through failed, rolling back");
                *session = before;
                for part in &parts[..written] {
                    if let Err(err) = self.save(session, *part) {
                        warn!(error = %err, part = ?part, "stored state may be ahead of memory");
                    }
                }
                return Err(err);
            }
        }
        Ok(())
    }
}
