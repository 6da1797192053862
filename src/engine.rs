//! Optimization engine: proposes a visiting order for the current route.
//!
//! A run moves `Idle → Computing → {Applied | Cancelled | Failed}`. Starting
//! a run supersedes any run still computing; the superseded run's result is
//! dropped at commit time without an error. Inputs are snapshotted under the
//! session lock, the provider is consulted without holding it, and the lock
//! is retaken only to commit.

use std::collections::HashSet;
use std::sync::Mutex;

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::cancel::{GenerationCounter, RunTicket};
use crate::error::PlannerError;
use crate::haversine::{DistanceMatrix, TravelEstimator};
use crate::heuristics::{cheapest_insertion, farthest_first, nearest_neighbor};
use crate::membership::RouteMembership;
use crate::model::{Coordinate, EndPoint, Place, PlaceId, RouteOptions, RouteResult, Scenario, StartPoint};
use crate::places::PlaceStore;
use crate::planner::Session;
use crate::quantifier::RouteQuantifier;
use crate::store::lock;
use crate::traits::{RouteRequest, RouteRequestOptions, TrafficModel};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum RunStatus {
    Idle,
    Computing,
    Applied,
    Cancelled,
    Failed,
}

/// What happened to a run that did not fail.
#[derive(Debug, Clone, PartialEq)]
pub enum Optimization {
    Applied(RouteResult),
    /// A newer run was started; this one's result was discarded.
    Superseded,
}

/// Local ordering plus everything needed to ask the provider about it.
#[derive(Debug, Clone)]
pub struct Plan {
    ids: Vec<PlaceId>,
    coords: Vec<Coordinate>,
    origin: Coordinate,
    destination: Coordinate,
    /// The first stop is the start place (same point as `origin`).
    leads_with_start: bool,
    /// The last stop is the end place (same point as `destination`).
    ends_with_end: bool,
    /// Interior stops may be reordered by the provider.
    provider_may_reorder: bool,
    round_trip_return: Option<PlaceId>,
    local_km: f64,
    /// False for trivial routes, which are never rewritten.
    reorders: bool,
}

impl Plan {
    pub fn ordered_ids(&self) -> &[PlaceId] {
        &self.ids
    }

    pub fn local_km(&self) -> f64 {
        self.local_km
    }
}

pub struct OptimizationEngine {
    generations: GenerationCounter,
    status: Mutex<(u64, RunStatus)>,
    estimator: TravelEstimator,
    traffic_model: Option<TrafficModel>,
}

impl OptimizationEngine {
    pub fn new(estimator: TravelEstimator) -> Self {
        Self {
            generations: GenerationCounter::new(),
            status: Mutex::new((0, RunStatus::Idle)),
            estimator,
            traffic_model: None,
        }
    }

    /// Traffic model passed to the provider on every run.
    pub fn with_traffic_model(mut self, model: Option<TrafficModel>) -> Self {
        self.traffic_model = model;
        self
    }

    pub fn traffic_model(&self) -> Option<TrafficModel> {
        self.traffic_model
    }

    /// Status of the most recently started run.
    pub fn status(&self) -> RunStatus {
        lock(&self.status).1
    }

    /// Snapshots, orders, optionally refines through the provider, and commits.
    pub fn run(
        &self,
        session: &Mutex<Session>,
        quantifier: Option<&RouteQuantifier>,
        scenario: Scenario,
        position: Option<Coordinate>,
    ) -> Result<Optimization, PlannerError> {
        let ticket = self.begin();

        let plan = {
            let session = lock(session);
            self.plan(&session.places, &session.route, &session.options, scenario, position)
        };
        let plan = match plan {
            Ok(plan) => plan,
            Err(err) => {
                warn!(generation = ticket.generation(), error = %err, "optimization failed");
                self.finish(&ticket, RunStatus::Failed);
                return Err(err);
            }
        };

        let Some(result) = self.refine(&plan, quantifier, &ticket) else {
            return Ok(self.supersede(&ticket));
        };

        let mut session = lock(session);
        Ok(self.commit(&ticket, &plan, &mut session.route, result))
    }

    /// Starts a run, superseding any run still computing.
    pub fn begin(&self) -> RunTicket {
        let mut status = lock(&self.status);
        let ticket = self.generations.issue();
        if status.1 == RunStatus::Computing {
            debug!(generation = status.0, "superseding run");
        }
        *status = (ticket.generation(), RunStatus::Computing);
        debug!(generation = ticket.generation(), "optimization started");
        ticket
    }

    /// Supersedes the run in flight, if any, without starting another.
    pub fn cancel(&self) {
        let mut status = lock(&self.status);
        let ticket = self.generations.issue();
        if status.1 == RunStatus::Computing {
            info!(generation = status.0, "optimization cancelled");
            *status = (ticket.generation(), RunStatus::Cancelled);
        } else {
            status.0 = ticket.generation();
        }
    }

    /// Computes the local visiting order. Reads state, never writes it.
    pub fn plan(
        &self,
        places: &PlaceStore,
        route: &RouteMembership,
        options: &RouteOptions,
        scenario: Scenario,
        position: Option<Coordinate>,
    ) -> Result<Plan, PlannerError> {
        if let Some(id) = options.conflict() {
            return Err(PlannerError::ConflictingOptions(id.clone()));
        }

        let stops: Vec<&Place> = route
            .ids()
            .iter()
            .filter_map(|id| places.get(id))
            .filter(|place| !options.skip_ids.contains(&place.id))
            .filter(|place| options.allow_unresolved || !place.geocode_failed)
            .collect();

        if stops.len() < 2 {
            return Ok(self.trivial(&stops));
        }

        let (origin, start_id) = match &options.start_point {
            StartPoint::CurrentLocation => (position.ok_or(PlannerError::NoPosition)?, None),
            StartPoint::Place(id) => (anchor_place(places, id, options)?, Some(id)),
        };
        let round_trip = scenario == Scenario::RoundTrip;
        let (destination, end_id) = match &options.end_point {
            _ if round_trip => (origin, None),
            EndPoint::SameAsStart => (origin, None),
            EndPoint::CurrentLocation => (position.ok_or(PlannerError::NoPosition)?, None),
            EndPoint::Place(id) => (anchor_place(places, id, options)?, Some(id)),
        };

        let mut prefix: Vec<&Place> = Vec::new();
        if let Some(start) = start_id.and_then(|id| stops.iter().copied().find(|p| &p.id == id)) {
            prefix.push(start);
        }
        let leads_with_start = !prefix.is_empty();
        if let Some(first) = options
            .must_visit_first
            .as_ref()
            .and_then(|id| stops.iter().copied().find(|p| &p.id == id))
        {
            if !prefix.iter().any(|p| p.id == first.id) {
                prefix.push(first);
            }
        }
        let suffix: Option<&Place> = end_id
            .and_then(|id| stops.iter().copied().find(|p| &p.id == id))
            .filter(|end| !prefix.iter().any(|p| p.id == end.id));
        let pinned: HashSet<&PlaceId> = prefix
            .iter()
            .map(|p| &p.id)
            .chain(suffix.map(|p| &p.id))
            .collect();
        let free: Vec<&Place> = stops.iter().copied().filter(|p| !pinned.contains(&p.id)).collect();

        // Matrix layout: origin, destination, prefix, free, suffix.
        let mut locations = vec![origin, destination];
        locations.extend(prefix.iter().map(|p| p.coordinate()));
        locations.extend(free.iter().map(|p| p.coordinate()));
        locations.extend(suffix.iter().map(|p| p.coordinate()));
        let matrix = DistanceMatrix::great_circle(&locations);

        let free_base = 2 + prefix.len();
        let free_idx: Vec<usize> = (free_base..free_base + free.len()).collect();
        let from = if prefix.is_empty() { 0 } else { free_base - 1 };
        let to = if suffix.is_some() { free_base + free.len() } else { 1 };

        let ordered_free = match scenario {
            Scenario::Nearest | Scenario::RoundTrip => nearest_neighbor(&matrix, from, &free_idx),
            Scenario::Farthest => farthest_first(&matrix, from, &free_idx),
            Scenario::Optimize => cheapest_insertion(&matrix, from, to, &free_idx),
            Scenario::Custom => free_idx.clone(),
        };

        let mut order: Vec<usize> = (2..free_base).collect();
        order.extend(ordered_free);
        if suffix.is_some() {
            order.push(free_base + free.len());
        }

        let mut path = Vec::with_capacity(order.len() + 2);
        path.push(0);
        path.extend(&order);
        path.push(1);
        let local_km = matrix.path_length(&path);

        let ids: Vec<PlaceId> = order
            .iter()
            .filter_map(|&index| {
                if index < free_base {
                    Some(prefix[index - 2])
                } else if index < free_base + free.len() {
                    Some(free[index - free_base])
                } else {
                    suffix
                }
            })
            .map(|place| place.id.clone())
            .collect();
        let coords: Vec<Coordinate> = order.iter().map(|&i| locations[i]).collect();

        let round_trip_return = (round_trip && leads_with_start)
            .then(|| ids[0].clone());
        let provider_may_reorder = scenario != Scenario::Custom && prefix.len() == usize::from(leads_with_start);

        debug!(
            ?scenario,
            stops = ids.len(),
            local_km,
            "local order computed"
        );

        Ok(Plan {
            ids,
            coords,
            origin,
            destination,
            leads_with_start,
            ends_with_end: suffix.is_some(),
            provider_may_reorder,
            round_trip_return,
            local_km,
            reorders: true,
        })
    }

    fn trivial(&self, stops: &[&Place]) -> Plan {
        let coords: Vec<Coordinate> = stops.iter().map(|p| p.coordinate()).collect();
        let first = coords.first().copied().unwrap_or(Coordinate::new(0.0, 0.0));
        Plan {
            ids: stops.iter().map(|p| p.id.clone()).collect(),
            coords,
            origin: first,
            destination: first,
            leads_with_start: false,
            ends_with_end: false,
            provider_may_reorder: false,
            round_trip_return: None,
            local_km: 0.0,
            reorders: false,
        }
    }

    /// Turns a plan into a result, consulting the provider when one is given.
    ///
    /// Provider failures fall back to the local order and great-circle
    /// metrics. Returns `None` when `ticket` was superseded meanwhile.
    pub fn refine(&self, plan: &Plan, quantifier: Option<&RouteQuantifier>, ticket: &RunTicket) -> Option<RouteResult> {
        let local = self.local_result(plan);
        let Some(quantifier) = quantifier.filter(|_| plan.reorders) else {
            return Some(local);
        };

        let lead = usize::from(plan.leads_with_start);
        let trail = usize::from(plan.ends_with_end);
        let interior_ids = &plan.ids[lead..plan.ids.len() - trail];
        let request = RouteRequest {
            origin: plan.origin,
            destination: plan.destination,
            waypoints: plan.coords[lead..plan.coords.len() - trail].to_vec(),
            options: RouteRequestOptions {
                traffic_model: self.traffic_model,
                optimize_waypoints: plan.provider_may_reorder,
            },
        };

        match quantifier.quantify_if_live(request, ticket) {
            Ok(None) => None,
            Ok(Some(quantified)) => {
                let mut ids: Vec<PlaceId> = plan.ids[..lead].to_vec();
                ids.extend(
                    quantified
                        .ordered_waypoint_indices
                        .iter()
                        .map(|&i| interior_ids[i].clone()),
                );
                ids.extend(plan.ids[plan.ids.len() - trail..].iter().cloned());
                ids.extend(plan.round_trip_return.iter().cloned());
                Some(RouteResult {
                    ordered_place_ids: ids,
                    total_distance: quantified.total_distance_meters / 1000.0,
                    total_duration: quantified.total_duration_seconds / 60.0,
                    provider_summary: quantified.summary,
                    approximate: false,
                    path: Some(quantified.decoded_path),
                })
            }
            Err(err) => {
                if !ticket.is_live() {
                    return None;
                }
                warn!(error = %err, "routing provider failed, using local order");
                Some(local)
            }
        }
    }

    fn local_result(&self, plan: &Plan) -> RouteResult {
        let mut ids = plan.ids.clone();
        ids.extend(plan.round_trip_return.iter().cloned());
        RouteResult {
            ordered_place_ids: ids,
            total_distance: plan.local_km,
            total_duration: self.estimator.km_to_minutes(plan.local_km),
            provider_summary: None,
            approximate: true,
            path: None,
        }
    }

    /// Applies `result` to `route` if `ticket` is still the latest run.
    ///
    /// Stops left out of the result (skipped, unresolved, or added while the
    /// run was computing) keep their relative order after the optimized ones.
    pub fn commit(&self, ticket: &RunTicket, plan: &Plan, route: &mut RouteMembership, result: RouteResult) -> Optimization {
        if !ticket.is_live() {
            return self.supersede(ticket);
        }
        if plan.reorders {
            let optimized: Vec<PlaceId> = result
                .ordered_place_ids
                .iter()
                .filter(|id| route.contains(id))
                .cloned()
                .collect();
            let placed: HashSet<&PlaceId> = optimized.iter().collect();
            let rest: Vec<PlaceId> = route
                .ids()
                .iter()
                .filter(|id| !placed.contains(id))
                .cloned()
                .collect();
            route.replace_all(optimized.into_iter().chain(rest));
        }
        self.finish(ticket, RunStatus::Applied);
        info!(
            generation = ticket.generation(),
            stops = result.ordered_place_ids.len(),
            km = result.total_distance,
            approximate = result.approximate,
            "optimization applied"
        );
        Optimization::Applied(result)
    }

    fn supersede(&self, ticket: &RunTicket) -> Optimization {
        debug!(generation = ticket.generation(), "optimization superseded, discarding result");
        Optimization::Superseded
    }

    fn finish(&self, ticket: &RunTicket, outcome: RunStatus) {
        let mut status = lock(&self.status);
        if status.0 == ticket.generation() {
            status.1 = outcome;
        }
    }
}

impl Default for OptimizationEngine {
    fn default() -> Self {
        Self::new(TravelEstimator::default())
    }
}

fn anchor_place(places: &PlaceStore, id: &PlaceId, options: &RouteOptions) -> Result<Coordinate, PlannerError> {
    let place = places.get(id).ok_or_else(|| PlannerError::NotFound(id.clone()))?;
    if place.geocode_failed && !options.allow_unresolved {
        return Err(PlannerError::GeocodeFailure {
            input: place.raw_input.clone(),
        });
    }
    Ok(place.coordinate())
}
