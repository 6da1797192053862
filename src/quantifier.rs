//! Road-route quantification through an external routing provider.

use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, warn};

use crate::cancel::RunTicket;
use crate::error::ProviderError;
use crate::polyline::Polyline;
use crate::traits::{RouteRequest, RoutingProvider, TrafficModel};

/// Validated provider answer.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Quantification {
    /// Permutation of the request's waypoint indices; identity unless reordering was requested.
    pub ordered_waypoint_indices: Vec<usize>,
    pub decoded_path: Polyline,
    pub total_distance_meters: f64,
    /// Traffic-adjusted when a traffic model was applied.
    pub total_duration_seconds: f64,
    pub summary: Option<String>,
    /// The traffic model actually sent, after normalization.
    pub traffic_model: Option<TrafficModel>,
}

#[derive(Clone)]
pub struct RouteQuantifier {
    provider: Arc<dyn RoutingProvider>,
}

impl RouteQuantifier {
    pub fn new(provider: Arc<dyn RoutingProvider>) -> Self {
        Self { provider }
    }

    /// Drops options the provider cannot honour.
    pub fn normalize(&self, mut request: RouteRequest) -> RouteRequest {
        if request.options.traffic_model.is_some() && !self.provider.supports_traffic_model() {
            debug!(model = ?request.options.traffic_model, "provider has no traffic models, dropping");
            request.options.traffic_model = None;
        }
        if request.waypoints.is_empty() {
            request.options.optimize_waypoints = false;
        }
        request
    }

    /// Calls the provider and validates its answer. Identical input is safe to repeat.
    pub fn quantify(&self, request: RouteRequest) -> Result<Quantification, ProviderError> {
        let request = self.normalize(request);
        let route = self.provider.compute_route(&request)?;

        if !(route.distance_meters.is_finite() && route.distance_meters >= 0.0)
            || !(route.duration_seconds.is_finite() && route.duration_seconds >= 0.0)
        {
            return Err(ProviderError::Malformed(format!(
                "distance {} m, duration {} s",
                route.distance_meters, route.duration_seconds
            )));
        }

        let count = request.waypoints.len();
        let identity: Vec<usize> = (0..count).collect();
        let ordered_waypoint_indices = match route.waypoint_order {
            Some(order) if request.options.optimize_waypoints => {
                if !is_permutation(&order, count) {
                    return Err(ProviderError::Malformed(format!(
                        "waypoint order {:?} is not a permutation of {} indices",
                        order, count
                    )));
                }
                order
            }
            Some(order) => {
                if order != identity {
                    warn!(?order, "provider reordered waypoints without being asked, ignoring");
                }
                identity
            }
            None => identity,
        };

        Ok(Quantification {
            ordered_waypoint_indices,
            decoded_path: route.geometry,
            total_distance_meters: route.distance_meters,
            total_duration_seconds: route.duration_seconds,
            summary: route.summary,
            traffic_model: request.options.traffic_model,
        })
    }

    /// Like [`quantify`](Self::quantify), but returns `None` when `ticket`
    /// was superseded while the provider was working.
    pub fn quantify_if_live(
        &self,
        request: RouteRequest,
        ticket: &RunTicket,
    ) -> Result<Option<Quantification>, ProviderError> {
        if !ticket.is_live() {
            return Ok(None);
        }
        let result = self.quantify(request);
        if !ticket.is_live() {
            debug!(generation = ticket.generation(), "quantification superseded, discarding");
            return Ok(None);
        }
        result.map(Some)
    }
}

fn is_permutation(order: &[usize], count: usize) -> bool {
    if order.len() != count {
        return false;
    }
    let mut seen = vec![false; count];
    order.iter().all(|&index| index < count && !std::mem::replace(&mut seen[index], true))
}
