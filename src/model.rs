//! Data model shared by the place store, the route and the optimizer.

use std::collections::BTreeSet;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::polyline::Polyline;

/// Opaque, immutable place identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PlaceId(String);

impl PlaceId {
    /// Generates a fresh random identifier.
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PlaceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A WGS84 latitude/longitude pair in degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinate {
    pub lat: f64,
    pub lon: f64,
}

impl Coordinate {
    pub const fn new(lat: f64, lon: f64) -> Self {
        Self { lat, lon }
    }

    /// True when both components are finite and inside WGS84 bounds.
    pub fn is_valid(&self) -> bool {
        self.lat.is_finite()
            && self.lon.is_finite()
            && (-90.0..=90.0).contains(&self.lat)
            && (-180.0..=180.0).contains(&self.lon)
    }

    pub fn as_tuple(&self) -> (f64, f64) {
        (self.lat, self.lon)
    }
}

impl From<(f64, f64)> for Coordinate {
    fn from((lat, lon): (f64, f64)) -> Self {
        Self { lat, lon }
    }
}

/// One entry of a place's visit history. Append-only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VisitLog {
    pub date: DateTime<Utc>,
    pub note: String,
}

/// A single stop with identity, address, coordinates and visit metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Place {
    pub id: PlaceId,
    pub display_address: String,
    pub raw_input: String,
    pub lat: f64,
    pub lon: f64,
    #[serde(default)]
    pub visited: bool,
    #[serde(default)]
    pub last_visit_timestamp: Option<DateTime<Utc>>,
    #[serde(default)]
    pub visit_log: Vec<VisitLog>,
    #[serde(default)]
    pub photo_refs: Vec<String>,
    #[serde(default)]
    pub geocode_failed: bool,
}

impl Place {
    /// A place with known coordinates.
    pub fn resolved(display_address: impl Into<String>, raw_input: impl Into<String>, at: Coordinate) -> Self {
        Self {
            id: PlaceId::generate(),
            display_address: display_address.into(),
            raw_input: raw_input.into(),
            lat: at.lat,
            lon: at.lon,
            visited: false,
            last_visit_timestamp: None,
            visit_log: Vec::new(),
            photo_refs: Vec::new(),
            geocode_failed: false,
        }
    }

    /// A place whose address could not be geocoded. Coordinates are zeroed.
    pub fn unresolved(display_address: impl Into<String>, raw_input: impl Into<String>) -> Self {
        Self {
            geocode_failed: true,
            ..Self::resolved(display_address, raw_input, Coordinate::new(0.0, 0.0))
        }
    }

    pub fn coordinate(&self) -> Coordinate {
        Coordinate::new(self.lat, self.lon)
    }

    /// Canonical merge key: trimmed, case-folded address plus exact coordinates.
    pub fn dedup_key(&self) -> (String, u64, u64) {
        (
            self.display_address.trim().to_lowercase(),
            self.lat.to_bits(),
            self.lon.to_bits(),
        )
    }

    /// Buckets the time since the last visit, used to colour map pins.
    pub fn recency(&self, now: DateTime<Utc>) -> VisitRecency {
        let Some(last) = self.last_visit_timestamp else {
            return VisitRecency::Never;
        };
        let days = (now - last).num_days();
        match days {
            d if d >= 28 => VisitRecency::Overdue,
            d if d >= 21 => VisitRecency::Soon,
            d if d >= 14 => VisitRecency::Due,
            d if d >= 0 && last <= now => VisitRecency::Fresh,
            _ => VisitRecency::Future,
        }
    }
}

/// How long ago a place was last visited.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum VisitRecency {
    Never,
    /// Less than 14 days.
    Fresh,
    /// 14 to 20 days.
    Due,
    /// 21 to 27 days.
    Soon,
    /// 28 days or more.
    Overdue,
    /// Logged in the future (clock skew or typo).
    Future,
}

/// Where a route starts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StartPoint {
    CurrentLocation,
    Place(PlaceId),
}

/// Where a route ends.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EndPoint {
    CurrentLocation,
    SameAsStart,
    Place(PlaceId),
}

/// Ordering strategy for an optimization run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Scenario {
    /// Nearest-neighbor from the start.
    #[default]
    Nearest,
    /// Farthest-first from the start.
    Farthest,
    /// Nearest-neighbor, closing back at the start place.
    RoundTrip,
    /// Keep the user's order; only constraints are applied.
    Custom,
    /// Cheapest insertion around the anchor (the default "Optimize" action).
    Optimize,
}

/// Session-scoped routing preferences.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RouteOptions {
    pub start_point: StartPoint,
    pub end_point: EndPoint,
    #[serde(default)]
    pub must_visit_first: Option<PlaceId>,
    #[serde(default)]
    pub skip_ids: BTreeSet<PlaceId>,
    #[serde(default)]
    pub scenario: Scenario,
    /// Lets geocode-failed places take part in optimization.
    #[serde(default)]
    pub allow_unresolved: bool,
}

impl Default for RouteOptions {
    fn default() -> Self {
        Self {
            start_point: StartPoint::CurrentLocation,
            end_point: EndPoint::SameAsStart,
            must_visit_first: None,
            skip_ids: BTreeSet::new(),
            scenario: Scenario::Nearest,
            allow_unresolved: false,
        }
    }
}

impl RouteOptions {
    /// Returns the must-visit-first id when it is also skipped.
    pub fn conflict(&self) -> Option<&PlaceId> {
        self.must_visit_first
            .as_ref()
            .filter(|id| self.skip_ids.contains(*id))
    }

    /// Applies the fields present in `patch`.
    pub fn merge(&mut self, patch: RouteOptionsPatch) {
        if let Some(start) = patch.start_point {
            self.start_point = start;
        }
        if let Some(end) = patch.end_point {
            self.end_point = end;
        }
        if let Some(first) = patch.must_visit_first {
            self.must_visit_first = first;
        }
        if let Some(skip) = patch.skip_ids {
            self.skip_ids = skip;
        }
        if let Some(scenario) = patch.scenario {
            self.scenario = scenario;
        }
        if let Some(allow) = patch.allow_unresolved {
            self.allow_unresolved = allow;
        }
    }
}

/// Partial update for [`RouteOptions`]; `None` leaves a field untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RouteOptionsPatch {
    pub start_point: Option<StartPoint>,
    pub end_point: Option<EndPoint>,
    /// `Some(None)` clears the must-visit-first stop.
    pub must_visit_first: Option<Option<PlaceId>>,
    pub skip_ids: Option<BTreeSet<PlaceId>>,
    pub scenario: Option<Scenario>,
    pub allow_unresolved: Option<bool>,
}

/// Outcome of an optimization run. Derived, never persisted.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RouteResult {
    pub ordered_place_ids: Vec<PlaceId>,
    /// Kilometres.
    pub total_distance: f64,
    /// Minutes.
    pub total_duration: f64,
    pub provider_summary: Option<String>,
    /// True when metrics come from great-circle math rather than the provider.
    pub approximate: bool,
    pub path: Option<Polyline>,
}
