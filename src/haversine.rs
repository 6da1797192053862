//! Great-circle distances (fallback when no road provider answers).
//!
//! Ignores roads, so it underestimates real travel, but it is always
//! available and cheap enough for the heuristics to call O(n³) times.

use rayon::prelude::*;

use crate::model::Coordinate;

/// Average driving speed assumption for time estimation.
pub const DEFAULT_SPEED_KMH: f64 = 40.0;

/// Earth radius in kilometers.
const EARTH_RADIUS_KM: f64 = 6371.0;

/// Haversine distance between two points in kilometers.
pub fn haversine_km(from: Coordinate, to: Coordinate) -> f64 {
    let lat1_rad = from.lat.to_radians();
    let lat2_rad = to.lat.to_radians();
    let delta_lat = (to.lat - from.lat).to_radians();
    let delta_lng = (to.lon - from.lon).to_radians();

    let a = (delta_lat / 2.0).sin().powi(2)
        + lat1_rad.cos() * lat2_rad.cos() * (delta_lng / 2.0).sin().powi(2);
    let c = 2.0 * a.sqrt().asin();

    EARTH_RADIUS_KM * c
}

/// Converts great-circle kilometers into estimated driving minutes.
#[derive(Debug, Clone)]
pub struct TravelEstimator {
    /// Assumed average driving speed in km/h.
    pub speed_kmh: f64,
}

impl Default for TravelEstimator {
    fn default() -> Self {
        Self {
            speed_kmh: DEFAULT_SPEED_KMH,
        }
    }
}

impl TravelEstimator {
    pub fn new(speed_kmh: f64) -> Self {
        Self { speed_kmh }
    }

    pub fn km_to_minutes(&self, km: f64) -> f64 {
        if self.speed_kmh <= 0.0 {
            return 0.0;
        }
        km / self.speed_kmh * 60.0
    }
}

/// Dense, row-major great-circle distance matrix in kilometers.
#[derive(Debug, Clone)]
pub struct DistanceMatrix {
    data: Vec<f64>,
    size: usize,
}

impl DistanceMatrix {
    /// Builds the matrix for `locations`, one row per rayon task.
    pub fn great_circle(locations: &[Coordinate]) -> Self {
        let size = locations.len();
        let data = locations
            .par_iter()
            .flat_map_iter(|from| locations.iter().map(move |to| haversine_km(*from, *to)))
            .collect();
        Self { data, size }
    }

    pub fn get(&self, from: usize, to: usize) -> f64 {
        self.data[from * self.size + to]
    }

    pub fn size(&self) -> usize {
        self.size
    }

    /// Sum of consecutive legs along `path`.
    pub fn path_length(&self, path: &[usize]) -> f64 {
        path.windows(2).map(|leg| self.get(leg[0], leg[1])).sum()
    }
}
