//! Current-position tracking.
//!
//! Fixes arrive either from polling a single-shot [`PositionSource`] or from a
//! continuous watch that pushes through [`PositionTracker::observe`]. Whichever
//! arrived last wins, except that jitter (a small move shortly after the
//! previous fix) is ignored.

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use tracing::{debug, warn};

use crate::haversine::haversine_km;
use crate::model::Coordinate;
use crate::store::{load_json, lock, save_json};
use crate::traits::{DurableStore, PositionSource};

const LAST_POSITION_KEY: &str = "last_position";
const MIN_MOVE_KM: f64 = 0.1;
const MIN_INTERVAL: Duration = Duration::from_secs(2);

#[derive(Debug, Clone, Copy)]
struct Fix {
    at: Coordinate,
    received: Instant,
}

pub struct PositionTracker {
    last: Mutex<Option<Fix>>,
    store: Option<Arc<dyn DurableStore>>,
}

impl PositionTracker {
    pub fn new() -> Self {
        Self {
            last: Mutex::new(None),
            store: None,
        }
    }

    /// Restores the last persisted fix and persists future ones.
    pub fn with_store(store: Arc<dyn DurableStore>) -> Self {
        let restored = match load_json::<Coordinate>(store.as_ref(), LAST_POSITION_KEY) {
            Ok(found) => found,
            Err(err) => {
                warn!(error = %err, "last position unreadable");
                None
            }
        };
        Self {
            last: Mutex::new(restored.map(|at| Fix {
                at,
                received: Instant::now(),
            })),
            store: Some(store),
        }
    }

    /// Records a fix; returns whether it replaced the current position.
    pub fn observe(&self, at: Coordinate) -> bool {
        self.observe_at(at, Instant::now())
    }

    fn observe_at(&self, at: Coordinate, received: Instant) -> bool {
        if !at.is_valid() {
            return false;
        }
        {
            let mut last = lock(&self.last);
            if let Some(previous) = *last {
                let moved = haversine_km(previous.at, at);
                let elapsed = received.saturating_duration_since(previous.received);
                if moved < MIN_MOVE_KM && elapsed < MIN_INTERVAL {
                    return false;
                }
            }
            *last = Some(Fix { at, received });
        }
        debug!(lat = at.lat, lon = at.lon, "position updated");
        if let Some(store) = &self.store {
            if let Err(err) = save_json(store.as_ref(), LAST_POSITION_KEY, &at) {
                warn!(error = %err, "failed to persist position");
            }
        }
        true
    }

    /// Polls a single-shot source; `None` from the source keeps the old fix.
    pub fn refresh(&self, source: &dyn PositionSource) -> Option<Coordinate> {
        if let Some(at) = source.current_position() {
            self.observe(at);
        }
        self.latest()
    }

    pub fn latest(&self) -> Option<Coordinate> {
        lock(&self.last).map(|fix| fix.at)
    }
}

impl Default for PositionTracker {
    fn default() -> Self {
        Self::new()
    }
}
