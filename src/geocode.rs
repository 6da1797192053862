//! Memoized address resolution.
//!
//! Every outcome, including failure, is cached under the raw input text. A
//! failed address stays failed until the caller forgets the entry or the text
//! changes.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::StoreError;
use crate::model::Coordinate;
use crate::store::{load_json, save_json};
use crate::throttle::Throttle;
use crate::traits::{DurableStore, Geocoder};

const CACHE_PREFIX: &str = "geo:";

/// Result of resolving one address.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "kebab-case")]
pub enum GeocodeOutcome {
    Resolved { lat: f64, lon: f64 },
    Failed,
}

impl GeocodeOutcome {
    pub fn coordinate(&self) -> Option<Coordinate> {
        match self {
            GeocodeOutcome::Resolved { lat, lon } => Some(Coordinate::new(*lat, *lon)),
            GeocodeOutcome::Failed => None,
        }
    }
}

pub struct GeocodingCache {
    resolver: Arc<dyn Geocoder>,
    store: Arc<dyn DurableStore>,
    throttle: Throttle,
}

impl GeocodingCache {
    pub fn new(resolver: Arc<dyn Geocoder>, store: Arc<dyn DurableStore>, throttle: Throttle) -> Self {
        Self {
            resolver,
            store,
            throttle,
        }
    }

    /// Returns the cached outcome for `text`, or asks the resolver.
    ///
    /// Cache hits never touch the throttle. A store read failure is treated
    /// as a miss; a store write failure is logged and the fresh outcome is
    /// still returned.
    pub fn resolve(&self, text: &str) -> GeocodeOutcome {
        let key = cache_key(text);
        match load_json::<GeocodeOutcome>(self.store.as_ref(), &key) {
            Ok(Some(outcome)) => {
                debug!(address = text, "geocode cache hit");
                return outcome;
            }
            Ok(None) => {}
            Err(err) => warn!(address = text, error = %err, "geocode cache unreadable, resolving again"),
        }

        self.throttle.acquire();
        let outcome = match self.resolver.geocode_text(&normalize_query(text)) {
            Ok(at) if at.is_valid() => {
                info!(address = text, lat = at.lat, lon = at.lon, "geocoded");
                GeocodeOutcome::Resolved { lat: at.lat, lon: at.lon }
            }
            Ok(at) => {
                warn!(address = text, lat = at.lat, lon = at.lon, "geocoder returned out-of-range coordinates");
                GeocodeOutcome::Failed
            }
            Err(err) => {
                warn!(address = text, error = %err, "geocode failed");
                GeocodeOutcome::Failed
            }
        };

        if let Err(err) = save_json(self.store.as_ref(), &key, &outcome) {
            warn!(address = text, error = %err, "failed to cache geocode outcome");
        }
        outcome
    }

    /// Looks up `text` without calling the resolver.
    pub fn peek(&self, text: &str) -> Result<Option<GeocodeOutcome>, StoreError> {
        load_json(self.store.as_ref(), &cache_key(text))
    }

    /// Drops the cached outcome so the next `resolve` asks the resolver again.
    pub fn forget(&self, text: &str) -> Result<(), StoreError> {
        self.store.remove(&cache_key(text))
    }
}

fn cache_key(text: &str) -> String {
    format!("{CACHE_PREFIX}{text}")
}

/// Collapses runs of whitespace before the text goes to the resolver.
pub fn normalize_query(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use crate::error::GeocodeError;
    use crate::store::MemoryStore;

    #[derive(Default)]
    struct CountingGeocoder {
        calls: AtomicUsize,
        queries: Mutex<Vec<String>>,
    }

    impl Geocoder for CountingGeocoder {
        fn geocode_text(&self, address: &str) -> Result<Coordinate, GeocodeError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.queries.lock().unwrap().push(address.to_string());
            if address.contains("Nowhere") {
                Err(GeocodeError::NoResults)
            } else if address.contains("Bogus") {
                Ok(Coordinate::new(200.0, 0.0))
            } else {
                Ok(Coordinate::new(49.2, -123.0))
            }
        }
    }

    fn cache(geocoder: Arc<CountingGeocoder>) -> (GeocodingCache, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        let cache = GeocodingCache::new(geocoder, store.clone(), Throttle::per_second(0));
        (cache, store)
    }

    #[test]
    fn second_lookup_is_served_from_cache() {
        let geocoder = Arc::new(CountingGeocoder::default());
        let (cache, store) = cache(geocoder.clone());

        let first = cache.resolve("123 Main St, Burnaby");
        let second = cache.resolve("123 Main St, Burnaby");

        assert_eq!(first, GeocodeOutcome::Resolved { lat: 49.2, lon: -123.0 });
        assert_eq!(first, second);
        assert_eq!(geocoder.calls.load(Ordering::SeqCst), 1);
        assert!(store.get("geo:123 Main St, Burnaby").unwrap().is_some());
    }

    #[test]
    fn failures_are_cached_and_not_retried() {
        let geocoder = Arc::new(CountingGeocoder::default());
        let (cache, _) = cache(geocoder.clone());

        assert_eq!(cache.resolve("1 Nowhere Rd"), GeocodeOutcome::Failed);
        assert_eq!(cache.resolve("1 Nowhere Rd"), GeocodeOutcome::Failed);
        assert_eq!(geocoder.calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn out_of_range_answers_count_as_failures() {
        let geocoder = Arc::new(CountingGeocoder::default());
        let (cache, _) = cache(geocoder);
        assert_eq!(cache.resolve("Bogus Ave"), GeocodeOutcome::Failed);
    }

    #[test]
    fn forget_allows_a_fresh_attempt() {
        let geocoder = Arc::new(CountingGeocoder::default());
        let (cache, _) = cache(geocoder.clone());

        cache.resolve("1 Nowhere Rd");
        cache.forget("1 Nowhere Rd").unwrap();
        assert!(cache.peek("1 Nowhere Rd").unwrap().is_none());
        cache.resolve("1 Nowhere Rd");
        assert_eq!(geocoder.calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn resolver_sees_normalized_query_but_cache_keeps_raw_text() {
        let geocoder = Arc::new(CountingGeocoder::default());
        let (cache, store) = cache(geocoder.clone());

        cache.resolve("7712   15th Ave,\tBurnaby");
        assert_eq!(geocoder.queries.lock().unwrap()[0], "7712 15th Ave, Burnaby");
        assert!(store.get("geo:7712   15th Ave,\tBurnaby").unwrap().is_some());
    }
}
