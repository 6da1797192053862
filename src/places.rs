//! Place store: the canonical table of known places.
//!
//! Raw text is ingested one location per line. A line whose first two
//! comma-separated tokens are numbers is taken as `lat,lon[,label...]`;
//! anything else is an address that goes through the geocoding cache.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::PlannerError;
use crate::geocode::{GeocodeOutcome, GeocodingCache};
use crate::model::{Coordinate, Place, PlaceId, VisitLog};

/// How ingested places combine with the existing set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum IngestMode {
    /// Overwrite the whole set.
    Replace,
    /// Append, dropping duplicates of existing places.
    Merge,
}

/// One cleaned input line.
#[derive(Debug, Clone, PartialEq)]
pub enum ParsedLine {
    Coordinates {
        at: Coordinate,
        label: Option<String>,
        raw: String,
    },
    Address(String),
}

/// Splits raw text into cleaned lines: trimmed, unquoted, non-empty.
pub fn parse_lines(raw_text: &str) -> Vec<ParsedLine> {
    raw_text
        .lines()
        .map(clean_line)
        .filter(|line| !line.is_empty())
        .map(parse_line)
        .collect()
}

fn clean_line(line: &str) -> String {
    let trimmed = line.trim();
    let unquoted = trimmed
        .strip_prefix('"')
        .unwrap_or(trimmed);
    let unquoted = unquoted.strip_suffix('"').unwrap_or(unquoted);
    unquoted.trim().to_string()
}

fn parse_line(line: String) -> ParsedLine {
    let mut tokens = line.splitn(3, ',');
    let lat = tokens.next().and_then(|t| t.trim().parse::<f64>().ok());
    let lon = tokens.next().and_then(|t| t.trim().parse::<f64>().ok());
    match (lat, lon) {
        (Some(lat), Some(lon)) if Coordinate::new(lat, lon).is_valid() => {
            let label = tokens
                .next()
                .map(|rest| rest.trim().to_string())
                .filter(|rest| !rest.is_empty());
            ParsedLine::Coordinates {
                at: Coordinate::new(lat, lon),
                label,
                raw: line,
            }
        }
        _ => ParsedLine::Address(line),
    }
}

/// Secondary locality token: the second comma-delimited segment, folded.
pub fn locality_key(address: &str) -> String {
    address
        .split(',')
        .nth(1)
        .map(|segment| segment.trim().to_lowercase())
        .unwrap_or_default()
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PlaceStore {
    places: Vec<Place>,
}

impl PlaceStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_places(places: Vec<Place>) -> Self {
        Self { places }
    }

    /// Parses and resolves `raw_text` into candidate places without touching the store.
    ///
    /// Geocoding can block on the network and the throttle, so callers that
    /// share the store run this before taking their lock and then [`commit`].
    ///
    /// [`commit`]: PlaceStore::commit
    pub fn prepare(raw_text: &str, geocoder: &GeocodingCache) -> Vec<Place> {
        parse_lines(raw_text)
            .into_iter()
            .map(|line| match line {
                ParsedLine::Coordinates { at, label, raw } => {
                    let display = label.unwrap_or_else(|| raw.clone());
                    Place::resolved(display, raw, at)
                }
                ParsedLine::Address(text) => match geocoder.resolve(&text) {
                    GeocodeOutcome::Resolved { lat, lon } => {
                        Place::resolved(text.clone(), text, Coordinate::new(lat, lon))
                    }
                    GeocodeOutcome::Failed => Place::unresolved(text.clone(), text),
                },
            })
            .collect()
    }

    /// Adds prepared candidates and returns the ones that were kept.
    ///
    /// Duplicates (same trimmed, case-folded address and exact coordinates)
    /// are dropped silently, both against the existing set in merge mode and
    /// within the batch itself.
    pub fn commit(&mut self, candidates: Vec<Place>, mode: IngestMode) -> Vec<Place> {
        let mut seen: HashSet<_> = match mode {
            IngestMode::Replace => HashSet::new(),
            IngestMode::Merge => self.places.iter().map(Place::dedup_key).collect(),
        };
        let total = candidates.len();
        let accepted: Vec<Place> = candidates
            .into_iter()
            .filter(|place| seen.insert(place.dedup_key()))
            .collect();
        debug!(total, accepted = accepted.len(), ?mode, "ingest commit");

        match mode {
            IngestMode::Replace => self.places = accepted.clone(),
            IngestMode::Merge => self.places.extend(accepted.iter().cloned()),
        }
        self.sort_by_locality();
        info!(places = self.places.len(), added = accepted.len(), "places ingested");
        accepted
    }

    /// Parses, resolves and commits in one step.
    pub fn ingest(&mut self, raw_text: &str, mode: IngestMode, geocoder: &GeocodingCache) -> Vec<Place> {
        let candidates = Self::prepare(raw_text, geocoder);
        self.commit(candidates, mode)
    }

    /// Groups same-region stops; stable, so ties keep insertion order.
    fn sort_by_locality(&mut self) {
        self.places
            .sort_by_cached_key(|place| locality_key(&place.display_address));
    }

    pub fn get(&self, id: &PlaceId) -> Option<&Place> {
        self.places.iter().find(|place| &place.id == id)
    }

    pub fn contains(&self, id: &PlaceId) -> bool {
        self.get(id).is_some()
    }

    pub fn places(&self) -> &[Place] {
        &self.places
    }

    pub fn ids(&self) -> impl Iterator<Item = &PlaceId> {
        self.places.iter().map(|place| &place.id)
    }

    pub fn len(&self) -> usize {
        self.places.len()
    }

    pub fn is_empty(&self) -> bool {
        self.places.is_empty()
    }

    /// Deletes a place. Route membership cleanup is the caller's job.
    pub fn remove(&mut self, id: &PlaceId) -> Result<Place, PlannerError> {
        let index = self.index_of(id)?;
        Ok(self.places.remove(index))
    }

    /// Full replace by id.
    pub fn update(&mut self, place: Place) -> Result<(), PlannerError> {
        let index = self.index_of(&place.id)?;
        self.places[index] = place;
        Ok(())
    }

    pub fn toggle_visited(&mut self, id: &PlaceId) -> Result<bool, PlannerError> {
        let place = self.get_mut(id)?;
        place.visited = !place.visited;
        Ok(place.visited)
    }

    pub fn add_photo(&mut self, id: &PlaceId, photo_ref: impl Into<String>) -> Result<(), PlannerError> {
        self.get_mut(id)?.photo_refs.push(photo_ref.into());
        Ok(())
    }

    /// Appends to the visit history and marks the place visited.
    pub fn log_visit(&mut self, id: &PlaceId, date: DateTime<Utc>, note: impl Into<String>) -> Result<(), PlannerError> {
        let place = self.get_mut(id)?;
        place.visit_log.push(VisitLog {
            date,
            note: note.into(),
        });
        place.visited = true;
        if place.last_visit_timestamp.is_none_or(|last| date > last) {
            place.last_visit_timestamp = Some(date);
        }
        Ok(())
    }

    /// Resets every visited flag; history is kept.
    pub fn clear_visited(&mut self) {
        for place in &mut self.places {
            place.visited = false;
        }
    }

    /// Manual reordering; `ids` must be a permutation of the current ids.
    pub fn reorder(&mut self, ids: &[PlaceId]) -> Result<(), PlannerError> {
        let current: Vec<PlaceId> = self.ids().cloned().collect();
        crate::membership::check_permutation(&current, ids)?;
        let mut remaining = std::mem::take(&mut self.places);
        for id in ids {
            if let Some(index) = remaining.iter().position(|place| &place.id == id) {
                self.places.push(remaining.swap_remove(index));
            }
        }
        Ok(())
    }

    fn index_of(&self, id: &PlaceId) -> Result<usize, PlannerError> {
        self.places
            .iter()
            .position(|place| &place.id == id)
            .ok_or_else(|| PlannerError::NotFound(id.clone()))
    }

    fn get_mut(&mut self, id: &PlaceId) -> Result<&mut Place, PlannerError> {
        let index = self.index_of(id)?;
        Ok(&mut self.places[index])
    }
}
