//! Route membership: the ordered subset of place ids on the active route.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::error::PlannerError;
use crate::model::PlaceId;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RouteMembership {
    ids: Vec<PlaceId>,
}

impl RouteMembership {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends `id`; returns false when it is already on the route.
    pub fn add(&mut self, id: PlaceId) -> bool {
        if self.contains(&id) {
            return false;
        }
        self.ids.push(id);
        true
    }

    /// Returns false when `id` was not on the route.
    pub fn remove(&mut self, id: &PlaceId) -> bool {
        let before = self.ids.len();
        self.ids.retain(|existing| existing != id);
        self.ids.len() != before
    }

    /// Changes order only; fails unless `new_order` is a permutation of the route.
    pub fn reorder(&mut self, new_order: &[PlaceId]) -> Result<(), PlannerError> {
        check_permutation(&self.ids, new_order)?;
        self.ids = new_order.to_vec();
        Ok(())
    }

    /// Replaces membership and order at once. Duplicates keep their first position.
    pub fn replace_all(&mut self, new_ids: impl IntoIterator<Item = PlaceId>) {
        let mut seen = HashSet::new();
        self.ids = new_ids
            .into_iter()
            .filter(|id| seen.insert(id.clone()))
            .collect();
    }

    pub fn clear(&mut self) {
        self.ids.clear();
    }

    /// Drops ids for which `keep` is false.
    pub fn retain(&mut self, keep: impl FnMut(&PlaceId) -> bool) {
        self.ids.retain(keep);
    }

    pub fn contains(&self, id: &PlaceId) -> bool {
        self.ids.contains(id)
    }

    pub fn ids(&self) -> &[PlaceId] {
        &self.ids
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}

/// Fails with `InvalidOrder` unless `proposed` holds exactly the ids of `current`.
pub(crate) fn check_permutation(current: &[PlaceId], proposed: &[PlaceId]) -> Result<(), PlannerError> {
    if current.len() != proposed.len() {
        return Err(PlannerError::InvalidOrder(format!(
            "expected {} ids, got {}",
            current.len(),
            proposed.len()
        )));
    }
    let expected: HashSet<&PlaceId> = current.iter().collect();
    let mut seen = HashSet::with_capacity(proposed.len());
    for id in proposed {
        if !expected.contains(id) {
            return Err(PlannerError::InvalidOrder(format!("{id} is not part of the current order")));
        }
        if !seen.insert(id) {
            return Err(PlannerError::InvalidOrder(format!("{id} appears twice")));
        }
    }
    Ok(())
}
