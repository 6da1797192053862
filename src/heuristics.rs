//! Constructive ordering heuristics over a distance matrix.
//!
//! All functions take matrix indices and return the visiting order of
//! `stops`; anchors are never part of the output. Ties go to the candidate
//! that comes first in `stops`.
//!
//! # Complexity
//!
//! Nearest-neighbor and farthest-first are O(n²). Cheapest insertion scans
//! every remaining stop against every tour edge per step, O(n³) overall:
//! fine for tens of stops, not for thousands.

use crate::haversine::DistanceMatrix;

/// Repeatedly visits the closest remaining stop.
pub fn nearest_neighbor(matrix: &DistanceMatrix, from: usize, stops: &[usize]) -> Vec<usize> {
    greedy(matrix, from, stops, |candidate, best| candidate < best)
}

/// Repeatedly visits the most distant remaining stop, front-loading long legs.
pub fn farthest_first(matrix: &DistanceMatrix, from: usize, stops: &[usize]) -> Vec<usize> {
    greedy(matrix, from, stops, |candidate, best| candidate > best)
}

fn greedy(matrix: &DistanceMatrix, from: usize, stops: &[usize], better: impl Fn(f64, f64) -> bool) -> Vec<usize> {
    let mut remaining = stops.to_vec();
    let mut order = Vec::with_capacity(stops.len());
    let mut current = from;

    while !remaining.is_empty() {
        let mut best_index = 0;
        let mut best_distance = matrix.get(current, remaining[0]);
        for (index, &stop) in remaining.iter().enumerate().skip(1) {
            let distance = matrix.get(current, stop);
            if better(distance, best_distance) {
                best_index = index;
                best_distance = distance;
            }
        }
        current = remaining.remove(best_index);
        order.push(current);
    }

    order
}

/// Builds a tour from `start` to `end` by cheapest insertion.
///
/// Each step inserts the stop `p` between tour neighbours `(a, b)` that
/// minimizes `d(a, p) + d(p, b) - d(a, b)`. When `start` and `end` coincide
/// the tour is a closed loop whose two directions cost the same; the
/// direction that leaves the anchor toward the nearer end is returned.
pub fn cheapest_insertion(matrix: &DistanceMatrix, start: usize, end: usize, stops: &[usize]) -> Vec<usize> {
    if stops.len() < 2 {
        return stops.to_vec();
    }

    let mut tour = vec![start, end];
    let mut remaining = stops.to_vec();

    while !remaining.is_empty() {
        let mut best: Option<(f64, usize, usize)> = None;
        for (candidate, &stop) in remaining.iter().enumerate() {
            for edge in 0..tour.len() - 1 {
                let (a, b) = (tour[edge], tour[edge + 1]);
                let cost = matrix.get(a, stop) + matrix.get(stop, b) - matrix.get(a, b);
                if best.is_none_or(|(best_cost, _, _)| cost < best_cost) {
                    best = Some((cost, candidate, edge));
                }
            }
        }
        let Some((_, candidate, edge)) = best else {
            break;
        };
        let stop = remaining.remove(candidate);
        tour.insert(edge + 1, stop);
    }

    let mut order = tour[1..tour.len() - 1].to_vec();
    let closed = start == end || matrix.get(start, end) == 0.0;
    if closed {
        let first = matrix.get(start, order[0]);
        let last = matrix.get(start, order[order.len() - 1]);
        if last < first {
            order.reverse();
        }
    }
    order
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Coordinate;

    /// Index 0 is the anchor, the rest are stops along the equator.
    fn line(anchor: f64, stops: &[f64]) -> DistanceMatrix {
        let mut locations = vec![Coordinate::new(0.0, anchor)];
        locations.extend(stops.iter().map(|lon| Coordinate::new(0.0, *lon)));
        DistanceMatrix::great_circle(&locations)
    }

    #[test]
    fn nearest_neighbor_walks_outward() {
        let matrix = line(0.0, &[5.0, 1.0, 3.0]);
        assert_eq!(nearest_neighbor(&matrix, 0, &[1, 2, 3]), vec![2, 3, 1]);
    }

    #[test]
    fn nearest_neighbor_tie_goes_to_first_candidate() {
        let matrix = line(0.0, &[1.0, -1.0]);
        assert_eq!(nearest_neighbor(&matrix, 0, &[1, 2]), vec![1, 2]);
        assert_eq!(nearest_neighbor(&matrix, 0, &[2, 1]), vec![2, 1]);
    }

    #[test]
    fn farthest_first_front_loads_long_legs() {
        let matrix = line(0.0, &[1.0, 3.0, 5.0]);
        // From the anchor the farthest is 5; from 5 the farthest left is 1.
        assert_eq!(farthest_first(&matrix, 0, &[1, 2, 3]), vec![3, 1, 2]);
    }

    #[test]
    fn cheapest_insertion_trivial_inputs_are_unchanged() {
        let matrix = line(0.0, &[1.0]);
        assert!(cheapest_insertion(&matrix, 0, 0, &[]).is_empty());
        assert_eq!(cheapest_insertion(&matrix, 0, 0, &[1]), vec![1]);
    }

    #[test]
    fn cheapest_insertion_two_stops_nearer_first_on_closed_loop() {
        let matrix = line(0.0, &[5.0, 1.0]);
        assert_eq!(cheapest_insertion(&matrix, 0, 0, &[1, 2]), vec![2, 1]);
    }

    #[test]
    fn cheapest_insertion_open_path_heads_toward_end() {
        // start at 0, end at 10, stops at 7 and 2
        let locations = vec![
            Coordinate::new(0.0, 0.0),
            Coordinate::new(0.0, 10.0),
            Coordinate::new(0.0, 7.0),
            Coordinate::new(0.0, 2.0),
        ];
        let matrix = DistanceMatrix::great_circle(&locations);
        assert_eq!(cheapest_insertion(&matrix, 0, 1, &[2, 3]), vec![3, 2]);
    }

    #[test]
    fn cheapest_insertion_orders_points_on_a_line() {
        // Anchor at lon 0; stops A(0), B(1), C(10).
        let matrix = line(0.0, &[0.0, 1.0, 10.0]);
        assert_eq!(cheapest_insertion(&matrix, 0, 0, &[1, 2, 3]), vec![1, 2, 3]);
        assert_eq!(cheapest_insertion(&matrix, 0, 0, &[3, 2, 1]), vec![1, 2, 3]);
    }

    #[test]
    fn cheapest_insertion_is_a_permutation() {
        let matrix = line(0.0, &[3.0, -2.0, 8.0, 1.5, -7.0]);
        let mut order = cheapest_insertion(&matrix, 0, 0, &[1, 2, 3, 4, 5]);
        order.sort_unstable();
        assert_eq!(order, vec![1, 2, 3, 4, 5]);
    }
}
