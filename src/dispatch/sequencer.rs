//! Greedy pickup ordering for multi-restaurant deliveries.
//!
//! The stop closest to the drop-off is visited last, the stop closest to the
//! driver first, and everything in between is chained nearest-neighbor from
//! the first stop. Pickup counts are small (usually under five), so the
//! quadratic middle phase is cheap enough to run inside a request.

use super::geo::{Coordinate, distance_km};
use super::types::PickupPoint;

/// Order `pickups` for a driver at `driver` delivering to `dropoff`.
///
/// The result is always a permutation of the input. On equal distances the
/// earlier pickup in the input wins.
pub fn sequence_pickups(
    pickups: &[PickupPoint],
    driver: Coordinate,
    dropoff: Option<Coordinate>,
) -> Vec<PickupPoint> {
    if pickups.len() <= 1 {
        return pickups.to_vec();
    }

    // Indices into `pickups` still waiting for a slot, in input order.
    let mut remaining: Vec<usize> = (0..pickups.len()).collect();

    let last = take_nearest(&mut remaining, |i| distance_km(pickups[i].location, dropoff));
    let first = take_nearest(&mut remaining, |i| distance_km(driver, pickups[i].location));

    let mut ordered = Vec::with_capacity(pickups.len());
    ordered.push(pickups[first]);

    let mut current = first;
    while !remaining.is_empty() {
        let from = pickups[current].location;
        let next = take_nearest(&mut remaining, |i| distance_km(from, pickups[i].location));
        ordered.push(pickups[next]);
        current = next;
    }

    ordered.push(pickups[last]);
    ordered
}

/// Remove and return the index in `remaining` with the smallest distance.
/// Ties keep the first one encountered. `remaining` must not be empty.
fn take_nearest(remaining: &mut Vec<usize>, distance: impl Fn(usize) -> f64) -> usize {
    let mut best_slot = 0;
    let mut best_distance = distance(remaining[0]);

    for (slot, &index) in remaining.iter().enumerate().skip(1) {
        let d = distance(index);
        if d < best_distance {
            best_slot = slot;
            best_distance = d;
        }
    }

    remaining.remove(best_slot)
}
