use std::convert::Infallible;
use std::fmt::Display;

use uuid::Uuid;

use super::geo::{Coordinate, distance_km};
use super::types::DriverCandidate;

/// Nearest available driver to `target` by straight-line distance.
///
/// `None` means nobody is available, which callers treat as "retry later"
/// rather than as a failure.
pub fn select_nearest(
    target: Coordinate,
    candidates: &[DriverCandidate],
) -> Option<&DriverCandidate> {
    select_nearest_by(candidates, |candidate| {
        Ok::<_, Infallible>(distance_km(target, candidate.location))
    })
}

/// Nearest available driver under an arbitrary distance function.
///
/// A candidate whose distance cannot be resolved (an `Err`, or a non-finite
/// value) is skipped and logged; the rest of the selection carries on. Ties go
/// to the candidate listed first.
pub fn select_nearest_by<F, E>(
    candidates: &[DriverCandidate],
    mut distance: F,
) -> Option<&DriverCandidate>
where
    F: FnMut(&DriverCandidate) -> Result<f64, E>,
    E: Display,
{
    let mut best: Option<(&DriverCandidate, f64)> = None;

    for candidate in candidates.iter().filter(|c| c.available) {
        let d = match distance(candidate) {
            Ok(d) if d.is_finite() => d,
            Ok(d) => {
                tracing::warn!(
                    driver_id = %candidate.driver_id,
                    distance = d,
                    "Skipping driver with unusable distance"
                );
                continue;
            }
            Err(e) => {
                tracing::warn!(
                    driver_id = %candidate.driver_id,
                    error = %e,
                    "Skipping driver, distance lookup failed"
                );
                continue;
            }
        };

        match best {
            Some((_, best_d)) if d >= best_d => {}
            _ => best = Some((candidate, d)),
        }
    }

    best.map(|(candidate, _)| candidate)
}

/// Up to `limit` available drivers closest to `target`, nearest first,
/// leaving out anyone in `excluded`.
pub fn nearest_drivers(
    target: Coordinate,
    candidates: &[DriverCandidate],
    excluded: &[Uuid],
    limit: usize,
) -> Vec<(DriverCandidate, f64)> {
    let mut ranked: Vec<(DriverCandidate, f64)> = candidates
        .iter()
        .filter(|c| c.available && !excluded.contains(&c.driver_id))
        .map(|c| (*c, distance_km(target, c.location)))
        .collect();

    // Stable sort keeps list order among equal distances.
    ranked.sort_by(|a, b| a.1.total_cmp(&b.1));
    ranked.truncate(limit);
    ranked
}
