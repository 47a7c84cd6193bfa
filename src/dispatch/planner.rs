use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::fee::{FeeResult, FeeSchedule, route_distance_km};
use super::geo::{Coordinate, distance_km, estimate_eta_minutes};
use super::selector::{select_nearest, select_nearest_by};
use super::types::{DistanceLookupError, DriverCandidate, PickupPoint};

/// Road distances in km from each driver to the selection target, as fetched
/// by the routing client. A driver missing from the table has no road distance.
pub type RoadDistances = HashMap<Uuid, Result<f64, DistanceLookupError>>;

/// Average driving speed used for offer ETAs when none is configured.
pub const DEFAULT_AVERAGE_SPEED_KMH: f64 = 30.0;

/// Input for planning the dispatch of one order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DispatchRequest {
    pub order_id: Uuid,
    pub pickups: Vec<PickupPoint>,
    pub dropoff: Option<Coordinate>,
    /// Driver position to sequence pickups from before any driver is chosen.
    #[serde(default)]
    pub driver_hint: Option<Coordinate>,
    /// Drivers that already rejected or let an offer for this order expire.
    #[serde(default)]
    pub excluded_drivers: Vec<Uuid>,
}

/// Figures shown to the driver with an offer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeliveryOffer {
    pub driver_id: Uuid,
    pub distance_to_first_pickup_km: f64,
    pub route_distance_km: f64,
    pub total_distance_km: f64,
    pub eta_minutes: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DispatchPlan {
    pub order_id: Uuid,
    pub fee: FeeResult,
    pub driver: Option<DriverCandidate>,
    pub offer: Option<DeliveryOffer>,
}

/// Plans one dispatch: price the delivery, pick a driver, and work out the
/// offer figures. Nothing is persisted or published here.
#[derive(Debug, Clone, Copy)]
pub struct DispatchPlanner {
    pub schedule: FeeSchedule,
    pub average_speed_kmh: f64,
}

impl Default for DispatchPlanner {
    fn default() -> Self {
        Self {
            schedule: FeeSchedule::STANDARD,
            average_speed_kmh: DEFAULT_AVERAGE_SPEED_KMH,
        }
    }
}

impl DispatchPlanner {
    pub fn new(schedule: FeeSchedule, average_speed_kmh: f64) -> Self {
        Self {
            schedule,
            average_speed_kmh,
        }
    }

    pub fn plan(
        &self,
        request: &DispatchRequest,
        candidates: &[DriverCandidate],
        road_distances: Option<&RoadDistances>,
    ) -> DispatchPlan {
        let mut fee = self
            .schedule
            .calculate(&request.pickups, request.dropoff, request.driver_hint);

        let target = fee
            .pickup_order
            .first()
            .and_then(|p| p.location)
            .or(request.dropoff);

        let eligible: Vec<DriverCandidate> = candidates
            .iter()
            .filter(|c| !request.excluded_drivers.contains(&c.driver_id))
            .copied()
            .collect();

        let driver = match (target, road_distances) {
            (Some(_), Some(table)) => {
                select_nearest_by(&eligible, |c| match table.get(&c.driver_id) {
                    Some(Ok(km)) => Ok(*km),
                    Some(Err(e)) => Err(e.clone()),
                    None => Err(DistanceLookupError::NoRoute("not in table".to_string())),
                })
                .copied()
            }
            (Some(target), None) => select_nearest(target, &eligible).copied(),
            // Nothing to measure from; every distance degrades to zero.
            (None, _) => eligible.iter().find(|c| c.available).copied(),
        };

        let Some(driver) = driver else {
            tracing::info!(
                order_id = %request.order_id,
                excluded = request.excluded_drivers.len(),
                "No available drivers"
            );
            return DispatchPlan {
                order_id: request.order_id,
                fee,
                driver: None,
                offer: None,
            };
        };

        if request.driver_hint.is_none()
            && request.pickups.len() > 1
            && driver.location.is_some()
        {
            fee = self
                .schedule
                .calculate(&request.pickups, request.dropoff, driver.location);
        }

        let offer = self.offer_for(&driver, &fee, request.dropoff);
        tracing::debug!(
            order_id = %request.order_id,
            driver_id = %driver.driver_id,
            fee = fee.fee,
            total_distance_km = offer.total_distance_km,
            "Dispatch planned"
        );

        DispatchPlan {
            order_id: request.order_id,
            fee,
            driver: Some(driver),
            offer: Some(offer),
        }
    }

    fn offer_for(
        &self,
        driver: &DriverCandidate,
        fee: &FeeResult,
        dropoff: Option<Coordinate>,
    ) -> DeliveryOffer {
        let first_pickup = fee.pickup_order.first().and_then(|p| p.location);
        let to_first = distance_km(driver.location, first_pickup);
        let route = route_distance_km(&fee.pickup_order, dropoff);
        let total = to_first + route;

        DeliveryOffer {
            driver_id: driver.driver_id,
            distance_to_first_pickup_km: round_km(to_first),
            route_distance_km: round_km(route),
            total_distance_km: round_km(total),
            eta_minutes: estimate_eta_minutes(total, self.average_speed_kmh),
        }
    }
}

/// Plan with the standard fee schedule and default speed.
pub fn plan_dispatch(
    request: &DispatchRequest,
    candidates: &[DriverCandidate],
    road_distances: Option<&RoadDistances>,
) -> DispatchPlan {
    DispatchPlanner::default().plan(request, candidates, road_distances)
}

fn round_km(km: f64) -> f64 {
    (km * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatch::geo::EARTH_RADIUS_KM;

    const DROPOFF: Coordinate = Coordinate::new(-17.8292, 31.0522);

    fn north_of(origin: Coordinate, km: f64) -> Coordinate {
        Coordinate::new(origin.lat + (km / EARTH_RADIUS_KM).to_degrees(), origin.lng)
    }

    fn pickup(km: f64) -> PickupPoint {
        PickupPoint::new(Uuid::new_v4(), north_of(DROPOFF, km))
    }

    fn driver_at(km: f64) -> DriverCandidate {
        DriverCandidate {
            driver_id: Uuid::new_v4(),
            location: Some(north_of(DROPOFF, km)),
            available: true,
        }
    }

    fn request(pickups: Vec<PickupPoint>) -> DispatchRequest {
        DispatchRequest {
            order_id: Uuid::new_v4(),
            pickups,
            dropoff: Some(DROPOFF),
            ..Default::default()
        }
    }

    #[test]
    fn test_no_drivers_still_prices_order() {
        let req = request(vec![pickup(10.0)]);
        let plan = plan_dispatch(&req, &[], None);

        assert!(plan.driver.is_none());
        assert!(plan.offer.is_none());
        assert_eq!(plan.fee.fee, 3.50);
    }

    #[test]
    fn test_selects_driver_nearest_first_pickup() {
        let req = request(vec![pickup(10.0)]);
        let close = driver_at(11.25);
        let far = driver_at(20.0);

        let plan = plan_dispatch(&req, &[far, close], None);
        assert_eq!(plan.driver.map(|d| d.driver_id), Some(close.driver_id));

        let offer = plan.offer.expect("offer for selected driver");
        assert_eq!(offer.distance_to_first_pickup_km, 1.25);
        assert_eq!(offer.route_distance_km, 10.0);
        assert_eq!(offer.total_distance_km, 11.25);
        // 11.25 km at 30 km/h is 22.5 minutes, rounded up, plus buffer
        assert_eq!(offer.eta_minutes, 28);
    }

    #[test]
    fn test_excluded_driver_is_passed_over() {
        let close = driver_at(11.0);
        let far = driver_at(20.0);
        let mut req = request(vec![pickup(10.0)]);
        req.excluded_drivers.push(close.driver_id);

        let plan = plan_dispatch(&req, &[close, far], None);
        assert_eq!(plan.driver.map(|d| d.driver_id), Some(far.driver_id));

        req.excluded_drivers.push(far.driver_id);
        let plan = plan_dispatch(&req, &[close, far], None);
        assert!(plan.driver.is_none());
    }

    #[test]
    fn test_road_distances_override_straight_line() {
        let req = request(vec![pickup(10.0)]);
        let close = driver_at(11.0);
        let across_river = driver_at(9.0);
        let far = driver_at(20.0);

        let mut table = RoadDistances::new();
        table.insert(
            across_river.driver_id,
            Err(DistanceLookupError::NoRoute("ZERO_RESULTS".into())),
        );
        table.insert(close.driver_id, Ok(14.0));
        table.insert(far.driver_id, Ok(12.0));

        let plan = plan_dispatch(&req, &[across_river, close, far], Some(&table));
        assert_eq!(plan.driver.map(|d| d.driver_id), Some(far.driver_id));
    }

    #[test]
    fn test_selected_driver_sequences_pickups() {
        let a = pickup(2.0);
        let b = pickup(6.0);
        let c = pickup(4.0);
        let req = request(vec![a, b, c]);
        let driver = driver_at(7.0);

        let plan = plan_dispatch(&req, &[driver], None);
        assert_eq!(plan.fee.pickup_order, vec![b, c, a]);
        assert_eq!(plan.fee.fee, 2.10);

        let offer = plan.offer.expect("offer");
        assert_eq!(offer.distance_to_first_pickup_km, 1.0);
        assert_eq!(offer.route_distance_km, 6.0);
    }

    #[test]
    fn test_driver_hint_sequences_before_selection() {
        let a = pickup(2.0);
        let b = pickup(6.0);
        let mut req = request(vec![a, b]);
        req.driver_hint = Some(north_of(DROPOFF, 8.0));

        // Target is `b`, the first stop once sequenced from the hint.
        let near_b = driver_at(6.5);
        let near_a = driver_at(1.0);
        let plan = plan_dispatch(&req, &[near_a, near_b], None);

        assert_eq!(plan.fee.pickup_order, vec![b, a]);
        assert_eq!(plan.driver.map(|d| d.driver_id), Some(near_b.driver_id));
    }

    #[test]
    fn test_custom_planner_schedule() {
        let planner = DispatchPlanner::new(
            FeeSchedule {
                rate_per_km: 1.0,
                min_fee: 5.0,
            },
            60.0,
        );
        let req = request(vec![pickup(3.0)]);
        let plan = planner.plan(&req, &[driver_at(3.5)], None);

        assert_eq!(plan.fee.fee, 5.0);
        // 3.5 km at 60 km/h rounds up to 4 minutes
        assert_eq!(plan.offer.map(|o| o.eta_minutes), Some(9));
    }
}
