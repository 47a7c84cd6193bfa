use serde::{Deserialize, Serialize};

use super::geo::{Coordinate, distance_km};
use super::sequencer::sequence_pickups;
use super::types::{DeliveryRequest, PickupPoint};

/// Per-kilometer delivery rate in currency units.
pub const RATE_PER_KM: f64 = 0.35;

/// Minimum chargeable delivery fee whenever there is at least one pickup.
pub const MIN_FEE: f64 = 1.50;

/// Outcome of pricing one delivery.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeeResult {
    pub fee: f64,
    pub distance_km: f64,
    pub pickup_order: Vec<PickupPoint>,
}

impl FeeResult {
    pub fn empty() -> Self {
        Self {
            fee: 0.0,
            distance_km: 0.0,
            pickup_order: Vec::new(),
        }
    }
}

/// Pricing parameters for distance-based delivery fees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FeeSchedule {
    pub rate_per_km: f64,
    pub min_fee: f64,
}

impl Default for FeeSchedule {
    fn default() -> Self {
        Self::STANDARD
    }
}

impl FeeSchedule {
    pub const STANDARD: FeeSchedule = FeeSchedule {
        rate_per_km: RATE_PER_KM,
        min_fee: MIN_FEE,
    };

    /// `max(min_fee, distance * rate)` rounded to cents.
    pub fn fee_for_distance(&self, distance_km: f64) -> f64 {
        round_cents((distance_km * self.rate_per_km).max(self.min_fee))
    }

    /// Price a delivery through `pickups` to `dropoff`.
    ///
    /// With a driver location the pickups are first reordered by
    /// [`sequence_pickups`]; otherwise the given order is billed as-is. The
    /// route distance is the sum of consecutive pickup legs plus the last
    /// pickup to the drop-off.
    pub fn calculate(
        &self,
        pickups: &[PickupPoint],
        dropoff: Option<Coordinate>,
        driver_location: Option<Coordinate>,
    ) -> FeeResult {
        if pickups.is_empty() {
            return FeeResult::empty();
        }

        let pickup_order = match driver_location {
            Some(driver) => sequence_pickups(pickups, driver, dropoff),
            None => pickups.to_vec(),
        };

        let distance_km = route_distance_km(&pickup_order, dropoff);

        FeeResult {
            fee: self.fee_for_distance(distance_km),
            distance_km,
            pickup_order,
        }
    }
}

impl DeliveryRequest {
    pub fn quote(&self, schedule: &FeeSchedule) -> FeeResult {
        schedule.calculate(&self.pickups, self.dropoff, self.driver_location)
    }
}

/// Price a delivery with the standard schedule.
pub fn calculate_fee(
    pickups: &[PickupPoint],
    dropoff: Option<Coordinate>,
    driver_location: Option<Coordinate>,
) -> FeeResult {
    FeeSchedule::STANDARD.calculate(pickups, dropoff, driver_location)
}

/// Distance covered visiting `pickups` in order and then the drop-off.
pub fn route_distance_km(pickups: &[PickupPoint], dropoff: Option<Coordinate>) -> f64 {
    let Some(last) = pickups.last() else {
        return 0.0;
    };

    let legs: f64 = pickups
        .windows(2)
        .map(|pair| distance_km(pair[0].location, pair[1].location))
        .sum();

    legs + distance_km(last.location, dropoff)
}

fn round_cents(amount: f64) -> f64 {
    (amount * 100.0).round() / 100.0
}
