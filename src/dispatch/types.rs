use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use super::geo::Coordinate;

/// One restaurant a driver has to visit before the drop-off.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PickupPoint {
    pub restaurant_id: Uuid,
    pub location: Option<Coordinate>,
}

impl PickupPoint {
    pub fn new(restaurant_id: Uuid, location: Coordinate) -> Self {
        Self {
            restaurant_id,
            location: Some(location),
        }
    }
}

/// Snapshot of a driver as reported by the driver registry.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DriverCandidate {
    pub driver_id: Uuid,
    pub location: Option<Coordinate>,
    pub available: bool,
}

/// Everything needed to price and sequence one delivery.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeliveryRequest {
    pub pickups: Vec<PickupPoint>,
    pub dropoff: Option<Coordinate>,
    #[serde(default)]
    pub driver_location: Option<Coordinate>,
}

/// Why a road distance for one driver is unknown.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DistanceLookupError {
    #[error("Driver has no known location")]
    MissingLocation,

    #[error("No route for this driver: {0}")]
    NoRoute(String),
}
