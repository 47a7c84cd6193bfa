//! Driver assignment and delivery pricing.
//!
//! Everything under this module is synchronous and side-effect free apart
//! from logging. Candidate snapshots and road distances are fetched by the
//! caller beforehand.

pub mod fee;
pub mod geo;
pub mod planner;
pub mod selector;
pub mod sequencer;
pub mod types;

pub use fee::{FeeResult, FeeSchedule, MIN_FEE, RATE_PER_KM, calculate_fee};
pub use geo::{Coordinate, distance_km};
pub use planner::{
    DeliveryOffer, DispatchPlan, DispatchPlanner, DispatchRequest, RoadDistances, plan_dispatch,
};
pub use selector::{nearest_drivers, select_nearest, select_nearest_by};
pub use sequencer::sequence_pickups;
pub use types::{DeliveryRequest, DistanceLookupError, DriverCandidate, PickupPoint};
