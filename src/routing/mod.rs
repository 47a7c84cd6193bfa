//! Road-network distances from an external Distance Matrix API.

mod client;
mod error;
mod response;

pub use client::RoadDistanceClient;
pub use error::RoutingError;
