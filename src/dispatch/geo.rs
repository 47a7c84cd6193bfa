use serde::{Deserialize, Serialize};

pub const EARTH_RADIUS_KM: f64 = 6371.0;

/// Minutes added to every ETA for handover at the restaurant and the door.
const HANDLING_BUFFER_MINUTES: u32 = 5;

/// A WGS84 position in decimal degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinate {
    pub lat: f64,
    pub lng: f64,
}

impl Coordinate {
    pub const fn new(lat: f64, lng: f64) -> Self {
        Self { lat, lng }
    }

    /// Build a coordinate from nullable columns; either half missing yields `None`.
    pub fn from_parts(lat: Option<f64>, lng: Option<f64>) -> Option<Self> {
        Some(Self::new(lat?, lng?))
    }

    pub fn is_valid(&self) -> bool {
        (-90.0..=90.0).contains(&self.lat) && (-180.0..=180.0).contains(&self.lng)
    }
}

/// Great-circle distance between two coordinates using the Haversine formula.
/// Returns distance in kilometers.
pub fn haversine_km(a: Coordinate, b: Coordinate) -> f64 {
    let lat1_rad = a.lat.to_radians();
    let lat2_rad = b.lat.to_radians();
    let delta_lat = (b.lat - a.lat).to_radians();
    let delta_lng = (b.lng - a.lng).to_radians();

    // Rounding can push h just past 1 for antipodal points
    let h = ((delta_lat / 2.0).sin().powi(2)
        + lat1_rad.cos() * lat2_rad.cos() * (delta_lng / 2.0).sin().powi(2))
    .min(1.0);
    let c = 2.0 * h.sqrt().atan2((1.0 - h).sqrt());

    EARTH_RADIUS_KM * c
}

/// Distance in kilometers between two possibly-missing positions.
///
/// A missing position on either side resolves to `0.0` instead of an error.
/// This silently masks bad records (an order without coordinates is billed
/// the minimum fee, a driver without a fix looks adjacent to every pickup);
/// callers that need stricter behavior must validate before calling.
pub fn distance_km(a: impl Into<Option<Coordinate>>, b: impl Into<Option<Coordinate>>) -> f64 {
    match (a.into(), b.into()) {
        (Some(a), Some(b)) => haversine_km(a, b),
        _ => 0.0,
    }
}

/// Check if a point is within the allowed radius of a center
pub fn is_within_radius(point: Coordinate, center: Coordinate, max_radius_km: f64) -> bool {
    haversine_km(point, center) <= max_radius_km
}

/// Every pair of restaurants in a multi-restaurant order must sit within
/// `max_spread_km` of each other for one driver to collect them.
pub fn validate_restaurant_group(locations: &[Option<Coordinate>], max_spread_km: f64) -> bool {
    locations.iter().enumerate().all(|(i, a)| {
        locations[i + 1..]
            .iter()
            .all(|b| distance_km(*a, *b) <= max_spread_km)
    })
}

/// Travel time at `average_speed_kmh`, rounded up, plus a fixed handling buffer.
pub fn estimate_eta_minutes(distance_km: f64, average_speed_kmh: f64) -> u32 {
    if average_speed_kmh <= 0.0 || !distance_km.is_finite() {
        return HANDLING_BUFFER_MINUTES;
    }
    let travel = (distance_km.max(0.0) / average_speed_kmh * 60.0).ceil();
    travel as u32 + HANDLING_BUFFER_MINUTES
}
