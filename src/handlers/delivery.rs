use axum::{Json, extract::State};

use crate::AppState;
use crate::dispatch::geo::validate_restaurant_group;
use crate::dispatch::{Coordinate, DeliveryRequest, FeeResult};
use crate::error::{AppError, AppResult};

/// Price a delivery without touching any order (cart and checkout screens)
pub async fn quote(
    State(state): State<AppState>,
    Json(payload): Json<DeliveryRequest>,
) -> AppResult<Json<FeeResult>> {
    let positions = payload
        .pickups
        .iter()
        .map(|p| p.location)
        .chain([payload.dropoff, payload.driver_location]);
    ensure_valid_coordinates(positions)?;

    let locations: Vec<Option<Coordinate>> = payload.pickups.iter().map(|p| p.location).collect();
    if !validate_restaurant_group(&locations, state.config.max_restaurant_spread_km) {
        return Err(AppError::BadRequest(format!(
            "Restaurants must be within {} km of each other",
            state.config.max_restaurant_spread_km
        )));
    }

    let result = payload.quote(&state.planner.schedule);
    tracing::debug!(
        pickups = payload.pickups.len(),
        fee = result.fee,
        distance_km = result.distance_km,
        "Delivery quoted"
    );

    Ok(Json(result))
}

/// Reject any supplied coordinate outside latitude/longitude range.
pub(crate) fn ensure_valid_coordinates(
    positions: impl IntoIterator<Item = Option<Coordinate>>,
) -> AppResult<()> {
    match positions.into_iter().flatten().find(|c| !c.is_valid()) {
        Some(bad) => Err(AppError::BadRequest(format!(
            "Invalid coordinate ({}, {})",
            bad.lat, bad.lng
        ))),
        None => Ok(()),
    }
}
